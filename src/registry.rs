use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, LINK};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{AuthType, Credential, FetchStatus, GroupedRepository, ImageTags, TagList, TokenResponse};

pub const DOCKER_HUB_AUTH_URL: &str = "https://auth.docker.io/token";

/// Base64 of ":", which GHCR accepts as an anonymous pull credential.
pub const GHCR_ANONYMOUS_TOKEN: &str = "Og==";

const PAGE_SIZE: &str = "1000";

/// How a registry is reached and authenticated against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryKind {
    DockerHub { url: String, auth_url: String },
    Ghcr { url: String },
    Lscr { url: String },
    Custom { url: String },
}

impl RegistryKind {
    /// Catalog lookup for the registries with built-in behavior.
    pub fn for_domain(domain: &str) -> Option<Self> {
        match domain {
            "docker.io" => Some(RegistryKind::DockerHub {
                url: "https://registry-1.docker.io/v2".to_string(),
                auth_url: DOCKER_HUB_AUTH_URL.to_string(),
            }),
            "lscr.io" => Some(RegistryKind::Lscr {
                url: "https://lscr.io/v2".to_string(),
            }),
            "ghcr.io" => Some(RegistryKind::Ghcr {
                url: "https://ghcr.io/v2".to_string(),
            }),
            _ => None,
        }
    }

    /// Catalog entry for `domain`, or a custom registry at `url_override`
    /// (default `https://<domain>/v2`).
    pub fn resolve(domain: &str, url_override: Option<&str>) -> Self {
        if let Some(kind) = Self::for_domain(domain) {
            return kind;
        }
        let url = match url_override {
            Some(url) => url.to_string(),
            None if domain.starts_with("https://") => domain.to_string(),
            None => format!("https://{}/v2", domain),
        };
        RegistryKind::Custom { url }
    }

    pub fn base_url(&self) -> &str {
        match self {
            RegistryKind::DockerHub { url, .. }
            | RegistryKind::Ghcr { url }
            | RegistryKind::Lscr { url }
            | RegistryKind::Custom { url } => url,
        }
    }
}

/// Exponential backoff for transient network failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    client: Client,
    retry: RetryPolicy,
    max_pages: usize,
}

impl RegistryClient {
    pub fn new(timeout: Duration, retry: RetryPolicy, max_pages: usize) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("contrack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            retry,
            max_pages: max_pages.max(1),
        })
    }

    /// Produce the credential used for every tag listing of this registry group.
    pub async fn resolve_auth(
        &self,
        kind: &RegistryKind,
        group: &GroupedRepository,
        configured: &Credential,
    ) -> Result<Credential, AppError> {
        let credential = match kind {
            RegistryKind::DockerHub { auth_url, .. } => {
                self.exchange_token(auth_url, &group.paths, configured).await?
            }
            RegistryKind::Ghcr { .. } => {
                if configured.auth_type != AuthType::None {
                    configured.clone()
                } else {
                    Credential::new(AuthType::Bearer, GHCR_ANONYMOUS_TOKEN)
                }
            }
            RegistryKind::Lscr { .. } | RegistryKind::Custom { .. } => configured.clone(),
        };

        // An empty token means "send nothing", whatever scheme was configured
        if credential.token.is_empty() {
            return Ok(Credential::default());
        }
        Ok(credential)
    }

    /// GET <auth_url>?service=registry.docker.io&grant_type=password&scope=repository:<path>:pull...
    async fn exchange_token(
        &self,
        auth_url: &str,
        paths: &[String],
        configured: &Credential,
    ) -> Result<Credential, AppError> {
        let mut query: Vec<(&str, String)> = vec![
            ("service", "registry.docker.io".to_string()),
            ("grant_type", "password".to_string()),
        ];
        query.extend(
            paths
                .iter()
                .map(|path| ("scope", format!("repository:{}:pull", path))),
        );

        debug!(url = auth_url, scopes = paths.len(), "Exchanging registry token");
        let auth_error = |message: String| AppError::AuthExchange {
            url: auth_url.to_string(),
            message,
        };

        let resp = self
            .send(|| {
                let req = self
                    .client
                    .get(auth_url)
                    .header(ACCEPT, "application/json")
                    .query(&query);
                with_auth(req, configured)
            })
            .await
            .map_err(|e| auth_error(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            let body = resp.text().await.unwrap_or_default();
            return Err(auth_error(format!("status {}: {}", status, body.trim())));
        }

        let token: TokenResponse = resp.json().await.map_err(|e| auth_error(e.to_string()))?;
        Ok(Credential::new(AuthType::Bearer, token.token))
    }

    /// GET <base_url>/<path>/tags/list?n=1000&last=<cursor>, following pages while
    /// the response carries a `Link` header.
    pub async fn fetch_tags(&self, base_url: &str, credential: &Credential, path: &str) -> ImageTags {
        let url = format!("{}/{}/tags/list", base_url.trim_end_matches('/'), path);
        let mut tags: Vec<String> = Vec::new();
        let mut last = String::new();
        let mut pages = 0usize;

        loop {
            pages += 1;
            debug!(url = %url, last = %last, page = pages, "GET tag list");

            let resp = match self
                .send(|| {
                    let req = self
                        .client
                        .get(&url)
                        .query(&[("n", PAGE_SIZE), ("last", last.as_str())]);
                    with_auth(req, credential)
                })
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    warn!("Failed to fetch tags for {}: {}", path, e);
                    return ImageTags::failed(FetchStatus::Network);
                }
            };

            let status = resp.status();
            if status != StatusCode::OK {
                debug!("Tag list for {} returned status {}", path, status);
                return ImageTags::failed(FetchStatus::Http(status.as_u16()));
            }

            let has_next = resp.headers().get(LINK).is_some_and(|v| !v.is_empty());

            let page: TagList = match resp.json().await {
                Ok(page) => page,
                Err(e) => {
                    warn!("Failed to parse tag list for {}: {}", path, e);
                    return ImageTags::failed(FetchStatus::Network);
                }
            };

            let page_tags = page.tags.unwrap_or_default();
            if let Some(tag) = page_tags.last() {
                last = tag.clone();
            }
            tags.extend(page_tags);

            if !has_next {
                break;
            }
            if pages >= self.max_pages {
                warn!(
                    "Stopping pagination for {} after {} pages (last cursor '{}')",
                    path, pages, last
                );
                break;
            }
        }

        ImageTags {
            status: FetchStatus::Ok,
            tags,
        }
    }

    /// Send a request, rebuilding and retrying it on transport errors.
    /// HTTP error statuses are returned as-is.
    async fn send<F>(&self, build: F) -> reqwest::Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            match build().send().await {
                Ok(resp) => return Ok(resp),
                Err(e) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    debug!("Request failed ({}), retrying in {:?}", e, delay);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn with_auth(req: RequestBuilder, credential: &Credential) -> RequestBuilder {
    match credential.header_value() {
        Some(value) => req.header(AUTHORIZATION, value),
        None => req,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(max_pages: usize) -> RegistryClient {
        let retry = RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        RegistryClient::new(Duration::from_millis(500), retry, max_pages).unwrap()
    }

    fn tags_body(tags: &[&str]) -> serde_json::Value {
        serde_json::json!({ "name": "library/nginx", "tags": tags })
    }

    fn group(paths: &[&str]) -> GroupedRepository {
        GroupedRepository {
            domain: "docker.io".to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn test_catalog_base_urls() {
        assert_eq!(
            RegistryKind::for_domain("docker.io").unwrap().base_url(),
            "https://registry-1.docker.io/v2"
        );
        assert_eq!(
            RegistryKind::for_domain("lscr.io").unwrap().base_url(),
            "https://lscr.io/v2"
        );
        assert_eq!(
            RegistryKind::for_domain("ghcr.io").unwrap().base_url(),
            "https://ghcr.io/v2"
        );
        assert!(RegistryKind::for_domain("registry.example.com").is_none());
    }

    #[test]
    fn test_resolve_custom_urls() {
        assert_eq!(
            RegistryKind::resolve("registry.example.com", None).base_url(),
            "https://registry.example.com/v2"
        );
        assert_eq!(
            RegistryKind::resolve("registry.example.com", Some("http://localhost:5000/v2")).base_url(),
            "http://localhost:5000/v2"
        );
        // catalog domains ignore overrides
        assert_eq!(
            RegistryKind::resolve("ghcr.io", Some("http://elsewhere/v2")).base_url(),
            "https://ghcr.io/v2"
        );
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_ghcr_anonymous_token() {
        let client = test_client(10);
        let kind = RegistryKind::for_domain("ghcr.io").unwrap();
        let cred = client
            .resolve_auth(&kind, &group(&["getwud/wud"]), &Credential::default())
            .await
            .unwrap();
        assert_eq!(cred, Credential::new(AuthType::Bearer, GHCR_ANONYMOUS_TOKEN));

        let configured = Credential::new(AuthType::Basic, "dXNlcjpwYXNz");
        let cred = client
            .resolve_auth(&kind, &group(&["getwud/wud"]), &configured)
            .await
            .unwrap();
        assert_eq!(cred, configured);
    }

    #[tokio::test]
    async fn test_custom_passthrough_and_empty_token() {
        let client = test_client(10);
        let kind = RegistryKind::resolve("registry.example.com", None);
        let configured = Credential::new(AuthType::Bearer, "secret");
        let cred = client.resolve_auth(&kind, &group(&["a"]), &configured).await.unwrap();
        assert_eq!(cred, configured);

        let cred = client
            .resolve_auth(&kind, &group(&["a"]), &Credential::new(AuthType::Basic, ""))
            .await
            .unwrap();
        assert_eq!(cred, Credential::default());
    }

    #[tokio::test]
    async fn test_docker_hub_token_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(query_param("service", "registry.docker.io"))
            .and(query_param("grant_type", "password"))
            .and(query_param("scope", "repository:library/nginx:pull"))
            .and(query_param("scope", "repository:library/redis:pull"))
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "hub-token" })))
            .expect(1)
            .mount(&server)
            .await;

        let kind = RegistryKind::DockerHub {
            url: server.uri(),
            auth_url: format!("{}/token", server.uri()),
        };
        let cred = test_client(10)
            .resolve_auth(
                &kind,
                &group(&["library/nginx", "library/redis"]),
                &Credential::new(AuthType::Basic, "dXNlcjpwYXNz"),
            )
            .await
            .unwrap();
        assert_eq!(cred, Credential::new(AuthType::Bearer, "hub-token"));
    }

    #[tokio::test]
    async fn test_lscr_passthrough() {
        let client = test_client(10);
        let kind = RegistryKind::for_domain("lscr.io").unwrap();

        let configured = Credential::new(AuthType::Basic, "dXNlcjpwYXNz");
        let cred = client
            .resolve_auth(&kind, &group(&["linuxserver/jellyfin"]), &configured)
            .await
            .unwrap();
        assert_eq!(cred, configured);

        let cred = client
            .resolve_auth(&kind, &group(&["linuxserver/jellyfin"]), &Credential::default())
            .await
            .unwrap();
        assert_eq!(cred, Credential::default());
    }

    #[tokio::test]
    async fn test_docker_hub_anonymous_exchange() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .and(query_param("scope", "repository:library/nginx:pull"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "anon-token" })))
            .expect(1)
            .mount(&server)
            .await;

        let kind = RegistryKind::DockerHub {
            url: server.uri(),
            auth_url: format!("{}/token", server.uri()),
        };
        let cred = test_client(10)
            .resolve_auth(&kind, &group(&["library/nginx"]), &Credential::default())
            .await
            .unwrap();
        assert_eq!(cred, Credential::new(AuthType::Bearer, "anon-token"));

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[tokio::test]
    async fn test_docker_hub_exchange_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let kind = RegistryKind::DockerHub {
            url: server.uri(),
            auth_url: format!("{}/token", server.uri()),
        };
        let err = test_client(10)
            .resolve_auth(&kind, &group(&["library/nginx"]), &Credential::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AuthExchange { .. }));
    }

    #[tokio::test]
    async fn test_fetch_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/library/nginx/tags/list"))
            .and(query_param("n", "1000"))
            .and(query_param("last", ""))
            .respond_with(ResponseTemplate::new(200).set_body_json(tags_body(&["1.2.3", "1.3.0", "latest"])))
            .expect(1)
            .mount(&server)
            .await;

        let result = test_client(10)
            .fetch_tags(&format!("{}/v2", server.uri()), &Credential::default(), "library/nginx")
            .await;
        assert_eq!(result.status, FetchStatus::Ok);
        assert_eq!(result.tags, vec!["1.2.3", "1.3.0", "latest"]);
    }

    #[tokio::test]
    async fn test_fetch_concatenates_pages_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/app/tags/list"))
            .and(query_param("last", ""))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", "</v2/app/tags/list?n=1000&last=b>; rel=\"next\"")
                    .set_body_json(tags_body(&["a", "b"])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/app/tags/list"))
            .and(query_param("last", "b"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", "</v2/app/tags/list?n=1000&last=c>; rel=\"next\"")
                    .set_body_json(tags_body(&["b", "c"])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/app/tags/list"))
            .and(query_param("last", "c"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tags_body(&["d"])))
            .mount(&server)
            .await;

        let result = test_client(10)
            .fetch_tags(&server.uri(), &Credential::default(), "app")
            .await;
        assert_eq!(result.status, FetchStatus::Ok);
        // overlapping pages are not de-duplicated
        assert_eq!(result.tags, vec!["a", "b", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_fetch_sends_authorization() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .and(header("authorization", "Bearer Og=="))
            .respond_with(ResponseTemplate::new(200).set_body_json(tags_body(&["1.0.0"])))
            .expect(1)
            .mount(&server)
            .await;

        let cred = Credential::new(AuthType::Bearer, GHCR_ANONYMOUS_TOKEN);
        let result = test_client(10).fetch_tags(&server.uri(), &cred, "app").await;
        assert_eq!(result.tags, vec!["1.0.0"]);
    }

    #[tokio::test]
    async fn test_fetch_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = test_client(10)
            .fetch_tags(&server.uri(), &Credential::default(), "app")
            .await;
        assert_eq!(result, ImageTags::failed(FetchStatus::Http(401)));
    }

    #[tokio::test]
    async fn test_fetch_error_mid_sequence_discards_tags() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .and(query_param("last", ""))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", "next")
                    .set_body_json(tags_body(&["a", "b"])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .and(query_param("last", "b"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let result = test_client(10)
            .fetch_tags(&server.uri(), &Credential::default(), "app")
            .await;
        assert_eq!(result, ImageTags::failed(FetchStatus::Http(500)));
    }

    #[tokio::test]
    async fn test_fetch_stops_at_page_ceiling() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("link", "next")
                    .set_body_json(tags_body(&["same"])),
            )
            .expect(3)
            .mount(&server)
            .await;

        let result = test_client(3)
            .fetch_tags(&server.uri(), &Credential::default(), "app")
            .await;
        assert_eq!(result.status, FetchStatus::Ok);
        assert_eq!(result.tags, vec!["same", "same", "same"]);
    }

    #[tokio::test]
    async fn test_fetch_network_error() {
        // nothing listens on port 1
        let result = test_client(10)
            .fetch_tags("http://127.0.0.1:1/v2", &Credential::default(), "app")
            .await;
        assert_eq!(result, ImageTags::failed(FetchStatus::Network));
        assert_eq!(result.status.code(), -1);
    }

    #[tokio::test]
    async fn test_fetch_invalid_json_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let result = test_client(10)
            .fetch_tags(&server.uri(), &Credential::default(), "app")
            .await;
        assert_eq!(result, ImageTags::failed(FetchStatus::Network));
    }

    #[tokio::test]
    async fn test_fetch_retries_after_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(tags_body(&["slow"])),
            )
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/app/tags/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(tags_body(&["fast"])))
            .mount(&server)
            .await;

        let result = test_client(10)
            .fetch_tags(&server.uri(), &Credential::default(), "app")
            .await;
        assert_eq!(result.status, FetchStatus::Ok);
        assert_eq!(result.tags, vec!["fast"]);
    }
}
