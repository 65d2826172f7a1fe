use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;

use crate::registry::RegistryKind;

/// Authorization scheme sent with registry requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthType {
    #[default]
    None,
    Basic,
    Bearer,
}

impl AuthType {
    /// Parse the `auth` value of a registry config entry; anything unknown is `None`.
    pub fn from_config(value: Option<&str>) -> Self {
        match value.map(str::to_ascii_lowercase).as_deref() {
            Some("basic") => AuthType::Basic,
            Some("bearer") => AuthType::Bearer,
            _ => AuthType::None,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            AuthType::None => "None",
            AuthType::Basic => "Basic",
            AuthType::Bearer => "Bearer",
        }
    }
}

/// Effective credential for one registry, after auth resolution.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Credential {
    pub auth_type: AuthType,
    pub token: String,
}

impl Credential {
    pub fn new(auth_type: AuthType, token: impl Into<String>) -> Self {
        Self {
            auth_type,
            token: token.into(),
        }
    }

    /// Value of the `Authorization` header, if one should be sent.
    pub fn header_value(&self) -> Option<String> {
        match self.auth_type {
            AuthType::None => None,
            _ if self.token.is_empty() => None,
            scheme => Some(format!("{} {}", scheme.scheme(), self.token)),
        }
    }
}

/// A registry entry from the config file, bound to its catalog strategy.
#[derive(Debug, Clone)]
pub struct ConfiguredRegistry {
    pub domain: String,
    pub name: String,
    pub auth_type: AuthType,
    pub auth_token: String,
    pub kind: RegistryKind,
}

/// domain -> configured registry
pub type RegistryMap = HashMap<String, ConfiguredRegistry>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerImage {
    pub domain: String,
    pub path: String,
    pub tag: String,
}

impl ContainerImage {
    /// `<domain>/<path>`, the key of the image tag map.
    pub fn repository(&self) -> String {
        format!("{}/{}", self.domain, self.path)
    }
}

impl fmt::Display for ContainerImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.domain, self.path, self.tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerLabels {
    pub include: String,
    pub transform: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedContainer {
    pub name: String,
    pub tracked: bool,
    pub image: ContainerImage,
    pub labels: ContainerLabels,
    /// Set when the image reference could not be parsed; `image.path` then
    /// holds the raw reference.
    pub error: Option<String>,
}

/// Unique image paths of one registry domain, in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupedRepository {
    pub domain: String,
    pub paths: Vec<String>,
}

/// Outcome of fetching the tag list of one image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStatus {
    Ok,
    /// Non-200 response from the tag listing endpoint.
    Http(u16),
    /// Transport or decode failure after retries.
    Network,
    /// The registry's token exchange failed, so nothing was fetched.
    AuthExchange(String),
}

impl FetchStatus {
    /// Numeric form: 200, the HTTP status, or -1 for anything that never got a response.
    pub fn code(&self) -> i32 {
        match self {
            FetchStatus::Ok => 200,
            FetchStatus::Http(code) => i32::from(*code),
            FetchStatus::Network | FetchStatus::AuthExchange(_) => -1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageTags {
    pub status: FetchStatus,
    pub tags: Vec<String>,
}

impl ImageTags {
    pub fn failed(status: FetchStatus) -> Self {
        Self {
            status,
            tags: Vec::new(),
        }
    }
}

/// `<domain>/<path>` -> fetched tags
pub type ImageTagMap = HashMap<String, ImageTags>;

/// GET /v2/<repo>/tags/list response
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct TagList {
    pub name: String,
    pub tags: Option<Vec<String>>,
}

/// GET https://auth.docker.io/token response
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}
