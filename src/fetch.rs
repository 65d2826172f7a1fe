use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{sleep_until, timeout_at, Instant};
use tracing::{debug, warn};

use crate::models::{Credential, FetchStatus, GroupedRepository, ImageTagMap, ImageTags, RegistryMap};
use crate::registry::RegistryClient;

/// Fetches the tag lists of every grouped image with bounded concurrency.
pub struct TagFetcher {
    client: RegistryClient,
    concurrency: usize,
    deadline: Duration,
}

impl TagFetcher {
    pub fn new(client: RegistryClient, concurrency: usize, deadline: Duration) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            deadline,
        }
    }

    /// Resolve auth once per registry, then fetch each image path on a worker.
    ///
    /// A failed token exchange marks that registry's images only. Images still
    /// in flight when the deadline passes are left out of the map.
    pub async fn fetch_all(
        &self,
        groups: &[GroupedRepository],
        registries: &RegistryMap,
        progress: &ProgressBar,
    ) -> ImageTagMap {
        let deadline = Instant::now() + self.deadline;
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, ImageTags)>();
        let mut tasks = JoinSet::new();
        let mut results = ImageTagMap::new();

        for group in groups {
            let Some(registry) = registries.get(&group.domain) else {
                debug!("Registry not configured: {}", group.domain);
                continue;
            };
            debug!(
                "Domain: {}, images: {}, url: {}",
                group.domain,
                group.paths.len(),
                registry.kind.base_url()
            );

            let configured = Credential::new(registry.auth_type, registry.auth_token.clone());
            let auth = timeout_at(
                deadline,
                self.client.resolve_auth(&registry.kind, group, &configured),
            )
            .await;
            let credential = match auth {
                Ok(Ok(credential)) => Arc::new(credential),
                Ok(Err(e)) => {
                    warn!("Auth failed for {}: {}", group.domain, e);
                    self.fail_group(group, e.to_string(), &mut results, progress);
                    continue;
                }
                Err(_) => {
                    warn!("Deadline reached while authenticating against {}", group.domain);
                    self.fail_group(group, "deadline exceeded".to_string(), &mut results, progress);
                    continue;
                }
            };

            let base_url: Arc<str> = Arc::from(registry.kind.base_url());
            for path in &group.paths {
                let key = format!("{}/{}", group.domain, path);
                let path = path.clone();
                let client = self.client.clone();
                let semaphore = Arc::clone(&semaphore);
                let credential = Arc::clone(&credential);
                let base_url = Arc::clone(&base_url);
                let tx = tx.clone();

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return;
                    };
                    let tags = client.fetch_tags(&base_url, &credential, &path).await;
                    // Receiver only goes away after the deadline
                    let _ = tx.send((key, tags));
                });
            }
        }
        drop(tx);

        let expired = sleep_until(deadline);
        tokio::pin!(expired);
        loop {
            tokio::select! {
                received = rx.recv() => match received {
                    Some((key, tags)) => {
                        debug!("Fetched {} ({} tags, status {})", key, tags.tags.len(), tags.status.code());
                        results.insert(key, tags);
                        progress.inc(1);
                    }
                    None => break,
                },
                _ = &mut expired => {
                    warn!("Deadline reached, abandoning {} unfinished fetches", tasks.len());
                    tasks.abort_all();
                    break;
                }
            }
        }

        results
    }

    fn fail_group(
        &self,
        group: &GroupedRepository,
        message: String,
        results: &mut ImageTagMap,
        progress: &ProgressBar,
    ) {
        for path in &group.paths {
            results.insert(
                format!("{}/{}", group.domain, path),
                ImageTags::failed(FetchStatus::AuthExchange(message.clone())),
            );
            progress.inc(1);
        }
    }
}
