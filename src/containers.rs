use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::{ContainerImage, ContainerLabels, GroupedRepository, RegistryMap, TrackedContainer};

const DEFAULT_DOMAIN: &str = "docker.io";
const DEFAULT_TAG: &str = "latest";

const INCLUDE_LABELS: [&str; 2] = ["contrack.include", "wud.tag.include"];
const TRANSFORM_LABELS: [&str; 2] = ["contrack.transform", "wud.tag.transform"];

/// One entry of the container inventory file.
#[derive(Debug, Clone, Deserialize)]
pub struct Container {
    pub name: String,
    pub image: String,
    #[serde(default = "default_state")]
    pub state: String,
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

fn default_state() -> String {
    "running".to_string()
}

impl Container {
    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }

    fn label(&self, keys: &[&str]) -> String {
        keys.iter()
            .find_map(|key| self.labels.get(*key))
            .cloned()
            .unwrap_or_default()
    }
}

/// Read the container inventory (YAML or JSON list), dropping stopped
/// containers unless `include_stopped`.
pub fn load_inventory(path: &Path, include_stopped: bool) -> Result<Vec<Container>, AppError> {
    let data = std::fs::read_to_string(path).map_err(|source| AppError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let containers: Vec<Container> = serde_yaml::from_str(&data).map_err(|source| AppError::Yaml {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(containers
        .into_iter()
        .filter(|c| include_stopped || c.is_running())
        .collect())
}

/// Split an image reference into domain, path and tag using Docker's
/// normalization rules.
pub fn parse_image(reference: &str) -> Result<ContainerImage, AppError> {
    let invalid = || AppError::InvalidReference(reference.to_string());

    let name = reference.split('@').next().unwrap_or_default().trim();
    if name.is_empty() {
        return Err(invalid());
    }

    let (domain, remainder) = match name.split_once('/') {
        Some((first, rest)) if first.contains('.') || first.contains(':') || first == "localhost" => {
            (first.to_string(), rest)
        }
        _ => (DEFAULT_DOMAIN.to_string(), name),
    };
    let domain = if domain == "index.docker.io" {
        DEFAULT_DOMAIN.to_string()
    } else {
        domain
    };

    let last_segment_start = remainder.rfind('/').map_or(0, |i| i + 1);
    let (path, tag) = match remainder[last_segment_start..].rfind(':') {
        Some(i) => {
            let split = last_segment_start + i;
            (&remainder[..split], &remainder[split + 1..])
        }
        None => (remainder, DEFAULT_TAG),
    };

    if path.is_empty() || tag.is_empty() || path.split('/').any(str::is_empty) {
        return Err(invalid());
    }

    let path = if domain == DEFAULT_DOMAIN && !path.contains('/') {
        format!("library/{}", path)
    } else {
        path.to_string()
    };

    Ok(ContainerImage {
        domain,
        path,
        tag: tag.to_string(),
    })
}

/// Turn discovered containers into tracked containers, sorted by name.
/// A container whose image reference cannot be parsed is kept as an
/// untracked entry carrying the parse error.
pub fn track_containers(containers: &[Container], registries: &RegistryMap) -> Vec<TrackedContainer> {
    let mut tracked: Vec<TrackedContainer> = containers
        .iter()
        .map(|ctr| {
            let labels = ContainerLabels {
                include: ctr.label(&INCLUDE_LABELS),
                transform: ctr.label(&TRANSFORM_LABELS),
            };
            let name = ctr.name.trim_start_matches('/').to_string();
            match parse_image(&ctr.image) {
                Ok(image) => TrackedContainer {
                    name,
                    tracked: registries.contains_key(&image.domain),
                    labels,
                    image,
                    error: None,
                },
                Err(e) => {
                    warn!("Container {}: {}", ctr.name, e);
                    TrackedContainer {
                        name,
                        tracked: false,
                        labels,
                        image: ContainerImage {
                            domain: String::new(),
                            path: ctr.image.clone(),
                            tag: String::new(),
                        },
                        error: Some(e.to_string()),
                    }
                }
            }
        })
        .collect();

    tracked.sort_by(|a, b| a.name.cmp(&b.name));
    tracked
}

/// Group the image paths of tracked containers by registry domain.
/// Returns the groups in first-seen order and the number of unique images.
pub fn group_by_domain(containers: &[TrackedContainer]) -> (Vec<GroupedRepository>, usize) {
    let mut groups: Vec<GroupedRepository> = Vec::new();
    let mut unique_images = 0;

    for ctr in containers.iter().filter(|c| c.tracked) {
        let image = &ctr.image;
        match groups.iter_mut().find(|g| g.domain == image.domain) {
            Some(group) => {
                if !group.paths.contains(&image.path) {
                    group.paths.push(image.path.clone());
                    unique_images += 1;
                }
            }
            None => {
                groups.push(GroupedRepository {
                    domain: image.domain.clone(),
                    paths: vec![image.path.clone()],
                });
                unique_images += 1;
            }
        }
    }

    debug!(
        "Grouped {} unique images across {} registries",
        unique_images,
        groups.len()
    );
    (groups, unique_images)
}
