use tracing::debug;

use crate::models::{FetchStatus, ImageTagMap, TrackedContainer};
use crate::transform::TagRule;
use crate::version::compare;

/// Terminal outcome of evaluating one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    UpdateAvailable,
    AuthError,
    ServerError,
    HttpError(u16),
    FetchError,
    AuthExchangeError(String),
    /// The local tag is not a semantic version; an update may still be reported.
    SemVerError,
    NoMatchingTags,
    ConfigMissing,
    NoTagsFound,
    PatternError(String),
    InvalidReference(String),
}

impl Status {
    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok | Status::UpdateAvailable)
    }

    /// Short status: OK or ERR.
    pub fn label(&self) -> &'static str {
        if self.is_ok() {
            "OK"
        } else {
            "ERR"
        }
    }

    pub fn detail(&self) -> String {
        match self {
            Status::Ok => "up to date".to_string(),
            Status::UpdateAvailable => "update available".to_string(),
            Status::AuthError => "authentication error".to_string(),
            Status::ServerError => "server error".to_string(),
            Status::HttpError(code) => format!("registry error {}", code),
            Status::FetchError => "fetch error".to_string(),
            Status::AuthExchangeError(message) => format!("token exchange failed: {}", message),
            Status::SemVerError => "tag is not a semantic version".to_string(),
            Status::NoMatchingTags => "no matching tags".to_string(),
            Status::ConfigMissing => "registry not configured".to_string(),
            Status::NoTagsFound => "no tags found".to_string(),
            Status::PatternError(message) => message.clone(),
            Status::InvalidReference(message) => message.clone(),
        }
    }
}

/// One result row per container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub status: Status,
    pub container: String,
    pub domain: String,
    pub path: String,
    pub tag: String,
    /// Newer tag, as named by the registry.
    pub update: Option<String>,
}

impl UpdateResult {
    pub fn repository(&self) -> String {
        if self.domain.is_empty() {
            return self.path.clone();
        }
        format!("{}/{}", self.domain, self.path)
    }

    pub fn image(&self) -> String {
        if self.tag.is_empty() {
            return self.repository();
        }
        format!("{}:{}", self.repository(), self.tag)
    }
}

/// Evaluate every container against the fetched tags, preserving input order.
pub fn evaluate(containers: &[TrackedContainer], image_tags: &ImageTagMap) -> Vec<UpdateResult> {
    containers
        .iter()
        .map(|ctr| evaluate_container(ctr, image_tags))
        .collect()
}

pub fn evaluate_container(ctr: &TrackedContainer, image_tags: &ImageTagMap) -> UpdateResult {
    let (status, update) = decide(ctr, image_tags);
    debug!(
        container = %ctr.name,
        image = %ctr.image,
        status = ?status,
        update = ?update,
        "Evaluated container"
    );

    UpdateResult {
        status,
        container: ctr.name.clone(),
        domain: ctr.image.domain.clone(),
        path: ctr.image.path.clone(),
        tag: ctr.image.tag.clone(),
        update,
    }
}

fn decide(ctr: &TrackedContainer, image_tags: &ImageTagMap) -> (Status, Option<String>) {
    if let Some(error) = &ctr.error {
        return (Status::InvalidReference(error.clone()), None);
    }
    if !ctr.tracked {
        return (Status::ConfigMissing, None);
    }
    let Some(fetched) = image_tags.get(&ctr.image.repository()) else {
        return (Status::NoTagsFound, None);
    };

    match &fetched.status {
        FetchStatus::Ok => {}
        FetchStatus::Http(401) => return (Status::AuthError, None),
        FetchStatus::Http(500) => return (Status::ServerError, None),
        FetchStatus::Http(code) => return (Status::HttpError(*code), None),
        FetchStatus::Network => return (Status::FetchError, None),
        FetchStatus::AuthExchange(message) => {
            return (Status::AuthExchangeError(message.clone()), None)
        }
    }

    let rule = match TagRule::from_labels(&ctr.labels) {
        Ok(rule) => rule,
        Err(e) => return (Status::PatternError(e.to_string()), None),
    };

    let local = rule.apply(&ctr.image.tag);
    let candidates = rule.select(&fetched.tags);
    debug!(
        "{}: local '{}' -> '{}', {} of {} tags match",
        ctr.name,
        ctr.image.tag,
        local,
        candidates.len(),
        fetched.tags.len()
    );

    let comparison = compare(&local, &candidates);
    let status = if !comparison.had_candidates {
        Status::NoMatchingTags
    } else if comparison.local_unparsed {
        Status::SemVerError
    } else if comparison.update.is_some() {
        Status::UpdateAvailable
    } else {
        Status::Ok
    };

    (status, comparison.update)
}
