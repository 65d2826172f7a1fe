use regex::Regex;

use crate::error::AppError;
use crate::models::ContainerLabels;

/// Compiled include/transform labels of one container.
#[derive(Debug)]
pub struct TagRule {
    include: Regex,
    transform: Option<(Regex, String)>,
}

impl TagRule {
    /// Compile the container's labels. An empty include pattern matches every
    /// tag; an empty transform rule leaves tags unchanged.
    pub fn from_labels(labels: &ContainerLabels) -> Result<Self, AppError> {
        let include = Regex::new(&labels.include).map_err(|source| AppError::InvalidInclude {
            pattern: labels.include.clone(),
            source,
        })?;

        let transform = if labels.transform.trim().is_empty() {
            None
        } else {
            let (pattern, replacement) = labels
                .transform
                .split_once("=>")
                .ok_or_else(|| AppError::MalformedTransform(labels.transform.clone()))?;
            let pattern = pattern.trim();
            let re = Regex::new(pattern).map_err(|source| AppError::InvalidTransform {
                pattern: pattern.to_string(),
                source,
            })?;
            Some((re, replacement.trim().to_string()))
        };

        Ok(Self { include, transform })
    }

    /// Rewrite a tag into its comparable form.
    pub fn apply(&self, tag: &str) -> String {
        match &self.transform {
            Some((re, replacement)) => re.replace_all(tag, replacement.as_str()).into_owned(),
            None => tag.to_string(),
        }
    }

    /// Keep the tags matching the include pattern, paired as `(transformed, raw)`.
    pub fn select(&self, raw_tags: &[String]) -> Vec<(String, String)> {
        raw_tags
            .iter()
            .filter(|tag| self.include.is_match(tag))
            .map(|tag| (self.apply(tag), tag.clone()))
            .collect()
    }
}
