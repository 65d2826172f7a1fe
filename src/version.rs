//! Semantic-version parsing and "is there something newer" comparison.
//!
//! Tags are parsed leniently: an optional leading `v` is accepted and a
//! missing minor or patch component is treated as zero, so `v3.21` compares
//! as `3.21.0`. Anything else that is not valid semver becomes the sentinel
//! minimum `0.0.0-0`.

use std::cmp::Ordering;

use semver::{BuildMetadata, Prerelease, Version};

/// The version substituted for any tag that does not parse.
pub fn sentinel() -> Version {
    Version {
        major: 0,
        minor: 0,
        patch: 0,
        pre: Prerelease::new("0").unwrap_or(Prerelease::EMPTY),
        build: BuildMetadata::EMPTY,
    }
}

/// Parse `MAJOR[.MINOR[.PATCH]][-PRERELEASE][+BUILD]`, with an optional `v` prefix.
pub fn parse_lenient(input: &str) -> Option<Version> {
    let input = input.strip_prefix('v').unwrap_or(input);

    // A separator must be followed by at least one identifier
    let (rest, build) = match input.split_once('+') {
        Some((_, "")) => return None,
        Some((rest, build)) => (rest, BuildMetadata::new(build).ok()?),
        None => (input, BuildMetadata::EMPTY),
    };
    let (core, pre) = match rest.split_once('-') {
        Some((_, "")) => return None,
        Some((core, pre)) => (core, Prerelease::new(pre).ok()?),
        None => (rest, Prerelease::EMPTY),
    };

    let mut numbers = [0u64; 3];
    let parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *slot = part.parse().ok()?;
    }

    Some(Version {
        major: numbers[0],
        minor: numbers[1],
        patch: numbers[2],
        pre,
        build,
    })
}

/// SemVer precedence: like `Ord` for `Version`, but build metadata is ignored.
pub fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// Outcome of comparing the local tag against the remote candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// The local transformed tag did not parse and the sentinel was used.
    pub local_unparsed: bool,
    /// Raw registry tag of the newest candidate, if it is newer than local.
    pub update: Option<String>,
    /// Whether there was any candidate at all.
    pub had_candidates: bool,
}

/// Compare a transformed local tag against `(transformed, raw)` remote candidates.
///
/// Candidates are ordered by semantic version; among equal versions the one
/// that arrived last wins.
pub fn compare(local: &str, remote: &[(String, String)]) -> Comparison {
    let (local_version, local_unparsed) = match parse_lenient(local) {
        Some(v) => (v, false),
        None => (sentinel(), true),
    };

    let mut candidates: Vec<(Version, &str)> = remote
        .iter()
        .map(|(transformed, raw)| {
            (
                parse_lenient(transformed).unwrap_or_else(sentinel),
                raw.as_str(),
            )
        })
        .collect();
    candidates.sort_by(|a, b| precedence(&a.0, &b.0));

    let update = candidates
        .last()
        .filter(|(best, _)| precedence(best, &local_version) == Ordering::Greater)
        .map(|(_, raw)| raw.to_string());

    Comparison {
        local_unparsed,
        update,
        had_candidates: !candidates.is_empty(),
    }
}
