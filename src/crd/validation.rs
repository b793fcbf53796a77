//! # Validation
//!
//! Admitted-shape validation for source records and Kubernetes duration
//! parsing. These rules mirror the admission webhook contract; the
//! controller re-applies them at the head of each reconcile so that records
//! created while the webhook was absent still surface a configuration
//! condition instead of undefined behavior.

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;

use super::maven_artifact::MavenArtifactSpec;

static DURATION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<number>\d+)(?P<unit>[smhd])$").expect("duration regex must compile")
});

static DNS_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("label regex must compile")
});

/// Parse a Kubernetes duration string into a `Duration`.
/// Supports formats: "30s", "1m", "5m", "1h", "2d".
pub fn parse_duration(duration_str: &str) -> Result<Duration> {
    let trimmed = duration_str.trim();
    if trimmed.is_empty() {
        return Err(anyhow::anyhow!("duration cannot be empty"));
    }

    let lower = trimmed.to_lowercase();
    let captures = DURATION_REGEX.captures(&lower).ok_or_else(|| {
        anyhow::anyhow!(
            "invalid duration format '{}'; expected <number><unit> (e.g., '30s', '5m', '1h')",
            trimmed
        )
    })?;

    let number: u64 = captures["number"]
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid duration number in '{}': {}", trimmed, e))?;
    if number == 0 {
        return Err(anyhow::anyhow!(
            "duration must be greater than 0, got '{}'",
            trimmed
        ));
    }

    let seconds = match &captures["unit"] {
        "s" => number,
        "m" => number * 60,
        "h" => number * 3600,
        "d" => number * 86400,
        unit => return Err(anyhow::anyhow!("invalid duration unit '{unit}'")),
    };

    Ok(Duration::from_secs(seconds))
}

/// RFC-1123 DNS label check used for secret references
pub fn validate_dns_label(name: &str) -> Result<()> {
    if name.len() > 63 {
        return Err(anyhow::anyhow!(
            "name '{}' must be no more than 63 characters",
            name
        ));
    }
    if !DNS_LABEL_REGEX.is_match(name) {
        return Err(anyhow::anyhow!(
            "name '{}' must be a lowercase RFC 1123 label",
            name
        ));
    }
    Ok(())
}

/// Validate the admitted shape of a MavenArtifact spec
pub fn validate_maven_artifact(spec: &MavenArtifactSpec) -> Result<()> {
    let artifact = &spec.artifact;
    if artifact.group_id.is_empty() {
        return Err(anyhow::anyhow!("spec.artifact.groupId is required"));
    }
    if artifact.artifact_id.is_empty() {
        return Err(anyhow::anyhow!("spec.artifact.artifactId is required"));
    }
    if artifact.version.is_empty() {
        return Err(anyhow::anyhow!("spec.artifact.version is required"));
    }
    if artifact.version.starts_with('[') || artifact.version.starts_with('(') {
        return Err(anyhow::anyhow!(
            "spec.artifact.version '{}' is invalid; version ranges are not supported",
            artifact.version
        ));
    }

    let repo_url = &spec.repository.url;
    if repo_url.is_empty() {
        return Err(anyhow::anyhow!("spec.repository.url is required"));
    }
    match reqwest::Url::parse(repo_url) {
        Err(e) => {
            return Err(anyhow::anyhow!(
                "Error parsing repository URL \"{repo_url}\": {e}"
            ))
        }
        Ok(url) if url.scheme() != "https" => {
            return Err(anyhow::anyhow!(
                "The only supported scheme is \"https\"; scheme \"{}\" is not supported in repository URL \"{repo_url}\"",
                url.scheme()
            ))
        }
        Ok(_) => {}
    }
    if let Some(secret_ref) = &spec.repository.secret_ref {
        if !secret_ref.name.is_empty() {
            validate_dns_label(&secret_ref.name)
                .map_err(|e| anyhow::anyhow!("spec.repository.secretRef.name: {e}"))?;
        }
    }

    let interval = parse_duration(&spec.interval)
        .map_err(|e| anyhow::anyhow!("spec.interval '{}': {e}", spec.interval))?;
    if interval.is_zero() {
        return Err(anyhow::anyhow!("spec.interval must be greater than 0"));
    }
    if let Some(timeout) = spec.timeout.as_deref().filter(|t| !t.is_empty()) {
        let timeout = parse_duration(timeout)
            .map_err(|e| anyhow::anyhow!("spec.timeout '{timeout}': {e}"))?;
        if timeout.is_zero() {
            return Err(anyhow::anyhow!("spec.timeout must be greater than 0"));
        }
    }

    Ok(())
}
