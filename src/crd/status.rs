//! # Source Status
//!
//! Shared status skeleton for both source kinds.

use serde::{Deserialize, Serialize};

use super::condition::Condition;

/// Reference to an object in the same namespace
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Name of the referenced object
    pub name: String,
}

/// Output of the last successful source sync
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    /// Revision the artifact was produced from. For images this is the
    /// fully qualified digest reference, for Maven artifacts the resolved
    /// file name.
    pub revision: String,
    /// Path of the artifact file relative to the artifact root
    pub path: String,
    /// Download URL of the artifact file
    pub url: String,
    /// SHA-1 checksum of the artifact file
    pub checksum: String,
    /// Time the artifact last changed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update_time: Option<String>,
}

/// Observed state shared by ImageRepository and MavenArtifact
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    /// Generation of the record the status was computed against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Download URL of the artifact from the last sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Output of the last successful sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Artifact>,
    /// Latest observations of the record's state
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Keep the current artifact's `last_update_time` when the desired artifact
/// is otherwise identical, so repeated reconciles of an unchanged record
/// produce a byte-identical status.
pub fn preserve_artifact_last_update_time(
    current: Option<&Artifact>,
    desired: Artifact,
) -> Artifact {
    let Some(current) = current else {
        return desired;
    };

    let mut current_cmp = current.clone();
    current_cmp.last_update_time = None;
    let mut desired_cmp = desired.clone();
    desired_cmp.last_update_time = None;

    if current_cmp == desired_cmp {
        current.clone()
    } else {
        desired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(checksum: &str, time: &str) -> Artifact {
        Artifact {
            revision: "my-artifact-1.0.0.jar".into(),
            path: "mavenartifact/default/demo/abc.tar.gz".into(),
            url: "http://localhost:8082/mavenartifact/default/demo/abc.tar.gz".into(),
            checksum: checksum.into(),
            last_update_time: Some(time.into()),
        }
    }

    #[test]
    fn unchanged_artifact_keeps_previous_update_time() {
        let current = artifact("aa", "2022-07-08T17:14:42Z");
        let desired = artifact("aa", "2023-01-01T00:00:00Z");

        let merged = preserve_artifact_last_update_time(Some(&current), desired);
        assert_eq!(
            merged.last_update_time.as_deref(),
            Some("2022-07-08T17:14:42Z")
        );
    }

    #[test]
    fn changed_artifact_takes_new_update_time() {
        let current = artifact("aa", "2022-07-08T17:14:42Z");
        let desired = artifact("bb", "2023-01-01T00:00:00Z");

        let merged = preserve_artifact_last_update_time(Some(&current), desired);
        assert_eq!(merged.checksum, "bb");
        assert_eq!(
            merged.last_update_time.as_deref(),
            Some("2023-01-01T00:00:00Z")
        );
    }

    #[test]
    fn missing_current_takes_desired() {
        let desired = artifact("aa", "2023-01-01T00:00:00Z");
        let merged = preserve_artifact_last_update_time(None, desired.clone());
        assert_eq!(merged, desired);
    }
}
