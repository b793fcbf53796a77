//! # ImageRepository
//!
//! Desired-source record for a container image. The controller resolves the
//! reference to a digest, pulls the image contents and publishes them as a
//! tar.gz artifact.

use serde::{Deserialize, Serialize};

use super::condition::ConditionSet;
use super::status::{LocalObjectReference, SourceStatus};

/// Image reference resolved to a digest
pub const CONDITION_IMAGE_RESOLVED: &str = "ImageResolved";
/// Artifact packaged and published under the artifact root
pub const CONDITION_ARTIFACT_AVAILABLE: &str = "ArtifactAvailable";

/// Dependent conditions aggregated into `Ready` for ImageRepository records
pub const IMAGE_REPOSITORY_CONDITIONS: ConditionSet =
    ConditionSet::new(&[CONDITION_IMAGE_RESOLVED, CONDITION_ARTIFACT_AVAILABLE]);

/// ImageRepository Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: source.artifacts.dev/v1alpha1
/// kind: ImageRepository
/// metadata:
///   name: hello
///   namespace: default
/// spec:
///   image: registry.example/app/hello:latest
///   interval: 5m
///   serviceAccountName: builder
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ImageRepository",
    group = "source.artifacts.dev",
    version = "v1alpha1",
    namespaced,
    status = "SourceStatus",
    printcolumn = r#"{"name":"Image", "type":"string", "jsonPath":".spec.image"}, {"name":"URL", "type":"string", "jsonPath":".status.artifact.url"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ImageRepositorySpec {
    /// Reference to an image in a remote repository, either tagged or pinned
    /// to a digest
    pub image: String,
    /// Interval at which to check the repository for updates
    /// Format: Kubernetes duration string (e.g., "30s", "5m", "1h")
    #[serde(default)]
    pub interval: Option<String>,
    /// Names of Secrets containing registry login information used to
    /// resolve image metadata
    #[serde(default)]
    pub image_pull_secrets: Vec<LocalObjectReference>,
    /// Name of the ServiceAccount whose attached pull secrets authenticate
    /// the image pull. Defaults to "default".
    #[serde(default)]
    pub service_account_name: Option<String>,
}

impl ImageRepository {
    /// Service account consulted for pull secrets
    pub fn service_account_name(&self) -> &str {
        self.spec
            .service_account_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(crate::constants::DEFAULT_SERVICE_ACCOUNT)
    }
}
