//! # MavenArtifact
//!
//! Desired-source record for a Maven artifact. The controller resolves the
//! (possibly symbolic) version against the remote repository's metadata,
//! downloads and verifies the file, and publishes it as a tar.gz artifact.

use serde::{Deserialize, Serialize};

use super::condition::ConditionSet;
use super::status::{LocalObjectReference, SourceStatus};

/// Symbolic version resolved to a concrete downloadable version
pub const CONDITION_ARTIFACT_VERSION_RESOLVED: &str = "ArtifactVersionResolved";

/// Dependent conditions aggregated into `Ready` for MavenArtifact records
pub const MAVEN_ARTIFACT_CONDITIONS: ConditionSet = ConditionSet::new(&[
    CONDITION_ARTIFACT_VERSION_RESOLVED,
    super::image_repository::CONDITION_ARTIFACT_AVAILABLE,
]);

/// Coordinates of a Maven-built artifact
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MavenArtifactType {
    /// Artifact group ID
    pub group_id: String,
    /// Artifact identifier
    pub artifact_id: String,
    /// Artifact version. A concrete version ("1.0.0"), "RELEASE", "LATEST"
    /// or a "-SNAPSHOT" version. Maven version ranges are not supported.
    pub version: String,
    /// Package type (jar, war, pom), defaults to jar
    #[serde(default)]
    pub r#type: Option<String>,
    /// Classifier distinguishing artifacts built from the same POM but
    /// differing in content
    #[serde(default)]
    pub classifier: Option<String>,
}

impl MavenArtifactType {
    /// Package type with the webhook default applied
    pub fn effective_type(&self) -> &str {
        self.r#type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or("jar")
    }
}

/// Parameters for accessing a Maven repository
#[derive(Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MavenRepository {
    /// HTTPS address of the repository. HTTP is not supported.
    pub url: String,
    /// Name of a secret containing authentication data:
    /// `username`/`password` for basic auth, `caFile` for a CA to trust
    /// while connecting, `certFile`/`keyFile` reserved for mTLS.
    #[serde(default)]
    pub secret_ref: Option<LocalObjectReference>,
}

/// MavenArtifact Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: source.artifacts.dev/v1alpha1
/// kind: MavenArtifact
/// metadata:
///   name: my-artifact
///   namespace: default
/// spec:
///   artifact:
///     groupId: com.example
///     artifactId: my-artifact
///     version: "1.0.0"
///   repository:
///     url: https://repo1.maven.org/maven2
///   interval: 5m
///   timeout: 1m
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "MavenArtifact",
    group = "source.artifacts.dev",
    version = "v1alpha1",
    namespaced,
    status = "SourceStatus",
    printcolumn = r#"{"name":"Artifact", "type":"string", "jsonPath":".spec.artifact.artifactId"}, {"name":"URL", "type":"string", "jsonPath":".status.artifact.url"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MavenArtifactSpec {
    /// Coordinates of the artifact to fetch
    pub artifact: MavenArtifactType,
    /// Parameters for accessing the repository
    pub repository: MavenRepository,
    /// Interval at which to check the repository for updates
    /// Format: Kubernetes duration string (e.g., "30s", "5m", "1h")
    pub interval: String,
    /// Timeout for artifact download operations.
    /// Defaults to the interval duration.
    #[serde(default)]
    pub timeout: Option<String>,
}

impl MavenArtifact {
    /// Timeout with the webhook default applied
    pub fn effective_timeout(&self) -> &str {
        self.spec
            .timeout
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.spec.interval)
    }
}
