//! # Custom Resource Definitions
//!
//! CRD types for the source controller.
//!
//! Two source kinds are served, sharing a status skeleton:
//!
//! - `ImageRepository` — a container image reference resolved to a digest
//!   and packaged as a tar.gz artifact.
//! - `MavenArtifact` — a Maven `(groupId, artifactId, version)` coordinate
//!   resolved against a remote repository and packaged as a tar.gz artifact.
//!
//! ## Module Structure
//!
//! - `image_repository.rs` - ImageRepository spec and condition types
//! - `maven_artifact.rs` - MavenArtifact spec, defaults and condition types
//! - `status.rs` - Shared status skeleton and artifact record
//! - `condition.rs` - Condition bookkeeping and the Ready aggregate
//! - `validation.rs` - Admitted-shape validation and duration parsing

mod condition;
mod image_repository;
mod maven_artifact;
mod status;
pub mod validation;

pub use condition::{
    condition_is_unknown, get_condition, Condition, ConditionSet, CONDITION_FALSE, CONDITION_READY,
    CONDITION_TRUE, CONDITION_UNKNOWN,
};
pub use image_repository::{
    ImageRepository, ImageRepositorySpec, CONDITION_ARTIFACT_AVAILABLE, CONDITION_IMAGE_RESOLVED,
    IMAGE_REPOSITORY_CONDITIONS,
};
pub use maven_artifact::{
    MavenArtifact, MavenArtifactSpec, MavenArtifactType, MavenRepository,
    CONDITION_ARTIFACT_VERSION_RESOLVED, MAVEN_ARTIFACT_CONDITIONS,
};
pub use status::{preserve_artifact_last_update_time, Artifact, LocalObjectReference, SourceStatus};
