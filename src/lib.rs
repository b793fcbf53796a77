//! # Source Controller
//!
//! A Kubernetes controller that watches declarative source records and
//! materializes each as a local, stably-addressed, content-addressed
//! tar.gz artifact served over HTTP.
//!
//! ## Overview
//!
//! Two source kinds are supported:
//!
//! 1. **ImageRepository** - a container image reference. Tags are resolved
//!    to digests against the registry, the image contents are pulled and
//!    repackaged as a deterministic tar.gz.
//! 2. **MavenArtifact** - a Maven `(groupId, artifactId, version)`
//!    coordinate. Symbolic versions (RELEASE, LATEST, `-SNAPSHOT`) are
//!    resolved through `maven-metadata.xml`, the file is downloaded,
//!    verified against its remote SHA-1 and repackaged as a tar.gz.
//!
//! For each record the controller publishes a stable artifact URL in the
//! record's status, tracks progress through typed conditions with a
//! `Ready` aggregate, and removes the record's artifacts through a
//! finalizer before deletion.
//!
//! ## Features
//!
//! - **Content-addressed artifact cache** with skip-on-unchanged semantics
//! - **Deterministic packaging**: repeated packaging of the same input is
//!   bit-for-bit identical
//! - **Trust injection**: per-record CA certificates extend the system
//!   trust pool
//! - **Careful error classification**: HTTP 429/5xx re-enqueue with
//!   backoff, everything else surfaces as a status condition
//! - **Prometheus metrics** and health probes

pub mod artifact;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod leader;
pub mod mavenmetadata;
pub mod observability;
pub mod server;
pub mod transport;
