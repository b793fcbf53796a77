//! # Artifact Packaging & Storage
//!
//! Turns fetched source bytes into deterministic tar.gz archives and places
//! them in the content-addressed artifact tree served over HTTP.
//!
//! - `archive.rs` - deterministic tar.gz creation, ZIP detection and
//!   extraction, SHA-1 checksums
//! - `store.rs` - content-addressed layout, rename-into-place publication,
//!   sidecar checksum cache, per-record cleanup

pub mod archive;
pub mod store;

pub use store::{ArtifactStore, ChecksumCache, SourceKind};
