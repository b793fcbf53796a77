//! # MavenArtifact Controller
//!
//! Reconciliation pipeline for MavenArtifact records:
//!
//! 1. Validate the admitted record shape
//! 2. Resolve the repository auth secret (`credentials.rs`)
//! 3. Build the trust-augmented HTTP client
//! 4. Resolve the symbolic version against `maven-metadata.xml`
//!    (`resolver.rs`)
//! 5. Download, verify, package and publish the artifact (`fetch.rs`)
//! 6. Update status and requeue after the record's interval

pub mod credentials;
pub mod fetch;
pub mod reconcile;
pub mod resolver;

pub use reconcile::reconcile;
