//! # ImageRepository Controller
//!
//! Reconciliation pipeline for ImageRepository records:
//!
//! 1. Build the trust-augmented registry client
//! 2. Collect pull secrets via the service account plus the record's
//!    explicit list (`credentials.rs`)
//! 3. Resolve the reference to a digest (`resolve.rs`)
//! 4. Pull the image, package it and publish the artifact (`pull.rs`)
//! 5. Update status and requeue after the record's interval

pub mod credentials;
pub mod pull;
pub mod reconcile;
pub mod resolve;

pub use reconcile::reconcile;
