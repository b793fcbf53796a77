//! # Controllers
//!
//! Reconciliation pipelines for the two source kinds plus the
//! infrastructure they share: the reconciler context, the error model, the
//! HTTP download helpers with retryable-vs-condition classification, and
//! the Fibonacci backoff applied to retryable errors.
//!
//! ## Reconciliation Flow
//!
//! Each reconcile runs a fixed stage sequence (trust → credentials →
//! reference → fetch → requeue). A stage either continues with a value,
//! halts the pipeline after marking a terminal condition `False` (no error,
//! no backoff), or fails with a retryable error that reaches the
//! controller's error policy. The computed status is written in all three
//! cases.

pub mod backoff;
pub mod download;
pub mod image;
pub mod maven;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use kube_runtime::controller::Action;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::artifact::ArtifactStore;
use crate::constants;
use crate::crd::SourceStatus;
use crate::observability::metrics;
use crate::transport::CertSource;
use backoff::FibonacciBackoff;

#[derive(Debug, Error)]
pub enum Error {
    #[error("reconciliation failed: {0}")]
    ReconcileFailed(#[from] anyhow::Error),
    #[error("finalizer failed: {0}")]
    Finalizer(#[source] Box<kube_runtime::finalizer::Error<Error>>),
}

/// Outcome of one pipeline stage
pub enum StepOutcome<T> {
    /// Stage produced a value for downstream stages
    Continue(T),
    /// Stage marked a terminal condition; stop without error so the record
    /// is not re-enqueued with backoff
    Halt,
}

/// Result of a completed fetch stage
pub enum ArtifactUpdate {
    /// The published artifact already matches the remote state; status is
    /// left untouched
    Unchanged,
    /// A new artifact was placed in the store
    Published {
        artifact: crate::crd::Artifact,
        url: String,
    },
}

/// Shared state for both controllers. Per-reconcile values (HTTP client,
/// credentials, resolved reference) are not stored here; they are threaded
/// through the pipeline of a single reconcile.
pub struct Context {
    pub client: Client,
    pub store: ArtifactStore,
    /// CAs configured at process start (`--ca-cert-path`)
    pub certs: Vec<CertSource>,
    /// Per-record backoff state for retryable errors, keyed by
    /// `<kind>/<namespace>/<name>`
    backoffs: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl Context {
    pub fn new(client: Client, store: ArtifactStore, certs: Vec<CertSource>) -> Self {
        Self {
            client,
            store,
            certs,
            backoffs: Mutex::new(HashMap::new()),
        }
    }

    fn next_backoff(&self, key: &str) -> std::time::Duration {
        let mut backoffs = self.backoffs.lock().expect("backoff lock poisoned");
        backoffs
            .entry(key.to_string())
            .or_insert_with(|| {
                FibonacciBackoff::new(
                    constants::ERROR_BACKOFF_MIN_SECS,
                    constants::ERROR_BACKOFF_MAX_SECS,
                )
            })
            .next_backoff()
    }

    /// Reset the backoff sequence after a reconcile that returned no error
    pub(crate) fn reset_backoff(&self, key: &str) {
        if let Ok(mut backoffs) = self.backoffs.lock() {
            backoffs.remove(key);
        }
    }
}

/// Error policy shared by both controllers: retryable errors re-enqueue
/// with a per-record Fibonacci backoff.
pub fn error_policy<K: kube::Resource<DynamicType = ()>>(
    obj: Arc<K>,
    error: &Error,
    ctx: Arc<Context>,
) -> Action {
    let kind = K::kind(&()).to_string().to_lowercase();
    let key = format!(
        "{}/{}/{}",
        kind,
        obj.meta().namespace.as_deref().unwrap_or_default(),
        obj.meta().name.as_deref().unwrap_or_default()
    );

    error!(record = %key, %error, "reconciliation error");
    metrics::increment_reconciliation_errors();

    let delay = ctx.next_backoff(&key);
    info!(record = %key, delay_secs = delay.as_secs(), "re-enqueueing with backoff");
    metrics::increment_requeues("error-backoff");
    Action::requeue(delay)
}

/// Write a record's status with a merge patch against the status
/// subresource, retrying a bounded number of times on write conflicts.
pub async fn patch_status<K>(api: &Api<K>, name: &str, status: &SourceStatus) -> anyhow::Result<()>
where
    K: kube::Resource + Clone + std::fmt::Debug + DeserializeOwned,
{
    let patch = serde_json::json!({ "status": status });
    let params = PatchParams::default();

    let mut attempt = 0;
    loop {
        attempt += 1;
        match api.patch_status(name, &params, &Patch::Merge(&patch)).await {
            Ok(_) => return Ok(()),
            Err(kube::Error::Api(ae))
                if ae.code == 409 && attempt < constants::STATUS_PATCH_ATTEMPTS =>
            {
                warn!(name, attempt, "status write conflict, retrying");
                continue;
            }
            Err(e) => return Err(anyhow::anyhow!("unable to update status of {name}: {e}")),
        }
    }
}
