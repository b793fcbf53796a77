//! # Constants
//!
//! Shared constants used throughout the controller.

use std::time::Duration;

/// Finalizer attached to every source record.
/// Removed only after the record's artifact subdirectory has been deleted.
pub const SOURCE_FINALIZER: &str = "source.artifacts.dev/finalizer";

/// Service account consulted for image pull secrets when the record does not name one
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";

/// Requeue interval for an ImageRepository without a spec interval, and the
/// fallback when a stored interval no longer parses. A zero requeue-after
/// would suppress periodic reconciliation entirely, so a documented default
/// is applied instead.
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(600);

/// Attempts for a status patch that hits a write conflict
pub const STATUS_PATCH_ATTEMPTS: u32 = 3;

/// Minimum backoff for retryable reconcile errors (seconds)
pub const ERROR_BACKOFF_MIN_SECS: u64 = 1;

/// Maximum backoff for retryable reconcile errors (seconds)
pub const ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Lease name used for leader election
pub const LEADER_ELECTION_LEASE: &str = "source-controller-leader-election";

/// Seconds a leader lease is held before it can be taken over
pub const LEASE_DURATION_SECONDS: i32 = 15;
