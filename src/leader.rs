//! # Leader Election
//!
//! Minimal coordination/v1 Lease election. When `--leader-elect` is set the
//! process blocks until it holds the lease, then renews it in the
//! background so only one controller manager is active at a time.

use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::{debug, info, warn};

use crate::constants::{LEADER_ELECTION_LEASE, LEASE_DURATION_SECONDS};

/// Block until this process holds the election lease, then keep renewing
/// it in a background task.
pub async fn ensure_leadership(client: Client, namespace: &str, identity: &str) -> Result<()> {
    let leases: Api<Lease> = Api::namespaced(client, namespace);

    info!(identity, "attempting to acquire leader lease");
    loop {
        match try_acquire(&leases, identity).await {
            Ok(true) => break,
            Ok(false) => {
                debug!("lease held by another instance, retrying");
                tokio::time::sleep(Duration::from_secs(LEASE_DURATION_SECONDS as u64 / 3)).await;
            }
            Err(e) => {
                warn!("lease acquisition failed: {e}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
    info!(identity, "acquired leader lease");

    let renew_identity = identity.to_string();
    tokio::spawn(async move {
        let interval = Duration::from_secs(LEASE_DURATION_SECONDS as u64 / 3);
        loop {
            tokio::time::sleep(interval).await;
            if let Err(e) = renew(&leases, &renew_identity).await {
                warn!("lease renewal failed: {e}");
            }
        }
    });
    Ok(())
}

fn desired_spec(identity: &str, transitions: Option<i32>) -> LeaseSpec {
    LeaseSpec {
        holder_identity: Some(identity.to_string()),
        lease_duration_seconds: Some(LEASE_DURATION_SECONDS),
        acquire_time: Some(MicroTime(Utc::now())),
        renew_time: Some(MicroTime(Utc::now())),
        lease_transitions: transitions,
        ..Default::default()
    }
}

async fn try_acquire(leases: &Api<Lease>, identity: &str) -> Result<bool> {
    match leases.get_opt(LEADER_ELECTION_LEASE).await? {
        None => {
            let lease = Lease {
                metadata: kube::api::ObjectMeta {
                    name: Some(LEADER_ELECTION_LEASE.to_string()),
                    ..Default::default()
                },
                spec: Some(desired_spec(identity, Some(0))),
            };
            match leases.create(&PostParams::default(), &lease).await {
                Ok(_) => Ok(true),
                Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
                Err(e) => Err(e).context("unable to create lease"),
            }
        }
        Some(existing) => {
            let spec = existing.spec.unwrap_or_default();
            let holder = spec.holder_identity.as_deref().unwrap_or_default();
            if holder == identity {
                return Ok(true);
            }

            let expired = spec
                .renew_time
                .as_ref()
                .map(|t| {
                    let age = Utc::now() - t.0;
                    age.num_seconds()
                        > i64::from(spec.lease_duration_seconds.unwrap_or(LEASE_DURATION_SECONDS))
                })
                .unwrap_or(true);
            if !expired {
                return Ok(false);
            }

            let transitions = spec.lease_transitions.unwrap_or(0) + 1;
            let patch = Lease {
                metadata: Default::default(),
                spec: Some(desired_spec(identity, Some(transitions))),
            };
            leases
                .patch(
                    LEADER_ELECTION_LEASE,
                    &PatchParams::default(),
                    &Patch::Merge(&patch),
                )
                .await
                .context("unable to take over expired lease")?;
            Ok(true)
        }
    }
}

async fn renew(leases: &Api<Lease>, identity: &str) -> Result<()> {
    let patch = serde_json::json!({
        "spec": {
            "holderIdentity": identity,
            "renewTime": MicroTime(Utc::now()),
        }
    });
    leases
        .patch(
            LEADER_ELECTION_LEASE,
            &PatchParams::default(),
            &Patch::Merge(&patch),
        )
        .await
        .context("unable to renew lease")?;
    Ok(())
}
