//! # ImageRepository Reconciliation
//!
//! Per-record pipeline: trust → pull credentials → digest resolution →
//! pull/package → status write → interval requeue. The finalizer removes
//! the record's artifact subdirectory before deletion is acknowledged.

use std::sync::Arc;
use std::time::Instant;

use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Event};
use tracing::{info, warn};

use crate::artifact::SourceKind;
use crate::constants;
use crate::controller::image::credentials::{collect_pull_secrets, Keychain};
use crate::controller::image::pull::sync_image_artifact;
use crate::controller::image::resolve::{registry_client, resolve_image_ref};
use crate::controller::{patch_status, ArtifactUpdate, Context, Error, StepOutcome};
use crate::crd::validation::parse_duration;
use crate::crd::{ImageRepository, SourceStatus, IMAGE_REPOSITORY_CONDITIONS};
use crate::observability::metrics;

/// Reconcile one ImageRepository record
pub async fn reconcile(record: Arc<ImageRepository>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = record.namespace().unwrap_or_default();
    let api: Api<ImageRepository> = Api::namespaced(ctx.client.clone(), &namespace);

    finalizer(&api, constants::SOURCE_FINALIZER, record, |event| {
        let ctx = Arc::clone(&ctx);
        async move {
            match event {
                Event::Apply(record) => apply(record, &ctx).await,
                Event::Cleanup(record) => cleanup(record, &ctx).await,
            }
        }
    })
    .await
    .map_err(|e| Error::Finalizer(Box::new(e)))
}

async fn apply(record: Arc<ImageRepository>, ctx: &Context) -> Result<Action, Error> {
    let start = Instant::now();
    let namespace = record.namespace().unwrap_or_default();
    let name = record.name_any();
    let generation = record.metadata.generation.unwrap_or(0);

    info!(
        image = %record.spec.image,
        record = %format!("{namespace}/{name}"),
        "reconciling ImageRepository"
    );
    metrics::increment_reconciliations();

    let mut status = record.status.clone().unwrap_or_default();
    IMAGE_REPOSITORY_CONDITIONS.initialize(&mut status.conditions, generation);

    let pipeline = run_pipeline(&record, ctx, &namespace, &name, &mut status, generation).await;

    status.observed_generation = Some(generation);
    IMAGE_REPOSITORY_CONDITIONS.recompute_ready(&mut status.conditions, generation);

    let api: Api<ImageRepository> = Api::namespaced(ctx.client.clone(), &namespace);
    patch_status(&api, &name, &status).await?;
    metrics::observe_reconcile_duration(start.elapsed().as_secs_f64());

    pipeline?;

    ctx.reset_backoff(&format!("imagerepository/{namespace}/{name}"));
    let interval = match record.spec.interval.as_deref().filter(|i| !i.is_empty()) {
        Some(interval) => parse_duration(interval).unwrap_or_else(|e| {
            warn!(interval, error = %e, "invalid interval, using default");
            constants::DEFAULT_REQUEUE_INTERVAL
        }),
        None => constants::DEFAULT_REQUEUE_INTERVAL,
    };
    metrics::increment_requeues("interval");
    Ok(Action::requeue(interval))
}

async fn cleanup(record: Arc<ImageRepository>, ctx: &Context) -> Result<Action, Error> {
    let namespace = record.namespace().unwrap_or_default();
    ctx.store
        .cleanup(SourceKind::ImageRepository, &namespace, &record.name_any())
        .await?;
    Ok(Action::await_change())
}

async fn run_pipeline(
    record: &ImageRepository,
    ctx: &Context,
    namespace: &str,
    name: &str,
    status: &mut SourceStatus,
    generation: i64,
) -> Result<(), Error> {
    // trust & transport (C1)
    let client = registry_client(&ctx.certs)?;

    // pull secrets via the service account plus the explicit list (C2)
    let pull_secrets =
        match collect_pull_secrets(ctx, record, namespace, &mut status.conditions, generation)
            .await?
        {
            StepOutcome::Continue(secrets) => secrets,
            StepOutcome::Halt => return Ok(()),
        };
    let keychain = Keychain::from_pull_secrets(&pull_secrets).with_ambient();

    // tag → digest (C3)
    let image_ref = match resolve_image_ref(
        record,
        &client,
        &keychain,
        &mut status.conditions,
        generation,
    )
    .await?
    {
        StepOutcome::Continue(image_ref) => image_ref,
        StepOutcome::Halt => return Ok(()),
    };

    // pull & package (C4)
    let update = match sync_image_artifact(
        ctx,
        record,
        namespace,
        name,
        &image_ref,
        &client,
        &keychain,
        &mut status.conditions,
        generation,
    )
    .await?
    {
        StepOutcome::Continue(update) => update,
        StepOutcome::Halt => return Ok(()),
    };

    if let ArtifactUpdate::Published { artifact, url } = update {
        status.artifact = Some(artifact);
        status.url = Some(url);
    }
    Ok(())
}
