//! # MavenArtifact Reconciliation
//!
//! Per-record pipeline: admitted-shape validation → credentials → trust →
//! version resolution → fetch/package → status write → interval requeue.
//! Conditions carry every classified failure; only retryable failures
//! (HTTP 429/5xx, internal errors) reach the error policy.

use std::sync::Arc;
use std::time::Instant;

use kube::api::Api;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use kube_runtime::finalizer::{finalizer, Event};
use tracing::{error, info};

use crate::artifact::SourceKind;
use crate::constants;
use crate::controller::maven::credentials::resolve_credentials;
use crate::controller::maven::fetch::fetch_artifact;
use crate::controller::maven::resolver::{ArtifactDetails, MavenResolver, ResolveError};
use crate::controller::{patch_status, ArtifactUpdate, Context, Error, StepOutcome};
use crate::crd::validation::{parse_duration, validate_maven_artifact};
use crate::crd::{
    MavenArtifact, SourceStatus, CONDITION_ARTIFACT_VERSION_RESOLVED, MAVEN_ARTIFACT_CONDITIONS,
};
use crate::observability::metrics;
use crate::transport::{build_http_client, CertSource};

/// Reconcile one MavenArtifact record
pub async fn reconcile(record: Arc<MavenArtifact>, ctx: Arc<Context>) -> Result<Action, Error> {
    let namespace = record.namespace().unwrap_or_default();
    let api: Api<MavenArtifact> = Api::namespaced(ctx.client.clone(), &namespace);

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

async fn apply(record: Arc<MavenArtifact>, ctx: &Context) -> Result<Action, Error> {
    let start = Instant::now();
    let namespace = record.namespace().unwrap_or_default();
    let name = record.name_any();
    let generation = record.metadata.generation.unwrap_or(0);

    info!(
        artifact = %record.spec.artifact.artifact_id,
        record = %format!("{namespace}/{name}"),
        "reconciling MavenArtifact"
    );
    metrics::increment_reconciliations();

    let mut status = record.status.clone().unwrap_or_default();
    MAVEN_ARTIFACT_CONDITIONS.initialize(&mut status.conditions, generation);

    let pipeline = run_pipeline(&record, ctx, &namespace, &name, &mut status, generation).await;

    status.observed_generation = Some(generation);
    MAVEN_ARTIFACT_CONDITIONS.recompute_ready(&mut status.conditions, generation);

    let api: Api<MavenArtifact> = Api::namespaced(ctx.client.clone(), &namespace);
    patch_status(&api, &name, &status).await?;
    metrics::observe_reconcile_duration(start.elapsed().as_secs_f64());

    // the status carries the failure; a retryable error still re-enqueues
    pipeline?;

    ctx.reset_backoff(&format!("mavenartifact/{namespace}/{name}"));
    let interval = parse_duration(&record.spec.interval)
        .unwrap_or(constants::DEFAULT_REQUEUE_INTERVAL);
    metrics::increment_requeues("interval");
    Ok(Action::requeue(interval))
}

async fn cleanup(record: Arc<MavenArtifact>, ctx: &Context) -> Result<Action, Error> {
    let namespace = record.namespace().unwrap_or_default();
    ctx.store
        .cleanup(SourceKind::MavenArtifact, &namespace, &record.name_any())
        .await?;
    Ok(Action::await_change())
}

async fn run_pipeline(
    record: &MavenArtifact,
    ctx: &Context,
    namespace: &str,
    name: &str,
    status: &mut SourceStatus,
    generation: i64,
) -> Result<(), Error> {
    // admitted shape first; a record that slipped past admission gets a
    // condition instead of undefined behavior. Version ranges are left to
    // the resolver, which classifies them as VersionError.
    let version = &record.spec.artifact.version;
    let is_range = version.starts_with('[') || version.starts_with('(');
    if !is_range {
        if let Err(e) = validate_maven_artifact(&record.spec) {
            MAVEN_ARTIFACT_CONDITIONS.mark_false(
                &mut status.conditions,
                CONDITION_ARTIFACT_VERSION_RESOLVED,
                "ConfigurationError",
                &e.to_string(),
                generation,
            );
            return Ok(());
        }
    }

    // credentials (C2)
    let credentials =
        match resolve_credentials(ctx, record, namespace, &mut status.conditions, generation)
            .await?
        {
            StepOutcome::Continue(credentials) => credentials,
            StepOutcome::Halt => return Ok(()),
        };

    // trust & transport (C1), augmented with the secret's CA
    let mut certs = ctx.certs.clone();
    if let Some(ca) = &credentials.ca {
        certs.push(CertSource::Pem(ca.clone()));
    }
    let client = build_http_client(&certs)?;

    let timeout = parse_duration(record.effective_timeout())
        .unwrap_or(constants::DEFAULT_REQUEUE_INTERVAL);

    // version resolution (C3)
    let details = match resolve_version(
        record,
        &client,
        &credentials,
        status,
        generation,
        timeout,
    )
    .await?
    {
        StepOutcome::Continue(details) => details,
        StepOutcome::Halt => return Ok(()),
    };

    // fetch & package (C4); checksum and file download share one deadline
    let deadline = tokio::time::Instant::now() + timeout;
    let update = match fetch_artifact(
        ctx,
        record,
        namespace,
        name,
        &client,
        credentials.auth.as_ref(),
        &details,
        record.status.as_ref().and_then(|s| s.artifact.as_ref()),
        &mut status.conditions,
        generation,
        deadline,
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

async fn resolve_version(
    record: &MavenArtifact,
    client: &reqwest::Client,
    credentials: &crate::controller::maven::credentials::MavenCredentials,
    status: &mut SourceStatus,
    generation: i64,
    timeout: std::time::Duration,
) -> Result<StepOutcome<ArtifactDetails>, Error> {
    let group_id = &record.spec.artifact.group_id;
    let artifact_id = &record.spec.artifact.artifact_id;
    let repo_url = &record.spec.repository.url;

    let mark_false = |status: &mut SourceStatus, reason: &str, message: &str| {
        MAVEN_ARTIFACT_CONDITIONS.mark_false(
            &mut status.conditions,
            CONDITION_ARTIFACT_VERSION_RESOLVED,
            reason,
            message,
            generation,
        );
    };

    // repository URL must parse and be https
    match reqwest::Url::parse(repo_url) {
        Err(e) => {
            mark_false(
                status,
                "ConfigurationError",
                &format!("Error parsing repository URL \"{repo_url}\": {e}"),
            );
            return Ok(StepOutcome::Halt);
        }
        Ok(url) if url.scheme() != "https" => {
            mark_false(
                status,
                "ConfigurationError",
                &format!(
                    "The only supported scheme is \"https\"; scheme \"{}\" is not supported in repository URL \"{repo_url}\"",
                    url.scheme()
                ),
            );
            return Ok(StepOutcome::Halt);
        }
        Ok(_) => {}
    }

    let mut artifact = record.spec.artifact.clone();
    if artifact.r#type.as_deref().unwrap_or_default().is_empty() {
        artifact.r#type = Some("jar".to_string());
    }
    let mut resolver = MavenResolver::new(artifact, repo_url);

    match tokio::time::timeout(
        timeout,
        resolver.resolve(client, credentials.auth.as_ref()),
    )
    .await
    {
        Err(elapsed) => {
            mark_false(
                status,
                "Timeout",
                &format!(
                    "Request timeout error downloading Maven artifact metadata \"{group_id}:{artifact_id}\" from repository URL \"{repo_url}\": {elapsed}"
                ),
            );
            Ok(StepOutcome::Halt)
        }
        Ok(Err(ResolveError::Download(e))) if e.is_retryable() => {
            error!(status_code = ?e.status(), error = %e, "error downloading artifact metadata");
            Err(Error::ReconcileFailed(anyhow::Error::new(e)))
        }
        Ok(Err(ResolveError::Download(e))) => {
            error!(status_code = ?e.status(), error = %e, "error downloading artifact metadata");
            let message = match e.status() {
                Some(401) => format!(
                    "Unauthorized credentials (HTTP 401) error downloading artifact metadata \"{group_id}:{artifact_id}\" from repository URL \"{repo_url}\". Check the credentials provided in the Secret."
                ),
                Some(404) => format!(
                    "Maven metadata file not found (HTTP 404) for artifact \"{group_id}:{artifact_id}\" from repository URL \"{repo_url}\"."
                ),
                _ => format!(
                    "Error downloading Maven artifact metadata \"{group_id}:{artifact_id}\" from repository URL \"{repo_url}\": {e}"
                ),
            };
            mark_false(status, "RemoteError", &message);
            Ok(StepOutcome::Halt)
        }
        Ok(Err(ResolveError::Version(message))) => {
            mark_false(status, "VersionError", &message);
            Ok(StepOutcome::Halt)
        }
        Ok(Ok(())) => {
            let details = resolver.details();
            info!(
                artifact = %resolver.artifact.artifact_id,
                resolved_version = %resolver.resolved_version,
                "artifact version resolved"
            );
            MAVEN_ARTIFACT_CONDITIONS.mark_true(
                &mut status.conditions,
                CONDITION_ARTIFACT_VERSION_RESOLVED,
                "Resolved",
                &format!(
                    "Resolved version \"{}\" for artifact \"{}\"",
                    details.artifact_version, details.download_url
                ),
                generation,
            );
            Ok(StepOutcome::Continue(details))
        }
    }
}
