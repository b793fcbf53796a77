//! # Maven Artifact Fetch
//!
//! Downloads the resolved artifact, verifies it against the remote SHA-1,
//! repackages it as a deterministic tar.gz and publishes it under the
//! artifact root. A sidecar file next to the artifact records the source
//! URL and remote checksum so unchanged artifacts are skipped on later
//! reconciles.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{SecondsFormat, Utc};
use tokio::time::{timeout_at, Instant};
use tracing::{error, info};

use crate::artifact::{archive, ArtifactStore, ChecksumCache, SourceKind};
use crate::controller::download::{fetch_bytes, fetch_to_file, BasicAuth};
use crate::controller::maven::resolver::ArtifactDetails;
use crate::controller::{ArtifactUpdate, Context, Error, StepOutcome};
use crate::crd::{
    preserve_artifact_last_update_time, Artifact, Condition, MavenArtifact,
    CONDITION_ARTIFACT_AVAILABLE, MAVEN_ARTIFACT_CONDITIONS,
};

/// Download, verify, package and publish the resolved artifact, updating
/// `ArtifactAvailable` and the artifact status fields. The whole stage
/// shares one deadline.
#[allow(clippy::too_many_arguments)]
pub async fn fetch_artifact(
    ctx: &Context,
    record: &MavenArtifact,
    namespace: &str,
    name: &str,
    client: &reqwest::Client,
    auth: Option<&BasicAuth>,
    details: &ArtifactDetails,
    status_artifact: Option<&Artifact>,
    conditions: &mut Vec<Condition>,
    generation: i64,
    deadline: Instant,
) -> Result<StepOutcome<ArtifactUpdate>, Error> {
    let mark_false = |conditions: &mut Vec<Condition>, reason: &str, message: &str| {
        MAVEN_ARTIFACT_CONDITIONS.mark_false(
            conditions,
            CONDITION_ARTIFACT_AVAILABLE,
            reason,
            message,
            generation,
        );
    };

    // remote checksum first; it also drives the skip-on-unchanged check
    let checksum_url = format!("{}.sha1", details.download_url);
    let remote_checksum = match timeout_at(deadline, fetch_bytes(client, &checksum_url, auth)).await
    {
        Err(elapsed) => {
            mark_false(
                conditions,
                "Timeout",
                &format!(
                    "Request timeout error downloading Maven artifact checksum file \"{checksum_url}\": {elapsed}"
                ),
            );
            return Ok(StepOutcome::Halt);
        }
        Ok(Err(e)) if e.is_retryable() => {
            error!(url = %checksum_url, error = %e, "error downloading artifact checksum");
            return Err(Error::ReconcileFailed(anyhow::Error::new(e)));
        }
        Ok(Err(e)) => {
            error!(url = %checksum_url, error = %e, "error downloading artifact checksum");
            let message = match e.status() {
                Some(401) => format!(
                    "Unauthorized credentials (HTTP 401) error downloading Maven artifact checksum from URL \"{checksum_url}\". Check the credentials provided in the Secret."
                ),
                Some(404) => format!(
                    "Maven artifact checksum file not found (HTTP 404) at URL \"{checksum_url}\"."
                ),
                _ => format!(
                    "Error downloading Maven artifact checksum from URL \"{checksum_url}\": {e}"
                ),
            };
            mark_false(conditions, "RemoteError", &message);
            return Ok(StepOutcome::Halt);
        }
        Ok(Ok(body)) => String::from_utf8_lossy(&body).trim().to_string(),
    };

    // skip when the sidecar still matches the remote state and the record
    // already reports an artifact
    let sidecar = ctx
        .store
        .record_dir(SourceKind::MavenArtifact, namespace, name)
        .join(format!("{}.sha1", details.resolved_filename));
    if let Some(cache) = ChecksumCache::read(&sidecar).await? {
        if status_artifact.is_some()
            && cache.checksum == remote_checksum
            && cache.source == details.download_url
        {
            info!(checksum = %remote_checksum, "download skipped, checksum unchanged");
            return Ok(StepOutcome::Continue(ArtifactUpdate::Unchanged));
        }
    }

    // scratch download
    let scratch = tempfile::tempdir().context("unable to create scratch directory")?;
    let download_dir = scratch.path().join("artifact");
    tokio::fs::create_dir_all(&download_dir)
        .await
        .context("unable to create scratch artifact directory")?;
    let artifact_file = download_dir.join(&details.resolved_filename);

    match timeout_at(
        deadline,
        fetch_to_file(client, &details.download_url, auth, &artifact_file),
    )
    .await
    {
        Err(elapsed) => {
            mark_false(
                conditions,
                "Timeout",
                &format!(
                    "Request timeout error downloading Maven artifact file \"{}\": {elapsed}",
                    record.spec.artifact.artifact_id
                ),
            );
            return Ok(StepOutcome::Halt);
        }
        Ok(Err(e)) if e.is_retryable() => {
            error!(url = %details.download_url, error = %e, "error downloading Maven artifact file");
            return Err(Error::ReconcileFailed(anyhow::Error::new(e)));
        }
        Ok(Err(e)) => {
            error!(url = %details.download_url, error = %e, "error downloading Maven artifact file");
            let url = &details.download_url;
            let message = match e.status() {
                Some(401) => format!(
                    "Unauthorized credentials (HTTP 401) error downloading Maven artifact file from URL \"{url}\". Check the credentials provided in the Secret."
                ),
                Some(404) => format!("Maven artifact file not found (HTTP 404) at URL \"{url}\"."),
                _ => format!("Error downloading Maven artifact file from URL \"{url}\": {e}"),
            };
            mark_false(conditions, "DownloadError", &message);
            return Ok(StepOutcome::Halt);
        }
        Ok(Ok(())) => {}
    }

    // verify and package off the async runtime
    let packaged = {
        let scratch_dir = scratch.path().to_path_buf();
        let artifact_file = artifact_file.clone();
        let filename = details.resolved_filename.clone();
        let expected = remote_checksum.clone();
        tokio::task::spawn_blocking(move || {
            package_artifact(&scratch_dir, &artifact_file, &filename, &expected)
        })
        .await
        .context("packaging task failed")?
    };

    let packaged = match packaged {
        Ok(packaged) => packaged,
        Err(PackageError::ChecksumMismatch { computed, expected }) => {
            mark_false(
                conditions,
                "DownloadError",
                &format!(
                    "Checksum ({computed}) of downloaded Maven artifact file \"{}\" does not match expected remote checksum ({expected}). This file may have been tampered with in transit!",
                    details.resolved_filename
                ),
            );
            return Ok(StepOutcome::Halt);
        }
        Err(PackageError::Extract(e)) => {
            error!(file = %details.resolved_filename, error = %e, "failed to extract");
            mark_false(
                conditions,
                "FileError",
                &format!(
                    "Failed to extract Maven artifact file \"{}\"",
                    details.resolved_filename
                ),
            );
            return Ok(StepOutcome::Halt);
        }
        Err(PackageError::Internal(e)) => return Err(Error::ReconcileFailed(e)),
    };

    // publish and persist the sidecar for the next reconcile
    let http_path = ArtifactStore::http_path(
        SourceKind::MavenArtifact,
        namespace,
        name,
        &packaged.tgz_filename,
    );
    let url = ctx.store.url(&http_path);
    ctx.store.publish(&packaged.tgz_path, &http_path).await?;
    ChecksumCache {
        source: details.download_url.clone(),
        checksum: remote_checksum,
    }
    .write(&sidecar)
    .await?;

    let desired = Artifact {
        checksum: packaged.checksum,
        revision: details.resolved_filename.clone(),
        path: http_path,
        url: url.clone(),
        last_update_time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    };
    let artifact = preserve_artifact_last_update_time(status_artifact, desired);

    MAVEN_ARTIFACT_CONDITIONS.mark_true(
        conditions,
        CONDITION_ARTIFACT_AVAILABLE,
        "Available",
        "",
        generation,
    );
    Ok(StepOutcome::Continue(ArtifactUpdate::Published {
        artifact,
        url,
    }))
}

struct PackagedArtifact {
    tgz_path: PathBuf,
    tgz_filename: String,
    checksum: String,
}

enum PackageError {
    ChecksumMismatch { computed: String, expected: String },
    Extract(anyhow::Error),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for PackageError {
    fn from(e: anyhow::Error) -> Self {
        PackageError::Internal(e)
    }
}

/// Verify the downloaded file and package it (or its extracted contents)
/// as a deterministic tar.gz named after the file's SHA-1.
fn package_artifact(
    scratch_dir: &Path,
    artifact_file: &Path,
    filename: &str,
    expected_checksum: &str,
) -> Result<PackagedArtifact, PackageError> {
    archive::set_epoch_mtime(artifact_file)?;

    let file_checksum = archive::sha1_checksum(artifact_file)?;
    if file_checksum != expected_checksum {
        return Err(PackageError::ChecksumMismatch {
            computed: file_checksum,
            expected: expected_checksum.to_string(),
        });
    }

    // archives are unpacked so the published tar.gz holds their contents;
    // anything else ships as the single downloaded file
    let content_dir = if archive::is_zip_archive(artifact_file) {
        let extracted = scratch_dir.join("extracted-artifact");
        archive::extract_zip(artifact_file, &extracted).map_err(PackageError::Extract)?;
        extracted
    } else {
        artifact_file
            .parent()
            .context("artifact file has no parent")?
            .to_path_buf()
    };

    let tgz_dir = scratch_dir.join("artifact-tgz");
    std::fs::create_dir_all(&tgz_dir)
        .with_context(|| format!("unable to create {}", tgz_dir.display()))?;
    let tgz_filename = format!("{file_checksum}.tar.gz");
    let tgz_path = tgz_dir.join(&tgz_filename);

    archive::create_tar_gz(&content_dir, &tgz_path).with_context(|| {
        format!("Error creating tar file for Maven artifact file \"{filename}\"")
    })?;

    let checksum = archive::sha1_checksum(&tgz_path)?;
    Ok(PackagedArtifact {
        tgz_path,
        tgz_filename,
        checksum,
    })
}
