//! # Image Pull & Package
//!
//! Materializes a resolved image reference as a tar.gz under the artifact
//! root. The artifact is addressed by the digest hex, so an unchanged
//! digest with a current status URL skips the pull entirely.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::{SecondsFormat, Utc};
use flate2::read::GzDecoder;
use oci_distribution::manifest;
use oci_distribution::{Client as RegistryClient, Reference};
use tracing::{error, info};

use crate::artifact::{archive, ArtifactStore, SourceKind};
use crate::controller::image::credentials::Keychain;
use crate::controller::{ArtifactUpdate, Context, Error, StepOutcome};
use crate::crd::{
    condition_is_unknown, preserve_artifact_last_update_time, Artifact, Condition, ImageRepository,
    CONDITION_ARTIFACT_AVAILABLE, CONDITION_IMAGE_RESOLVED, IMAGE_REPOSITORY_CONDITIONS,
};

/// Pull the resolved image and publish it as a tar.gz, or skip when the
/// artifact and status already match the computed URL.
#[allow(clippy::too_many_arguments)]
pub async fn sync_image_artifact(
    ctx: &Context,
    record: &ImageRepository,
    namespace: &str,
    name: &str,
    image_ref: &str,
    client: &RegistryClient,
    keychain: &Keychain,
    conditions: &mut Vec<Condition>,
    generation: i64,
) -> Result<StepOutcome<ArtifactUpdate>, Error> {
    let digest_hex = image_ref
        .split_once("@sha256:")
        .map(|(_, hex)| hex)
        .ok_or_else(|| {
            Error::ReconcileFailed(anyhow::anyhow!(
                "image reference {image_ref:?} carries no sha256 digest"
            ))
        })?;

    let filename = format!("{digest_hex}.tar.gz");
    let http_path = ArtifactStore::http_path(SourceKind::ImageRepository, namespace, name, &filename);
    let url = ctx.store.url(&http_path);

    // skip when the file exists and both published URLs still point at it;
    // a rotated artifact host falls through and rewrites the status
    let current_status = record.status.as_ref();
    let file_exists = tokio::fs::try_exists(ctx.store.local_path(&http_path))
        .await
        .unwrap_or(false);
    if file_exists
        && current_status.and_then(|s| s.url.as_deref()) == Some(url.as_str())
        && current_status
            .and_then(|s| s.artifact.as_ref())
            .map(|a| a.url.as_str())
            == Some(url.as_str())
    {
        info!(image = %image_ref, "artifact already exists, skipping");
        if condition_is_unknown(conditions, CONDITION_IMAGE_RESOLVED) {
            // making it this far with ImageResolved unknown means it holds
            IMAGE_REPOSITORY_CONDITIONS.mark_true(
                conditions,
                CONDITION_IMAGE_RESOLVED,
                "Resolved",
                "",
                generation,
            );
        }
        IMAGE_REPOSITORY_CONDITIONS.mark_true(
            conditions,
            CONDITION_ARTIFACT_AVAILABLE,
            "Available",
            "",
            generation,
        );
        return Ok(StepOutcome::Continue(ArtifactUpdate::Unchanged));
    }

    // pull into scratch space
    let scratch = tempfile::tempdir().context("unable to create scratch directory")?;
    let image_dir = scratch.path().join("artifact");
    tokio::fs::create_dir_all(&image_dir)
        .await
        .context("unable to create scratch image directory")?;

    info!(image = %image_ref, directory = %image_dir.display(), "pulling image");
    if let Err(e) = pull_image(client, keychain, image_ref, &image_dir).await {
        error!(image = %image_ref, error = %e, "unable to pull image");
        IMAGE_REPOSITORY_CONDITIONS.mark_false(
            conditions,
            CONDITION_IMAGE_RESOLVED,
            "RemoteError",
            &format!("Unable to pull image \"{}\": {e}", record.spec.image),
            generation,
        );
        return Ok(StepOutcome::Halt);
    }
    IMAGE_REPOSITORY_CONDITIONS.mark_true(
        conditions,
        CONDITION_IMAGE_RESOLVED,
        "Resolved",
        "",
        generation,
    );

    // package and checksum off the async runtime
    let (tgz_path, checksum) = {
        let scratch_dir = scratch.path().to_path_buf();
        let filename = filename.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<(PathBuf, String)> {
            let tgz_path = scratch_dir.join(&filename);
            archive::create_tar_gz(&scratch_dir.join("artifact"), &tgz_path)
                .context("error creating tarball")?;
            let checksum = archive::sha1_checksum(&tgz_path)?;
            Ok((tgz_path, checksum))
        })
        .await
        .context("packaging task failed")??
    };

    ctx.store.publish(&tgz_path, &http_path).await?;

    let desired = Artifact {
        checksum,
        revision: image_ref.to_string(),
        path: http_path,
        url: url.clone(),
        last_update_time: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
    };
    let artifact = preserve_artifact_last_update_time(
        current_status.and_then(|s| s.artifact.as_ref()),
        desired,
    );

    IMAGE_REPOSITORY_CONDITIONS.mark_true(
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

/// Pull every layer of the image and unpack them in order into `dest`
async fn pull_image(
    client: &RegistryClient,
    keychain: &Keychain,
    image_ref: &str,
    dest: &Path,
) -> anyhow::Result<()> {
    let reference =
        Reference::try_from(image_ref).context("unable to parse resolved image reference")?;
    let auth = keychain.resolve(reference.resolve_registry());

    let accepted_media_types = vec![
        manifest::IMAGE_LAYER_MEDIA_TYPE,
        manifest::IMAGE_LAYER_GZIP_MEDIA_TYPE,
        manifest::IMAGE_DOCKER_LAYER_TAR_MEDIA_TYPE,
        manifest::IMAGE_DOCKER_LAYER_GZIP_MEDIA_TYPE,
    ];
    let image = client
        .pull(&reference, &auth, accepted_media_types)
        .await
        .context("unable to pull image")?;

    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
        for layer in image.layers {
            unpack_layer(&layer.data, &layer.media_type, &dest)?;
        }
        Ok(())
    })
    .await
    .context("layer unpack task failed")?
}

fn unpack_layer(data: &[u8], media_type: &str, dest: &Path) -> anyhow::Result<()> {
    if media_type.ends_with("gzip") {
        tar::Archive::new(GzDecoder::new(data))
            .unpack(dest)
            .with_context(|| format!("unable to unpack {media_type} layer"))
    } else {
        tar::Archive::new(data)
            .unpack(dest)
            .with_context(|| format!("unable to unpack {media_type} layer"))
    }
}
