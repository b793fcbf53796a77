//! # Image Reference Resolution
//!
//! Resolves an ImageRepository's reference to a fully qualified digest
//! form. A reference that already carries a digest passes through
//! verbatim; a tag reference is resolved with a manifest HEAD against the
//! registry using the pull-secret keychain.

use oci_distribution::client::{ClientConfig, ClientProtocol};
use oci_distribution::{Client as RegistryClient, Reference};
use tracing::{error, info};

use crate::controller::image::credentials::Keychain;
use crate::controller::{Error, StepOutcome};
use crate::crd::{
    Condition, ImageRepository, CONDITION_IMAGE_RESOLVED, IMAGE_REPOSITORY_CONDITIONS,
};
use crate::transport::{registry_trust_anchors, CertSource};

/// Registry client wired with the trust-augmented certificate set
pub fn registry_client(certs: &[CertSource]) -> Result<RegistryClient, Error> {
    let config = ClientConfig {
        protocol: ClientProtocol::Https,
        extra_root_certificates: registry_trust_anchors(certs)?,
        ..Default::default()
    };
    Ok(RegistryClient::new(config))
}

/// Resolve the record's image reference to `<repo>:<tag>@sha256:<hex>`.
/// Digest references pass through unchanged.
pub async fn resolve_image_ref(
    record: &ImageRepository,
    client: &RegistryClient,
    keychain: &Keychain,
    conditions: &mut Vec<Condition>,
    generation: i64,
) -> Result<StepOutcome<String>, Error> {
    let image = &record.spec.image;

    let reference = match Reference::try_from(image.as_str()) {
        Ok(reference) => reference,
        Err(e) => {
            IMAGE_REPOSITORY_CONDITIONS.mark_false(
                conditions,
                CONDITION_IMAGE_RESOLVED,
                "MalformedRepository",
                &format!("Image name \"{image}\" failed validation: {e}"),
                generation,
            );
            return Ok(StepOutcome::Halt);
        }
    };

    if reference.digest().is_some() {
        // already pinned; pass the record's reference through
        return Ok(StepOutcome::Continue(image.clone()));
    }

    let auth = keychain.resolve(reference.resolve_registry());
    let digest = match client.fetch_manifest_digest(&reference, &auth).await {
        Ok(digest) => digest,
        Err(e) => {
            error!(image = %image, error = %e, "unable to resolve image tag to a digest");
            IMAGE_REPOSITORY_CONDITIONS.mark_false(
                conditions,
                CONDITION_IMAGE_RESOLVED,
                "RemoteError",
                &format!("Unable to resolve image with tag \"{image}\" to a digest: {e}"),
                generation,
            );
            return Ok(StepOutcome::Halt);
        }
    };

    let qualified = format!(
        "{}/{}:{}@{}",
        reference.resolve_registry(),
        reference.repository(),
        reference.tag().unwrap_or("latest"),
        digest
    );
    info!(image = %image, digest = %digest, "resolved image tag");
    Ok(StepOutcome::Continue(qualified))
}
