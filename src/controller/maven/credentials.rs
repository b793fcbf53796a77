//! # Maven Credentials
//!
//! Resolves the repository auth secret referenced by a MavenArtifact:
//! `username`/`password` become HTTP basic auth and `caFile` extends the
//! trust store before the per-reconcile client is built. `certFile` and
//! `keyFile` are recognized in the schema but client-certificate
//! authentication is not wired up.

use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use tracing::debug;

use crate::controller::download::BasicAuth;
use crate::controller::{Context, Error, StepOutcome};
use crate::crd::{
    Condition, MavenArtifact, CONDITION_ARTIFACT_VERSION_RESOLVED, MAVEN_ARTIFACT_CONDITIONS,
};

/// Material extracted from the referenced auth secret
#[derive(Debug, Default)]
pub struct MavenCredentials {
    /// HTTP basic auth; either field may be empty
    pub auth: Option<BasicAuth>,
    /// PEM-encoded CA appended to the trust store
    pub ca: Option<Vec<u8>>,
}

/// Fetch the referenced auth secret. A missing secret marks
/// `ArtifactVersionResolved=False` and halts the pipeline; an unset
/// reference yields empty credentials.
pub async fn resolve_credentials(
    ctx: &Context,
    record: &MavenArtifact,
    namespace: &str,
    conditions: &mut Vec<Condition>,
    generation: i64,
) -> Result<StepOutcome<MavenCredentials>, Error> {
    let Some(secret_name) = record
        .spec
        .repository
        .secret_ref
        .as_ref()
        .map(|r| r.name.as_str())
        .filter(|n| !n.is_empty())
    else {
        return Ok(StepOutcome::Continue(MavenCredentials::default()));
    };

    let secrets: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let secret = match secrets.get(secret_name).await {
        Ok(secret) => secret,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            MAVEN_ARTIFACT_CONDITIONS.mark_false(
                conditions,
                CONDITION_ARTIFACT_VERSION_RESOLVED,
                "SecretMissing",
                &format!("Secret \"{secret_name}\" not found in namespace \"{namespace}\""),
                generation,
            );
            return Ok(StepOutcome::Halt);
        }
        Err(e) => {
            return Err(Error::ReconcileFailed(anyhow::anyhow!(
                "unable to get secret {namespace}/{secret_name}: {e}"
            )))
        }
    };

    let data = secret.data.unwrap_or_default();
    let field = |key: &str| {
        data.get(key)
            .map(|v| String::from_utf8_lossy(&v.0).to_string())
            .unwrap_or_default()
    };

    let credentials = MavenCredentials {
        auth: Some(BasicAuth {
            username: field("username"),
            password: field("password"),
        }),
        ca: data.get("caFile").map(|v| v.0.clone()),
    };
    debug!(secret = secret_name, "resolved repository credentials");
    Ok(StepOutcome::Continue(credentials))
}
