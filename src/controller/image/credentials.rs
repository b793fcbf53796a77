//! # Image Pull Credentials
//!
//! Collects the pull secrets reachable from an ImageRepository (the
//! referenced service account's pull secrets unioned with the record's
//! explicit list) and turns their docker-config payloads into an ordered
//! keychain. Registry requests consult the keychain first-match-wins:
//! record pull secrets, then the ambient docker config, then anonymous.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::Api;
use oci_distribution::secrets::RegistryAuth;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::controller::{Context, Error, StepOutcome};
use crate::crd::{
    Condition, ImageRepository, CONDITION_IMAGE_RESOLVED, IMAGE_REPOSITORY_CONDITIONS,
};

/// Union the service account's pull secrets with the record's explicit
/// list, deduplicated by name, and fetch each from the record's namespace.
/// Missing dependencies mark `ImageResolved=False` and halt the pipeline.
pub async fn collect_pull_secrets(
    ctx: &Context,
    record: &ImageRepository,
    namespace: &str,
    conditions: &mut Vec<Condition>,
    generation: i64,
) -> Result<StepOutcome<Vec<Secret>>, Error> {
    let mut names: BTreeSet<String> = record
        .spec
        .image_pull_secrets
        .iter()
        .map(|r| r.name.clone())
        .filter(|n| !n.is_empty())
        .collect();

    let sa_name = record.service_account_name();
    let service_accounts: Api<ServiceAccount> = Api::namespaced(ctx.client.clone(), namespace);
    let service_account = match service_accounts.get(sa_name).await {
        Ok(sa) => sa,
        Err(kube::Error::Api(ae)) if ae.code == 404 => {
            IMAGE_REPOSITORY_CONDITIONS.mark_false(
                conditions,
                CONDITION_IMAGE_RESOLVED,
                "ServiceAccountMissing",
                &format!("ServiceAccount \"{sa_name}\" not found in namespace \"{namespace}\""),
                generation,
            );
            return Ok(StepOutcome::Halt);
        }
        Err(e) => {
            return Err(Error::ReconcileFailed(anyhow::anyhow!(
                "unable to get service account {namespace}/{sa_name}: {e}"
            )))
        }
    };
    for reference in service_account.image_pull_secrets.unwrap_or_default() {
        if let Some(name) = reference.name.filter(|n| !n.is_empty()) {
            names.insert(name);
        }
    }

    let secrets_api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    let mut secrets = Vec::with_capacity(names.len());
    for secret_name in names {
        match secrets_api.get(&secret_name).await {
            Ok(secret) => secrets.push(secret),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                IMAGE_REPOSITORY_CONDITIONS.mark_false(
                    conditions,
                    CONDITION_IMAGE_RESOLVED,
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
        }
    }

    debug!(count = secrets.len(), "collected image pull secrets");
    Ok(StepOutcome::Continue(secrets))
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DockerAuthEntry {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    auth: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

/// Ordered list of docker-config credential maps consulted for registry
/// requests; first match wins, anonymous last
#[derive(Debug, Default)]
pub struct Keychain {
    configs: Vec<HashMap<String, DockerAuthEntry>>,
}

impl Keychain {
    /// Build a keychain from pull secrets, accepting both the
    /// `.dockerconfigjson` and the legacy `.dockercfg` layouts. Secrets
    /// without registry credentials are skipped.
    pub fn from_pull_secrets(secrets: &[Secret]) -> Self {
        let mut configs = Vec::new();
        for secret in secrets {
            let name = secret.metadata.name.as_deref().unwrap_or_default();
            let Some(data) = &secret.data else { continue };

            if let Some(config) = data.get(".dockerconfigjson") {
                match serde_json::from_slice::<DockerConfigFile>(&config.0) {
                    Ok(parsed) => configs.push(parsed.auths),
                    Err(e) => warn!(secret = name, error = %e, "skipping malformed .dockerconfigjson"),
                }
            } else if let Some(config) = data.get(".dockercfg") {
                match serde_json::from_slice::<HashMap<String, DockerAuthEntry>>(&config.0) {
                    Ok(parsed) => configs.push(parsed),
                    Err(e) => warn!(secret = name, error = %e, "skipping malformed .dockercfg"),
                }
            }
        }
        Self { configs }
    }

    /// Append the ambient docker config when one is present
    /// (`$DOCKER_CONFIG/config.json`, then `~/.docker/config.json`)
    pub fn with_ambient(mut self) -> Self {
        let candidates = [
            std::env::var_os("DOCKER_CONFIG").map(|dir| PathBuf::from(dir).join("config.json")),
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker/config.json")),
        ];
        for path in candidates.into_iter().flatten() {
            let Ok(raw) = std::fs::read(&path) else {
                continue;
            };
            if let Ok(parsed) = serde_json::from_slice::<DockerConfigFile>(&raw) {
                debug!(path = %path.display(), "using ambient docker config");
                self.configs.push(parsed.auths);
                break;
            }
        }
        self
    }

    /// Credentials for a registry host; anonymous when nothing matches
    pub fn resolve(&self, registry: &str) -> RegistryAuth {
        for config in &self.configs {
            for key in registry_keys(registry) {
                if let Some(entry) = config.get(&key) {
                    if let Some((username, password)) = entry_credentials(entry) {
                        return RegistryAuth::Basic(username, password);
                    }
                }
            }
        }
        RegistryAuth::Anonymous
    }
}

/// Keys a registry may be stored under in a docker config
fn registry_keys(registry: &str) -> Vec<String> {
    let mut keys = vec![
        registry.to_string(),
        format!("https://{registry}"),
        format!("http://{registry}"),
    ];
    if matches!(
        registry,
        "docker.io" | "index.docker.io" | "registry-1.docker.io"
    ) {
        keys.extend([
            "docker.io".to_string(),
            "index.docker.io".to_string(),
            "registry-1.docker.io".to_string(),
            "https://index.docker.io/v1/".to_string(),
        ]);
    }
    keys
}

fn entry_credentials(entry: &DockerAuthEntry) -> Option<(String, String)> {
    if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
        return Some((username.clone(), password.clone()));
    }
    let auth = entry.auth.as_deref()?;
    let decoded = BASE64.decode(auth).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::ByteString;
    use std::collections::BTreeMap;

    fn pull_secret(key: &str, payload: &str) -> Secret {
        let mut data = BTreeMap::new();
        data.insert(key.to_string(), ByteString(payload.as_bytes().to_vec()));
        Secret {
            data: Some(data),
            ..Secret::default()
        }
    }

    #[test]
    fn dockerconfigjson_credentials_resolve() {
        let secret = pull_secret(
            ".dockerconfigjson",
            r#"{"auths":{"reg.example":{"username":"user","password":"pass"}}}"#,
        );
        let keychain = Keychain::from_pull_secrets(&[secret]);
        match keychain.resolve("reg.example") {
            RegistryAuth::Basic(username, password) => {
                assert_eq!(username, "user");
                assert_eq!(password, "pass");
            }
            _ => panic!("expected basic auth"),
        }
    }

    #[test]
    fn legacy_dockercfg_credentials_resolve() {
        let secret = pull_secret(
            ".dockercfg",
            r#"{"reg.example":{"auth":"dXNlcjpwYXNz"}}"#, // user:pass
        );
        let keychain = Keychain::from_pull_secrets(&[secret]);
        match keychain.resolve("reg.example") {
            RegistryAuth::Basic(username, password) => {
                assert_eq!(username, "user");
                assert_eq!(password, "pass");
            }
            _ => panic!("expected basic auth"),
        }
    }

    #[test]
    fn unknown_registry_is_anonymous() {
        let keychain = Keychain::from_pull_secrets(&[]);
        assert!(matches!(
            keychain.resolve("reg.example"),
            RegistryAuth::Anonymous
        ));
    }

    #[test]
    fn first_matching_secret_wins() {
        let first = pull_secret(
            ".dockerconfigjson",
            r#"{"auths":{"reg.example":{"username":"first","password":"a"}}}"#,
        );
        let second = pull_secret(
            ".dockerconfigjson",
            r#"{"auths":{"reg.example":{"username":"second","password":"b"}}}"#,
        );
        let keychain = Keychain::from_pull_secrets(&[first, second]);
        match keychain.resolve("reg.example") {
            RegistryAuth::Basic(username, _) => assert_eq!(username, "first"),
            _ => panic!("expected basic auth"),
        }
    }

    #[test]
    fn docker_hub_aliases_share_credentials() {
        let secret = pull_secret(
            ".dockerconfigjson",
            r#"{"auths":{"https://index.docker.io/v1/":{"username":"hub","password":"p"}}}"#,
        );
        let keychain = Keychain::from_pull_secrets(&[secret]);
        match keychain.resolve("index.docker.io") {
            RegistryAuth::Basic(username, _) => assert_eq!(username, "hub"),
            _ => panic!("expected basic auth"),
        }
    }

    #[test]
    fn malformed_config_is_skipped() {
        let secret = pull_secret(".dockerconfigjson", "not-json");
        let keychain = Keychain::from_pull_secrets(&[secret]);
        assert!(matches!(
            keychain.resolve("reg.example"),
            RegistryAuth::Anonymous
        ));
    }
}
