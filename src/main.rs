//! # Source Controller
//!
//! Entry point: parses the process flags, starts the metrics/probe/artifact
//! servers and runs the two source controllers until shutdown.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::Api;
use kube::{Client, ResourceExt};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{watcher, Controller};
use tracing::{error, info};

use source_controller::artifact::ArtifactStore;
use source_controller::controller::{error_policy, image, maven, Context};
use source_controller::crd::{ImageRepository, MavenArtifact};
use source_controller::leader;
use source_controller::observability::metrics;
use source_controller::server::{self, ServerState};
use source_controller::transport::CertSource;

/// Source controller for image repositories and Maven artifacts
#[derive(Parser)]
#[command(name = "source-controller")]
struct Args {
    /// The address the metric endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8080")]
    metrics_bind_address: String,

    /// The address the probe endpoint binds to
    #[arg(long, default_value = "0.0.0.0:8081")]
    health_probe_bind_address: String,

    /// Enable leader election for the controller manager. Enabling this
    /// ensures there is only one active controller manager.
    #[arg(long, default_value_t = false)]
    leader_elect: bool,

    /// The address the artifact server binds to
    #[arg(long, default_value = "0.0.0.0:8082")]
    artifact_bind_address: String,

    /// The directory to stash and serve artifacts from
    #[arg(long, default_value = "./artifact-root")]
    artifact_root_directory: PathBuf,

    /// The host name to use when constructing artifact urls
    #[arg(long, default_value = "localhost:8082")]
    artifact_host: String,

    /// The path to additional CA certificates
    #[arg(long, default_value = "")]
    ca_cert_path: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(args).await {
        error!("setup failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    metrics::register_metrics().context("unable to register metrics")?;

    let client = Client::try_default()
        .await
        .context("unable to build Kubernetes client")?;

    tokio::fs::create_dir_all(&args.artifact_root_directory)
        .await
        .context("unable to create artifact root directory")?;

    let is_ready = Arc::new(AtomicBool::new(false));
    spawn_server(server::start_metrics_server(
        args.metrics_bind_address.clone(),
    ));
    spawn_server(server::start_probe_server(
        args.health_probe_bind_address.clone(),
        Arc::new(ServerState {
            is_ready: Arc::clone(&is_ready),
        }),
    ));
    spawn_server(server::start_artifact_server(
        args.artifact_bind_address.clone(),
        args.artifact_root_directory.clone(),
    ));

    if args.leader_elect {
        let namespace = std::env::var("POD_NAMESPACE").unwrap_or_else(|_| "default".to_string());
        let identity = format!(
            "{}_{}",
            std::env::var("HOSTNAME").unwrap_or_else(|_| "source-controller".to_string()),
            std::process::id()
        );
        leader::ensure_leadership(client.clone(), &namespace, &identity).await?;
    }

    let mut certs = Vec::new();
    if !args.ca_cert_path.is_empty() {
        certs.push(CertSource::Path(PathBuf::from(&args.ca_cert_path)));
    }

    let store = ArtifactStore::new(&args.artifact_root_directory, &args.artifact_host);
    let ctx = Arc::new(Context::new(client.clone(), store, certs));

    is_ready.store(true, Ordering::Relaxed);
    info!("starting controllers");
    tokio::join!(
        run_image_controller(client.clone(), Arc::clone(&ctx)),
        run_maven_controller(client, ctx),
    );
    info!("controllers stopped");
    Ok(())
}

fn spawn_server(fut: impl std::future::Future<Output = anyhow::Result<()>> + Send + 'static) {
    tokio::spawn(async move {
        if let Err(e) = fut.await {
            error!("server failed: {e:#}");
            std::process::exit(1);
        }
    });
}

/// Run the ImageRepository controller. Secret and ServiceAccount events are
/// mapped back to the records referencing them (watch + index) so
/// credential changes re-enqueue their consumers.
async fn run_image_controller(client: Client, ctx: Arc<Context>) {
    let records: Api<ImageRepository> = Api::all(client.clone());
    let controller = Controller::new(records, watcher::Config::default());
    let reader = controller.store();

    let secret_reader = reader.clone();
    let sa_reader = reader;
    controller
        .watches(
            Api::<Secret>::all(client.clone()),
            watcher::Config::default(),
            move |secret: Secret| {
                let namespace = secret.namespace().unwrap_or_default();
                let name = secret.name_any();
                secret_reader
                    .state()
                    .into_iter()
                    .filter(|record| {
                        record.namespace().as_deref() == Some(namespace.as_str())
                            && record
                                .spec
                                .image_pull_secrets
                                .iter()
                                .any(|r| r.name == name)
                    })
                    .map(|record| ObjectRef::from_obj(&*record))
                    .collect::<Vec<_>>()
            },
        )
        .watches(
            Api::<ServiceAccount>::all(client),
            watcher::Config::default(),
            move |sa: ServiceAccount| {
                let namespace = sa.namespace().unwrap_or_default();
                let name = sa.name_any();
                sa_reader
                    .state()
                    .into_iter()
                    .filter(|record| {
                        record.namespace().as_deref() == Some(namespace.as_str())
                            && record.service_account_name() == name
                    })
                    .map(|record| ObjectRef::from_obj(&*record))
                    .collect::<Vec<_>>()
            },
        )
        .shutdown_on_signal()
        .run(image::reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((record, _)) => info!(record = %record, "reconciled"),
                Err(e) => error!("reconcile failed: {e}"),
            }
        })
        .await;
}

/// Run the MavenArtifact controller, re-enqueueing records when their
/// referenced auth secret changes.
async fn run_maven_controller(client: Client, ctx: Arc<Context>) {
    let records: Api<MavenArtifact> = Api::all(client.clone());
    let controller = Controller::new(records, watcher::Config::default());
    let reader = controller.store();

    controller
        .watches(
            Api::<Secret>::all(client),
            watcher::Config::default(),
            move |secret: Secret| {
                let namespace = secret.namespace().unwrap_or_default();
                let name = secret.name_any();
                reader
                    .state()
                    .into_iter()
                    .filter(|record| {
                        record.namespace().as_deref() == Some(namespace.as_str())
                            && record
                                .spec
                                .repository
                                .secret_ref
                                .as_ref()
                                .is_some_and(|r| r.name == name)
                    })
                    .map(|record| ObjectRef::from_obj(&*record))
                    .collect::<Vec<_>>()
            },
        )
        .shutdown_on_signal()
        .run(maven::reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((record, _)) => info!(record = %record, "reconciled"),
                Err(e) => error!("reconcile failed: {e}"),
            }
        })
        .await;
}
