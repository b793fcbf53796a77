//! # CRD Generator
//!
//! Generates the CustomResourceDefinition YAML for the source records from
//! the Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;

use source_controller::crd::{ImageRepository, MavenArtifact};

fn main() {
    let crds = [ImageRepository::crd(), MavenArtifact::crd()];
    for crd in crds {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => println!("---\n{yaml}"),
            Err(e) => {
                eprintln!("failed to serialize CRD: {e}");
                std::process::exit(1);
            }
        }
    }
}
