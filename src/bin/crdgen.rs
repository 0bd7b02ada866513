// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Generates the `DNSNameResolver` CRD YAML from the Rust types in
//! src/crd.rs, keeping deploy/crds/ in sync with the code.
//!
//! Usage:
//!   cargo run --bin crdgen

use kube::CustomResourceExt;
use resolvy::crd::DNSNameResolver;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;

    println!("Generating CRD YAML from src/crd.rs...");

    let crd = DNSNameResolver::crd();
    let yaml = serde_yaml::to_string(&crd)?;
    let path = output_dir.join("dnsnameresolvers.crd.yaml");
    fs::write(&path, format!("{COPYRIGHT_HEADER}{yaml}"))?;

    println!("✓ Wrote {}", path.display());
    println!("\nDeploy with: kubectl apply -f deploy/crds/");

    Ok(())
}
