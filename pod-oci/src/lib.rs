/* -------------------------------------------------------------------------- *\
 *                |   █████╗ ██╗   ██╗██████╗  █████╗ ███████╗ |              *
 *                |  ██╔══██╗██║   ██║██╔══██╗██╔══██╗██╔════╝ |              *
 *                |  ███████║██║   ██║██████╔╝███████║█████╗   |              *
 *                |  ██╔══██║██║   ██║██╔══██╗██╔══██║██╔══╝   |              *
 *                |  ██║  ██║╚██████╔╝██║  ██║██║  ██║███████╗ |              *
 *                |  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ |              *
 *                +--------------------------------------------+              *
 *                                                                            *
 *                         Distributed Systems Runtime                        *
 * -------------------------------------------------------------------------- *
 * Copyright 2022 - 2024, the aurae contributors                              *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! Pod sandbox specs for container runtime interface servers.
//!
//! Takes the pod sandbox config a CRI client sends with `RunPodSandbox`,
//! validates and defaults it, and translates it into the OCI runtime spec
//! the sandbox is created from.
//!
//! ```text
//! PodSandboxConfig ─▶ PodDescriptor ─▶ PodValidator ─▶ ValidatedPod
//!                                                        │
//!                     config.json ◀─ write_bundle ◀─ PodTranslator
//! ```
// Lint groups: https://doc.rust-lang.org/rustc/lints/groups.html
#![warn(future_incompatible, nonstandard_style, unused)]
#![warn(
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    unconditional_recursion,
    unused_comparisons,
    while_true
)]
#![warn(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_results
)]
#![warn(clippy::unwrap_used)]

use anyhow::Context;
use clap::Parser;
use cri::{
    BundleLayout, HostLabels, PodDescriptor, PodSandboxConfig, PodTranslator,
    PodValidator, SysctlNamespaceTable, DEFAULT_CGROUP_ROOT, DEFAULT_POD_ROOT,
};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub mod bundle;
pub mod cri;
pub mod logging;

const EXIT_OKAY: i32 = 0;
const EXIT_ERROR: i32 = 1;

/// Command line options for pod-oci.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct PodOciOptions {
    /// Pod sandbox config, as the JSON of a CRI PodSandboxConfig.
    #[clap(short, long, value_parser)]
    config: PathBuf,
    /// Sandbox id. Defaults to a random UUID.
    #[clap(long)]
    id: Option<String>,
    /// Directory holding the sandbox bundles.
    #[clap(long, value_parser, default_value = DEFAULT_POD_ROOT)]
    runtime_dir: PathBuf,
    /// Cgroup sandboxes without a cgroup parent are placed under.
    #[clap(long, value_parser, default_value = DEFAULT_CGROUP_ROOT)]
    cgroup_root: PathBuf,
    /// JSON list of {"prefix", "namespace"} rules replacing the built in
    /// namespaced sysctl table.
    #[clap(long, value_parser)]
    sysctl_table: Option<PathBuf>,
    /// Toggle verbosity. Default false
    #[clap(short, long)]
    verbose: bool,
}

/// Runs the command line and returns the process exit code.
pub fn run() -> i32 {
    let options = PodOciOptions::parse();

    if let Err(e) = logging::init(options.verbose) {
        eprintln!("failed to initialize logging: {e}");
        return EXIT_ERROR;
    }

    match emit_bundle(&options) {
        Ok(bundle) => {
            println!("{}", bundle.display());
            EXIT_OKAY
        }
        Err(e) => {
            error!("{e:?}");
            EXIT_ERROR
        }
    }
}

/// Validates and translates the configured sandbox, then writes its bundle.
pub fn emit_bundle(options: &PodOciOptions) -> anyhow::Result<PathBuf> {
    let config: PodSandboxConfig = read_json(&options.config)
        .context("reading pod sandbox config")?;
    let table = match &options.sysctl_table {
        Some(path) => read_json(path).context("reading sysctl table")?,
        None => SysctlNamespaceTable::default(),
    };

    let id = options
        .id
        .clone()
        .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
    if let Some(metadata) = &config.metadata {
        info!(
            "preparing sandbox {id} for pod {}/{}",
            metadata.namespace, metadata.name
        );
    }

    let descriptor = PodDescriptor::from_config(id, config)?;
    let pod = PodValidator::new(table, &options.cgroup_root)
        .validate(descriptor)
        .context("validating pod sandbox config")?;

    let layout = BundleLayout::new(&options.runtime_dir);
    let spec = PodTranslator::new(layout.clone(), HostLabels::detect())
        .translate(&pod)
        .context("translating pod sandbox into an OCI spec")?;

    Ok(bundle::write_bundle(&layout, &pod.id, &spec)?)
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<T> {
    let file = File::open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}
