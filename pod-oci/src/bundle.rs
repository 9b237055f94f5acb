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

use crate::cri::{BundleLayout, RootfsResolver};
use oci_spec::runtime::Spec;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("failed to create bundle directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    WriteConfig { path: PathBuf, source: io::Error },
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Writes the bundle of sandbox `pod_id` and returns its directory.
///
/// ```text
/// <root>/<pod id>
/// ├── config.json
/// └── rootfs
/// ```
///
/// An existing `config.json` is replaced, the rootfs is left untouched.
pub fn write_bundle(
    layout: &BundleLayout,
    pod_id: &str,
    spec: &Spec,
) -> Result<PathBuf, BundleError> {
    let bundle_path = layout.bundle_path(pod_id);
    let rootfs_path = layout.rootfs_path(pod_id);
    fs::create_dir_all(&rootfs_path).map_err(|source| {
        BundleError::CreateDir { path: rootfs_path.clone(), source }
    })?;

    let config = serde_json::to_vec_pretty(spec)?;
    let config_path = layout.config_path(pod_id);
    fs::write(&config_path, config).map_err(|source| {
        BundleError::WriteConfig { path: config_path.clone(), source }
    })?;

    info!("wrote pod sandbox bundle {}", bundle_path.display());
    Ok(bundle_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_bundle_creates_layout() {
        let tempdir = tempfile::tempdir().expect("create temp dir");
        let layout = BundleLayout::new(tempdir.path());

        let bundle = write_bundle(&layout, "abc123", &Spec::default())
            .expect("write bundle");

        assert_eq!(bundle, tempdir.path().join("abc123"));
        assert!(bundle.join("rootfs").is_dir());

        let written: serde_json::Value = serde_json::from_slice(
            &fs::read(bundle.join("config.json")).expect("read config"),
        )
        .expect("parse config");
        assert_eq!(written["ociVersion"], "1.0.2-dev");
        assert_eq!(written["root"]["path"], "rootfs");
    }

    #[test]
    fn write_bundle_replaces_config() {
        let tempdir = tempfile::tempdir().expect("create temp dir");
        let layout = BundleLayout::new(tempdir.path());
        let config = layout.config_path("abc123");
        fs::create_dir_all(layout.bundle_path("abc123")).expect("mkdir");
        fs::write(&config, b"stale").expect("write stale config");

        let _ = write_bundle(&layout, "abc123", &Spec::default())
            .expect("write bundle");

        let written = fs::read_to_string(&config).expect("read config");
        assert!(written.contains("ociVersion"));
    }
}
