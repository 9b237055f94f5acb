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

use std::fmt::Debug;
use std::io;
use std::path::{Path, PathBuf};

/// Default directory holding one bundle directory per pod sandbox.
pub const DEFAULT_POD_ROOT: &str = "/var/run/pod-oci/pods";

const ROOTFS_DIR: &str = "rootfs";
const CONFIG_FILE: &str = "config.json";

pub trait HostnameLookup: Debug + Send + Sync {
    fn hostname(&self) -> io::Result<String>;
}

/// Reads the host name of the machine we run on.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostname;

impl HostnameLookup for SystemHostname {
    fn hostname(&self) -> io::Result<String> {
        let hostname = nix::unistd::gethostname()?;
        hostname.into_string().map_err(|hostname| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("hostname {hostname:?} is not valid UTF-8"),
            )
        })
    }
}

pub trait RootfsResolver: Debug + Send + Sync {
    fn rootfs_path(&self, pod_id: &str) -> PathBuf;
}

/// On disk layout of pod sandbox bundles.
///
/// ```text
/// <root>
/// └── <pod id>
///     ├── config.json
///     └── rootfs
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    root: PathBuf,
}

impl BundleLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn bundle_path(&self, pod_id: &str) -> PathBuf {
        self.root.join(pod_id)
    }

    pub fn config_path(&self, pod_id: &str) -> PathBuf {
        self.bundle_path(pod_id).join(CONFIG_FILE)
    }
}

impl Default for BundleLayout {
    fn default() -> Self {
        Self::new(DEFAULT_POD_ROOT)
    }
}

impl RootfsResolver for BundleLayout {
    fn rootfs_path(&self, pod_id: &str) -> PathBuf {
        self.bundle_path(pod_id).join(ROOTFS_DIR)
    }
}
