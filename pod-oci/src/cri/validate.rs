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

use super::error::{PodSandboxError, Result};
use super::host::{HostnameLookup, SystemHostname};
use super::pod::{LinuxPod, PodDescriptor};
use super::seccomp::{KubeletSeccompPaths, SeccompPathPreparer};
use super::sysctl::SysctlNamespaceTable;
use std::io;
use std::ops::Deref;
use std::path::{Component, Path, PathBuf};
use tracing::info;

/// Cgroup every sandbox without a cgroup parent of its own is placed under.
pub const DEFAULT_CGROUP_ROOT: &str = "singularity-cri";

/// A pod descriptor that passed [`PodValidator::validate`].
///
/// The id is a single path component, the hostname and cgroup parent are
/// set, and every namespaced sysctl has its namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPod(PodDescriptor);

impl ValidatedPod {
    pub fn into_inner(self) -> PodDescriptor {
        self.0
    }
}

impl Deref for ValidatedPod {
    type Target = PodDescriptor;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Debug)]
pub struct PodValidator {
    sysctls: SysctlNamespaceTable,
    cgroup_root: PathBuf,
    hostname: Box<dyn HostnameLookup>,
    seccomp: Box<dyn SeccompPathPreparer>,
}

impl Default for PodValidator {
    fn default() -> Self {
        Self::new(SysctlNamespaceTable::default(), DEFAULT_CGROUP_ROOT)
    }
}

impl PodValidator {
    pub fn new(
        sysctls: SysctlNamespaceTable,
        cgroup_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            sysctls,
            cgroup_root: cgroup_root.into(),
            hostname: Box::new(SystemHostname),
            seccomp: Box::new(KubeletSeccompPaths),
        }
    }

    pub fn with_hostname_lookup(
        mut self,
        hostname: impl HostnameLookup + 'static,
    ) -> Self {
        self.hostname = Box::new(hostname);
        self
    }

    pub fn with_seccomp_preparer(
        mut self,
        seccomp: impl SeccompPathPreparer + 'static,
    ) -> Self {
        self.seccomp = Box::new(seccomp);
        self
    }

    /// Checks `pod` and fills in the fields left for us to default.
    ///
    /// Only empty fields are defaulted, so validating a [`ValidatedPod`]
    /// again changes nothing.
    pub fn validate(&self, mut pod: PodDescriptor) -> Result<ValidatedPod> {
        check_id(&pod.id)?;
        self.check_sysctls(&pod)?;

        if pod.hostname.is_empty() {
            let hostname = self
                .hostname
                .hostname()
                .and_then(|hostname| {
                    if hostname.is_empty() {
                        Err(io::Error::new(
                            io::ErrorKind::InvalidData,
                            "host name is empty",
                        ))
                    } else {
                        Ok(hostname)
                    }
                })
                .map_err(|source| PodSandboxError::ResolutionFailure {
                    source,
                })?;
            info!("setting pod hostname to default value {hostname:?}");
            pod.hostname = hostname;
        }

        if pod.cgroup_parent().is_empty() {
            let cgroup_parent = self
                .cgroup_root
                .join(&pod.id)
                .to_string_lossy()
                .into_owned();
            info!(
                "setting pod cgroup parent to default value {cgroup_parent:?}"
            );
            pod.linux.get_or_insert_with(LinuxPod::default).cgroup_parent =
                cgroup_parent;
        }

        if let Some(security) = pod
            .linux
            .as_mut()
            .and_then(|linux| linux.security_context.as_mut())
        {
            let path = &security.seccomp_profile_path;
            security.seccomp_profile_path =
                self.seccomp.prepare(path).map_err(|source| {
                    PodSandboxError::InvalidProfilePath {
                        path: path.clone(),
                        source,
                    }
                })?;
        }

        Ok(ValidatedPod(pod))
    }

    fn check_sysctls(&self, pod: &PodDescriptor) -> Result<()> {
        let mut sysctls: Vec<&String> = pod.sysctls().map(|(k, _)| k).collect();
        sysctls.sort();

        for sysctl in sysctls {
            for namespace in self.sysctls.required_namespaces(sysctl) {
                if !pod.namespaces.contains(namespace) {
                    return Err(PodSandboxError::ConfigConflict {
                        sysctl: sysctl.clone(),
                        namespace,
                    });
                }
            }
        }

        Ok(())
    }
}

// The id names the bundle directory and the default cgroup, it must not
// reach outside of either root.
fn check_id(id: &str) -> Result<()> {
    let mut components = Path::new(id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) if name.to_str() == Some(id) => {
            Ok(())
        }
        _ => Err(PodSandboxError::InvalidId { id: id.to_string() }),
    }
}
