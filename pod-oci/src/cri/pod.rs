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
use super::namespace::{NamespaceKind, NamespaceSet};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The subset of a CRI `PodSandboxConfig` message that shapes the sandbox.
///
/// Field names follow the CRI protobuf message so the JSON crictl writes
/// deserializes as is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodSandboxConfig {
    pub metadata: Option<PodSandboxMetadata>,
    pub hostname: String,
    pub annotations: HashMap<String, String>,
    pub linux: Option<LinuxPodSandboxConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodSandboxMetadata {
    pub name: String,
    pub uid: String,
    pub namespace: String,
    pub attempt: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxPodSandboxConfig {
    pub cgroup_parent: String,
    pub security_context: Option<LinuxSandboxSecurityContext>,
    pub sysctls: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinuxSandboxSecurityContext {
    pub namespace_options: Option<NamespaceOption>,
    pub selinux_options: Option<SeLinuxOptions>,
    pub run_as_user: Option<Int64Value>,
    pub run_as_group: Option<Int64Value>,
    pub readonly_rootfs: bool,
    pub supplemental_groups: Vec<i64>,
    pub privileged: bool,
    pub seccomp_profile_path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Int64Value {
    pub value: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamespaceOption {
    pub network: NamespaceMode,
    pub pid: NamespaceMode,
    pub ipc: NamespaceMode,
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NamespaceMode {
    #[default]
    Pod,
    Container,
    Node,
    Target,
}

impl NamespaceMode {
    /// Only pod scope asks for a namespace owned by the sandbox. `Container`
    /// and `Target` scope belong to the containers, `Node` shares the host.
    pub fn is_isolated(&self) -> bool {
        matches!(self, NamespaceMode::Pod)
    }
}

/// SELinux label components. An empty field is not set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeLinuxOptions {
    pub user: String,
    pub role: String,
    #[serde(rename = "type")]
    pub typ: String,
    pub level: String,
}

/// Security attributes of the sandbox process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityContext {
    pub privileged: bool,
    pub readonly_rootfs: bool,
    pub run_as_user: Option<u32>,
    pub run_as_group: Option<u32>,
    pub supplemental_groups: Vec<u32>,
    pub seccomp_profile_path: String,
    pub selinux_options: Option<SeLinuxOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinuxPod {
    pub cgroup_parent: String,
    pub sysctls: HashMap<String, String>,
    pub security_context: Option<SecurityContext>,
}

/// A pod sandbox creation request, as seen by validation and translation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodDescriptor {
    pub id: String,
    pub hostname: String,
    pub namespaces: NamespaceSet,
    pub annotations: HashMap<String, String>,
    pub linux: Option<LinuxPod>,
}

impl PodDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), ..Default::default() }
    }

    /// Builds a descriptor for sandbox `id` out of a CRI sandbox config.
    ///
    /// A sandbox always gets its own UTS namespace as it owns its hostname.
    /// Network, PID and IPC namespaces follow the namespace options.
    pub fn from_config(
        id: impl Into<String>,
        config: PodSandboxConfig,
    ) -> Result<Self> {
        let PodSandboxConfig { metadata: _, hostname, annotations, linux } =
            config;

        let options = linux
            .as_ref()
            .and_then(|linux| linux.security_context.as_ref())
            .and_then(|security| security.namespace_options.clone())
            .unwrap_or_default();

        let mut namespaces = NamespaceSet::default();
        let _ = namespaces.insert(NamespaceKind::Uts, None);
        for (kind, mode) in [
            (NamespaceKind::Network, options.network),
            (NamespaceKind::Pid, options.pid),
            (NamespaceKind::Ipc, options.ipc),
        ] {
            if mode.is_isolated() {
                let _ = namespaces.insert(kind, None);
            }
        }

        let linux = linux.map(LinuxPod::try_from).transpose()?;

        Ok(Self { id: id.into(), hostname, namespaces, annotations, linux })
    }

    pub fn cgroup_parent(&self) -> &str {
        self.linux.as_ref().map_or("", |linux| linux.cgroup_parent.as_str())
    }

    pub fn sysctls(&self) -> impl Iterator<Item = (&String, &String)> {
        self.linux.iter().flat_map(|linux| linux.sysctls.iter())
    }

    pub fn security_context(&self) -> Option<&SecurityContext> {
        self.linux.as_ref().and_then(|linux| linux.security_context.as_ref())
    }
}

impl TryFrom<LinuxPodSandboxConfig> for LinuxPod {
    type Error = PodSandboxError;

    fn try_from(config: LinuxPodSandboxConfig) -> Result<Self> {
        let LinuxPodSandboxConfig { cgroup_parent, security_context, sysctls } =
            config;
        Ok(Self {
            cgroup_parent,
            sysctls,
            security_context: security_context
                .map(SecurityContext::try_from)
                .transpose()?,
        })
    }
}

impl TryFrom<LinuxSandboxSecurityContext> for SecurityContext {
    type Error = PodSandboxError;

    fn try_from(config: LinuxSandboxSecurityContext) -> Result<Self> {
        let LinuxSandboxSecurityContext {
            namespace_options: _,
            selinux_options,
            run_as_user,
            run_as_group,
            readonly_rootfs,
            supplemental_groups,
            privileged,
            seccomp_profile_path,
        } = config;

        Ok(Self {
            privileged,
            readonly_rootfs,
            run_as_user: run_as_user
                .map(|id| narrow_id("run_as_user", id.value))
                .transpose()?,
            run_as_group: run_as_group
                .map(|id| narrow_id("run_as_group", id.value))
                .transpose()?,
            supplemental_groups: supplemental_groups
                .into_iter()
                .map(|gid| narrow_id("supplemental_groups", gid))
                .collect::<Result<_>>()?,
            seccomp_profile_path,
            selinux_options,
        })
    }
}

fn narrow_id(field: &'static str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| PodSandboxError::IdOutOfRange { field, value })
}
