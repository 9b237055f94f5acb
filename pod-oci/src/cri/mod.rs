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

//! Pod sandbox requests as they arrive over the container runtime
//! interface, and their translation into OCI runtime specs.

pub use error::{PodSandboxError, Result};
pub use host::{
    BundleLayout, HostnameLookup, RootfsResolver, SystemHostname,
    DEFAULT_POD_ROOT,
};
pub use namespace::{NamespaceKind, NamespaceSet};
pub use oci::{Generator, OciSpecBuilder, PodTranslator, OCI_VERSION};
pub use pod::{
    LinuxPod, LinuxPodSandboxConfig, LinuxSandboxSecurityContext,
    NamespaceMode, NamespaceOption, PodDescriptor, PodSandboxConfig,
    PodSandboxMetadata, SeLinuxOptions, SecurityContext,
};
pub use seccomp::{KubeletSeccompPaths, SeccompError, SeccompPathPreparer};
pub use selinux::{
    derive_labels, label_components, HostLabels, LabelError,
    LabelInitializer, SelinuxLabels,
};
pub use sysctl::{SysctlNamespaceTable, SysctlRule};
pub use validate::{PodValidator, ValidatedPod, DEFAULT_CGROUP_ROOT};

mod error;
mod host;
mod namespace;
mod oci;
mod pod;
mod seccomp;
mod selinux;
mod sysctl;
mod validate;
