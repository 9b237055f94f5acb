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

use oci_spec::runtime::LinuxNamespaceType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// A category of kernel isolation a sandbox may request.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceKind {
    Pid,
    Ipc,
    Network,
    Uts,
    Mount,
    User,
    Cgroup,
}

impl NamespaceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceKind::Pid => "pid",
            NamespaceKind::Ipc => "ipc",
            NamespaceKind::Network => "network",
            NamespaceKind::Uts => "uts",
            NamespaceKind::Mount => "mount",
            NamespaceKind::User => "user",
            NamespaceKind::Cgroup => "cgroup",
        }
    }
}

impl Display for NamespaceKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NamespaceKind> for LinuxNamespaceType {
    fn from(kind: NamespaceKind) -> Self {
        match kind {
            NamespaceKind::Pid => LinuxNamespaceType::Pid,
            NamespaceKind::Ipc => LinuxNamespaceType::Ipc,
            NamespaceKind::Network => LinuxNamespaceType::Network,
            NamespaceKind::Uts => LinuxNamespaceType::Uts,
            NamespaceKind::Mount => LinuxNamespaceType::Mount,
            NamespaceKind::User => LinuxNamespaceType::User,
            NamespaceKind::Cgroup => LinuxNamespaceType::Cgroup,
        }
    }
}

/// The namespaces requested for a sandbox, at most one per kind.
///
/// A `None` path asks for a fresh namespace. A path joins the namespace
/// already bound at that location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceSet(BTreeMap<NamespaceKind, Option<PathBuf>>);

impl NamespaceSet {
    /// Adds a namespace, replacing any entry of the same kind. Returns the
    /// replaced path, if there was an entry.
    pub fn insert(
        &mut self,
        kind: NamespaceKind,
        path: Option<PathBuf>,
    ) -> Option<Option<PathBuf>> {
        self.0.insert(kind, path)
    }

    pub fn contains(&self, kind: NamespaceKind) -> bool {
        self.0.contains_key(&kind)
    }

    pub fn path(&self, kind: NamespaceKind) -> Option<&Path> {
        self.0.get(&kind).and_then(|path| path.as_deref())
    }

    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (NamespaceKind, Option<&Path>)> + '_ {
        self.0.iter().map(|(kind, path)| (*kind, path.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(NamespaceKind, Option<PathBuf>)> for NamespaceSet {
    fn from_iter<T: IntoIterator<Item = (NamespaceKind, Option<PathBuf>)>>(
        iter: T,
    ) -> Self {
        Self(iter.into_iter().collect())
    }
}
