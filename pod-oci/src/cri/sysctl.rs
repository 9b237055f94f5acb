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

use super::namespace::NamespaceKind;
use serde::{Deserialize, Serialize};

const DEFAULT_RULES: &[(&str, NamespaceKind)] = &[
    ("kernel.shm", NamespaceKind::Ipc),
    ("kernel.msg", NamespaceKind::Ipc),
    ("kernel.sem", NamespaceKind::Ipc),
    ("fs.mqueue.", NamespaceKind::Ipc),
    ("net.", NamespaceKind::Network),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SysctlRule {
    pub prefix: String,
    pub namespace: NamespaceKind,
}

/// Sysctls that are only safe to set inside a namespace of their own.
///
/// Deserializes from a JSON array of `{"prefix": .., "namespace": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SysctlNamespaceTable(Vec<SysctlRule>);

impl SysctlNamespaceTable {
    pub fn new(rules: Vec<SysctlRule>) -> Self {
        Self(rules)
    }

    pub fn rules(&self) -> &[SysctlRule] {
        &self.0
    }

    /// Namespace kinds `sysctl` requires, one per matching rule.
    pub fn required_namespaces<'a>(
        &'a self,
        sysctl: &'a str,
    ) -> impl Iterator<Item = NamespaceKind> + 'a {
        self.0
            .iter()
            .filter(move |rule| sysctl.starts_with(rule.prefix.as_str()))
            .map(|rule| rule.namespace)
    }
}

impl Default for SysctlNamespaceTable {
    fn default() -> Self {
        Self(
            DEFAULT_RULES
                .iter()
                .map(|(prefix, namespace)| SysctlRule {
                    prefix: prefix.to_string(),
                    namespace: *namespace,
                })
                .collect(),
        )
    }
}
