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
use super::oci::OciSpecBuilder;
use super::pod::SeLinuxOptions;
use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::debug;

const SELINUXFS_ENFORCE: &str = "/sys/fs/selinux/enforce";
const MCS_CATEGORIES: u128 = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabelError {
    #[error("bad label option '{option}', valid options 'disable' or 'user, role, level, type, filetype' followed by ':' and a value")]
    MissingSeparator { option: String },
    #[error("bad label option '{key}', valid options 'disable, user, role, level, type, filetype'")]
    UnknownOption { key: String },
}

/// Turns ordered `key:value` label components into a process label and a
/// mount label, in that order.
pub trait LabelInitializer: Debug + Send + Sync {
    fn init_labels(
        &self,
        options: &[String],
    ) -> std::result::Result<(String, String), LabelError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelinuxLabels {
    pub process: String,
    pub mount: String,
}

/// Label components for the non-empty fields, in user, role, type, level
/// order.
pub fn label_components(options: &SeLinuxOptions) -> Vec<String> {
    [
        ("user", &options.user),
        ("role", &options.role),
        ("type", &options.typ),
        ("level", &options.level),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(key, value)| format!("{key}:{value}"))
    .collect()
}

/// Derives the sandbox labels. No options means no labels.
pub fn derive_labels(
    options: Option<&SeLinuxOptions>,
    initializer: &dyn LabelInitializer,
) -> Result<SelinuxLabels> {
    let Some(options) = options else {
        return Ok(SelinuxLabels::default());
    };

    let components = label_components(options);
    debug!("initializing selinux labels from {components:?}");
    let (process, mount) = initializer
        .init_labels(&components)
        .map_err(|source| PodSandboxError::LabelInitFailure { source })?;

    Ok(SelinuxLabels { process, mount })
}

pub fn setup_selinux(
    builder: &mut dyn OciSpecBuilder,
    options: Option<&SeLinuxOptions>,
    initializer: &dyn LabelInitializer,
) -> Result<()> {
    if options.is_none() {
        return Ok(());
    }

    let SelinuxLabels { process, mount } =
        derive_labels(options, initializer)?;
    builder.set_linux_mount_label(mount);
    builder.set_process_selinux_label(process);
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Context {
    user: String,
    role: String,
    typ: String,
    level: String,
}

impl Context {
    fn new(user: &str, role: &str, typ: &str, level: &str) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
            typ: typ.into(),
            level: level.into(),
        }
    }
}

impl Display for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}:{}", self.user, self.role, self.typ, self.level)
    }
}

/// Labels sandboxes with the container contexts of the host policy.
///
/// Every sandbox without a level of its own gets a fresh `s0:cX,cY` category
/// pair, so no two sandboxes share a label. Clones share the reserved pairs.
/// When SELinux is disabled every label is empty.
#[derive(Debug, Clone)]
pub struct HostLabels {
    enabled: bool,
    process: Context,
    mount: Context,
    reserved: Arc<Mutex<HashSet<String>>>,
}

impl HostLabels {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            process: Context::new("system_u", "system_r", "container_t", "s0"),
            mount: Context::new(
                "system_u",
                "object_r",
                "container_file_t",
                "s0",
            ),
            reserved: Arc::default(),
        }
    }

    /// SELinux is enabled when selinuxfs is mounted.
    pub fn detect() -> Self {
        Self::new(Path::new(SELINUXFS_ENFORCE).exists())
    }

    fn reserved(&self) -> MutexGuard<'_, HashSet<String>> {
        self.reserved.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reserve(&self, level: &str) {
        let _ = self.reserved().insert(level.to_string());
    }

    // Draws category pairs until one is not taken yet.
    fn unique_level(&self) -> String {
        let mut reserved = self.reserved();
        loop {
            let bits = uuid::Uuid::new_v4().as_u128();
            let first = (bits % MCS_CATEGORIES) as u32;
            let second = ((bits >> 64) % MCS_CATEGORIES) as u32;
            if first == second {
                continue;
            }

            let level = format!(
                "s0:c{},c{}",
                first.min(second),
                first.max(second)
            );
            if reserved.insert(level.clone()) {
                return level;
            }
        }
    }
}

impl LabelInitializer for HostLabels {
    fn init_labels(
        &self,
        options: &[String],
    ) -> std::result::Result<(String, String), LabelError> {
        if !self.enabled {
            return Ok((String::new(), String::new()));
        }

        let mut process = self.process.clone();
        let mut mount = self.mount.clone();
        let mut level = None;
        for option in options {
            if option == "disable" {
                return Ok((String::new(), self.mount.to_string()));
            }

            let Some((key, value)) = option.split_once(':') else {
                return Err(LabelError::MissingSeparator {
                    option: option.clone(),
                });
            };

            match key {
                "user" => {
                    process.user = value.into();
                    mount.user = value.into();
                }
                "role" => process.role = value.into(),
                "type" => process.typ = value.into(),
                "level" => level = Some(value.to_string()),
                "filetype" => mount.typ = value.into(),
                _ => {
                    return Err(LabelError::UnknownOption { key: key.into() })
                }
            }
        }

        let level = match level {
            Some(level) => {
                self.reserve(&level);
                level
            }
            None => self.unique_level(),
        };
        debug!("labelling sandbox at level {level}");
        process.level = level.clone();
        mount.level = level;

        Ok((process.to_string(), mount.to_string()))
    }
}
