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
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const UNCONFINED: &str = "unconfined";
pub const RUNTIME_DEFAULT: &str = "runtime/default";
/// Deprecated alias of [`RUNTIME_DEFAULT`].
pub const DOCKER_DEFAULT: &str = "docker/default";
pub const LOCALHOST_PREFIX: &str = "localhost/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SeccompError {
    #[error("localhost profile path must be absolute, got '{path}'")]
    RelativeLocalhostPath { path: String },
    #[error("unknown seccomp profile '{profile}'")]
    UnknownProfile { profile: String },
}

/// Turns a CRI seccomp profile path into its canonical form.
pub trait SeccompPathPreparer: Debug + Send + Sync {
    fn prepare(&self, profile_path: &str) -> Result<String, SeccompError>;
}

/// The kubelet profile path convention: `unconfined`, `runtime/default`
/// (or `docker/default`), and `localhost/<absolute path>`.
///
/// Every value it returns prepares to itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct KubeletSeccompPaths;

impl SeccompPathPreparer for KubeletSeccompPaths {
    fn prepare(&self, profile_path: &str) -> Result<String, SeccompError> {
        match profile_path {
            "" | UNCONFINED | RUNTIME_DEFAULT => Ok(profile_path.to_string()),
            DOCKER_DEFAULT => Ok(RUNTIME_DEFAULT.to_string()),
            _ => {
                let Some(local) = profile_path.strip_prefix(LOCALHOST_PREFIX)
                else {
                    return Err(SeccompError::UnknownProfile {
                        profile: profile_path.to_string(),
                    });
                };

                let local = Path::new(local);
                if !local.is_absolute() {
                    return Err(SeccompError::RelativeLocalhostPath {
                        path: local.display().to_string(),
                    });
                }

                Ok(format!("{LOCALHOST_PREFIX}{}", clean(local).display()))
            }
        }
    }
}

// Lexical only, the profile may not exist on this host yet.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(name) => out.push(name),
            Component::ParentDir => {
                let _ = out.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    out
}
