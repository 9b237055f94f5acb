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
use super::seccomp::SeccompError;
use super::selinux::LabelError;
use oci_spec::OciSpecError;
use thiserror::Error;
use tonic::Status;
use tracing::error;

pub type Result<T> = std::result::Result<T, PodSandboxError>;

#[derive(Debug, Error)]
pub enum PodSandboxError {
    #[error("invalid sandbox id {id:?}, it must be a single path component")]
    InvalidId { id: String },
    #[error("sysctl {sysctl} requires a separate {namespace} namespace")]
    ConfigConflict { sysctl: String, namespace: NamespaceKind },
    #[error("could not get default hostname: {source}")]
    ResolutionFailure { source: std::io::Error },
    #[error("invalid seccomp profile path '{path}': {source}")]
    InvalidProfilePath { path: String, source: SeccompError },
    #[error("could not init selinux labels: {source}")]
    LabelInitFailure { source: LabelError },
    #[error("{field} {value} does not fit a 32 bit id")]
    IdOutOfRange { field: &'static str, value: i64 },
    #[error(transparent)]
    SpecBuild(#[from] OciSpecError),
}

impl From<PodSandboxError> for Status {
    fn from(err: PodSandboxError) -> Self {
        let msg = err.to_string();
        error!("{msg}");
        match err {
            PodSandboxError::InvalidId { .. }
            | PodSandboxError::ConfigConflict { .. }
            | PodSandboxError::InvalidProfilePath { .. }
            | PodSandboxError::IdOutOfRange { .. } => {
                Status::invalid_argument(msg)
            }
            PodSandboxError::ResolutionFailure { .. }
            | PodSandboxError::LabelInitFailure { .. }
            | PodSandboxError::SpecBuild(_) => Status::internal(msg),
        }
    }
}
