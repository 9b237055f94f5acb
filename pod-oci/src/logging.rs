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

use tracing::Level;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error(transparent)]
    TryInitError(#[from] tracing_subscriber::util::TryInitError),
}

/// Logs to stderr, leaving stdout to the command output.
///
/// Normal mode: Info, Warn, Error
/// Verbose mode: Debug, Trace, Info, Warn, Error
pub fn init(verbose: bool) -> Result<(), LoggingError> {
    let tracing_level = if verbose { Level::TRACE } else { Level::INFO };

    let stderr_layer = tracing_subscriber::Layer::with_filter(
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr),
        EnvFilter::new(format!("pod_oci={tracing_level}")),
    );

    tracing_subscriber::registry()
        .with(stderr_layer)
        .try_init()
        .map_err(|e| e.into())
}
