// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fatal startup errors.
//!
//! The relay is a best-effort datagram bridge: once running, send and
//! receive failures are logged at the point of occurrence and the
//! loops carry on. Only two things abort startup — an unusable
//! configuration and a raw socket we cannot open.

use std::io;

use thiserror::Error;

use crate::config::ConfigError;

/// Errors that terminate the process at startup.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("raw socket init failed (CAP_NET_RAW required): {0}")]
    RawInit(#[source] io::Error),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] io::Error),
}
