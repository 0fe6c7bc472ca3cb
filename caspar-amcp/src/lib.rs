//! Shared pieces between casparclock and casparctl
//!
//! The AMCP command builders live in [`commands`], the JSON shapes of the
//! HTTP surface in [`types`]. Both binaries depend on this crate so the wire
//! formats cannot drift apart.

pub mod commands;
pub mod types;

pub use commands::{
    add_template_command, format_command, toggle_overlay_command, update_clock_command, Command,
    Target,
};
pub use types::*;

use thiserror::Error;

/// Failures while opening the TCP link to the graphics engine
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection to {addr} timed out after {timeout_ms}ms")]
    Timeout { addr: String, timeout_ms: u64 },

    #[error("No transport available in this context")]
    Unavailable,
}

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 5250;
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 5_000;

/// Prefix every HTTP route is mounted under
pub const API_PREFIX: &str = "/api/caspar";
