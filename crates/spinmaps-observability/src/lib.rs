// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # spinmaps-observability
//!
//! Logging setup shared by the spinmaps binaries, with per-crate debug flag
//! support.
//!
//! ## Features
//! - `file-logging`: per-crate log files in a timestamped run folder

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod init;

pub use cli::*;
pub use init::*;

/// Known spinmaps crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "spinmaps",
    "spinmaps-stats",
    "spinmaps-pipeline",
    "spinmaps-config",
];

/// Tracing target of a crate (module paths use underscores)
pub fn crate_target(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
