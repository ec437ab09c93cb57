// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core error types for the pipeline.
*/

use spinmaps_config::ConfigError;
use spinmaps_stats::StatsError;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while running pipeline stages
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Stats(#[from] StatsError),

    /// A prerequisite artifact of an earlier stage is absent or incomplete
    #[error("Missing artifact: {0}")]
    MissingArtifact(String),

    /// A map source, renderer or environment probe failed
    #[error("Collaborator failed: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed or unsupported NPY file
    #[error("NPY error: {0}")]
    Npy(String),
}

impl PipelineError {
    /// Whether the error concerns one target and should become a placeholder
    /// row instead of aborting the stage.
    pub fn is_per_target(&self) -> bool {
        match self {
            PipelineError::Stats(e) => e.is_per_map(),
            PipelineError::Collaborator(_) => true,
            _ => false,
        }
    }

    /// Short failure category written next to placeholder rows
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Stats(StatsError::Data(_)) => "data",
            PipelineError::Stats(StatsError::InsufficientData(_)) => "insufficient_data",
            PipelineError::Stats(StatsError::InvalidInput(_)) => "invalid_input",
            PipelineError::MissingArtifact(_) => "missing_artifact",
            PipelineError::Collaborator(_) => "collaborator",
            PipelineError::Config(_) => "config",
            PipelineError::Io(_) => "io",
            PipelineError::Csv(_) => "csv",
            PipelineError::Json(_) => "json",
            PipelineError::Npy(_) => "npy",
        }
    }
}
