// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Core types for spin-test statistics.
*/

/// Result type for statistics operations
pub type StatsResult<T> = Result<T, StatsError>;

/// Errors that can occur while building nulls or computing significance
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatsError {
    /// Malformed map or geometry, or a map with no defined parcel
    #[error("Data error: {0}")]
    Data(String),

    /// Too few valid overlapping positions for a correlation
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Out-of-range probabilities, alpha, or permutation count
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl StatsError {
    /// Whether the error concerns a single map and may be skipped by a caller
    /// processing many maps.
    pub fn is_per_map(&self) -> bool {
        matches!(self, StatsError::Data(_) | StatsError::InsufficientData(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_map_classification() {
        assert!(StatsError::Data("x".into()).is_per_map());
        assert!(StatsError::InsufficientData("x".into()).is_per_map());
        assert!(!StatsError::InvalidInput("x".into()).is_per_map());
    }
}
