// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-target summaries of the null correlation distributions

use serde::{Deserialize, Serialize};
use spinmaps_stats::{BoxStats, StatsError};

use crate::artifacts::FdrRow;
use crate::types::PipelineResult;

/// One row of `boxplot_summary.csv`: the box of a target's null `r_i` plus
/// its observed statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NullSummary {
    pub map_name: String,
    pub label: String,
    pub r: f64,
    pub p_spin: f64,
    pub p_fdr: f64,
    pub significant: bool,
    /// Finite null correlations summarised
    pub n_null: usize,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub whisker_low: f64,
    pub whisker_high: f64,
    pub outliers: usize,
}

impl NullSummary {
    /// Summarise `null_r` for a completed FDR row.
    ///
    /// # Errors
    ///
    /// `InsufficientData` if the row carries no statistics or no null
    /// correlation is finite.
    pub fn new(row: &FdrRow, label: impl Into<String>, null_r: &[f64]) -> PipelineResult<Self> {
        let (r, p_spin, p_fdr, significant) = match (row.r, row.p_spin, row.p_fdr, row.significant)
        {
            (Some(r), Some(p_spin), Some(p_fdr), Some(significant)) if row.error.is_none() => {
                (r, p_spin, p_fdr, significant)
            }
            _ => {
                return Err(StatsError::InsufficientData(format!(
                    "'{}' has no FDR statistics",
                    row.map_name
                ))
                .into())
            }
        };
        let stats = BoxStats::from_samples(null_r).map_err(|e| match e {
            StatsError::InsufficientData(msg) => {
                StatsError::InsufficientData(format!("'{}': {}", row.map_name, msg))
            }
            other => other,
        })?;

        Ok(Self {
            map_name: row.map_name.clone(),
            label: label.into(),
            r,
            p_spin,
            p_fdr,
            significant,
            n_null: stats.count,
            q1: stats.q1,
            median: stats.median,
            q3: stats.q3,
            whisker_low: stats.whisker_low,
            whisker_high: stats.whisker_high,
            outliers: stats.outliers,
        })
    }

    /// Whether the observed correlation lies outside the whiskers
    pub fn observed_outside_whiskers(&self) -> bool {
        self.r < self.whisker_low || self.r > self.whisker_high
    }
}
