// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Box-and-whisker description of a null correlation distribution

use serde::{Deserialize, Serialize};

use crate::types::{StatsError, StatsResult};

/// Quartiles, Tukey whiskers and outlier count of one distribution
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Smallest sample within `q1 - 1.5·IQR`
    pub whisker_low: f64,
    /// Largest sample within `q3 + 1.5·IQR`
    pub whisker_high: f64,
    /// Samples outside the whiskers
    pub outliers: usize,
    /// Finite samples the statistics were computed from
    pub count: usize,
}

impl BoxStats {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Describe the finite samples of `values`; NaN entries are skipped.
    ///
    /// # Errors
    ///
    /// `InsufficientData` when no finite sample remains.
    pub fn from_samples(values: &[f64]) -> StatsResult<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return Err(StatsError::InsufficientData(
                "no finite samples to summarise".to_string(),
            ));
        }
        sorted.sort_by(f64::total_cmp);

        let q1 = quantile_sorted(&sorted, 0.25);
        let median = quantile_sorted(&sorted, 0.5);
        let q3 = quantile_sorted(&sorted, 0.75);
        let reach = 1.5 * (q3 - q1);
        let (low_fence, high_fence) = (q1 - reach, q3 + reach);

        let inside = || sorted.iter().copied().filter(|&v| v >= low_fence && v <= high_fence);
        // The quartiles lie inside the fences, so at least one sample does too
        let whisker_low = inside().next().unwrap_or(q1);
        let whisker_high = inside().last().unwrap_or(q3);
        let outliers = sorted.len() - inside().count();

        Ok(Self {
            q1,
            median,
            q3,
            whisker_low,
            whisker_high,
            outliers,
            count: sorted.len(),
        })
    }
}

/// Linearly interpolated quantile of an ascending, non-empty slice
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    debug_assert!(!sorted.is_empty());
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}
