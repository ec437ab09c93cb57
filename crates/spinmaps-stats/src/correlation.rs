// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Masked Pearson correlation

use serde::{Deserialize, Serialize};

use crate::surface::is_defined;
use crate::types::{StatsError, StatsResult};

/// Which positions take part in a correlation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskPolicy {
    /// Also drop positions where either value is exactly zero
    pub ignore_zero: bool,
}

impl MaskPolicy {
    #[inline]
    pub fn keeps(&self, a: f64, b: f64) -> bool {
        is_defined(a) && is_defined(b) && !(self.ignore_zero && (a == 0.0 || b == 0.0))
    }
}

/// Pearson correlation over the positions `mask` keeps.
///
/// Two-pass (centred) sums; the result is clamped to `[-1, 1]`.
///
/// # Errors
///
/// `InsufficientData` when fewer than two positions overlap or either side
/// has zero variance over the overlap. `Data` when lengths differ.
pub fn pearson<A, B>(a: A, b: B, mask: MaskPolicy) -> StatsResult<f64>
where
    A: IntoIterator<Item = f64>,
    B: IntoIterator<Item = f64>,
    A::IntoIter: ExactSizeIterator,
    B::IntoIter: ExactSizeIterator,
{
    let a = a.into_iter();
    let b = b.into_iter();
    if a.len() != b.len() {
        return Err(StatsError::Data(format!(
            "cannot correlate maps of length {} and {}",
            a.len(),
            b.len()
        )));
    }
    let pairs: Vec<(f64, f64)> = a.zip(b).filter(|&(x, y)| mask.keeps(x, y)).collect();
    if pairs.len() < 2 {
        return Err(StatsError::InsufficientData(format!(
            "{} valid overlapping positions, need at least 2",
            pairs.len()
        )));
    }

    let n = pairs.len() as f64;
    let (sum_x, sum_y) = pairs
        .iter()
        .fold((0.0, 0.0), |(sx, sy), &(x, y)| (sx + x, sy + y));
    let (mean_x, mean_y) = (sum_x / n, sum_y / n);

    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for &(x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return Err(StatsError::InsufficientData(
            "zero variance over the valid overlap".to_string(),
        ));
    }
    Ok((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// Convenience wrapper over slices
pub fn pearson_slices(a: &[f64], b: &[f64], mask: MaskPolicy) -> StatsResult<f64> {
    pearson(a.iter().copied(), b.iter().copied(), mask)
}
