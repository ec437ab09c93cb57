// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Benjamini–Hochberg false-discovery-rate correction over a full record set

use serde::{Deserialize, Serialize};

use crate::significance::CorrelationRecord;
use crate::types::{StatsError, StatsResult};

/// FDR level used when none is configured
pub const DEFAULT_ALPHA: f64 = 0.05;

/// Correlation record with its adjusted p-value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdrRecord {
    pub map_name: String,
    pub r: f64,
    pub p_spin: f64,
    pub n_perm: usize,
    pub p_fdr: f64,
    pub significant: bool,
}

impl FdrRecord {
    fn from_record(record: &CorrelationRecord, p_fdr: f64, significant: bool) -> Self {
        Self {
            map_name: record.map_name.clone(),
            r: record.r,
            p_spin: record.p_spin,
            n_perm: record.n_perm,
            p_fdr,
            significant,
        }
    }
}

/// Benjamini–Hochberg adjusted p-values, in input order.
///
/// `q_(k) = min_{j >= k} (m / j) · p_(j)`, capped at 1 and never below
/// `p_(k)` after rounding.
pub fn bh_adjust(p_values: &[f64]) -> StatsResult<Vec<f64>> {
    validate_p_values(p_values)?;
    let m = p_values.len();
    let order = ascending_order(p_values);

    let mut adjusted = vec![0.0; m];
    let mut running_min = 1.0_f64;
    for (rank0, &idx) in order.iter().enumerate().rev() {
        let rank = rank0 + 1;
        let scaled = (p_values[idx] * m as f64 / rank as f64).max(p_values[idx]);
        running_min = running_min.min(scaled);
        adjusted[idx] = running_min;
    }
    Ok(adjusted)
}

/// Step-up rejection flags at `alpha`, in input order.
///
/// Rejects every hypothesis ranked at or below the largest rank `k` with
/// `p_(k) <= (k / m) · alpha`. Read off the adjusted values as
/// `q <= alpha`, so the flags always agree with [`bh_adjust`].
pub fn bh_reject(p_values: &[f64], alpha: f64) -> StatsResult<Vec<bool>> {
    validate_alpha(alpha)?;
    Ok(bh_adjust(p_values)?.into_iter().map(|q| q <= alpha).collect())
}

/// Apply BH correction to the complete set of records from one run.
///
/// Output keeps the input order.
///
/// # Errors
///
/// `InvalidInput` for an empty set, a `p_spin` outside `[0, 1]` (no
/// clamping), or `alpha` outside `(0, 1)`.
pub fn apply_fdr(records: &[CorrelationRecord], alpha: f64) -> StatsResult<Vec<FdrRecord>> {
    validate_alpha(alpha)?;
    let p_values: Vec<f64> = records.iter().map(|r| r.p_spin).collect();
    let adjusted = bh_adjust(&p_values)?;

    Ok(records
        .iter()
        .zip(adjusted)
        .map(|(record, p_fdr)| FdrRecord::from_record(record, p_fdr, p_fdr <= alpha))
        .collect())
}

fn validate_alpha(alpha: f64) -> StatsResult<()> {
    if !(alpha > 0.0 && alpha < 1.0) {
        return Err(StatsError::InvalidInput(format!(
            "alpha must lie in (0, 1), got {}",
            alpha
        )));
    }
    Ok(())
}

fn validate_p_values(p_values: &[f64]) -> StatsResult<()> {
    if p_values.is_empty() {
        return Err(StatsError::InvalidInput(
            "FDR correction needs at least one p-value".to_string(),
        ));
    }
    if let Some((idx, p)) = p_values
        .iter()
        .enumerate()
        .find(|(_, p)| !(**p >= 0.0 && **p <= 1.0))
    {
        return Err(StatsError::InvalidInput(format!(
            "p-value #{} = {} lies outside [0, 1]",
            idx, p
        )));
    }
    Ok(())
}

/// Indices sorted by ascending p; ties keep input order
fn ascending_order(p_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records(p: &[f64]) -> Vec<CorrelationRecord> {
        p.iter()
            .enumerate()
            .map(|(i, &p_spin)| CorrelationRecord {
                map_name: format!("m{}", i),
                r: 0.1 * i as f64,
                p_spin,
                n_perm: 1000,
            })
            .collect()
    }

    #[test]
    fn test_three_maps() {
        let out = apply_fdr(&records(&[0.01, 0.04, 0.20]), 0.05).unwrap();
        let p_fdr: Vec<f64> = out.iter().map(|r| r.p_fdr).collect();
        assert!((p_fdr[0] - 0.03).abs() < 1e-12);
        assert!((p_fdr[1] - 0.06).abs() < 1e-12);
        assert!((p_fdr[2] - 0.20).abs() < 1e-12);
        assert_eq!(
            out.iter().map(|r| r.significant).collect::<Vec<_>>(),
            vec![true, false, false]
        );
    }

    #[test]
    fn test_step_up_rescues_lower_ranks() {
        // Rank 2 fails its own threshold but rank 3 passes, so all three reject
        let reject = bh_reject(&[0.01, 0.035, 0.04], 0.05).unwrap();
        assert_eq!(reject, vec![true, true, true]);
        let adjusted = bh_adjust(&[0.01, 0.035, 0.04]).unwrap();
        assert!(adjusted.iter().all(|&q| (q - 0.04).abs() < 1e-12 || (q - 0.03).abs() < 1e-12));
    }

    #[test]
    fn test_preserves_input_order() {
        let out = apply_fdr(&records(&[0.2, 0.001, 0.5, 0.03]), 0.05).unwrap();
        let names: Vec<&str> = out.iter().map(|r| r.map_name.as_str()).collect();
        assert_eq!(names, vec!["m0", "m1", "m2", "m3"]);
        assert!((out[1].p_fdr - 0.004).abs() < 1e-12);
        assert!((out[3].p_fdr - 0.06).abs() < 1e-12);
    }

    #[test]
    fn test_single_map_is_unchanged() {
        let out = apply_fdr(&records(&[0.037]), 0.05).unwrap();
        assert_eq!(out[0].p_fdr, 0.037);
        assert!(out[0].significant);
    }

    #[test]
    fn test_adjusted_capped_at_one() {
        let adjusted = bh_adjust(&[0.9, 0.95, 1.0]).unwrap();
        assert!(adjusted.iter().all(|&q| q <= 1.0));
        assert_eq!(adjusted[2], 1.0);
    }

    #[test]
    fn test_out_of_range_rejected() {
        for bad in [-0.01, 1.5, f64::NAN] {
            assert!(matches!(
                apply_fdr(&records(&[0.01, bad]), 0.05),
                Err(StatsError::InvalidInput(_))
            ));
        }
    }

    #[test]
    fn test_empty_and_bad_alpha_rejected() {
        assert!(matches!(apply_fdr(&[], 0.05), Err(StatsError::InvalidInput(_))));
        assert!(matches!(
            apply_fdr(&records(&[0.01]), 0.0),
            Err(StatsError::InvalidInput(_))
        ));
        assert!(matches!(
            apply_fdr(&records(&[0.01]), 1.0),
            Err(StatsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_adjusted_never_below_raw_after_rounding() {
        let out = apply_fdr(&records(&[0.6959236013512349, 0.0, 0.0]), 0.05).unwrap();
        for row in &out {
            assert!(row.p_fdr >= row.p_spin, "{} < {}", row.p_fdr, row.p_spin);
        }
    }

    #[test]
    fn test_flag_matches_adjusted_at_threshold() {
        let out = apply_fdr(&records(&[0.0125, 0.0375, 0.0125, 0.0875]), 0.05).unwrap();
        for row in &out {
            assert_eq!(row.significant, row.p_fdr <= 0.05, "{:?}", row);
        }
        assert!(out[0].significant && out[2].significant);
        assert!(!out[3].significant);

        // p values sitting exactly on the k/m·alpha lines
        for m in 1..=24usize {
            let p: Vec<f64> = (1..=m).map(|k| 0.05 * k as f64 / m as f64).collect();
            for row in apply_fdr(&records(&p), 0.05).unwrap() {
                assert_eq!(row.significant, row.p_fdr <= 0.05);
            }
            let reject = bh_reject(&p, 0.05).unwrap();
            let adjusted = bh_adjust(&p).unwrap();
            for (flag, q) in reject.iter().zip(&adjusted) {
                assert_eq!(*flag, *q <= 0.05);
            }
        }
    }

    #[test]
    fn test_ties_share_adjusted_value() {
        let adjusted = bh_adjust(&[0.02, 0.02, 0.02]).unwrap();
        assert!(adjusted.iter().all(|&q| (q - 0.02).abs() < 1e-12));
    }
}
