// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Observed correlation and empirical spin-test p-values.

```text
r0     = pearson(reference, target)
r_i    = pearson(reference, null_i)          i = 1..N
p_spin = (#{ |r_i| >= |r0| } + 1) / (N + 1)
```

The `+1` terms keep `p_spin` in `(0, 1]` for any `N`. A null whose
correlation is undefined (too little overlap, zero variance) is kept as NaN
and never counts as exceeding `r0`.
*/

use serde::{Deserialize, Serialize};

use crate::correlation::{pearson, pearson_slices, MaskPolicy};
use crate::nulls::NullEnsemble;
use crate::surface::SurfaceMap;
use crate::types::{StatsError, StatsResult};

/// One row of `correlations.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRecord {
    pub map_name: String,
    pub r: f64,
    pub p_spin: f64,
    pub n_perm: usize,
}

/// Record plus the per-permutation null correlations
#[derive(Debug, Clone, PartialEq)]
pub struct SpinTestOutcome {
    pub record: CorrelationRecord,
    /// `r_i` for every permutation, in ensemble order (NaN when undefined)
    pub null_r: Vec<f64>,
}

/// Correlate the reference with every null in the ensemble
pub fn null_correlations(
    reference: &SurfaceMap,
    ensemble: &NullEnsemble,
    mask: MaskPolicy,
) -> StatsResult<Vec<f64>> {
    if ensemble.n_parcels() != reference.len() {
        return Err(StatsError::Data(format!(
            "null ensemble of '{}' has {} parcels, reference '{}' has {}",
            ensemble.map_name(),
            ensemble.n_parcels(),
            reference.name,
            reference.len()
        )));
    }
    Ok(ensemble
        .iter()
        .map(|null| {
            pearson(reference.values.iter().copied(), null.iter().copied(), mask)
                .unwrap_or(f64::NAN)
        })
        .collect())
}

/// Empirical two-sided p-value of `observed` against `null_r`.
///
/// # Errors
///
/// `InvalidInput` for an empty null distribution or a non-finite observation.
pub fn empirical_p_value(observed: f64, null_r: &[f64]) -> StatsResult<f64> {
    if null_r.is_empty() {
        return Err(StatsError::InvalidInput(
            "null distribution is empty".to_string(),
        ));
    }
    if !observed.is_finite() {
        return Err(StatsError::InvalidInput(format!(
            "observed statistic {} is not finite",
            observed
        )));
    }
    let threshold = observed.abs();
    let exceed = null_r.iter().filter(|r| r.abs() >= threshold).count();
    Ok((exceed + 1) as f64 / (null_r.len() + 1) as f64)
}

/// Observed correlation, null correlations and `p_spin` for one target.
///
/// # Errors
///
/// - `InsufficientData` when reference and target overlap in fewer than two
///   valid positions
/// - `Data` when lengths disagree
pub fn spin_test(
    reference: &SurfaceMap,
    target: &SurfaceMap,
    ensemble: &NullEnsemble,
    mask: MaskPolicy,
) -> StatsResult<SpinTestOutcome> {
    let r0 = pearson_slices(&reference.values, &target.values, mask).map_err(|e| match e {
        StatsError::InsufficientData(msg) => StatsError::InsufficientData(format!(
            "'{}' vs '{}': {}",
            reference.name, target.name, msg
        )),
        other => other,
    })?;
    let null_r = null_correlations(reference, ensemble, mask)?;
    let p_spin = empirical_p_value(r0, &null_r)?;

    Ok(SpinTestOutcome {
        record: CorrelationRecord {
            map_name: target.name.clone(),
            r: r0,
            p_spin,
            n_perm: ensemble.n_perm(),
        },
        null_r,
    })
}

/// Spin-test significance of `target` against `reference`, masking only
/// sentinel values.
pub fn compute_significance(
    reference: &SurfaceMap,
    target: &SurfaceMap,
    ensemble: &NullEnsemble,
) -> StatsResult<CorrelationRecord> {
    spin_test(reference, target, ensemble, MaskPolicy::default()).map(|outcome| outcome.record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn map(name: &str, values: &[f64]) -> SurfaceMap {
        SurfaceMap::new(name, "p4", values.to_vec())
    }

    fn ensemble_of(rows: &[&[f64]]) -> NullEnsemble {
        let n = rows[0].len();
        let flat: Vec<f64> = rows.iter().flat_map(|r| r.iter().copied()).collect();
        NullEnsemble::from_matrix("t", 0, Array2::from_shape_vec((rows.len(), n), flat).unwrap())
            .unwrap()
    }

    #[test]
    fn test_indistinguishable_target_gives_p_one() {
        let reference = map("ref", &[1.0, 2.0, 3.0, 4.0]);
        let target = map("t", &[4.0, 3.0, 2.0, 1.0]);
        let reversed: &[f64] = &[4.0, 3.0, 2.0, 1.0];
        let ensemble = ensemble_of(&[reversed, reversed, reversed, reversed]);

        let outcome = spin_test(&reference, &target, &ensemble, MaskPolicy::default()).unwrap();
        assert_eq!(outcome.record.r, -1.0);
        assert!(outcome.null_r.iter().all(|&r| r == -1.0));
        assert_eq!(outcome.record.p_spin, 1.0);
        assert_eq!(outcome.record.n_perm, 4);
    }

    #[test]
    fn test_self_correlation_independent_of_nulls() {
        let values = [0.5, 1.5, -2.0, 3.25, 8.0];
        let reference = map("ref", &values);
        let ensemble = ensemble_of(&[&[1.0, 1.0, 1.0, 1.0, 1.0], &[5.0, 4.0, 3.0, 2.0, 1.0]]);
        let record = compute_significance(&reference, &reference, &ensemble).unwrap();
        assert!((record.r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_undefined_null_correlations_do_not_count() {
        let reference = map("ref", &[1.0, 2.0, 3.0, 4.0]);
        let target = map("t", &[1.0, 2.0, 3.0, 4.5]);
        // Constant nulls have no defined correlation
        let ensemble = ensemble_of(&[&[2.0, 2.0, 2.0, 2.0], &[f64::NAN, f64::NAN, 1.0, f64::NAN]]);
        let outcome = spin_test(&reference, &target, &ensemble, MaskPolicy::default()).unwrap();
        assert!(outcome.null_r.iter().all(|r| r.is_nan()));
        assert!((outcome.record.p_spin - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_p_value_minimum() {
        let p = empirical_p_value(0.9, &[0.1, -0.2, 0.3, 0.0]).unwrap();
        assert!((p - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_p_value_counts_absolute_values() {
        let p = empirical_p_value(-0.5, &[0.6, -0.7, 0.1]).unwrap();
        assert!((p - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_empty_nulls_rejected() {
        assert!(matches!(
            empirical_p_value(0.1, &[]),
            Err(StatsError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_insufficient_overlap() {
        let reference = map("ref", &[1.0, f64::NAN, 3.0, f64::NAN]);
        let target = map("t", &[f64::NAN, 2.0, f64::NAN, 4.0]);
        let ensemble = ensemble_of(&[&[1.0, 2.0, 3.0, 4.0]]);
        assert!(matches!(
            compute_significance(&reference, &target, &ensemble),
            Err(StatsError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_ensemble_size_mismatch() {
        let reference = map("ref", &[1.0, 2.0, 3.0, 4.0]);
        let ensemble = ensemble_of(&[&[1.0, 2.0, 3.0]]);
        assert!(matches!(
            null_correlations(&reference, &ensemble, MaskPolicy::default()),
            Err(StatsError::Data(_))
        ));
    }
}
