// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # spinmaps statistics engine
//!
//! Spatially constrained significance testing between cortical maps:
//! - spin nulls from random hemisphere rotations on the sphere
//! - observed Pearson correlation and empirical p-values
//! - Benjamini–Hochberg correction across a set of targets
//!
//! Every function takes its parameters explicitly (seed, permutation count,
//! alpha); nothing here touches the filesystem.
//!
//! ## Usage
//!
//! ```rust
//! use spinmaps_stats::{
//!     compute_significance, derive_seed, fibonacci_sphere, generate_nulls, Hemisphere,
//!     HemisphereGeometry, ParcellationGeometry, SurfaceMap,
//! };
//!
//! let geometry = ParcellationGeometry::new(
//!     "demo",
//!     vec![
//!         HemisphereGeometry::new(Hemisphere::Left, fibonacci_sphere(50)).unwrap(),
//!         HemisphereGeometry::new(Hemisphere::Right, fibonacci_sphere(50)).unwrap(),
//!     ],
//! )
//! .unwrap();
//! let values: Vec<f64> = (0..100).map(|i| (i % 17) as f64).collect();
//! let reference = SurfaceMap::new("ref", "demo", values.clone());
//! let target = SurfaceMap::new("target", "demo", values.iter().map(|v| v * 2.0).collect());
//!
//! let nulls = generate_nulls(&target, &geometry, 100, derive_seed(42, "target")).unwrap();
//! let record = compute_significance(&reference, &target, &nulls).unwrap();
//! assert!(record.p_spin > 0.0 && record.p_spin <= 1.0);
//! ```

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod correlation;
pub mod distribution;
pub mod fdr;
pub mod kdtree;
pub mod nulls;
pub mod rotation;
pub mod seed;
pub mod significance;
pub mod surface;
pub mod types;

pub use correlation::{pearson, pearson_slices, MaskPolicy};
pub use distribution::{quantile_sorted, BoxStats};
pub use fdr::{apply_fdr, bh_adjust, bh_reject, FdrRecord, DEFAULT_ALPHA};
pub use nulls::{generate_nulls, NullEnsemble};
pub use seed::{derive_seed, rng_from_seed, NullRng};
pub use significance::{
    compute_significance, empirical_p_value, null_correlations, spin_test, CorrelationRecord,
    SpinTestOutcome,
};
pub use surface::{
    fibonacci_sphere, is_defined, Hemisphere, HemisphereGeometry, ParcellationGeometry,
    SurfaceMap, SENTINEL,
};
pub use types::{StatsError, StatsResult};
