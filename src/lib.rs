// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # spinmaps - spin-test comparison of cortical surface maps
//!
//! Compares one reference map against a catalog of brain maps: observed
//! Pearson correlation, spin-test significance against spatially
//! autocorrelated nulls, and Benjamini–Hochberg correction across the catalog.
//!
//! ## Crates
//! - **`stats`**: surface model, spin nulls, significance, FDR
//! - **`pipeline`**: stages, artifacts, null cache, collaborator traits
//! - **`config`**: TOML configuration with env/CLI overrides
//! - **`observability`**: logging setup and per-crate debug flags
//!
//! ## Feature Flags
//! - **`parallel`** (default): per-target statistics on rayon
//! - **`file-logging`**: per-run log files
//!
//! ## Usage
//!
//! ```rust
//! use spinmaps::prelude::*;
//!
//! let points = fibonacci_sphere(40);
//! let geometry = ParcellationGeometry::new(
//!     "fib",
//!     vec![
//!         HemisphereGeometry::new(Hemisphere::Left, points.clone())?,
//!         HemisphereGeometry::new(Hemisphere::Right, points.clone())?,
//!     ],
//! )?;
//! let values: Vec<f64> = points.iter().chain(&points).map(|c| c[1]).collect();
//! let reference = SurfaceMap::new("reference", "fib", values.clone());
//! let target = SurfaceMap::new("target", "fib", values);
//!
//! let nulls = generate_nulls(&target, &geometry, 99, derive_seed(42, "target"))?;
//! let record = compute_significance(&reference, &target, &nulls)?;
//! let table = apply_fdr(&[record], DEFAULT_ALPHA)?;
//! assert_eq!(table[0].p_fdr, table[0].p_spin);
//! # Ok::<(), StatsError>(())
//! ```

pub use spinmaps_config as config;
pub use spinmaps_observability as observability;
pub use spinmaps_pipeline as pipeline;
pub use spinmaps_stats as stats;

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::stats::{
        apply_fdr, compute_significance, derive_seed, fibonacci_sphere, generate_nulls,
        spin_test, CorrelationRecord, FdrRecord, Hemisphere, HemisphereGeometry, MaskPolicy,
        NullEnsemble, ParcellationGeometry, StatsError, SurfaceMap, DEFAULT_ALPHA,
    };

    pub use crate::config::{load_config_or_default, validate_config, SpinmapsConfig, TargetSpec};

    pub use crate::pipeline::{Pipeline, PipelineError, RunReport, Stage};
}
