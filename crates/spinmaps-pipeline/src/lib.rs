// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
# spinmaps-pipeline

Runs a catalog comparison end to end: brings maps into the analysis space,
spin-tests every target against the reference, corrects for multiple
comparisons and prepares everything the figures need. Each stage persists its
results under the output directory so later stages can run on their own.

## Features
- `parallel` (default): per-target statistics on the rayon pool

## Example

```no_run
use spinmaps_config::load_config_or_default;
use spinmaps_pipeline::Pipeline;

let config = load_config_or_default(None, None)?;
let report = Pipeline::from_config(config).run_all()?;
println!("{} of {} targets significant", report.significant, report.targets);
# Ok::<(), spinmaps_pipeline::PipelineError>(())
```
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod artifacts;
pub mod cache;
pub mod catalog;
pub mod collaborators;
pub mod npy;
pub mod outcome;
pub mod pipeline;
pub mod summary;
pub mod types;

pub use artifacts::{ArtifactLayout, CorrelationRow, FdrRow, ManifestEntry, TransformManifest};
pub use cache::{DiskNullCache, MemoryNullCache, NullCache, NullCacheKey};
pub use catalog::{PlotSpec, TransformRoute};
pub use collaborators::{
    DirectoryMapSource, EnvironmentProbe, MapSource, RawMap, SummaryRenderer, SurfaceRenderer,
    WorkbenchProbe,
};
pub use outcome::TargetOutcome;
pub use pipeline::{Pipeline, RunReport, Stage};
pub use summary::NullSummary;
pub use types::{PipelineError, PipelineResult};
