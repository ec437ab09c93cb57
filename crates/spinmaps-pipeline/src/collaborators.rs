// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Interfaces to the work the pipeline delegates: fetching and resampling maps,
drawing figures, and probing the external surface toolkit.

Bundled implementations cover the offline case: [`DirectoryMapSource`] reads
pre-resampled maps from disk and [`WorkbenchProbe`] runs `wb_command`.
*/

use std::path::{Path, PathBuf};
use std::process::Command;

use spinmaps_config::TargetSpec;
use spinmaps_stats::{Hemisphere, SurfaceMap};

use crate::catalog::{PlotSpec, TransformRoute};
use crate::npy;
use crate::summary::NullSummary;
use crate::types::{PipelineError, PipelineResult};

/// A map as delivered by a source, already in the analysis space
#[derive(Debug, Clone, PartialEq)]
pub enum RawMap {
    /// Both hemispheres concatenated, left first
    Full(Vec<f64>),
    /// Per-hemisphere arrays; `None` for an unpublished hemisphere
    Hemispheres {
        left: Option<Vec<f64>>,
        right: Option<Vec<f64>>,
    },
}

/// Fetches a catalog entry and resamples it along `route`
pub trait MapSource: Send + Sync {
    fn fetch(&self, spec: &TargetSpec, route: TransformRoute) -> PipelineResult<RawMap>;
}

/// Draws one surface map
pub trait SurfaceRenderer: Send + Sync {
    fn render(&self, spec: &PlotSpec, map: &SurfaceMap, out_path: &Path) -> PipelineResult<()>;
}

/// Draws the null-distribution summary figure
pub trait SummaryRenderer: Send + Sync {
    fn render(&self, summaries: &[NullSummary], out_path: &Path) -> PipelineResult<()>;
}

/// Checks the external toolkit; returns its version string
pub trait EnvironmentProbe: Send + Sync {
    fn probe(&self) -> PipelineResult<String>;
}

/// Reads maps that were resampled ahead of time.
///
/// For a map named `m` it looks for `m.npy` (both hemispheres) and otherwise
/// `m_L.npy` / `m_R.npy`. The route is not applied; files must already be in
/// the analysis space.
#[derive(Debug, Clone)]
pub struct DirectoryMapSource {
    dir: PathBuf,
}

impl DirectoryMapSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn hemisphere_file(&self, name: &str, hemisphere: Hemisphere) -> PathBuf {
        self.dir.join(format!("{}_{}.npy", name, hemisphere))
    }
}

impl MapSource for DirectoryMapSource {
    fn fetch(&self, spec: &TargetSpec, _route: TransformRoute) -> PipelineResult<RawMap> {
        let read = |path: &Path| {
            npy::read_vector(path).map_err(|e| {
                PipelineError::Collaborator(format!("cannot read '{}': {}", spec.name, e))
            })
        };

        let full = self.dir.join(format!("{}.npy", spec.name));
        if full.exists() {
            return Ok(RawMap::Full(read(&full)?));
        }

        let left = self.hemisphere_file(&spec.name, Hemisphere::Left);
        let right = self.hemisphere_file(&spec.name, Hemisphere::Right);
        let left = if left.exists() { Some(read(&left)?) } else { None };
        let right = if right.exists() { Some(read(&right)?) } else { None };
        if left.is_none() && right.is_none() {
            return Err(PipelineError::Collaborator(format!(
                "no map files for '{}' in {}",
                spec.name,
                self.dir.display()
            )));
        }
        Ok(RawMap::Hemispheres { left, right })
    }
}

/// Runs `wb_command -version` with `bin_dir` prepended to `PATH`
#[derive(Debug, Clone)]
pub struct WorkbenchProbe {
    bin_dir: PathBuf,
}

impl WorkbenchProbe {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
        }
    }
}

impl EnvironmentProbe for WorkbenchProbe {
    fn probe(&self) -> PipelineResult<String> {
        let mut paths = vec![self.bin_dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let path = std::env::join_paths(paths)
            .map_err(|e| PipelineError::Collaborator(format!("invalid PATH entry: {}", e)))?;

        let output = Command::new("wb_command")
            .arg("-version")
            .env("PATH", path)
            .output()
            .map_err(|e| {
                PipelineError::Collaborator(format!("Connectome Workbench not found on PATH: {}", e))
            })?;
        if !output.status.success() {
            return Err(PipelineError::Collaborator(format!(
                "wb_command -version exited with {}",
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
