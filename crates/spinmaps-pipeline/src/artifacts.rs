// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
On-disk artifacts shared between stages.

```text
<out_dir>/
  maps/<name>.npy             analysis-space maps (transform)
  transform_manifest.json     per-map transform status (transform)
  nulls/<name>.npy            null correlations r_i (stats)
  correlations.csv            map_name,r,p_spin,n_perm,error (stats)
  correlations_fdr.csv        ... + p_fdr,significant (fdr)
  figs/plot_specs.json        resolved plot specs (visualize)
  boxplot_summary.csv         null distribution summaries (summarize)
  cache/<name>/<key>.npy      cached null ensembles (disk cache)
```
*/

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use spinmaps_stats::{
    CorrelationRecord, FdrRecord, Hemisphere, HemisphereGeometry, ParcellationGeometry,
    StatsError,
};

use crate::catalog::TransformRoute;
use crate::types::{PipelineError, PipelineResult};

/// Paths of every artifact under one output directory
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn maps_dir(&self) -> PathBuf {
        self.root.join("maps")
    }

    pub fn map_path(&self, name: &str) -> PathBuf {
        self.maps_dir().join(format!("{}.npy", name))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join("transform_manifest.json")
    }

    pub fn nulls_dir(&self) -> PathBuf {
        self.root.join("nulls")
    }

    pub fn null_path(&self, name: &str) -> PathBuf {
        self.nulls_dir().join(format!("{}.npy", name))
    }

    pub fn correlations_path(&self) -> PathBuf {
        self.root.join("correlations.csv")
    }

    pub fn fdr_path(&self) -> PathBuf {
        self.root.join("correlations_fdr.csv")
    }

    pub fn figs_dir(&self) -> PathBuf {
        self.root.join("figs")
    }

    pub fn plot_specs_path(&self) -> PathBuf {
        self.figs_dir().join("plot_specs.json")
    }

    pub fn figure_path(&self, name: &str) -> PathBuf {
        self.figs_dir().join(format!("{}.png", name))
    }

    pub fn boxplot_figure_path(&self) -> PathBuf {
        self.figs_dir().join("boxplots.png")
    }

    pub fn boxplot_summary_path(&self) -> PathBuf {
        self.root.join("boxplot_summary.csv")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("cache")
    }
}

/// `path` if it exists, otherwise a `MissingArtifact` naming the stage that
/// produces it
pub fn require<'p>(path: &'p Path, produced_by: &str) -> PipelineResult<&'p Path> {
    if path.exists() {
        Ok(path)
    } else {
        Err(PipelineError::MissingArtifact(format!(
            "{} (run the '{}' stage first)",
            path.display(),
            produced_by
        )))
    }
}

pub(crate) fn ensure_parent(path: &Path) -> PipelineResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// One row of `correlations.csv`; statistics are empty for failed targets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRow {
    pub map_name: String,
    pub r: Option<f64>,
    pub p_spin: Option<f64>,
    pub n_perm: Option<usize>,
    pub error: Option<String>,
}

impl CorrelationRow {
    pub fn completed(record: &CorrelationRecord) -> Self {
        Self {
            map_name: record.map_name.clone(),
            r: Some(record.r),
            p_spin: Some(record.p_spin),
            n_perm: Some(record.n_perm),
            error: None,
        }
    }

    pub fn failed(map_name: &str, error: &str) -> Self {
        Self {
            map_name: map_name.to_string(),
            r: None,
            p_spin: None,
            n_perm: None,
            error: Some(error.to_string()),
        }
    }

    /// The record behind a successful row
    pub fn record(&self) -> Option<CorrelationRecord> {
        match (self.error.as_deref(), self.r, self.p_spin, self.n_perm) {
            (None, Some(r), Some(p_spin), Some(n_perm)) => Some(CorrelationRecord {
                map_name: self.map_name.clone(),
                r,
                p_spin,
                n_perm,
            }),
            _ => None,
        }
    }
}

/// One row of `correlations_fdr.csv`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FdrRow {
    pub map_name: String,
    pub r: Option<f64>,
    pub p_spin: Option<f64>,
    pub n_perm: Option<usize>,
    pub p_fdr: Option<f64>,
    pub significant: Option<bool>,
    pub error: Option<String>,
}

impl FdrRow {
    pub fn completed(record: &FdrRecord) -> Self {
        Self {
            map_name: record.map_name.clone(),
            r: Some(record.r),
            p_spin: Some(record.p_spin),
            n_perm: Some(record.n_perm),
            p_fdr: Some(record.p_fdr),
            significant: Some(record.significant),
            error: None,
        }
    }

    /// Placeholder carrying over a failed correlation row
    pub fn carried(row: &CorrelationRow) -> Self {
        Self {
            map_name: row.map_name.clone(),
            r: row.r,
            p_spin: row.p_spin,
            n_perm: row.n_perm,
            p_fdr: None,
            significant: None,
            error: row.error.clone(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.error.is_none() && self.p_fdr.is_some()
    }
}

pub fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> PipelineResult<()> {
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn read_rows<T: for<'de> Deserialize<'de>>(path: &Path) -> PipelineResult<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path)?;
    let rows = reader.deserialize().collect::<Result<Vec<T>, _>>()?;
    Ok(rows)
}

/// Transform outcome of one map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    pub route: Option<TransformRoute>,
    /// Defined (non-NaN) parcels after assembly; absent for failures
    pub defined_parcels: Option<usize>,
    pub error: Option<String>,
}

impl ManifestEntry {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Contents of `transform_manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformManifest {
    pub parcellation: String,
    pub n_parcels: usize,
    pub reference: ManifestEntry,
    /// Catalog order
    pub targets: Vec<ManifestEntry>,
}

impl TransformManifest {
    pub fn target(&self, name: &str) -> Option<&ManifestEntry> {
        self.targets.iter().find(|t| t.name == name)
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    ensure_parent(path)?;
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> PipelineResult<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[derive(Debug, Deserialize)]
struct GeometryRow {
    hemisphere: String,
    x: f64,
    y: f64,
    z: f64,
}

/// Load a `hemisphere,x,y,z` CSV. Rows are grouped left hemisphere first.
///
/// # Errors
///
/// `MissingArtifact` if the file is absent; `Stats(Data)` for unknown
/// hemisphere tags, interleaved hemispheres or invalid coordinates.
pub fn load_geometry_csv(path: &Path, name: &str) -> PipelineResult<ParcellationGeometry> {
    if !path.exists() {
        return Err(PipelineError::MissingArtifact(format!(
            "sphere geometry {} (set inputs.geometry_path)",
            path.display()
        )));
    }
    let rows: Vec<GeometryRow> = read_rows(path)?;

    let mut blocks: Vec<(Hemisphere, Vec<[f64; 3]>)> = Vec::new();
    for (line, row) in rows.iter().enumerate() {
        let hemisphere = Hemisphere::parse(&row.hemisphere).ok_or_else(|| {
            StatsError::Data(format!(
                "{}: row {} has unknown hemisphere '{}'",
                path.display(),
                line + 1,
                row.hemisphere
            ))
        })?;
        let point = [row.x, row.y, row.z];
        match blocks.last().map(|(current, _)| *current) {
            Some(current) if current == hemisphere => {
                if let Some((_, coords)) = blocks.last_mut() {
                    coords.push(point);
                }
            }
            Some(Hemisphere::Right) => {
                return Err(StatsError::Data(format!(
                    "{}: row {} lists a left-hemisphere parcel after the right hemisphere",
                    path.display(),
                    line + 1
                ))
                .into())
            }
            _ => blocks.push((hemisphere, vec![point])),
        }
    }

    let hemispheres = blocks
        .into_iter()
        .map(|(hemisphere, coords)| HemisphereGeometry::new(hemisphere, coords))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParcellationGeometry::new(name, hemispheres)?)
}
