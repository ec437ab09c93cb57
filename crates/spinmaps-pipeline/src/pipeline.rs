// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

/*!
Stage orchestration.

```text
env-check → transform → stats → fdr → visualize → summarize
```

Every stage reads its inputs from the artifacts of earlier stages and can be
run on its own. A missing prerequisite is reported as
[`PipelineError::MissingArtifact`]; it is never recomputed implicitly.

Per-target failures (no route, fetch failure, empty map, too little overlap)
are logged and recorded as placeholder rows. Everything else aborts the stage.
*/

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use spinmaps_config::{HemisphereFill, SpinmapsConfig, TargetSpec};
use spinmaps_stats::{
    apply_fdr, derive_seed, generate_nulls, spin_test, CorrelationRecord, MaskPolicy,
    NullEnsemble, ParcellationGeometry, StatsError, SurfaceMap,
};

use crate::artifacts::{
    self, load_geometry_csv, require, ArtifactLayout, CorrelationRow, FdrRow, ManifestEntry,
    TransformManifest,
};
use crate::cache::{cache_for_mode, NullCache, NullCacheKey};
use crate::catalog::{display_label, PlotSpec, TransformRoute, ANALYSIS_DENSITY, ANALYSIS_SPACE};
use crate::collaborators::{
    DirectoryMapSource, EnvironmentProbe, MapSource, RawMap, SummaryRenderer, SurfaceRenderer,
    WorkbenchProbe,
};
use crate::npy;
use crate::outcome::{partition, TargetOutcome};
use crate::summary::NullSummary;
use crate::types::{PipelineError, PipelineResult};

/// One pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    EnvCheck,
    Transform,
    Stats,
    Fdr,
    Visualize,
    Summarize,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 6] = [
        Stage::EnvCheck,
        Stage::Transform,
        Stage::Stats,
        Stage::Fdr,
        Stage::Visualize,
        Stage::Summarize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::EnvCheck => "env-check",
            Stage::Transform => "transform",
            Stage::Stats => "stats",
            Stage::Fdr => "fdr",
            Stage::Visualize => "visualize",
            Stage::Summarize => "summarize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "env-check" | "env" => Ok(Stage::EnvCheck),
            "transform" | "transforms" => Ok(Stage::Transform),
            "stats" => Ok(Stage::Stats),
            "fdr" => Ok(Stage::Fdr),
            "visualize" | "viz" => Ok(Stage::Visualize),
            "summarize" | "results" => Ok(Stage::Summarize),
            other => Err(format!("unknown stage '{}'", other)),
        }
    }
}

/// Totals of a full run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub targets: usize,
    pub completed: usize,
    pub failed: usize,
    pub significant: usize,
}

impl RunReport {
    fn from_rows(rows: &[FdrRow]) -> Self {
        let completed = rows.iter().filter(|r| r.is_completed()).count();
        Self {
            targets: rows.len(),
            completed,
            failed: rows.len() - completed,
            significant: rows.iter().filter(|r| r.significant == Some(true)).count(),
        }
    }
}

/// Runs the stages for one configuration
pub struct Pipeline {
    config: SpinmapsConfig,
    layout: ArtifactLayout,
    source: Arc<dyn MapSource>,
    probe: Option<Arc<dyn EnvironmentProbe>>,
    surface_renderer: Option<Arc<dyn SurfaceRenderer>>,
    summary_renderer: Option<Arc<dyn SummaryRenderer>>,
    null_cache: Option<Arc<dyn NullCache>>,
    geometry: Option<Arc<ParcellationGeometry>>,
}

impl Pipeline {
    /// Pipeline reading maps through `source`. The environment probe is
    /// Workbench at the configured path and the null cache follows
    /// `stats.null_cache`.
    pub fn new(config: SpinmapsConfig, source: Arc<dyn MapSource>) -> Self {
        let layout = ArtifactLayout::new(config.run.out_dir.clone());
        let null_cache = cache_for_mode(config.stats.null_cache, layout.cache_dir());
        let probe: Arc<dyn EnvironmentProbe> =
            Arc::new(WorkbenchProbe::new(config.inputs.workbench_path.clone()));
        Self {
            config,
            layout,
            source,
            probe: Some(probe),
            surface_renderer: None,
            summary_renderer: None,
            null_cache,
            geometry: None,
        }
    }

    /// Pipeline reading pre-resampled maps from `inputs.maps_dir`
    pub fn from_config(config: SpinmapsConfig) -> Self {
        let source = Arc::new(DirectoryMapSource::new(config.inputs.maps_dir.clone()));
        Self::new(config, source)
    }

    /// Replace the environment probe; `None` skips the check
    pub fn with_probe(mut self, probe: Option<Arc<dyn EnvironmentProbe>>) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_surface_renderer(mut self, renderer: Arc<dyn SurfaceRenderer>) -> Self {
        self.surface_renderer = Some(renderer);
        self
    }

    pub fn with_summary_renderer(mut self, renderer: Arc<dyn SummaryRenderer>) -> Self {
        self.summary_renderer = Some(renderer);
        self
    }

    /// Replace the configured null cache; `None` disables caching
    pub fn with_null_cache(mut self, cache: Option<Arc<dyn NullCache>>) -> Self {
        self.null_cache = cache;
        self
    }

    /// Use an in-memory geometry instead of `inputs.geometry_path`
    pub fn with_geometry(mut self, geometry: ParcellationGeometry) -> Self {
        self.geometry = Some(Arc::new(geometry));
        self
    }

    pub fn config(&self) -> &SpinmapsConfig {
        &self.config
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    fn targets(&self) -> &[TargetSpec] {
        &self.config.catalog.targets
    }

    fn mask(&self) -> MaskPolicy {
        MaskPolicy {
            ignore_zero: self.config.stats.ignore_zero,
        }
    }

    fn load_geometry(&self) -> PipelineResult<Arc<ParcellationGeometry>> {
        match &self.geometry {
            Some(geometry) => Ok(Arc::clone(geometry)),
            None => Ok(Arc::new(load_geometry_csv(
                &self.config.inputs.geometry_path,
                &self.config.inputs.parcellation,
            )?)),
        }
    }

    fn load_map(&self, name: &str, parcellation: &str) -> PipelineResult<SurfaceMap> {
        let path = self.layout.map_path(name);
        let values = npy::read_vector(require(&path, Stage::Transform.as_str())?)?;
        Ok(SurfaceMap::new(name, parcellation, values))
    }

    fn read_fdr_rows(&self) -> PipelineResult<Vec<FdrRow>> {
        let path = self.layout.fdr_path();
        artifacts::read_rows(require(&path, Stage::Fdr.as_str())?)
    }

    /// Run one stage
    pub fn run_stage(&self, stage: Stage) -> PipelineResult<()> {
        info!(stage = %stage, out_dir = %self.layout.root().display(), "running stage");
        match stage {
            Stage::EnvCheck => {
                self.run_env_check();
            }
            Stage::Transform => {
                self.run_transform()?;
            }
            Stage::Stats => {
                self.run_stats()?;
            }
            Stage::Fdr => {
                self.run_fdr()?;
            }
            Stage::Visualize => {
                self.run_visualize()?;
            }
            Stage::Summarize => {
                self.run_summarize()?;
            }
        }
        Ok(())
    }

    /// Run every stage in order
    pub fn run_all(&self) -> PipelineResult<RunReport> {
        for stage in Stage::ALL {
            self.run_stage(stage)?;
        }
        let report = RunReport::from_rows(&self.read_fdr_rows()?);
        info!(
            targets = report.targets,
            completed = report.completed,
            failed = report.failed,
            significant = report.significant,
            "pipeline complete"
        );
        Ok(report)
    }

    /// Remove the output directory
    pub fn clean(&self) -> PipelineResult<()> {
        let root = self.layout.root();
        if root.exists() {
            fs::remove_dir_all(root)?;
            info!(out_dir = %root.display(), "removed outputs");
        }
        Ok(())
    }

    /// Probe the surface toolkit. Failure is only a warning.
    pub fn run_env_check(&self) -> Option<String> {
        let probe = self.probe.as_ref()?;
        match probe.probe() {
            Ok(version) => {
                info!(version = %version, "surface toolkit available");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "surface toolkit unavailable; transforms needing it will fail");
                None
            }
        }
    }

    /// Bring the reference and every catalog map into the analysis space.
    ///
    /// Writes `maps/<name>.npy` for every success and the transform manifest.
    ///
    /// # Errors
    ///
    /// A reference failure, or any failure that does not concern one target.
    pub fn run_transform(&self) -> PipelineResult<TransformManifest> {
        let geometry = self.load_geometry()?;
        fs::create_dir_all(self.layout.maps_dir())?;

        let reference_spec = &self.config.inputs.reference;
        let reference = self.transform_target(reference_spec, &geometry)?;
        info!(map = %reference_spec.name, defined = reference.defined_parcels.unwrap_or(0), "reference map ready");

        let mut entries = Vec::with_capacity(self.targets().len());
        for spec in self.targets() {
            match self.transform_target(spec, &geometry) {
                Ok(entry) => entries.push(entry),
                Err(e) if e.is_per_target() => {
                    warn!(map = %spec.name, error = %e, "transform failed");
                    let stale = self.layout.map_path(&spec.name);
                    if stale.exists() {
                        fs::remove_file(&stale)?;
                    }
                    entries.push(ManifestEntry {
                        name: spec.name.clone(),
                        route: TransformRoute::for_spec(spec),
                        defined_parcels: None,
                        error: Some(e.to_string()),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let manifest = TransformManifest {
            parcellation: geometry.name().to_string(),
            n_parcels: geometry.parcel_count(),
            reference,
            targets: entries,
        };
        artifacts::write_json(&self.layout.manifest_path(), &manifest)?;
        info!(
            transformed = manifest.targets.iter().filter(|t| t.is_ok()).count(),
            failed = manifest.targets.iter().filter(|t| !t.is_ok()).count(),
            "transform stage complete"
        );
        Ok(manifest)
    }

    fn transform_target(
        &self,
        spec: &TargetSpec,
        geometry: &ParcellationGeometry,
    ) -> PipelineResult<ManifestEntry> {
        let route = TransformRoute::for_spec(spec).ok_or_else(|| {
            StatsError::Data(format!(
                "no transform from {} {} to {} {}",
                spec.space, spec.density, ANALYSIS_SPACE, ANALYSIS_DENSITY
            ))
        })?;
        debug!(map = %spec.name, route = %route, "fetching map");
        let raw = self.source.fetch(spec, route)?;
        let map = assemble_map(spec, raw, geometry)?;
        let defined = map.defined_count();
        if defined == 0 {
            return Err(StatsError::Data(format!("map '{}' has no defined parcels", spec.name)).into());
        }
        npy::write_vector(&self.layout.map_path(&spec.name), &map.values)?;
        Ok(ManifestEntry {
            name: spec.name.clone(),
            route: Some(route),
            defined_parcels: Some(defined),
            error: None,
        })
    }

    /// Spin-test every catalog target against the reference.
    ///
    /// Writes `nulls/<name>.npy` per success and `correlations.csv` with one
    /// row per catalog entry, in catalog order.
    pub fn run_stats(&self) -> PipelineResult<Vec<TargetOutcome>> {
        let manifest_path = self.layout.manifest_path();
        let manifest: TransformManifest =
            artifacts::read_json(require(&manifest_path, Stage::Transform.as_str())?)?;
        if let Some(spec) = self.targets().iter().find(|t| manifest.target(&t.name).is_none()) {
            return Err(PipelineError::MissingArtifact(format!(
                "{} has no entry for '{}' (rerun the 'transform' stage)",
                manifest_path.display(),
                spec.name
            )));
        }

        let geometry = self.load_geometry()?;
        if manifest.parcellation != geometry.name() || manifest.n_parcels != geometry.parcel_count() {
            return Err(StatsError::InvalidInput(format!(
                "maps were transformed for '{}' ({} parcels) but the geometry is '{}' ({} parcels)",
                manifest.parcellation,
                manifest.n_parcels,
                geometry.name(),
                geometry.parcel_count()
            ))
            .into());
        }
        let reference = self.load_map(&self.config.inputs.reference.name, geometry.name())?;
        reference.check_geometry(&geometry)?;
        fs::create_dir_all(self.layout.nulls_dir())?;

        let run_one = |spec: &TargetSpec| -> PipelineResult<TargetOutcome> {
            let result = match manifest.target(&spec.name).and_then(|e| e.error.clone()) {
                Some(reason) => Err(PipelineError::Collaborator(format!(
                    "transform failed: {}",
                    reason
                ))),
                None => self.spin_test_target(spec, &reference, &geometry),
            };
            match result {
                Ok(outcome) => Ok(outcome),
                Err(e) if e.is_per_target() => {
                    warn!(map = %spec.name, error = %e, "spin test failed");
                    let stale = self.layout.null_path(&spec.name);
                    if stale.exists() {
                        fs::remove_file(&stale)?;
                    }
                    Ok(TargetOutcome::failed(spec.name.clone(), &e))
                }
                Err(e) => Err(e),
            }
        };

        let outcomes = self.map_targets(run_one)?;

        let rows: Vec<CorrelationRow> = outcomes.iter().map(TargetOutcome::to_row).collect();
        artifacts::write_rows(&self.layout.correlations_path(), &rows)?;
        // FDR rows from an earlier run no longer match these nulls
        let stale_fdr = self.layout.fdr_path();
        if stale_fdr.exists() {
            fs::remove_file(&stale_fdr)?;
            debug!(path = %stale_fdr.display(), "removed stale FDR table");
        }

        let (completed, failed) = partition(&outcomes);
        info!(
            completed = completed.len(),
            failed = failed.len(),
            n_perm = self.config.run.n_perm,
            "stats stage complete"
        );
        if !failed.is_empty() {
            warn!(maps = ?failed, "targets without statistics");
        }
        Ok(outcomes)
    }

    /// Apply `f` to every catalog target, keeping catalog order
    fn map_targets<F>(&self, f: F) -> PipelineResult<Vec<TargetOutcome>>
    where
        F: Fn(&TargetSpec) -> PipelineResult<TargetOutcome> + Sync,
    {
        #[cfg(feature = "parallel")]
        {
            if self.config.stats.parallel {
                return self.targets().par_iter().map(&f).collect();
            }
        }
        self.targets().iter().map(f).collect()
    }

    fn spin_test_target(
        &self,
        spec: &TargetSpec,
        reference: &SurfaceMap,
        geometry: &ParcellationGeometry,
    ) -> PipelineResult<TargetOutcome> {
        let target = self.load_map(&spec.name, geometry.name())?;
        let seed = derive_seed(self.config.run.seed, &spec.name);
        let ensemble = self.null_ensemble(&target, geometry, seed)?;
        let outcome = spin_test(reference, &target, &ensemble, self.mask())?;
        npy::write_vector(&self.layout.null_path(&spec.name), &outcome.null_r)?;
        debug!(
            map = %spec.name,
            r = outcome.record.r,
            p_spin = outcome.record.p_spin,
            "spin test complete"
        );
        Ok(TargetOutcome::completed(outcome))
    }

    fn null_ensemble(
        &self,
        target: &SurfaceMap,
        geometry: &ParcellationGeometry,
        seed: u64,
    ) -> PipelineResult<NullEnsemble> {
        let n_perm = self.config.run.n_perm;
        let Some(cache) = &self.null_cache else {
            return Ok(generate_nulls(target, geometry, n_perm, seed)?);
        };
        let key = NullCacheKey::for_map(target, seed, n_perm);
        if let Some(ensemble) = cache.get(&key)? {
            if ensemble.n_parcels() == target.len() {
                debug!(map = %target.name, "reusing cached nulls");
                return Ok(ensemble);
            }
        }
        let ensemble = generate_nulls(target, geometry, n_perm, seed)?;
        cache.put(&key, &ensemble)?;
        Ok(ensemble)
    }

    /// Benjamini–Hochberg over the successful rows of `correlations.csv`.
    ///
    /// # Errors
    ///
    /// `MissingArtifact` when the table lacks a catalog entry; `InvalidInput`
    /// when no row succeeded.
    pub fn run_fdr(&self) -> PipelineResult<Vec<FdrRow>> {
        let path = self.layout.correlations_path();
        let rows: Vec<CorrelationRow> = artifacts::read_rows(require(&path, Stage::Stats.as_str())?)?;
        let mut by_name: HashMap<&str, &CorrelationRow> =
            rows.iter().map(|r| (r.map_name.as_str(), r)).collect();

        let mut ordered = Vec::with_capacity(self.targets().len());
        for spec in self.targets() {
            let row = by_name.remove(spec.name.as_str()).ok_or_else(|| {
                PipelineError::MissingArtifact(format!(
                    "{} has no row for '{}' (rerun the 'stats' stage)",
                    path.display(),
                    spec.name
                ))
            })?;
            ordered.push(row);
        }
        if !by_name.is_empty() {
            let mut extra: Vec<&str> = by_name.into_keys().collect();
            extra.sort_unstable();
            warn!(maps = ?extra, "ignoring rows for maps outside the catalog");
        }

        let records: Vec<CorrelationRecord> = ordered.iter().filter_map(|r| r.record()).collect();
        let corrected = apply_fdr(&records, self.config.run.alpha)?;
        let mut corrected = corrected.iter();

        let fdr_rows: Vec<FdrRow> = ordered
            .iter()
            .map(|row| match row.record() {
                Some(_) => corrected.next().map_or_else(|| FdrRow::carried(row), FdrRow::completed),
                None => FdrRow::carried(row),
            })
            .collect();
        artifacts::write_rows(&self.layout.fdr_path(), &fdr_rows)?;

        info!(
            tested = records.len(),
            significant = fdr_rows.iter().filter(|r| r.significant == Some(true)).count(),
            alpha = self.config.run.alpha,
            "fdr stage complete"
        );
        Ok(fdr_rows)
    }

    /// Resolve plot specs for the reference and every transformed target and
    /// hand them to the surface renderer, if any.
    pub fn run_visualize(&self) -> PipelineResult<Vec<PlotSpec>> {
        let fdr_path = self.layout.fdr_path();
        require(&fdr_path, Stage::Fdr.as_str())?;
        let parcellation = self.config.inputs.parcellation.as_str();

        let mut specs = Vec::with_capacity(self.targets().len() + 1);
        let reference = self.load_map(&self.config.inputs.reference.name, parcellation)?;
        specs.push((
            PlotSpec::resolve(&self.config.inputs.reference, &self.config.plotting, &reference.values),
            reference,
        ));
        for spec in self.targets() {
            if !self.layout.map_path(&spec.name).exists() {
                debug!(map = %spec.name, "no transformed map to plot");
                continue;
            }
            let map = self.load_map(&spec.name, parcellation)?;
            specs.push((PlotSpec::resolve(spec, &self.config.plotting, &map.values), map));
        }

        let plot_specs: Vec<PlotSpec> = specs.iter().map(|(plot, _)| plot.clone()).collect();
        artifacts::write_json(&self.layout.plot_specs_path(), &plot_specs)?;

        if let Some(renderer) = &self.surface_renderer {
            for (plot, map) in &specs {
                let out = self.layout.figure_path(&plot.map_name);
                if let Err(e) = renderer.render(plot, map, &out) {
                    warn!(map = %plot.map_name, error = %e, "surface plot failed");
                }
            }
        }
        info!(plots = plot_specs.len(), "visualize stage complete");
        Ok(plot_specs)
    }

    /// Summarise the null distribution of every successful target, in
    /// catalog order, and hand the set to the summary renderer, if any.
    pub fn run_summarize(&self) -> PipelineResult<Vec<NullSummary>> {
        let rows = self.read_fdr_rows()?;
        let mut summaries = Vec::new();
        for spec in self.targets() {
            let Some(row) = rows.iter().find(|r| r.map_name == spec.name && r.is_completed()) else {
                continue;
            };
            let null_path = self.layout.null_path(&spec.name);
            let null_r = npy::read_vector(require(&null_path, Stage::Stats.as_str())?)?;
            match NullSummary::new(row, display_label(spec), &null_r) {
                Ok(summary) => summaries.push(summary),
                Err(e) if e.is_per_target() => {
                    warn!(map = %spec.name, error = %e, "skipping null summary");
                }
                Err(e) => return Err(e),
            }
        }
        artifacts::write_rows(&self.layout.boxplot_summary_path(), &summaries)?;

        if let Some(renderer) = &self.summary_renderer {
            let out = self.layout.boxplot_figure_path();
            artifacts::ensure_parent(&out)?;
            if let Err(e) = renderer.render(&summaries, &out) {
                warn!(error = %e, "summary figure failed");
            }
        }
        info!(summaries = summaries.len(), "summarize stage complete");
        Ok(summaries)
    }
}

/// Concatenate a fetched map into the geometry's hemisphere layout,
/// filling an absent hemisphere per `spec.fill`
fn assemble_map(
    spec: &TargetSpec,
    raw: RawMap,
    geometry: &ParcellationGeometry,
) -> PipelineResult<SurfaceMap> {
    let map = match raw {
        RawMap::Full(values) => SurfaceMap::new(spec.name.clone(), geometry.name(), values),
        RawMap::Hemispheres { left, right } => {
            let (left, right) = match (spec.fill, left, right) {
                (HemisphereFill::Mirror, Some(left), None) => {
                    debug!(map = %spec.name, "mirroring left hemisphere");
                    (Some(left.clone()), Some(left))
                }
                (HemisphereFill::Mirror, None, Some(right)) => {
                    debug!(map = %spec.name, "mirroring right hemisphere");
                    (Some(right.clone()), Some(right))
                }
                (_, left, right) => (left, right),
            };
            SurfaceMap::from_hemispheres(spec.name.clone(), geometry, left, right)?
        }
    };
    map.check_geometry(geometry)?;
    Ok(map)
}
