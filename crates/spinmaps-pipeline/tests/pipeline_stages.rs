// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stage-by-stage runs over a synthetic catalog on disk

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use spinmaps_config::{NullCacheMode, SpinmapsConfig, TargetSpec};
use spinmaps_pipeline::{
    artifacts, npy, CorrelationRow, FdrRow, NullSummary, Pipeline, PipelineError, PipelineResult,
    PlotSpec, Stage, SummaryRenderer, SurfaceRenderer, TransformManifest,
};
use spinmaps_stats::{
    fibonacci_sphere, Hemisphere, HemisphereGeometry, ParcellationGeometry, StatsError,
    SurfaceMap,
};

const PER_HEMISPHERE: usize = 60;

fn geometry() -> ParcellationGeometry {
    ParcellationGeometry::new(
        "fib",
        vec![
            HemisphereGeometry::new(Hemisphere::Left, fibonacci_sphere(PER_HEMISPHERE)).unwrap(),
            HemisphereGeometry::new(Hemisphere::Right, fibonacci_sphere(PER_HEMISPHERE)).unwrap(),
        ],
    )
    .unwrap()
}

fn smooth(f: impl Fn([f64; 3]) -> f64) -> Vec<f64> {
    let points = fibonacci_sphere(PER_HEMISPHERE);
    points.iter().chain(points.iter()).map(|&c| f(c)).collect()
}

fn target(name: &str) -> TargetSpec {
    TargetSpec::new(name, "lab", name, "fsLR", "32k")
}

/// Reference plus a catalog of: a close copy, an all-undefined map, a map
/// with no files, and a right-hemisphere-only map
fn setup(root: &Path) -> SpinmapsConfig {
    let maps = root.join("maps_in");
    fs::create_dir_all(&maps).unwrap();

    let reference = smooth(|c| c[1] + 0.5 * c[0]);
    let similar: Vec<f64> = reference
        .iter()
        .enumerate()
        .map(|(i, v)| 2.0 * v + 0.05 * (i as f64).sin())
        .collect();
    npy::write_vector(&maps.join("source_thickness.npy"), &reference).unwrap();
    npy::write_vector(&maps.join("similar.npy"), &similar).unwrap();
    npy::write_vector(&maps.join("empty.npy"), &vec![f64::NAN; 2 * PER_HEMISPHERE]).unwrap();
    let right_only = smooth(|c| c[2]);
    npy::write_vector(&maps.join("righthemi_R.npy"), &right_only[PER_HEMISPHERE..]).unwrap();

    let mut righthemi = target("righthemi");
    righthemi.hemi = Some("R".to_string());

    let mut config = SpinmapsConfig::default();
    config.run.out_dir = root.join("out");
    config.run.n_perm = 49;
    config.inputs.maps_dir = maps;
    config.inputs.parcellation = "fib".to_string();
    config.catalog.targets = vec![target("similar"), target("empty"), target("missing"), righthemi];
    config
}

fn pipeline(config: SpinmapsConfig) -> Pipeline {
    Pipeline::from_config(config)
        .with_probe(None)
        .with_geometry(geometry())
}

#[test]
fn test_run_all_writes_every_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(setup(dir.path()));
    let report = pipeline.run_all().unwrap();

    assert_eq!(report.targets, 4);
    assert_eq!(report.completed, 2);
    assert_eq!(report.failed, 2);

    let layout = pipeline.layout();
    assert!(layout.manifest_path().exists());
    assert!(layout.plot_specs_path().exists());
    assert!(layout.boxplot_summary_path().exists());

    let rows: Vec<CorrelationRow> = artifacts::read_rows(&layout.correlations_path()).unwrap();
    let names: Vec<&str> = rows.iter().map(|r| r.map_name.as_str()).collect();
    assert_eq!(names, vec!["similar", "empty", "missing", "righthemi"]);
    assert!(rows[0].r.unwrap() > 0.95);
    assert!(rows[1].error.as_deref().unwrap().contains("no defined parcels"));
    assert!(rows[2].error.is_some());
    assert!(rows[3].error.is_none());

    let nulls = npy::read_vector(&layout.null_path("similar")).unwrap();
    assert_eq!(nulls.len(), 49);
    assert!(!layout.null_path("empty").exists());

    let fdr: Vec<FdrRow> = artifacts::read_rows(&layout.fdr_path()).unwrap();
    assert_eq!(fdr.len(), 4);
    assert!(fdr[0].p_fdr.is_some());
    assert!(fdr[1].p_fdr.is_none() && fdr[1].significant.is_none());

    let summaries: Vec<NullSummary> =
        artifacts::read_rows(&layout.boxplot_summary_path()).unwrap();
    assert_eq!(
        summaries.iter().map(|s| s.map_name.as_str()).collect::<Vec<_>>(),
        vec!["similar", "righthemi"]
    );
}

#[test]
fn test_single_hemisphere_map_is_padded() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(setup(dir.path()));
    let manifest = pipeline.run_transform().unwrap();

    let entry = manifest.target("righthemi").unwrap();
    assert_eq!(entry.defined_parcels, Some(PER_HEMISPHERE));
    let values = npy::read_vector(&pipeline.layout().map_path("righthemi")).unwrap();
    assert!(values[..PER_HEMISPHERE].iter().all(|v| v.is_nan()));

    let on_disk: TransformManifest =
        artifacts::read_json(&pipeline.layout().manifest_path()).unwrap();
    assert_eq!(on_disk, manifest);
    assert!(!on_disk.target("missing").unwrap().is_ok());
}

#[test]
fn test_stages_require_earlier_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(setup(dir.path()));

    assert!(matches!(pipeline.run_stats(), Err(PipelineError::MissingArtifact(_))));
    assert!(matches!(pipeline.run_fdr(), Err(PipelineError::MissingArtifact(_))));
    assert!(matches!(pipeline.run_visualize(), Err(PipelineError::MissingArtifact(_))));
    assert!(matches!(pipeline.run_summarize(), Err(PipelineError::MissingArtifact(_))));
    assert!(!pipeline.layout().correlations_path().exists());
}

#[test]
fn test_fdr_needs_a_row_per_catalog_entry() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(setup(dir.path()));
    pipeline.run_transform().unwrap();
    pipeline.run_stats().unwrap();

    let path = pipeline.layout().correlations_path();
    let mut rows: Vec<CorrelationRow> = artifacts::read_rows(&path).unwrap();
    rows.retain(|r| r.map_name != "righthemi");
    artifacts::write_rows(&path, &rows).unwrap();

    match pipeline.run_fdr() {
        Err(PipelineError::MissingArtifact(msg)) => assert!(msg.contains("righthemi")),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_fdr_without_successful_rows_is_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.catalog.targets = vec![target("empty"), target("missing")];
    let pipeline = pipeline(config);
    pipeline.run_transform().unwrap();
    pipeline.run_stats().unwrap();
    assert!(matches!(
        pipeline.run_fdr(),
        Err(PipelineError::Stats(StatsError::InvalidInput(_)))
    ));
}

#[test]
fn test_reference_failure_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.inputs.reference.name = "absent".to_string();
    assert!(matches!(
        pipeline(config).run_transform(),
        Err(PipelineError::Collaborator(_))
    ));
}

#[test]
fn test_stats_are_reproducible_across_execution_modes() {
    let dir = tempfile::tempdir().unwrap();
    let config = setup(dir.path());

    let parallel = pipeline(config.clone());
    parallel.run_transform().unwrap();
    let first = parallel.run_stats().unwrap();

    let mut sequential_config = config;
    sequential_config.stats.parallel = false;
    let second = pipeline(sequential_config).run_stats().unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_disk_cache_is_reused_and_invalidated() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = setup(dir.path());
    config.stats.null_cache = NullCacheMode::Disk;

    let first = pipeline(config.clone());
    first.run_transform().unwrap();
    let outcomes = first.run_stats().unwrap();
    let cache_dir = first.layout().cache_dir().join("similar");
    assert_eq!(fs::read_dir(&cache_dir).unwrap().count(), 1);

    // Same key: served from the cache with identical results
    assert_eq!(pipeline(config.clone()).run_stats().unwrap(), outcomes);

    config.run.seed = 7;
    pipeline(config).run_stats().unwrap();
    let files: Vec<String> = fs::read_dir(&cache_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files.len(), 1);
    assert!(files[0].contains("_49.npy"));
}

#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
}

impl SurfaceRenderer for Recorder {
    fn render(&self, spec: &PlotSpec, map: &SurfaceMap, out_path: &Path) -> PipelineResult<()> {
        assert_eq!(spec.map_name, map.name);
        assert!(out_path.ends_with(format!("{}.png", spec.map_name)));
        self.calls.lock().unwrap().push(spec.map_name.clone());
        Ok(())
    }
}

impl SummaryRenderer for Recorder {
    fn render(&self, summaries: &[NullSummary], _out_path: &Path) -> PipelineResult<()> {
        self.calls.lock().unwrap().push(format!("summary:{}", summaries.len()));
        Ok(())
    }
}

#[test]
fn test_renderers_receive_every_plot() {
    let dir = tempfile::tempdir().unwrap();
    let recorder = Arc::new(Recorder::default());
    let pipeline = pipeline(setup(dir.path()))
        .with_surface_renderer(recorder.clone())
        .with_summary_renderer(recorder.clone());
    for stage in Stage::ALL {
        pipeline.run_stage(stage).unwrap();
    }

    let calls = recorder.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec!["source_thickness", "similar", "righthemi", "summary:2"]
    );

    let specs: Vec<PlotSpec> = artifacts::read_json(&pipeline.layout().plot_specs_path()).unwrap();
    assert_eq!(specs[0].title, "Source map");
    assert_eq!(specs[2].hemi.as_deref(), Some("R"));
}

#[test]
fn test_clean_removes_outputs() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(setup(dir.path()));
    pipeline.run_transform().unwrap();
    assert!(pipeline.layout().root().exists());
    pipeline.clean().unwrap();
    assert!(!pipeline.layout().root().exists());
    pipeline.clean().unwrap();
}

#[test]
fn test_rerunning_stats_drops_old_fdr_table() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = pipeline(setup(dir.path()));
    pipeline.run_all().unwrap();
    assert!(pipeline.layout().fdr_path().exists());

    pipeline.run_stats().unwrap();
    assert!(pipeline.layout().correlations_path().exists());
    assert!(!pipeline.layout().fdr_path().exists());
    assert!(matches!(pipeline.run_summarize(), Err(PipelineError::MissingArtifact(_))));

    pipeline.run_fdr().unwrap();
    pipeline.run_summarize().unwrap();
}
