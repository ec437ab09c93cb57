// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Catalog entries, transform routes and display metadata

use serde::{Deserialize, Serialize};
use spinmaps_config::{PlotDefaults, TargetSpec};
use std::fmt;

/// Surface space every map is compared in
pub const ANALYSIS_SPACE: &str = "fsLR";
pub const ANALYSIS_DENSITY: &str = "32k";

/// Suffix marking a map already resampled to the analysis space
const ANALYSIS_SUFFIX: &str = "_fsLR32k";

/// How a map reaches the analysis space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformRoute {
    /// Already fsLR 32k
    Native,
    FsaverageToFsLR,
    /// fsLR 164k downsampled to 32k
    FsLRDownsample,
    CivetToFsLR,
}

impl TransformRoute {
    /// Route for a map published in `space` at `density`, if one exists
    pub fn resolve(space: &str, density: &str) -> Option<Self> {
        match (space, density) {
            (ANALYSIS_SPACE, ANALYSIS_DENSITY) => Some(TransformRoute::Native),
            ("fsLR", "164k") => Some(TransformRoute::FsLRDownsample),
            ("fsaverage", _) => Some(TransformRoute::FsaverageToFsLR),
            ("civet", _) => Some(TransformRoute::CivetToFsLR),
            _ => None,
        }
    }

    pub fn for_spec(spec: &TargetSpec) -> Option<Self> {
        Self::resolve(&spec.space, &spec.density)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransformRoute::Native => "native",
            TransformRoute::FsaverageToFsLR => "fsaverage_to_fslr",
            TransformRoute::FsLRDownsample => "fslr_downsample",
            TransformRoute::CivetToFsLR => "civet_to_fslr",
        }
    }
}

impl fmt::Display for TransformRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name with any analysis-space suffix removed
pub fn base_name(name: &str) -> &str {
    name.strip_suffix(ANALYSIS_SUFFIX).unwrap_or(name)
}

/// Label for summary figures: the style's label, else the base map name
pub fn display_label(spec: &TargetSpec) -> String {
    spec.style
        .label
        .clone()
        .unwrap_or_else(|| base_name(&spec.name).to_string())
}

/// Look up a catalog entry by name, tolerating the analysis-space suffix
pub fn find_target<'c>(targets: &'c [TargetSpec], name: &str) -> Option<&'c TargetSpec> {
    targets
        .iter()
        .find(|t| t.name == name)
        .or_else(|| targets.iter().find(|t| base_name(&t.name) == base_name(name)))
}

/// Fully resolved rendering request for one map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSpec {
    pub map_name: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmap: Option<String>,
    pub vmin: f64,
    pub vmax: f64,
    pub template: String,
    pub density: String,
    pub colorbar: String,
    pub cbar_location: String,
    pub wspace: f64,
    /// Set when only one hemisphere carries data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hemi: Option<String>,
}

impl PlotSpec {
    /// Merge `spec.style` over `defaults`. Colour limits missing from the
    /// style come from the finite range of `values` (0..1 when none are
    /// finite).
    pub fn resolve(spec: &TargetSpec, defaults: &PlotDefaults, values: &[f64]) -> Self {
        let (data_min, data_max) = finite_range(values).unwrap_or((0.0, 1.0));
        let style = &spec.style;
        Self {
            map_name: spec.name.clone(),
            title: style.title.clone().unwrap_or_else(|| spec.name.clone()),
            cmap: style.cmap.clone(),
            vmin: style.vmin.unwrap_or(data_min),
            vmax: style.vmax.unwrap_or(data_max),
            template: style.template.clone().unwrap_or_else(|| defaults.template.clone()),
            density: style.density.clone().unwrap_or_else(|| defaults.density.clone()),
            colorbar: defaults.colorbar.clone(),
            cbar_location: defaults.cbar_location.clone(),
            wspace: defaults.wspace,
            hemi: spec.hemi.clone(),
        }
    }
}

fn finite_range(values: &[f64]) -> Option<(f64, f64)> {
    values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinmaps_config::{default_targets, PlotStyle};

    #[test]
    fn test_routes_for_default_catalog() {
        let routes: Vec<(String, Option<TransformRoute>)> = default_targets()
            .iter()
            .map(|t| (t.name.clone(), TransformRoute::for_spec(t)))
            .collect();
        let route_of = |name: &str| routes.iter().find(|(n, _)| n == name).and_then(|(_, r)| *r);
        assert_eq!(route_of("genepc1"), Some(TransformRoute::FsaverageToFsLR));
        assert_eq!(route_of("myelin"), Some(TransformRoute::Native));
        assert_eq!(route_of("devexp"), Some(TransformRoute::FsLRDownsample));
        assert_eq!(route_of("scalingnih"), Some(TransformRoute::CivetToFsLR));
        assert!(routes.iter().all(|(_, r)| r.is_some()));
    }

    #[test]
    fn test_undefined_route() {
        assert_eq!(TransformRoute::resolve("fsLR", "4k"), None);
        assert_eq!(TransformRoute::resolve("MNI152", "1mm"), None);
    }

    #[test]
    fn test_display_label_fallback() {
        let mut spec = TargetSpec::new("custom_fsLR32k", "lab", "x", "fsLR", "32k");
        assert_eq!(display_label(&spec), "custom");
        spec.style.label = Some("Custom Map".to_string());
        assert_eq!(display_label(&spec), "Custom Map");
    }

    #[test]
    fn test_find_target_with_suffix() {
        let targets = default_targets();
        assert_eq!(find_target(&targets, "myelin_fsLR32k").map(|t| t.name.as_str()), Some("myelin"));
        assert!(find_target(&targets, "unknown").is_none());
    }

    #[test]
    fn test_plot_spec_merges_defaults_and_data_limits() {
        let spec = TargetSpec {
            style: PlotStyle {
                vmax: Some(5.0),
                ..PlotStyle::default()
            },
            ..TargetSpec::new("m", "lab", "m", "fsLR", "32k")
        };
        let plot = PlotSpec::resolve(&spec, &PlotDefaults::default(), &[f64::NAN, -2.0, 3.0]);
        assert_eq!(plot.vmin, -2.0);
        assert_eq!(plot.vmax, 5.0);
        assert_eq!(plot.title, "m");
        assert_eq!(plot.template, "fsLR");
        assert_eq!(plot.colorbar, "shared");
        assert_eq!(plot.wspace, 0.18);
    }

    #[test]
    fn test_plot_spec_without_finite_values() {
        let spec = TargetSpec::new("m", "lab", "m", "fsLR", "32k");
        let plot = PlotSpec::resolve(&spec, &PlotDefaults::default(), &[f64::NAN]);
        assert_eq!((plot.vmin, plot.vmax), (0.0, 1.0));
    }
}
