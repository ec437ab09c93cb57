// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `spinmaps_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Surface spaces a target may be published in
pub const KNOWN_SPACES: &[&str] = &["fsLR", "fsaverage", "civet"];

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SpinmapsConfig {
    pub run: RunConfig,
    pub inputs: InputsConfig,
    pub stats: StatsConfig,
    pub logging: LoggingConfig,
    pub plotting: PlotDefaults,
    pub catalog: CatalogConfig,
}

/// Output location and core statistical parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    pub out_dir: PathBuf,
    pub seed: u64,
    pub n_perm: usize,
    /// FDR level
    pub alpha: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("out"),
            seed: 42,
            n_perm: 1000,
            alpha: 0.05,
        }
    }
}

/// Where maps and the parcellation geometry come from
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct InputsConfig {
    /// Directory read by the bundled map source
    pub maps_dir: PathBuf,
    /// `hemisphere,x,y,z` CSV of sphere coordinates in the analysis space
    pub geometry_path: PathBuf,
    /// Name of the analysis parcellation
    pub parcellation: String,
    /// Directory holding `wb_command`, prepended to PATH for the environment probe
    pub workbench_path: PathBuf,
    pub reference: TargetSpec,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            maps_dir: PathBuf::from("maps"),
            geometry_path: PathBuf::from("geometry/fsLR_32k_sphere.csv"),
            parcellation: "fsLR_32k".to_string(),
            workbench_path: PathBuf::from("/Applications/Workbench/bin_macosxub"),
            reference: TargetSpec {
                style: PlotStyle::titled("Source map"),
                ..TargetSpec::new("source_thickness", "hcps1200", "thickness", "fsLR", "32k")
            },
        }
    }
}

/// Null ensemble caching between runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NullCacheMode {
    #[default]
    None,
    Memory,
    Disk,
}

impl fmt::Display for NullCacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NullCacheMode::None => "none",
            NullCacheMode::Memory => "memory",
            NullCacheMode::Disk => "disk",
        })
    }
}

impl std::str::FromStr for NullCacheMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(NullCacheMode::None),
            "memory" => Ok(NullCacheMode::Memory),
            "disk" => Ok(NullCacheMode::Disk),
            other => Err(format!("unknown null cache mode '{}'", other)),
        }
    }
}

/// Statistics stage behaviour
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Also exclude positions where either map is exactly zero
    pub ignore_zero: bool,
    /// Process targets on the rayon pool (when built with `parallel`)
    pub parallel: bool,
    pub null_cache: NullCacheMode,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            ignore_zero: false,
            parallel: true,
            null_cache: NullCacheMode::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Enables file logging when set (needs the `file-logging` feature)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Rendering defaults merged under every per-map style
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlotDefaults {
    pub template: String,
    pub density: String,
    /// "shared", "each" or "none"
    pub colorbar: String,
    /// "right" or "bottom"
    pub cbar_location: String,
    pub wspace: f64,
}

impl Default for PlotDefaults {
    fn default() -> Self {
        Self {
            template: "fsLR".to_string(),
            density: "32k".to_string(),
            colorbar: "shared".to_string(),
            cbar_location: "right".to_string(),
            wspace: 0.18,
        }
    }
}

/// Optional per-map rendering overrides
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PlotStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vmax: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub density: Option<String>,
    /// Display label used on the summary figure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PlotStyle {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    fn colored(cmap: &str, vmin: f64, vmax: f64, title: &str, label: &str) -> Self {
        Self {
            cmap: Some(cmap.to_string()),
            vmin: Some(vmin),
            vmax: Some(vmax),
            title: Some(title.to_string()),
            label: Some(label.to_string()),
            ..Self::default()
        }
    }
}

/// How to complete a map published for one hemisphere only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HemisphereFill {
    /// Missing hemisphere is undefined
    #[default]
    Nan,
    /// Missing hemisphere copies the present one
    Mirror,
}

/// One map the pipeline fetches and compares
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TargetSpec {
    pub name: String,
    /// Publishing dataset (e.g. "hcps1200")
    pub source: String,
    /// Descriptor within the dataset
    pub desc: String,
    /// Native surface space, one of [`KNOWN_SPACES`]
    pub space: String,
    /// Native density (e.g. "32k", "164k")
    pub density: String,
    /// Single published hemisphere, "L" or "R"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hemi: Option<String>,
    pub fill: HemisphereFill,
    pub style: PlotStyle,
}

impl TargetSpec {
    pub fn new(name: &str, source: &str, desc: &str, space: &str, density: &str) -> Self {
        Self {
            name: name.to_string(),
            source: source.to_string(),
            desc: desc.to_string(),
            space: space.to_string(),
            density: density.to_string(),
            hemi: None,
            fill: HemisphereFill::Nan,
            style: PlotStyle::default(),
        }
    }

    fn right_only(mut self) -> Self {
        self.hemi = Some("R".to_string());
        self
    }

    fn styled(mut self, style: PlotStyle) -> Self {
        self.style = style;
        self
    }
}

/// Ordered list of target maps
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub targets: Vec<TargetSpec>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
        }
    }
}

/// The standard twelve-map comparison set
pub fn default_targets() -> Vec<TargetSpec> {
    vec![
        TargetSpec::new("genepc1", "abagen", "genepc1", "fsaverage", "10k").styled(PlotStyle {
            cmap: Some("magma".to_string()),
            title: Some("PC1 fsLR 32k".to_string()),
            label: Some("PC1 Gene Expression".to_string()),
            ..PlotStyle::default()
        }),
        TargetSpec::new("myelin", "hcps1200", "myelinmap", "fsLR", "32k").styled(
            PlotStyle::colored("nipy_spectral", 0.98, 1.9, "T1w/T2w ratio fsLR 32k", "T1w/T2w Ratio"),
        ),
        TargetSpec::new("devexp", "hill2010", "devexp", "fsLR", "164k")
            .right_only()
            .styled(PlotStyle::colored(
                "blue_orange",
                -0.6,
                0.59,
                "Developmental expansion fsLR 32k",
                "Developmental Expansion",
            )),
        TargetSpec::new("evoexp", "hill2010", "evoexp", "fsLR", "164k")
            .right_only()
            .styled(PlotStyle::colored(
                "blue_orange",
                -2.7,
                2.3,
                "Evolutionary expansion fsLR 32k",
                "Evolutionary Expansion",
            )),
        TargetSpec::new("gradient_pc1", "margulies2016", "fcgradient01", "fsLR", "32k").styled(
            PlotStyle::colored("jet", -5.4, 6.8, "Functional gradient fsLR 32k", "Functional Gradient"),
        ),
        TargetSpec::new("isv", "mueller2013", "intersubjvar", "fsLR", "164k").styled(
            PlotStyle::colored(
                "blue_orange",
                0.53,
                0.79,
                "Intersubject variability fsLR 32k",
                "Intersubject Variability",
            ),
        ),
        TargetSpec::new("cbf", "raichle", "cbf", "fsLR", "164k").styled(PlotStyle::colored(
            "nipy_spectral",
            4600.0,
            7000.0,
            "Cerebral blood flow fsLR 32k",
            "Cerebral Blood Flow",
        )),
        TargetSpec::new("cbv", "raichle", "cbv", "fsLR", "164k").styled(PlotStyle::colored(
            "nipy_spectral",
            2100.0,
            13000.0,
            "Cerebral blood volume fsLR 32k",
            "Cerebral Blood Volume",
        )),
        TargetSpec::new("cmro2", "raichle", "cmr02", "fsLR", "164k").styled(PlotStyle::colored(
            "nipy_spectral",
            4000.0,
            7500.0,
            "Oxygen metabolism fsLR 32k",
            "Oxygen Metabolism",
        )),
        TargetSpec::new("cmrglc", "raichle", "cmrglc", "fsLR", "164k").styled(PlotStyle::colored(
            "nipy_spectral",
            360.0,
            8500.0,
            "Glucose metabolism fsLR 32k",
            "Glucose Metabolism",
        )),
        TargetSpec::new("scalingnih", "reardon2018", "scalingnih", "civet", "41k").styled(
            PlotStyle::colored(
                "seismic",
                0.0,
                1.6,
                "Allometric scaling (NIH) fsLR 32k",
                "Allometric Scaling (NIH)",
            ),
        ),
        TargetSpec::new("scalingpnc", "reardon2018", "scalingpnc", "civet", "41k").styled(
            PlotStyle::colored(
                "seismic",
                0.0,
                1.7,
                "Allometric scaling (PNC) fsLR 32k",
                "Allometric Scaling (PNC)",
            ),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog_order_and_names() {
        let names: Vec<String> = default_targets().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![
                "genepc1", "myelin", "devexp", "evoexp", "gradient_pc1", "isv", "cbf", "cbv",
                "cmro2", "cmrglc", "scalingnih", "scalingpnc"
            ]
        );
    }

    #[test]
    fn test_default_catalog_spaces_are_known() {
        for target in default_targets() {
            assert!(KNOWN_SPACES.contains(&target.space.as_str()), "{}", target.name);
        }
    }

    #[test]
    fn test_single_hemisphere_targets() {
        let right_only: Vec<String> = default_targets()
            .into_iter()
            .filter(|t| t.hemi.as_deref() == Some("R"))
            .map(|t| t.name)
            .collect();
        assert_eq!(right_only, vec!["devexp", "evoexp"]);
    }

    #[test]
    fn test_genepc1_has_no_fixed_limits() {
        let genepc1 = &default_targets()[0];
        assert_eq!(genepc1.style.vmin, None);
        assert_eq!(genepc1.style.cmap.as_deref(), Some("magma"));
    }

    #[test]
    fn test_null_cache_mode_parse() {
        assert_eq!("Disk".parse::<NullCacheMode>(), Ok(NullCacheMode::Disk));
        assert_eq!("none".parse::<NullCacheMode>(), Ok(NullCacheMode::None));
        assert!("redis".parse::<NullCacheMode>().is_err());
        assert_eq!(NullCacheMode::Memory.to_string(), "memory");
    }

    #[test]
    fn test_reference_default() {
        let inputs = InputsConfig::default();
        assert_eq!(inputs.reference.name, "source_thickness");
        assert_eq!(inputs.reference.space, "fsLR");
        assert_eq!(inputs.reference.density, "32k");
    }
}
