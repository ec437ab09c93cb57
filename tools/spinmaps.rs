// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! spinmaps - run the spin-test comparison pipeline from the command line
//!
//! ```bash
//! spinmaps all
//! spinmaps --config study.toml --n-perm 5000 stats
//! spinmaps fdr --alpha 0.01 --debug-spinmaps-pipeline
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{info, warn};

use spinmaps::config::{
    load_config_or_default, save_default_config, validate_config, CONFIG_FILE_NAME,
};
use spinmaps::observability::{debug_flags_help, init_console_logging, parse_debug_flags};
use spinmaps::pipeline::{Pipeline, Stage};

#[derive(Parser, Debug)]
#[command(
    name = "spinmaps",
    version,
    about = "Spin-test correlations between a reference map and a catalog of brain maps",
    after_help = debug_flags_help()
)]
struct Cli {
    /// Configuration file (default: search for spinmaps_configuration.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(long, global = true)]
    out_dir: Option<PathBuf>,

    /// Base random seed
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Spin permutations per target
    #[arg(long, global = true)]
    n_perm: Option<usize>,

    /// FDR level
    #[arg(long, global = true)]
    alpha: Option<f64>,

    /// Directory of pre-resampled input maps
    #[arg(long, global = true)]
    maps_dir: Option<PathBuf>,

    /// Sphere geometry CSV (hemisphere,x,y,z)
    #[arg(long, global = true)]
    geometry: Option<PathBuf>,

    /// Also drop positions where either map is exactly zero
    #[arg(long, global = true)]
    ignore_zero: bool,

    /// Process targets one at a time
    #[arg(long, global = true)]
    sequential: bool,

    /// Null ensemble cache
    #[arg(long, global = true, value_enum)]
    null_cache: Option<CacheArg>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum CacheArg {
    None,
    Memory,
    Disk,
}

impl CacheArg {
    fn as_str(self) -> &'static str {
        match self {
            CacheArg::None => "none",
            CacheArg::Memory => "memory",
            CacheArg::Disk => "disk",
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that Connectome Workbench is reachable
    Env,
    /// Bring every map into the analysis space
    Transforms,
    /// Spin-test every target against the reference
    Stats,
    /// Benjamini–Hochberg correction of the spin p-values
    Fdr,
    /// Resolve plot specs and draw surface maps
    Viz,
    /// Summarise the null distributions
    Results,
    /// Run every stage in order
    All,
    /// Remove the output directory
    Clean,
    /// Write a default configuration file
    InitConfig {
        /// Destination (default: ./spinmaps_configuration.toml)
        path: Option<PathBuf>,
    },
}

impl Cli {
    /// Overrides in the form `apply_cli_overrides` expects
    fn overrides(&self) -> HashMap<String, String> {
        let mut overrides = HashMap::new();
        if let Some(out_dir) = &self.out_dir {
            overrides.insert("out_dir".to_string(), out_dir.display().to_string());
        }
        if let Some(seed) = self.seed {
            overrides.insert("seed".to_string(), seed.to_string());
        }
        if let Some(n_perm) = self.n_perm {
            overrides.insert("n_perm".to_string(), n_perm.to_string());
        }
        if let Some(alpha) = self.alpha {
            overrides.insert("alpha".to_string(), alpha.to_string());
        }
        if let Some(maps_dir) = &self.maps_dir {
            overrides.insert("maps_dir".to_string(), maps_dir.display().to_string());
        }
        if let Some(geometry) = &self.geometry {
            overrides.insert("geometry_path".to_string(), geometry.display().to_string());
        }
        if self.ignore_zero {
            overrides.insert("ignore_zero".to_string(), "true".to_string());
        }
        if self.sequential {
            overrides.insert("parallel".to_string(), "false".to_string());
        }
        if let Some(mode) = self.null_cache {
            overrides.insert("null_cache".to_string(), mode.as_str().to_string());
        }
        if let Some(level) = &self.log_level {
            overrides.insert("log_level".to_string(), level.clone());
        }
        overrides
    }
}

fn main() -> Result<()> {
    // Debug flags are read separately; keep them away from clap
    let debug_flags = parse_debug_flags();
    let cli = Cli::parse_from(std::env::args().filter(|arg| !arg.starts_with("--debug-")));

    if let Command::InitConfig { path } = &cli.command {
        let path = path.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        save_default_config(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = load_config_or_default(cli.config.as_deref(), Some(&cli.overrides()))
        .context("Failed to load configuration")?;

    let _logging = init_logging(&debug_flags, &config)?;
    validate_config(&config).context("Invalid configuration")?;
    info!(
        out_dir = %config.run.out_dir.display(),
        seed = config.run.seed,
        n_perm = config.run.n_perm,
        alpha = config.run.alpha,
        targets = config.catalog.targets.len(),
        "spinmaps {}",
        spinmaps::pipeline::VERSION
    );

    let pipeline = Pipeline::from_config(config);
    let stage = match cli.command {
        Command::Env => {
            match pipeline.run_env_check() {
                Some(version) => println!("Connectome Workbench {}", version),
                None => warn!("continuing without Connectome Workbench"),
            }
            return Ok(());
        }
        Command::Transforms => Stage::Transform,
        Command::Stats => Stage::Stats,
        Command::Fdr => Stage::Fdr,
        Command::Viz => Stage::Visualize,
        Command::Results => Stage::Summarize,
        Command::All => {
            let report = pipeline.run_all()?;
            println!(
                "{} targets: {} tested, {} failed, {} significant after FDR",
                report.targets, report.completed, report.failed, report.significant
            );
            println!("Results in {}", pipeline.layout().root().display());
            return Ok(());
        }
        Command::Clean => {
            pipeline.clean()?;
            return Ok(());
        }
        Command::InitConfig { .. } => return Ok(()),
    };

    pipeline
        .run_stage(stage)
        .with_context(|| format!("Stage '{}' failed", stage))?;
    Ok(())
}

#[cfg(feature = "file-logging")]
fn init_logging(
    debug_flags: &spinmaps::observability::CrateDebugFlags,
    config: &spinmaps::config::SpinmapsConfig,
) -> Result<spinmaps::observability::LoggingGuard> {
    match &config.logging.log_dir {
        Some(dir) => {
            spinmaps::observability::init_logging(debug_flags, &config.logging.level, dir, None)
        }
        None => init_console_logging(debug_flags, &config.logging.level),
    }
}

#[cfg(not(feature = "file-logging"))]
fn init_logging(
    debug_flags: &spinmaps::observability::CrateDebugFlags,
    config: &spinmaps::config::SpinmapsConfig,
) -> Result<spinmaps::observability::LoggingGuard> {
    if config.logging.log_dir.is_some() {
        eprintln!("logging.log_dir is ignored: built without the file-logging feature");
    }
    init_console_logging(debug_flags, &config.logging.level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spinmaps::config::{NullCacheMode, SpinmapsConfig};

    #[test]
    fn test_null_cache_override_reaches_config() {
        let cli = Cli::try_parse_from(["spinmaps", "--null-cache", "disk", "stats"]).unwrap();
        let mut config = SpinmapsConfig::default();
        spinmaps::config::apply_cli_overrides(&mut config, &cli.overrides());
        assert_eq!(config.stats.null_cache, NullCacheMode::Disk);
    }

    #[test]
    fn test_unknown_null_cache_mode_is_rejected() {
        let err = Cli::try_parse_from(["spinmaps", "--null-cache", "dsk", "stats"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }

    #[test]
    fn test_every_cache_arg_parses_as_config_mode() {
        for arg in CacheArg::value_variants() {
            assert!(arg.as_str().parse::<NullCacheMode>().is_ok());
        }
    }
}
