// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (or built-in defaults when no file exists)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{ConfigError, ConfigResult, NullCacheMode, SpinmapsConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// File name searched for in the working directory and its parents
pub const CONFIG_FILE_NAME: &str = "spinmaps_configuration.toml";

/// Find the spinmaps configuration file
///
/// Search order:
/// 1. `SPINMAPS_CONFIG_PATH` environment variable
/// 2. Current working directory: `./spinmaps_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("SPINMAPS_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by SPINMAPS_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();
    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));
        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "'{}' not found in any of these locations:\n{}\n\nSet SPINMAPS_CONFIG_PATH to specify a custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SpinmapsConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: SpinmapsConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);
    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli);
    }

    Ok(config)
}

/// Like [`load_config`], but falls back to built-in defaults when no file is
/// found. An explicit `config_path` that does not exist also falls back.
/// Overrides are applied either way.
pub fn load_config_or_default(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<SpinmapsConfig> {
    let located = match config_path {
        Some(path) if path.exists() => Some(path.to_path_buf()),
        Some(_) => None,
        None => match find_config_file() {
            Ok(path) => Some(path),
            Err(ConfigError::FileNotFound(_)) => None,
            Err(e) => return Err(e),
        },
    };

    match located {
        Some(path) => load_config(Some(&path), cli_args),
        None => {
            let mut config = SpinmapsConfig::default();
            apply_environment_overrides(&mut config);
            if let Some(cli) = cli_args {
                apply_cli_overrides(&mut config, cli);
            }
            Ok(config)
        }
    }
}

/// Write the default configuration to `path`, creating parent directories
pub fn save_default_config(path: &Path) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let content = toml::to_string_pretty(&SpinmapsConfig::default())?;
    fs::write(path, content)?;
    Ok(())
}

fn parse_flag(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `SPINMAPS_OUT_DIR` -> `run.out_dir`
/// - `SPINMAPS_SEED` -> `run.seed`
/// - `SPINMAPS_N_PERM` -> `run.n_perm`
/// - `SPINMAPS_ALPHA` -> `run.alpha`
/// - `SPINMAPS_LOG_LEVEL` -> `logging.level`
/// - `SPINMAPS_MAPS_DIR` -> `inputs.maps_dir`
///
/// Values that fail to parse are ignored.
pub fn apply_environment_overrides(config: &mut SpinmapsConfig) {
    if let Ok(value) = env::var("SPINMAPS_OUT_DIR") {
        config.run.out_dir = PathBuf::from(value);
    }
    if let Ok(value) = env::var("SPINMAPS_SEED") {
        if let Ok(seed) = value.parse::<u64>() {
            config.run.seed = seed;
        }
    }
    if let Ok(value) = env::var("SPINMAPS_N_PERM") {
        if let Ok(n_perm) = value.parse::<usize>() {
            config.run.n_perm = n_perm;
        }
    }
    if let Ok(value) = env::var("SPINMAPS_ALPHA") {
        if let Ok(alpha) = value.parse::<f64>() {
            config.run.alpha = alpha;
        }
    }
    if let Ok(value) = env::var("SPINMAPS_LOG_LEVEL") {
        config.logging.level = value;
    }
    if let Ok(value) = env::var("SPINMAPS_MAPS_DIR") {
        config.inputs.maps_dir = PathBuf::from(value);
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"seed": "7", "n_perm": "500"}`)
pub fn apply_cli_overrides(config: &mut SpinmapsConfig, cli_args: &HashMap<String, String>) {
    // Run settings
    if let Some(value) = cli_args.get("out_dir") {
        config.run.out_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("seed") {
        if let Ok(seed) = value.parse::<u64>() {
            config.run.seed = seed;
        }
    }
    if let Some(value) = cli_args.get("n_perm") {
        if let Ok(n_perm) = value.parse::<usize>() {
            config.run.n_perm = n_perm;
        }
    }
    if let Some(value) = cli_args.get("alpha") {
        if let Ok(alpha) = value.parse::<f64>() {
            config.run.alpha = alpha;
        }
    }

    // Inputs
    if let Some(value) = cli_args.get("maps_dir") {
        config.inputs.maps_dir = PathBuf::from(value);
    }
    if let Some(value) = cli_args.get("geometry_path") {
        config.inputs.geometry_path = PathBuf::from(value);
    }

    // Stats settings
    if let Some(value) = cli_args.get("ignore_zero") {
        config.stats.ignore_zero = parse_flag(value);
    }
    if let Some(value) = cli_args.get("parallel") {
        config.stats.parallel = parse_flag(value);
    }
    if let Some(value) = cli_args.get("null_cache") {
        if let Ok(mode) = value.parse::<NullCacheMode>() {
            config.stats.null_cache = mode;
        }
    }

    if let Some(value) = cli_args.get("log_level") {
        config.logging.level = value.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_VARS: &[&str] = &[
        "SPINMAPS_OUT_DIR",
        "SPINMAPS_SEED",
        "SPINMAPS_N_PERM",
        "SPINMAPS_ALPHA",
        "SPINMAPS_LOG_LEVEL",
        "SPINMAPS_MAPS_DIR",
    ];

    fn clear_env() -> Vec<(&'static str, String)> {
        let saved = ENV_VARS
            .iter()
            .filter_map(|name| env::var(name).ok().map(|v| (*name, v)))
            .collect();
        for name in ENV_VARS {
            env::remove_var(name);
        }
        saved
    }

    fn restore_env(saved: Vec<(&'static str, String)>) {
        for (name, value) in saved {
            env::set_var(name, value);
        }
    }

    #[test]
    fn test_find_config_file_env_var() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("custom_config.toml");
        File::create(&config_path).unwrap();

        env::set_var("SPINMAPS_CONFIG_PATH", config_path.to_str().unwrap());
        let result = find_config_file();
        env::remove_var("SPINMAPS_CONFIG_PATH");

        assert_eq!(result.unwrap(), config_path);
    }

    #[test]
    fn test_find_config_file_env_var_missing() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        env::set_var("SPINMAPS_CONFIG_PATH", "/nonexistent/spinmaps.toml");
        let result = find_config_file();
        env::remove_var("SPINMAPS_CONFIG_PATH");

        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_minimal_config() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[run]").unwrap();
        writeln!(file, "n_perm = 250").unwrap();
        writeln!(file, "[stats]").unwrap();
        writeln!(file, "null_cache = \"disk\"").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();
        restore_env(saved);

        assert_eq!(config.run.n_perm, 250);
        assert_eq!(config.run.seed, 42);
        assert_eq!(config.stats.null_cache, NullCacheMode::Disk);
        assert_eq!(config.catalog.targets.len(), 12);
    }

    #[test]
    fn test_load_custom_catalog() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[[catalog.targets]]").unwrap();
        writeln!(file, "name = \"devexp\"").unwrap();
        writeln!(file, "space = \"fsLR\"").unwrap();
        writeln!(file, "density = \"164k\"").unwrap();
        writeln!(file, "hemi = \"R\"").unwrap();
        writeln!(file, "fill = \"mirror\"").unwrap();
        writeln!(file, "[catalog.targets.style]").unwrap();
        writeln!(file, "cmap = \"blue_orange\"").unwrap();
        writeln!(file, "vmin = -0.6").unwrap();

        let config = load_config(Some(&config_path), None).unwrap();
        restore_env(saved);

        assert_eq!(config.catalog.targets.len(), 1);
        let target = &config.catalog.targets[0];
        assert_eq!(target.hemi.as_deref(), Some("R"));
        assert_eq!(target.fill, crate::HemisphereFill::Mirror);
        assert_eq!(target.style.vmin, Some(-0.6));
        assert_eq!(target.style.vmax, None);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config_path, "[run\nseed = ").unwrap();
        assert!(matches!(
            load_config(Some(&config_path), None),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = clear_env();
        let dir = tempdir().unwrap();
        let config =
            load_config_or_default(Some(&dir.path().join("absent.toml")), None).unwrap();
        restore_env(saved);

        assert_eq!(config, SpinmapsConfig::default());
    }

    #[test]
    fn test_environment_overrides() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = clear_env();
        let mut config = SpinmapsConfig::default();

        env::set_var("SPINMAPS_SEED", "7");
        env::set_var("SPINMAPS_N_PERM", "not-a-number");
        env::set_var("SPINMAPS_OUT_DIR", "/tmp/spin-out");

        apply_environment_overrides(&mut config);
        clear_env();
        restore_env(saved);

        assert_eq!(config.run.seed, 7);
        assert_eq!(config.run.n_perm, 1000);
        assert_eq!(config.run.out_dir, PathBuf::from("/tmp/spin-out"));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = SpinmapsConfig::default();
        let mut cli_args = HashMap::new();
        cli_args.insert("n_perm".to_string(), "99".to_string());
        cli_args.insert("null_cache".to_string(), "memory".to_string());
        cli_args.insert("parallel".to_string(), "false".to_string());

        apply_cli_overrides(&mut config, &cli_args);

        assert_eq!(config.run.n_perm, 99);
        assert_eq!(config.stats.null_cache, NullCacheMode::Memory);
        assert!(!config.stats.parallel);
    }

    #[test]
    fn test_override_precedence() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join(CONFIG_FILE_NAME);

        let mut file = File::create(&config_path).unwrap();
        writeln!(file, "[run]").unwrap();
        writeln!(file, "seed = 1").unwrap();
        writeln!(file, "n_perm = 10").unwrap();

        env::set_var("SPINMAPS_SEED", "2");
        env::set_var("SPINMAPS_N_PERM", "20");

        let mut cli_args = HashMap::new();
        cli_args.insert("seed".to_string(), "3".to_string());

        let config = load_config(Some(&config_path), Some(&cli_args)).unwrap();
        clear_env();
        restore_env(saved);

        // CLI wins for seed, env wins for n_perm (no CLI override)
        assert_eq!(config.run.seed, 3);
        assert_eq!(config.run.n_perm, 20);
    }

    #[test]
    fn test_save_default_config_roundtrip() {
        let _env_lock = ENV_LOCK.lock().unwrap();
        let saved = clear_env();
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("configs").join(CONFIG_FILE_NAME);

        save_default_config(&config_path).unwrap();
        let config = load_config(Some(&config_path), None).unwrap();
        restore_env(saved);

        assert_eq!(config, SpinmapsConfig::default());
    }
}
