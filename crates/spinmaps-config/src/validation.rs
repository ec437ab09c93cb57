// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! Collects every problem in one pass so a bad configuration file is fixed
//! in one edit rather than one error at a time.

use std::collections::HashSet;

use crate::{ConfigError, ConfigResult, SpinmapsConfig, TargetSpec, KNOWN_SPACES};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
    DuplicateTarget { name: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
            Self::DuplicateTarget { name } => {
                write!(f, "Catalog lists target '{}' more than once", name)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - `n_perm >= 1` and `alpha` in (0, 1)
/// - Non-empty, unique target names (the reference included)
/// - Known surface spaces and hemisphere tags
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` with details if validation fails
pub fn validate_config(config: &SpinmapsConfig) -> ConfigResult<()> {
    let errors = collect_errors(config);
    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }
    Ok(())
}

/// Every validation problem, in field order
pub fn collect_errors(config: &SpinmapsConfig) -> Vec<ConfigValidationError> {
    let mut errors = Vec::new();
    validate_run(config, &mut errors);
    validate_inputs(config, &mut errors);
    validate_catalog(config, &mut errors);
    errors
}

fn validate_run(config: &SpinmapsConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.run.n_perm == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "run.n_perm".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
    if !(config.run.alpha > 0.0 && config.run.alpha < 1.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "run.alpha".to_string(),
            reason: "must lie strictly between 0 and 1".to_string(),
        });
    }
    if config.run.out_dir.as_os_str().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "run.out_dir".to_string(),
        });
    }
}

fn validate_inputs(config: &SpinmapsConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.inputs.parcellation.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "inputs.parcellation".to_string(),
        });
    }
    validate_target("inputs.reference", &config.inputs.reference, errors);
}

fn validate_catalog(config: &SpinmapsConfig, errors: &mut Vec<ConfigValidationError>) {
    if config.catalog.targets.is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: "catalog.targets".to_string(),
        });
    }

    let mut seen: HashSet<&str> = HashSet::new();
    seen.insert(config.inputs.reference.name.as_str());
    for (i, target) in config.catalog.targets.iter().enumerate() {
        validate_target(&format!("catalog.targets[{}]", i), target, errors);
        if !target.name.is_empty() && !seen.insert(target.name.as_str()) {
            errors.push(ConfigValidationError::DuplicateTarget {
                name: target.name.clone(),
            });
        }
    }
}

fn validate_target(field: &str, target: &TargetSpec, errors: &mut Vec<ConfigValidationError>) {
    if target.name.trim().is_empty() {
        errors.push(ConfigValidationError::MissingRequired {
            field: format!("{}.name", field),
        });
    } else if target.name.contains(['/', '\\']) {
        // Names become artifact file names
        errors.push(ConfigValidationError::InvalidValue {
            field: format!("{}.name", field),
            reason: format!("'{}' contains a path separator", target.name),
        });
    }
    if !KNOWN_SPACES.contains(&target.space.as_str()) {
        errors.push(ConfigValidationError::InvalidValue {
            field: format!("{}.space", field),
            reason: format!(
                "'{}' is not one of {}",
                target.space,
                KNOWN_SPACES.join(", ")
            ),
        });
    }
    if let Some(hemi) = &target.hemi {
        if hemi != "L" && hemi != "R" {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("{}.hemi", field),
                reason: format!("'{}' must be 'L' or 'R'", hemi),
            });
        }
    }
    if let (Some(vmin), Some(vmax)) = (target.style.vmin, target.style.vmax) {
        if vmin > vmax {
            errors.push(ConfigValidationError::InvalidValue {
                field: format!("{}.style", field),
                reason: format!("vmin {} exceeds vmax {}", vmin, vmax),
            });
        }
    }
}
