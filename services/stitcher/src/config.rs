//! Run configuration loaded from YAML.
//!
//! `${VAR}` and `${VAR:-default}` are expanded from the environment before
//! parsing. Libraries receive the resolved values; nothing below this module
//! reads files or the environment for configuration.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use field_common::BoundingBox;
use grid_harmonizer::CompositeConfig;
use ingestion::{ProviderAliases, SourceSpec, StitchRequest};
use serde::{Deserialize, Serialize};
use trajectory::{ParticleParams, ReleaseConfig};

// ============================================================================
// Configuration Structures
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default = "default_horizon_hours")]
    pub horizon_hours: u32,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub composite: CompositeSection,
    #[serde(default)]
    pub particles: ParticleParams,
    #[serde(default)]
    pub release: ReleaseConfig,
    #[serde(default)]
    pub drift: DriftConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    pub currents: PathBuf,
    pub stokes: PathBuf,
    /// Directory of GRIB2 wind files, or a single wind dataset.
    pub winds_dir: PathBuf,
    pub drivers: PathBuf,
    pub tracks: PathBuf,
    pub summary: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub currents: ProviderConfig,
    #[serde(default)]
    pub stokes: ProviderConfig,
    #[serde(default)]
    pub winds: ProviderConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Provider label recorded in provenance; defaults to the role name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, flatten)]
    pub aliases: ProviderAliases,
}

/// Composite settings. Without a `composite` section the storage settings
/// come from `COMPOSITE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeSection {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(flatten)]
    pub storage: CompositeConfig,
}

impl Default for CompositeSection {
    fn default() -> Self {
        Self {
            title: None,
            storage: CompositeConfig::from_env(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "default_step_secs")]
    pub step_secs: u32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            step_secs: default_step_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_horizon_hours() -> u32 {
    72
}

fn default_step_secs() -> u32 {
    3600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl RunConfig {
    pub fn stitch_request(&self) -> StitchRequest {
        let source = |role: &str, provider: &ProviderConfig, path: &Path| {
            let name = provider.name.clone().unwrap_or_else(|| role.to_string());
            SourceSpec::new(name, path).with_aliases(provider.aliases.clone())
        };

        StitchRequest {
            currents: source("currents", &self.providers.currents, &self.paths.currents),
            stokes: source("stokes", &self.providers.stokes, &self.paths.stokes),
            winds: source("winds", &self.providers.winds, &self.paths.winds_dir),
            output: self.paths.drivers.clone(),
            title: self.composite.title.clone(),
            bbox: self.bbox,
        }
    }
}

// ============================================================================
// Loading Functions
// ============================================================================

/// Load and parse a run configuration with environment variable substitution
pub fn load_run_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read run config from {:?}", path.as_ref()))?;

    parse_run_config(&content)
        .with_context(|| format!("Invalid run config {:?}", path.as_ref()))
}

pub fn parse_run_config(content: &str) -> Result<RunConfig> {
    let expanded = expand_env_vars(content)?;

    let config: RunConfig =
        serde_yaml::from_str(&expanded).context("Failed to parse run config YAML")?;

    validate_run_config(&config)?;

    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` in YAML content
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

// ============================================================================
// Validation
// ============================================================================

fn validate_run_config(config: &RunConfig) -> Result<()> {
    anyhow::ensure!(config.horizon_hours > 0, "horizon_hours must be greater than 0");
    anyhow::ensure!(config.drift.step_secs > 0, "drift.step_secs must be greater than 0");

    config
        .composite
        .storage
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid composite settings: {}", e))?;

    config
        .particles
        .validate()
        .context("Invalid particle settings")?;

    anyhow::ensure!(config.release.members > 0, "release.members must be at least 1");

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    anyhow::ensure!(
        valid_levels.contains(&config.logging.level.as_str()),
        "Invalid log level: {}. Must be one of: {:?}",
        config.logging.level,
        valid_levels
    );

    let valid_formats = ["json", "pretty"];
    anyhow::ensure!(
        valid_formats.contains(&config.logging.format.as_str()),
        "Invalid log format: {}. Must be one of: {:?}",
        config.logging.format,
        valid_formats
    );

    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use grid_harmonizer::{DriverVariable, ZarrCompression};

    const MINIMAL: &str = r#"
paths:
  currents: in/currents.zarr
  stokes: in/waves.zarr
  winds_dir: in/gfs
  drivers: out/drivers.zarr
  tracks: out/tracks.geojson
  summary: out/summary.csv
"#;

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("STITCHER_TEST_VAR", "test_value");
        let result = expand_env_vars("prefix_${STITCHER_TEST_VAR}_suffix").unwrap();
        assert_eq!(result, "prefix_test_value_suffix");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("STITCHER_UNSET_VAR");
        let result = expand_env_vars("value_${STITCHER_UNSET_VAR:-default}_end").unwrap();
        assert_eq!(result, "value_default_end");
    }

    #[test]
    fn test_expand_env_vars_errors() {
        std::env::remove_var("STITCHER_REQUIRED_VAR");
        assert!(expand_env_vars("${STITCHER_REQUIRED_VAR}").is_err());
        assert!(expand_env_vars("${UNCLOSED").is_err());
        assert_eq!(expand_env_vars("cost: $5").unwrap(), "cost: $5");
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_run_config(MINIMAL).unwrap();
        assert_eq!(config.horizon_hours, 72);
        assert_eq!(config.drift.step_secs, 3600);
        assert_eq!(config.particles, ParticleParams::default());
        assert_eq!(config.release.members, 20);
        assert_eq!(config.composite.storage, CompositeConfig::from_env());
        assert_eq!(config.logging.format, "pretty");
        assert!(config.bbox.is_none());

        let request = config.stitch_request();
        assert_eq!(request.currents.provider, "currents");
        assert_eq!(request.winds.path, PathBuf::from("in/gfs"));
        assert_eq!(request.output, PathBuf::from("out/drivers.zarr"));
    }

    #[test]
    fn test_sample_config_parses() {
        let config = parse_run_config(include_str!("../config/run.yaml")).unwrap();
        assert_eq!(config.bbox, Some(BoundingBox::new(29.0, 30.0, 32.0, 33.0).unwrap()));
        assert_eq!(config.composite.storage.compression, ZarrCompression::BloscZstd);
        assert_eq!(config.release.points, vec![[32.5, 29.5]]);

        let request = config.stitch_request();
        assert_eq!(request.stokes.provider, "cmems-waves");
        assert_eq!(
            request.stokes.aliases.aliases.get(&DriverVariable::UStokes),
            Some(&vec!["VSDX".to_string()])
        );
        assert!(request.title.is_some());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let bad_format = format!("{MINIMAL}logging:\n  format: xml\n");
        assert!(parse_run_config(&bad_format).is_err());

        let bad_windage = format!("{MINIMAL}particles:\n  windage_pct: 250\n");
        assert!(parse_run_config(&bad_windage).is_err());

        let bad_chunks = format!("{MINIMAL}composite:\n  chunk_time: 0\n");
        assert!(parse_run_config(&bad_chunks).is_err());

        let zero_horizon = format!("{MINIMAL}horizon_hours: 0\n");
        assert!(parse_run_config(&zero_horizon).is_err());
    }
}
