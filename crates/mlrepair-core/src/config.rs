//! Run configuration.
//!
//! A [`RepairConfig`] is resolved once at start-up (file, environment,
//! command-line overrides) and then passed explicitly to the generator and
//! orchestrator. Nothing reads the environment after that.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RepairError, Result};

/// Environment variable naming a config file, consulted when no
/// `--config` flag is given.
pub const CONFIG_ENV: &str = "MLREPAIR_CONFIG";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// What the generator sends to the infill service for each masked program.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnippetMode {
    /// The masked program as-is.
    #[default]
    WholeProgram,
    /// Only the model-building statements around the placeholder.
    ModelContext,
    /// The whole statement holding the placeholder is masked.
    MaskLine,
}

impl std::str::FromStr for SnippetMode {
    type Err = RepairError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "whole_program" | "whole-program" => Ok(Self::WholeProgram),
            "model_context" | "model-context" => Ok(Self::ModelContext),
            "mask_line" | "mask-line" => Ok(Self::MaskLine),
            other => Err(RepairError::Config(format!("unknown snippet mode: {other}"))),
        }
    }
}

/// Static filter toggles. All enabled by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub syntax: bool,
    pub identity: bool,
    pub no_op: bool,
    pub bad_change: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            syntax: true,
            identity: true,
            no_op: true,
            bad_change: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Stop validating an item at its first passing artifact.
    pub early_stop: bool,
    /// Requested worker processes; `1` validates in-process.
    pub workers: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            early_stop: true,
            workers: 1,
        }
    }
}

/// Where an HTTP service lives and, optionally, how to launch it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub host: String,
    /// Fixed port; a free port is picked when absent.
    pub port: Option<u16>,
    /// Launch command; `{port}` is substituted. When absent the service is
    /// expected to be running already.
    pub launch: Option<Vec<String>>,
    /// Delay between health probes during start-up.
    pub poll_interval_secs: f64,
    /// Per-request timeout.
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: None,
            launch: None,
            poll_interval_secs: 5.0,
            request_timeout_secs: 3600,
        }
    }
}

/// External tool that turns a program into trainable artifacts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterializerConfig {
    /// Command with `{source}`, `{work_dir}` and `{out_dir}` placeholders.
    pub command: Vec<String>,
    pub work_dir: PathBuf,
    pub timeout_secs: u64,
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            command: [
                "python",
                "repo2model.py",
                "--repo-path",
                "{source}",
                "--t-repo-path",
                "{work_dir}",
                "--out-dir",
                "{out_dir}",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            work_dir: std::env::temp_dir().join("mlrepair-work"),
            timeout_secs: 600,
        }
    }
}

// ---------------------------------------------------------------------------
// Top level
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Predictions requested per masked program.
    pub top_k: usize,
    pub snippet_mode: SnippetMode,
    pub filters: FilterConfig,
    pub validation: ValidationConfig,
    pub infill: ServiceConfig,
    pub trainer: ServiceConfig,
    pub materializer: MaterializerConfig,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            top_k: 1,
            snippet_mode: SnippetMode::default(),
            filters: FilterConfig::default(),
            validation: ValidationConfig::default(),
            infill: ServiceConfig::default(),
            trainer: ServiceConfig::default(),
            materializer: MaterializerConfig::default(),
        }
    }
}

impl RepairConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Explicit path, else [`CONFIG_ENV`], else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match std::env::var_os(CONFIG_ENV) {
            Some(path) if !path.is_empty() => Self::from_file(Path::new(&path)),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(RepairError::Config("top_k must be at least 1".to_string()));
        }
        if self.validation.workers == 0 {
            return Err(RepairError::Config(
                "validation.workers must be at least 1".to_string(),
            ));
        }
        if self.materializer.command.is_empty() {
            return Err(RepairError::Config(
                "materializer.command must not be empty".to_string(),
            ));
        }
        for (name, service) in [("infill", &self.infill), ("trainer", &self.trainer)] {
            if matches!(&service.launch, Some(cmd) if cmd.is_empty()) {
                return Err(RepairError::Config(format!(
                    "{name}.launch must not be empty"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RepairConfig::default();
        assert_eq!(config.top_k, 1);
        assert_eq!(config.snippet_mode, SnippetMode::WholeProgram);
        assert!(config.filters.bad_change);
        assert!(config.validation.early_stop);
        assert_eq!(config.validation.workers, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RepairConfig::from_toml_str(
            r#"
top_k = 3
snippet_mode = "mask_line"

[filters]
bad_change = false

[infill]
port = 37755
launch = ["python", "infill.py", "--port", "{port}"]
"#,
        )
        .unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.snippet_mode, SnippetMode::MaskLine);
        assert!(!config.filters.bad_change);
        assert!(config.filters.no_op);
        assert_eq!(config.infill.port, Some(37755));
        assert_eq!(config.infill.poll_interval_secs, 5.0);
        assert!(config.trainer.launch.is_none());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(RepairConfig::from_toml_str("top_k = 0").is_err());
        assert!(RepairConfig::from_toml_str("[validation]\nworkers = 0").is_err());
        assert!(matches!(
            RepairConfig::from_toml_str("top_k = \"many\""),
            Err(RepairError::Toml(_))
        ));
    }

    #[test]
    fn test_resolve_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mlrepair.toml");
        std::fs::write(&path, "top_k = 2\n").unwrap();
        let config = RepairConfig::resolve(Some(&path)).unwrap();
        assert_eq!(config.top_k, 2);
    }

    #[test]
    fn test_snippet_mode_from_str() {
        assert_eq!(
            "model-context".parse::<SnippetMode>().unwrap(),
            SnippetMode::ModelContext
        );
        assert!("everything".parse::<SnippetMode>().is_err());
    }
}
