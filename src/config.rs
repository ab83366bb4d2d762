//! Gateway configuration.
//!
//! Paths and solver defaults come from an optional TOML file with
//! `GRIDGATE_*` environment overrides. Engine locations stay opaque
//! strings; nothing here is interpreted beyond joining paths.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Default solver parameters applied when a caller omits them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverDefaults {
    /// Convergence tolerance on the largest per-unit voltage update.
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Iteration budget per solve.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

impl Default for SolverDefaults {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Root directory for run artifact directories.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,
    /// Directory that relative case file sources resolve under.
    #[serde(default)]
    pub case_root: Option<PathBuf>,
    /// Solver defaults.
    #[serde(default)]
    pub solver: SolverDefaults,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            artifact_root: default_artifact_root(),
            case_root: None,
            solver: SolverDefaults::default(),
        }
    }
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from("simulation_output")
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_max_iterations() -> usize {
    2000
}

impl GatewayConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> GatewayResult<Self> {
        toml::from_str(text).map_err(|e| GatewayError::Parse {
            path: "<config>".to_string(),
            detail: e.to_string(),
        })
    }

    /// Loads configuration from an optional file, then applies
    /// environment overrides. A missing explicit file is an error; no
    /// file at all means defaults.
    pub fn load(path: Option<&Path>) -> GatewayResult<Self> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        GatewayError::NotFound {
                            path: path.display().to_string(),
                        }
                    } else {
                        GatewayError::io(path.display().to_string(), &e)
                    }
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Applies `GRIDGATE_ARTIFACT_ROOT` and `GRIDGATE_CASE_ROOT`.
    pub fn apply_env(&mut self) {
        if let Ok(root) = std::env::var("GRIDGATE_ARTIFACT_ROOT") {
            if !root.is_empty() {
                self.artifact_root = PathBuf::from(root);
            }
        }
        if let Ok(root) = std::env::var("GRIDGATE_CASE_ROOT") {
            if !root.is_empty() {
                self.case_root = Some(PathBuf::from(root));
            }
        }
    }
}
