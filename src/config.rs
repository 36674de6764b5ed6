//! Search configuration loading.
//!
//! A config file is plain TOML mirroring [`MctsConfig`]; every field is
//! optional. Lookup order:
//! 1. an explicit path (the CLI's `--config`)
//! 2. the path in `MCTS_2048_CONFIG`
//! 3. built-in defaults
//!
//! `MCTS_2048_<FIELD>` environment variables then override single fields.
//!
//! ```toml
//! rollout_budget = 2000
//! exploration_constant = 80.0
//!
//! [heuristic]
//! empty_weight = 3.0
//! ```

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::mcts::MctsConfig;

pub const CONFIG_ENV: &str = "MCTS_2048_CONFIG";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: PathBuf, source: toml::de::Error },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load and validate the search configuration.
///
/// An explicit `path` must exist. A missing `MCTS_2048_CONFIG` target only
/// logs a warning and falls back to the defaults.
pub fn load_config(path: Option<&Path>) -> Result<MctsConfig, ConfigError> {
    let cfg = match path {
        Some(path) => {
            info!("Loading config from {}", path.display());
            load_from_path(path)?
        }
        None => match std::env::var_os(CONFIG_ENV).map(PathBuf::from) {
            Some(path) if path.exists() => {
                info!("Loading config from {CONFIG_ENV}: {}", path.display());
                load_from_path(&path)?
            }
            Some(path) => {
                warn!("{CONFIG_ENV}={} not found, using defaults", path.display());
                MctsConfig::default()
            }
            None => {
                debug!("No config file given, using built-in defaults");
                MctsConfig::default()
            }
        },
    };
    let cfg = apply_overrides(cfg, |key| std::env::var(key).ok())?;
    cfg.validate()?;
    Ok(cfg)
}

pub fn load_from_path(path: &Path) -> Result<MctsConfig, ConfigError> {
    let content =
        std::fs::read_to_string(path).map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
    parse_config(&content).map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })
}

pub fn parse_config(content: &str) -> Result<MctsConfig, toml::de::Error> {
    toml::from_str(content)
}

macro_rules! env_override {
    ($cfg:expr, $lookup:expr, $field:ident, $key:expr) => {
        if let Some(raw) = $lookup($key) {
            $cfg.$field = raw
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("{}={raw:?} is not a valid value", $key)))?;
            debug!(key = $key, value = %raw, "env override");
        }
    };
}

/// Apply `MCTS_2048_<FIELD>` overrides, reading variables through `lookup`.
pub fn apply_overrides<F>(mut cfg: MctsConfig, lookup: F) -> Result<MctsConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    env_override!(cfg, lookup, rollout_budget, "MCTS_2048_ROLLOUT_BUDGET");
    env_override!(cfg, lookup, exploration_constant, "MCTS_2048_EXPLORATION_CONSTANT");
    env_override!(cfg, lookup, rollout_depth, "MCTS_2048_ROLLOUT_DEPTH");
    env_override!(cfg, lookup, score_weight, "MCTS_2048_SCORE_WEIGHT");
    env_override!(cfg, lookup, threads, "MCTS_2048_THREADS");
    if let Some(raw) = lookup("MCTS_2048_TIME_LIMIT_MS") {
        let ms: u64 = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("MCTS_2048_TIME_LIMIT_MS={raw:?} is not a valid value")))?;
        cfg.time_limit_ms = Some(ms);
    }
    Ok(cfg)
}
