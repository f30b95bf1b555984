//! Optional `palimpsest.toml` configuration (SPEC_FULL.md "Configuration").
//!
//! Overrides scorer weights, retrieval defaults, and pruner thresholds.
//! Absence of the file is not an error — compiled-in defaults (matching
//! the spec's literal numbers) apply.

use serde::Deserialize;

use crate::pruner::PrunePolicy;
use crate::score::ScorerWeights;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scorer: Option<ScorerConfig>,
    #[serde(default)]
    pub retrieval: Option<RetrievalConfig>,
    #[serde(default)]
    pub pruner: Option<PrunerConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScorerConfig {
    pub decision_marker: Option<f64>,
    pub error_resolution: Option<f64>,
    pub learning: Option<f64>,
    pub file_creation: Option<f64>,
    pub test_success: Option<f64>,
    pub tool_usage_intensity: Option<f64>,
    pub code_presence: Option<f64>,
    pub architecture: Option<f64>,
    pub file_ops_count: Option<f64>,
}

impl ScorerConfig {
    pub fn apply(&self, defaults: ScorerWeights) -> ScorerWeights {
        ScorerWeights {
            decision_marker: self.decision_marker.unwrap_or(defaults.decision_marker),
            error_resolution: self.error_resolution.unwrap_or(defaults.error_resolution),
            learning: self.learning.unwrap_or(defaults.learning),
            file_creation: self.file_creation.unwrap_or(defaults.file_creation),
            test_success: self.test_success.unwrap_or(defaults.test_success),
            tool_usage_intensity: self
                .tool_usage_intensity
                .unwrap_or(defaults.tool_usage_intensity),
            code_presence: self.code_presence.unwrap_or(defaults.code_presence),
            architecture: self.architecture.unwrap_or(defaults.architecture),
            file_ops_count: self.file_ops_count.unwrap_or(defaults.file_ops_count),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalConfig {
    pub k_max: Option<usize>,
    pub k_recent: Option<usize>,
    pub min_importance: Option<f64>,
    pub min_similarity: Option<f32>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrunerConfig {
    pub old_threshold_days: Option<f64>,
    pub low_importance_threshold: Option<f64>,
    pub redundancy_threshold: Option<f32>,
    pub max_per_session: Option<usize>,
}

impl PrunerConfig {
    pub fn apply(&self, defaults: PrunePolicy) -> PrunePolicy {
        PrunePolicy {
            old_threshold_days: self.old_threshold_days.unwrap_or(defaults.old_threshold_days),
            low_importance_threshold: self
                .low_importance_threshold
                .unwrap_or(defaults.low_importance_threshold),
            redundancy_threshold: self
                .redundancy_threshold
                .unwrap_or(defaults.redundancy_threshold),
            max_per_session: self.max_per_session.unwrap_or(defaults.max_per_session),
        }
    }
}

/// Platform config dir (`directories::ProjectDirs`) path for
/// `palimpsest.toml`, e.g. `~/.config/palimpsest/palimpsest.toml` on Linux.
pub fn config_path() -> Option<std::path::PathBuf> {
    directories::ProjectDirs::from("dev", "palimpsest", "core")
        .map(|dirs| dirs.config_dir().join("palimpsest.toml"))
}

/// Load and parse `palimpsest.toml` if present; `Ok(Config::default())` if
/// absent. A malformed file is a warning, not a fatal error — the pipeline
/// never blocks the host over an optional config file (spec.md §7).
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => match toml::from_str(&text) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(?path, error = %err, "failed to parse palimpsest.toml, using defaults");
                Config::default()
            }
        },
        Err(_) => Config::default(),
    }
}
