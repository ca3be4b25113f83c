use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::causal::{CausalConfig, CausalSuite};
use crate::error::EngineError;
use crate::fatigue::{FatigueConfig, FatigueModel};
use crate::history::{HistoryAggregator, HistoryConfig};
use crate::logging::LogConfig;
use crate::readiness::{ReadinessConfig, ReadinessScorer};
use crate::recommender::{RecommenderConfig, WeightRecommender};
use crate::session_monitor::SessionFatigueMonitor;

/// Engine configuration
///
/// Every section falls back to its defaults, so a partial TOML file (or an
/// empty one) loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub metadata: ConfigMetadata,
    pub history: HistoryConfig,
    pub fatigue: FatigueConfig,
    pub recommender: RecommenderConfig,
    pub readiness: ReadinessConfig,
    pub causal: CausalConfig,
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        let now = Utc::now();
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metadata: ConfigMetadata::default(),
            history: HistoryConfig::default(),
            fatigue: FatigueConfig::default(),
            recommender: RecommenderConfig::default(),
            readiness: ReadinessConfig::default(),
            causal: CausalConfig::default(),
            logging: LogConfig::default(),
        }
    }
}

/// Configuration management implementation
impl EngineConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: EngineConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Default configuration file path (`~/.liftrs/engine.toml`)
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".liftrs")
            .join("engine.toml")
    }

    /// Load configuration with fallback to defaults
    pub fn load_or_default() -> Self {
        let config_path = Self::default_config_path();

        match Self::load_from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %config_path.display(),
                    error = %e,
                    "Engine config not loaded, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Reject settings the engine cannot compute with
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |message: &str| Err(EngineError::Configuration(message.to_string()));

        if self.history.min_sessions == 0 {
            return invalid("history.min_sessions must be at least 1");
        }

        let f = &self.fatigue;
        if f.half_life_hours <= 0.0 || f.window_hours <= 0.0 {
            return invalid("fatigue half-life and window must be positive");
        }
        if !(f.mild_threshold < f.moderate_threshold
            && f.moderate_threshold < f.high_threshold
            && f.high_threshold < f.critical_threshold)
        {
            return invalid("fatigue severity thresholds must be strictly increasing");
        }

        let r = &self.recommender;
        if r.reduction_per_rpe < 0.0 || !(0.0..1.0).contains(&r.max_reduction) {
            return invalid("recommender reduction must be in [0, 1)");
        }
        if r.stale_max_days < 0 {
            return invalid("recommender.stale_max_days must not be negative");
        }

        let rd = &self.readiness;
        if rd.acute_days <= 0 || rd.chronic_days < rd.acute_days {
            return invalid("readiness windows must satisfy 0 < acute_days <= chronic_days");
        }
        if !(rd.undertrained_below < rd.optimal_max && rd.optimal_max < rd.caution_max) {
            return invalid("ACWR bands must be strictly increasing");
        }
        if rd.compound_recovery_hours <= 0.0 || rd.isolation_recovery_hours <= 0.0 {
            return invalid("recovery hours must be positive");
        }
        if rd.acwr_weight < 0.0 || rd.recovery_weight <= 0.0 || rd.trend_weight < 0.0 {
            return invalid("readiness weights must be non-negative, recovery weight positive");
        }
        if rd.timeout_ms == 0 {
            return invalid("readiness.timeout_ms must be positive");
        }

        let c = &self.causal;
        if !(c.alpha > 0.0 && c.alpha < 1.0) {
            return invalid("causal.alpha must be in (0, 1)");
        }
        if c.granger_lag == 0 || c.caliper_sd <= 0.0 || c.ridge_penalty < 0.0 {
            return invalid("causal lag, caliper and ridge penalty are out of range");
        }

        Ok(())
    }

    pub fn aggregator(&self) -> HistoryAggregator {
        HistoryAggregator::with_config(self.history.clone())
    }

    pub fn fatigue_model(&self) -> FatigueModel {
        FatigueModel::with_config(self.fatigue.clone())
    }

    pub fn recommender(&self) -> WeightRecommender {
        WeightRecommender::with_config(
            self.recommender.clone(),
            self.fatigue_model(),
            self.aggregator(),
        )
    }

    pub fn session_monitor(&self) -> SessionFatigueMonitor {
        SessionFatigueMonitor::with_model(self.fatigue_model())
    }

    pub fn readiness_scorer(&self) -> ReadinessScorer {
        ReadinessScorer::with_config(self.readiness.clone(), self.aggregator())
    }

    pub fn causal_suite(&self) -> CausalSuite {
        CausalSuite::with_config(self.causal.clone(), self.aggregator())
    }
}
