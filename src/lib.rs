// Library interface for the liftrs training load engine
// Integration tests and benchmarks go through these re-exports

pub mod causal;
pub mod config;
pub mod error;
pub mod fatigue;
pub mod history;
pub mod logging;
pub mod models;
pub mod readiness;
pub mod recommender;
pub mod session_monitor;

// Re-export commonly used types for convenience
pub use causal::{CausalConfig, CausalOutcome, CausalReport, CausalSuite};
pub use config::EngineConfig;
pub use error::{CalculationError, EngineError, HistoryError, Result};
pub use fatigue::{FatigueAlert, FatigueConfig, FatigueModel, FatigueSeverity, FatigueStatus};
pub use history::{HistoryAggregator, HistoryConfig, SeriesOutcome, SessionSeries};
pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
pub use models::*;
pub use readiness::{
    HistoryProvider, ReadinessConfig, ReadinessResult, ReadinessScorer, ReadinessService,
    ReadinessSource, ReadinessStatus, RequestToken, TrainingHistory,
};
pub use recommender::{
    Confidence, RecommendationBasis, RecommendationRequest, RecommendationResult,
    TrainingSnapshot, WeightRecommender,
};
pub use session_monitor::{SessionFatigueMonitor, SessionFatigueResult};
