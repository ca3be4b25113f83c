//! Unified error hierarchy for liftrs
//!
//! Estimators never surface these for missing data (that is a normal
//! `InsufficientData` outcome). Errors exist at the collaborator seams:
//! the history provider, the readiness watchdog and scoring task, linear algebra inside
//! the causal suite, and configuration.

use thiserror::Error;

/// Top-level error type for all engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    /// Upstream history fetch failed
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    /// Numerical calculation errors
    #[error("Calculation error: {0}")]
    Calculation(#[from] CalculationError),

    /// Operation exceeded its time budget
    #[error("Operation '{operation}' timed out after {budget_ms}ms")]
    Timeout { operation: String, budget_ms: u64 },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Scoring task panicked or was cancelled
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors reported by the collaborators that supply training history
#[derive(Debug, Error)]
pub enum HistoryError {
    /// Session history could not be fetched
    #[error("History unavailable for user {user_id}: {reason}")]
    Unavailable { user_id: String, reason: String },
}

/// Calculation errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CalculationError {
    /// Insufficient data for calculation
    #[error("Insufficient data for {calculation}: {reason}")]
    InsufficientData { calculation: String, reason: String },

    /// Design matrix could not be inverted
    #[error("Singular system in {calculation}")]
    SingularMatrix { calculation: String },

    /// Invalid parameter
    #[error("Invalid parameter for {calculation}: {parameter}={value}")]
    InvalidParameter {
        calculation: String,
        parameter: String,
        value: String,
    },

    /// Iterative fit did not converge
    #[error("{calculation} did not converge after {iterations} iterations")]
    NonConvergence { calculation: String, iterations: usize },
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::History(HistoryError::Unavailable { .. }) | EngineError::Timeout { .. }
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EngineError::History(_) => ErrorSeverity::Warning,
            EngineError::Timeout { .. } => ErrorSeverity::Warning,
            EngineError::Calculation(CalculationError::InsufficientData { .. }) => {
                ErrorSeverity::Info
            }
            EngineError::Calculation(_) => ErrorSeverity::Error,
            EngineError::Configuration(_) => ErrorSeverity::Error,
            EngineError::Internal(_) => ErrorSeverity::Critical,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            EngineError::History(_) => {
                "Your training history could not be loaded right now.".to_string()
            }
            EngineError::Timeout { .. } => {
                "This is taking longer than expected. Showing a conservative estimate.".to_string()
            }
            EngineError::Calculation(CalculationError::InsufficientData { calculation, .. }) => {
                format!(
                    "Not enough training data to calculate {}. Keep logging sessions.",
                    calculation
                )
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}
