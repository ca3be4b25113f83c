//! Session Fatigue Monitor
//!
//! Re-derives fatigue from the full list of the current session's sets after
//! every logged set. There is no incremental state to drift: the same input
//! always produces the same assessment.

use crate::fatigue::{FatigueAlert, FatigueModel, FatigueSeverity, FatigueStatus, MuscleFatigue};
use crate::models::{ExerciseCatalog, SetRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Mid-session fatigue assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFatigueResult {
    pub status: FatigueStatus,
    pub should_reduce_weight: bool,
    pub alert: Option<FatigueAlert>,
    pub peak_overshoot: f64,
    /// Breakdown for the muscles considered
    pub muscles: Vec<MuscleFatigue>,
    pub completed_sets: usize,
    pub total_sets: usize,
}

impl SessionFatigueResult {
    pub fn severity(&self) -> Option<FatigueSeverity> {
        self.alert.as_ref().map(|a| a.severity)
    }
}

#[derive(Debug, Clone, Default)]
pub struct SessionFatigueMonitor {
    model: FatigueModel,
}

impl SessionFatigueMonitor {
    pub fn new() -> Self {
        SessionFatigueMonitor::default()
    }

    pub fn with_model(model: FatigueModel) -> Self {
        SessionFatigueMonitor { model }
    }

    /// Assess the in-progress session
    ///
    /// With `next_exercise` only the muscles it trains are considered; an
    /// unknown or absent next exercise considers every muscle worked so far.
    pub fn assess(
        &self,
        session_sets: &[SetRecord],
        next_exercise: Option<&str>,
        catalog: &ExerciseCatalog,
        now: DateTime<Utc>,
    ) -> SessionFatigueResult {
        let state = self.model.fatigue_state(session_sets, catalog, now);

        let focus: BTreeSet<String> = next_exercise
            .map(|id| catalog.muscle_groups(id))
            .unwrap_or_default();

        let muscles: Vec<MuscleFatigue> = state
            .muscles
            .values()
            .filter(|m| focus.is_empty() || focus.contains(&m.muscle))
            .cloned()
            .collect();
        let peak_overshoot = muscles.iter().map(|m| m.score).fold(0.0, f64::max);

        let alert = self.model.alert_for(&state, &focus);
        let should_reduce_weight = alert
            .as_ref()
            .is_some_and(|a| a.severity >= FatigueSeverity::Moderate);

        let completed_sets = session_sets.iter().filter(|s| s.is_completed()).count();

        if should_reduce_weight {
            tracing::info!(
                next_exercise = next_exercise.unwrap_or("-"),
                peak_overshoot,
                completed_sets,
                "Session fatigue warrants a load reduction"
            );
        }

        SessionFatigueResult {
            status: state.status(),
            should_reduce_weight,
            alert,
            peak_overshoot,
            muscles,
            completed_sets,
            total_sets: session_sets.len(),
        }
    }
}
