//! Adaptive Pressure Engine — the 200/300/400/SOS level ladder.
//!
//! Runs independently of the Decision Engine on the same metrics snapshot.
//! Trigger rules are ordered, first match wins; the per-session action
//! history only ever grows within a session (no decay policy — none exists
//! in the calibrated behavior, so none is invented here).

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::telemetry::BehavioralMetrics;

/// Pressure level attached to an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureLevel {
    L200,
    L300,
    L400,
    Sos,
}

/// What kind of intervention to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureKind {
    /// Add an artificial constraint to the task.
    Constraint,
    /// Interrupt with a direct question or check-in.
    Interrupt,
    /// Demand a live explanation of what was just written.
    ExplanationDemand,
    /// Pose a targeted probe.
    Probe,
}

/// A single pressure intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PressureAction {
    pub kind: PressureKind,
    pub message: String,
    pub level: PressureLevel,
    pub reason: String,
}

/// Per-session pressure engine. History is append-only for the session.
#[derive(Debug, Default)]
pub struct PressureEngine {
    history: Vec<PressureAction>,
}

impl PressureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[PressureAction] {
        &self.history
    }

    /// Accumulated pressure in [0,1]: average of history volume
    /// (saturating at 5 actions) and the weighted share of
    /// constraint/interrupt actions.
    pub fn pressure_level(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let volume = (self.history.len() as f64 / 5.0).min(1.0);
        let weighted: f64 = self
            .history
            .iter()
            .map(|a| match a.kind {
                PressureKind::Interrupt => 1.0,
                PressureKind::Constraint => 0.6,
                _ => 0.0,
            })
            .sum();
        let harshness = weighted / self.history.len() as f64;
        (volume + harshness) / 2.0
    }

    /// Evaluate the trigger ladder against a metrics snapshot.
    ///
    /// `silent` is the analyzer's silence detector at evaluation time;
    /// `looping` its snapshot-hash loop detector.
    pub fn evaluate(
        &mut self,
        m: &BehavioralMetrics,
        silent: bool,
        looping: bool,
    ) -> Option<PressureAction> {
        let pressure = self.pressure_level();
        let action = self.pick_action(m, silent, looping, pressure)?;
        debug!(
            kind = ?action.kind,
            level = ?action.level,
            reason = %action.reason,
            pressure,
            "Pressure action triggered"
        );
        self.history.push(action.clone());
        Some(action)
    }

    fn pick_action(
        &self,
        m: &BehavioralMetrics,
        silent: bool,
        looping: bool,
        pressure: f64,
    ) -> Option<PressureAction> {
        // Integrity overlay outranks everything, including the 400 stressor.
        if m.approach_consistency > 0.9
            && m.rewrite_density < 0.05
            && m.typing_speed > 0.6
            && m.thinking_latency < 0.1
        {
            return Some(action(
                PressureKind::ExplanationDemand,
                PressureLevel::L400,
                "integrity_overlay",
                "This is going suspiciously smoothly. Walk me through exactly \
                 why your last change works.",
            ));
        }

        if m.confidence_detected() && !m.distressed() && pressure < 0.7 {
            return Some(action(
                PressureKind::Constraint,
                PressureLevel::L400,
                "confident_flow",
                "New constraint: memory is now a tenth of what you assumed. \
                 Adapt your approach.",
            ));
        }

        if m.panic_detected() || (m.distressed() && pressure > 0.5) {
            return Some(action(
                PressureKind::Probe,
                PressureLevel::Sos,
                "recovery",
                "Let's step back. Forget the code for a second — describe the \
                 problem in one sentence.",
            ));
        }

        if looping && pressure < 0.4 {
            return Some(action(
                PressureKind::Probe,
                PressureLevel::L300,
                "loop_detected",
                "You've rewritten the same block a few times. What is the \
                 invariant you're trying to hold?",
            ));
        }

        if silent && m.typing_speed < 0.2 {
            return Some(action(
                PressureKind::Interrupt,
                PressureLevel::L200,
                "baseline_nudge",
                "Talk me through what you're considering right now.",
            ));
        }

        None
    }
}

fn action(
    kind: PressureKind,
    level: PressureLevel,
    reason: &str,
    message: &str,
) -> PressureAction {
    PressureAction {
        kind,
        message: message.to_string(),
        level,
        reason: reason.to_string(),
    }
}
