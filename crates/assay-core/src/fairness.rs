//! Fairness Governor — session-wide governance over the decision pipeline.
//!
//! The governor owns an append-only history of emitted probe types, scoped to
//! one session (a per-session handle, never a process-wide map — shared
//! history would bleed one candidate's treatment into another's). Rules are
//! ordered, first match wins, and each caps the loss score rather than
//! raising it: governance only ever protects the candidate.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::signals::ExtractedSignals;
use crate::types::{ProbeOutcome, ProbeType};

/// Loss cap when judging too early (rule 1).
const EARLY_CAP: f64 = 0.6;
/// Loss cap during forced stabilization (rule 2).
const STABILIZE_CAP: f64 = 0.4;
/// Loss cap inside the recovery sanctuary (rule 3).
const RECOVERY_CAP: f64 = 0.3;
/// Probes that must be observed before a harsh loss may stand.
const MIN_PROBES_FOR_HIGH_LOSS: usize = 3;

/// Result of auditing one decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessAudit {
    /// True when no rule had to intervene.
    pub is_safe: bool,
    /// Human-readable description of the intervention, when one fired.
    pub adjustment: Option<String>,
    /// The loss score after governance; callers must use this value.
    pub modified_loss_score: f64,
}

/// Per-session governor with an append-only probe history.
#[derive(Debug, Default)]
pub struct FairnessGovernor {
    history: Vec<ProbeType>,
}

impl FairnessGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe types observed so far, oldest first.
    pub fn history(&self) -> &[ProbeType] {
        &self.history
    }

    /// Record the planned probe, then audit the loss score against the
    /// governance rules in priority order.
    pub fn apply_governance(
        &mut self,
        loss_score: f64,
        probe: &ProbeOutcome,
        signals: &ExtractedSignals,
    ) -> FairnessAudit {
        self.history.push(probe.probe_type);

        // Rule 1: no harsh judgment before enough probes have been observed.
        if loss_score > 0.8 && self.history.len() < MIN_PROBES_FOR_HIGH_LOSS {
            return self.capped(
                loss_score,
                EARLY_CAP,
                format!(
                    "loss {loss_score:.2} capped at {EARLY_CAP}: only {} probe(s) observed",
                    self.history.len()
                ),
            );
        }

        // Rule 2: never three brutal probes in a row — forced stabilization.
        let recent_brutal = self
            .history
            .iter()
            .rev()
            .take(3)
            .filter(|p| p.is_brutal())
            .count();
        if recent_brutal >= 2 {
            return self.capped(
                loss_score,
                STABILIZE_CAP,
                format!(
                    "forced stabilization: {recent_brutal} of last 3 probes were brutal"
                ),
            );
        }

        // Rule 3: recovery sanctuary — demonstrated recovery caps the loss.
        if signals.used_metrics && signals.tradeoff_detected && loss_score > 0.5 {
            return self.capped(
                loss_score,
                RECOVERY_CAP,
                "recovery sanctuary: metrics + tradeoff demonstrated".to_string(),
            );
        }

        FairnessAudit {
            is_safe: true,
            adjustment: None,
            modified_loss_score: loss_score,
        }
    }

    fn capped(&self, loss: f64, cap: f64, reason: String) -> FairnessAudit {
        let modified = loss.min(cap);
        debug!(loss, cap, reason = %reason, "Fairness rule fired");
        FairnessAudit {
            is_safe: false,
            adjustment: Some(reason),
            modified_loss_score: modified,
        }
    }
}
