//! Decision Engine — loss scoring and pipeline orchestration for one turn.
//!
//! `analyze` runs the full per-turn pipeline: extract → penalize → plan →
//! govern. It is pure except for two per-session side channels it owns: the
//! Fairness Governor's probe history and an append-only decision-trace log.
//! Both live on the engine handle, one handle per session.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::fairness::{FairnessAudit, FairnessGovernor};
use crate::probe;
use crate::profiles::ProfileCatalog;
use crate::signals::{self, ExtractedSignals, OwnershipStance};
use crate::types::{Category, InterviewMode, ProbeOutcome};

/// Consistency failures add a flat penalty on top of weighted checks.
const INCONSISTENCY_PENALTY: f64 = 0.5;
/// Hesitation count above which the hesitation penalty applies.
const HESITATION_LIMIT: u32 = 3;

/// Immutable result of analyzing one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionState {
    /// Governed loss score, [0,1].
    pub loss_score: f64,
    /// Name of the resolved company profile.
    pub company_risk: String,
    pub signals: ExtractedSignals,
    pub probe: ProbeOutcome,
    /// Ordered audit trace for this turn. Never shown to the candidate.
    pub verdict_trace: Vec<String>,
    /// Governance outcome applied to the raw loss.
    pub audit: FairnessAudit,
}

/// Inputs for one turn of analysis.
#[derive(Debug, Clone)]
pub struct AnalyzeRequest<'a> {
    pub input: &'a str,
    pub company_name: &'a str,
    pub current_stage: u8,
    pub code_change_count: u32,
    pub session_id: &'a str,
    pub category: Category,
    pub mode: InterviewMode,
}

/// Per-session decision engine handle.
pub struct DecisionEngine {
    catalog: Arc<ProfileCatalog>,
    governor: FairnessGovernor,
    /// Append-only across the session lifetime; audit-only.
    trace_log: Vec<String>,
}

impl DecisionEngine {
    pub fn new(catalog: Arc<ProfileCatalog>) -> Self {
        Self {
            catalog,
            governor: FairnessGovernor::new(),
            trace_log: Vec::new(),
        }
    }

    /// The full decision trace accumulated this session.
    pub fn trace_log(&self) -> &[String] {
        &self.trace_log
    }

    /// Probe history observed by the governor this session.
    pub fn probe_history(&self) -> &[crate::types::ProbeType] {
        self.governor.history()
    }

    /// Analyze one candidate turn.
    pub fn analyze(&mut self, req: AnalyzeRequest<'_>) -> DecisionState {
        let profile = self.catalog.resolve(req.company_name);
        let weights = &profile.weights;
        let signals = signals::extract(req.input, req.code_change_count);

        let mut trace: Vec<String> = Vec::new();
        let mut raw_loss = 0.0_f64;

        // Penalty checks apply only on the technical track.
        let behavioral = req.category.is_behavioral() || req.mode == InterviewMode::Behavioral;
        if !behavioral {
            if !signals.used_metrics {
                raw_loss += weights.missing_metrics;
                trace.push(format!(
                    "+{:.2} missing metrics (no quantified claim)",
                    weights.missing_metrics
                ));
            }
            if signals.ownership == OwnershipStance::We {
                raw_loss += weights.plural_ownership;
                trace.push(format!(
                    "+{:.2} plural ownership (individual contribution unclear)",
                    weights.plural_ownership
                ));
            }
            if !signals.tradeoff_detected {
                raw_loss += weights.missing_tradeoff;
                trace.push(format!(
                    "+{:.2} no tradeoff considered",
                    weights.missing_tradeoff
                ));
            }
            if signals.hesitation_signals > HESITATION_LIMIT {
                raw_loss += weights.high_hesitation;
                trace.push(format!(
                    "+{:.2} high hesitation ({} markers)",
                    weights.high_hesitation, signals.hesitation_signals
                ));
            }
        } else {
            trace.push("behavioral track: penalty checks suspended".into());
        }

        // Cross-signal contradiction always counts, on both tracks.
        if !signals::verify_consistency(&signals) {
            raw_loss += INCONSISTENCY_PENALTY;
            trace.push(format!(
                "+{INCONSISTENCY_PENALTY:.2} cross-signal inconsistency"
            ));
        }

        let raw_loss = raw_loss.clamp(0.0, 1.0);
        trace.push(format!("raw loss {raw_loss:.2}"));

        let probe = probe::plan(
            &signals,
            weights,
            req.current_stage,
            raw_loss,
            req.category,
        );
        trace.push(format!(
            "probe {} → {} (stage {})",
            probe.probe_type, probe.target_weakness, probe.stage
        ));

        let audit = self.governor.apply_governance(raw_loss, &probe, &signals);
        if let Some(adjustment) = &audit.adjustment {
            trace.push(format!("governance: {adjustment}"));
        }
        let loss_score = audit.modified_loss_score.clamp(0.0, 1.0);
        trace.push(format!("final loss {loss_score:.2}"));

        debug!(
            session = req.session_id,
            company = %profile.name,
            loss = loss_score,
            probe = %probe.probe_type,
            "Turn analyzed"
        );
        self.trace_log.extend(trace.iter().cloned());

        DecisionState {
            loss_score,
            company_risk: profile.name.clone(),
            signals,
            probe,
            verdict_trace: trace,
            audit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> DecisionEngine {
        DecisionEngine::new(Arc::new(ProfileCatalog::builtin()))
    }

    fn request<'a>(input: &'a str, category: Category) -> AnalyzeRequest<'a> {
        AnalyzeRequest {
            input,
            company_name: "Nimbus Labs",
            current_stage: 1,
            code_change_count: 1,
            session_id: "s-1",
            category,
            mode: InterviewMode::Standard,
        }
    }

    #[test]
    fn loss_is_always_in_unit_interval() {
        let mut engine = engine();
        let inputs = [
            "",
            "we we we our our us maybe um uh not sure i guess kind of",
            "I cut p99 from 900ms to 120ms, a 7x gain, at the cost of memory",
            "obviously best practice, everyone knows, always, never",
        ];
        for input in inputs {
            for category in [Category::Behavioral, Category::Systems] {
                let state = engine.analyze(request(input, category));
                assert!(
                    (0.0..=1.0).contains(&state.loss_score),
                    "loss out of range for {input:?}"
                );
            }
        }
    }

    #[test]
    fn weighted_penalties_accumulate_on_technical_track() {
        let mut engine = engine();
        // No metrics, we-stance, no tradeoff → three penalties at Nimbus
        // weights 0.7 + 0.7 + 0.4, clamped to 1.0 before governance.
        let state = engine.analyze(request("we shipped our service together", Category::Systems));
        assert!(state.verdict_trace.iter().any(|t| t.contains("missing metrics")));
        assert!(state
            .verdict_trace
            .iter()
            .any(|t| t.contains("plural ownership")));
        assert!(state.verdict_trace.iter().any(|t| t.contains("tradeoff")));
    }

    #[test]
    fn behavioral_track_suspends_penalties() {
        let mut engine = engine();
        let state = engine.analyze(request(
            "we shipped our service together",
            Category::Behavioral,
        ));
        assert!(state
            .verdict_trace
            .iter()
            .any(|t| t.contains("penalty checks suspended")));
        assert_eq!(state.loss_score, 0.0);
    }

    #[test]
    fn behavioral_mode_suspends_penalties_for_technical_category() {
        let mut engine = engine();
        let mut req = request("we shipped our service together", Category::Systems);
        req.mode = InterviewMode::Behavioral;
        let state = engine.analyze(req);
        assert_eq!(state.loss_score, 0.0);
    }

    #[test]
    fn inconsistency_penalty_applies_on_both_tracks() {
        let mut engine = engine();
        // High-confidence metrics with zero code changes → inconsistency.
        let mut req = request("latency fell 30ms 40ms 50ms after my fix", Category::Behavioral);
        req.code_change_count = 0;
        let state = engine.analyze(req);
        assert!(state
            .verdict_trace
            .iter()
            .any(|t| t.contains("inconsistency")));
        assert!(state.loss_score > 0.0);
    }

    #[test]
    fn unknown_company_never_errors() {
        let mut engine = engine();
        let mut req = request("I indexed the table", Category::Systems);
        req.company_name = "Entirely Unknown Co";
        let state = engine.analyze(req);
        assert_eq!(state.company_risk, "default");
    }

    #[test]
    fn trace_log_is_append_only_across_turns() {
        let mut engine = engine();
        engine.analyze(request("I indexed the table", Category::Systems));
        let after_one = engine.trace_log().len();
        engine.analyze(request("I added a cache", Category::Systems));
        assert!(engine.trace_log().len() > after_one);
    }

    #[test]
    fn governor_history_grows_per_turn() {
        let mut engine = engine();
        engine.analyze(request("I indexed the table", Category::Systems));
        engine.analyze(request("I added a cache", Category::Systems));
        assert_eq!(engine.probe_history().len(), 2);
    }

    #[test]
    fn final_loss_uses_governed_value() {
        let mut engine = engine();
        // First turn, maximal penalties: raw loss clamps to 1.0, but rule 1
        // caps early judgment at 0.6.
        let mut req = request(
            "we always did it our way, um, maybe, not sure, I guess, kind of, uh",
            Category::Systems,
        );
        req.code_change_count = 0;
        let state = engine.analyze(req);
        assert!(state.loss_score <= 0.6);
        assert!(!state.audit.is_safe);
    }
}
