//! Probe Planner — chooses the next probing strategy.
//!
//! Two first-match-wins cascades, one per track (behavioral / technical),
//! expressed as ordered rule lists so each predicate is individually
//! testable. The planner is pure: per-session rationing of harsh probes is
//! the Fairness Governor's job, not the planner's.

use crate::profiles::PenaltyWeights;
use crate::signals::{ExtractedSignals, OwnershipStance};
use crate::types::{Category, ProbeOutcome, ProbeType};

/// Everything a cascade predicate may look at.
pub struct ProbeContext<'a> {
    pub signals: &'a ExtractedSignals,
    pub weights: &'a PenaltyWeights,
    pub stage: u8,
    pub loss: f64,
    pub category: Category,
}

/// One (predicate, outcome) pair in a cascade.
pub struct ProbeRule {
    pub name: &'static str,
    pub applies: fn(&ProbeContext) -> bool,
    pub build: fn(&ProbeContext) -> ProbeOutcome,
}

/// Plan the next probe. First matching rule wins; the technical track has a
/// stage-dispatch fallback when no rule fires.
pub fn plan(
    signals: &ExtractedSignals,
    weights: &PenaltyWeights,
    current_stage: u8,
    loss_score: f64,
    category: Category,
) -> ProbeOutcome {
    let ctx = ProbeContext {
        signals,
        weights,
        stage: current_stage.clamp(1, 4),
        loss: loss_score,
        category,
    };

    let rules: &[ProbeRule] = if category.is_behavioral() {
        BEHAVIORAL_RULES
    } else {
        TECHNICAL_RULES
    };

    for rule in rules {
        if (rule.applies)(&ctx) {
            tracing::debug!(rule = rule.name, "Probe rule matched");
            return (rule.build)(&ctx);
        }
    }

    if category.is_behavioral() {
        // Unreachable: the behavioral cascade ends in an unconditional rule.
        outcome(ProbeType::Tradeoff, "Culture Alignment", ctx.stage)
    } else {
        technical_fallback(&ctx)
    }
}

fn outcome(probe_type: ProbeType, target: &str, stage: u8) -> ProbeOutcome {
    ProbeOutcome {
        probe_type,
        target_weakness: target.to_string(),
        stage,
        instruction: instruction_for(probe_type, target, stage),
    }
}

/// Instruction template handed to the external language generator.
fn instruction_for(probe_type: ProbeType, target: &str, stage: u8) -> String {
    match probe_type {
        ProbeType::Reconstruction => format!(
            "Ask the candidate to rebuild their claim about {target} from first \
             principles, without referring to what the team did. Stage {stage} depth."
        ),
        ProbeType::RequirementShift => format!(
            "Change one load-bearing requirement and ask how the approach survives. \
             Target: {target}. Stage {stage} depth."
        ),
        ProbeType::FailureInjection => format!(
            "Introduce a plausible production failure into their current solution and \
             ask them to diagnose it live. Target: {target}. Stage {stage} depth."
        ),
        ProbeType::Inversion => format!(
            "Argue the opposite of the position they just took and make them defend \
             or concede. Target: {target}. Stage {stage} depth."
        ),
        ProbeType::Clarification => format!(
            "Ask for a calm, plain-language restatement of their last answer. \
             Target: {target}. Keep the temperature low."
        ),
        ProbeType::Tradeoff => format!(
            "Present two defensible options and require an explicit choice with \
             reasoning. Target: {target}. Stage {stage} depth."
        ),
    }
}

// ── Behavioral cascade ───────────────────────────────────────────────────────

static BEHAVIORAL_RULES: &[ProbeRule] = &[
    ProbeRule {
        name: "behavioral.hidden_contribution",
        applies: |ctx| {
            ctx.signals.ownership == OwnershipStance::We && ctx.weights.plural_ownership > 0.6
        },
        build: |ctx| outcome(ProbeType::Reconstruction, "Individual Contribution", ctx.stage),
    },
    ProbeRule {
        name: "behavioral.hesitation",
        applies: |ctx| {
            let threshold = (6.0 - ctx.weights.high_hesitation * 5.0).max(2.0);
            ctx.signals.hesitation_signals as f64 > threshold
        },
        build: |ctx| outcome(ProbeType::Clarification, "Communication Confidence", ctx.stage),
    },
    ProbeRule {
        name: "behavioral.culture_default",
        applies: |_| true,
        build: |ctx| outcome(ProbeType::Tradeoff, "Culture Alignment", ctx.stage),
    },
];

// ── Technical cascade ────────────────────────────────────────────────────────

static TECHNICAL_RULES: &[ProbeRule] = &[
    ProbeRule {
        name: "technical.panic_block",
        applies: |ctx| ctx.signals.hesitation_signals > 5 && ctx.loss > 0.5,
        build: |ctx| outcome(ProbeType::Clarification, "Panic/Block", ctx.stage),
    },
    ProbeRule {
        name: "technical.dogma",
        applies: |ctx| ctx.signals.dogmatic_markers > 2,
        build: |_| outcome(ProbeType::Inversion, "Dogmatic Thinking", 4),
    },
    ProbeRule {
        name: "technical.node_internals",
        applies: |ctx| ctx.category.is_node_stack() && ctx.stage >= 3,
        build: |ctx| outcome(ProbeType::FailureInjection, "Node/JS Internals", ctx.stage),
    },
    ProbeRule {
        name: "technical.plural_ownership",
        applies: |ctx| {
            ctx.signals.ownership == OwnershipStance::We
                && ctx.stage >= 2
                && ctx.weights.plural_ownership > 0.5
        },
        build: |ctx| outcome(ProbeType::Reconstruction, "Individual Agency", ctx.stage),
    },
    ProbeRule {
        name: "technical.missing_metrics",
        applies: |ctx| {
            !ctx.signals.used_metrics && ctx.stage >= 2 && ctx.weights.missing_metrics > 0.6
        },
        build: |ctx| outcome(ProbeType::RequirementShift, "Metric-Driven Thinking", ctx.stage),
    },
];

/// Stage-advancing fallback when no technical rule fires.
fn technical_fallback(ctx: &ProbeContext) -> ProbeOutcome {
    let mut stage = ctx.stage;
    // Low loss earns a climb up the difficulty ladder.
    if ctx.loss < 0.3 && stage < 4 {
        stage += 1;
    }

    if ctx.signals.tech_terms.is_empty() && ctx.loss > 0.3 {
        return outcome(ProbeType::Reconstruction, "Shallow Knowledge", stage);
    }

    match stage {
        1 => outcome(ProbeType::Reconstruction, "Fundamentals", 1),
        2 => outcome(ProbeType::RequirementShift, "Scaling Blindness", 2),
        3 => outcome(ProbeType::FailureInjection, "Resilience", 3),
        4 => outcome(ProbeType::Inversion, "Dogmatic Thinking", 4),
        _ => outcome(ProbeType::Tradeoff, "Decision Making", ctx.stage),
    }
}
