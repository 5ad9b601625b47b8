//! Decision pipeline integration tests — the extract → decide → plan →
//! govern chain across companies, categories, and multi-turn sessions.
//!
//! Tests verify:
//! - The governed loss score never leaves [0,1]
//! - Brutal probes are rationed across consecutive turns
//! - Demonstrated recovery caps the loss at the sanctuary level
//! - Behavioral sessions are never penalized by the weighted checks
//! - The decision trace records every pipeline step

use std::sync::Arc;

use assay_core::decision::{AnalyzeRequest, DecisionEngine};
use assay_core::profiles::ProfileCatalog;
use assay_core::types::{Category, InterviewMode, ProbeType};

fn engine() -> DecisionEngine {
    DecisionEngine::new(Arc::new(ProfileCatalog::builtin()))
}

fn request<'a>(
    input: &'a str,
    company: &'a str,
    stage: u8,
    code_changes: u32,
    category: Category,
) -> AnalyzeRequest<'a> {
    AnalyzeRequest {
        input,
        company_name: company,
        current_stage: stage,
        code_change_count: code_changes,
        session_id: "s-integration",
        category,
        mode: InterviewMode::Standard,
    }
}

// ── Loss range ───────────────────────────────────────────────────────

#[test]
fn governed_loss_stays_in_unit_interval() {
    let inputs = [
        "",
        "we we we our our us the team the team",
        "um uh um uh maybe probably not sure I guess kind of sort of",
        "I cut p99 from 900ms to 120ms, at the cost of memory",
        "obviously best practice, everyone knows, always, never, clearly",
        "we always did 10ms 20ms 30ms 40ms with our team, um, maybe",
    ];
    let companies = ["Nimbus Labs", "Granite Systems", "Northbeam", "Unknown Co"];
    let categories = [Category::Behavioral, Category::Node, Category::Systems];

    for company in companies {
        let mut engine = engine();
        for stage in 1..=4u8 {
            for input in inputs {
                for category in categories {
                    for code_changes in [0, 3] {
                        let state = engine.analyze(request(
                            input,
                            company,
                            stage,
                            code_changes,
                            category,
                        ));
                        assert!(
                            (0.0..=1.0).contains(&state.loss_score),
                            "loss {} out of range for {input:?} @ {company}",
                            state.loss_score
                        );
                        assert!((1..=4).contains(&state.probe.stage));
                    }
                }
            }
        }
    }
}

// ── Brutal probe rationing ───────────────────────────────────────────

#[test]
fn brutal_streak_is_stabilized_by_the_third_turn() {
    let mut engine = engine();
    // Node-stack at stage 3 plans failure injection every turn; the input's
    // missing metrics + plural ownership + missing tradeoff max out raw loss.
    let input = "we built our service together and it worked";

    let mut losses = Vec::new();
    for _ in 0..3 {
        let state = engine.analyze(request(input, "Granite Systems", 3, 1, Category::Node));
        assert_eq!(state.probe.probe_type, ProbeType::FailureInjection);
        assert!(!state.audit.is_safe);
        losses.push(state.loss_score);
    }

    // Turns 1-2 fall under the early-judgment cap; turn 3 under forced
    // stabilization. At no point does the raw 1.0 loss survive.
    assert!(losses.iter().all(|l| *l <= 0.6));
    assert!(losses[2] <= 0.4);

    let history = engine.probe_history();
    assert_eq!(history.len(), 3);
    assert!(history.iter().all(|p| p.is_brutal()));
}

// ── Recovery sanctuary ───────────────────────────────────────────────

#[test]
fn demonstrated_recovery_caps_loss_at_sanctuary_level() {
    let mut engine = engine();
    // Three calm turns first, so the early-judgment rule cannot mask the
    // sanctuary and no brutal probes accumulate.
    for _ in 0..3 {
        let state = engine.analyze(request(
            "I measured 120ms on the cache path after reworking the index",
            "Granite Systems",
            1,
            1,
            Category::Systems,
        ));
        assert!(!state.probe.probe_type.is_brutal());
    }

    // Metrics + tradeoff demonstrated, but plural ownership and an
    // unbacked-metrics contradiction push the raw loss past 0.5.
    let state = engine.analyze(request(
        "we improved p99 from 900ms to 120ms and 40% fewer retries, at the cost of memory",
        "Granite Systems",
        1,
        0,
        Category::Systems,
    ));
    assert!(state.signals.used_metrics);
    assert!(state.signals.tradeoff_detected);
    assert!(!state.audit.is_safe);
    assert!((state.loss_score - 0.3).abs() < 1e-9);
    assert!(state
        .audit
        .adjustment
        .as_deref()
        .is_some_and(|a| a.contains("sanctuary")));
}

// ── Behavioral track ─────────────────────────────────────────────────

#[test]
fn behavioral_sessions_skip_weighted_penalties() {
    let mut engine = engine();
    // Team language, no metrics, no tradeoff — all penalty triggers, none
    // of which may fire on the behavioral track.
    let state = engine.analyze(request(
        "we handled the outage together as a team",
        "Nimbus Labs",
        1,
        1,
        Category::Behavioral,
    ));
    assert_eq!(state.loss_score, 0.0);
    assert!(state.audit.is_safe);

    // Behavioral mode suspends them for technical categories too.
    let mut req = request(
        "we handled the outage together as a team",
        "Nimbus Labs",
        1,
        1,
        Category::Systems,
    );
    req.mode = InterviewMode::Behavioral;
    let state = engine.analyze(req);
    assert_eq!(state.loss_score, 0.0);
}

// ── Trace ────────────────────────────────────────────────────────────

#[test]
fn trace_records_every_pipeline_step() {
    let mut engine = engine();
    let state = engine.analyze(request(
        "we shipped it together",
        "Nimbus Labs",
        2,
        1,
        Category::Systems,
    ));

    let trace = state.verdict_trace.join("\n");
    assert!(trace.contains("raw loss"));
    assert!(trace.contains("probe "));
    assert!(trace.contains("final loss"));

    // The engine-level log accumulates across turns.
    let before = engine.trace_log().len();
    engine.analyze(request("I added an index", "Nimbus Labs", 2, 1, Category::Systems));
    assert!(engine.trace_log().len() > before);
}
