//! Signal Extractor — one candidate text turn in, discrete signals out.
//!
//! Single-pass, stateless, deterministic. All lexicons are compiled once.
//! The extractor never judges; it only quantizes what was said so the
//! Decision Engine can weigh it against the company profile.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Whose work is the candidate describing?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnershipStance {
    /// First-person singular — individual contribution is visible.
    I,
    /// First-person plural — the team did it.
    We,
    /// No clear stance (or a tie).
    Neutral,
}

/// Discrete signals extracted from a single candidate turn.
///
/// Created fresh per turn, consumed immediately, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSignals {
    /// A quantified claim ("38% faster", "120ms p99") was made.
    pub used_metrics: bool,
    /// Confidence in the metrics detection, [0,1].
    pub metrics_confidence: f64,
    pub ownership: OwnershipStance,
    /// Confidence in the ownership call, [0,0.9].
    pub ownership_confidence: f64,
    /// Technical vocabulary actually used.
    pub tech_terms: BTreeSet<String>,
    /// Density of concrete technical content, [0,1].
    pub specificity_score: f64,
    /// The candidate weighed alternatives.
    pub tradeoff_detected: bool,
    /// Count of filler/hedging markers.
    pub hesitation_signals: u32,
    /// Code was actually modified this turn.
    pub has_code_modification: bool,
    /// Count of absolutist buzzword markers.
    pub dogmatic_markers: u32,
}

impl Default for ExtractedSignals {
    fn default() -> Self {
        Self {
            used_metrics: false,
            metrics_confidence: 0.0,
            ownership: OwnershipStance::Neutral,
            ownership_confidence: 0.3,
            tech_terms: BTreeSet::new(),
            specificity_score: 0.0,
            tradeoff_detected: false,
            hesitation_signals: 0,
            has_code_modification: false,
            dogmatic_markers: 0,
        }
    }
}

/// Number + unit, e.g. "38%", "120ms", "4x", "2.5 qps", "10k users".
static METRIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b\d+(?:\.\d+)?\s*(?:%|ms|s\b|sec|seconds|x\b|k\b|qps|rps|tps|gb|mb|kb|users|requests|req|nodes|pods)",
    )
    .expect("metric regex is valid")
});

static SINGULAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(i|me|my|mine|myself)\b").expect("singular regex is valid"));

static PLURAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(we|us|our|ours|ourselves|the team)\b").expect("plural regex is valid")
});

const TECH_TERMS: &[&str] = &[
    "cache",
    "index",
    "queue",
    "shard",
    "replica",
    "latency",
    "throughput",
    "mutex",
    "deadlock",
    "transaction",
    "idempotent",
    "backpressure",
    "partition",
    "consensus",
    "websocket",
    "gc",
    "heap",
    "closure",
    "event loop",
    "race condition",
    "load balancer",
    "circuit breaker",
    "denormalize",
    "b-tree",
    "hashmap",
];

const TRADEOFF_MARKERS: &[&str] = &[
    "trade-off",
    "tradeoff",
    "at the cost of",
    "downside",
    "versus",
    "instead of",
    "on the other hand",
    "sacrificed",
    "the alternative",
];

const HESITATION_MARKERS: &[&str] = &[
    "um",
    "uh",
    "maybe",
    "i think",
    "i guess",
    "probably",
    "not sure",
    "kind of",
    "sort of",
    "hopefully",
];

const DOGMATIC_MARKERS: &[&str] = &[
    "best practice",
    "always",
    "never",
    "obviously",
    "everyone knows",
    "industry standard",
    "of course",
    "clearly",
];

/// Extract signals from one candidate turn.
///
/// `code_change_count` is the number of code edits observed since the last
/// turn; it backs `has_code_modification` and the consistency check.
pub fn extract(input: &str, code_change_count: u32) -> ExtractedSignals {
    if input.trim().is_empty() {
        return ExtractedSignals {
            has_code_modification: code_change_count > 0,
            ..ExtractedSignals::default()
        };
    }

    let lower = input.to_lowercase();
    let word_count = lower.split_whitespace().count().max(1);

    // Metrics: floor 0.3, +0.2 per match, capped at 1.0.
    let metric_hits = METRIC_RE.find_iter(input).count();
    let used_metrics = metric_hits > 0;
    let metrics_confidence = if used_metrics {
        (0.3 + 0.2 * metric_hits as f64).min(1.0)
    } else {
        0.0
    };

    // Ownership: majority of pronoun-class hits, tie → Neutral.
    let singular = SINGULAR_RE.find_iter(input).count();
    let plural = PLURAL_RE.find_iter(input).count();
    let ownership = match singular.cmp(&plural) {
        std::cmp::Ordering::Greater => OwnershipStance::I,
        std::cmp::Ordering::Less => OwnershipStance::We,
        std::cmp::Ordering::Equal => OwnershipStance::Neutral,
    };
    let ownership_confidence = (0.3 + 0.1 * (singular + plural) as f64).min(0.9);

    let tech_terms: BTreeSet<String> = TECH_TERMS
        .iter()
        .filter(|term| lower.contains(*term))
        .map(|term| term.to_string())
        .collect();

    let tradeoff_detected = TRADEOFF_MARKERS.iter().any(|m| lower.contains(m));
    let hesitation_signals = count_markers(&lower, HESITATION_MARKERS);
    let dogmatic_markers = count_markers(&lower, DOGMATIC_MARKERS);

    let metric_bonus = if used_metrics { 10.0 } else { 0.0 };
    let specificity_score =
        ((tech_terms.len() as f64 * 5.0 + metric_bonus) / word_count as f64).min(1.0);

    ExtractedSignals {
        used_metrics,
        metrics_confidence,
        ownership,
        ownership_confidence,
        tech_terms,
        specificity_score,
        tradeoff_detected,
        hesitation_signals,
        has_code_modification: code_change_count > 0,
        dogmatic_markers,
    }
}

/// Cross-check signals for internal contradiction.
///
/// Returns `false` when the turn does not hold together:
/// - metrics claimed with high confidence but no code was touched, or
/// - strong individual ownership alongside heavy hesitation.
pub fn verify_consistency(signals: &ExtractedSignals) -> bool {
    if signals.used_metrics && signals.metrics_confidence > 0.7 && !signals.has_code_modification {
        return false;
    }
    if signals.ownership == OwnershipStance::I && signals.hesitation_signals > 3 {
        return false;
    }
    true
}

fn count_markers(lower: &str, markers: &[&str]) -> u32 {
    markers
        .iter()
        .map(|m| lower.matches(m).count() as u32)
        .sum()
}
