//! Verdict Engine — final archetype, confidence, and cross-session profile.
//!
//! Runs once per session, at the VERDICT state. Dimension scores are blends
//! of the session-averaged behavioral metrics; the final score splits evenly
//! between round results and context-weighted dimensions. A failed round
//! hard-caps the score regardless of how strong the telemetry looked.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::profiles::{CompanyContext, ProfileCatalog};
use crate::session::{RoundVerdict, Session};
use crate::telemetry::BehavioralMetrics;
use crate::types::{Category, InterviewMode};

/// Score below which a failed session cannot climb.
const HARD_FAIL_CAP: f64 = 0.3;
/// Average signal density below which no verdict is trusted.
const MIN_SIGNAL_DENSITY: f64 = 0.1;
/// Scorecard mean a passed round must clear to earn a leadership credit.
const CREDIT_THRESHOLD: f64 = 0.75;

/// Final hire archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Archetype {
    StrongHireStrategic,
    StrongHire,
    HireWithConcerns,
    NoHire,
    StrongNoHire,
    /// Too little telemetry to judge at all.
    InsufficientSignal,
}

impl std::fmt::Display for Archetype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StrongHireStrategic => write!(f, "Strong Hire (Strategic)"),
            Self::StrongHire => write!(f, "Strong Hire"),
            Self::HireWithConcerns => write!(f, "Hire with Concerns"),
            Self::NoHire => write!(f, "No Hire"),
            Self::StrongNoHire => write!(f, "Strong No Hire"),
            Self::InsufficientSignal => write!(f, "System Uncertain"),
        }
    }
}

/// The eight assessed dimensions, each in [0,1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub understanding: f64,
    pub strategy: f64,
    pub execution: f64,
    pub resilience: f64,
    pub communication: f64,
    pub ownership: f64,
    pub pressure_stability: f64,
    pub efficiency: f64,
}

impl Dimensions {
    pub fn pairs(&self) -> [(&'static str, f64); 8] {
        [
            ("understanding", self.understanding),
            ("strategy", self.strategy),
            ("execution", self.execution),
            ("resilience", self.resilience),
            ("communication", self.communication),
            ("ownership", self.ownership),
            ("pressure_stability", self.pressure_stability),
            ("efficiency", self.efficiency),
        ]
    }

    fn values(&self) -> [f64; 8] {
        [
            self.understanding,
            self.strategy,
            self.execution,
            self.resilience,
            self.communication,
            self.ownership,
            self.pressure_stability,
            self.efficiency,
        ]
    }
}

/// The verdict handed back when a session finalizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerdictResult {
    pub session_id: String,
    pub archetype: Archetype,
    /// Final score in [0,1].
    pub score: f64,
    /// Trust in the verdict, [0,1]. Zero when signal was insufficient.
    pub confidence: f64,
    /// Half-width of the uncertainty band around the score.
    pub confidence_band: f64,
    pub dimensions: Dimensions,
    /// Pass rounds with a scorecard mean above 0.75.
    pub leadership_credits: u32,
    pub hard_failed: bool,
}

/// Compute the final verdict from the session record and its metrics log.
///
/// `catalog` must be the same catalog the session was assessed against, so
/// file-extended companies keep their context weighting here too.
pub fn calculate_verdict(
    session: &Session,
    metrics_log: &[BehavioralMetrics],
    catalog: &ProfileCatalog,
) -> VerdictResult {
    let m = average_metrics(metrics_log);
    let dimensions = blend_dimensions(&m);

    let context = catalog.resolve(&session.company).context;
    let weighted_dims = weighted_dimension_score(&dimensions, context);

    let round_avg = if session.round_history.is_empty() {
        weighted_dims
    } else {
        session
            .round_history
            .iter()
            .map(|r| r.scorecard_mean())
            .sum::<f64>()
            / session.round_history.len() as f64
    };

    let mut score = (0.5 * round_avg + 0.5 * weighted_dims).clamp(0.0, 1.0);

    let hard_failed = session
        .round_history
        .iter()
        .any(|r| r.verdict == RoundVerdict::Fail);
    if hard_failed {
        score = score.min(HARD_FAIL_CAP);
    }

    let leadership_credits = session
        .round_history
        .iter()
        .filter(|r| r.verdict == RoundVerdict::Pass && r.scorecard_mean() > CREDIT_THRESHOLD)
        .count() as u32;

    let insufficient = m.signal_density < MIN_SIGNAL_DENSITY;
    let confidence = if insufficient {
        0.0
    } else {
        let values = dimensions.values();
        let spread = variance(&values).min(1.0);
        let populated = values.iter().filter(|v| **v > 0.0).count() as f64 / values.len() as f64;
        (m.signal_density * (1.0 - spread) * populated).clamp(0.0, 1.0)
    };
    let confidence_band = (0.3 * (1.0 - confidence)).clamp(0.05, 0.3);

    let archetype = if insufficient {
        Archetype::InsufficientSignal
    } else {
        classify(score, &dimensions)
    };

    info!(
        session = %session.id,
        archetype = %archetype,
        score,
        confidence,
        hard_failed,
        "Verdict computed"
    );

    VerdictResult {
        session_id: session.id.clone(),
        archetype,
        score,
        confidence,
        confidence_band,
        dimensions,
        leadership_credits,
        hard_failed,
    }
}

fn classify(score: f64, d: &Dimensions) -> Archetype {
    if score < 0.4 {
        Archetype::StrongNoHire
    } else if score < 0.6 {
        Archetype::NoHire
    } else if score < 0.75 {
        Archetype::HireWithConcerns
    } else if d.strategy > 0.8 && d.understanding > 0.8 && d.pressure_stability > 0.7 {
        Archetype::StrongHireStrategic
    } else {
        Archetype::StrongHire
    }
}

fn blend_dimensions(m: &BehavioralMetrics) -> Dimensions {
    let d = Dimensions {
        understanding: 0.7 * m.thinking_latency + 0.3 * (1.0 - m.pause_frequency),
        strategy: 0.6 * m.approach_consistency + 0.4 * (1.0 - m.code_churn),
        execution: 0.6 * m.typing_speed + 0.4 * (1.0 - m.rewrite_density),
        resilience: 0.7 * (1.0 - m.code_churn) + 0.3 * (1.0 - m.pause_frequency),
        communication: 0.5 * m.signal_density + 0.5 * m.negotiation_density,
        ownership: 0.6 * m.pushback_score + 0.4 * m.approach_consistency,
        pressure_stability: 0.7 * (1.0 - m.pause_frequency) + 0.3 * (1.0 - m.rewrite_density),
        efficiency: 0.6 * (1.0 - m.response_latency) + 0.4 * m.typing_speed,
    };
    Dimensions {
        understanding: d.understanding.clamp(0.0, 1.0),
        strategy: d.strategy.clamp(0.0, 1.0),
        execution: d.execution.clamp(0.0, 1.0),
        resilience: d.resilience.clamp(0.0, 1.0),
        communication: d.communication.clamp(0.0, 1.0),
        ownership: d.ownership.clamp(0.0, 1.0),
        pressure_stability: d.pressure_stability.clamp(0.0, 1.0),
        efficiency: d.efficiency.clamp(0.0, 1.0),
    }
}

/// Context weights over (understanding, strategy, execution, resilience,
/// communication, ownership, pressure_stability, efficiency). Each row sums
/// to 1.
fn context_weights(context: CompanyContext) -> [f64; 8] {
    match context {
        CompanyContext::Startup => [0.10, 0.10, 0.20, 0.15, 0.05, 0.15, 0.05, 0.20],
        CompanyContext::Enterprise => [0.15, 0.20, 0.05, 0.10, 0.20, 0.05, 0.20, 0.05],
        CompanyContext::ScaleUp => [0.15, 0.20, 0.10, 0.10, 0.10, 0.15, 0.10, 0.10],
        CompanyContext::Default => [0.125; 8],
    }
}

fn weighted_dimension_score(d: &Dimensions, context: CompanyContext) -> f64 {
    let weights = context_weights(context);
    d.values()
        .iter()
        .zip(weights.iter())
        .map(|(v, w)| v * w)
        .sum()
}

fn average_metrics(log: &[BehavioralMetrics]) -> BehavioralMetrics {
    if log.is_empty() {
        return BehavioralMetrics::default();
    }
    let n = log.len() as f64;
    let sum = |f: fn(&BehavioralMetrics) -> f64| log.iter().map(f).sum::<f64>() / n;
    BehavioralMetrics {
        thinking_latency: sum(|m| m.thinking_latency),
        rewrite_density: sum(|m| m.rewrite_density),
        approach_consistency: sum(|m| m.approach_consistency),
        typing_speed: sum(|m| m.typing_speed),
        pause_frequency: sum(|m| m.pause_frequency),
        micro_pauses: log.last().map_or(0, |m| m.micro_pauses),
        short_pauses: log.last().map_or(0, |m| m.short_pauses),
        long_pauses: log.last().map_or(0, |m| m.long_pauses),
        code_churn: sum(|m| m.code_churn),
        response_latency: sum(|m| m.response_latency),
        signal_density: sum(|m| m.signal_density),
        pushback_score: sum(|m| m.pushback_score),
        negotiation_density: sum(|m| m.negotiation_density),
        mece_detected: log.iter().filter(|m| m.mece_detected).count() * 2 > log.len(),
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Cross-session skill profile, folded after every verdict.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillProfile {
    /// EMA per dimension name.
    pub dimensions: BTreeMap<String, f64>,
    /// EMA of session scores per problem category.
    pub category_skill: BTreeMap<String, f64>,
    pub xp: u64,
    /// Consecutive active days.
    pub streak: u32,
    pub last_active: Option<NaiveDate>,
}

impl SkillProfile {
    /// Fold a session verdict into the profile: EMA the dimensions and the
    /// category score, award mode-multiplied XP, and advance the streak.
    ///
    /// Returns the XP awarded.
    pub fn fold_verdict(
        &mut self,
        verdict: &VerdictResult,
        category: Category,
        mode: InterviewMode,
        alpha: f64,
        today: NaiveDate,
    ) -> u64 {
        for (name, value) in verdict.dimensions.pairs() {
            ema_fold(&mut self.dimensions, name, value, alpha);
        }
        ema_fold(
            &mut self.category_skill,
            &category.to_string(),
            verdict.score,
            alpha,
        );

        let awarded = (verdict.score * 100.0 * mode.xp_multiplier()).round() as u64;
        self.xp += awarded;

        self.streak = match self.last_active {
            Some(last) if last == today => self.streak,
            Some(last) if (today - last).num_days() == 1 => self.streak + 1,
            _ => 1,
        };
        self.last_active = Some(today);

        awarded
    }
}

/// First observation seeds the EMA; later observations fold in at `alpha`.
fn ema_fold(map: &mut BTreeMap<String, f64>, key: &str, value: f64, alpha: f64) {
    match map.get_mut(key) {
        Some(current) => *current = alpha * value + (1.0 - alpha) * *current,
        None => {
            map.insert(key.to_string(), value);
        }
    }
}
