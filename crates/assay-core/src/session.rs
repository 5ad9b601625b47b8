//! Session State Machine — dual-track round/phase progression.
//!
//! ~21 states in a target-keyed transition table: a transition to state S
//! succeeds iff the table has an entry for S, the current state is in the
//! entry's source set (an empty source set means "initial assignment only"),
//! and the entry's guard holds. Two coupled tracks converge at VERDICT: the
//! round track (INTRO → ROUND_1 → ROUND_EVAL → WAITING_FOR_GATE → ROUND_2 →
//! … → VERDICT) and the phase track (THEORY → PRACTICAL → REVIEW, or
//! REQUIREMENT → APPROACH → CODING → … → ANALYSIS → VERDICT). The terminal
//! chain is VERDICT → TRAINING → ARCHIVED.
//!
//! The `level` ladder (200/300/400/SOS/OUT) is a second, separately-set
//! value and is deliberately not validated against this table.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::decision::{AnalyzeRequest, DecisionEngine, DecisionState};
use crate::error::AssessError;
use crate::generate::{ResponseGenerator, FALLBACK_REPLY};
use crate::pressure::{PressureAction, PressureEngine, PressureLevel};
use crate::profiles::ProfileCatalog;
use crate::store::{EditorSnapshot, SessionStore};
use crate::telemetry::{hud, BehavioralMetrics, EventKind, HudReadout, MetricSnapshot, TelemetryAnalyzer, TelemetryEvent};
use crate::timers::TimerRegistry;
use crate::types::{Category, InterviewMode, ProbeType};
use crate::verdict::{self, VerdictResult};

/// All session states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Init,
    Intro,
    Round1,
    RoundEval,
    WaitingForGate,
    Round2,
    Round3,
    Theory,
    Practical,
    Review,
    Requirement,
    Approach,
    Coding,
    Debugging,
    Testing,
    Optimization,
    Analysis,
    Verdict,
    Training,
    Archived,
    Paused,
    Aborted,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Archived | Self::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "INIT",
            Self::Intro => "INTRO",
            Self::Round1 => "ROUND_1",
            Self::RoundEval => "ROUND_EVAL",
            Self::WaitingForGate => "WAITING_FOR_GATE",
            Self::Round2 => "ROUND_2",
            Self::Round3 => "ROUND_3",
            Self::Theory => "THEORY",
            Self::Practical => "PRACTICAL",
            Self::Review => "REVIEW",
            Self::Requirement => "REQUIREMENT",
            Self::Approach => "APPROACH",
            Self::Coding => "CODING",
            Self::Debugging => "DEBUGGING",
            Self::Testing => "TESTING",
            Self::Optimization => "OPTIMIZATION",
            Self::Analysis => "ANALYSIS",
            Self::Verdict => "VERDICT",
            Self::Training => "TRAINING",
            Self::Archived => "ARCHIVED",
            Self::Paused => "PAUSED",
            Self::Aborted => "ABORTED",
        };
        write!(f, "{name}")
    }
}

/// Session pressure level; set independently of the state table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionLevel {
    L200,
    L300,
    L400,
    Sos,
    Out,
}

impl From<PressureLevel> for SessionLevel {
    fn from(level: PressureLevel) -> Self {
        match level {
            PressureLevel::L200 => Self::L200,
            PressureLevel::L300 => Self::L300,
            PressureLevel::L400 => Self::L400,
            PressureLevel::Sos => Self::Sos,
        }
    }
}

/// Outcome of a completed round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundVerdict {
    Pass,
    Fail,
    Borderline,
}

/// Record of one completed round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundRecord {
    pub round: u32,
    pub verdict: RoundVerdict,
    /// Per-criterion scores, each in [0,1].
    pub scorecard: Vec<f64>,
    pub summary: String,
}

impl RoundRecord {
    pub fn scorecard_mean(&self) -> f64 {
        if self.scorecard.is_empty() {
            return 0.0;
        }
        self.scorecard.iter().sum::<f64>() / self.scorecard.len() as f64
    }
}

/// Working memory scoped to the current round.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoundMemory {
    pub last_summary: String,
    pub active_risks: Vec<String>,
    pub probe_history: Vec<ProbeType>,
}

/// Reference into the external problem catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemRef {
    pub id: String,
    pub category: Category,
    pub difficulty: u8,
}

/// The session document. Persisted as a whole; in-memory state is
/// authoritative until a durable commit succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub company: String,
    pub mode: InterviewMode,
    pub state: SessionState,
    pub level: SessionLevel,
    /// Current probe difficulty stage, 1–4.
    pub stage: u8,
    pub current_round: u32,
    pub total_rounds: u32,
    pub problem_queue: Vec<ProblemRef>,
    pub round_history: Vec<RoundRecord>,
    pub round_memory: RoundMemory,
    pub started_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: &str, company: &str, mode: InterviewMode, total_rounds: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            company: company.to_string(),
            mode,
            state: SessionState::Init,
            level: SessionLevel::L200,
            stage: 1,
            current_round: 0,
            total_rounds,
            problem_queue: Vec::new(),
            round_history: Vec::new(),
            round_memory: RoundMemory::default(),
            started_at: Utc::now(),
        }
    }

    /// The problem the current round draws from.
    pub fn current_problem(&self) -> Option<&ProblemRef> {
        let index = self.current_round.saturating_sub(1) as usize;
        self.problem_queue.get(index)
    }

    /// Attempt a transition along the declared edges.
    ///
    /// On rejection the state is unchanged and a typed error names the
    /// offending edge.
    pub fn transition(&mut self, to: SessionState) -> Result<(), AssessError> {
        // Any non-terminal state may abort.
        if to == SessionState::Aborted {
            if self.state.is_terminal() {
                return Err(AssessError::IllegalTransition {
                    from: self.state,
                    to,
                });
            }
            self.apply(to);
            return Ok(());
        }

        let rule = transition_rule(to).ok_or(AssessError::IllegalTransition {
            from: self.state,
            to,
        })?;

        if !rule.sources.contains(&self.state) {
            return Err(AssessError::IllegalTransition {
                from: self.state,
                to,
            });
        }
        if let Some(guard) = rule.guard {
            guard(self).map_err(|reason| AssessError::GuardRejected {
                from: self.state,
                to,
                reason: reason.to_string(),
            })?;
        }

        self.apply(to);
        Ok(())
    }

    fn apply(&mut self, to: SessionState) {
        debug!(session = %self.id, from = %self.state, to = %to, "State transition");
        match to {
            SessionState::Round1 => self.enter_round(1),
            SessionState::Round2 => self.enter_round(2),
            SessionState::Round3 => self.enter_round(3),
            _ => {}
        }
        self.state = to;
    }

    fn enter_round(&mut self, round: u32) {
        self.current_round = round;
        // Round-scoped memory resets; risks carry across rounds.
        self.round_memory.last_summary.clear();
        self.round_memory.probe_history.clear();
    }

    /// Set the pressure level. Intentionally unvalidated.
    pub fn set_level(&mut self, level: SessionLevel) {
        self.level = level;
    }
}

struct TransitionRule {
    sources: &'static [SessionState],
    guard: Option<fn(&Session) -> Result<(), &'static str>>,
}

/// The target-keyed transition table.
fn transition_rule(to: SessionState) -> Option<TransitionRule> {
    use SessionState::*;

    let rule = |sources, guard| Some(TransitionRule { sources, guard });

    match to {
        // Initial assignment only.
        Init => rule(&[][..], None),
        Intro => rule(&[Init][..], None),
        Round1 => rule(&[Intro, Paused][..], None),
        RoundEval => rule(&[Round1, Round2, Round3, Review, Analysis][..], None),
        WaitingForGate => rule(&[RoundEval][..], None),
        Round2 => rule(
            &[WaitingForGate, Paused][..],
            Some(|s| {
                if s.current_round < 2 && s.total_rounds >= 2 {
                    Ok(())
                } else {
                    Err("round 2 not available")
                }
            }),
        ),
        Round3 => rule(
            &[WaitingForGate, Paused][..],
            Some(|s| {
                if s.current_round < 3 && s.total_rounds >= 3 {
                    Ok(())
                } else {
                    Err("round 3 not available")
                }
            }),
        ),
        Theory => rule(&[Round1, Round2, Round3][..], None),
        Practical => rule(&[Theory][..], None),
        Review => rule(&[Practical][..], None),
        Requirement => rule(&[Round1, Round2, Round3][..], None),
        Approach => rule(&[Requirement][..], None),
        Coding => rule(&[Approach, Paused][..], None),
        Debugging => rule(&[Coding][..], None),
        Testing => rule(&[Coding, Debugging][..], None),
        Optimization => rule(&[Coding, Debugging, Testing][..], None),
        Analysis => rule(&[Coding, Debugging, Testing, Optimization][..], None),
        Verdict => rule(&[RoundEval, WaitingForGate, Review, Analysis][..], None),
        Training => rule(&[Verdict][..], None),
        Archived => rule(&[Verdict, Training][..], None),
        Paused => rule(
            &[
                Round1, Round2, Round3, Theory, Practical, Requirement, Approach, Coding,
                Debugging, Testing, Optimization,
            ][..],
            None,
        ),
        // Aborted is special-cased in `transition`.
        Aborted => None,
    }
}

/// Result of one candidate turn through the decision pipeline.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub decision: DecisionState,
    /// Interviewer-voice reply (generated or fallback).
    pub reply: String,
    pub fallback_used: bool,
}

/// Result of folding one telemetry event.
#[derive(Debug, Clone)]
pub struct EventOutcome {
    pub metrics: BehavioralMetrics,
    pub pressure: Option<PressureAction>,
    pub hud: HudReadout,
}

/// Per-session orchestrator. Single-writer: all mutation goes through
/// `&mut self`, so one session's rolling state is never interleaved.
pub struct SessionManager {
    config: EngineConfig,
    session: Session,
    catalog: Arc<ProfileCatalog>,
    analyzer: TelemetryAnalyzer,
    decision: DecisionEngine,
    pressure: PressureEngine,
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn ResponseGenerator>,
    timers: Arc<TimerRegistry>,
    /// Metrics snapshots accumulated for the verdict.
    metrics_log: Vec<BehavioralMetrics>,
    code: String,
    cursor: u32,
    code_changes_since_turn: u32,
    ended: bool,
}

impl SessionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        catalog: Arc<ProfileCatalog>,
        store: Arc<dyn SessionStore>,
        generator: Arc<dyn ResponseGenerator>,
        timers: Arc<TimerRegistry>,
        user_id: &str,
        company: &str,
        mode: InterviewMode,
        problems: Vec<ProblemRef>,
    ) -> Self {
        let mut session = Session::new(user_id, company, mode, config.total_rounds);
        session.problem_queue = problems;
        let analyzer = TelemetryAnalyzer::new(config.telemetry.clone());
        let decision = DecisionEngine::new(Arc::clone(&catalog));
        Self {
            config,
            session,
            catalog,
            analyzer,
            decision,
            pressure: PressureEngine::new(),
            store,
            generator,
            timers,
            metrics_log: Vec::new(),
            code: String::new(),
            cursor: 0,
            code_changes_since_turn: 0,
            ended: false,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn metrics_log(&self) -> &[BehavioralMetrics] {
        &self.metrics_log
    }

    /// Transition the session and persist.
    ///
    /// Round and verdict boundaries await a durable session write (retried
    /// per config, then surfaced). The editor snapshot written on every
    /// successful transition is best-effort.
    pub async fn transition(&mut self, to: SessionState) -> Result<(), AssessError> {
        self.session.transition(to)?;

        let snapshot = EditorSnapshot {
            code: self.code.clone(),
            cursor: self.cursor,
            state: self.session.state,
        };
        if let Err(e) = self
            .store
            .save_editor_snapshot(&self.session.id, &snapshot)
            .await
        {
            warn!(session = %self.session.id, error = %e, "Editor snapshot write failed");
        }

        if matches!(
            to,
            SessionState::Round1
                | SessionState::Round2
                | SessionState::Round3
                | SessionState::Verdict
                | SessionState::Archived
        ) {
            self.commit_session().await?;
        }
        Ok(())
    }

    /// Fold one telemetry event: buffer update, metric recompute, best-effort
    /// snapshot persistence, and an independent pressure evaluation on the
    /// same (by-value) metrics snapshot.
    pub fn ingest_event(&mut self, event: TelemetryEvent) -> EventOutcome {
        if event.kind == EventKind::Edit {
            self.code_changes_since_turn += 1;
            if let Some(code) = &event.code {
                self.code = code.clone();
                self.cursor = code.len() as u32;
            }
        }

        let at_ms = event.at_ms;
        let metrics = self.analyzer.ingest(event);
        self.metrics_log.push(metrics.clone());

        // Fire-and-forget persistence; decision quality never depends on it.
        let store = Arc::clone(&self.store);
        let snapshot = MetricSnapshot {
            session_id: self.session.id.clone(),
            at_ms,
            metrics: metrics.clone(),
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.append_metric_snapshot(&snapshot).await {
                        warn!(session = %snapshot.session_id, error = %e, "Metric snapshot write failed");
                    }
                });
            }
            Err(_) => {
                warn!(session = %snapshot.session_id, "No async runtime, metric snapshot skipped");
            }
        }

        let silent = self.analyzer.silent_at(at_ms);
        let looping = self.analyzer.loop_detected();
        let pressure = self.pressure.evaluate(&metrics, silent, looping);
        if let Some(action) = &pressure {
            self.session.set_level(action.level.into());
        }

        EventOutcome {
            hud: hud(&metrics),
            metrics,
            pressure,
        }
    }

    /// Run one candidate turn through extract → decide → plan → govern, then
    /// hand the probe instruction to the external generator.
    pub async fn handle_turn(&mut self, text: &str, at_ms: f64) -> TurnOutcome {
        let category = self
            .session
            .current_problem()
            .map(|p| p.category)
            .unwrap_or(Category::General);

        let decision = self.decision.analyze(AnalyzeRequest {
            input: text,
            company_name: &self.session.company,
            current_stage: self.session.stage,
            code_change_count: self.code_changes_since_turn,
            session_id: &self.session.id,
            category,
            mode: self.session.mode,
        });

        self.session.stage = decision.probe.stage.clamp(1, 4);
        self.session
            .round_memory
            .probe_history
            .push(decision.probe.probe_type);
        self.session.round_memory.last_summary = summarize(text);
        if decision.loss_score > 0.5
            && !self
                .session
                .round_memory
                .active_risks
                .contains(&decision.probe.target_weakness)
        {
            self.session
                .round_memory
                .active_risks
                .push(decision.probe.target_weakness.clone());
        }

        self.analyzer.mark_probe(at_ms);
        self.code_changes_since_turn = 0;

        let (reply, fallback_used) = match self
            .generator
            .generate(
                &self.config.persona,
                &decision.probe.instruction,
                &decision.verdict_trace,
                text,
            )
            .await
        {
            Ok(text) => (text, false),
            Err(e) => {
                warn!(session = %self.session.id, error = %e, "Generator failed, using fallback");
                (FALLBACK_REPLY.to_string(), true)
            }
        };

        TurnOutcome {
            decision,
            reply,
            fallback_used,
        }
    }

    /// Record a completed round and durably commit the session.
    pub async fn complete_round(
        &mut self,
        verdict: RoundVerdict,
        scorecard: Vec<f64>,
        summary: &str,
    ) -> Result<(), AssessError> {
        self.session.round_history.push(RoundRecord {
            round: self.session.current_round,
            verdict,
            scorecard,
            summary: summary.to_string(),
        });
        self.commit_session().await
    }

    /// Compute the final verdict, fold it into the cross-session profile,
    /// durably commit, and release the session's timers.
    pub async fn finalize(&mut self) -> Result<VerdictResult, AssessError> {
        if self.session.state != SessionState::Verdict {
            return Err(AssessError::GuardRejected {
                from: self.session.state,
                to: SessionState::Verdict,
                reason: "finalize requires the VERDICT state".into(),
            });
        }

        let result = verdict::calculate_verdict(&self.session, &self.metrics_log, &self.catalog);

        let category = self
            .session
            .current_problem()
            .map(|p| p.category)
            .unwrap_or(Category::General);
        let mut profile = self
            .store
            .load_profile(&self.session.user_id)
            .await?
            .unwrap_or_default();
        profile.fold_verdict(
            &result,
            category,
            self.session.mode,
            self.config.ema_alpha,
            Utc::now().date_naive(),
        );
        self.store
            .save_profile(&self.session.user_id, &profile)
            .await?;

        self.commit_session().await?;
        self.end();
        Ok(result)
    }

    /// Release timers. Idempotent: double-ending a session must not error.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.timers.cancel(&self.session.id);
        self.ended = true;
    }

    async fn commit_session(&self) -> Result<(), AssessError> {
        let attempts = self.config.commit_retries + 1;
        let mut last_err = None;
        for attempt in 1..=attempts {
            match self.store.save_session(&self.session).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(
                        session = %self.session.id,
                        attempt,
                        error = %e,
                        "Durable session write failed"
                    );
                    last_err = Some(e);
                }
            }
        }
        Err(AssessError::Store(last_err.unwrap_or_else(|| {
            crate::store::StoreError::Unavailable("no attempts made".into())
        })))
    }
}

fn summarize(text: &str) -> String {
    const LIMIT: usize = 120;
    if text.len() <= LIMIT {
        text.to_string()
    } else {
        let cut = text
            .char_indices()
            .take_while(|(i, _)| *i < LIMIT)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        format!("{}…", &text[..cut])
    }
}
