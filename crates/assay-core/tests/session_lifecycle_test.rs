//! Session lifecycle integration tests — the SessionManager end to end:
//! transitions, telemetry ingestion, turns, round commits, and finalization
//! against the in-memory store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use assay_core::config::EngineConfig;
use assay_core::error::AssessError;
use assay_core::generate::{EchoGenerator, FailingGenerator, ResponseGenerator, FALLBACK_REPLY};
use assay_core::profiles::ProfileCatalog;
use assay_core::session::{ProblemRef, RoundVerdict, SessionManager, SessionState};
use assay_core::store::{EditorSnapshot, MemoryStore, SessionStore, StoreError};
use assay_core::telemetry::{MetricSnapshot, TelemetryEvent};
use assay_core::timers::TimerRegistry;
use assay_core::types::{Category, InterviewMode};
use assay_core::verdict::{Archetype, SkillProfile};
use assay_core::Session;

fn problems(category: Category) -> Vec<ProblemRef> {
    (1..=3)
        .map(|i| ProblemRef {
            id: format!("p-{i}"),
            category,
            difficulty: 2,
        })
        .collect()
}

fn manager_with(
    store: Arc<dyn SessionStore>,
    generator: Arc<dyn ResponseGenerator>,
    timers: Arc<TimerRegistry>,
    category: Category,
) -> SessionManager {
    SessionManager::new(
        EngineConfig::default(),
        Arc::new(ProfileCatalog::builtin()),
        store,
        generator,
        timers,
        "user-1",
        "Granite Systems",
        InterviewMode::Standard,
        problems(category),
    )
}

fn manager(store: Arc<MemoryStore>) -> SessionManager {
    manager_with(
        store,
        Arc::new(EchoGenerator),
        Arc::new(TimerRegistry::new()),
        Category::Systems,
    )
}

/// Feed a burst of edit activity so the metrics log carries real signal.
fn feed_activity(m: &mut SessionManager) {
    m.ingest_event(TelemetryEvent::init(0.0));
    for i in 1..=10u32 {
        m.ingest_event(TelemetryEvent::edit(i as f64 * 1_000.0, i * 30));
    }
}

// ── Happy path ───────────────────────────────────────────────────────

#[tokio::test]
async fn full_session_reaches_a_verdict() {
    let store = Arc::new(MemoryStore::new());
    let mut m = manager(store.clone());

    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();
    assert_eq!(m.session().current_round, 1);

    feed_activity(&mut m);
    let outcome = m
        .handle_turn("I measured 120ms on the cache path, versus the old index", 11_000.0)
        .await;
    assert!(!outcome.fallback_used);
    // Echo generation: the reply is the probe instruction itself.
    assert_eq!(outcome.reply, outcome.decision.probe.instruction);

    m.complete_round(RoundVerdict::Pass, vec![0.9, 0.85], "strong round")
        .await
        .unwrap();
    m.transition(SessionState::RoundEval).await.unwrap();
    m.transition(SessionState::Verdict).await.unwrap();

    let verdict = m.finalize().await.unwrap();
    assert_eq!(verdict.session_id, m.session().id);
    assert_ne!(verdict.archetype, Archetype::InsufficientSignal);
    assert!((0.0..=1.0).contains(&verdict.score));

    // Durable state survived; the profile was folded.
    let loaded: Session = store
        .load_session(&m.session().id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(loaded.state, SessionState::Verdict);
    assert_eq!(loaded.round_history.len(), 1);

    let profile: SkillProfile = store.load_profile("user-1").await.unwrap().unwrap();
    assert!(profile.xp > 0);
    assert_eq!(profile.streak, 1);
    assert!(profile.category_skill.contains_key("systems"));
}

#[tokio::test]
async fn editor_snapshots_track_transitions() {
    let store = Arc::new(MemoryStore::new());
    let mut m = manager(store.clone());

    let mut ev = TelemetryEvent::edit(500.0, 20);
    ev.code = Some("fn solve() {}".into());
    m.ingest_event(ev);

    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();

    let snapshots: Vec<EditorSnapshot> = store.editor_snapshots_for(&m.session().id).await;
    assert_eq!(snapshots.len(), 2);
    assert_eq!(snapshots[1].state, SessionState::Round1);
    assert_eq!(snapshots[1].code, "fn solve() {}");
}

#[tokio::test]
async fn metric_snapshots_are_persisted_per_event() {
    let store = Arc::new(MemoryStore::new());
    let mut m = manager(store.clone());
    feed_activity(&mut m);

    // Snapshot writes are fire-and-forget; let the spawned tasks run.
    tokio::task::yield_now().await;
    let snapshots: Vec<MetricSnapshot> = store.metric_snapshots_for(&m.session().id).await;
    assert!(!snapshots.is_empty());
}

#[test]
fn ingest_outside_a_runtime_is_panic_free() {
    // No tokio runtime here: the snapshot write is skipped, the metrics
    // still update.
    let mut m = manager(Arc::new(MemoryStore::new()));
    m.ingest_event(TelemetryEvent::init(0.0));
    let outcome = m.ingest_event(TelemetryEvent::edit(1_000.0, 40));
    assert!(outcome.pressure.is_none());
    assert_eq!(outcome.metrics.micro_pauses, 0);
}

// ── Turn side effects ────────────────────────────────────────────────

#[tokio::test]
async fn turn_updates_stage_memory_and_risks() {
    let store = Arc::new(MemoryStore::new());
    let mut m = manager(store.clone());
    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();

    // Dogmatic answer: the planner escalates to a stage-4 inversion and the
    // governed loss stays above the risk threshold.
    let outcome = m
        .handle_turn(
            "obviously best practice, everyone knows you never do it differently",
            5_000.0,
        )
        .await;
    assert_eq!(outcome.decision.probe.stage, 4);
    assert_eq!(m.session().stage, 4);
    assert_eq!(m.session().round_memory.probe_history.len(), 1);
    assert!(!m.session().round_memory.last_summary.is_empty());
    assert!(m
        .session()
        .round_memory
        .active_risks
        .contains(&"Dogmatic Thinking".to_string()));
}

#[tokio::test]
async fn generator_failure_falls_back_to_canned_reply() {
    let mut m = manager_with(
        Arc::new(MemoryStore::new()),
        Arc::new(FailingGenerator),
        Arc::new(TimerRegistry::new()),
        Category::Systems,
    );
    let outcome = m.handle_turn("I added an index to the orders table", 1_000.0).await;
    assert!(outcome.fallback_used);
    assert_eq!(outcome.reply, FALLBACK_REPLY);
    // The decision itself is unaffected by the generation failure.
    assert!((0.0..=1.0).contains(&outcome.decision.loss_score));
}

// ── Verdict edges ────────────────────────────────────────────────────

#[tokio::test]
async fn failed_round_caps_the_final_score() {
    let store = Arc::new(MemoryStore::new());
    let mut m = manager(store);
    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();
    feed_activity(&mut m);
    m.complete_round(RoundVerdict::Pass, vec![0.95], "great")
        .await
        .unwrap();
    m.transition(SessionState::RoundEval).await.unwrap();
    m.transition(SessionState::WaitingForGate).await.unwrap();
    m.transition(SessionState::Round2).await.unwrap();
    m.complete_round(RoundVerdict::Fail, vec![0.2], "collapsed")
        .await
        .unwrap();
    m.transition(SessionState::RoundEval).await.unwrap();
    m.transition(SessionState::Verdict).await.unwrap();

    let verdict = m.finalize().await.unwrap();
    assert!(verdict.hard_failed);
    assert!(verdict.score <= 0.3);
}

#[tokio::test]
async fn no_telemetry_yields_system_uncertain() {
    let store = Arc::new(MemoryStore::new());
    let mut m = manager(store);
    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();
    m.complete_round(RoundVerdict::Pass, vec![0.9], "quiet")
        .await
        .unwrap();
    m.transition(SessionState::RoundEval).await.unwrap();
    m.transition(SessionState::Verdict).await.unwrap();

    let verdict = m.finalize().await.unwrap();
    assert_eq!(verdict.archetype, Archetype::InsufficientSignal);
    assert_eq!(verdict.confidence, 0.0);
}

#[tokio::test]
async fn finalize_honors_the_constructed_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profiles.toml");
    std::fs::write(
        &path,
        "[[profiles]]\nname = \"Helio Works\"\ncontext = \"startup\"\n",
    )
    .unwrap();
    let catalog = Arc::new(ProfileCatalog::with_catalog_file(&path).unwrap());

    let mut m = SessionManager::new(
        EngineConfig::default(),
        catalog.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(EchoGenerator),
        Arc::new(TimerRegistry::new()),
        "user-1",
        "Helio Works",
        InterviewMode::Standard,
        problems(Category::Systems),
    );
    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();
    feed_activity(&mut m);
    m.complete_round(RoundVerdict::Pass, vec![0.8], "steady")
        .await
        .unwrap();
    m.transition(SessionState::RoundEval).await.unwrap();
    m.transition(SessionState::Verdict).await.unwrap();

    // The verdict must be weighted with the file-extended catalog, not a
    // rebuilt builtin one that would drop "Helio Works" to the default
    // context.
    let expected =
        assay_core::verdict::calculate_verdict(m.session(), m.metrics_log(), &catalog);
    let verdict = m.finalize().await.unwrap();
    assert_eq!(verdict.score, expected.score);
    assert_eq!(verdict.archetype, expected.archetype);
}

#[tokio::test]
async fn finalize_outside_verdict_state_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    let mut m = manager(store);
    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();

    let err = m.finalize().await.unwrap_err();
    assert!(matches!(err, AssessError::GuardRejected { .. }));
}

// ── Durable-write behavior ───────────────────────────────────────────

/// Store whose session writes fail a configurable number of times.
struct FlakyStore {
    inner: MemoryStore,
    failures_left: AtomicU32,
}

impl FlakyStore {
    fn failing(times: u32) -> Self {
        Self {
            inner: MemoryStore::new(),
            failures_left: AtomicU32::new(times),
        }
    }
}

#[async_trait]
impl SessionStore for FlakyStore {
    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(StoreError::Unavailable("simulated outage".into()));
        }
        self.inner.save_session(session).await
    }

    async fn load_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.inner.load_session(id).await
    }

    async fn save_editor_snapshot(
        &self,
        session_id: &str,
        snapshot: &EditorSnapshot,
    ) -> Result<(), StoreError> {
        self.inner.save_editor_snapshot(session_id, snapshot).await
    }

    async fn append_metric_snapshot(&self, snapshot: &MetricSnapshot) -> Result<(), StoreError> {
        self.inner.append_metric_snapshot(snapshot).await
    }

    async fn load_profile(&self, user_id: &str) -> Result<Option<SkillProfile>, StoreError> {
        self.inner.load_profile(user_id).await
    }

    async fn save_profile(&self, user_id: &str, profile: &SkillProfile) -> Result<(), StoreError> {
        self.inner.save_profile(user_id, profile).await
    }
}

#[tokio::test]
async fn transient_write_failure_is_retried() {
    // Default config allows one retry: a single failure must be absorbed.
    let store = Arc::new(FlakyStore::failing(1));
    let mut m = manager_with(
        store,
        Arc::new(EchoGenerator),
        Arc::new(TimerRegistry::new()),
        Category::Systems,
    );
    m.transition(SessionState::Intro).await.unwrap();
    m.transition(SessionState::Round1).await.unwrap();
}

#[tokio::test]
async fn persistent_write_failure_surfaces_after_retries() {
    let store = Arc::new(FlakyStore::failing(u32::MAX));
    let mut m = manager_with(
        store,
        Arc::new(EchoGenerator),
        Arc::new(TimerRegistry::new()),
        Category::Systems,
    );
    // Intro is not a durable boundary; the swallowed snapshot failure must
    // not block the transition.
    m.transition(SessionState::Intro).await.unwrap();

    let err = m.transition(SessionState::Round1).await.unwrap_err();
    assert!(matches!(err, AssessError::Store(_)));
    assert!(err.is_retriable());
    // In-memory state remains authoritative.
    assert_eq!(m.session().state, SessionState::Round1);
}

// ── Teardown ─────────────────────────────────────────────────────────

#[tokio::test]
async fn ending_a_session_releases_timers_idempotently() {
    let timers = Arc::new(TimerRegistry::new());
    let mut m = manager_with(
        Arc::new(MemoryStore::new()),
        Arc::new(EchoGenerator),
        timers.clone(),
        Category::Systems,
    );
    let id = m.session().id.clone();
    timers.schedule_repeating(&id, Duration::from_secs(60), || {});
    assert_eq!(timers.active_count(&id), 1);

    m.end();
    assert_eq!(timers.active_count(&id), 0);
    // Ending twice must not panic or error.
    m.end();
}
