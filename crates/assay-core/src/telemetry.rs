//! Telemetry Analyzer — rolling behavioral metrics from edit/audio events.
//!
//! One analyzer per session, single-writer: each event is fully folded into
//! the buffer and the metrics recomputed before the next is accepted.
//! Metrics are returned by value so the Decision and Pressure engines both
//! read a consistent, non-torn snapshot of the same event.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::TelemetryConfig;

/// Gaps shorter than this are typing rhythm, not pauses.
const PAUSE_MIN_MS: f64 = 2_000.0;
/// Micro/short pause boundary.
const PAUSE_SHORT_MS: f64 = 15_000.0;
/// Short/long pause boundary.
const PAUSE_LONG_MS: f64 = 180_000.0;
/// No events for this long counts as silence.
const SILENCE_MS: f64 = 10_000.0;
/// Normalization cap for time-to-first-edit.
const THINKING_CAP_MS: f64 = 300_000.0;
/// Normalization cap for post-probe response latency.
const RESPONSE_CAP_MS: f64 = 60_000.0;
/// Events/minute considered full signal density.
const DENSITY_BASELINE: f64 = 50.0;
/// An edit changing more than this many chars counts as churn.
const CHURN_DELTA: i64 = 50;

/// Kind of inbound telemetry event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session start marker. Never deduplicated.
    Init,
    /// A code edit; carries the resulting buffer length.
    Edit,
    /// Transcribed audio. Never deduplicated.
    AudioChunk,
}

/// A single inbound telemetry event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: EventKind,
    /// Milliseconds on the event source's clock.
    pub at_ms: f64,
    /// Code buffer length after an edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_len: Option<u32>,
    /// Full code snapshot, when the source sends one (loop detection).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Transcript text for audio chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcript: Option<String>,
}

impl TelemetryEvent {
    pub fn init(at_ms: f64) -> Self {
        Self {
            kind: EventKind::Init,
            at_ms,
            code_len: None,
            code: None,
            transcript: None,
        }
    }

    pub fn edit(at_ms: f64, code_len: u32) -> Self {
        Self {
            kind: EventKind::Edit,
            at_ms,
            code_len: Some(code_len),
            code: None,
            transcript: None,
        }
    }

    pub fn audio(at_ms: f64, transcript: impl Into<String>) -> Self {
        Self {
            kind: EventKind::AudioChunk,
            at_ms,
            code_len: None,
            code: None,
            transcript: Some(transcript.into()),
        }
    }
}

/// Rolling behavioral metrics, recomputed on every accepted event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BehavioralMetrics {
    /// Normalized time to the first substantive edit, [0,1].
    pub thinking_latency: f64,
    /// Fraction of consecutive edits that shrank the buffer by >30%.
    pub rewrite_density: f64,
    /// 1 − variance of edit-size deltas (normalized), floor 0.
    pub approach_consistency: f64,
    /// Chars/sec over the window, /10, capped at 1.
    pub typing_speed: f64,
    /// Normalized overall pause pressure, [0,1].
    pub pause_frequency: f64,
    pub micro_pauses: u32,
    pub short_pauses: u32,
    pub long_pauses: u32,
    /// Fraction of edits with |Δsize| > 50 chars.
    pub code_churn: f64,
    /// Normalized time to first activity after the last probe, [0,1].
    pub response_latency: f64,
    /// Events/minute against a 50/min baseline, capped at 1.
    pub signal_density: f64,
    /// Pushback keyword ratio over transcribed speech.
    pub pushback_score: f64,
    /// Negotiation keyword ratio over transcribed speech.
    pub negotiation_density: f64,
    /// Structured (MECE-style) enumeration detected in speech.
    pub mece_detected: bool,
}

impl BehavioralMetrics {
    /// Panic signature: frantic rewriting, churn, or heavy pausing.
    pub fn panic_detected(&self) -> bool {
        self.rewrite_density > 0.5 || self.code_churn > 0.4 || self.pause_frequency > 0.3
    }

    /// Confident-flow signature: consistent, deliberate, clean typing.
    pub fn confidence_detected(&self) -> bool {
        self.approach_consistency > 0.7
            && self.thinking_latency > 0.3
            && self.rewrite_density < 0.2
            && self.typing_speed > 0.3
    }

    /// Distress signature used by the Pressure Engine.
    pub fn distressed(&self) -> bool {
        self.rewrite_density > 0.6 || self.short_pauses > 2
    }
}

/// Live HUD values derived from the current metrics, both on a 0–100 scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HudReadout {
    pub stress: f64,
    pub dna_match: f64,
}

/// Compute the HUD readout for a metrics snapshot.
pub fn hud(m: &BehavioralMetrics) -> HudReadout {
    let mut stress = m.rewrite_density * 40.0 + m.code_churn * 40.0 + m.pause_frequency * 20.0;
    if m.panic_detected() {
        stress += 20.0;
    }
    let mut dna = m.approach_consistency * 60.0 + m.typing_speed * 20.0 + m.thinking_latency * 20.0;
    if m.confidence_detected() {
        dna += 10.0;
    }
    HudReadout {
        stress: stress.clamp(0.0, 100.0),
        dna_match: dna.clamp(0.0, 100.0),
    }
}

/// A flattened per-event metrics snapshot, persisted best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub session_id: String,
    pub at_ms: f64,
    pub metrics: BehavioralMetrics,
}

const PUSHBACK_MARKERS: &[&str] = &[
    "disagree",
    "push back",
    "pushback",
    "i'd challenge",
    "that won't work",
    "i don't think that",
    "actually no",
];

const NEGOTIATION_MARKERS: &[&str] = &[
    "could we",
    "what if",
    "can we scope",
    "let's assume",
    "clarify",
    "constraint",
    "requirement",
    "would it be acceptable",
];

const MECE_MARKERS: &[&str] = &[
    "first",
    "second",
    "third",
    "on one hand",
    "on the other",
    "two categories",
    "mutually exclusive",
    "break this down",
];

/// Per-session rolling analyzer.
pub struct TelemetryAnalyzer {
    config: TelemetryConfig,
    buffer: VecDeque<TelemetryEvent>,
    session_start_ms: Option<f64>,
    last_event_ms: Option<f64>,
    first_edit_ms: Option<f64>,
    last_probe_ms: Option<f64>,
    /// First activity observed after the last probe (response latency basis).
    probe_response_ms: Option<f64>,
    micro_pauses: u32,
    short_pauses: u32,
    long_pauses: u32,
    snapshot_hashes: VecDeque<blake3::Hash>,
    latest: BehavioralMetrics,
}

impl TelemetryAnalyzer {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            buffer: VecDeque::new(),
            session_start_ms: None,
            last_event_ms: None,
            first_edit_ms: None,
            last_probe_ms: None,
            probe_response_ms: None,
            micro_pauses: 0,
            short_pauses: 0,
            long_pauses: 0,
            snapshot_hashes: VecDeque::new(),
            latest: BehavioralMetrics::default(),
        }
    }

    /// Record that a probe was just issued; response latency restarts.
    pub fn mark_probe(&mut self, at_ms: f64) {
        self.last_probe_ms = Some(at_ms);
        self.probe_response_ms = None;
    }

    /// The latest computed metrics, by value (non-torn snapshot).
    pub fn metrics(&self) -> BehavioralMetrics {
        self.latest.clone()
    }

    /// True when no event has arrived for more than 10s before `now_ms`.
    pub fn silent_at(&self, now_ms: f64) -> bool {
        match self.last_event_ms {
            Some(last) => now_ms - last > SILENCE_MS,
            None => false,
        }
    }

    /// Looping signature: fewer than 70% unique hashes among the last
    /// code snapshots. Needs at least 3 snapshots to judge.
    pub fn loop_detected(&self) -> bool {
        if self.snapshot_hashes.len() < 3 {
            return false;
        }
        let mut unique: Vec<&blake3::Hash> = Vec::with_capacity(self.snapshot_hashes.len());
        for h in &self.snapshot_hashes {
            if !unique.contains(&h) {
                unique.push(h);
            }
        }
        (unique.len() as f64) < 0.7 * self.snapshot_hashes.len() as f64
    }

    /// Fold one event into the rolling state and recompute metrics.
    ///
    /// Returns the fresh metrics snapshot. Events arriving closer than the
    /// dedup gap to their predecessor are dropped (init and audio excepted)
    /// and the previous snapshot is returned unchanged.
    pub fn ingest(&mut self, event: TelemetryEvent) -> BehavioralMetrics {
        if let Some(last) = self.last_event_ms {
            let dedupable = !matches!(event.kind, EventKind::Init | EventKind::AudioChunk);
            if dedupable && event.at_ms - last < self.config.dedup_gap_ms {
                return self.latest.clone();
            }

            let gap = event.at_ms - last;
            if gap >= PAUSE_MIN_MS {
                if gap < PAUSE_SHORT_MS {
                    self.micro_pauses += 1;
                } else if gap <= PAUSE_LONG_MS {
                    self.short_pauses += 1;
                } else {
                    self.long_pauses += 1;
                }
            }
        }

        self.session_start_ms.get_or_insert(event.at_ms);
        self.last_event_ms = Some(event.at_ms);

        if event.kind == EventKind::Edit {
            if self.first_edit_ms.is_none() && event.code_len.unwrap_or(0) > 5 {
                self.first_edit_ms = Some(event.at_ms);
            }
            if let Some(code) = &event.code {
                self.snapshot_hashes.push_back(blake3::hash(code.as_bytes()));
                while self.snapshot_hashes.len() > self.config.snapshot_history {
                    self.snapshot_hashes.pop_front();
                }
            }
        }

        if let Some(probe_at) = self.last_probe_ms {
            if self.probe_response_ms.is_none() && event.at_ms > probe_at {
                self.probe_response_ms = Some(event.at_ms);
            }
        }

        self.buffer.push_back(event);
        let horizon = self.last_event_ms.unwrap_or(0.0) - self.config.window_ms;
        while self.buffer.front().is_some_and(|e| e.at_ms < horizon) {
            self.buffer.pop_front();
        }

        self.latest = self.recompute();
        self.latest.clone()
    }

    fn recompute(&self) -> BehavioralMetrics {
        let now = self.last_event_ms.unwrap_or(0.0);
        let start = self.session_start_ms.unwrap_or(now);

        let thinking_basis = self.first_edit_ms.unwrap_or(now);
        let thinking_latency = ((thinking_basis - start) / THINKING_CAP_MS).clamp(0.0, 1.0);

        let response_latency = match (self.last_probe_ms, self.probe_response_ms) {
            (Some(probe), Some(response)) => {
                ((response - probe) / RESPONSE_CAP_MS).clamp(0.0, 1.0)
            }
            _ => 0.0,
        };

        // Edit-size sequence within the window.
        let sizes: Vec<(f64, i64)> = self
            .buffer
            .iter()
            .filter(|e| e.kind == EventKind::Edit)
            .filter_map(|e| e.code_len.map(|len| (e.at_ms, len as i64)))
            .collect();

        let mut shrinks = 0usize;
        let mut churn_edits = 0usize;
        let mut chars_added = 0i64;
        let mut deltas: Vec<f64> = Vec::new();
        for pair in sizes.windows(2) {
            let (_, prev) = pair[0];
            let (_, next) = pair[1];
            let delta = next - prev;
            deltas.push(delta as f64);
            if prev > 0 && (next as f64) < prev as f64 * 0.7 {
                shrinks += 1;
            }
            if delta.abs() > CHURN_DELTA {
                churn_edits += 1;
            }
            if delta > 0 {
                chars_added += delta;
            }
        }
        let pairs = deltas.len().max(1);
        let rewrite_density = shrinks as f64 / pairs as f64;
        let code_churn = churn_edits as f64 / pairs as f64;

        let approach_consistency = (1.0 - variance(&deltas) / 1000.0).max(0.0);

        let span_secs = match (self.buffer.front(), self.buffer.back()) {
            (Some(first), Some(last)) if last.at_ms > first.at_ms => {
                (last.at_ms - first.at_ms) / 1000.0
            }
            _ => 1.0,
        };
        let typing_speed = ((chars_added as f64 / span_secs) / 10.0).clamp(0.0, 1.0);

        let observed_ms = (now - start).min(self.config.window_ms).max(1_000.0);
        let events_per_min = self.buffer.len() as f64 / (observed_ms / 60_000.0);
        let signal_density = (events_per_min / DENSITY_BASELINE).clamp(0.0, 1.0);

        let total_pauses = self.micro_pauses + self.short_pauses * 2 + self.long_pauses * 3;
        let pause_frequency = (total_pauses as f64 / 10.0).clamp(0.0, 1.0);

        let speech: String = self
            .buffer
            .iter()
            .filter_map(|e| e.transcript.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();
        let speech_words = speech.split_whitespace().count();
        let pushback_score = keyword_ratio(&speech, speech_words, PUSHBACK_MARKERS);
        let negotiation_density = keyword_ratio(&speech, speech_words, NEGOTIATION_MARKERS);
        let mece_detected = MECE_MARKERS
            .iter()
            .filter(|m| speech.contains(*m))
            .count()
            >= 2;

        BehavioralMetrics {
            thinking_latency,
            rewrite_density,
            approach_consistency,
            typing_speed,
            pause_frequency,
            micro_pauses: self.micro_pauses,
            short_pauses: self.short_pauses,
            long_pauses: self.long_pauses,
            code_churn,
            response_latency,
            signal_density,
            pushback_score,
            negotiation_density,
            mece_detected,
        }
    }
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Keyword hits over word count, scaled so a hit every ten words saturates.
fn keyword_ratio(speech: &str, words: usize, markers: &[&str]) -> f64 {
    if words == 0 {
        return 0.0;
    }
    let hits: usize = markers.iter().map(|m| speech.matches(m).count()).sum();
    (hits as f64 * 10.0 / words as f64).clamp(0.0, 1.0)
}
