//! Adaptive behavioral assessment pipeline for technical interviews.
//!
//! The pipeline turns raw candidate activity — spoken answers, editor
//! telemetry, code snapshots — into a governed hiring verdict. Per turn it
//! runs extract → decide → plan → govern: lexical signal extraction,
//! weighted loss scoring against a company profile, adaptive probe planning,
//! and a fairness pass that caps how harsh the pipeline may be. Alongside
//! the turn loop, a telemetry analyzer folds editor events into rolling
//! behavioral metrics and a pressure engine applies the 200/300/400/SOS
//! intervention ladder. A session state machine ties it together and the
//! verdict engine produces the final archetype plus a cross-session skill
//! profile.
//!
//! All engines are per-session handles; nothing in the crate is process
//! global. Persistence goes through the [`store::SessionStore`] trait and
//! language generation through [`generate::ResponseGenerator`], so both can
//! be swapped without touching the pipeline.

pub mod config;
pub mod decision;
pub mod error;
pub mod fairness;
pub mod generate;
pub mod pressure;
pub mod probe;
pub mod profiles;
pub mod session;
pub mod signals;
pub mod store;
pub mod telemetry;
pub mod timers;
pub mod types;
pub mod verdict;

pub use config::EngineConfig;
pub use decision::{AnalyzeRequest, DecisionEngine, DecisionState};
pub use error::AssessError;
pub use session::{Session, SessionManager, SessionState};
pub use store::{MemoryStore, SessionStore};
pub use telemetry::{BehavioralMetrics, TelemetryAnalyzer, TelemetryEvent};
pub use verdict::{Archetype, SkillProfile, VerdictResult};
