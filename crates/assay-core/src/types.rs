//! Shared vocabulary types for the assessment pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Problem category driving the probe cascade and per-category skill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Behavioral,
    Mern,
    JavaScript,
    Node,
    Systems,
    General,
}

impl Category {
    pub fn is_behavioral(self) -> bool {
        self == Self::Behavioral
    }

    /// Categories where Node/JS-internals failure injection applies.
    pub fn is_node_stack(self) -> bool {
        matches!(self, Self::Mern | Self::JavaScript | Self::Node)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Behavioral => write!(f, "behavioral"),
            Self::Mern => write!(f, "mern"),
            Self::JavaScript => write!(f, "javascript"),
            Self::Node => write!(f, "node"),
            Self::Systems => write!(f, "systems"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Session mode; affects penalty applicability and XP multipliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterviewMode {
    Standard,
    /// Soft-skill session; decision penalties are suspended.
    Behavioral,
    /// Short, hard session; double XP.
    ExpertSprint,
    /// Long-form session; 1.5× XP.
    Marathon,
}

impl InterviewMode {
    pub fn xp_multiplier(self) -> f64 {
        match self {
            Self::ExpertSprint => 2.0,
            Self::Marathon => 1.5,
            Self::Standard | Self::Behavioral => 1.0,
        }
    }
}

/// The six probe strategies the planner can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeType {
    /// Rebuild the claim from first principles.
    Reconstruction,
    /// Change a requirement under the candidate.
    RequirementShift,
    /// Introduce a failure into the working solution.
    FailureInjection,
    /// Argue the opposite of the candidate's position.
    Inversion,
    /// Ask for a plain restatement.
    Clarification,
    /// Force an explicit trade-off decision.
    Tradeoff,
}

impl ProbeType {
    /// Brutal probes are rationed by the Fairness Governor.
    pub fn is_brutal(self) -> bool {
        matches!(self, Self::FailureInjection | Self::Inversion)
    }
}

impl fmt::Display for ProbeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reconstruction => write!(f, "reconstruction"),
            Self::RequirementShift => write!(f, "requirement_shift"),
            Self::FailureInjection => write!(f, "failure_injection"),
            Self::Inversion => write!(f, "inversion"),
            Self::Clarification => write!(f, "clarification"),
            Self::Tradeoff => write!(f, "tradeoff"),
        }
    }
}

/// The planner's output: what to probe, where, and the instruction template
/// handed to the external language generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub probe_type: ProbeType,
    /// The weakness this probe targets, e.g. "Individual Agency".
    pub target_weakness: String,
    /// Difficulty stage 1–4.
    pub stage: u8,
    /// Directive for the prompt builder. The only artifact that crosses the
    /// generation boundary.
    pub instruction: String,
}
