//! Language-generation seam.
//!
//! The pipeline never generates natural language itself; it hands a probe
//! instruction to an external generator and only observes success or
//! failure. A failed call is the single business case where the caller sees
//! a fallback response instead of generated text.

use async_trait::async_trait;

use crate::error::AssessError;

/// Canned reply used when the external generator is unavailable.
pub const FALLBACK_REPLY: &str =
    "Let's keep going — walk me through your last change in your own words.";

/// Opaque external text generator.
#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    /// Produce interviewer-voice text for a probe instruction.
    async fn generate(
        &self,
        persona: &str,
        instruction: &str,
        trace: &[String],
        turn: &str,
    ) -> Result<String, AssessError>;
}

/// Generator that returns the instruction itself; used by the replay binary
/// and tests, where real generation is out of scope.
pub struct EchoGenerator;

#[async_trait]
impl ResponseGenerator for EchoGenerator {
    async fn generate(
        &self,
        _persona: &str,
        instruction: &str,
        _trace: &[String],
        _turn: &str,
    ) -> Result<String, AssessError> {
        Ok(instruction.to_string())
    }
}

/// Generator that always fails; exercises the fallback path in tests.
pub struct FailingGenerator;

#[async_trait]
impl ResponseGenerator for FailingGenerator {
    async fn generate(
        &self,
        _persona: &str,
        _instruction: &str,
        _trace: &[String],
        _turn: &str,
    ) -> Result<String, AssessError> {
        Err(AssessError::Generation("generator offline".into()))
    }
}
