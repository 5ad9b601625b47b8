//! Engine configuration.
//!
//! Tunables are layered: built-in defaults (the calibrated constants), then
//! an optional TOML file, then `ASSAY_*` environment variable overrides.
//! Rule thresholds that define component semantics (fairness caps, probe
//! cascade cutoffs) are deliberately NOT configurable — they live as
//! constants next to the rules they govern.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Rolling-window and dedup tunables for the telemetry analyzer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Rolling metric window in milliseconds.
    pub window_ms: f64,
    /// Events closer together than this are dropped (except init/audio).
    pub dedup_gap_ms: f64,
    /// Number of code snapshots hashed for loop detection.
    pub snapshot_history: usize,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            window_ms: 12_000.0,
            dedup_gap_ms: 40.0,
            snapshot_history: 10,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub telemetry: TelemetryConfig,
    /// EMA smoothing factor for the cross-session skill profile.
    pub ema_alpha: f64,
    /// Extra attempts for durable writes at round/verdict boundaries.
    pub commit_retries: u32,
    /// Default number of rounds in a session.
    pub total_rounds: u32,
    /// Persona name forwarded to the external language generator.
    pub persona: String,
    /// Optional path to a TOML catalog of extra company weight profiles.
    pub profile_catalog: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            telemetry: TelemetryConfig::default(),
            ema_alpha: 0.3,
            commit_retries: 1,
            total_rounds: 3,
            persona: "interviewer".into(),
            profile_catalog: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file, then apply env overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus env overrides (no file).
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Some(v) = env_f64("ASSAY_WINDOW_MS") {
            self.telemetry.window_ms = v;
        }
        if let Some(v) = env_f64("ASSAY_DEDUP_GAP_MS") {
            self.telemetry.dedup_gap_ms = v;
        }
        if let Some(v) = env_f64("ASSAY_EMA_ALPHA") {
            self.ema_alpha = v;
        }
        if let Ok(v) = std::env::var("ASSAY_TOTAL_ROUNDS") {
            if let Ok(n) = v.parse::<u32>() {
                self.total_rounds = n;
            }
        }
        if let Ok(v) = std::env::var("ASSAY_PERSONA") {
            self.persona = v;
        }
    }
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse::<f64>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_calibrated_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.telemetry.window_ms, 12_000.0);
        assert_eq!(config.telemetry.dedup_gap_ms, 40.0);
        assert_eq!(config.telemetry.snapshot_history, 10);
        assert_eq!(config.ema_alpha, 0.3);
        assert_eq!(config.commit_retries, 1);
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assay.toml");
        std::fs::write(
            &path,
            "ema_alpha = 0.5\ntotal_rounds = 5\n\n[telemetry]\nwindow_ms = 8000.0\n",
        )
        .unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.ema_alpha, 0.5);
        assert_eq!(config.total_rounds, 5);
        assert_eq!(config.telemetry.window_ms, 8000.0);
        // Untouched fields keep defaults
        assert_eq!(config.telemetry.dedup_gap_ms, 40.0);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assay.toml");
        std::fs::write(&path, "ema_alpha = [not a float]").unwrap();
        assert!(EngineConfig::load(&path).is_err());
    }
}
