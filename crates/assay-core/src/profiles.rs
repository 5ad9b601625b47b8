//! Company weight profiles.
//!
//! Each hiring company configures how heavily the Decision Engine penalizes
//! specific red flags. Lookups are by a normalized-name index built once at
//! catalog construction; an unmatched name silently resolves to the default
//! profile and never errors.

use std::collections::HashMap;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Broad company context, used by the Verdict Engine to weight dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompanyContext {
    Startup,
    Enterprise,
    ScaleUp,
    Default,
}

/// Per-red-flag penalty weights, each in [0,1].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PenaltyWeights {
    /// Claimed impact without any numbers behind it.
    pub missing_metrics: f64,
    /// "We did X" with no individual contribution visible.
    pub plural_ownership: f64,
    /// Decisions presented without alternatives considered.
    pub missing_tradeoff: f64,
    /// Heavy filler/hedging language.
    pub high_hesitation: f64,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            missing_metrics: 0.5,
            plural_ownership: 0.5,
            missing_tradeoff: 0.4,
            high_hesitation: 0.4,
        }
    }
}

/// A company's assessment emphasis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyProfile {
    pub name: String,
    pub context: CompanyContext,
    #[serde(default)]
    pub weights: PenaltyWeights,
}

impl CompanyProfile {
    fn fallback() -> Self {
        Self {
            name: "default".into(),
            context: CompanyContext::Default,
            weights: PenaltyWeights::default(),
        }
    }
}

/// TOML shape for an external profile catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    profiles: Vec<CompanyProfile>,
}

/// Catalog of company profiles with a normalized-name index.
///
/// The index is built once; lookups are O(1) on the normalized name instead
/// of repeated case-insensitive substring scans.
pub struct ProfileCatalog {
    profiles: Vec<CompanyProfile>,
    index: HashMap<String, usize>,
    default_profile: CompanyProfile,
}

impl ProfileCatalog {
    /// Built-in profiles only.
    pub fn builtin() -> Self {
        Self::from_profiles(builtin_profiles())
    }

    /// Built-in profiles extended (and overridden, by name) from a TOML file.
    pub fn with_catalog_file(path: &std::path::Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read profile catalog {}", path.display()))?;
        let file: CatalogFile = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse profile catalog {}", path.display()))?;

        let mut profiles = builtin_profiles();
        profiles.extend(file.profiles);
        Ok(Self::from_profiles(profiles))
    }

    fn from_profiles(profiles: Vec<CompanyProfile>) -> Self {
        let mut index = HashMap::new();
        // Later entries win, so file-provided profiles override built-ins.
        for (i, profile) in profiles.iter().enumerate() {
            index.insert(normalize(&profile.name), i);
        }
        Self {
            profiles,
            index,
            default_profile: CompanyProfile::fallback(),
        }
    }

    /// All profiles reachable through the index, unordered. Entries shadowed
    /// by a later profile of the same normalized name are not reported.
    pub fn profiles(&self) -> impl Iterator<Item = &CompanyProfile> {
        self.index.values().map(|&i| &self.profiles[i])
    }

    /// Resolve a company name. Unmatched names fall back to the default
    /// profile — this path never errors.
    pub fn resolve(&self, name: &str) -> &CompanyProfile {
        match self.index.get(&normalize(name)) {
            Some(&i) => &self.profiles[i],
            None => {
                debug!(company = name, "Unknown company, using default profile");
                &self.default_profile
            }
        }
    }
}

impl Default for ProfileCatalog {
    fn default() -> Self {
        Self::builtin()
    }
}

/// Lowercase and strip everything that is not alphanumeric.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn builtin_profiles() -> Vec<CompanyProfile> {
    vec![
        CompanyProfile {
            name: "Nimbus Labs".into(),
            context: CompanyContext::Startup,
            weights: PenaltyWeights {
                missing_metrics: 0.7,
                plural_ownership: 0.7,
                missing_tradeoff: 0.4,
                high_hesitation: 0.3,
            },
        },
        CompanyProfile {
            name: "Granite Systems".into(),
            context: CompanyContext::Enterprise,
            weights: PenaltyWeights {
                missing_metrics: 0.4,
                plural_ownership: 0.3,
                missing_tradeoff: 0.7,
                high_hesitation: 0.5,
            },
        },
        CompanyProfile {
            name: "Northbeam".into(),
            context: CompanyContext::ScaleUp,
            weights: PenaltyWeights {
                missing_metrics: 0.6,
                plural_ownership: 0.5,
                missing_tradeoff: 0.6,
                high_hesitation: 0.4,
            },
        },
    ]
}
