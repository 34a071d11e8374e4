//! Configuration profile catalog and selection.
//!
//! The catalog is built once at startup and shared read-only by every run.
//! Selection is a pure function of the classification signals: exact domain
//! match first, then framework intersection in catalog declaration order,
//! then the configured default.
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Current version of the built-in catalog and of external catalog files.
pub const CATALOG_VERSION: u32 = 1;

pub const GOV_PROFILE: &str = "US_GOV";
pub const COMMERCIAL_PROFILE: &str = "US_COMMERCIAL";

/// Named bundle of domain toggles threaded into pack-aware stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationProfile {
    pub name: String,
    #[serde(default)]
    pub controls: Vec<String>,
    #[serde(default)]
    pub accessibility: Vec<String>,
    #[serde(default)]
    pub privacy: Vec<String>,
    #[serde(default, alias = "scrm")]
    pub scrm_toggles: BTreeMap<String, bool>,
    #[serde(default, alias = "scoring")]
    pub scoring_weights: BTreeMap<String, u32>,
    /// Frameworks whose presence in the signals points at this profile.
    #[serde(default)]
    pub known_frameworks: Vec<String>,
}

/// Output of the classification stage; only the selector reads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationSignals {
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default, alias = "openQuestions")]
    pub open_questions: Vec<String>,
}

/// Why a profile was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionReason {
    Domain,
    Framework(String),
    Default,
}

impl std::fmt::Display for SelectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Domain => write!(f, "domain"),
            Self::Framework(name) => write!(f, "framework {name}"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    version: u32,
    profiles: Vec<ConfigurationProfile>,
}

/// Immutable, ordered set of profiles with a designated default.
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    version: u32,
    profiles: Vec<ConfigurationProfile>,
    default_index: usize,
}

impl ProfileCatalog {
    /// Build a catalog, checking names are unique and the default exists.
    pub fn new(
        version: u32,
        profiles: Vec<ConfigurationProfile>,
        default_name: &str,
    ) -> Result<Self> {
        if profiles.len() < 2 {
            return Err(anyhow!(
                "profile catalog needs at least two profiles (got {})",
                profiles.len()
            ));
        }
        let mut seen = BTreeSet::new();
        for profile in &profiles {
            if profile.name.trim().is_empty() {
                return Err(anyhow!("profile names must be non-empty"));
            }
            if !seen.insert(profile.name.to_ascii_uppercase()) {
                return Err(anyhow!("duplicate profile name {:?}", profile.name));
            }
        }
        let default_index = profiles
            .iter()
            .position(|p| p.name.eq_ignore_ascii_case(default_name.trim()))
            .ok_or_else(|| anyhow!("default profile {default_name:?} is not in the catalog"))?;
        Ok(Self {
            version,
            profiles,
            default_index,
        })
    }

    /// The two US profiles shipped with the binary.
    pub fn builtin(default_name: &str) -> Result<Self> {
        Self::new(CATALOG_VERSION, builtin_profiles(), default_name)
    }

    /// Load an external catalog file (`{"version": 1, "profiles": [...]}`).
    pub fn load(path: &Path, default_name: &str) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("read catalog {}", path.display()))?;
        let file: CatalogFile =
            serde_json::from_slice(&bytes).context("parse profile catalog JSON")?;
        if file.version != CATALOG_VERSION {
            return Err(anyhow!(
                "unsupported profile catalog version {} (expected {})",
                file.version,
                CATALOG_VERSION
            ));
        }
        Self::new(file.version, file.profiles, default_name)
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn profiles(&self) -> &[ConfigurationProfile] {
        &self.profiles
    }

    pub fn default_profile(&self) -> &ConfigurationProfile {
        &self.profiles[self.default_index]
    }

    pub fn get(&self, name: &str) -> Option<&ConfigurationProfile> {
        let name = name.trim();
        self.profiles
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }

    /// Pick exactly one profile for the given signals. Never fails.
    pub fn select(
        &self,
        signals: &ClassificationSignals,
    ) -> (&ConfigurationProfile, SelectionReason) {
        if let Some(profile) = signals.domain.as_deref().and_then(|d| self.get(d)) {
            return (profile, SelectionReason::Domain);
        }
        for profile in &self.profiles {
            let hit = signals.frameworks.iter().find(|signal| {
                profile
                    .known_frameworks
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(signal.trim()))
            });
            if let Some(framework) = hit {
                return (profile, SelectionReason::Framework(framework.trim().to_string()));
            }
        }
        (self.default_profile(), SelectionReason::Default)
    }
}

/// Context block prepended to the instructions of pack-aware stages.
pub fn pack_context(profile: &ConfigurationProfile) -> String {
    let body = serde_json::to_string_pretty(profile).unwrap_or_else(|_| profile.name.clone());
    format!(
        "ACTIVE_POLICY_PACK:\n{body}\nUse the ACTIVE_POLICY_PACK to adapt frameworks, accessibility, \
         SCRM toggles, and scoring posture. Do not mention non-applicable frameworks."
    )
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn builtin_profiles() -> Vec<ConfigurationProfile> {
    vec![
        ConfigurationProfile {
            name: GOV_PROFILE.to_string(),
            controls: strings(&["NIST_800_53", "FedRAMP_optional"]),
            accessibility: strings(&["Section_508", "WCAG_2_2_AA_optional"]),
            privacy: strings(&["Privacy_Act", "CCPA_optional", "GDPR_optional"]),
            scrm_toggles: BTreeMap::from([
                ("sbom".to_string(), true),
                ("section_889".to_string(), true),
                ("kaspersky".to_string(), true),
            ]),
            scoring_weights: BTreeMap::from([
                ("Compliance".to_string(), 30),
                ("Technical".to_string(), 30),
                ("PM".to_string(), 20),
                ("SecurityPrivacy".to_string(), 15),
                ("Clarity".to_string(), 5),
            ]),
            known_frameworks: strings(&["NIST_800_53", "508", "FedRAMP"]),
        },
        ConfigurationProfile {
            name: COMMERCIAL_PROFILE.to_string(),
            controls: strings(&["ISO_27001", "SOC2"]),
            accessibility: strings(&["WCAG_2_2_AA"]),
            privacy: strings(&["CCPA", "GDPR_optional"]),
            scrm_toggles: BTreeMap::from([
                ("sbom".to_string(), true),
                ("section_889".to_string(), false),
                ("kaspersky".to_string(), false),
            ]),
            scoring_weights: BTreeMap::from([
                ("Compliance".to_string(), 25),
                ("Technical".to_string(), 35),
                ("PM".to_string(), 20),
                ("SecurityPrivacy".to_string(), 15),
                ("Clarity".to_string(), 5),
            ]),
            known_frameworks: strings(&["ISO_27001", "SOC2", "WCAG_2_2"]),
        },
    ]
}
