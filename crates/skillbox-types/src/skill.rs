//! Skill domain types.
//!
//! A skill is a zip archive identified by `(tenant, name, version)` that
//! contains a `SKILL.md` manifest and a script tree. The manifest's YAML
//! front-matter is parsed into a [`SkillSpec`]; the markdown body below it
//! becomes the skill's instructions.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the manifest file expected at the archive root.
pub const MANIFEST_FILE: &str = "SKILL.md";

// ---------------------------------------------------------------------------
// Language
// ---------------------------------------------------------------------------

/// Supported script language runtimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Node,
    Bash,
}

impl Language {
    /// The canonical container image for this language when the manifest
    /// does not pin a custom one.
    pub fn default_image(self) -> &'static str {
        match self {
            Self::Python => "python:3.12-slim",
            Self::Node => "node:20-slim",
            Self::Bash => "bash:5",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Python => write!(f, "python"),
            Self::Node => write!(f, "node"),
            Self::Bash => write!(f, "bash"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "python" => Ok(Self::Python),
            "node" => Ok(Self::Node),
            "bash" => Ok(Self::Bash),
            other => Err(format!(
                "lang {other:?} is not supported (use python, node, or bash)"
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest types
// ---------------------------------------------------------------------------

/// CPU and memory hints from the manifest's `resources` block.
///
/// Both values are kept as strings until the runner shapes them: `cpu` is
/// a fractional core count ("0.5"), `memory` a Kubernetes-style quantity
/// ("256Mi").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceHints {
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

/// The fully parsed and validated representation of a SKILL.md manifest.
#[derive(Debug, Clone)]
pub struct SkillSpec {
    pub name: String,
    /// Resolved semantic version (MAJOR.MINOR.PATCH with optional pre-release).
    pub version: String,
    pub description: String,
    pub language: Language,
    /// Custom container image; `None` means use the language default.
    pub image: Option<String>,
    /// Per-skill execution timeout; `None` means use the server default.
    pub timeout: Option<Duration>,
    pub resources: ResourceHints,
    /// Free-form markdown body below the front-matter.
    pub instructions: String,
}

impl SkillSpec {
    /// The container image this skill runs in: the manifest's custom image
    /// if set, otherwise the language default.
    pub fn resolved_image(&self) -> String {
        match &self.image {
            Some(image) if !image.is_empty() => image.clone(),
            _ => self.language.default_image().to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Stored skill metadata
// ---------------------------------------------------------------------------

/// Summary of a skill version derived from the object-store listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillMeta {
    pub name: String,
    pub version: String,
    pub uploaded_at: DateTime<Utc>,
}

/// A row in the skills metadata table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    pub tenant_id: String,
    pub name: String,
    pub version: String,
    pub description: String,
    pub lang: Language,
    pub uploaded_at: DateTime<Utc>,
}
