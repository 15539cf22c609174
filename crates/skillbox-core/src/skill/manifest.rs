//! SKILL.md manifest parsing and validation.
//!
//! Handles the manifest format: YAML front-matter delimited by `---` lines
//! followed by a markdown body containing the skill's instructions.

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use skillbox_types::error::ManifestError;
use skillbox_types::skill::{Language, ResourceHints, SkillSpec};

/// Raw YAML front-matter as it appears in SKILL.md, before validation.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FrontMatter {
    name: String,
    version: String,
    description: String,
    lang: String,
    image: Option<String>,
    timeout: Option<String>,
    resources: ResourceHints,
}

/// Extract the YAML front-matter and markdown body from a SKILL.md file.
///
/// The content must start (after leading whitespace) with a `---` line, and
/// a closing `\n---` boundary separates the YAML from the body.
///
/// Returns `(yaml_str, body_str)` where the body has leading newlines
/// trimmed.
pub fn split_front_matter(content: &str) -> Result<(&str, &str), ManifestError> {
    const DELIMITER: &str = "---";

    let trimmed = content.trim_start();
    let Some(rest) = trimmed.strip_prefix(DELIMITER) else {
        return Err(ManifestError::MissingOpeningDelimiter);
    };

    // Skip the remainder of the opening delimiter line.
    let Some(newline) = rest.find('\n') else {
        return Err(ManifestError::EmptyFrontMatter);
    };
    let rest = &rest[newline + 1..];

    // Look for "\n---" so dashes inside YAML values don't terminate the block.
    let Some(closing) = rest.find("\n---") else {
        return Err(ManifestError::MissingClosingDelimiter);
    };

    let yaml = &rest[..closing];
    let after = &rest[closing + 1 + DELIMITER.len()..];

    let body = match after.find('\n') {
        Some(newline) => &after[newline + 1..],
        None => after,
    };

    Ok((yaml, body.trim_start_matches('\n')))
}

/// Parse and validate a SKILL.md file into a [`SkillSpec`].
///
/// Validation accumulates every violation (missing required fields, bad
/// version, unsupported lang, unparseable timeout) into a single error.
pub fn parse_manifest(content: &str) -> Result<SkillSpec, ManifestError> {
    let (yaml, body) = split_front_matter(content)?;

    let fm: FrontMatter =
        serde_yaml_ng::from_str(yaml).map_err(|e| ManifestError::Yaml(e.to_string()))?;

    let mut violations = Vec::new();

    if fm.name.is_empty() {
        violations.push("name is required".to_string());
    }
    if fm.version.is_empty() {
        violations.push("version is required".to_string());
    } else {
        match semver::Version::parse(&fm.version) {
            Ok(version) if version.build.is_empty() => {}
            _ => violations.push(format!(
                "version {:?} must be semver (MAJOR.MINOR.PATCH)",
                fm.version
            )),
        }
    }
    if fm.description.is_empty() {
        violations.push("description is required".to_string());
    }

    let language = if fm.lang.is_empty() {
        violations.push("lang is required".to_string());
        None
    } else {
        match Language::from_str(&fm.lang) {
            Ok(language) => Some(language),
            Err(reason) => {
                violations.push(reason);
                None
            }
        }
    };

    let timeout = match &fm.timeout {
        Some(raw) if !raw.is_empty() => match humantime::parse_duration(raw) {
            Ok(duration) => Some(duration),
            Err(e) => {
                violations.push(format!("timeout {raw:?}: {e}"));
                None
            }
        },
        _ => None,
    };

    if !violations.is_empty() {
        return Err(ManifestError::Invalid(violations.join("; ")));
    }

    Ok(SkillSpec {
        name: fm.name,
        version: fm.version,
        description: fm.description,
        // Guarded by the violations check above.
        language: language.unwrap_or(Language::Bash),
        image: fm.image.filter(|image| !image.is_empty()),
        timeout: timeout.filter(|t| *t > Duration::ZERO),
        resources: fm.resources,
        instructions: body.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_SKILL_MD: &str = r#"---
name: report-gen
version: 1.2.0
description: Generate a PDF report from JSON input
lang: python
image: python:3.11-slim
timeout: 2m
resources:
  cpu: "0.5"
  memory: 256Mi
---

# Report Generator

Reads the input JSON and writes report.pdf to the files directory.
"#;

    const MINIMAL_SKILL_MD: &str = r#"---
name: echo
version: 1.0.0
description: Echo the input back
lang: bash
---

Echo the input.
"#;

    #[test]
    fn parse_full_manifest() {
        let spec = parse_manifest(FULL_SKILL_MD).unwrap();

        assert_eq!(spec.name, "report-gen");
        assert_eq!(spec.version, "1.2.0");
        assert_eq!(spec.language, Language::Python);
        assert_eq!(spec.image.as_deref(), Some("python:3.11-slim"));
        assert_eq!(spec.timeout, Some(Duration::from_secs(120)));
        assert_eq!(spec.resources.cpu.as_deref(), Some("0.5"));
        assert_eq!(spec.resources.memory.as_deref(), Some("256Mi"));
        assert!(spec.instructions.contains("# Report Generator"));
        assert!(spec.instructions.contains("report.pdf"));
    }

    #[test]
    fn parse_minimal_manifest() {
        let spec = parse_manifest(MINIMAL_SKILL_MD).unwrap();

        assert_eq!(spec.name, "echo");
        assert_eq!(spec.language, Language::Bash);
        assert!(spec.image.is_none());
        assert!(spec.timeout.is_none());
        assert!(spec.resources.cpu.is_none());
        assert_eq!(spec.instructions, "Echo the input.");
        assert_eq!(spec.resolved_image(), "bash:5");
    }

    #[test]
    fn leading_whitespace_before_opening_fence_is_allowed() {
        let content = format!("\n\n{MINIMAL_SKILL_MD}");
        let spec = parse_manifest(&content).unwrap();
        assert_eq!(spec.name, "echo");
    }

    #[test]
    fn reject_missing_front_matter() {
        let err = parse_manifest("# Just markdown\n\nNo fences here.").unwrap_err();
        assert!(matches!(err, ManifestError::MissingOpeningDelimiter));
    }

    #[test]
    fn reject_missing_closing_delimiter() {
        let err = parse_manifest("---\nname: broken\nversion: 1.0.0\n").unwrap_err();
        assert!(matches!(err, ManifestError::MissingClosingDelimiter));
    }

    #[test]
    fn dashes_inside_yaml_values_do_not_close_the_block() {
        let content = "---\nname: has-dashes\nversion: 1.0.0\ndescription: a-b-c\nlang: bash\n---\nbody\n";
        let spec = parse_manifest(content).unwrap();
        assert_eq!(spec.name, "has-dashes");
        assert_eq!(spec.instructions, "body");
    }

    #[test]
    fn validation_accumulates_all_violations() {
        let content = "---\nversion: not-semver\nlang: ruby\n---\nbody\n";
        let err = parse_manifest(content).unwrap_err();
        let message = err.to_string();

        assert!(message.contains("name is required"));
        assert!(message.contains("must be semver"));
        assert!(message.contains("description is required"));
        assert!(message.contains("not supported"));
    }

    #[test]
    fn version_with_prerelease_is_accepted() {
        let content =
            "---\nname: x\nversion: 2.3.1-beta\ndescription: d\nlang: node\n---\nbody\n";
        let spec = parse_manifest(content).unwrap();
        assert_eq!(spec.version, "2.3.1-beta");
    }

    #[test]
    fn version_with_build_metadata_is_rejected() {
        let content =
            "---\nname: x\nversion: 1.0.0+build7\ndescription: d\nlang: node\n---\nbody\n";
        let err = parse_manifest(content).unwrap_err();
        assert!(err.to_string().contains("must be semver"));
    }

    #[test]
    fn bad_timeout_is_reported_with_the_other_violations() {
        let content = "---\nname: x\nversion: 1.0.0\ndescription: d\nlang: bash\ntimeout: soon\n---\nbody\n";
        let err = parse_manifest(content).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn timeout_grammar_accepts_common_forms() {
        for (raw, secs) in [("30s", 30), ("2m", 120), ("1h", 3600)] {
            let content = format!(
                "---\nname: x\nversion: 1.0.0\ndescription: d\nlang: bash\ntimeout: {raw}\n---\nbody\n"
            );
            let spec = parse_manifest(&content).unwrap();
            assert_eq!(spec.timeout, Some(Duration::from_secs(secs)));
        }
    }
}
