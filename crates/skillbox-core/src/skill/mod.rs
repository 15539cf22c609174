//! Skill materialization.
//!
//! SKILL.md manifest parsing and validation, plus the loader that turns a
//! stored archive into an extracted, validated on-disk skill ready for
//! sandbox injection. The domain types live in `skillbox_types::skill`.

pub mod loader;
pub mod manifest;

pub use loader::{LoadedSkill, load_skill};
