//! Shared domain types for the Skillbox execution core.
//!
//! This crate contains the types used across the platform: skill manifests,
//! execution records, run requests/results, configuration, and the error
//! taxonomy. Zero infrastructure dependencies -- only serde, serde_json,
//! uuid, chrono, semver, thiserror.

pub mod config;
pub mod error;
pub mod execution;
pub mod skill;
