//! Execution domain types.
//!
//! One [`Execution`] row is written per skill invocation. Records start in
//! `running` and make exactly one transition to a terminal status; the
//! conditional completion update makes late or duplicate writes no-ops.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an execution record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    /// True for every status except `running`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("invalid execution status: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Execution record
// ---------------------------------------------------------------------------

/// A row in the executions table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub skill_name: String,
    /// Resolved version, never "latest".
    pub skill_version: String,
    pub tenant_id: String,
    pub status: ExecutionStatus,
    pub input: Option<Value>,
    pub output: Option<Value>,
    pub logs: String,
    pub files_url: String,
    pub files_list: Vec<String>,
    pub duration_ms: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Set iff the status is terminal.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// A fresh record in `running` state for the given request parameters.
    pub fn started(
        skill_name: impl Into<String>,
        skill_version: impl Into<String>,
        tenant_id: impl Into<String>,
        input: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            skill_name: skill_name.into(),
            skill_version: skill_version.into(),
            tenant_id: tenant_id.into(),
            status: ExecutionStatus::Running,
            input,
            output: None,
            logs: String::new(),
            files_url: String::new(),
            files_list: Vec::new(),
            duration_ms: 0,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Run request / result
// ---------------------------------------------------------------------------

/// A skill execution request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunRequest {
    pub skill: String,
    /// Empty or "latest" means resolve the most recently uploaded version.
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub input: Option<Value>,
    /// Extra environment passed into the container, subject to the
    /// blocked-key policy.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(skip)]
    pub tenant_id: String,
}

/// The outcome of a skill execution, mirroring the record's terminal fields.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub execution_id: Uuid,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub files_url: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files_list: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub logs: String,
    pub duration_ms: i64,
    pub error: Option<String>,
}

impl RunResult {
    /// A pre-terminal result shell for the given execution; status starts
    /// at `failed` and is overwritten by classification.
    pub fn pending(execution_id: Uuid) -> Self {
        Self {
            execution_id,
            status: ExecutionStatus::Failed,
            output: None,
            files_url: String::new(),
            files_list: Vec::new(),
            logs: String::new(),
            duration_ms: 0,
            error: None,
        }
    }
}
