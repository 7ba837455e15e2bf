//! Rule status snapshots and their display projection
//!
//! Snapshots come from the rule runtime and are never mutated locally.
//! Arming or acknowledging a rule is a command to the runtime; the view
//! only changes when the next snapshot arrives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Status of one rule as reported by the runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleStatusInfo {
    pub rule_id: u32,
    /// 1-based position of the rule in its file
    pub idx: usize,
    pub file_name: String,
    #[serde(default)]
    pub name: String,
    /// -1 error, 0 inactive, 1 active
    pub status: i8,
    #[serde(default)]
    pub is_acknowledgeable: bool,
    #[serde(default)]
    pub is_acknowledged: bool,
    #[serde(default)]
    pub is_armed: bool,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub last_status_update: DateTime<Utc>,
    #[serde(default)]
    pub errors: Vec<RuleErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleErrorEntry {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
    pub event: String,
    pub message: String,
}

/// Runtime event history and upcoming schedule
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub history: Vec<serde_json::Value>,
    #[serde(default)]
    pub scheduled: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconState {
    Ko,
    Inactive,
    Active,
    Acknowledged,
}

impl IconState {
    pub fn project(info: &RuleStatusInfo) -> Result<Self, CoreError> {
        match info.status {
            -1 => Ok(IconState::Ko),
            0 => Ok(IconState::Inactive),
            1 if info.is_acknowledgeable && info.is_acknowledged => Ok(IconState::Acknowledged),
            1 => Ok(IconState::Active),
            other => Err(CoreError::InvalidStatus(other)),
        }
    }
}

/// What the status panel renders for one rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleStatusView {
    pub rule_id: u32,
    pub idx: usize,
    pub file_name: String,
    pub name: String,
    pub icon: IconState,
    pub is_armed: bool,
    pub arm_toggle_enabled: bool,
    pub can_acknowledge: bool,
    pub error_count: usize,
    pub last_status_update: DateTime<Utc>,
}

impl RuleStatusView {
    pub fn project(info: &RuleStatusInfo) -> Result<Self, CoreError> {
        let icon = IconState::project(info)?;
        Ok(Self {
            rule_id: info.rule_id,
            idx: info.idx,
            file_name: info.file_name.clone(),
            name: info.name.clone(),
            icon,
            is_armed: info.is_armed,
            arm_toggle_enabled: icon != IconState::Ko,
            can_acknowledge: info.status == 1 && info.is_acknowledgeable,
            error_count: info.errors.len(),
            last_status_update: info.last_status_update,
        })
    }
}
