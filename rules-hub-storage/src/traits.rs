//! Interfaces to the rule file store and the rule runtime

use async_trait::async_trait;
use rules_hub_core::{RuleStatusInfo, Timeline};
use serde::{Deserialize, Serialize};

use crate::StorageError;

/// Result of an upload, decided from the server's response text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum UploadOutcome {
    Uploaded { file_name: String },
    Rejected { response: String },
}

impl UploadOutcome {
    /// An upload succeeded iff the response contains `OK|<file name>`
    pub fn from_response(file_name: &str, response: &str) -> Self {
        if response.contains(&format!("OK|{}", file_name)) {
            UploadOutcome::Uploaded {
                file_name: file_name.to_string(),
            }
        } else {
            UploadOutcome::Rejected {
                response: response.to_string(),
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, UploadOutcome::Uploaded { .. })
    }
}

/// Reads and uploads whole rule files
#[async_trait]
pub trait FileTransport: Send + Sync {
    /// Full text of a rule file
    async fn read_file(&self, path: &str) -> Result<String, StorageError>;

    /// Replace a rule file; the upload is atomic per file
    async fn write_file(&self, path: &str, content: &str) -> Result<UploadOutcome, StorageError>;
}

/// Query and command interface of the rule runtime
#[async_trait]
pub trait RuleRuntime: Send + Sync {
    /// Statuses of every rule, or of one rule
    async fn get_rule_statuses(
        &self,
        rule_id: Option<u32>,
    ) -> Result<Vec<RuleStatusInfo>, StorageError>;

    async fn get_timeline(&self) -> Result<Timeline, StorageError>;

    async fn set_arming(&self, rule_id: u32, armed: bool) -> Result<(), StorageError>;

    async fn set_acknowledgement(
        &self,
        rule_id: u32,
        acknowledged: bool,
    ) -> Result<(), StorageError>;

    /// Make the runtime reparse a rule file after it changed
    async fn load_rules_file(&self, file_name: &str) -> Result<(), StorageError>;
}
