//! In-memory file store and rule runtime for development and testing
//!
//! Reloading a rule file behaves like the real runtime: rules are reparsed,
//! rules without an id get the next free one, and statuses of the file are
//! rebuilt in file order. Every runtime command is recorded.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rules_hub_codec::RuleCodec;
use rules_hub_core::{Property, RuleStatusInfo, Timeline};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{FileTransport, RuleRuntime, StorageError, UploadOutcome};

/// A command received by the in-memory runtime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RuntimeCommand {
    SetArming { rule_id: u32, armed: bool },
    SetAcknowledgement { rule_id: u32, acknowledged: bool },
    LoadRulesFile { file_name: String },
}

pub struct InMemoryStorage {
    files: RwLock<HashMap<String, String>>,
    statuses: RwLock<Vec<RuleStatusInfo>>,
    timeline: RwLock<Timeline>,
    commands: RwLock<Vec<RuntimeCommand>>,
    reject_uploads: AtomicBool,
    /// Where the runtime reads rule files from, when not from this store
    rule_files: Option<Arc<dyn FileTransport>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            statuses: RwLock::new(Vec::new()),
            timeline: RwLock::new(Timeline::default()),
            commands: RwLock::new(Vec::new()),
            reject_uploads: AtomicBool::new(false),
            rule_files: None,
        }
    }

    /// A runtime that loads rule files through another transport
    pub fn reading_from(transport: Arc<dyn FileTransport>) -> Self {
        Self {
            rule_files: Some(transport),
            ..Self::new()
        }
    }

    /// Store a file without notifying the runtime
    pub fn insert_file(&self, path: impl Into<String>, content: impl Into<String>) {
        self.files.write().insert(path.into(), content.into());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.read().get(path).cloned()
    }

    /// Make every following upload fail with an error response
    pub fn reject_uploads(&self, reject: bool) {
        self.reject_uploads.store(reject, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<RuntimeCommand> {
        self.commands.read().clone()
    }

    pub fn set_statuses(&self, statuses: Vec<RuleStatusInfo>) {
        *self.statuses.write() = statuses;
    }

    /// Overwrite the evaluation status of a rule
    pub fn set_status(&self, rule_id: u32, status: i8) -> Result<(), StorageError> {
        self.update_rule(rule_id, |info| info.status = status)
    }

    pub fn set_timeline(&self, timeline: Timeline) {
        *self.timeline.write() = timeline;
    }

    fn update_rule(
        &self,
        rule_id: u32,
        update: impl FnOnce(&mut RuleStatusInfo),
    ) -> Result<(), StorageError> {
        let mut statuses = self.statuses.write();
        let info = statuses
            .iter_mut()
            .find(|s| s.rule_id == rule_id)
            .ok_or_else(|| StorageError::NotFound(format!("Rule with id {} not found", rule_id)))?;
        update(info);
        info.last_status_update = Utc::now();
        Ok(())
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileTransport for InMemoryStorage {
    async fn read_file(&self, path: &str) -> Result<String, StorageError> {
        self.file(path)
            .ok_or_else(|| StorageError::NotFound(format!("File {} not found", path)))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<UploadOutcome, StorageError> {
        if self.reject_uploads.load(Ordering::SeqCst) {
            return Ok(UploadOutcome::from_response(path, "ERROR|upload rejected"));
        }
        self.insert_file(path, content);
        Ok(UploadOutcome::from_response(path, &format!("OK|{}", path)))
    }
}

#[async_trait]
impl RuleRuntime for InMemoryStorage {
    async fn get_rule_statuses(
        &self,
        rule_id: Option<u32>,
    ) -> Result<Vec<RuleStatusInfo>, StorageError> {
        let statuses = self.statuses.read();
        Ok(statuses
            .iter()
            .filter(|s| rule_id.map_or(true, |id| s.rule_id == id))
            .cloned()
            .collect())
    }

    async fn get_timeline(&self) -> Result<Timeline, StorageError> {
        Ok(self.timeline.read().clone())
    }

    async fn set_arming(&self, rule_id: u32, armed: bool) -> Result<(), StorageError> {
        self.commands
            .write()
            .push(RuntimeCommand::SetArming { rule_id, armed });
        self.update_rule(rule_id, |info| info.is_armed = armed)
    }

    async fn set_acknowledgement(
        &self,
        rule_id: u32,
        acknowledged: bool,
    ) -> Result<(), StorageError> {
        self.commands
            .write()
            .push(RuntimeCommand::SetAcknowledgement { rule_id, acknowledged });
        self.update_rule(rule_id, |info| info.is_acknowledged = acknowledged)
    }

    async fn load_rules_file(&self, file_name: &str) -> Result<(), StorageError> {
        self.commands.write().push(RuntimeCommand::LoadRulesFile {
            file_name: file_name.to_string(),
        });
        let content = match &self.rule_files {
            Some(transport) => transport.read_file(file_name).await?,
            None => self.read_file(file_name).await?,
        };
        let rules = RuleCodec::new().decode_file(&content)?;

        let mut statuses = self.statuses.write();
        let (previous, mut others): (Vec<_>, Vec<_>) =
            statuses.drain(..).partition(|s| s.file_name == file_name);
        let mut next_id = previous
            .iter()
            .chain(others.iter())
            .map(|s| s.rule_id)
            .chain(rules.iter().filter_map(|r| r.id))
            .max()
            .unwrap_or(0)
            + 1;
        let mut claimed = Vec::new();

        let mut reloaded = Vec::with_capacity(rules.len());
        for (position, rule) in rules.iter().enumerate() {
            let rule_id = match rule.id {
                Some(id) => id,
                None => match previous
                    .iter()
                    .find(|s| s.name == rule.name && !claimed.contains(&s.rule_id))
                {
                    Some(existing) => existing.rule_id,
                    None => {
                        let id = next_id;
                        next_id += 1;
                        id
                    }
                },
            };
            claimed.push(rule_id);

            let before = previous.iter().find(|s| s.rule_id == rule_id);
            reloaded.push(RuleStatusInfo {
                rule_id,
                idx: position + 1,
                file_name: file_name.to_string(),
                name: rule.name.clone(),
                status: before.map_or(0, |s| s.status),
                is_acknowledgeable: rule
                    .properties
                    .iter()
                    .any(|p| matches!(p, Property::Acknowledgeable { enabled: true })),
                is_acknowledged: before.is_some_and(|s| s.is_acknowledged),
                is_armed: before.map_or(true, |s| s.is_armed),
                last_status_update: Utc::now(),
                errors: before.map(|s| s.errors.clone()).unwrap_or_default(),
            });
        }
        tracing::info!("Reloaded {} rules from {}", reloaded.len(), file_name);

        others.extend(reloaded);
        *statuses = others;
        Ok(())
    }
}
