//! Editing session of one rule file
//!
//! `Loaded → Edited → Checked → Saved | Cancelled`. A session owns the
//! positional rule list read from the file and the runtime's index of the
//! same file. Saving checks synchronization, merges the edited rule,
//! uploads the whole file and asks the runtime to reload it.

use rules_hub_codec::RuleCodec;
use rules_hub_core::{Block, RuleDocument};
use rules_hub_storage::{FileTransport, RuleRuntime, StorageError, UploadOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::check::{check_synchronization, known_rules, KnownRule, SyncReport};
use crate::file::{rule_id, RuleFile};
use crate::{DirtyTracker, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Loaded,
    Edited,
    Checked,
    Saved,
    Cancelled,
}

/// A rule to store: replaces the rule at `idx`, or is appended
#[derive(Debug, Clone)]
pub struct RuleEdit {
    pub idx: Option<usize>,
    pub block: Block,
}

impl RuleEdit {
    pub fn append(block: Block) -> Self {
        Self { idx: None, block }
    }

    pub fn replace(idx: usize, block: Block) -> Self {
        Self {
            idx: Some(idx),
            block,
        }
    }

    pub fn from_document(idx: Option<usize>, rule: &RuleDocument) -> Self {
        Self {
            idx,
            block: RuleCodec::new().encode(rule),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// The file is stored. `reload_error` is set when the runtime did not
    /// take the new file; the upload itself stands.
    Saved {
        idx: usize,
        rule_id: Option<u32>,
        report: SyncReport,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reload_error: Option<String>,
    },
    /// Upload failed; the serialized file is handed back for a manual export
    LocalExport {
        file_name: String,
        content: String,
        reason: String,
        report: SyncReport,
    },
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }
}

/// A rule removed from the stored file
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteOutcome {
    pub removed: Block,
    pub reload_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Discarded,
    ConfirmationRequired,
}

pub struct EditingSession {
    file: RuleFile,
    known: Vec<KnownRule>,
    state: SessionState,
    tracker: DirtyTracker,
    transport: Arc<dyn FileTransport>,
    codec: RuleCodec,
}

impl EditingSession {
    /// Read and parse a rule file; a missing file starts empty
    pub async fn load(
        file_name: &str,
        transport: Arc<dyn FileTransport>,
    ) -> Result<Self, SyncError> {
        let file = match transport.read_file(file_name).await {
            Ok(text) => RuleFile::parse(file_name, &text)?,
            Err(StorageError::NotFound(_)) => {
                tracing::info!("Rule file {} does not exist yet", file_name);
                RuleFile::new(file_name)
            }
            Err(err) => {
                tracing::error!("Failed to read rule file {}: {}", file_name, err);
                return Err(err.into());
            }
        };
        tracing::debug!("Loaded {} rules from {}", file.len(), file_name);

        Ok(Self {
            file,
            known: Vec::new(),
            state: SessionState::Loaded,
            tracker: DirtyTracker::new(),
            transport,
            codec: RuleCodec::new(),
        })
    }

    /// Load a file together with the runtime's index of its rules
    pub async fn open(
        file_name: &str,
        transport: Arc<dyn FileTransport>,
        runtime: &dyn RuleRuntime,
    ) -> Result<Self, SyncError> {
        let mut session = Self::load(file_name, transport).await?;
        session.refresh_known(runtime).await?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn file(&self) -> &RuleFile {
        &self.file
    }

    pub fn known(&self) -> &[KnownRule] {
        &self.known
    }

    pub fn is_dirty(&self) -> bool {
        self.tracker.is_dirty()
    }

    /// Decoded rules with their positions
    pub fn documents(&self) -> Result<Vec<(usize, RuleDocument)>, SyncError> {
        self.file.documents(&self.codec)
    }

    /// Replace the known-rule index with the runtime's current view
    pub async fn refresh_known(&mut self, runtime: &dyn RuleRuntime) -> Result<(), SyncError> {
        let statuses = runtime.get_rule_statuses(None).await?;
        self.known = known_rules(&self.file.file_name, &statuses);
        Ok(())
    }

    /// Structural change event from the editor surface
    pub fn on_change(&mut self) -> Result<(), SyncError> {
        self.ensure_open()?;
        if self.tracker.on_change() {
            self.state = SessionState::Edited;
        }
        Ok(())
    }

    /// Compare the file against the known rules without saving
    pub fn check(&mut self) -> Result<SyncReport, SyncError> {
        self.ensure_open()?;
        self.state = SessionState::Checked;
        Ok(check_synchronization(&mut self.file.blocks, &self.known))
    }

    /// Check, merge, upload and reload
    ///
    /// A malformed rule is an error and changes nothing. A failed upload
    /// keeps the session `Edited` and returns the serialized file as a
    /// `LocalExport`. Once the upload succeeded the save succeeded, even
    /// if the runtime then fails to reload.
    pub async fn save(
        &mut self,
        edit: RuleEdit,
        runtime: &dyn RuleRuntime,
    ) -> Result<SaveOutcome, SyncError> {
        self.ensure_open()?;
        self.codec.validate(&edit.block)?;

        self.state = SessionState::Checked;
        let report = check_synchronization(&mut self.file.blocks, &self.known);

        let mut merged = self.file.clone();
        let idx = match merged.put(edit.idx, edit.block) {
            Ok(idx) => idx,
            Err(err) => {
                self.state = SessionState::Edited;
                return Err(err);
            }
        };
        let content = merged.serialize()?;

        if let Err(reason) = self.upload(&content).await {
            self.state = SessionState::Edited;
            return Ok(SaveOutcome::LocalExport {
                file_name: self.file.file_name.clone(),
                content,
                reason,
                report,
            });
        }

        self.file = merged;
        self.state = SessionState::Saved;
        self.tracker.reset();
        tracing::info!("Saved rule {} of {}", idx, self.file.file_name);

        let reload_error = self.reload_after_upload(runtime).await;
        Ok(SaveOutcome::Saved {
            idx,
            rule_id: self.file.get(idx).and_then(rule_id),
            report,
            reload_error,
        })
    }

    /// Leave the session; a dirty session needs confirmation
    pub fn cancel(&mut self, confirmed: bool) -> CancelOutcome {
        if self.tracker.is_dirty() && !confirmed {
            return CancelOutcome::ConfirmationRequired;
        }
        self.state = SessionState::Cancelled;
        CancelOutcome::Discarded
    }

    /// Remove the rule at `idx`, upload the file and reload the index
    ///
    /// Later rules keep their ids; positions come back from the runtime.
    pub async fn delete_rule(
        &mut self,
        idx: usize,
        runtime: &dyn RuleRuntime,
    ) -> Result<DeleteOutcome, SyncError> {
        self.ensure_open()?;
        let mut remaining = self.file.clone();
        let removed = remaining.remove(idx)?;
        let content = remaining.serialize()?;

        self.upload(&content)
            .await
            .map_err(|response| SyncError::UploadRejected {
                file_name: self.file.file_name.clone(),
                response,
            })?;
        self.file = remaining;
        tracing::info!("Deleted rule {} of {}", idx, self.file.file_name);

        let reload_error = self.reload_after_upload(runtime).await;
        Ok(DeleteOutcome {
            removed,
            reload_error,
        })
    }

    /// Upload the serialized file; the error carries the failure text
    async fn upload(&self, content: &str) -> Result<(), String> {
        match self.transport.write_file(&self.file.file_name, content).await {
            Ok(UploadOutcome::Uploaded { .. }) => Ok(()),
            Ok(UploadOutcome::Rejected { response }) => {
                tracing::error!(
                    "Upload of {} rejected: {}",
                    self.file.file_name,
                    response.trim()
                );
                Err(response)
            }
            Err(err) => {
                tracing::error!("Upload of {} failed: {}", self.file.file_name, err);
                Err(err.to_string())
            }
        }
    }

    /// Make the runtime reparse the file, then adopt the ids it assigned
    async fn reload(&mut self, runtime: &dyn RuleRuntime) -> Result<(), SyncError> {
        runtime.load_rules_file(&self.file.file_name).await?;
        self.refresh_known(runtime).await?;
        let adopted = check_synchronization(&mut self.file.blocks, &self.known);
        for (idx, id) in &adopted.assigned {
            tracing::debug!("Rule {} of {} got id {}", idx, self.file.file_name, id);
        }
        Ok(())
    }

    async fn reload_after_upload(&mut self, runtime: &dyn RuleRuntime) -> Option<String> {
        match self.reload(runtime).await {
            Ok(()) => None,
            Err(err) => {
                tracing::error!(
                    "Runtime failed to reload {} after upload: {}",
                    self.file.file_name,
                    err
                );
                Some(err.to_string())
            }
        }
    }

    fn ensure_open(&self) -> Result<(), SyncError> {
        if self.state == SessionState::Cancelled {
            return Err(SyncError::Cancelled(self.file.file_name.clone()));
        }
        Ok(())
    }
}
