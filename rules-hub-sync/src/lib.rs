//! Rule file synchronizer
//!
//! Editing sessions over rule files: load, track changes, check the file
//! against the runtime's rule index, then save or delete rules and have
//! the runtime reload the file.

pub mod check;
pub mod error;
pub mod file;
pub mod session;
pub mod tracker;

pub use check::{
    check_synchronization, known_rules, sorted_by_name, KnownRule, SyncReport, SyncWarning,
};
pub use error::SyncError;
pub use file::{rule_id, rule_name, RuleFile};
pub use session::{
    CancelOutcome, DeleteOutcome, EditingSession, RuleEdit, SaveOutcome, SessionState,
};
pub use tracker::DirtyTracker;
