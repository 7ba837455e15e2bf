//! External interfaces of the rule editor
//!
//! The rule file transport and the rule runtime are traits. Backends:
//! in-memory (development and tests), local filesystem, and the
//! controller's HTTP query interface behind the `http` feature.

pub mod error;
pub mod fs;
pub mod memory;
pub mod traits;

#[cfg(feature = "http")]
pub mod http;

pub use error::StorageError;
pub use fs::FsTransport;
pub use memory::{InMemoryStorage, RuntimeCommand};
pub use traits::{FileTransport, RuleRuntime, UploadOutcome};

#[cfg(feature = "http")]
pub use http::{HttpConfig, HttpRuntime, HttpTransport};
