//! Block tree codec
//!
//! Converts between the editor's block tree and normalized rule
//! documents, and reads and writes the XML rule file format.

pub mod codec;
pub mod error;
pub mod escape;
pub mod normalize;
pub mod xml;

pub use codec::RuleCodec;
pub use error::CodecError;
pub use escape::{escape, unescape};
pub use normalize::normalize;
pub use xml::{parse_blocks, write_blocks};
