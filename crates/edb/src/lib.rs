//! Extraction engine for Exchange EDB databases.
//!
//! Reads the partitioned mailbox tables of an ESE database through a narrow
//! parser-capability interface ([`ese`]), decompresses Exchange column
//! payloads, recovers semantic fields from the undocumented PropertyBlob and
//! RecipientList formats ([`blob`]), and assembles typed records ([`model`],
//! [`reader`]). Extracted content exports as EML, ICS, VCF or a synthesized
//! PST file ([`export`]); RFC 5322 input feeds the PST writer through
//! [`eml`].

pub mod blob;
pub mod eml;
pub mod error;
pub mod ese;
pub mod export;
pub mod model;
pub mod reader;
pub mod strings;
pub mod time;

pub use error::{Diagnostics, EdbError, Result};
pub use reader::{Checkpoint, EdbReader, FolderTree};
