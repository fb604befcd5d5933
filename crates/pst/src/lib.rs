//! Writer for [PST files](https://learn.microsoft.com/en-us/openspecs/office_file_formats/ms-pst/6b57253b-0853-47bb-99bb-d4b8f78105f0).
//!
//! Builds a Unicode (`wVer = 23`), unencoded (`bCryptMethod = 0`) PST from
//! scratch: the Node Database layer ([`ndb`]) emits blocks, pages, allocation
//! maps and the NBT/BBT B-trees; the Lists-Tables-Properties layer ([`ltp`])
//! builds Heap-on-Node, Property Context and Table Context structures on top;
//! the Messaging layer ([`messaging`]) assembles the store, folders, messages,
//! recipients and attachments.
//!
//! Output is deterministic: given the same input sequence, every NID and BID
//! is assigned in the same order and the file is byte-identical.

pub mod ltp;
pub mod messaging;
pub mod ndb;

mod block_sig;
mod crc;

pub use ltp::prop_context::PropertyValue;
pub use messaging::named_prop::PropertyName;
pub use messaging::writer::{FolderId, PstWriter};
pub use messaging::{AttachmentProperties, CancelFlag, MessageProperties, RecipientRow};
