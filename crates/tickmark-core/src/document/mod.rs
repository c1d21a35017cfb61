pub mod access;
pub mod sync;

pub use access::{DocumentBuffer, DocumentStore, FileDocument, Position, TextBuffer};
pub use sync::{extract_tags, DocumentHandle, DocumentSync, InsertPosition, Location};
