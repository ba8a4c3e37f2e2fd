pub mod conformance;
mod error;
mod memory;
mod op;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use op::{Assertion, DocRef, Document, Filter, OnConflict, OpKind, Operation, TxnReport};
pub use traits::{Collection, DocumentStore};
