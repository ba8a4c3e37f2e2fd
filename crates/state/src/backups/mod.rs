//! Backup metadata: provenance, descriptors, and the catalog that stores them.

mod catalog;
mod metadata;
mod origin;

pub use catalog::BackupCatalog;
pub use metadata::{Metadata, DEFAULT_CHECKSUM_FORMAT};
pub use origin::Origin;
