//! Transactional cluster state: machine removal and backup metadata.
//!
//! Both protocols express every mutation as one atomic batch of document
//! operations with explicit preconditions, submitted to a
//! [`DocumentStore`](cluster_state_storage::DocumentStore). There is no
//! in-process locking; racing writers are resolved by the store.

pub mod backups;
mod clock;
mod config;
mod error;
mod ids;
mod machine;
mod removals;

pub use backups::{BackupCatalog, Metadata, Origin, DEFAULT_CHECKSUM_FORMAT};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CollectionNames, RemovalConfig, StateConfig};
pub use error::{Result, StateError};
pub use ids::{IdGenerator, RandomIdGenerator};
pub use machine::{machine_global_key, DependentCleanup, Life, Machine, MachineCleanup, Machines};
pub use removals::{MachineRemovals, MarkOutcome};
