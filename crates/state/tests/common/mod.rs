#![allow(dead_code)]

use std::sync::Arc;

use cluster_state::{
    DependentCleanup, Life, Machine, MachineRemovals, Machines, Metadata, Origin, StateConfig,
};
use cluster_state_storage::MemoryStore;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub config: StateConfig,
    pub machines: Machines<MemoryStore>,
    pub removals: MachineRemovals<MemoryStore, DependentCleanup>,
}

pub fn fixture() -> Fixture {
    fixture_with(StateConfig::default())
}

pub fn fixture_with(config: StateConfig) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    Fixture {
        machines: Machines::new(Arc::clone(&store), &config),
        removals: MachineRemovals::new(
            Arc::clone(&store),
            &config,
            DependentCleanup::new(&config),
        ),
        store,
        config,
    }
}

impl Fixture {
    /// Add a machine and walk it all the way to Dead.
    pub async fn dead_machine(&self, id: &str) -> Machine {
        let alive = self.machines.add(id).await.unwrap();
        let dying = self.machines.advance_life(&alive, Life::Dying).await.unwrap();
        self.machines.advance_life(&dying, Life::Dead).await.unwrap()
    }

    pub async fn removal_count(&self) -> usize {
        self.store
            .count(&self.config.collections.machine_removals)
            .await
    }
}

pub fn origin() -> Origin {
    Origin::new("deadbeef-0bad-400d-8000-4b1d0d06f00d", "0", "localhost", "2.0.1")
}

/// A finished record: notes "", size 42, checksum "some hash".
pub fn finished_metadata() -> Metadata {
    let mut meta = Metadata::new(origin(), "");
    meta.finish(42, "some hash", "").unwrap();
    meta
}
