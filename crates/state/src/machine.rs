//! The slice of the machine model the removal protocol depends on.
//!
//! Machines belong to the wider cluster model; this module only knows how to
//! read their lifecycle state, derive their global key, and produce the
//! operations that delete them.

use std::fmt;
use std::sync::Arc;

use cluster_state_storage::{Assertion, Document, DocumentStore, Filter, Operation};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StateConfig;
use crate::error::{Result, StateError};

/// Machine lifecycle. Only ever advances: Alive → Dying → Dead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Life {
    Alive,
    Dying,
    Dead,
}

impl Life {
    pub fn as_str(self) -> &'static str {
        match self {
            Life::Alive => "alive",
            Life::Dying => "dying",
            Life::Dead => "dead",
        }
    }

    /// Whether moving from `self` to `next` respects monotonicity.
    pub fn can_advance_to(self, next: Life) -> bool {
        next >= self
    }

    /// Assertion that a stored machine document is in this state.
    pub(crate) fn assertion(self) -> Assertion {
        Assertion::field_equals(LIFE_FIELD, self.as_str())
    }
}

impl fmt::Display for Life {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub(crate) const MACHINE_ID_FIELD: &str = "machineid";
const LIFE_FIELD: &str = "life";

/// Stored form of a machine. Fields owned by other parts of the cluster
/// model are left alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MachineDoc {
    #[serde(rename = "machineid")]
    machine_id: String,
    life: Life,
}

/// Derive the global key of a machine id.
pub fn machine_global_key(id: &str) -> String {
    format!("m#{id}")
}

/// A machine as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    doc_id: String,
    doc: MachineDoc,
}

impl Machine {
    pub(crate) fn from_document(doc_id: String, doc: Document) -> Result<Self> {
        let doc: MachineDoc = serde_json::from_value(Value::Object(doc))
            .map_err(|e| StateError::serialization(format!("machine document {doc_id}"), e))?;
        Ok(Self { doc_id, doc })
    }

    pub fn id(&self) -> &str {
        &self.doc.machine_id
    }

    pub fn life(&self) -> Life {
        self.doc.life
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn global_key(&self) -> String {
        machine_global_key(self.id())
    }
}

/// Builds the operations that delete a machine and everything hanging off it.
///
/// The removal protocol appends whatever this returns to its own batch, so
/// implementations should assert whatever they rely on rather than read it
/// ahead of time. `store` is only for building operations through its
/// collection accessors.
pub trait MachineCleanup: Send + Sync {
    fn remove_ops<S: DocumentStore>(
        &self,
        store: &S,
        machine: &Machine,
    ) -> Result<Vec<Operation>>;
}

/// Removes the machine document (asserting it is still dead) plus the
/// documents keyed by its global key in each configured dependent collection.
#[derive(Debug, Clone)]
pub struct DependentCleanup {
    machines: String,
    dependents: Vec<String>,
}

impl DependentCleanup {
    pub fn new(config: &StateConfig) -> Self {
        Self {
            machines: config.collections.machines.clone(),
            dependents: config.removal.dependent_collections.clone(),
        }
    }
}

impl MachineCleanup for DependentCleanup {
    fn remove_ops<S: DocumentStore>(
        &self,
        store: &S,
        machine: &Machine,
    ) -> Result<Vec<Operation>> {
        let mut ops = vec![store
            .collection(&self.machines)
            .remove(machine.doc_id())
            .assert(Life::Dead.assertion())];
        let key = machine.global_key();
        ops.extend(
            self.dependents
                .iter()
                .map(|collection| store.collection(collection).remove(key.as_str())),
        );
        Ok(ops)
    }
}

/// Read access to machines, plus the minimal lifecycle writes the removal
/// protocol is exercised against.
pub struct Machines<S> {
    store: Arc<S>,
    collection: String,
}

impl<S: DocumentStore> Machines<S> {
    pub fn new(store: Arc<S>, config: &StateConfig) -> Self {
        Self {
            store,
            collection: config.collections.machines.clone(),
        }
    }

    /// Look up one machine by id.
    pub async fn machine(&self, id: &str) -> Result<Machine> {
        let machines = self.store.collection(&self.collection);
        let docs = machines
            .find(&Filter::FieldEquals {
                field: MACHINE_ID_FIELD.to_string(),
                value: Value::from(id),
            })
            .await?;
        match docs.into_iter().next() {
            Some((doc_id, doc)) => Machine::from_document(doc_id, doc),
            None => Err(StateError::NotFound(format!("machine {id}"))),
        }
    }

    /// All machines whose id is in `ids`. Unknown ids are simply absent.
    pub async fn matching(&self, ids: &[String]) -> Result<Vec<Machine>> {
        let machines = self.store.collection(&self.collection);
        machines
            .find(&Filter::field_in(MACHINE_ID_FIELD, ids.iter().map(String::as_str)))
            .await?
            .into_iter()
            .map(|(doc_id, doc)| Machine::from_document(doc_id, doc))
            .collect()
    }

    /// Add a new machine in the Alive state.
    pub async fn add(&self, id: &str) -> Result<Machine> {
        let doc = MachineDoc {
            machine_id: id.to_string(),
            life: Life::Alive,
        };
        let body = serde_json::to_value(&doc)
            .map_err(|e| StateError::serialization(format!("machine {id}"), e))?;
        let op = self
            .store
            .collection(&self.collection)
            .insert(id, body)
            .assert(Assertion::DocMissing);
        match self.store.run_transaction(vec![op]).await {
            Ok(_) => Ok(Machine {
                doc_id: id.to_string(),
                doc,
            }),
            Err(e) if e.is_aborted() => Err(StateError::AlreadyExists(format!("machine {id}"))),
            Err(e) => Err(e.into()),
        }
    }

    /// Move a machine forward in its lifecycle. The write asserts the state
    /// the caller observed, so a concurrent change makes this fail.
    pub async fn advance_life(&self, machine: &Machine, next: Life) -> Result<Machine> {
        if !machine.life().can_advance_to(next) {
            return Err(StateError::InvalidState(format!(
                "cannot set machine {} to {next}: machine is {}",
                machine.id(),
                machine.life()
            )));
        }
        let mut set = Document::new();
        set.insert(LIFE_FIELD.to_string(), Value::from(next.as_str()));
        let op = self
            .store
            .collection(&self.collection)
            .update(machine.doc_id(), set)
            .assert(machine.life().assertion());
        match self.store.run_transaction(vec![op]).await {
            Ok(_) => {
                tracing::debug!(machine = machine.id(), life = %next, "machine life advanced");
                let mut updated = machine.clone();
                updated.doc.life = next;
                Ok(updated)
            }
            Err(e) if e.is_aborted() => Err(StateError::InvalidState(format!(
                "cannot set machine {} to {next}: machine changed concurrently",
                machine.id()
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cluster_state_storage::MemoryStore;

    fn machines() -> Machines<MemoryStore> {
        Machines::new(Arc::new(MemoryStore::new()), &StateConfig::default())
    }

    #[test]
    fn life_is_monotonic() {
        assert!(Life::Alive.can_advance_to(Life::Dead));
        assert!(Life::Dying.can_advance_to(Life::Dying));
        assert!(!Life::Dead.can_advance_to(Life::Alive));
        assert!(!Life::Dying.can_advance_to(Life::Alive));
    }

    #[test]
    fn global_key_is_derived_from_id() {
        assert_eq!(machine_global_key("0"), "m#0");
        assert_eq!(machine_global_key("3/lxd/1"), "m#3/lxd/1");
    }

    #[test]
    fn dependent_cleanup_removes_machine_and_dependents() {
        let mut config = StateConfig::default();
        config.removal.dependent_collections = vec!["instance-data".into()];
        let machine = Machine {
            doc_id: "0".into(),
            doc: MachineDoc {
                machine_id: "0".into(),
                life: Life::Dead,
            },
        };
        let store = MemoryStore::new();
        let ops = DependentCleanup::new(&config)
            .remove_ops(&store, &machine)
            .unwrap();
        assert_eq!(ops.len(), 2);
        assert_eq!(ops[0].collection, "machines");
        assert_eq!(ops[0].assertion, Some(Life::Dead.assertion()));
        assert_eq!(ops[1].collection, "instance-data");
        assert_eq!(ops[1].doc_id, "m#0");
    }

    #[tokio::test]
    async fn add_then_lookup() {
        let machines = machines();
        machines.add("0").await.unwrap();
        let m = machines.machine("0").await.unwrap();
        assert_eq!(m.id(), "0");
        assert_eq!(m.life(), Life::Alive);

        let err = machines.add("0").await.unwrap_err();
        assert!(err.is_already_exists(), "{err}");
        assert!(machines.machine("1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn advance_life_rejects_reversal_and_stale_reads() {
        let machines = machines();
        let alive = machines.add("0").await.unwrap();
        let dead = machines.advance_life(&alive, Life::Dead).await.unwrap();
        assert_eq!(machines.machine("0").await.unwrap().life(), Life::Dead);

        let err = machines.advance_life(&dead, Life::Alive).await.unwrap_err();
        assert!(err.is_invalid_state(), "{err}");

        // `alive` is now stale: its assertion no longer matches the store.
        let err = machines.advance_life(&alive, Life::Dying).await.unwrap_err();
        assert!(err.to_string().contains("changed concurrently"), "{err}");
    }

    #[tokio::test]
    async fn matching_skips_unknown_ids() {
        let machines = machines();
        machines.add("0").await.unwrap();
        machines.add("1").await.unwrap();
        let found = machines
            .matching(&["1".to_string(), "9".to_string()])
            .await
            .unwrap();
        let ids: Vec<&str> = found.iter().map(Machine::id).collect();
        assert_eq!(ids, ["1"]);
    }
}
