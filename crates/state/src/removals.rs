//! Two-phase machine removal.
//!
//! A dead machine is first *marked* for removal, which records that any
//! provider-level cleanup may now happen. Once that cleanup is done the
//! removal is *completed*: the marker and the machine (with its dependent
//! documents) are deleted in one batch.
//!
//! Neither phase takes a lock. Every batch carries the assertions it relies
//! on, so racing callers fail cleanly instead of leaving half-removed
//! machines behind.

use std::collections::BTreeSet;
use std::sync::Arc;

use cluster_state_storage::DocumentStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::StateConfig;
use crate::error::{Result, StateError};
use crate::machine::{Life, Machine, MachineCleanup, Machines};

/// Stored marker: "this machine is dead and awaiting cleanup".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MachineRemovalDoc {
    #[serde(rename = "machine-id")]
    machine_id: String,
}

/// What `mark_for_removal` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// A new removal record was written.
    Created,
    /// The machine was already marked; nothing changed.
    AlreadyMarked,
}

/// The machine removal protocol.
pub struct MachineRemovals<S, C> {
    store: Arc<S>,
    machines: Machines<S>,
    removals: String,
    machines_collection: String,
    cleanup: C,
}

impl<S: DocumentStore, C: MachineCleanup> MachineRemovals<S, C> {
    pub fn new(store: Arc<S>, config: &StateConfig, cleanup: C) -> Self {
        Self {
            machines: Machines::new(Arc::clone(&store), config),
            store,
            removals: config.collections.machine_removals.clone(),
            machines_collection: config.collections.machines.clone(),
            cleanup,
        }
    }

    /// Request that `machine` be removed once provider-level cleanup is done.
    ///
    /// The machine must be dead, both as observed by the caller and when the
    /// batch is applied. Marking an already-marked machine succeeds and
    /// reports [`MarkOutcome::AlreadyMarked`].
    pub async fn mark_for_removal(&self, machine: &Machine) -> Result<MarkOutcome> {
        let not_dead = || {
            StateError::InvalidState(format!(
                "cannot remove machine {}: machine is not dead",
                machine.id()
            ))
        };
        if machine.life() != Life::Dead {
            return Err(not_dead());
        }

        let record = serde_json::to_value(MachineRemovalDoc {
            machine_id: machine.id().to_string(),
        })
        .map_err(|e| StateError::serialization("machine removal record", e))?;
        let key = machine.global_key();
        let machines = self.store.collection(&self.machines_collection);
        let removals = self.store.collection(&self.removals);

        let ops = vec![
            // Still dead, and therefore still present.
            machines.check(machine.doc_id(), Life::Dead.assertion()),
            removals.insert(key.as_str(), record).keep_existing(),
        ];

        match self.store.run_transaction(ops).await {
            Ok(report) if report.was_kept(&self.removals, &key) => {
                tracing::debug!(machine = machine.id(), "machine already marked for removal");
                Ok(MarkOutcome::AlreadyMarked)
            }
            Ok(_) => {
                tracing::info!(machine = machine.id(), "machine marked for removal");
                Ok(MarkOutcome::Created)
            }
            Err(e) if e.is_aborted() => Err(not_dead()),
            Err(e) => Err(e.into()),
        }
    }

    /// Ids of all machines currently marked for removal, sorted.
    pub async fn all_machine_removals(&self) -> Result<Vec<String>> {
        let removals = self.store.collection(&self.removals);
        let mut ids = removals
            .all()
            .await?
            .into_iter()
            .map(|(doc_id, doc)| {
                serde_json::from_value::<MachineRemovalDoc>(Value::Object(doc))
                    .map(|d| d.machine_id)
                    .map_err(|e| {
                        StateError::serialization(format!("machine removal record {doc_id}"), e)
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        ids.sort();
        Ok(ids)
    }

    /// Finish removing the given machines.
    ///
    /// Ids with no machine document are skipped, so replaying a completed
    /// call is harmless. If any listed machine still exists without having
    /// been marked, the whole call fails and nothing is removed.
    pub async fn complete_machine_removals<I, T>(&self, ids: I) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let ids: Vec<String> = ids.into_iter().map(|id| id.as_ref().to_string()).collect();
        if ids.is_empty() {
            return Ok(());
        }

        let marked: BTreeSet<String> = self.all_machine_removals().await?.into_iter().collect();
        let machines = self.machines.matching(&ids).await?;

        let found: BTreeSet<&str> = machines.iter().map(Machine::id).collect();
        let missing: BTreeSet<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| !found.contains(id))
            .collect();
        if !missing.is_empty() {
            tracing::debug!(
                "skipping nonexistent machine{}: {}",
                plural(missing.len()),
                join(missing.iter().copied())
            );
        }

        let removals = self.store.collection(&self.removals);
        let mut ops = Vec::new();
        let mut unmarked = Vec::new();
        for machine in &machines {
            if !marked.contains(machine.id()) {
                unmarked.push(machine.id());
                continue;
            }
            ops.push(removals.remove(machine.global_key()));
            ops.extend(self.cleanup.remove_ops(self.store.as_ref(), machine)?);
        }

        if !unmarked.is_empty() {
            unmarked.sort_unstable();
            return Err(StateError::InvalidState(format!(
                "cannot remove machine{} {}: not marked for removal",
                plural(unmarked.len()),
                join(unmarked.iter().copied())
            )));
        }
        if ops.is_empty() {
            return Ok(());
        }

        match self.store.run_transaction(ops).await {
            Ok(report) => {
                tracing::info!(
                    machines = machines.len(),
                    documents = report.applied,
                    "completed machine removals"
                );
                Ok(())
            }
            Err(e) if e.is_aborted() => Err(StateError::InvalidState(format!(
                "cannot remove machine{} {}: state changed concurrently ({e})",
                plural(machines.len()),
                join(machines.iter().map(Machine::id))
            ))),
            Err(e) => Err(e.into()),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

fn join<'a>(ids: impl Iterator<Item = &'a str>) -> String {
    ids.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_suffix() {
        assert_eq!(plural(0), "s");
        assert_eq!(plural(1), "");
        assert_eq!(plural(2), "s");
    }

    #[test]
    fn join_uses_comma_space() {
        assert_eq!(join(["1", "3"].into_iter()), "1, 3");
        assert_eq!(join(std::iter::empty()), "");
    }
}
