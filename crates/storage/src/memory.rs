//! In-memory `DocumentStore` backend.
//!
//! Holds every collection in a single map behind a `tokio::sync::RwLock`.
//! A batch is staged in an overlay while its operations are checked, and the
//! overlay is only folded into the collections once every operation has
//! passed, so a rejected batch leaves no trace.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::op::{DocRef, Document, Filter, OnConflict, OpKind, Operation, TxnReport};
use crate::traits::DocumentStore;

type Collections = BTreeMap<String, BTreeMap<String, Document>>;

/// Reference backend used by tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }
}

/// Pending changes of one batch: `None` marks a removal.
struct Overlay<'a> {
    base: &'a Collections,
    staged: HashMap<DocRef, Option<Document>>,
}

impl<'a> Overlay<'a> {
    fn new(base: &'a Collections) -> Self {
        Self {
            base,
            staged: HashMap::new(),
        }
    }

    fn current(&self, key: &DocRef) -> Option<Document> {
        match self.staged.get(key) {
            Some(staged) => staged.clone(),
            None => self
                .base
                .get(&key.collection)
                .and_then(|c| c.get(&key.doc_id))
                .cloned(),
        }
    }

    fn stage(&mut self, key: DocRef, doc: Option<Document>) {
        self.staged.insert(key, doc);
    }

    fn into_staged(self) -> HashMap<DocRef, Option<Document>> {
        self.staged
    }
}

fn stage_batch(
    base: &Collections,
    ops: Vec<Operation>,
) -> Result<(HashMap<DocRef, Option<Document>>, TxnReport), StorageError> {
    let mut overlay = Overlay::new(base);
    let mut report = TxnReport::default();

    for (index, op) in ops.into_iter().enumerate() {
        let key = DocRef {
            collection: op.collection,
            doc_id: op.doc_id,
        };
        let current = overlay.current(&key);

        if let Some(assertion) = op.assertion {
            if !assertion.holds(current.as_ref()) {
                return Err(StorageError::AssertionFailed {
                    index,
                    collection: key.collection,
                    doc_id: key.doc_id,
                    assertion,
                });
            }
        }

        match op.kind {
            OpKind::Insert { doc, on_conflict } => {
                if current.is_some() {
                    match on_conflict {
                        OnConflict::Abort => {
                            return Err(StorageError::DocumentExists {
                                index,
                                collection: key.collection,
                                doc_id: key.doc_id,
                            });
                        }
                        OnConflict::KeepExisting => {
                            report.kept_existing.push(key);
                            continue;
                        }
                    }
                }
                let doc = match doc {
                    Value::Object(doc) => doc,
                    other => {
                        return Err(StorageError::InvalidDocument {
                            collection: key.collection,
                            doc_id: key.doc_id,
                            reason: format!("expected a JSON object, got {other}"),
                        });
                    }
                };
                overlay.stage(key, Some(doc));
                report.applied += 1;
            }
            OpKind::Update(set) => {
                if let Some(mut doc) = current {
                    if set.is_empty() {
                        continue;
                    }
                    doc.extend(set);
                    overlay.stage(key, Some(doc));
                    report.applied += 1;
                }
            }
            OpKind::Remove => {
                if current.is_some() {
                    overlay.stage(key, None);
                    report.applied += 1;
                }
            }
        }
    }

    Ok((overlay.into_staged(), report))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn run_transaction(&self, ops: Vec<Operation>) -> Result<TxnReport, StorageError> {
        let op_count = ops.len();
        let mut collections = self.collections.write().await;

        let (staged, report) = match stage_batch(&collections, ops) {
            Ok(staged) => staged,
            Err(e) => {
                tracing::trace!(ops = op_count, error = %e, "transaction aborted");
                return Err(e);
            }
        };

        for (key, doc) in staged {
            match doc {
                Some(doc) => {
                    collections
                        .entry(key.collection)
                        .or_default()
                        .insert(key.doc_id, doc);
                }
                None => {
                    if let Some(c) = collections.get_mut(&key.collection) {
                        c.remove(&key.doc_id);
                    }
                }
            }
        }

        tracing::trace!(
            ops = op_count,
            applied = report.applied,
            kept_existing = report.kept_existing.len(),
            "transaction committed"
        );
        Ok(report)
    }

    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Document>, StorageError> {
        Ok(self
            .collections
            .read()
            .await
            .get(collection)
            .and_then(|c| c.get(doc_id))
            .cloned())
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Document)>, StorageError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(docs
            .iter()
            .filter(|(id, doc)| filter.matches(id, doc))
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;
    use crate::op::Assertion;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_passes_conformance() {
        let report = run_conformance_suite(|| async { MemoryStore::new() }).await;
        assert!(report.failed == 0, "{report}");
        assert!(report.total > 0);
    }

    #[tokio::test]
    async fn rejected_batch_leaves_collections_untouched() {
        let store = MemoryStore::new();
        store
            .run_transaction(vec![Operation::insert("m", "0", json!({"life": "alive"}))])
            .await
            .unwrap();

        let err = store
            .run_transaction(vec![
                Operation::remove("m", "0"),
                Operation::insert("r", "m#0", json!({"machine-id": "0"})),
                Operation::check("m", "0", Assertion::DocExists),
            ])
            .await
            .unwrap_err();

        assert_eq!(err.failed_op(), Some(2));
        assert_eq!(store.count("m").await, 1);
        assert_eq!(store.count("r").await, 0);
    }

    #[tokio::test]
    async fn collection_accessor_builds_scoped_batches() {
        let store = MemoryStore::new();
        let machines = store.collection("m");
        let removals = store.collection("r");
        assert_eq!(machines.name(), "m");

        store
            .run_transaction(vec![machines.insert("0", json!({"life": "dead"}))])
            .await
            .unwrap();
        let report = store
            .run_transaction(vec![
                machines.check("0", Assertion::field_equals("life", "dead")),
                removals.insert("m#0", json!({"machine-id": "0"})),
                machines.update("0", Document::from_iter([("life".into(), json!("dead"))])),
            ])
            .await
            .unwrap();
        assert_eq!(report.applied, 2);
        assert!(removals.get("m#0").await.unwrap().is_some());

        store
            .run_transaction(vec![removals.remove("m#0"), machines.remove("0")])
            .await
            .unwrap();
        assert!(removals.all().await.unwrap().is_empty());
        assert_eq!(store.count("m").await, 0);
    }

    #[tokio::test]
    async fn empty_update_is_not_counted() {
        let store = MemoryStore::new();
        store
            .run_transaction(vec![Operation::insert("m", "0", json!({}))])
            .await
            .unwrap();
        let report = store
            .run_transaction(vec![Operation::check("m", "0", Assertion::DocExists)])
            .await
            .unwrap();
        assert_eq!(report.applied, 0);
    }
}
