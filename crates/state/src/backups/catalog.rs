use std::sync::Arc;

use cluster_state_storage::{Assertion, Document, DocumentStore};
use serde_json::Value;

use super::metadata::{Metadata, MetadataDoc};
use crate::config::StateConfig;
use crate::error::{Result, StateError};
use crate::ids::{IdGenerator, RandomIdGenerator};

const STORED_FIELD: &str = "stored";

/// Store of backup metadata records.
pub struct BackupCatalog<S, G = RandomIdGenerator> {
    store: Arc<S>,
    collection: String,
    ids: G,
}

impl<S: DocumentStore> BackupCatalog<S> {
    pub fn new(store: Arc<S>, config: &StateConfig) -> Self {
        Self::with_id_generator(store, config, RandomIdGenerator)
    }
}

impl<S: DocumentStore, G: IdGenerator> BackupCatalog<S, G> {
    pub fn with_id_generator(store: Arc<S>, config: &StateConfig, ids: G) -> Self {
        Self {
            store,
            collection: config.collections.backup_metadata.clone(),
            ids,
        }
    }

    /// Insert `metadata` and return its id.
    ///
    /// The record's pre-assigned id is used when it has one; otherwise a
    /// fresh id is generated. Either way the id must not be taken.
    pub async fn insert(&self, metadata: &Metadata) -> Result<String> {
        let id = match metadata.id() {
            Some(id) => id.to_string(),
            None => self.ids.next_id(),
        };
        self.insert_with_id(metadata, &id).await?;
        Ok(id)
    }

    /// Insert `metadata` under `id`, ignoring any id the record carries.
    pub async fn insert_with_id(&self, metadata: &Metadata, id: &str) -> Result<()> {
        metadata.validate()?;
        let body = serde_json::to_value(metadata.to_doc())
            .map_err(|e| StateError::serialization(format!("backup metadata {id}"), e))?;
        let op = self
            .store
            .collection(&self.collection)
            .insert(id, body)
            .assert(Assertion::DocMissing);

        match self.store.run_transaction(vec![op]).await {
            Ok(_) => {
                tracing::info!(id, size = metadata.size(), "backup metadata added");
                Ok(())
            }
            Err(e) if e.is_aborted() => {
                Err(StateError::AlreadyExists(format!("backup metadata {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Exact-id lookup.
    pub async fn get(&self, id: &str) -> Result<Metadata> {
        let doc = self
            .store
            .collection(&self.collection)
            .get(id)
            .await?
            .ok_or_else(|| StateError::NotFound(format!("backup metadata {id}")))?;
        let doc: MetadataDoc = serde_json::from_value(Value::Object(doc))
            .map_err(|e| StateError::serialization(format!("backup metadata {id}"), e))?;
        Ok(Metadata::from_doc(id.to_string(), doc))
    }

    /// Record that the archive described by `id` has been stored.
    ///
    /// Only existence is asserted, so repeating the call is a no-op success.
    pub async fn set_stored(&self, id: &str) -> Result<()> {
        let mut set = Document::new();
        set.insert(STORED_FIELD.to_string(), Value::Bool(true));
        let op = self
            .store
            .collection(&self.collection)
            .update(id, set)
            .assert(Assertion::DocExists);

        match self.store.run_transaction(vec![op]).await {
            Ok(_) => {
                tracing::debug!(id, "backup marked stored");
                Ok(())
            }
            Err(e) if e.is_aborted() => {
                Err(StateError::NotFound(format!("backup metadata {id}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}
