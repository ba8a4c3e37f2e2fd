use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;
use crate::op::{Assertion, Document, Filter, Operation, TxnReport};

/// The storage trait for cluster state backends.
///
/// A `DocumentStore` holds named collections of JSON documents and applies
/// batches of [`Operation`]s atomically.
///
/// ## Batch Semantics
///
/// `run_transaction` applies every operation of the batch or none of them.
/// Operations are applied in order; each operation's assertion is checked
/// against the state left by the operations before it in the same batch.
///
/// - A failed assertion rejects the batch with
///   `StorageError::AssertionFailed`.
/// - An insert onto an existing id rejects the batch with
///   `StorageError::DocumentExists`, unless the insert was built with
///   [`Operation::keep_existing`], in which case it is skipped and listed in
///   [`TxnReport::kept_existing`].
/// - Updates and removes of a missing document without an assertion are
///   no-ops.
///
/// Implementations never retry; contention is reported to the caller.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one store can be
/// shared between concurrent workers behind an `Arc`.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Apply a batch of operations atomically.
    async fn run_transaction(&self, ops: Vec<Operation>) -> Result<TxnReport, StorageError>;

    /// Read one document by id.
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Document>, StorageError>;

    /// Read every document of `collection` matching `filter`, ordered by id.
    async fn find(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(String, Document)>, StorageError>;

    /// Acquire a handle scoped to one collection. The handle borrows the
    /// store and is released when dropped.
    fn collection<'s>(&'s self, name: &'s str) -> Collection<'s, Self>
    where
        Self: Sized,
    {
        Collection { store: self, name }
    }
}

/// A borrowed accessor for a single named collection.
///
/// Reads go straight to the store; writes are returned as [`Operation`]s so
/// that callers can combine them into one atomic batch.
pub struct Collection<'s, S: DocumentStore> {
    store: &'s S,
    name: &'s str,
}

impl<'s, S: DocumentStore> Collection<'s, S> {
    pub fn name(&self) -> &str {
        self.name
    }

    pub async fn get(&self, doc_id: &str) -> Result<Option<Document>, StorageError> {
        self.store.get(self.name, doc_id).await
    }

    pub async fn find(&self, filter: &Filter) -> Result<Vec<(String, Document)>, StorageError> {
        self.store.find(self.name, filter).await
    }

    pub async fn all(&self) -> Result<Vec<(String, Document)>, StorageError> {
        self.find(&Filter::All).await
    }

    pub fn insert(&self, doc_id: impl Into<String>, doc: impl Into<Value>) -> Operation {
        Operation::insert(self.name, doc_id, doc)
    }

    pub fn update(&self, doc_id: impl Into<String>, set: Document) -> Operation {
        Operation::update(self.name, doc_id, set)
    }

    pub fn remove(&self, doc_id: impl Into<String>) -> Operation {
        Operation::remove(self.name, doc_id)
    }

    pub fn check(&self, doc_id: impl Into<String>, assertion: Assertion) -> Operation {
        Operation::check(self.name, doc_id, assertion)
    }
}
