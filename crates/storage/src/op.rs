use std::fmt;

use serde_json::{Map, Value};

/// A stored document: a JSON object keyed by top-level field name.
pub type Document = Map<String, Value>;

/// A precondition on a document's current state.
///
/// Assertions are checked when the batch is applied; if any fails the whole
/// batch is rejected with [`StorageError::AssertionFailed`](crate::StorageError).
#[derive(Debug, Clone, PartialEq)]
pub enum Assertion {
    /// The document must exist.
    DocExists,
    /// The document must not exist.
    DocMissing,
    /// The document must exist and its top-level `field` must equal `value`.
    FieldEquals { field: String, value: Value },
}

impl Assertion {
    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Assertion::FieldEquals {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Evaluate the assertion against the current document (None if absent).
    pub fn holds(&self, current: Option<&Document>) -> bool {
        match (self, current) {
            (Assertion::DocExists, doc) => doc.is_some(),
            (Assertion::DocMissing, doc) => doc.is_none(),
            (Assertion::FieldEquals { field, value }, Some(doc)) => doc.get(field) == Some(value),
            (Assertion::FieldEquals { .. }, None) => false,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::DocExists => write!(f, "doc-exists"),
            Assertion::DocMissing => write!(f, "doc-missing"),
            Assertion::FieldEquals { field, value } => write!(f, "{field} == {value}"),
        }
    }
}

/// What an insert does when the target id is already taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnConflict {
    /// Reject the whole batch with `DocumentExists`.
    #[default]
    Abort,
    /// Leave the existing document alone, apply the rest of the batch, and
    /// report the skip in the [`TxnReport`].
    KeepExisting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    Insert { doc: Value, on_conflict: OnConflict },
    /// Set the given top-level fields, leaving the others untouched.
    Update(Document),
    Remove,
}

/// A single document change inside an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub collection: String,
    pub doc_id: String,
    pub kind: OpKind,
    pub assertion: Option<Assertion>,
}

impl Operation {
    pub fn insert(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        doc: impl Into<Value>,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            kind: OpKind::Insert {
                doc: doc.into(),
                on_conflict: OnConflict::Abort,
            },
            assertion: None,
        }
    }

    pub fn update(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        set: Document,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            kind: OpKind::Update(set),
            assertion: None,
        }
    }

    pub fn remove(collection: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            kind: OpKind::Remove,
            assertion: None,
        }
    }

    /// Attach a precondition to this operation.
    pub fn assert(mut self, assertion: Assertion) -> Self {
        self.assertion = Some(assertion);
        self
    }

    /// Turn an insert into an idempotent one: an id collision is reported
    /// instead of aborting the batch. No effect on other kinds.
    pub fn keep_existing(mut self) -> Self {
        if let OpKind::Insert { on_conflict, .. } = &mut self.kind {
            *on_conflict = OnConflict::KeepExisting;
        }
        self
    }

    /// An operation that only checks a precondition and changes nothing.
    pub fn check(
        collection: impl Into<String>,
        doc_id: impl Into<String>,
        assertion: Assertion,
    ) -> Self {
        Self {
            collection: collection.into(),
            doc_id: doc_id.into(),
            kind: OpKind::Update(Document::new()),
            assertion: Some(assertion),
        }
    }
}

/// Identifies a document within the store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocRef {
    pub collection: String,
    pub doc_id: String,
}

/// Outcome of a successfully applied batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxnReport {
    /// Number of operations that changed a document.
    pub applied: usize,
    /// `KeepExisting` inserts that found their id already taken.
    pub kept_existing: Vec<DocRef>,
}

impl TxnReport {
    pub fn was_kept(&self, collection: &str, doc_id: &str) -> bool {
        self.kept_existing
            .iter()
            .any(|r| r.collection == collection && r.doc_id == doc_id)
    }
}

/// Narrow read filters; deliberately not a query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    All,
    IdIn(Vec<String>),
    FieldEquals { field: String, value: Value },
    FieldIn { field: String, values: Vec<Value> },
}

impl Filter {
    pub fn field_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::FieldIn {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, doc_id: &str, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::IdIn(ids) => ids.iter().any(|id| id == doc_id),
            Filter::FieldEquals { field, value } => doc.get(field) == Some(value),
            Filter::FieldIn { field, values } => doc
                .get(field)
                .is_some_and(|actual| values.iter().any(|v| v == actual)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn field_equals_requires_existence() {
        let a = Assertion::field_equals("life", "dead");
        assert!(!a.holds(None));
        assert!(a.holds(Some(&doc(json!({"life": "dead"})))));
        assert!(!a.holds(Some(&doc(json!({"life": "alive"})))));
    }

    #[test]
    fn keep_existing_only_affects_inserts() {
        let op = Operation::remove("c", "x").keep_existing();
        assert_eq!(op.kind, OpKind::Remove);

        let op = Operation::insert("c", "x", json!({})).keep_existing();
        assert!(matches!(
            op.kind,
            OpKind::Insert {
                on_conflict: OnConflict::KeepExisting,
                ..
            }
        ));
    }

    #[test]
    fn field_in_matches_any_listed_value() {
        let f = Filter::field_in("machineid", ["0", "2"]);
        assert!(f.matches("a", &doc(json!({"machineid": "2"}))));
        assert!(!f.matches("a", &doc(json!({"machineid": "1"}))));
        assert!(!f.matches("a", &doc(json!({}))));
    }
}
