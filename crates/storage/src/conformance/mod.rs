//! Conformance test suite for `DocumentStore` implementations.
//!
//! This module provides a backend-agnostic test suite that any
//! `DocumentStore` implementation can run to verify correctness. The suite
//! covers:
//!
//! - **Atomicity**: all-or-nothing semantics for multi-document batches
//! - **Assertions**: existence and field-equality preconditions
//! - **Inserts**: id collisions, both aborting and keep-existing
//! - **Queries**: filtered reads and id ordering
//! - **Concurrency**: racing batches on the same document, exactly one wins
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty store for each test:
//!
//! ```ignore
//! use cluster_state_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn mongo_conformance() {
//!     let report = run_conformance_suite(|| async {
//!         create_test_mongo_store().await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod assertion;
mod atomic;
mod concurrent;
mod insert;
mod query;

use std::fmt;
use std::future::Future;

use serde_json::{json, Value};

use crate::{Document, DocumentStore, Operation};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "atomic", "assertion", "insert").
    pub category: String,
    /// Test name (e.g. "failed_assertion_rejects_whole_batch").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// store, ensuring test isolation.
pub async fn run_conformance_suite<S, F, Fut>(factory: F) -> ConformanceReport
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.extend(atomic::run_atomic_tests(&factory).await);
    results.extend(assertion::run_assertion_tests(&factory).await);
    results.extend(insert::run_insert_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: fixtures shared by the categories ──────────────────────────────

const MACHINES: &str = "machines";
const REMOVALS: &str = "machine-removals";

fn machine_doc(id: &str, life: &str) -> Value {
    json!({ "machineid": id, "life": life })
}

/// Unwrap a `json!` object literal into a document.
fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Seed the store with machines in the given lifecycle states.
async fn seed_machines<S: DocumentStore>(s: &S, machines: &[(&str, &str)]) -> Result<(), String> {
    let ops = machines
        .iter()
        .map(|(id, life)| Operation::insert(MACHINES, *id, machine_doc(id, life)))
        .collect();
    s.run_transaction(ops)
        .await
        .map(|_| ())
        .map_err(|e| format!("seed machines: {e}"))
}

async fn count<S: DocumentStore>(s: &S, collection: &str) -> Result<usize, String> {
    s.collection(collection)
        .all()
        .await
        .map(|docs| docs.len())
        .map_err(|e| format!("count {collection}: {e}"))
}
