use std::future::Future;

use serde_json::json;

use super::{doc, seed_machines, TestResult, MACHINES, REMOVALS};
use crate::{Assertion, DocumentStore, Operation, StorageError};

pub(super) async fn run_assertion_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "assertion",
        "field_equals_passes_on_match",
        field_equals_passes_on_match(factory).await,
    ));
    results.push(TestResult::from_result(
        "assertion",
        "field_equals_fails_on_mismatch",
        field_equals_fails_on_mismatch(factory).await,
    ));
    results.push(TestResult::from_result(
        "assertion",
        "field_equals_fails_on_missing_doc",
        field_equals_fails_on_missing_doc(factory).await,
    ));
    results.push(TestResult::from_result(
        "assertion",
        "doc_exists_guards_update",
        doc_exists_guards_update(factory).await,
    ));
    results.push(TestResult::from_result(
        "assertion",
        "doc_missing_guards_insert",
        doc_missing_guards_insert(factory).await,
    ));
    results.push(TestResult::from_result(
        "assertion",
        "unasserted_update_of_missing_doc_is_noop",
        unasserted_update_of_missing_doc_is_noop(factory).await,
    ));

    results
}

// ── 1. FieldEquals holds ────────────────────────────────────────────────────

async fn field_equals_passes_on_match<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "dead")]).await?;

    s.run_transaction(vec![
        Operation::check(MACHINES, "0", Assertion::field_equals("life", "dead")),
        Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"})),
    ])
    .await
    .map(|_| ())
    .map_err(|e| format!("expected success, got {e}"))
}

// ── 2. FieldEquals mismatch carries the failing op ──────────────────────────

async fn field_equals_fails_on_mismatch<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "dying")]).await?;

    let expected = Assertion::field_equals("life", "dead");
    let result = s
        .run_transaction(vec![Operation::check(MACHINES, "0", expected.clone())])
        .await;
    match result {
        Err(StorageError::AssertionFailed {
            index,
            collection,
            doc_id,
            assertion,
        }) => {
            if index != 0 || collection != MACHINES || doc_id != "0" {
                return Err(format!(
                    "wrong failure location: op {index} on {collection}/{doc_id}"
                ));
            }
            if assertion != expected {
                return Err(format!("wrong assertion reported: {assertion}"));
            }
            Ok(())
        }
        other => Err(format!("expected AssertionFailed, got {other:?}")),
    }
}

// ── 3. FieldEquals implies existence ────────────────────────────────────────

async fn field_equals_fails_on_missing_doc<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .run_transaction(vec![Operation::check(
            MACHINES,
            "7",
            Assertion::field_equals("life", "dead"),
        )])
        .await;
    match result {
        Err(StorageError::AssertionFailed { .. }) => Ok(()),
        other => Err(format!("expected AssertionFailed, got {other:?}")),
    }
}

// ── 4. DocExists on an update ───────────────────────────────────────────────

async fn doc_exists_guards_update<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .run_transaction(vec![Operation::update(
            "backups",
            "spam",
            doc(json!({"stored": true})),
        )
        .assert(Assertion::DocExists)])
        .await;
    match result {
        Err(StorageError::AssertionFailed { assertion, .. })
            if assertion == Assertion::DocExists => {}
        other => return Err(format!("expected DocExists failure, got {other:?}")),
    }
    if s.get("backups", "spam")
        .await
        .map_err(|e| format!("get: {e}"))?
        .is_some()
    {
        return Err("asserted update created a document".into());
    }
    Ok(())
}

// ── 5. DocMissing on an insert ──────────────────────────────────────────────

async fn doc_missing_guards_insert<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.run_transaction(vec![Operation::insert(
        "backups",
        "b1",
        json!({"notes": "first"}),
    )])
    .await
    .map_err(|e| format!("first insert: {e}"))?;

    let result = s
        .run_transaction(vec![Operation::insert(
            "backups",
            "b1",
            json!({"notes": "second"}),
        )
        .assert(Assertion::DocMissing)])
        .await;
    match result {
        Err(StorageError::AssertionFailed { assertion, .. })
            if assertion == Assertion::DocMissing => {}
        other => return Err(format!("expected DocMissing failure, got {other:?}")),
    }

    let stored = s
        .get("backups", "b1")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("first document vanished")?;
    if stored.get("notes") != Some(&json!("first")) {
        return Err(format!("document was overwritten: {stored:?}"));
    }
    Ok(())
}

// ── 6. Unasserted update/remove of a missing doc ────────────────────────────

async fn unasserted_update_of_missing_doc_is_noop<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let report = s
        .run_transaction(vec![
            Operation::update("backups", "ghost", doc(json!({"stored": true}))),
            Operation::remove(REMOVALS, "m#ghost"),
        ])
        .await
        .map_err(|e| format!("expected success, got {e}"))?;
    if report.applied != 0 {
        return Err(format!("expected 0 applied ops, got {}", report.applied));
    }
    if s.get("backups", "ghost")
        .await
        .map_err(|e| format!("get: {e}"))?
        .is_some()
    {
        return Err("update of a missing document created it".into());
    }
    Ok(())
}
