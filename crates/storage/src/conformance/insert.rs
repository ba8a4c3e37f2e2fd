use std::future::Future;

use serde_json::json;

use super::{count, seed_machines, TestResult, MACHINES, REMOVALS};
use crate::{Assertion, DocumentStore, Operation, StorageError};

pub(super) async fn run_insert_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "insert",
        "insert_then_get_roundtrip",
        insert_then_get_roundtrip(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "keep_existing_reports_collision",
        keep_existing_reports_collision(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "keep_existing_still_applies_siblings",
        keep_existing_still_applies_siblings(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "keep_existing_still_checks_other_assertions",
        keep_existing_still_checks_other_assertions(factory).await,
    ));
    results.push(TestResult::from_result(
        "insert",
        "non_object_document_rejected",
        non_object_document_rejected(factory).await,
    ));

    results
}

// ── 1. Round trip ───────────────────────────────────────────────────────────

async fn insert_then_get_roundtrip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let body = json!({"notes": "N", "size": 42, "stored": false});
    s.run_transaction(vec![Operation::insert("backups", "b1", body.clone())])
        .await
        .map_err(|e| format!("insert: {e}"))?;
    let stored = s
        .get("backups", "b1")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("inserted document not found")?;
    if serde_json::Value::Object(stored.clone()) != body {
        return Err(format!("document changed in storage: {stored:?}"));
    }
    Ok(())
}

// ── 2. KeepExisting collision is reported, not raised ───────────────────────

async fn keep_existing_reports_collision<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mark = || Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"})).keep_existing();

    let first = s
        .run_transaction(vec![mark()])
        .await
        .map_err(|e| format!("first mark: {e}"))?;
    if first.was_kept(REMOVALS, "m#0") {
        return Err("first insert reported a collision".into());
    }
    let second = s
        .run_transaction(vec![mark()])
        .await
        .map_err(|e| format!("second mark: {e}"))?;
    if !second.was_kept(REMOVALS, "m#0") {
        return Err(format!("second insert not reported as kept: {second:?}"));
    }
    if count(&s, REMOVALS).await? != 1 {
        return Err("duplicate insert created a second document".into());
    }
    Ok(())
}

// ── 3. KeepExisting does not abort the rest of the batch ────────────────────

async fn keep_existing_still_applies_siblings<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.run_transaction(vec![Operation::insert(
        REMOVALS,
        "m#0",
        json!({"machine-id": "0"}),
    )])
    .await
    .map_err(|e| format!("seed: {e}"))?;

    let report = s
        .run_transaction(vec![
            Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"})).keep_existing(),
            Operation::insert(REMOVALS, "m#1", json!({"machine-id": "1"})),
        ])
        .await
        .map_err(|e| format!("batch: {e}"))?;
    if report.applied != 1 {
        return Err(format!("expected 1 applied op, got {}", report.applied));
    }
    if count(&s, REMOVALS).await? != 2 {
        return Err("sibling insert was not applied".into());
    }
    Ok(())
}

// ── 4. KeepExisting does not swallow other failures ─────────────────────────

async fn keep_existing_still_checks_other_assertions<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "alive")]).await?;

    let result = s
        .run_transaction(vec![
            Operation::check(MACHINES, "0", Assertion::field_equals("life", "dead")),
            Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"})).keep_existing(),
        ])
        .await;
    match result {
        Err(StorageError::AssertionFailed { index: 0, .. }) => {}
        other => return Err(format!("expected AssertionFailed at op 0, got {other:?}")),
    }
    if count(&s, REMOVALS).await? != 0 {
        return Err("insert applied despite failed assertion".into());
    }
    Ok(())
}

// ── 5. Documents must be objects ────────────────────────────────────────────

async fn non_object_document_rejected<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let result = s
        .run_transaction(vec![Operation::insert("backups", "b1", json!([1, 2, 3]))])
        .await;
    match result {
        Err(StorageError::InvalidDocument { .. }) => Ok(()),
        other => Err(format!("expected InvalidDocument, got {other:?}")),
    }
}
