use std::future::Future;

use serde_json::json;

use super::{count, machine_doc, seed_machines, TestResult, MACHINES, REMOVALS};
use crate::{Assertion, DocumentStore, Operation, StorageError};

pub(super) async fn run_atomic_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "atomic",
        "multi_collection_batch_all_visible",
        multi_collection_batch_all_visible(factory).await,
    ));
    results.push(TestResult::from_result(
        "atomic",
        "failed_assertion_rejects_whole_batch",
        failed_assertion_rejects_whole_batch(factory).await,
    ));
    results.push(TestResult::from_result(
        "atomic",
        "insert_collision_rejects_whole_batch",
        insert_collision_rejects_whole_batch(factory).await,
    ));
    results.push(TestResult::from_result(
        "atomic",
        "later_ops_see_earlier_ops",
        later_ops_see_earlier_ops(factory).await,
    ));
    results.push(TestResult::from_result(
        "atomic",
        "empty_batch_succeeds",
        empty_batch_succeeds(factory).await,
    ));

    results
}

// ── 1. Inserts and removes across collections land together ─────────────────

async fn multi_collection_batch_all_visible<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "dead")]).await?;

    let report = s
        .run_transaction(vec![
            Operation::remove(MACHINES, "0"),
            Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"})),
        ])
        .await
        .map_err(|e| format!("batch: {e}"))?;

    if report.applied != 2 {
        return Err(format!("expected 2 applied ops, got {}", report.applied));
    }
    if count(&s, MACHINES).await? != 0 {
        return Err("machine document survived the batch".into());
    }
    if count(&s, REMOVALS).await? != 1 {
        return Err("removal record missing after the batch".into());
    }
    Ok(())
}

// ── 2. One failing assertion means nothing is applied ───────────────────────

async fn failed_assertion_rejects_whole_batch<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "alive"), ("1", "dead")]).await?;

    let result = s
        .run_transaction(vec![
            Operation::remove(MACHINES, "1"),
            Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"})),
            Operation::check(MACHINES, "0", Assertion::field_equals("life", "dead")),
        ])
        .await;

    match result {
        Err(StorageError::AssertionFailed { index: 2, .. }) => {}
        other => return Err(format!("expected AssertionFailed at op 2, got {other:?}")),
    }
    if count(&s, MACHINES).await? != 2 {
        return Err("remove was applied despite the failed assertion".into());
    }
    if count(&s, REMOVALS).await? != 0 {
        return Err("insert was applied despite the failed assertion".into());
    }
    Ok(())
}

// ── 3. An aborting insert collision rolls back its siblings ─────────────────

async fn insert_collision_rejects_whole_batch<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "dead")]).await?;

    let result = s
        .run_transaction(vec![
            Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"})),
            Operation::insert(MACHINES, "0", machine_doc("0", "alive")),
        ])
        .await;

    match result {
        Err(StorageError::DocumentExists {
            index: 1,
            collection,
            doc_id,
        }) if collection == MACHINES && doc_id == "0" => {}
        other => return Err(format!("expected DocumentExists at op 1, got {other:?}")),
    }
    if count(&s, REMOVALS).await? != 0 {
        return Err("earlier insert survived the aborted batch".into());
    }
    Ok(())
}

// ── 4. Assertions observe the batch's own earlier writes ────────────────────

async fn later_ops_see_earlier_ops<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;

    s.run_transaction(vec![
        Operation::insert(MACHINES, "0", machine_doc("0", "alive")),
        Operation::update(MACHINES, "0", super::doc(json!({"life": "dead"}))),
        Operation::check(MACHINES, "0", Assertion::field_equals("life", "dead")),
    ])
    .await
    .map_err(|e| format!("batch: {e}"))?;

    let doc = s
        .get(MACHINES, "0")
        .await
        .map_err(|e| format!("get: {e}"))?
        .ok_or("machine missing after batch")?;
    if doc.get("life") != Some(&json!("dead")) {
        return Err(format!("expected life dead, got {:?}", doc.get("life")));
    }
    if doc.get("machineid") != Some(&json!("0")) {
        return Err("update dropped an untouched field".into());
    }
    Ok(())
}

// ── 5. Empty batch ──────────────────────────────────────────────────────────

async fn empty_batch_succeeds<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let report = s
        .run_transaction(Vec::new())
        .await
        .map_err(|e| format!("empty batch: {e}"))?;
    if report.applied != 0 || !report.kept_existing.is_empty() {
        return Err(format!("expected an empty report, got {report:?}"));
    }
    Ok(())
}
