use std::future::Future;
use std::sync::Arc;

use serde_json::json;

use super::{count, seed_machines, TestResult, MACHINES, REMOVALS};
use crate::{Assertion, DocumentStore, Operation, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_asserted_inserts_exactly_one_wins",
        concurrent_asserted_inserts_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_keep_existing_inserts_create_one",
        concurrent_keep_existing_inserts_create_one(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_removes_exactly_one_applies",
        concurrent_removes_exactly_one_applies(factory).await,
    ));

    results
}

// ── Asserted inserts of the same id: exactly one wins ───────────────────────

/// N tasks race to insert the same id guarded by `DocMissing`. Exactly one
/// commit succeeds; the rest must see `AssertionFailed`.
async fn concurrent_asserted_inserts_exactly_one_wins<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let op = Operation::insert("backups", "b1", json!({"writer": i}))
                .assert(Assertion::DocMissing);
            match s.run_transaction(vec![op]).await {
                Ok(_) => Ok(true),
                Err(StorageError::AssertionFailed { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Idempotent inserts of the same id: one document, all succeed ────────────

async fn concurrent_keep_existing_inserts_create_one<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_machines(storage.as_ref(), &[("0", "dead")]).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let report = s
                .run_transaction(vec![
                    Operation::check(MACHINES, "0", Assertion::field_equals("life", "dead")),
                    Operation::insert(REMOVALS, "m#0", json!({"machine-id": "0"}))
                        .keep_existing(),
                ])
                .await?;
            Ok::<bool, StorageError>(report.was_kept(REMOVALS, "m#0"))
        }));
    }

    let mut created = 0usize;
    for (i, handle) in handles.into_iter().enumerate() {
        let kept = handle
            .await
            .map_err(|e| format!("task {i} panic: {e}"))?
            .map_err(|e| format!("task {i} failed: {e}"))?;
        if !kept {
            created += 1;
        }
    }

    if created != 1 {
        return Err(format!("expected exactly 1 creating task, got {created}"));
    }
    if count(storage.as_ref(), REMOVALS).await? != 1 {
        return Err("expected exactly one removal document".into());
    }
    Ok(())
}

// ── Guarded removes of the same doc: exactly one applies ────────────────────

/// N tasks race to remove the same machine, each asserting it is still dead.
/// The first removal wins; later ones find the document gone.
async fn concurrent_removes_exactly_one_applies<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let storage = Arc::new(factory().await);
    seed_machines(storage.as_ref(), &[("0", "dead")]).await?;

    let mut handles = Vec::new();
    for _ in 0..N {
        let s = storage.clone();
        handles.push(tokio::spawn(async move {
            let op =
                Operation::remove(MACHINES, "0").assert(Assertion::field_equals("life", "dead"));
            match s.run_transaction(vec![op]).await {
                Ok(report) => Ok(report.applied == 1),
                Err(StorageError::AssertionFailed { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut applied = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            applied += 1;
        }
    }

    if applied != 1 {
        return Err(format!("expected exactly 1 applied removal, got {applied}"));
    }
    if count(storage.as_ref(), MACHINES).await? != 0 {
        return Err("machine document survived the race".into());
    }
    Ok(())
}
