use std::future::Future;

use serde_json::json;

use super::{seed_machines, TestResult, MACHINES};
use crate::{DocumentStore, Filter};

pub(super) async fn run_query_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "query",
        "find_all_ordered_by_id",
        find_all_ordered_by_id(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "find_field_in_selects_subset",
        find_field_in_selects_subset(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "find_field_equals",
        find_field_equals(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "find_on_unknown_collection_is_empty",
        find_on_unknown_collection_is_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "query",
        "get_missing_is_none",
        get_missing_is_none(factory).await,
    ));

    results
}

fn ids(docs: &[(String, crate::Document)]) -> Vec<&str> {
    docs.iter().map(|(id, _)| id.as_str()).collect()
}

async fn find_all_ordered_by_id<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("2", "alive"), ("0", "dead"), ("1", "dying")]).await?;
    let docs = s
        .find(MACHINES, &Filter::All)
        .await
        .map_err(|e| format!("find: {e}"))?;
    if ids(&docs) != ["0", "1", "2"] {
        return Err(format!("expected ids [0, 1, 2], got {:?}", ids(&docs)));
    }
    Ok(())
}

async fn find_field_in_selects_subset<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "dead"), ("1", "dead"), ("2", "dead")]).await?;
    let docs = s
        .find(MACHINES, &Filter::field_in("machineid", ["2", "0", "9"]))
        .await
        .map_err(|e| format!("find: {e}"))?;
    if ids(&docs) != ["0", "2"] {
        return Err(format!("expected ids [0, 2], got {:?}", ids(&docs)));
    }
    Ok(())
}

async fn find_field_equals<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    seed_machines(&s, &[("0", "dead"), ("1", "alive")]).await?;
    let filter = Filter::FieldEquals {
        field: "life".into(),
        value: json!("alive"),
    };
    let docs = s
        .find(MACHINES, &filter)
        .await
        .map_err(|e| format!("find: {e}"))?;
    if ids(&docs) != ["1"] {
        return Err(format!("expected ids [1], got {:?}", ids(&docs)));
    }
    Ok(())
}

async fn find_on_unknown_collection_is_empty<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let docs = s
        .find("nothing-here", &Filter::IdIn(vec!["0".into()]))
        .await
        .map_err(|e| format!("find: {e}"))?;
    if !docs.is_empty() {
        return Err(format!("expected no documents, got {}", docs.len()));
    }
    Ok(())
}

async fn get_missing_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: DocumentStore,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get(MACHINES, "42").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}
