mod common;

use std::sync::Arc;

use berkshire_rag::rag::VectorStore;
use berkshire_rag::tools::RetrievalTool;
use common::{letter, Harness, INDEX};
use serde_json::json;

async fn ingested_tool() -> (Harness, RetrievalTool) {
    let harness = Harness::new().await;
    harness.write_letter("2018.pdf", &letter(2018, "insurance"));
    harness.write_letter("2019.pdf", &letter(2019, "railroads"));
    harness.write_letter("2020.pdf", &letter(2020, "utilities"));
    harness.pipeline(10).run(&harness.source).await.unwrap();

    let store: Arc<dyn VectorStore> = harness.store.clone();
    let tool = RetrievalTool::new(harness.llm.clone(), store, INDEX, 5, 20).unwrap();
    (harness, tool)
}

#[tokio::test]
async fn top_three_results_are_ranked() {
    let (_harness, tool) = ingested_tool().await;

    let output = tool.search("railroads results", Some(3)).await.unwrap();

    assert_eq!(output.results.len(), 3);
    assert_eq!(output.total_found, 3);
    for pair in output.results.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    for result in &output.results {
        assert!(!result.year.is_empty());
        assert!(result.source.ends_with(".pdf"));
    }
    assert_eq!(output.results[0].year, "2019");
}

#[tokio::test]
async fn blank_and_malformed_queries_stay_well_formed() {
    let (_harness, tool) = ingested_tool().await;

    let empty = tool.search("", Some(5)).await.unwrap();
    assert!(empty.results.is_empty());
    assert_eq!(empty.total_found, 0);

    let rendered = serde_json::to_value(&empty).unwrap();
    assert_eq!(rendered, json!({ "results": [], "totalFound": 0 }));

    assert!(tool.call(&json!({ "query": ["not", "a", "string"] })).await.is_err());
    assert!(tool.call(&json!("just a string")).await.is_err());
}

#[tokio::test]
async fn mismatched_embedding_model_is_refused() {
    let (harness, _tool) = ingested_tool().await;

    let other = berkshire_rag::llm::LlmService::new(
        Arc::new(common::BagOfWordsProvider),
        "gpt-4o",
        "some-other-embedding",
        common::DIMENSION,
    );
    let store: Arc<dyn VectorStore> = harness.store.clone();
    let tool = RetrievalTool::new(other, store, INDEX, 5, 20).unwrap();

    let err = tool.search("insurance", None).await.unwrap_err();
    assert!(err.to_string().contains("reindex"));
}

#[tokio::test]
async fn searching_does_not_bind_an_unbound_index() {
    let harness = Harness::new().await;
    harness
        .store
        .create_index(INDEX, common::DIMENSION)
        .await
        .unwrap();

    let store: Arc<dyn VectorStore> = harness.store.clone();
    let tool = RetrievalTool::new(harness.llm.clone(), store, INDEX, 5, 20).unwrap();
    let output = tool.search("float", None).await.unwrap();

    assert!(output.results.is_empty());
    assert_eq!(harness.store.embedding_model(INDEX).await.unwrap(), None);
}
