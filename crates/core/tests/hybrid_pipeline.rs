use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use tempfile::tempdir;
use vecgraph_core::{
    CorpusStore, EngineConfig, ErrorKind, FailureResponse, FileStatus, HashEmbedder,
    HybridSearchRequest, IngestionPipeline, LocalBlobStore, MemoryBlobStore, MemoryStore,
    QueryEngine, SearchError,
};

type TestResult = Result<(), Box<dyn Error>>;

const MANUAL: &str = "The hydraulic pump feeds the main circuit at constant flow. \
Relief valves open when pressure exceeds forty bar and return oil to the tank. \
Filters must be replaced every five hundred hours of operation or sooner if clogged. \
The reservoir holds one hundred and twenty litres of mineral oil at all times. \
Hoses are inspected weekly for leaks, abrasion and loose fittings along the frame. ";

struct Harness {
    pipeline: IngestionPipeline<MemoryBlobStore, MemoryStore, HashEmbedder>,
    engine: QueryEngine<MemoryStore, HashEmbedder>,
    store: Arc<MemoryStore>,
}

fn harness(config: EngineConfig) -> Result<Harness, Box<dyn Error>> {
    let store = Arc::new(MemoryStore::new());
    let embedder = Arc::new(HashEmbedder::new(config.dimensions));
    let pipeline = IngestionPipeline::new(
        Arc::new(MemoryBlobStore::new()),
        Arc::clone(&store),
        Arc::clone(&embedder),
        config.clone(),
    )?;
    let engine = QueryEngine::new(Arc::clone(&store), embedder, config);
    Ok(Harness {
        pipeline,
        engine,
        store,
    })
}

fn search(
    file_id: &str,
    query: &str,
    vector_weight: f32,
    graph_weight: f32,
    top_k: usize,
) -> HybridSearchRequest {
    HybridSearchRequest {
        query: query.to_string(),
        file_id: file_id.to_string(),
        vector_weight,
        graph_weight,
        top_k,
    }
}

#[tokio::test]
async fn short_document_yields_single_isolated_node() -> TestResult {
    let h = harness(EngineConfig::default())?;
    let text = "Pumps move fluid through the main lines.";
    assert_eq!(text.chars().count(), 40);

    let request = h
        .pipeline
        .upload("short.txt", "text/plain", text.as_bytes())
        .await?;
    let response = h.pipeline.ingest(&request).await?;

    assert!(response.success);
    assert_eq!(response.nodes_created, 1);
    assert_eq!(response.edges_created, 0);

    let nodes = h.store.list_nodes(&request.file_id).await?;
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].content, text);
    assert_eq!(nodes[0].embedding.len(), 768);
    Ok(())
}

#[tokio::test]
async fn three_chunk_document_links_every_pair() -> TestResult {
    let h = harness(EngineConfig::default())?;
    let text = MANUAL.repeat(3);
    let chunk_count = text.chars().count().div_ceil(500);
    assert_eq!(chunk_count, 3);

    let request = h
        .pipeline
        .upload("manual.txt", "text/plain", text.as_bytes())
        .await?;
    let response = h.pipeline.ingest(&request).await?;

    assert_eq!(response.nodes_created, 3);
    assert!(response.edges_created <= 3 * 2);

    let nodes = h.store.list_nodes(&request.file_id).await?;
    let ids: Vec<String> = nodes.iter().map(|node| node.id.clone()).collect();
    let edges = h.store.edges_from(&request.file_id, &ids).await?;
    assert_eq!(edges.len(), response.edges_created);

    let pairs: HashSet<(&str, &str)> = edges
        .iter()
        .map(|edge| (edge.source_node_id.as_str(), edge.target_node_id.as_str()))
        .collect();
    assert_eq!(pairs.len(), edges.len());
    assert!(edges
        .iter()
        .all(|edge| edge.source_node_id != edge.target_node_id));

    let file = h
        .store
        .get_file(&request.file_id)
        .await?
        .ok_or("file record missing")?;
    assert_eq!(file.status, FileStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn vector_only_weighting_mirrors_vector_ranking() -> TestResult {
    let h = harness(EngineConfig {
        chunk_max_chars: 80,
        ..EngineConfig::default()
    })?;
    let request = h
        .pipeline
        .upload("manual.txt", "text/plain", MANUAL.as_bytes())
        .await?;
    let ingested = h.pipeline.ingest(&request).await?;

    let response = h
        .engine
        .search(&search(
            &request.file_id,
            "relief valve pressure",
            1.0,
            0.0,
            ingested.nodes_created,
        ))
        .await?;

    assert_eq!(response.vector_results.len(), ingested.nodes_created);
    for window in response.vector_results.windows(2) {
        assert!(window[0].vector_score >= window[1].vector_score);
    }

    let vector_order: Vec<&str> = response
        .vector_results
        .iter()
        .map(|result| result.node_id.as_str())
        .collect();
    let hybrid_order: Vec<&str> = response
        .hybrid_results
        .iter()
        .map(|result| result.node_id.as_str())
        .collect();
    assert_eq!(hybrid_order, vector_order);

    for (hybrid, vector) in response
        .hybrid_results
        .iter()
        .zip(response.vector_results.iter())
    {
        assert_eq!(hybrid.hybrid_score, vector.vector_score);
        assert!(!hybrid.label.is_empty());
    }
    Ok(())
}

#[tokio::test]
async fn searching_an_unknown_file_is_not_found() -> TestResult {
    let h = harness(EngineConfig::default())?;

    let error = match h
        .engine
        .search(&search("missing-file", "pump", 0.7, 0.3, 5))
        .await
    {
        Ok(_) => return Err("search over an empty file should fail".into()),
        Err(error) => error,
    };

    assert!(matches!(error, SearchError::EmptyCorpus { .. }));
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert_eq!(error.to_string(), "No nodes found for this file");

    let failure = FailureResponse::from_error(&error);
    assert_eq!(
        serde_json::to_value(&failure)?,
        serde_json::json!({ "success": false, "error": "No nodes found for this file" })
    );
    Ok(())
}

#[tokio::test]
async fn hybrid_search_expands_graph_and_logs_query() -> TestResult {
    let h = harness(EngineConfig {
        chunk_max_chars: 80,
        neighbors_k: 2,
        ..EngineConfig::default()
    })?;
    let request = h
        .pipeline
        .upload("manual.txt", "text/plain", MANUAL.as_bytes())
        .await?;
    let ingested = h.pipeline.ingest(&request).await?;
    assert!(ingested.nodes_created > 3);

    let response = h
        .engine
        .search(&search(&request.file_id, "hydraulic pump", 0.7, 0.3, 3))
        .await?;

    assert_eq!(response.vector_results.len(), 3);
    assert!(response.hybrid_results.len() <= 3);
    assert!(!response.graph_results.is_empty());

    let seeds: HashSet<&str> = response
        .vector_results
        .iter()
        .map(|result| result.node_id.as_str())
        .collect();
    for hit in &response.graph_results {
        assert_eq!(hit.distance, 1);
        assert!(seeds.contains(hit.source_node.as_str()));
        assert_eq!(hit.path, vec![hit.source_node.clone(), hit.node_id.clone()]);
        assert_eq!(hit.path_labels.len(), 2);
    }

    assert_eq!(
        response.graph_visualization.nodes.len(),
        ingested.nodes_created
    );
    let highlighted = response
        .graph_visualization
        .nodes
        .iter()
        .filter(|node| node.highlighted)
        .count();
    assert_eq!(highlighted, response.hybrid_results.len());

    let snapshot = h.store.snapshot().await;
    assert_eq!(snapshot.queries.len(), 1);
    assert_eq!(snapshot.queries[0].file_id, request.file_id);
    assert_eq!(snapshot.queries[0].query, "hydraulic pump");
    Ok(())
}

#[tokio::test]
async fn persisted_corpus_survives_reopen() -> TestResult {
    let dir = tempdir()?;
    let snapshot_path = dir.path().join("corpus.json");
    let config = EngineConfig::default();
    let embedder = Arc::new(HashEmbedder::new(config.dimensions));

    let file_id = {
        let store = Arc::new(MemoryStore::open(&snapshot_path).await?);
        let blobs = Arc::new(LocalBlobStore::new(dir.path().join("blobs")));
        let pipeline =
            IngestionPipeline::new(blobs, store, Arc::clone(&embedder), config.clone())?;
        let request = pipeline
            .upload("manual.txt", "text/plain", MANUAL.as_bytes())
            .await?;
        pipeline.ingest(&request).await?;
        request.file_id
    };

    let reopened = Arc::new(MemoryStore::open(&snapshot_path).await?);
    let files = reopened.list_files().await?;
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].status, FileStatus::Completed);

    let engine = QueryEngine::new(reopened, embedder, config);
    let response = engine
        .search(&search(&file_id, "filters", 0.7, 0.3, 5))
        .await?;
    assert!(!response.hybrid_results.is_empty());
    Ok(())
}
