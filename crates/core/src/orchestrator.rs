use crate::config::EngineConfig;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::labels::{derive_label, extract_matching_sentence, extract_matching_words, tokenize};
use crate::models::{
    CombinedResult, Edge, GraphResult, GraphVisualization, HybridResult, HybridSearchRequest,
    HybridSearchResponse, Node, QueryLog, VectorResult, VisualLink, VisualNode, HYBRID_QUERY_TYPE,
};
use crate::similarity::{rank_scores, EmbeddingArena, Neighbor};
use crate::traits::CorpusStore;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Answers hybrid searches: vector ranking, one-hop graph expansion, then linear fusion.
///
/// Read-only against the corpus apart from the audit log, so one engine can serve
/// concurrent requests.
pub struct QueryEngine<S, E>
where
    S: CorpusStore,
    E: Embedder,
{
    store: Arc<S>,
    embedder: Arc<E>,
    config: EngineConfig,
}

impl<S, E> QueryEngine<S, E>
where
    S: CorpusStore + 'static,
    E: Embedder + 'static,
{
    pub fn new(store: Arc<S>, embedder: Arc<E>, config: EngineConfig) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    pub async fn search(
        &self,
        request: &HybridSearchRequest,
    ) -> Result<HybridSearchResponse, SearchError> {
        let started = Instant::now();
        validate_request(request)?;

        let nodes = self.store.list_nodes(&request.file_id).await?;
        if nodes.is_empty() {
            return Err(SearchError::EmptyCorpus {
                file_id: request.file_id.clone(),
            });
        }

        let ranked = self.rank_nodes(&nodes, &request.query).await?;

        let vector_results: Vec<VectorResult> = ranked
            .iter()
            .take(request.top_k)
            .map(|neighbor| {
                let node = &nodes[neighbor.index];
                VectorResult {
                    node_id: node.id.clone(),
                    node_type: node.node_type.clone(),
                    content: node.content.clone(),
                    vector_score: neighbor.similarity,
                }
            })
            .collect();

        let seed_ids: Vec<String> = vector_results
            .iter()
            .map(|result| result.node_id.clone())
            .collect();
        let edges = self.store.edges_from(&request.file_id, &seed_ids).await?;
        let extra_nodes = self.fetch_unknown_targets(&nodes, &edges).await?;

        let lookup: HashMap<&str, &Node> = nodes
            .iter()
            .chain(extra_nodes.iter())
            .map(|node| (node.id.as_str(), node))
            .collect();
        let labels: HashMap<&str, String> = lookup
            .iter()
            .map(|(id, node)| (*id, derive_label(node)))
            .collect();

        let query_tokens = tokenize(&request.query);
        let graph_results = expand_one_hop(&edges, &lookup, &labels, &query_tokens);

        let combined = fuse_results(&vector_results, &graph_results);
        let hybrid_results = rank_hybrid(
            combined,
            request.vector_weight,
            request.graph_weight,
            request.top_k,
            &lookup,
            &labels,
        );

        let graph_visualization = build_visualization(
            nodes.iter().chain(extra_nodes.iter()),
            &edges,
            &labels,
            &hybrid_results,
        );

        debug!(
            file_id = %request.file_id,
            corpus_size = nodes.len(),
            vector_hits = vector_results.len(),
            graph_hits = graph_results.len(),
            hybrid_hits = hybrid_results.len(),
            "hybrid search assembled"
        );

        self.record_query(request, &hybrid_results, started).await;

        Ok(HybridSearchResponse {
            vector_results,
            graph_results,
            hybrid_results,
            graph_visualization,
        })
    }

    /// Embeds the query and scores every node on a blocking worker, bounded by the deadline.
    async fn rank_nodes(&self, nodes: &[Node], query: &str) -> Result<Vec<Neighbor>, SearchError> {
        let mut arena = EmbeddingArena::with_capacity(self.embedder.dimensions(), nodes.len());
        for node in nodes {
            arena.push(&node.embedding)?;
        }

        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        let scan = tokio::task::spawn_blocking(move || {
            let query_vector = embedder.embed_checked(&query)?;
            arena
                .scores_against(&query_vector)
                .map(|scores| rank_scores(&scores))
        });

        let joined = match self.config.query_deadline {
            Some(deadline) => tokio::time::timeout(deadline, scan)
                .await
                .map_err(|_| SearchError::DeadlineExceeded(deadline))?,
            None => scan.await,
        };

        Ok(joined.map_err(|error| SearchError::Worker(error.to_string()))??)
    }

    async fn fetch_unknown_targets(
        &self,
        nodes: &[Node],
        edges: &[Edge],
    ) -> Result<Vec<Node>, SearchError> {
        let known: HashSet<&str> = nodes.iter().map(|node| node.id.as_str()).collect();
        let mut missing: Vec<String> = Vec::new();
        for edge in edges {
            let target = edge.target_node_id.as_str();
            if !known.contains(target) && !missing.iter().any(|id| id == target) {
                missing.push(target.to_string());
            }
        }

        if missing.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.store.get_nodes(&missing).await?)
    }

    async fn record_query(
        &self,
        request: &HybridSearchRequest,
        hybrid_results: &[HybridResult],
        started: Instant,
    ) {
        let results = match serde_json::to_value(hybrid_results) {
            Ok(value) => value,
            Err(error) => {
                warn!(error = %error, "could not snapshot hybrid results");
                serde_json::Value::Null
            }
        };

        let log = QueryLog {
            id: Uuid::new_v4().to_string(),
            file_id: request.file_id.clone(),
            query: request.query.clone(),
            query_type: HYBRID_QUERY_TYPE.to_string(),
            results,
            execution_time_ms: started.elapsed().as_millis() as u64,
            created_at: Utc::now(),
        };

        if let Err(error) = self.store.insert_query_log(&log).await {
            warn!(file_id = %request.file_id, error = %error, "could not write query log");
        }
    }
}

fn validate_request(request: &HybridSearchRequest) -> Result<(), SearchError> {
    if request.query.trim().is_empty() {
        return Err(SearchError::Validation("query is required".to_string()));
    }
    if request.file_id.trim().is_empty() {
        return Err(SearchError::Validation("file id is required".to_string()));
    }
    for (name, weight) in [
        ("vectorWeight", request.vector_weight),
        ("graphWeight", request.graph_weight),
    ] {
        if !(0.0..=1.0).contains(&weight) {
            return Err(SearchError::Validation(format!(
                "{name} must be within [0, 1], got {weight}"
            )));
        }
    }
    if request.top_k == 0 {
        return Err(SearchError::Validation("topK must be at least 1".to_string()));
    }
    Ok(())
}

/// One result per seed edge; edges pointing at unknown nodes are dropped.
fn expand_one_hop(
    edges: &[Edge],
    lookup: &HashMap<&str, &Node>,
    labels: &HashMap<&str, String>,
    query_tokens: &HashSet<String>,
) -> Vec<GraphResult> {
    edges
        .iter()
        .filter_map(|edge| {
            let Some(target) = lookup.get(edge.target_node_id.as_str()) else {
                warn!(edge_id = %edge.id, target = %edge.target_node_id, "edge target missing");
                return None;
            };
            let label_of = |id: &str| labels.get(id).cloned().unwrap_or_else(|| id.to_string());

            Some(GraphResult {
                node_id: edge.target_node_id.clone(),
                source_node: edge.source_node_id.clone(),
                graph_score: edge.weight,
                distance: 1,
                path: vec![edge.source_node_id.clone(), edge.target_node_id.clone()],
                path_labels: vec![
                    label_of(&edge.source_node_id),
                    label_of(&edge.target_node_id),
                ],
                matching_sentence: extract_matching_sentence(&target.content, query_tokens),
                matching_words: extract_matching_words(&target.content, query_tokens),
            })
        })
        .collect()
}

/// Merges vector and graph hits by node id, keeping first-seen order.
///
/// A node's graph score is the strongest incoming seed edge; `connections` counts those edges.
pub fn fuse_results(
    vector_results: &[VectorResult],
    graph_results: &[GraphResult],
) -> Vec<CombinedResult> {
    let mut table = FusionTable::default();

    for result in vector_results {
        let (entry, _) = table.entry(&result.node_id);
        entry.vector_score = result.vector_score;
    }

    for result in graph_results {
        let (entry, has_graph_score) = table.entry(&result.node_id);
        entry.graph_score = if *has_graph_score {
            entry.graph_score.max(result.graph_score)
        } else {
            result.graph_score
        };
        *has_graph_score = true;
        entry.connections += 1;
    }

    table.rows.into_iter().map(|(row, _)| row).collect()
}

#[derive(Default)]
struct FusionTable {
    rows: Vec<(CombinedResult, bool)>,
    positions: HashMap<String, usize>,
}

impl FusionTable {
    fn entry(&mut self, node_id: &str) -> (&mut CombinedResult, &mut bool) {
        let position = match self.positions.get(node_id) {
            Some(position) => *position,
            None => {
                self.rows.push((
                    CombinedResult {
                        node_id: node_id.to_string(),
                        vector_score: 0.0,
                        graph_score: 0.0,
                        connections: 0,
                    },
                    false,
                ));
                self.positions.insert(node_id.to_string(), self.rows.len() - 1);
                self.rows.len() - 1
            }
        };
        let (row, has_graph_score) = &mut self.rows[position];
        (row, has_graph_score)
    }
}

pub fn hybrid_score(result: &CombinedResult, vector_weight: f32, graph_weight: f32) -> f32 {
    result.vector_score * vector_weight + result.graph_score * graph_weight
}

fn rank_hybrid(
    combined: Vec<CombinedResult>,
    vector_weight: f32,
    graph_weight: f32,
    top_k: usize,
    lookup: &HashMap<&str, &Node>,
    labels: &HashMap<&str, String>,
) -> Vec<HybridResult> {
    let mut hybrid: Vec<HybridResult> = combined
        .into_iter()
        .map(|result| {
            let node = lookup.get(result.node_id.as_str());
            HybridResult {
                hybrid_score: hybrid_score(&result, vector_weight, graph_weight),
                node_type: node.map(|node| node.node_type.clone()).unwrap_or_default(),
                content: node.map(|node| node.content.clone()).unwrap_or_default(),
                label: labels
                    .get(result.node_id.as_str())
                    .cloned()
                    .unwrap_or_else(|| result.node_id.clone()),
                node_id: result.node_id,
                vector_score: result.vector_score,
                graph_score: result.graph_score,
                connections: result.connections,
            }
        })
        .collect();

    // Stable: equal scores keep fusion order.
    hybrid.sort_by(|left, right| right.hybrid_score.total_cmp(&left.hybrid_score));
    hybrid.truncate(top_k);
    hybrid
}

fn build_visualization<'a>(
    nodes: impl Iterator<Item = &'a Node>,
    edges: &[Edge],
    labels: &HashMap<&str, String>,
    hybrid_results: &[HybridResult],
) -> GraphVisualization {
    let highlighted: HashSet<&str> = hybrid_results
        .iter()
        .map(|result| result.node_id.as_str())
        .collect();

    GraphVisualization {
        nodes: nodes
            .map(|node| VisualNode {
                id: node.id.clone(),
                label: labels
                    .get(node.id.as_str())
                    .cloned()
                    .unwrap_or_else(|| derive_label(node)),
                node_type: node.node_type.clone(),
                content: node.content.clone(),
                highlighted: highlighted.contains(node.id.as_str()),
            })
            .collect(),
        links: edges
            .iter()
            .map(|edge| VisualLink {
                id: edge.id.clone(),
                source: edge.source_node_id.clone(),
                target: edge.target_node_id.clone(),
                weight: edge.weight,
                edge_type: edge.edge_type.clone(),
            })
            .collect(),
    }
}
