use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type NodeMetadata = Map<String, Value>;

pub const TEXT_NODE_TYPE: &str = "text";
pub const SIMILARITY_EDGE_TYPE: &str = "similarity";
pub const HYBRID_QUERY_TYPE: &str = "hybrid";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub status: FileStatus,
    pub size: u64,
    #[serde(rename = "type")]
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FileRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        file_type: impl Into<String>,
        size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: FileStatus::Processing,
            size,
            file_type: file_type.into(),
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Location of the raw upload inside the blob store.
    pub fn blob_path(&self) -> String {
        blob_path(&self.id, &self.name)
    }
}

pub fn blob_path(file_id: &str, file_name: &str) -> String {
    format!("{file_id}/{file_name}")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    pub file_id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub chunk_index: usize,
    pub content: String,
    pub embedding: Vec<f32>,
    #[serde(default)]
    pub metadata: NodeMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: String,
    pub file_id: String,
    pub source_node_id: String,
    pub target_node_id: String,
    pub weight: f32,
    #[serde(rename = "type")]
    pub edge_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryLog {
    pub id: String,
    pub file_id: String,
    pub query: String,
    #[serde(rename = "type")]
    pub query_type: String,
    pub results: Value,
    pub execution_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VectorResult {
    pub node_id: String,
    pub node_type: String,
    pub content: String,
    pub vector_score: f32,
}

/// One-hop neighbor reached through a single outgoing edge of a vector seed.
///
/// `distance` is always 1: only direct neighbors are expanded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GraphResult {
    pub node_id: String,
    pub source_node: String,
    pub graph_score: f32,
    pub distance: u32,
    pub path: Vec<String>,
    pub path_labels: Vec<String>,
    pub matching_sentence: Option<String>,
    pub matching_words: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResult {
    pub node_id: String,
    pub vector_score: f32,
    pub graph_score: f32,
    pub connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HybridResult {
    pub node_id: String,
    pub node_type: String,
    pub content: String,
    pub label: String,
    pub vector_score: f32,
    pub graph_score: f32,
    pub hybrid_score: f32,
    pub connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisualNode {
    pub id: String,
    pub label: String,
    pub node_type: String,
    pub content: String,
    pub highlighted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VisualLink {
    pub id: String,
    pub source: String,
    pub target: String,
    pub weight: f32,
    pub edge_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphVisualization {
    pub nodes: Vec<VisualNode>,
    pub links: Vec<VisualLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestRequest {
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub success: bool,
    pub nodes_created: usize,
    pub edges_created: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchRequest {
    pub query: String,
    pub file_id: String,
    pub vector_weight: f32,
    pub graph_weight: f32,
    pub top_k: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HybridSearchResponse {
    pub vector_results: Vec<VectorResult>,
    pub graph_results: Vec<GraphResult>,
    pub hybrid_results: Vec<HybridResult>,
    pub graph_visualization: GraphVisualization,
}

/// Single-message failure envelope returned for any aborted request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
}

impl FailureResponse {
    pub fn from_error(error: &dyn std::error::Error) -> Self {
        Self {
            success: false,
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SearchError;

    #[test]
    fn requests_use_camel_case_wire_names() -> Result<(), serde_json::Error> {
        let request: HybridSearchRequest = serde_json::from_str(
            r#"{"query":"pump","fileId":"f1","vectorWeight":0.7,"graphWeight":0.3,"topK":5}"#,
        )?;
        assert_eq!(request.file_id, "f1");
        assert_eq!(request.top_k, 5);

        let response = serde_json::to_value(IngestResponse {
            success: true,
            nodes_created: 3,
            edges_created: 6,
        })?;
        assert_eq!(response["nodesCreated"], 3);
        assert_eq!(response["edgesCreated"], 6);
        Ok(())
    }

    #[test]
    fn failure_envelope_carries_only_the_message() {
        let failure = FailureResponse::from_error(&SearchError::EmptyCorpus {
            file_id: "f1".to_string(),
        });
        assert!(!failure.success);
        assert_eq!(failure.error, "No nodes found for this file");
    }

    #[test]
    fn file_status_serializes_lowercase() -> Result<(), serde_json::Error> {
        assert_eq!(
            serde_json::to_string(&FileStatus::Processing)?,
            "\"processing\""
        );
        Ok(())
    }
}
