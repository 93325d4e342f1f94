use crate::error::StoreError;
use crate::models::{Edge, FileRecord, FileStatus, Node, QueryLog};
use async_trait::async_trait;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError>;

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Relational store for files, nodes, edges and query logs.
///
/// Nodes and edges are scoped to one file; deleting a file cascades to both.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    async fn insert_file(&self, file: &FileRecord) -> Result<(), StoreError>;

    async fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError>;

    async fn list_files(&self) -> Result<Vec<FileRecord>, StoreError>;

    async fn update_file_status(
        &self,
        file_id: &str,
        status: FileStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    async fn delete_file(&self, file_id: &str) -> Result<(), StoreError>;

    /// Inserts or replaces nodes by id.
    async fn insert_nodes(&self, nodes: &[Node]) -> Result<(), StoreError>;

    /// Every node of the file, ordered by chunk index.
    async fn list_nodes(&self, file_id: &str) -> Result<Vec<Node>, StoreError>;

    async fn get_nodes(&self, node_ids: &[String]) -> Result<Vec<Node>, StoreError>;

    /// Drops every node and edge of the file while keeping the file record.
    async fn clear_file_graph(&self, file_id: &str) -> Result<(), StoreError>;

    /// Inserts or replaces edges by id.
    async fn insert_edges(&self, edges: &[Edge]) -> Result<(), StoreError>;

    /// Outgoing edges of `source_ids` within the file, ordered by source id, then by
    /// descending weight, then by target id.
    async fn edges_from(
        &self,
        file_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<Edge>, StoreError>;

    async fn insert_query_log(&self, log: &QueryLog) -> Result<(), StoreError>;

    /// Makes previous writes durable. Stores that write through need not override it.
    async fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
