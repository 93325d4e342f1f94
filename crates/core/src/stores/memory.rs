use crate::error::StoreError;
use crate::models::{Edge, FileRecord, FileStatus, Node, QueryLog};
use crate::traits::{BlobStore, CorpusStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorpusSnapshot {
    pub files: Vec<FileRecord>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub queries: Vec<QueryLog>,
}

/// In-process corpus. Optionally backed by a JSON snapshot written on `flush`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<CorpusSnapshot>,
    snapshot_path: Option<PathBuf>,
    flush_lock: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `path` if it exists; later flushes write back to it.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => CorpusSnapshot::default(),
            Err(error) => return Err(error.into()),
        };

        Ok(Self {
            state: RwLock::new(state),
            snapshot_path: Some(path),
            flush_lock: Mutex::new(()),
        })
    }

    pub async fn snapshot(&self) -> CorpusSnapshot {
        self.state.read().await.clone()
    }
}

fn upsert_by_id<T: Clone>(target: &mut Vec<T>, incoming: &[T], id_of: impl Fn(&T) -> &str) {
    let mut positions: HashMap<String, usize> = target
        .iter()
        .enumerate()
        .map(|(position, item)| (id_of(item).to_string(), position))
        .collect();

    for item in incoming {
        match positions.get(id_of(item)) {
            Some(position) => target[*position] = item.clone(),
            None => {
                positions.insert(id_of(item).to_string(), target.len());
                target.push(item.clone());
            }
        }
    }
}

/// Source id ascending, then weight descending, then target id ascending.
fn edge_order(left: &Edge, right: &Edge) -> Ordering {
    left.source_node_id
        .cmp(&right.source_node_id)
        .then_with(|| right.weight.total_cmp(&left.weight))
        .then_with(|| left.target_node_id.cmp(&right.target_node_id))
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn insert_file(&self, file: &FileRecord) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        upsert_by_id(&mut state.files, std::slice::from_ref(file), |item| item.id.as_str());
        Ok(())
    }

    async fn get_file(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        let state = self.state.read().await;
        Ok(state.files.iter().find(|file| file.id == file_id).cloned())
    }

    async fn list_files(&self) -> Result<Vec<FileRecord>, StoreError> {
        Ok(self.state.read().await.files.clone())
    }

    async fn update_file_status(
        &self,
        file_id: &str,
        status: FileStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let file = state
            .files
            .iter_mut()
            .find(|file| file.id == file_id)
            .ok_or_else(|| StoreError::MissingObject(format!("file {file_id}")))?;
        file.status = status;
        file.error = error;
        Ok(())
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.files.retain(|file| file.id != file_id);
        state.nodes.retain(|node| node.file_id != file_id);
        state.edges.retain(|edge| edge.file_id != file_id);
        Ok(())
    }

    async fn insert_nodes(&self, nodes: &[Node]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        upsert_by_id(&mut state.nodes, nodes, |node| node.id.as_str());
        Ok(())
    }

    async fn list_nodes(&self, file_id: &str) -> Result<Vec<Node>, StoreError> {
        let state = self.state.read().await;
        let mut nodes: Vec<Node> = state
            .nodes
            .iter()
            .filter(|node| node.file_id == file_id)
            .cloned()
            .collect();
        nodes.sort_by_key(|node| node.chunk_index);
        Ok(nodes)
    }

    async fn get_nodes(&self, node_ids: &[String]) -> Result<Vec<Node>, StoreError> {
        let wanted: HashSet<&str> = node_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        Ok(state
            .nodes
            .iter()
            .filter(|node| wanted.contains(node.id.as_str()))
            .cloned()
            .collect())
    }

    async fn clear_file_graph(&self, file_id: &str) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.nodes.retain(|node| node.file_id != file_id);
        state.edges.retain(|edge| edge.file_id != file_id);
        Ok(())
    }

    async fn insert_edges(&self, edges: &[Edge]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        upsert_by_id(&mut state.edges, edges, |edge| edge.id.as_str());
        Ok(())
    }

    async fn edges_from(
        &self,
        file_id: &str,
        source_ids: &[String],
    ) -> Result<Vec<Edge>, StoreError> {
        let sources: HashSet<&str> = source_ids.iter().map(String::as_str).collect();
        let state = self.state.read().await;
        let mut edges: Vec<Edge> = state
            .edges
            .iter()
            .filter(|edge| {
                edge.file_id == file_id && sources.contains(edge.source_node_id.as_str())
            })
            .cloned()
            .collect();
        edges.sort_by(edge_order);
        Ok(edges)
    }

    async fn insert_query_log(&self, log: &QueryLog) -> Result<(), StoreError> {
        self.state.write().await.queries.push(log.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        let Some(path) = &self.snapshot_path else {
            return Ok(());
        };

        // One writer at a time: concurrent ingests share the staging file.
        let _guard = self.flush_lock.lock().await;
        let bytes = {
            let state = self.state.read().await;
            serde_json::to_vec(&*state)?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, bytes).await?;
        tokio::fs::rename(&staging, path).await?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::MissingObject(path.to_string()))
    }

    async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.objects
            .write()
            .await
            .insert(path.to_string(), bytes.to_vec());
        Ok(())
    }
}
