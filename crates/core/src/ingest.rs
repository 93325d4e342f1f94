use crate::chunking::{chunk_text, make_node_id, ChunkingConfig};
use crate::config::EngineConfig;
use crate::embeddings::Embedder;
use crate::error::{EmbeddingError, IngestError};
use crate::extractor::extract_text;
use crate::graph::GraphBuilder;
use crate::models::{
    blob_path, Edge, FileRecord, FileStatus, IngestRequest, IngestResponse, Node, NodeMetadata,
    TEXT_NODE_TYPE,
};
use crate::traits::{BlobStore, CorpusStore};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "pdf"];

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let supported = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });

        if supported {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("md") => "text/markdown",
        _ => "text/plain",
    }
}

/// Chunk, embed, persist nodes, then link them into a per-file kNN graph.
///
/// Re-running on the same file replaces its previous nodes and edges. Any failure after
/// the file is located leaves it in `failed` with the error message attached.
pub struct IngestionPipeline<B, S, E>
where
    B: BlobStore,
    S: CorpusStore,
    E: Embedder,
{
    blobs: Arc<B>,
    store: Arc<S>,
    embedder: Arc<E>,
    config: EngineConfig,
    graph: GraphBuilder,
}

impl<B, S, E> IngestionPipeline<B, S, E>
where
    B: BlobStore + 'static,
    S: CorpusStore + 'static,
    E: Embedder + 'static,
{
    pub fn new(
        blobs: Arc<B>,
        store: Arc<S>,
        embedder: Arc<E>,
        config: EngineConfig,
    ) -> Result<Self, IngestError> {
        config.validate()?;
        if embedder.dimensions() != config.dimensions {
            return Err(IngestError::Validation(format!(
                "embedder produces {} dimensions but config expects {}",
                embedder.dimensions(),
                config.dimensions
            )));
        }

        Ok(Self {
            blobs,
            store,
            embedder,
            graph: GraphBuilder::new(config.neighbors_k),
            config,
        })
    }

    /// Stores raw bytes and registers a `processing` file record for them.
    pub async fn upload(
        &self,
        file_name: &str,
        file_type: &str,
        bytes: &[u8],
    ) -> Result<IngestRequest, IngestError> {
        if file_name.trim().is_empty() {
            return Err(IngestError::Validation("file name is empty".to_string()));
        }

        let file = FileRecord::new(
            Uuid::new_v4().to_string(),
            file_name,
            file_type,
            bytes.len() as u64,
        );
        self.blobs.upload(&file.blob_path(), bytes).await?;
        self.store.insert_file(&file).await?;

        Ok(IngestRequest {
            file_id: file.id,
            file_name: file.name,
            file_type: file.file_type,
        })
    }

    pub async fn ingest(&self, request: &IngestRequest) -> Result<IngestResponse, IngestError> {
        if request.file_id.trim().is_empty() {
            return Err(IngestError::Validation("file id is empty".to_string()));
        }
        if request.file_name.trim().is_empty() {
            return Err(IngestError::Validation("file name is empty".to_string()));
        }

        if self.store.get_file(&request.file_id).await?.is_none() {
            return Err(IngestError::NotFound(format!(
                "file {} not found",
                request.file_id
            )));
        }

        match self.process(request).await {
            Ok(response) => {
                info!(
                    file_id = %request.file_id,
                    nodes_created = response.nodes_created,
                    edges_created = response.edges_created,
                    "ingestion completed"
                );
                Ok(response)
            }
            Err(error) => {
                warn!(file_id = %request.file_id, error = %error, "ingestion failed");
                if let Err(status_error) = self
                    .store
                    .update_file_status(
                        &request.file_id,
                        FileStatus::Failed,
                        Some(error.to_string()),
                    )
                    .await
                {
                    warn!(
                        file_id = %request.file_id,
                        error = %status_error,
                        "could not mark file as failed"
                    );
                }
                if let Err(flush_error) = self.store.flush().await {
                    warn!(error = %flush_error, "could not flush store after failed ingestion");
                }
                Err(error)
            }
        }
    }

    /// Every fallible step once the file is known, including the final status write.
    async fn process(&self, request: &IngestRequest) -> Result<IngestResponse, IngestError> {
        self.store
            .update_file_status(&request.file_id, FileStatus::Processing, None)
            .await?;
        info!(file_id = %request.file_id, file_name = %request.file_name, "ingestion started");

        let response = self.run(request).await?;

        self.store
            .update_file_status(&request.file_id, FileStatus::Completed, None)
            .await?;
        self.store.flush().await?;
        Ok(response)
    }

    async fn run(&self, request: &IngestRequest) -> Result<IngestResponse, IngestError> {
        let bytes = self
            .blobs
            .download(&blob_path(&request.file_id, &request.file_name))
            .await?;
        let text = extract_text(&bytes, &request.file_name, &request.file_type)?;
        if text.trim().is_empty() {
            return Err(IngestError::EmptyDocument(request.file_name.clone()));
        }

        let chunks = chunk_text(&text, ChunkingConfig::from(&self.config))?;
        debug!(file_id = %request.file_id, chunk_count = chunks.len(), "document chunked");

        let texts: Vec<String> = chunks.into_iter().map(|chunk| chunk.text).collect();
        let (texts, embeddings) = self.embed_all(texts).await?;

        let nodes: Vec<Node> = texts
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(chunk_index, (content, embedding))| Node {
                id: make_node_id(&request.file_id, chunk_index),
                file_id: request.file_id.clone(),
                node_type: TEXT_NODE_TYPE.to_string(),
                chunk_index,
                content,
                embedding,
                metadata: NodeMetadata::new(),
            })
            .collect();

        self.store.clear_file_graph(&request.file_id).await?;
        self.store.insert_nodes(&nodes).await?;
        let nodes_created = nodes.len();

        let edges = self.link(nodes).await?;
        self.store.insert_edges(&edges).await?;

        Ok(IngestResponse {
            success: true,
            nodes_created,
            edges_created: edges.len(),
        })
    }

    async fn embed_all(
        &self,
        texts: Vec<String>,
    ) -> Result<(Vec<String>, Vec<Vec<f32>>), IngestError> {
        let embedder = Arc::clone(&self.embedder);
        let (texts, embeddings) = tokio::task::spawn_blocking(move || {
            let embeddings = texts
                .par_iter()
                .map(|text| embedder.embed_checked(text))
                .collect::<Result<Vec<_>, EmbeddingError>>();
            (texts, embeddings)
        })
        .await
        .map_err(|error| IngestError::Worker(error.to_string()))?;

        Ok((texts, embeddings?))
    }

    async fn link(&self, nodes: Vec<Node>) -> Result<Vec<Edge>, IngestError> {
        let graph = self.graph;
        let edges = tokio::task::spawn_blocking(move || graph.build_edges(&nodes))
            .await
            .map_err(|error| IngestError::Worker(error.to_string()))??;
        Ok(edges)
    }
}
