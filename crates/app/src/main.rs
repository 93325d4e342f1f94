use anyhow::{anyhow, bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use vecgraph_core::{
    content_type_for, discover_documents, BlobStore, CorpusStore, EngineConfig, FailureResponse,
    HashEmbedder, HybridSearchRequest, IngestRequest, IngestionPipeline, LocalBlobStore,
    MemoryStore, QueryEngine, RestBlobStore, RestStore,
};

#[derive(Parser)]
#[command(name = "vecgraph", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the local corpus snapshot and uploaded blobs
    #[arg(long, env = "VECGRAPH_DATA_DIR", default_value = ".vecgraph")]
    data_dir: PathBuf,

    /// PostgREST-compatible base URL; selects the remote backend when set
    #[arg(long, env = "VECGRAPH_REST_URL")]
    rest_url: Option<String>,

    /// API key sent as `apikey` and bearer token to the remote backend
    #[arg(long, env = "VECGRAPH_REST_KEY", default_value = "")]
    rest_key: String,

    /// Object storage bucket for raw uploads on the remote backend
    #[arg(long, env = "VECGRAPH_BUCKET", default_value = "documents")]
    bucket: String,

    /// Maximum characters per chunk
    #[arg(long, env = "VECGRAPH_CHUNK_SIZE", default_value_t = 500)]
    chunk_size: usize,

    /// Outgoing kNN edges per node
    #[arg(long, env = "VECGRAPH_NEIGHBORS", default_value_t = 5)]
    neighbors: usize,

    /// Embedding dimensions
    #[arg(long, env = "VECGRAPH_DIMENSIONS", default_value_t = 768)]
    dimensions: usize,

    /// Deadline for the per-query vector scan in milliseconds; 0 disables it
    #[arg(long, env = "VECGRAPH_QUERY_DEADLINE_MS", default_value_t = 5_000)]
    query_deadline_ms: u64,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            chunk_max_chars: self.chunk_size,
            neighbors_k: self.neighbors,
            dimensions: self.dimensions,
            query_deadline: (self.query_deadline_ms > 0)
                .then(|| Duration::from_millis(self.query_deadline_ms)),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Upload a document (or every document under a folder) and build its graph.
    Ingest {
        /// File or folder; folders are walked recursively for .txt, .md and .pdf
        #[arg(long)]
        path: PathBuf,
        /// Files ingested at the same time.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },
    /// Run a hybrid vector + graph search within one file.
    Search {
        #[arg(long)]
        file_id: String,
        #[arg(long)]
        query: String,
        #[arg(long, default_value_t = 0.7)]
        vector_weight: f32,
        #[arg(long, default_value_t = 0.3)]
        graph_weight: f32,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
    },
    /// List known files and their ingestion status.
    Files,
    /// Delete a file together with its nodes and edges.
    Delete {
        #[arg(long)]
        file_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.engine_config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        backend = if cli.rest_url.is_some() { "rest" } else { "local" },
        "vecgraph boot"
    );

    match &cli.rest_url {
        Some(endpoint) => {
            let store = Arc::new(RestStore::new(endpoint, cli.rest_key.clone())?);
            let blobs = Arc::new(RestBlobStore::new(
                endpoint,
                cli.bucket.clone(),
                cli.rest_key.clone(),
            )?);
            run(cli.command, store, blobs, config).await
        }
        None => {
            let store = Arc::new(MemoryStore::open(cli.data_dir.join("corpus.json")).await?);
            let blobs = Arc::new(LocalBlobStore::new(cli.data_dir.join("blobs")));
            run(cli.command, store, blobs, config).await
        }
    }
}

async fn run<S, B>(
    command: Command,
    store: Arc<S>,
    blobs: Arc<B>,
    config: EngineConfig,
) -> anyhow::Result<()>
where
    S: CorpusStore + 'static,
    B: BlobStore + 'static,
{
    let embedder = Arc::new(HashEmbedder::new(config.dimensions));

    match command {
        Command::Ingest { path, concurrency } => {
            let pipeline = Arc::new(IngestionPipeline::new(
                blobs,
                Arc::clone(&store),
                embedder,
                config,
            )?);
            ingest_path(pipeline, &path, concurrency.max(1)).await?;
        }
        Command::Search {
            file_id,
            query,
            vector_weight,
            graph_weight,
            top_k,
        } => {
            let engine = QueryEngine::new(Arc::clone(&store), embedder, config);
            let request = HybridSearchRequest {
                query,
                file_id,
                vector_weight,
                graph_weight,
                top_k,
            };

            match engine.search(&request).await {
                Ok(response) => {
                    store.flush().await?;
                    println!("{}", serde_json::to_string_pretty(&response)?);
                }
                Err(error) => {
                    println!(
                        "{}",
                        serde_json::to_string_pretty(&FailureResponse::from_error(&error))?
                    );
                    return Err(anyhow!(error));
                }
            }
        }
        Command::Files => {
            let files = store.list_files().await?;
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
        Command::Delete { file_id } => {
            if store.get_file(&file_id).await?.is_none() {
                bail!("file {file_id} not found");
            }
            store.delete_file(&file_id).await?;
            store.flush().await?;
            print_pretty(&json!({ "success": true, "fileId": file_id }))?;
        }
    }

    Ok(())
}

async fn ingest_path<B, S>(
    pipeline: Arc<IngestionPipeline<B, S, HashEmbedder>>,
    path: &Path,
    concurrency: usize,
) -> anyhow::Result<()>
where
    B: BlobStore + 'static,
    S: CorpusStore + 'static,
{
    let documents = if path.is_dir() {
        discover_documents(path)
    } else {
        vec![path.to_path_buf()]
    };
    if documents.is_empty() {
        bail!("no .txt, .md or .pdf documents found in {}", path.display());
    }

    let mut failed = 0usize;
    let mut requests = Vec::with_capacity(documents.len());
    for document in &documents {
        match upload_document(&pipeline, document).await {
            Ok(request) => requests.push(request),
            Err(error) => {
                failed += 1;
                warn!(path = %document.display(), error = %error, "upload failed");
                print_pretty(&json!({
                    "path": document.display().to_string(),
                    "failure": { "success": false, "error": format!("{error:#}") },
                }))?;
            }
        }
    }

    info!(document_count = requests.len(), concurrency, "ingesting documents");

    let permits = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();
    for request in requests {
        let pipeline = Arc::clone(&pipeline);
        let permits = Arc::clone(&permits);
        tasks.spawn(async move {
            let _permit = permits.acquire_owned().await;
            let outcome = pipeline.ingest(&request).await;
            (request, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (request, outcome) = joined?;
        match outcome {
            Ok(response) => print_pretty(&json!({
                "fileId": request.file_id,
                "fileName": request.file_name,
                "success": response.success,
                "nodesCreated": response.nodes_created,
                "edgesCreated": response.edges_created,
            }))?,
            Err(error) => {
                failed += 1;
                warn!(
                    file_id = %request.file_id,
                    file_name = %request.file_name,
                    error = %error,
                    "ingestion failed"
                );
                print_pretty(&json!({
                    "fileId": request.file_id,
                    "fileName": request.file_name,
                    "failure": FailureResponse::from_error(&error),
                }))?;
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} documents failed to ingest", documents.len());
    }
    Ok(())
}

async fn upload_document<B, S>(
    pipeline: &IngestionPipeline<B, S, HashEmbedder>,
    document: &Path,
) -> anyhow::Result<IngestRequest>
where
    B: BlobStore + 'static,
    S: CorpusStore + 'static,
{
    let bytes = tokio::fs::read(document)
        .await
        .with_context(|| format!("reading {}", document.display()))?;
    let file_name = document
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("path has no file name: {}", document.display()))?;
    Ok(pipeline
        .upload(file_name, content_type_for(document), &bytes)
        .await?)
}

fn print_pretty(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use tempfile::tempdir;
    use vecgraph_core::{FileStatus, MemoryBlobStore, StoreError};

    /// Blob store that refuses uploads whose path contains `reject`.
    struct SelectiveBlobStore {
        inner: MemoryBlobStore,
    }

    #[async_trait]
    impl BlobStore for SelectiveBlobStore {
        async fn download(&self, path: &str) -> Result<Vec<u8>, StoreError> {
            self.inner.download(path).await
        }

        async fn upload(&self, path: &str, bytes: &[u8]) -> Result<(), StoreError> {
            if path.contains("reject") {
                return Err(StoreError::BackendResponse {
                    backend: "storage".to_string(),
                    details: "413: payload too large".to_string(),
                });
            }
            self.inner.upload(path, bytes).await
        }
    }

    fn pipeline_over(
        store: Arc<MemoryStore>,
    ) -> anyhow::Result<Arc<IngestionPipeline<SelectiveBlobStore, MemoryStore, HashEmbedder>>> {
        let config = EngineConfig::default();
        Ok(Arc::new(IngestionPipeline::new(
            Arc::new(SelectiveBlobStore {
                inner: MemoryBlobStore::new(),
            }),
            store,
            Arc::new(HashEmbedder::new(config.dimensions)),
            config,
        )?))
    }

    #[tokio::test]
    async fn failed_upload_does_not_strand_other_documents() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("a.txt"), "The pump feeds the circuit.")?;
        fs::write(dir.path().join("b-reject.txt"), "Never stored.")?;
        fs::write(dir.path().join("c.txt"), "Filters are replaced often.")?;
        let store = Arc::new(MemoryStore::new());

        let outcome = ingest_path(pipeline_over(Arc::clone(&store))?, dir.path(), 2).await;

        let error = outcome.expect_err("one upload was refused");
        assert!(error.to_string().contains("1 of 3"));
        let files = store.list_files().await?;
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|file| file.status == FileStatus::Completed));
        Ok(())
    }

    #[tokio::test]
    async fn failed_ingestion_is_reported_as_error() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("good.txt"), "Hoses are inspected weekly.")?;
        fs::write(dir.path().join("blank.txt"), "   ")?;
        let store = Arc::new(MemoryStore::new());

        let outcome = ingest_path(pipeline_over(Arc::clone(&store))?, dir.path(), 4).await;

        assert!(outcome.is_err());
        let mut statuses: Vec<(String, FileStatus)> = store
            .list_files()
            .await?
            .into_iter()
            .map(|file| (file.name, file.status))
            .collect();
        statuses.sort_by(|left, right| left.0.cmp(&right.0));
        assert_eq!(
            statuses,
            vec![
                ("blank.txt".to_string(), FileStatus::Failed),
                ("good.txt".to_string(), FileStatus::Completed),
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn clean_folder_ingests_successfully() -> anyhow::Result<()> {
        let dir = tempdir()?;
        fs::write(dir.path().join("notes.md"), "Relief valves open at forty bar.")?;
        let store = Arc::new(MemoryStore::new());

        ingest_path(pipeline_over(Arc::clone(&store))?, dir.path(), 1).await?;

        assert_eq!(store.list_nodes(&store.list_files().await?[0].id).await?.len(), 1);
        Ok(())
    }
}
