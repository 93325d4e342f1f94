pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod graph;
pub mod ingest;
pub mod labels;
pub mod models;
pub mod orchestrator;
pub mod similarity;
pub mod stores;
pub mod traits;

pub use chunking::{chunk_text, ChunkingConfig, TextChunk};
pub use config::EngineConfig;
pub use embeddings::{Embedder, HashEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{EmbeddingError, ErrorKind, IngestError, SearchError, StoreError};
pub use extractor::{extract_text, DocumentFormat};
pub use graph::GraphBuilder;
pub use ingest::{content_type_for, discover_documents, IngestionPipeline};
pub use labels::{derive_label, extract_matching_sentence, extract_matching_words, tokenize};
pub use models::{
    CombinedResult, Edge, FailureResponse, FileRecord, FileStatus, GraphResult,
    GraphVisualization, HybridResult, HybridSearchRequest, HybridSearchResponse, IngestRequest,
    IngestResponse, Node, NodeMetadata, QueryLog, VectorResult, VisualLink, VisualNode,
};
pub use orchestrator::{fuse_results, hybrid_score, QueryEngine};
pub use similarity::{cosine_similarity, EmbeddingArena};
pub use stores::{LocalBlobStore, MemoryBlobStore, MemoryStore, RestBlobStore, RestStore};
pub use traits::{BlobStore, CorpusStore};
