use crate::error::IngestError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CHUNK_MAX_CHARS: usize = 500;
pub const DEFAULT_NEIGHBORS_K: usize = 5;
pub const DEFAULT_QUERY_DEADLINE: Duration = Duration::from_secs(5);

/// Tunables threaded through the chunker, embedder, graph builder and query engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub chunk_max_chars: usize,
    pub neighbors_k: usize,
    pub dimensions: usize,
    /// Upper bound on the per-query vector scan. `None` disables the deadline.
    pub query_deadline: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_max_chars: DEFAULT_CHUNK_MAX_CHARS,
            neighbors_k: DEFAULT_NEIGHBORS_K,
            dimensions: crate::embeddings::DEFAULT_EMBEDDING_DIMENSIONS,
            query_deadline: Some(DEFAULT_QUERY_DEADLINE),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_max_chars must be greater than zero".to_string(),
            ));
        }
        if self.dimensions == 0 {
            return Err(IngestError::Validation(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.chunk_max_chars, 500);
        assert_eq!(config.neighbors_k, 5);
        assert_eq!(config.dimensions, 768);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let config = EngineConfig {
            chunk_max_chars: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(IngestError::InvalidChunkConfig(_))
        ));
    }
}
