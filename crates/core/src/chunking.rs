use crate::config::EngineConfig;
use crate::error::IngestError;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy)]
pub struct ChunkingConfig {
    pub max_chars: usize,
}

impl From<&EngineConfig> for ChunkingConfig {
    fn from(value: &EngineConfig) -> Self {
        Self {
            max_chars: value.chunk_max_chars,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    pub index: usize,
    pub text: String,
}

/// Splits `text` into consecutive windows of at most `max_chars` characters.
///
/// Windows never overlap and are counted in `char`s, so multi-byte text is never
/// cut inside a code point. Concatenating the chunks yields the input.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Result<Vec<TextChunk>, IngestError> {
    if config.max_chars == 0 {
        return Err(IngestError::InvalidChunkConfig(
            "max_chars must be greater than zero".to_string(),
        ));
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0usize;

    for character in text.chars() {
        current.push(character);
        current_chars += 1;
        if current_chars == config.max_chars {
            chunks.push(TextChunk {
                index: chunks.len(),
                text: std::mem::take(&mut current),
            });
            current_chars = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(TextChunk {
            index: chunks.len(),
            text: current,
        });
    }

    Ok(chunks)
}

pub fn make_node_id(file_id: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_id.as_bytes());
    hasher.update((chunk_index as u64).to_le_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn make_edge_id(source_id: &str, target_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b"->");
    hasher.update(target_id.as_bytes());
    format!("{:x}", hasher.finalize())
}
