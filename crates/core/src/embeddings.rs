use crate::error::EmbeddingError;

const DEFAULT: usize = 768;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;
const DIMENSION_SALT: u32 = 0x9e37_79b9;
const VALUE_BUCKETS: u32 = 10_000;

/// Text to fixed-dimension vector. Ingestion and querying must share one instance type,
/// otherwise stored and query vectors live in different spaces.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// `embed`, rejecting vectors whose length disagrees with `dimensions()`.
    fn embed_checked(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let vector = self.embed(text)?;
        if vector.len() != self.dimensions() {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }
}

/// Deterministic hash-seeded placeholder. Carries no semantic signal: only identical
/// strings are guaranteed to land on identical vectors.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

impl Embedder for HashEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let seed = fold_seed(text);

        let raw: Vec<f64> = (0..self.dimensions)
            .map(|index| {
                let scrambled = xorshift32(seed ^ (index as u32).wrapping_add(DIMENSION_SALT));
                f64::from(scrambled % VALUE_BUCKETS) / f64::from(VALUE_BUCKETS / 2) - 1.0
            })
            .collect();

        let mut magnitude = raw.iter().map(|value| value * value).sum::<f64>().sqrt();
        if magnitude == 0.0 {
            magnitude = 1.0;
        }

        Ok(raw.into_iter().map(|value| (value / magnitude) as f32).collect())
    }
}

/// FNV-1a over UTF-16 code units, 32-bit.
fn fold_seed(text: &str) -> u32 {
    text.encode_utf16().fold(FNV_OFFSET_BASIS, |hash, unit| {
        (hash ^ u32::from(unit)).wrapping_mul(FNV_PRIME)
    })
}

fn xorshift32(mut state: u32) -> u32 {
    state ^= state << 13;
    state ^= state >> 17;
    state ^= state << 5;
    state
}
