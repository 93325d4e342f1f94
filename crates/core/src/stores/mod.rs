pub mod local;
pub mod memory;
pub mod rest;

pub use local::LocalBlobStore;
pub use memory::{CorpusSnapshot, MemoryBlobStore, MemoryStore};
pub use rest::{RestBlobStore, RestStore};
