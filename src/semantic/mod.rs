//! Embedding-based refinement of lexical candidates.
//!
//! # Architecture
//!
//! - `embeddings`: provider seam plus the fastembed-backed local model
//! - `openai`: client for OpenAI-compatible embedding endpoints
//! - `index`: vector index seam and the in-memory L2 implementation
//! - `retry`: bounded retry with backoff for provider and index setup
//! - `refiner`: vocabulary reduction, index population and the kNN scan

pub mod embeddings;
mod index;
mod openai;
mod refiner;
mod retry;

#[cfg(feature = "local-embeddings")]
pub use embeddings::LocalEmbedder;
pub use embeddings::{EmbeddingError, EmbeddingProvider, DEFAULT_LOCAL_MODEL};
pub use index::{Hit, IndexError, MemoryIndex, VectorIndex};
pub use openai::{OpenAiEmbedder, DEFAULT_OPENAI_BASE, DEFAULT_OPENAI_MODEL};
pub use refiner::{
    refine, search_similar, RefineOptions, RowPolicy, SkippedComparison,
    DEFAULT_COLLECTION, DEFAULT_SIMILARITY_THRESHOLD,
};
pub use retry::RetryPolicy;
