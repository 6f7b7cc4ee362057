//! Deterministic collaborators for pipeline tests.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::blocking::{MixedScriptTokenizer, Tokenizer};
use crate::pipeline::PipelineContext;
use crate::semantic::{
    EmbeddingError, EmbeddingProvider, Hit, IndexError, MemoryIndex, RefineOptions, RetryPolicy,
    VectorIndex,
};

/// Bag of hashed tokens, L2 normalized. Identical texts embed identically.
pub struct HashEmbedder {
    pub dims: usize,
}

impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vector = vec![0.0f32; self.dims];
        for token in MixedScriptTokenizer.tokens(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            vector[(hasher.finish() % self.dims as u64) as usize] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        Ok(vector)
    }
}

/// Fixed vectors per text.
pub struct TableEmbedder {
    pub table: HashMap<String, Vec<f32>>,
    pub dims: usize,
}

impl TableEmbedder {
    pub fn new(entries: &[(&str, &[f32])]) -> Self {
        let dims = entries.first().map(|(_, v)| v.len()).unwrap_or(1);
        Self {
            table: entries
                .iter()
                .map(|(text, vector)| (text.to_string(), vector.to_vec()))
                .collect(),
            dims,
        }
    }
}

impl EmbeddingProvider for TableEmbedder {
    fn name(&self) -> &str {
        "table"
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed(format!("no vector for {text:?}")))
    }
}

/// Fails the first `failures` calls with a transient error.
pub struct FlakyEmbedder<P> {
    pub inner: P,
    failures: AtomicU32,
    calls: AtomicU32,
}

impl<P> FlakyEmbedder<P> {
    pub fn new(inner: P, failures: u32) -> Self {
        Self {
            inner,
            failures: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<P: EmbeddingProvider> EmbeddingProvider for FlakyEmbedder<P> {
    fn name(&self) -> &str {
        "flaky"
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let left = self.failures.load(Ordering::SeqCst);
        if left > 0 {
            self.failures.store(left - 1, Ordering::SeqCst);
            return Err(EmbeddingError::Request("connection reset".to_string()));
        }
        self.inner.embed(text)
    }
}

/// Memory index whose queries fail for the given vectors and whose
/// collection setup fails the first `setup_failures` times.
#[derive(Default)]
pub struct FaultyIndex {
    pub inner: MemoryIndex,
    pub poisoned_queries: Vec<Vec<f32>>,
    setup_failures: AtomicU32,
}

impl FaultyIndex {
    pub fn failing_queries(poisoned_queries: Vec<Vec<f32>>) -> Self {
        Self {
            poisoned_queries,
            ..Default::default()
        }
    }

    pub fn failing_setup(setup_failures: u32) -> Self {
        Self {
            setup_failures: AtomicU32::new(setup_failures),
            ..Default::default()
        }
    }
}

impl VectorIndex for FaultyIndex {
    fn has_collection(&self, name: &str) -> Result<bool, IndexError> {
        self.inner.has_collection(name)
    }

    fn drop_collection(&self, name: &str) -> Result<(), IndexError> {
        self.inner.drop_collection(name)
    }

    fn create_collection(&self, name: &str, dimensions: usize) -> Result<(), IndexError> {
        let left = self.setup_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.setup_failures.store(left - 1, Ordering::SeqCst);
            return Err(IndexError::Unavailable("server not ready".to_string()));
        }
        self.inner.create_collection(name, dimensions)
    }

    fn insert(&self, name: &str, entries: &[(String, Vec<f32>)]) -> Result<usize, IndexError> {
        self.inner.insert(name, entries)
    }

    fn flush(&self, name: &str) -> Result<(), IndexError> {
        self.inner.flush(name)
    }

    fn knn_search(&self, name: &str, query: &[f32], k: usize) -> Result<Vec<Hit>, IndexError> {
        if self.poisoned_queries.iter().any(|v| v.as_slice() == query) {
            return Err(IndexError::Unavailable("query timed out".to_string()));
        }
        self.inner.knn_search(name, query, k)
    }

    fn len(&self, name: &str) -> Result<usize, IndexError> {
        self.inner.len(name)
    }
}

/// Refine options with no waiting between attempts or requests.
pub fn fast_refine_options(similarity_threshold: f64) -> RefineOptions {
    RefineOptions {
        similarity_threshold,
        embed_retry: RetryPolicy::exponential(3, Duration::ZERO, Duration::ZERO),
        index_retry: RetryPolicy::fixed(3, Duration::ZERO),
        request_interval: Duration::ZERO,
        ..Default::default()
    }
}

pub fn context_with(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> PipelineContext {
    PipelineContext::new(Arc::new(MixedScriptTokenizer), embedder, index)
}

pub fn hash_context() -> PipelineContext {
    context_with(
        Arc::new(HashEmbedder { dims: 256 }),
        Arc::new(MemoryIndex::new()),
    )
}

pub fn rows(texts: &[&str]) -> Vec<(usize, String)> {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text.to_string()))
        .collect()
}
