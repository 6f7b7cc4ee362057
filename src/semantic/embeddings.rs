//! Embedding providers.
//!
//! Provides the [`EmbeddingProvider`] seam plus a local implementation
//! backed by fastembed:
//! - Model cache directory with download on first use
//! - Dimension probing at startup
//! - Batch embedding generation

#[cfg(feature = "local-embeddings")]
use std::path::PathBuf;
#[cfg(feature = "local-embeddings")]
use std::sync::Mutex;

/// Default local model (384-dimensional)
pub const DEFAULT_LOCAL_MODEL: &str = "all-MiniLM-L6-v2";

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Invalid model name: {0}")]
    InvalidModel(String),

    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Embedding provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl EmbeddingError {
    /// Whether a retry has a reasonable chance of succeeding.
    pub fn is_transient(&self) -> bool {
        match self {
            EmbeddingError::Request(_) => true,
            EmbeddingError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Maps text to a fixed-dimension vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier, for logs.
    fn name(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Embed a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed several texts; results are in input order.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// fastembed-backed local embedding model.
/// Uses a Mutex because fastembed's embed() requires &mut self.
#[cfg(feature = "local-embeddings")]
pub struct LocalEmbedder {
    model: Mutex<fastembed::TextEmbedding>,
    model_name: String,
    dimensions: usize,
}

#[cfg(feature = "local-embeddings")]
impl LocalEmbedder {
    /// Load `model_name`, downloading it into `cache_dir/models` if needed.
    pub fn new(
        model_name: &str,
        cache_dir: PathBuf,
    ) -> Result<Self, EmbeddingError> {
        use fastembed::{InitOptions, TextEmbedding};

        let model_enum = parse_model_name(model_name)?;
        log::info!("loading embedding model '{model_name}'");

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("Failed to create models directory: {}", e))
        })?;

        let options = InitOptions::new(model_enum)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);

        let mut model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        let dimensions = probe_dimensions(&mut model)?;

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
            dimensions,
        })
    }
}

#[cfg(feature = "local-embeddings")]
impl EmbeddingProvider for LocalEmbedder {
    fn name(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text])?
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("No embedding returned".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut model = self.model.lock().map_err(|e| {
            EmbeddingError::EmbeddingFailed(format!("Failed to acquire model lock: {}", e))
        })?;

        model
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))
    }
}

/// Parse model name string to fastembed enum.
#[cfg(feature = "local-embeddings")]
fn parse_model_name(name: &str) -> Result<fastembed::EmbeddingModel, EmbeddingError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" | "allminiml6v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "all-minilm-l6-v2-q" | "allminiml6v2q" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2Q),
        "bge-small-en-v1.5" | "bgesmallenv15" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" | "bgebaseenv15" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-small-zh-v1.5" | "bgesmallzhv15" => Ok(fastembed::EmbeddingModel::BGESmallZHV15),
        "paraphrase-multilingual-minilm-l12-v2" | "paraphrasemlminilml12v2" => {
            Ok(fastembed::EmbeddingModel::ParaphraseMLMiniLML12V2)
        }
        _ => Err(EmbeddingError::InvalidModel(format!(
            "Unknown model: {}. Supported models: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-small-zh-v1.5, paraphrase-multilingual-MiniLM-L12-v2",
            name
        ))),
    }
}

/// Probe the model to determine embedding dimensions.
#[cfg(feature = "local-embeddings")]
fn probe_dimensions(model: &mut fastembed::TextEmbedding) -> Result<usize, EmbeddingError> {
    let test_embeddings = model
        .embed(vec!["test"], None)
        .map_err(|e| EmbeddingError::InitFailed(format!("Failed to probe dimensions: {}", e)))?;

    test_embeddings
        .first()
        .map(|v| v.len())
        .ok_or_else(|| EmbeddingError::InitFailed("Model returned no embedding".to_string()))
}
