use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::blocking::{
    BlockingOptions, DEFAULT_FILTER_THRESHOLD, DEFAULT_MIN_LENGTH_RATIO, DEFAULT_MIN_TOKEN_OVERLAP,
};
use crate::semantic::{
    RefineOptions, RetryPolicy, RowPolicy, DEFAULT_COLLECTION, DEFAULT_LOCAL_MODEL,
    DEFAULT_OPENAI_MODEL, DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::errors::DedupError;
use crate::workers::parse_parallelism;

pub const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_EMBED_ATTEMPTS: u32 = 3;
const DEFAULT_EMBED_BACKOFF_MS: u64 = 1000;
const DEFAULT_EMBED_MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_REQUEST_INTERVAL_MS: u64 = 500;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SETUP_ATTEMPTS: u32 = 3;
const DEFAULT_SETUP_BACKOFF_MS: u64 = 1000;
const DEFAULT_BIND: &str = "0.0.0.0:5000";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlockingConfig {
    /// Minimum best lexical score for a candidate [0.0, 1.0]
    #[serde(default = "default_filter_threshold")]
    pub filter_threshold: f64,

    #[serde(default = "default_min_length_ratio")]
    pub min_length_ratio: f64,

    #[serde(default = "default_min_token_overlap")]
    pub min_token_overlap: usize,

    /// Parallelism for the pair scan: "auto" or a positive integer
    #[serde(default = "default_auto")]
    pub parallelism: String,
}

impl Default for BlockingConfig {
    fn default() -> Self {
        Self {
            filter_threshold: DEFAULT_FILTER_THRESHOLD,
            min_length_ratio: DEFAULT_MIN_LENGTH_RATIO,
            min_token_overlap: DEFAULT_MIN_TOKEN_OVERLAP,
            parallelism: default_auto(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RefineConfig {
    /// Minimum `1 / (1 + distance)` for a final pair (0.0, 1.0]
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub row_policy: RowPolicy,

    /// Parallelism for index queries: "auto" or a positive integer
    #[serde(default = "default_auto")]
    pub query_parallelism: String,
}

impl Default for RefineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            collection: default_collection(),
            row_policy: RowPolicy::default(),
            query_parallelism: default_auto(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[default]
    Openai,
    Local,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Output size requested from the OpenAI endpoint, if set
    #[serde(default)]
    pub openai_dimensions: Option<usize>,

    /// fastembed model name (e.g., "all-MiniLM-L6-v2")
    #[serde(default = "default_local_model")]
    pub local_model: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_embed_attempts")]
    pub max_attempts: u32,

    /// First retry wait; doubles on every further failure
    #[serde(default = "default_embed_backoff_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_embed_max_backoff_ms")]
    pub backoff_max_ms: u64,

    /// Upper bound of the random delay added to each retry wait
    #[serde(default)]
    pub backoff_jitter_ms: u64,

    /// Pause after each request to stay under provider rate limits
    #[serde(default = "default_request_interval_ms")]
    pub request_interval_ms: u64,

    /// Parallelism for embedding requests: "auto" or a positive integer
    #[serde(default = "default_one")]
    pub parallelism: String,

    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            openai_model: default_openai_model(),
            openai_dimensions: None,
            local_model: default_local_model(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            max_attempts: DEFAULT_EMBED_ATTEMPTS,
            backoff_base_ms: DEFAULT_EMBED_BACKOFF_MS,
            backoff_max_ms: DEFAULT_EMBED_MAX_BACKOFF_MS,
            backoff_jitter_ms: 0,
            request_interval_ms: DEFAULT_REQUEST_INTERVAL_MS,
            parallelism: default_one(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexConfig {
    #[serde(default = "default_setup_attempts")]
    pub setup_attempts: u32,

    #[serde(default = "default_setup_backoff_ms")]
    pub setup_backoff_ms: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            setup_attempts: DEFAULT_SETUP_ATTEMPTS,
            setup_backoff_ms: DEFAULT_SETUP_BACKOFF_MS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Directory for report files, relative to the config directory
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    #[serde(default = "default_report_file")]
    pub report_file: String,

    #[serde(default = "default_candidates_file")]
    pub candidates_file: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            report_file: default_report_file(),
            candidates_file: default_candidates_file(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub blocking: BlockingConfig,
    #[serde(default)]
    pub refine: RefineConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

fn default_filter_threshold() -> f64 {
    DEFAULT_FILTER_THRESHOLD
}

fn default_min_length_ratio() -> f64 {
    DEFAULT_MIN_LENGTH_RATIO
}

fn default_min_token_overlap() -> usize {
    DEFAULT_MIN_TOKEN_OVERLAP
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_auto() -> String {
    "auto".to_string()
}

fn default_one() -> String {
    "1".to_string()
}

fn default_openai_model() -> String {
    DEFAULT_OPENAI_MODEL.to_string()
}

fn default_local_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_embed_attempts() -> u32 {
    DEFAULT_EMBED_ATTEMPTS
}

fn default_embed_backoff_ms() -> u64 {
    DEFAULT_EMBED_BACKOFF_MS
}

fn default_embed_max_backoff_ms() -> u64 {
    DEFAULT_EMBED_MAX_BACKOFF_MS
}

fn default_request_interval_ms() -> u64 {
    DEFAULT_REQUEST_INTERVAL_MS
}

fn default_batch_size() -> usize {
    1
}

fn default_setup_attempts() -> u32 {
    DEFAULT_SETUP_ATTEMPTS
}

fn default_setup_backoff_ms() -> u64 {
    DEFAULT_SETUP_BACKOFF_MS
}

fn default_output_dir() -> String {
    "reports".to_string()
}

fn default_report_file() -> String {
    "similarity_report.csv".to_string()
}

fn default_candidates_file() -> String {
    "initial_pairs.csv".to_string()
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn check_unit_range(name: &str, value: f64) -> anyhow::Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{name} must be between 0.0 and 1.0, got {value}");
    }
    Ok(())
}

/// Lexical score floor, accepted in `[0, 1]`.
pub fn check_filter_threshold(name: &str, value: f64) -> Result<f64, DedupError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(DedupError::Input(format!(
            "{name} must be between 0.0 and 1.0, got {value}"
        )))
    }
}

/// Embedding similarity floor, accepted in `(0, 1]`.
pub fn check_similarity_threshold(name: &str, value: f64) -> Result<f64, DedupError> {
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(DedupError::Input(format!(
            "{name} must be greater than 0.0 and at most 1.0, got {value}"
        )))
    }
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        check_filter_threshold("blocking.filter_threshold", self.blocking.filter_threshold)?;
        check_unit_range("blocking.min_length_ratio", self.blocking.min_length_ratio)?;
        check_similarity_threshold("refine.similarity_threshold", self.refine.similarity_threshold)?;
        if self.refine.collection.trim().is_empty() {
            bail!("refine.collection must not be empty");
        }

        for (name, value) in [
            ("blocking.parallelism", &self.blocking.parallelism),
            ("refine.query_parallelism", &self.refine.query_parallelism),
            ("embedding.parallelism", &self.embedding.parallelism),
        ] {
            parse_parallelism(value).map_err(|e| anyhow::anyhow!("{name} {e}"))?;
        }

        let emb = &self.embedding;
        if emb.max_attempts == 0 {
            bail!("embedding.max_attempts must be greater than 0");
        }
        if emb.batch_size == 0 {
            bail!("embedding.batch_size must be greater than 0");
        }
        if emb.request_timeout_secs == 0 {
            bail!("embedding.request_timeout_secs must be greater than 0");
        }
        if self.index.setup_attempts == 0 {
            bail!("index.setup_attempts must be greater than 0");
        }

        Ok(())
    }

    /// Load `config.yaml` from `base_path`, writing defaults if it is missing.
    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref();
        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            std::fs::write(&path, serde_yml::to_string(&Self::default())?)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("{} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let path = self.base_path.join(CONFIG_FILE);
        std::fs::write(&path, serde_yml::to_string(&self)?)
            .with_context(|| format!("failed to write {}", path.display()))
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn output_dir(&self) -> PathBuf {
        self.base_path.join(&self.report.output_dir)
    }

    pub fn report_path(&self) -> PathBuf {
        self.output_dir().join(&self.report.report_file)
    }

    pub fn candidates_path(&self) -> PathBuf {
        self.output_dir().join(&self.report.candidates_file)
    }

    pub fn blocking_options(&self, show_progress: bool) -> BlockingOptions {
        BlockingOptions {
            filter_threshold: self.blocking.filter_threshold,
            min_length_ratio: self.blocking.min_length_ratio,
            min_token_overlap: self.blocking.min_token_overlap,
            parallelism: parse_parallelism(&self.blocking.parallelism).unwrap_or(1),
            show_progress,
        }
    }

    pub fn refine_options(&self, show_progress: bool) -> RefineOptions {
        let emb = &self.embedding;
        RefineOptions {
            similarity_threshold: self.refine.similarity_threshold,
            collection: self.refine.collection.clone(),
            row_policy: self.refine.row_policy,
            embed_retry: RetryPolicy::exponential(
                emb.max_attempts,
                Duration::from_millis(emb.backoff_base_ms),
                Duration::from_millis(emb.backoff_max_ms),
            )
            .with_jitter(Duration::from_millis(emb.backoff_jitter_ms)),
            index_retry: RetryPolicy::fixed(
                self.index.setup_attempts,
                Duration::from_millis(self.index.setup_backoff_ms),
            ),
            request_interval: Duration::from_millis(emb.request_interval_ms),
            embedding_parallelism: parse_parallelism(&emb.parallelism).unwrap_or(1),
            batch_size: emb.batch_size,
            query_parallelism: parse_parallelism(&self.refine.query_parallelism).unwrap_or(1),
            show_progress,
        }
    }
}
