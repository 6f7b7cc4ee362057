//! End-to-end run: rows → blocking → refinement → reports.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;

use crate::blocking::{find_candidates, BlockingOptions, MixedScriptTokenizer, Tokenizer};
use crate::config::{Config, ProviderKind};
use crate::errors::DedupError;
use crate::pairs::{records_from_rows, CandidatePair, SimilarPair};
use crate::report::{stage_candidate_report, stage_final_report, DedupResponse, StagedReport};
use crate::semantic::{
    refine, search_similar, EmbeddingProvider, MemoryIndex, OpenAiEmbedder, RefineOptions,
    SkippedComparison, VectorIndex, DEFAULT_OPENAI_BASE,
};

/// Collaborators shared by both stages of a run.
#[derive(Clone)]
pub struct PipelineContext {
    pub tokenizer: Arc<dyn Tokenizer>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub index: Arc<dyn VectorIndex>,
}

impl PipelineContext {
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            tokenizer,
            embedder,
            index,
        }
    }

    /// Build the configured provider and a fresh in-memory index.
    ///
    /// The OpenAI provider reads `OPENAI_API_KEY` and `OPENAI_API_BASE`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let emb = &config.embedding;
        let embedder: Arc<dyn EmbeddingProvider> = match emb.provider {
            ProviderKind::Openai => {
                let api_key = std::env::var("OPENAI_API_KEY")
                    .context("OPENAI_API_KEY must be set for the openai provider")?;
                let base_url = std::env::var("OPENAI_API_BASE")
                    .unwrap_or_else(|_| DEFAULT_OPENAI_BASE.to_string());
                Arc::new(OpenAiEmbedder::new(
                    &api_key,
                    &base_url,
                    &emb.openai_model,
                    emb.openai_dimensions,
                    Duration::from_secs(emb.request_timeout_secs),
                )?)
            }
            ProviderKind::Local => local_embedder(config)?,
        };
        log::info!(
            "embedding provider: {} ({} dims)",
            embedder.name(),
            embedder.dimensions()
        );

        Ok(Self::new(
            Arc::new(MixedScriptTokenizer),
            embedder,
            Arc::new(MemoryIndex::new()),
        ))
    }
}

#[cfg(feature = "local-embeddings")]
fn local_embedder(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    let model = crate::semantic::LocalEmbedder::new(
        &config.embedding.local_model,
        config.base_path().to_path_buf(),
    )?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_embedder(_config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!("built without the local-embeddings feature")
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub blocking: BlockingOptions,
    pub refine: RefineOptions,
    /// Where to write the reports; `None` skips writing
    pub final_report: Option<PathBuf>,
    pub candidate_report: Option<PathBuf>,
}

impl PipelineOptions {
    pub fn from_config(config: &Config, show_progress: bool) -> Self {
        Self {
            blocking: config.blocking_options(show_progress),
            refine: config.refine_options(show_progress),
            final_report: Some(config.report_path()),
            candidate_report: Some(config.candidates_path()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub total_records: usize,
    pub candidates: Vec<CandidatePair>,
    /// Sorted by similarity, highest first
    pub pairs: Vec<SimilarPair>,
    pub skipped: Vec<SkippedComparison>,
}

impl PipelineOutput {
    pub fn response(&self) -> DedupResponse {
        DedupResponse::new(self.total_records, &self.candidates, &self.pairs)
    }
}

/// Run both stages over `(row_index, text)` rows.
///
/// Reports are staged to temporary files and only moved into place once
/// both are written, so a failed run leaves the previous reports as they were.
pub fn run(
    ctx: &PipelineContext,
    rows: &[(usize, String)],
    options: &PipelineOptions,
) -> Result<PipelineOutput, DedupError> {
    let now = Instant::now();
    let records = records_from_rows(rows, ctx.tokenizer.as_ref());

    let candidates = find_candidates(&records, &options.blocking);
    log::debug!(
        "blocking took {}ms",
        now.elapsed().as_micros() as f64 / 1000.0
    );

    let outcome = refine(
        &candidates,
        ctx.embedder.as_ref(),
        ctx.index.as_ref(),
        &options.refine,
    )?;

    let mut staged: Vec<StagedReport> = Vec::new();
    if let Some(path) = options.candidate_report.as_deref() {
        staged.push(stage_candidate_report(path, &candidates)?);
    }
    if let Some(path) = options.final_report.as_deref() {
        match stage_final_report(path, &outcome.pairs) {
            Ok(report) => staged.push(report),
            Err(err) => {
                staged.into_iter().for_each(StagedReport::discard);
                return Err(err);
            }
        }
    }
    for report in staged {
        report.commit()?;
    }

    log::info!(
        "run finished in {:.1}s: {} records, {} candidates, {} similar pairs",
        now.elapsed().as_secs_f64(),
        records.len(),
        candidates.len(),
        outcome.pairs.len()
    );

    Ok(PipelineOutput {
        total_records: records.len(),
        candidates,
        pairs: outcome.pairs,
        skipped: outcome.skipped,
    })
}

/// Nearest rows' texts to `query` over the whole column.
pub fn search(
    ctx: &PipelineContext,
    rows: &[(usize, String)],
    query: &str,
    top_k: usize,
    options: &RefineOptions,
) -> Result<Vec<(String, f64)>, DedupError> {
    let corpus: Vec<String> = rows
        .iter()
        .map(|(_, text)| text.clone())
        .filter(|text| !text.trim().is_empty())
        .collect();
    search_similar(
        query,
        &corpus,
        top_k,
        ctx.embedder.as_ref(),
        ctx.index.as_ref(),
        options,
    )
}
