//! Embedding-based refinement of lexical candidates.
//!
//! The refiner embeds every distinct candidate text once, rebuilds the
//! run's vector collection, then queries it per text and keeps the pairs
//! whose `1 / (1 + distance)` clears the similarity threshold.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::errors::{DedupError, SetupStage};
use crate::pairs::{similarity_from_distance, CandidatePair, PairKey, SimilarPair};
use crate::progress::ScanProgress;
use crate::registry::PairRegistry;
use crate::semantic::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::semantic::index::{Hit, IndexError, VectorIndex};
use crate::semantic::retry::RetryPolicy;
use crate::workers::run_in_pool;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;
pub const DEFAULT_COLLECTION: &str = "text_vectors";

/// Which rows a text stands for when several rows share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowPolicy {
    /// Every candidate row carrying the text
    #[default]
    AllRows,
    /// Lowest row index only
    FirstRow,
    /// Highest row index only
    LastRow,
}

#[derive(Debug, Clone)]
pub struct RefineOptions {
    pub similarity_threshold: f64,
    pub collection: String,
    pub row_policy: RowPolicy,
    pub embed_retry: RetryPolicy,
    pub index_retry: RetryPolicy,
    /// Pause after each embedding request
    pub request_interval: Duration,
    pub embedding_parallelism: usize,
    /// Texts per embedding request
    pub batch_size: usize,
    pub query_parallelism: usize,
    pub show_progress: bool,
}

impl Default for RefineOptions {
    fn default() -> Self {
        Self {
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            collection: DEFAULT_COLLECTION.to_string(),
            row_policy: RowPolicy::default(),
            embed_retry: RetryPolicy::exponential(3, Duration::from_secs(1), Duration::from_secs(30)),
            index_retry: RetryPolicy::fixed(3, Duration::from_secs(1)),
            request_interval: Duration::from_millis(500),
            embedding_parallelism: 1,
            batch_size: 1,
            query_parallelism: 1,
            show_progress: false,
        }
    }
}

/// Distinct candidate texts and the rows each one stands for.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    texts: Vec<String>,
    rows: HashMap<String, Vec<usize>>,
}

impl Vocabulary {
    /// Collect texts in first-seen order; rows per text are sorted.
    pub fn from_candidates(candidates: &[CandidatePair], policy: RowPolicy) -> Self {
        let mut vocab = Vocabulary::default();
        for candidate in candidates {
            vocab.add(candidate.row_a, &candidate.text_a);
            vocab.add(candidate.row_b, &candidate.text_b);
        }

        for rows in vocab.rows.values_mut() {
            rows.sort_unstable();
            rows.dedup();
            match policy {
                RowPolicy::AllRows => {}
                RowPolicy::FirstRow => rows.truncate(1),
                RowPolicy::LastRow => {
                    let last = rows.split_off(rows.len() - 1);
                    *rows = last;
                }
            }
        }
        vocab
    }

    fn add(&mut self, row: usize, text: &str) {
        match self.rows.get_mut(text) {
            Some(rows) => rows.push(row),
            None => {
                self.texts.push(text.to_string());
                self.rows.insert(text.to_string(), vec![row]);
            }
        }
    }

    pub fn texts(&self) -> &[String] {
        &self.texts
    }

    pub fn rows_for(&self, text: &str) -> &[usize] {
        self.rows.get(text).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// A text whose index query failed; its comparisons were skipped.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedComparison {
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RefineOutcome {
    /// Sorted by similarity, highest first
    pub pairs: Vec<SimilarPair>,
    pub skipped: Vec<SkippedComparison>,
    pub embedded_texts: usize,
}

/// Run the full refinement stage over `candidates`.
pub fn refine(
    candidates: &[CandidatePair],
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    options: &RefineOptions,
) -> Result<RefineOutcome, DedupError> {
    let vocab = Vocabulary::from_candidates(candidates, options.row_policy);
    if vocab.is_empty() {
        log::info!("no candidates to refine");
        return Ok(RefineOutcome::default());
    }
    log::info!(
        "refining {} candidate pairs over {} distinct texts with {}",
        candidates.len(),
        vocab.len(),
        provider.name()
    );

    let embeddings = acquire_embeddings(provider, vocab.texts(), options)?;
    let entries: Vec<(String, Vec<f32>)> = vocab.texts().iter().cloned().zip(embeddings).collect();

    let dimensions = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
    populate_index(index, &options.collection, dimensions, &entries, &options.index_retry)?;

    let (mut pairs, skipped) = scan(index, &vocab, &entries, options);
    pairs.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));

    log::info!(
        "refinement done: {} similar pairs, {} skipped queries",
        pairs.len(),
        skipped.len()
    );
    Ok(RefineOutcome {
        pairs,
        skipped,
        embedded_texts: entries.len(),
    })
}

/// Embed each text once, in order. Running out of retries is fatal.
pub fn acquire_embeddings(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    options: &RefineOptions,
) -> Result<Vec<Vec<f32>>, DedupError> {
    let chunks: Vec<&[String]> = texts.chunks(options.batch_size.max(1)).collect();
    let progress = ScanProgress::new("embedding", texts.len() as u64, options.show_progress);

    let batches: Result<Vec<Vec<Vec<f32>>>, DedupError> =
        run_in_pool(options.embedding_parallelism, || {
            chunks
                .par_iter()
                .map(|chunk| {
                    let inputs: Vec<&str> = chunk.iter().map(String::as_str).collect();
                    let result = options.embed_retry.run("embedding", |_| {
                        let vectors = provider.embed_batch(&inputs)?;
                        check_vectors(&vectors, inputs.len(), provider.dimensions())?;
                        Ok::<_, EmbeddingError>(vectors)
                    });
                    if !options.request_interval.is_zero() {
                        std::thread::sleep(options.request_interval);
                    }
                    progress.inc(chunk.len() as u64);

                    result.map_err(|exhausted| {
                        log::error!(
                            "embedding failed (transient: {}): {}",
                            exhausted.source.is_transient(),
                            exhausted.source
                        );
                        DedupError::FatalSetup {
                            stage: SetupStage::Embedding,
                            attempts: exhausted.attempts,
                            message: exhausted.source.to_string(),
                        }
                    })
                })
                .collect()
        });
    progress.finish();

    Ok(batches?.into_iter().flatten().collect())
}

fn check_vectors(
    vectors: &[Vec<f32>],
    expected_len: usize,
    dimensions: usize,
) -> Result<(), EmbeddingError> {
    if vectors.len() != expected_len {
        return Err(EmbeddingError::EmbeddingFailed(format!(
            "expected {expected_len} embeddings, got {}",
            vectors.len()
        )));
    }
    if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimensions,
            got: bad.len(),
        });
    }
    Ok(())
}

/// Drop, recreate, fill and flush the collection, retrying the whole setup.
pub fn populate_index(
    index: &dyn VectorIndex,
    collection: &str,
    dimensions: usize,
    entries: &[(String, Vec<f32>)],
    retry: &RetryPolicy,
) -> Result<(), DedupError> {
    retry
        .run("index setup", |_| {
            index.create_or_reset(collection, dimensions)?;
            index.insert(collection, entries)?;
            index.flush(collection)?;
            Ok::<_, IndexError>(())
        })
        .map_err(|exhausted| DedupError::FatalSetup {
            stage: SetupStage::Index,
            attempts: exhausted.attempts,
            message: exhausted.source.to_string(),
        })?;
    log::info!(
        "collection '{collection}' ready with {} vectors of {dimensions} dims",
        entries.len()
    );
    Ok(())
}

fn scan(
    index: &dyn VectorIndex,
    vocab: &Vocabulary,
    entries: &[(String, Vec<f32>)],
    options: &RefineOptions,
) -> (Vec<SimilarPair>, Vec<SkippedComparison>) {
    let k = vocab.len();
    let progress = ScanProgress::new("refining", entries.len() as u64, options.show_progress);

    let results: Vec<Result<Vec<Hit>, IndexError>> =
        run_in_pool(options.query_parallelism, || {
            entries
                .par_iter()
                .map(|(_, embedding)| {
                    let hits = index.knn_search(&options.collection, embedding, k);
                    progress.inc(1);
                    hits
                })
                .collect()
        });
    progress.finish();

    let mut registry: PairRegistry<SimilarPair> = PairRegistry::new();
    let mut skipped = Vec::new();

    for ((text, _), result) in entries.iter().zip(results) {
        let hits = match result {
            Ok(hits) => hits,
            Err(err) => {
                log::warn!("query for text {text:?} failed, skipping its comparisons: {err}");
                skipped.push(SkippedComparison {
                    text: text.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let query_rows = vocab.rows_for(text);
        for hit in hits {
            let distance = f64::from(hit.distance);
            if hit.text == *text {
                // rows sharing the exact text pair through the self hit
                for (i, &row_a) in query_rows.iter().enumerate() {
                    for &row_b in &query_rows[i + 1..] {
                        offer(&mut registry, (row_a, text), (row_b, text), distance, options);
                    }
                }
                continue;
            }

            for &row_a in query_rows {
                for &row_b in vocab.rows_for(&hit.text) {
                    offer(&mut registry, (row_a, text), (row_b, &hit.text), distance, options);
                }
            }
        }
    }

    (registry.into_values(), skipped)
}

/// Emit the pair if its key is not yet final and it clears the threshold.
fn offer(
    registry: &mut PairRegistry<SimilarPair>,
    first: (usize, &str),
    second: (usize, &str),
    distance: f64,
    options: &RefineOptions,
) {
    if first.0 == second.0 || registry.contains(&PairKey::new(first.0, second.0)) {
        return;
    }
    let pair = SimilarPair::new(first, second, distance);
    if pair.similarity >= options.similarity_threshold {
        log::debug!(
            "similar pair {} similarity={:.4} distance={:.4}",
            pair.key(),
            pair.similarity,
            pair.distance
        );
        registry.upsert(pair.key(), pair);
    }
}

/// Nearest neighbours of a single text among `corpus`, by embedding.
///
/// Builds its own collection, so it must not share a name with a running
/// refinement.
pub fn search_similar(
    query: &str,
    corpus: &[String],
    top_k: usize,
    provider: &dyn EmbeddingProvider,
    index: &dyn VectorIndex,
    options: &RefineOptions,
) -> Result<Vec<(String, f64)>, DedupError> {
    let mut seen = HashSet::new();
    let texts: Vec<String> = corpus
        .iter()
        .filter(|text| seen.insert(text.as_str()))
        .cloned()
        .collect();
    if texts.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }

    let embeddings = acquire_embeddings(provider, &texts, options)?;
    let entries: Vec<(String, Vec<f32>)> = texts.into_iter().zip(embeddings).collect();
    let dimensions = entries.first().map(|(_, v)| v.len()).unwrap_or(0);
    populate_index(index, &options.collection, dimensions, &entries, &options.index_retry)?;

    let mut query_vector = acquire_embeddings(provider, &[query.to_string()], options)?;
    let query_vector = query_vector.pop().unwrap_or_default();

    let hits = index
        .knn_search(&options.collection, &query_vector, top_k)
        .map_err(|err| DedupError::FatalSetup {
            stage: SetupStage::Index,
            attempts: 1,
            message: err.to_string(),
        })?;

    Ok(hits
        .into_iter()
        .map(|hit| {
            let similarity = similarity_from_distance(f64::from(hit.distance));
            (hit.text, similarity)
        })
        .collect())
}
