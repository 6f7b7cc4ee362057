//! Candidate generation over all unordered row pairs.
//!
//! Each pair passes two cheap prefilters (length ratio, token overlap)
//! before the three lexical signals are computed. Rows are scanned in
//! parallel; results are merged into a [`PairRegistry`] by a single
//! writer so discovery order stays deterministic.

use rayon::prelude::*;

use crate::blocking::signals::{
    edit_distance_similarity, keyword_similarity, tfidf_similarity, SignalScores,
};
use crate::pairs::{CandidatePair, Method, TextRecord};
use crate::progress::ScanProgress;
use crate::registry::PairRegistry;
use crate::workers::run_in_pool;

/// Default lexical threshold for candidates
pub const DEFAULT_FILTER_THRESHOLD: f64 = 0.3;
/// Pairs whose length ratio is below this are never near duplicates
pub const DEFAULT_MIN_LENGTH_RATIO: f64 = 0.5;
/// Pairs sharing fewer tokens than this are skipped
pub const DEFAULT_MIN_TOKEN_OVERLAP: usize = 2;

#[derive(Debug, Clone)]
pub struct BlockingOptions {
    pub filter_threshold: f64,
    pub min_length_ratio: f64,
    pub min_token_overlap: usize,
    pub parallelism: usize,
    pub show_progress: bool,
}

impl Default for BlockingOptions {
    fn default() -> Self {
        Self {
            filter_threshold: DEFAULT_FILTER_THRESHOLD,
            min_length_ratio: DEFAULT_MIN_LENGTH_RATIO,
            min_token_overlap: DEFAULT_MIN_TOKEN_OVERLAP,
            parallelism: 1,
            show_progress: false,
        }
    }
}

/// Outcome of evaluating one pair.
#[derive(Debug, Clone, PartialEq)]
pub enum PairVerdict {
    /// Length ratio below the minimum (or an empty text)
    LengthMismatch,
    /// Too few shared tokens
    LowOverlap,
    /// Scored, but the best signal missed the threshold
    BelowThreshold { method: Method, score: f64 },
    Candidate(CandidatePair),
}

/// Character length ratio `min / max`; `None` if either text is empty.
pub fn length_ratio(a: &TextRecord, b: &TextRecord) -> Option<f64> {
    let (len_a, len_b) = (a.char_len(), b.char_len());
    if len_a == 0 || len_b == 0 {
        return None;
    }
    Some(len_a.min(len_b) as f64 / len_a.max(len_b) as f64)
}

/// Compute all three lexical signals. A failed TF-IDF signal counts as 0.
pub fn score_pair(a: &TextRecord, b: &TextRecord) -> SignalScores {
    let tfidf = tfidf_similarity(&a.terms, &b.terms).unwrap_or_else(|err| {
        log::trace!(
            "tfidf signal for rows ({}, {}) absorbed: {err}",
            a.row_index,
            b.row_index
        );
        0.0
    });

    SignalScores {
        keyword: keyword_similarity(&a.tokens, &b.tokens),
        tfidf,
        edit_distance: edit_distance_similarity(&a.text, &b.text),
    }
}

pub fn evaluate_pair(a: &TextRecord, b: &TextRecord, options: &BlockingOptions) -> PairVerdict {
    match length_ratio(a, b) {
        Some(ratio) if ratio >= options.min_length_ratio => {}
        _ => return PairVerdict::LengthMismatch,
    }

    let overlap = a.tokens.intersection(&b.tokens).count();
    if overlap < options.min_token_overlap {
        return PairVerdict::LowOverlap;
    }

    let (method, score) = score_pair(a, b).best();
    if score >= options.filter_threshold {
        PairVerdict::Candidate(CandidatePair::new(a, b, score, method))
    } else {
        PairVerdict::BelowThreshold { method, score }
    }
}

/// Scan every unordered pair of `records` and return the candidates.
pub fn find_candidates(records: &[TextRecord], options: &BlockingOptions) -> Vec<CandidatePair> {
    let mut registry = PairRegistry::new();
    find_candidates_into(records, options, &mut registry);
    registry.into_values()
}

/// Like [`find_candidates`], merging into an existing registry.
///
/// Re-scanning overlapping subsets keeps one entry per pair, the best one.
pub fn find_candidates_into(
    records: &[TextRecord],
    options: &BlockingOptions,
    registry: &mut PairRegistry<CandidatePair>,
) {
    let n = records.len();
    let total_pairs = (n * n.saturating_sub(1) / 2) as u64;
    log::info!("blocking {n} texts ({total_pairs} pairs)");

    let progress = ScanProgress::new("blocking", total_pairs, options.show_progress);

    let batches: Vec<Vec<CandidatePair>> = run_in_pool(options.parallelism, || {
        (0..n)
            .into_par_iter()
            .map(|i| {
                let mut found = Vec::new();
                for j in (i + 1)..n {
                    if let PairVerdict::Candidate(candidate) =
                        evaluate_pair(&records[i], &records[j], options)
                    {
                        found.push(candidate);
                    }
                }
                progress.inc((n - i - 1) as u64);
                found
            })
            .collect()
    });
    progress.finish();

    let before = registry.len();
    for candidate in batches.into_iter().flatten() {
        registry.upsert(candidate.key(), candidate);
    }

    log::info!(
        "blocking done: {} candidate pairs ({} new)",
        registry.len(),
        registry.len() - before
    );
}
