//! Cheap lexical similarity signals used during blocking.
//!
//! Every signal returns a score in [0.0, 1.0]. The TF-IDF signal can fail
//! on degenerate input; callers decide how to absorb the failure.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::pairs::Method;

/// Why a signal could not be computed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SignalError {
    #[error("empty vocabulary")]
    EmptyVocabulary,

    #[error("zero-norm document vector")]
    ZeroNorm,
}

/// Jaccard index of two token sets.
pub fn keyword_similarity(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// Cosine similarity of TF-IDF vectors fitted on exactly these two documents.
///
/// Uses raw term counts, smoothed idf `ln((1 + n) / (1 + df)) + 1` with
/// `n = 2`, and L2-normalized document vectors. Terms are summed in sorted
/// order so the score is bit-for-bit reproducible.
pub fn tfidf_similarity(a: &[String], b: &[String]) -> Result<f64, SignalError> {
    let counts_a = term_counts(a);
    let counts_b = term_counts(b);

    let vocabulary: BTreeSet<&str> = counts_a.keys().chain(counts_b.keys()).copied().collect();
    if vocabulary.is_empty() {
        return Err(SignalError::EmptyVocabulary);
    }

    let idf = |term: &str| {
        let df = counts_a.contains_key(term) as u32 + counts_b.contains_key(term) as u32;
        (3.0 / (1.0 + df as f64)).ln() + 1.0
    };

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for term in vocabulary {
        let weight = idf(term);
        let wa = counts_a.get(term).copied().unwrap_or(0) as f64 * weight;
        let wb = counts_b.get(term).copied().unwrap_or(0) as f64 * weight;
        dot += wa * wb;
        norm_a += wa * wa;
        norm_b += wb * wb;
    }

    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return Err(SignalError::ZeroNorm);
    }

    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0))
}

fn term_counts(terms: &[String]) -> HashMap<&str, u32> {
    let mut counts = HashMap::new();
    for term in terms {
        *counts.entry(term.as_str()).or_insert(0) += 1;
    }
    counts
}

/// `1 - levenshtein / max_len` over characters; 0 when both texts are empty.
pub fn edit_distance_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 0.0;
    }
    1.0 - strsim::levenshtein(a, b) as f64 / max_len as f64
}

/// The three signals computed for one pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalScores {
    pub keyword: f64,
    pub tfidf: f64,
    pub edit_distance: f64,
}

impl SignalScores {
    pub fn get(&self, method: Method) -> f64 {
        match method {
            Method::Keyword => self.keyword,
            Method::Tfidf => self.tfidf,
            Method::EditDistance => self.edit_distance,
        }
    }

    /// Highest signal; ties go to the earlier method in [`Method::PRIORITY`].
    pub fn best(&self) -> (Method, f64) {
        let mut best = (Method::Keyword, self.keyword);
        for method in Method::PRIORITY.into_iter().skip(1) {
            let score = self.get(method);
            if score > best.1 {
                best = (method, score);
            }
        }
        best
    }
}
