//! Records and pair types shared by the blocking and refinement stages.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::blocking::Tokenizer;

/// One input text with its 1-based row position in the source sheet.
#[derive(Debug, Clone)]
pub struct TextRecord {
    pub row_index: usize,
    pub text: String,
    /// Distinct tokens, used by the overlap prefilter and Jaccard signal
    pub tokens: HashSet<String>,
    /// Ordered tokens with repeats, used for TF-IDF term counts
    pub terms: Vec<String>,
}

impl TextRecord {
    pub fn new(row_index: usize, text: impl Into<String>, tokenizer: &dyn Tokenizer) -> Self {
        let text = text.into();
        let terms = tokenizer.tokens(&text);
        let tokens = tokenizer.segment(&text);
        Self {
            row_index,
            text,
            tokens,
            terms,
        }
    }

    /// Length in characters (not bytes).
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Build records for `(row_index, text)` rows in input order.
pub fn records_from_rows(rows: &[(usize, String)], tokenizer: &dyn Tokenizer) -> Vec<TextRecord> {
    rows.iter()
        .map(|(row_index, text)| TextRecord::new(*row_index, text.as_str(), tokenizer))
        .collect()
}

/// Canonical identity of an unordered row pair: `row_a < row_b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub row_a: usize,
    pub row_b: usize,
}

impl PairKey {
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            row_a: a.min(b),
            row_b: a.max(b),
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row_a, self.row_b)
    }
}

/// Lexical signal that produced a candidate's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Keyword,
    Tfidf,
    EditDistance,
}

impl Method {
    /// Preference order used when two signals tie.
    pub const PRIORITY: [Method; 3] = [Method::Keyword, Method::Tfidf, Method::EditDistance];

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Keyword => "keyword",
            Method::Tfidf => "tfidf",
            Method::EditDistance => "edit_distance",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Anything the pair registry can rank.
pub trait Scored {
    fn score(&self) -> f64;
}

/// Strongest lexical signal found between two rows during blocking.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub row_a: usize,
    pub row_b: usize,
    pub text_a: String,
    pub text_b: String,
    pub score: f64,
    pub method: Method,
}

impl CandidatePair {
    /// Creates a candidate with rows (and their texts) in canonical order.
    pub fn new(first: &TextRecord, second: &TextRecord, score: f64, method: Method) -> Self {
        let (a, b) = if first.row_index <= second.row_index {
            (first, second)
        } else {
            (second, first)
        };
        Self {
            row_a: a.row_index,
            row_b: b.row_index,
            text_a: a.text.clone(),
            text_b: b.text.clone(),
            score,
            method,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.row_a, self.row_b)
    }
}

impl Scored for CandidatePair {
    fn score(&self) -> f64 {
        self.score
    }
}

/// Convert an L2 distance into a similarity in (0, 1].
pub fn similarity_from_distance(distance: f64) -> f64 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Format a [0, 1] score as a percentage with two decimals, e.g. `93.25%`.
pub fn format_percentage(score: f64) -> String {
    format!("{:.2}%", score * 100.0)
}

/// Embedding-confirmed near duplicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub row_a: usize,
    pub row_b: usize,
    pub text_a: String,
    pub text_b: String,
    pub similarity: f64,
    pub distance: f64,
}

impl SimilarPair {
    /// Creates a pair from two `(row, text)` sides and their index distance.
    pub fn new(first: (usize, &str), second: (usize, &str), distance: f64) -> Self {
        let (a, b) = if first.0 <= second.0 {
            (first, second)
        } else {
            (second, first)
        };
        let distance = distance.max(0.0);
        Self {
            row_a: a.0,
            row_b: b.0,
            text_a: a.1.to_string(),
            text_b: b.1.to_string(),
            similarity: similarity_from_distance(distance),
            distance,
        }
    }

    pub fn key(&self) -> PairKey {
        PairKey::new(self.row_a, self.row_b)
    }

    pub fn similarity_percentage(&self) -> String {
        format_percentage(self.similarity)
    }
}

impl Scored for SimilarPair {
    fn score(&self) -> f64 {
        self.similarity
    }
}
