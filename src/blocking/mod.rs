//! Lexical blocking: the cheap first pass that narrows all row pairs down
//! to a candidate set before any embedding is computed.
//!
//! - `tokenizer`: mixed Latin/CJK token segmentation
//! - `signals`: Jaccard, pairwise TF-IDF cosine and edit-distance scores
//! - `blocker`: prefilters, signal selection and the parallel pair scan

mod blocker;
mod signals;
mod tokenizer;

pub use blocker::{
    find_candidates, score_pair, BlockingOptions, DEFAULT_FILTER_THRESHOLD,
    DEFAULT_MIN_LENGTH_RATIO, DEFAULT_MIN_TOKEN_OVERLAP,
};
pub use tokenizer::{MixedScriptTokenizer, Tokenizer};
