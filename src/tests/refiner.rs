use std::sync::Arc;

use crate::blocking::MixedScriptTokenizer;
use crate::errors::{DedupError, SetupStage};
use crate::pairs::{CandidatePair, Method, PairKey, TextRecord};
use crate::semantic::{refine, MemoryIndex, RowPolicy, VectorIndex};
use crate::tests::fakes::{
    fast_refine_options, FaultyIndex, FlakyEmbedder, HashEmbedder, TableEmbedder,
};

fn candidate(a: (usize, &str), b: (usize, &str)) -> CandidatePair {
    CandidatePair::new(
        &TextRecord::new(a.0, a.1, &MixedScriptTokenizer),
        &TextRecord::new(b.0, b.1, &MixedScriptTokenizer),
        0.5,
        Method::Keyword,
    )
}

fn line_embedder() -> TableEmbedder {
    TableEmbedder::new(&[
        ("a", &[0.0, 0.0]),
        ("b", &[0.1, 0.0]),
        ("c", &[0.5, 0.0]),
        ("d", &[0.0, 0.2]),
    ])
}

fn line_candidates() -> Vec<CandidatePair> {
    vec![
        candidate((1, "a"), (2, "b")),
        candidate((1, "a"), (3, "c")),
        candidate((3, "c"), (4, "d")),
    ]
}

#[test]
fn test_identical_rows_get_distance_zero() {
    let text = "the quick brown fox jumps over the lazy dog";
    let candidates = vec![candidate((1, text), (3, text))];
    let index = MemoryIndex::new();

    let outcome = refine(
        &candidates,
        &HashEmbedder { dims: 64 },
        &index,
        &fast_refine_options(0.85),
    )
    .unwrap();

    assert_eq!(outcome.embedded_texts, 1);
    assert_eq!(outcome.pairs.len(), 1);
    let pair = &outcome.pairs[0];
    assert_eq!(pair.key(), PairKey::new(1, 3));
    assert_eq!(pair.distance, 0.0);
    assert_eq!(pair.similarity, 1.0);
    assert_eq!(pair.similarity_percentage(), "100.00%");
}

#[test]
fn test_all_rows_policy_pairs_every_duplicate_row() {
    let text = "same words on several rows";
    let candidates = vec![
        candidate((1, text), (2, text)),
        candidate((2, text), (4, text)),
    ];

    let outcome = refine(
        &candidates,
        &HashEmbedder { dims: 64 },
        &MemoryIndex::new(),
        &fast_refine_options(0.85),
    )
    .unwrap();

    let keys: Vec<PairKey> = outcome.pairs.iter().map(|p| p.key()).collect();
    assert_eq!(
        keys,
        vec![PairKey::new(1, 2), PairKey::new(1, 4), PairKey::new(2, 4)]
    );
}

#[test]
fn test_first_row_policy_collapses_duplicates() {
    let text = "same words on several rows";
    let candidates = vec![
        candidate((1, text), (2, text)),
        candidate((2, "same words on several rows again"), (5, text)),
    ];
    let mut options = fast_refine_options(0.1);
    options.row_policy = RowPolicy::FirstRow;

    let outcome = refine(
        &candidates,
        &HashEmbedder { dims: 64 },
        &MemoryIndex::new(),
        &options,
    )
    .unwrap();

    // the duplicated text stands for row 1 only, so only (1, 2) remains
    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(outcome.pairs[0].key(), PairKey::new(1, 2));
}

#[test]
fn test_pairs_sorted_by_similarity() {
    let outcome = refine(
        &line_candidates(),
        &line_embedder(),
        &MemoryIndex::new(),
        &fast_refine_options(0.5),
    )
    .unwrap();

    // every pair of the four texts lies within distance 1
    assert_eq!(outcome.pairs.len(), 6);
    for window in outcome.pairs.windows(2) {
        assert!(window[0].similarity >= window[1].similarity);
    }
    assert_eq!(outcome.pairs[0].key(), PairKey::new(1, 2));
}

#[test]
fn test_threshold_applies_to_similarity() {
    let outcome = refine(
        &line_candidates(),
        &line_embedder(),
        &MemoryIndex::new(),
        &fast_refine_options(0.9),
    )
    .unwrap();

    // only a-b at distance 0.1 clears 1 / (1 + d) >= 0.9
    assert_eq!(outcome.pairs.len(), 1);
    let pair = &outcome.pairs[0];
    assert_eq!(pair.key(), PairKey::new(1, 2));
    assert!((pair.distance - 0.1).abs() < 1e-6);
    assert!(pair.similarity >= 0.9);
}

#[test]
fn test_failed_query_is_skipped_and_run_continues() {
    let index = FaultyIndex::failing_queries(vec![vec![0.1, 0.0]]);

    let outcome = refine(
        &line_candidates(),
        &line_embedder(),
        &index,
        &fast_refine_options(0.9),
    )
    .unwrap();

    assert_eq!(outcome.skipped.len(), 1);
    assert_eq!(outcome.skipped[0].text, "b");
    // still found from the query for "a"
    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(outcome.pairs[0].key(), PairKey::new(1, 2));
}

#[test]
fn test_provider_failing_twice_recovers() {
    let embedder = FlakyEmbedder::new(line_embedder(), 2);

    let outcome = refine(
        &line_candidates(),
        &embedder,
        &MemoryIndex::new(),
        &fast_refine_options(0.9),
    )
    .unwrap();

    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(embedder.calls(), 4 + 2);
}

#[test]
fn test_provider_failing_four_times_is_fatal() {
    let embedder = FlakyEmbedder::new(line_embedder(), 4);
    let index = MemoryIndex::new();

    let result = refine(
        &line_candidates(),
        &embedder,
        &index,
        &fast_refine_options(0.9),
    );

    match result {
        Err(DedupError::FatalSetup {
            stage: SetupStage::Embedding,
            attempts,
            ..
        }) => assert_eq!(attempts, 3),
        other => panic!("expected fatal embedding error, got {other:?}"),
    }
    assert!(embedder.calls() >= 3);
    // nothing was indexed
    assert!(!index.has_collection("text_vectors").unwrap());
}

#[test]
fn test_index_setup_retries_then_succeeds() {
    let index = FaultyIndex::failing_setup(2);

    let outcome = refine(
        &line_candidates(),
        &line_embedder(),
        &index,
        &fast_refine_options(0.9),
    )
    .unwrap();

    assert_eq!(outcome.pairs.len(), 1);
    assert_eq!(index.len("text_vectors").unwrap(), 4);
}

#[test]
fn test_index_setup_exhausted_is_fatal() {
    let index = FaultyIndex::failing_setup(3);

    let result = refine(
        &line_candidates(),
        &line_embedder(),
        &index,
        &fast_refine_options(0.9),
    );

    assert!(matches!(
        result,
        Err(DedupError::FatalSetup {
            stage: SetupStage::Index,
            attempts: 3,
            ..
        })
    ));
}

#[test]
fn test_rebuild_discards_previous_run() {
    let index = Arc::new(MemoryIndex::new());
    let options = fast_refine_options(0.9);

    refine(&line_candidates(), &line_embedder(), index.as_ref(), &options).unwrap();
    assert_eq!(index.len("text_vectors").unwrap(), 4);

    let text = "a fresh run with one duplicated text";
    let candidates = vec![candidate((1, text), (2, text))];
    refine(&candidates, &HashEmbedder { dims: 2 }, index.as_ref(), &options).unwrap();
    assert_eq!(index.len("text_vectors").unwrap(), 1);
}

#[test]
fn test_no_candidates_short_circuits() {
    let embedder = FlakyEmbedder::new(line_embedder(), 0);
    let index = MemoryIndex::new();

    let outcome = refine(&[], &embedder, &index, &fast_refine_options(0.85)).unwrap();

    assert!(outcome.pairs.is_empty());
    assert_eq!(embedder.calls(), 0);
    assert!(!index.has_collection("text_vectors").unwrap());
}

#[test]
fn test_batched_parallel_refinement_matches_serial() {
    let texts = [
        "customer cannot log in after password reset",
        "customer can not log in after a password reset",
        "weekly sales numbers for the northern region",
        "weekly sales figures for the northern region",
        "机器学习是人工智能的一个子领域",
        "机器学习是人工智能的重要子领域",
        "the build fails on windows with a linker error",
    ];
    let mut candidates = line_candidates();
    for (i, a) in texts.iter().enumerate() {
        for (j, b) in texts.iter().enumerate().skip(i + 1) {
            candidates.push(candidate((10 + i, *a), (10 + j, *b)));
        }
    }

    let serial = fast_refine_options(0.5);
    let mut parallel = fast_refine_options(0.5);
    parallel.batch_size = 3;
    parallel.embedding_parallelism = 4;
    parallel.query_parallelism = 4;

    let line = line_embedder();
    let expected = refine(&line_candidates(), &line, &MemoryIndex::new(), &serial).unwrap();
    let actual = refine(&line_candidates(), &line, &MemoryIndex::new(), &parallel).unwrap();
    assert_eq!(actual.pairs, expected.pairs);
    assert!(!expected.pairs.is_empty());

    let hashed = HashEmbedder { dims: 64 };
    let expected = refine(&candidates, &hashed, &MemoryIndex::new(), &serial).unwrap();
    let actual = refine(&candidates, &hashed, &MemoryIndex::new(), &parallel).unwrap();
    assert_eq!(actual.embedded_texts, expected.embedded_texts);
    assert_eq!(actual.pairs, expected.pairs);
    assert!(actual.skipped.is_empty());
}
