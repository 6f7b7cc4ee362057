use std::sync::Arc;

use crate::blocking::BlockingOptions;
use crate::errors::{DedupError, SetupStage};
use crate::pairs::PairKey;
use crate::pipeline::{run, search, PipelineOptions};
use crate::report::read_final_report;
use crate::semantic::MemoryIndex;
use crate::tests::fakes::{
    context_with, fast_refine_options, hash_context, rows, FlakyEmbedder, HashEmbedder,
};

fn options_in(dir: &std::path::Path, similarity_threshold: f64) -> PipelineOptions {
    PipelineOptions {
        blocking: BlockingOptions::default(),
        refine: fast_refine_options(similarity_threshold),
        final_report: Some(dir.join("similarity_report.csv")),
        candidate_report: Some(dir.join("initial_pairs.csv")),
    }
}

#[test]
fn test_chinese_scenario_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = rows(&[
        "机器学习是人工智能的一个子领域",
        "人工智能的分支领域包括机器学习",
        "Python是一门编程语言",
    ]);

    // any two unit vectors lie within distance sqrt(2), so 0.3 keeps (1, 2)
    let output = run(&hash_context(), &input, &options_in(dir.path(), 0.3)).unwrap();

    assert_eq!(output.total_records, 3);
    assert_eq!(output.candidates.len(), 1);
    assert_eq!(output.pairs.len(), 1);
    assert_eq!(output.pairs[0].key(), PairKey::new(1, 2));
    assert!(output.skipped.is_empty());

    let response = output.response();
    assert_eq!(response.initial_pairs[0].distance, 0.0);
    assert!(response.initial_pairs[0].similarity.ends_with('%'));
    assert_eq!(response.final_pairs[0].index1, 1);
    assert_eq!(response.final_pairs[0].index2, 2);
}

#[test]
fn test_default_threshold_rejects_loose_match() {
    let dir = tempfile::tempdir().unwrap();
    let input = rows(&[
        "机器学习是人工智能的一个子领域",
        "人工智能的分支领域包括机器学习",
    ]);

    let output = run(&hash_context(), &input, &options_in(dir.path(), 0.85)).unwrap();

    assert_eq!(output.candidates.len(), 1);
    assert!(output.pairs.is_empty());
}

#[test]
fn test_identical_rows_reported_with_zero_distance() {
    let dir = tempfile::tempdir().unwrap();
    let input = rows(&[
        "customer cannot log in after password reset",
        "weekly sales numbers for the northern region",
        "customer cannot log in after password reset",
    ]);

    let output = run(&hash_context(), &input, &options_in(dir.path(), 0.85)).unwrap();

    assert_eq!(output.pairs.len(), 1);
    let pair = &output.pairs[0];
    assert_eq!(pair.key(), PairKey::new(1, 3));
    assert_eq!(pair.distance, 0.0);
    assert_eq!(pair.similarity, 1.0);

    let saved = read_final_report(&dir.path().join("similarity_report.csv")).unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].similarity_percentage, "100.00%");
    assert_eq!((saved[0].index1, saved[0].index2), (1, 3));

    let candidates = std::fs::read_to_string(dir.path().join("initial_pairs.csv")).unwrap();
    let mut lines = candidates.lines();
    assert_eq!(
        lines.next(),
        Some("text1,text2,index1,index2,similarity,method,distance")
    );
    assert!(lines
        .next()
        .unwrap()
        .ends_with(",1,3,100.00%,keyword,0.0"));
}

#[test]
fn test_fatal_embedding_failure_writes_no_report() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with(
        Arc::new(FlakyEmbedder::new(HashEmbedder { dims: 32 }, 4)),
        Arc::new(MemoryIndex::new()),
    );
    let input = rows(&[
        "customer cannot log in after password reset",
        "customer cannot log in after password reset",
    ]);

    let result = run(&ctx, &input, &options_in(dir.path(), 0.85));

    assert!(matches!(
        result,
        Err(DedupError::FatalSetup {
            stage: SetupStage::Embedding,
            ..
        })
    ));
    assert!(!dir.path().join("similarity_report.csv").exists());
    assert!(!dir.path().join("initial_pairs.csv").exists());
}

#[test]
fn test_failed_final_report_keeps_previous_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let candidates_path = dir.path().join("initial_pairs.csv");
    std::fs::write(&candidates_path, "previous run\n").unwrap();
    // a regular file where the final report's directory should be
    let blocker = dir.path().join("blocked");
    std::fs::write(&blocker, "").unwrap();

    let options = PipelineOptions {
        final_report: Some(blocker.join("similarity_report.csv")),
        ..options_in(dir.path(), 0.85)
    };
    let input = rows(&[
        "customer cannot log in after password reset",
        "customer cannot log in after password reset",
    ]);

    let result = run(&hash_context(), &input, &options);

    assert!(matches!(result, Err(DedupError::Io(_))));
    assert_eq!(
        std::fs::read_to_string(&candidates_path).unwrap(),
        "previous run\n"
    );
    assert!(!dir.path().join("initial_pairs.csv-tmp").exists());
}

#[test]
fn test_flaky_provider_still_completes() {
    let dir = tempfile::tempdir().unwrap();
    let ctx = context_with(
        Arc::new(FlakyEmbedder::new(HashEmbedder { dims: 32 }, 2)),
        Arc::new(MemoryIndex::new()),
    );
    let input = rows(&[
        "customer cannot log in after password reset",
        "customer cannot log in after password reset",
    ]);

    let output = run(&ctx, &input, &options_in(dir.path(), 0.85)).unwrap();
    assert_eq!(output.pairs.len(), 1);
    assert!(dir.path().join("similarity_report.csv").exists());
}

#[test]
fn test_empty_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = run(&hash_context(), &[], &options_in(dir.path(), 0.85)).unwrap();

    assert_eq!(output.total_records, 0);
    assert!(output.candidates.is_empty());
    assert!(output.pairs.is_empty());
    let saved = read_final_report(&dir.path().join("similarity_report.csv")).unwrap();
    assert!(saved.is_empty());
}

#[test]
fn test_search_returns_nearest_first() {
    let input = rows(&[
        "rust async runtime",
        "",
        "baking sourdough bread at home",
        "rust async runtime internals",
    ]);
    let mut options = fast_refine_options(0.85);
    options.collection = "search".to_string();

    let hits = search(&hash_context(), &input, "rust async runtime", 2, &options).unwrap();

    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].0, "rust async runtime");
    assert_eq!(hits[0].1, 1.0);
    assert_eq!(hits[1].0, "rust async runtime internals");
}
