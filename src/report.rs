//! Tabular reports: the ranked final pairs, the lexical candidates, and
//! similarity-floor re-filtering of a saved report.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::DedupError;
use crate::pairs::{format_percentage, CandidatePair, Method, SimilarPair};

/// One row of the final similarity report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalReportRow {
    pub text1: String,
    pub text2: String,
    pub index1: usize,
    pub index2: usize,
    pub similarity: f64,
    pub distance: f64,
    pub similarity_percentage: String,
}

impl From<&SimilarPair> for FinalReportRow {
    fn from(pair: &SimilarPair) -> Self {
        Self {
            text1: pair.text_a.clone(),
            text2: pair.text_b.clone(),
            index1: pair.row_a,
            index2: pair.row_b,
            similarity: pair.similarity,
            distance: pair.distance,
            similarity_percentage: pair.similarity_percentage(),
        }
    }
}

/// One lexical candidate; `distance` is always 0 at this stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReportRow {
    pub text1: String,
    pub text2: String,
    pub index1: usize,
    pub index2: usize,
    /// Lexical score as a percentage, e.g. `40.00%`
    pub similarity: String,
    pub method: Method,
    pub distance: f64,
}

impl From<&CandidatePair> for CandidateReportRow {
    fn from(pair: &CandidatePair) -> Self {
        Self {
            text1: pair.text_a.clone(),
            text2: pair.text_b.clone(),
            index1: pair.row_a,
            index2: pair.row_b,
            similarity: format_percentage(pair.score),
            method: pair.method,
            distance: 0.0,
        }
    }
}

/// JSON body returned to front ends after a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupResponse {
    pub total_records: usize,
    pub initial_pairs: Vec<CandidateReportRow>,
    pub final_pairs: Vec<FinalReportRow>,
}

impl DedupResponse {
    pub fn new(total_records: usize, candidates: &[CandidatePair], pairs: &[SimilarPair]) -> Self {
        Self {
            total_records,
            initial_pairs: candidates.iter().map(CandidateReportRow::from).collect(),
            final_pairs: pairs.iter().map(FinalReportRow::from).collect(),
        }
    }
}

/// Similarity floor for re-exporting a saved report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFilter {
    #[default]
    All,
    Above70,
    Above80,
    Above90,
}

impl ReportFilter {
    /// Parse `all`, `70`, `80` or `90`; anything else means [`ReportFilter::All`].
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "90" => ReportFilter::Above90,
            "80" => ReportFilter::Above80,
            "70" => ReportFilter::Above70,
            _ => ReportFilter::All,
        }
    }

    pub fn floor(&self) -> f64 {
        match self {
            ReportFilter::All => 0.0,
            ReportFilter::Above70 => 0.7,
            ReportFilter::Above80 => 0.8,
            ReportFilter::Above90 => 0.9,
        }
    }

    pub fn suffix(&self) -> &'static str {
        match self {
            ReportFilter::All => "all",
            ReportFilter::Above70 => "70",
            ReportFilter::Above80 => "80",
            ReportFilter::Above90 => "90",
        }
    }

    /// File name of the filtered export.
    pub fn file_name(&self) -> String {
        format!("similarity_report_{}.csv", self.suffix())
    }
}

pub fn filter_rows(rows: &[FinalReportRow], filter: ReportFilter) -> Vec<FinalReportRow> {
    let floor = filter.floor();
    rows.iter()
        .filter(|row| row.similarity >= floor)
        .cloned()
        .collect()
}

/// A report written to a temporary sibling file, not yet under its name.
#[must_use]
#[derive(Debug)]
pub struct StagedReport {
    temp_path: PathBuf,
    path: PathBuf,
    rows: usize,
}

impl StagedReport {
    /// Move the report into place.
    pub fn commit(self) -> Result<PathBuf, DedupError> {
        std::fs::rename(&self.temp_path, &self.path)?;
        log::info!("wrote {} rows to {}", self.rows, self.path.display());
        Ok(self.path)
    }

    /// Remove the temporary file, leaving any previous report untouched.
    pub fn discard(self) {
        if let Err(e) = std::fs::remove_file(&self.temp_path) {
            log::warn!("cannot remove {}: {e}", self.temp_path.display());
        }
    }
}

fn stage_rows<T: Serialize>(
    path: &Path,
    rows: &[T],
    headers: &[&str],
) -> Result<StagedReport, DedupError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push("-tmp");
    let temp_path = PathBuf::from(temp_path);

    let mut csv_wrt = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&temp_path)?;
    // written by hand so empty reports still carry a header row
    csv_wrt.write_record(headers)?;
    for row in rows {
        csv_wrt.serialize(row)?;
    }
    csv_wrt.flush()?;

    Ok(StagedReport {
        temp_path,
        path: path.to_path_buf(),
        rows: rows.len(),
    })
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T], headers: &[&str]) -> Result<(), DedupError> {
    stage_rows(path, rows, headers)?.commit().map(|_| ())
}

const FINAL_HEADERS: [&str; 7] = [
    "text1",
    "text2",
    "index1",
    "index2",
    "similarity",
    "distance",
    "similarity_percentage",
];

const CANDIDATE_HEADERS: [&str; 7] = [
    "text1",
    "text2",
    "index1",
    "index2",
    "similarity",
    "method",
    "distance",
];

pub fn write_final_report(path: &Path, pairs: &[SimilarPair]) -> Result<(), DedupError> {
    stage_final_report(path, pairs)?.commit().map(|_| ())
}

pub fn write_final_rows(path: &Path, rows: &[FinalReportRow]) -> Result<(), DedupError> {
    write_rows(path, rows, &FINAL_HEADERS)
}

pub fn stage_final_report(path: &Path, pairs: &[SimilarPair]) -> Result<StagedReport, DedupError> {
    let rows: Vec<FinalReportRow> = pairs.iter().map(FinalReportRow::from).collect();
    stage_rows(path, &rows, &FINAL_HEADERS)
}

pub fn stage_candidate_report(
    path: &Path,
    candidates: &[CandidatePair],
) -> Result<StagedReport, DedupError> {
    let rows: Vec<CandidateReportRow> = candidates.iter().map(CandidateReportRow::from).collect();
    stage_rows(path, &rows, &CANDIDATE_HEADERS)
}

pub fn read_final_report(path: &Path) -> Result<Vec<FinalReportRow>, DedupError> {
    if !path.exists() {
        return Err(DedupError::Report(format!(
            "no report at {}; run a comparison first",
            path.display()
        )));
    }

    let mut csv_reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in csv_reader.deserialize() {
        rows.push(row?);
    }
    Ok(rows)
}

/// Re-export the report at `report_path` keeping rows at or above the
/// filter's floor. Returns the path of the written file.
pub fn filter_report(report_path: &Path, filter: ReportFilter) -> Result<PathBuf, DedupError> {
    let rows = read_final_report(report_path)?;
    let kept = filter_rows(&rows, filter);

    let out_path = report_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(filter.file_name());
    write_final_rows(&out_path, &kept)?;

    log::info!(
        "filtered report at floor {}: kept {} of {} rows",
        filter.floor(),
        kept.len(),
        rows.len()
    );
    Ok(out_path)
}
