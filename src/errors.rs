use std::fmt;

/// Setup step whose retry budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    Embedding,
    Index,
}

impl fmt::Display for SetupStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupStage::Embedding => f.write_str("embedding"),
            SetupStage::Index => f.write_str("vector index"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum DedupError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("{stage} setup failed after {attempts} attempts: {message}")]
    FatalSetup {
        stage: SetupStage,
        attempts: u32,
        message: String,
    },

    #[error("report error: {0}")]
    Report(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0:?}")]
    Io(#[from] std::io::Error),
}

impl From<base64::DecodeError> for DedupError {
    fn from(err: base64::DecodeError) -> Self {
        DedupError::Input(format!("file is not valid base64: {err}"))
    }
}
