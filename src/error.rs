use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopicError>;

#[derive(Error, Debug)]
pub enum TopicError {
    /// Caller bug: bad topic count, threshold or range. Raised before any fitting.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Every configured input source was absent.
    #[error("No input source available (tried: {})", display_paths(.tried))]
    MissingInput { tried: Vec<PathBuf> },

    #[error("Duplicate review_id in input: {0}")]
    DuplicateReviewId(String),

    #[error("Partition {bank} skipped: {reason}")]
    EmptyPartitionCorpus { bank: String, reason: String },

    /// No term survived the document-frequency bounds.
    #[error("Empty vocabulary: {0}")]
    EmptyVocabulary(String),

    #[error("Numeric degeneracy in {bank}: {matrix} row {row} sums to {sum}")]
    NumericDegeneracy {
        bank: String,
        matrix: &'static str,
        row: usize,
        sum: f64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl TopicError {
    /// Fatal errors abort the whole run; the rest only withdraw one partition.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            TopicError::EmptyPartitionCorpus { .. }
                | TopicError::EmptyVocabulary(_)
                | TopicError::NumericDegeneracy { .. }
        )
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
