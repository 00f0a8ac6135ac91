use thiserror::Error;

pub type SegmentResult<T> = Result<T, SegmentError>;

#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Missing column: {column}")]
    MissingColumn { column: String },

    #[error("Insufficient columns: needed {needed}, found {found}")]
    InsufficientColumns { needed: usize, found: usize },

    #[error("Degenerate input: {0}")]
    DegenerateInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] polars::prelude::PolarsError),
}

impl SegmentError {
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }

    /// Errors that mean "this rule does not apply to this table" rather than
    /// "this rule broke". The engine driver turns these into skips.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Self::MissingColumn { .. } | Self::InsufficientColumns { .. }
        )
    }
}
