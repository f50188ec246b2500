//! Error types shared by the engine, the data layer and the pipeline.

use thiserror::Error;

/// Failure raised by a [`DataSourceCursor`](crate::data::DataSourceCursor).
///
/// The engine never swallows these; they unwind the whole run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("column '{column}' not found in data source '{source_name}'")]
    ColumnNotFound { source_name: String, column: String },

    #[error("row {row} out of range (data source '{source_name}' has {count} rows)")]
    RowOutOfRange {
        source_name: String,
        row: usize,
        count: usize,
    },

    #[error("data source error: {0}")]
    Provider(String),
}

/// Anything that aborts report preparation.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("data access failed: {0}")]
    Data(#[from] DataError),

    #[error("unknown data source: {0}")]
    UnknownDataSource(String),

    #[error("invalid report definition: {0}")]
    Definition(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("page cache error: {0}")]
    Cache(String),
}

pub type Result<T> = std::result::Result<T, ReportError>;
