//! PD-002: Error kinds.
//!
//! Every failure is fatal to the run and carries the source location of the
//! directive or block that triggered it. Engine and I/O errors are wrapped at
//! the narrowest point and kept as the cause chain.

use super::types::SourceLocation;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{location}: cannot access file: {source}")]
    FileAccess {
        location: SourceLocation,
        #[source]
        source: std::io::Error,
    },

    #[error("{location}: configuration parse error: {source}")]
    Parse {
        location: SourceLocation,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("{location}: unsupported include extension '{extension}'")]
    UnsupportedExtension {
        location: SourceLocation,
        extension: String,
    },

    #[error("{location}: missing required field '{field}'")]
    MissingField {
        location: SourceLocation,
        field: &'static str,
    },

    #[error("{location}: unresolved variable '${{{name}}}'")]
    Expansion {
        location: SourceLocation,
        name: String,
    },

    #[error("{location}: cannot open data source: {source}")]
    Connection {
        location: SourceLocation,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{location}: query execution failed: {source}")]
    QueryExecution {
        location: SourceLocation,
        #[source]
        source: rusqlite::Error,
    },

    #[error("{location}: inclusion cycle through '{path}'")]
    InclusionCycle {
        location: SourceLocation,
        path: String,
    },

    #[error("invalid variable argument '{argument}' (expected name=value)")]
    ArgumentFormat { argument: String },

    #[error("cannot render output: {source}")]
    Render {
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    /// Location the error points at, if it has one.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::FileAccess { location, .. }
            | Self::Parse { location, .. }
            | Self::UnsupportedExtension { location, .. }
            | Self::MissingField { location, .. }
            | Self::Expansion { location, .. }
            | Self::Connection { location, .. }
            | Self::QueryExecution { location, .. }
            | Self::InclusionCycle { location, .. } => Some(location),
            Self::ArgumentFormat { .. } | Self::Render { .. } => None,
        }
    }
}
