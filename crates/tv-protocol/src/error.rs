//! Artifact error types

use thiserror::Error;

/// Errors that can occur while reading or writing a tunnel intent artifact
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// The markup could not be tokenized or written
    #[error("Malformed artifact markup: {0}")]
    Malformed(String),

    /// A required element was not present
    #[error("Missing required element: {0}")]
    MissingField(&'static str),

    /// An element was present but its value did not parse
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    /// The status element held something other than create/delete
    #[error("Unknown intent status: {0}")]
    UnknownStatus(String),
}

impl From<quick_xml::Error> for ArtifactError {
    fn from(err: quick_xml::Error) -> Self {
        ArtifactError::Malformed(err.to_string())
    }
}

impl From<std::io::Error> for ArtifactError {
    fn from(err: std::io::Error) -> Self {
        ArtifactError::Malformed(err.to_string())
    }
}
