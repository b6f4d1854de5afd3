//! Errors raised while reading or building repository metadata.

pub type Result<T> = std::result::Result<T, AptRepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum AptRepositoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A control block or index stanza that does not parse.
    #[error("Invalid package data: {0}")]
    InvalidPackageData(String),

    #[error("Invalid release data: {0}")]
    InvalidReleaseData(String),

    /// Empty or absent upstream version.
    #[error("Malformed version: {0:?}")]
    MalformedVersion(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for field {field}: {value:?}")]
    InvalidField { field: String, value: String },
}

impl AptRepositoryError {
    pub fn invalid_package(msg: impl Into<String>) -> Self {
        Self::InvalidPackageData(msg.into())
    }

    pub fn invalid_release(msg: impl Into<String>) -> Self {
        Self::InvalidReleaseData(msg.into())
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid_field(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            value: value.into(),
        }
    }
}
