//! Error handling for repository operations

use thiserror::Error;

/// Main error type for repository operations
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed package or release metadata
    #[error(transparent)]
    Metadata(#[from] apt_repository::AptRepositoryError),

    /// Blob store backend failure
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An object exists with different content and overwriting was refused
    #[error("File {0} already exists with different contents")]
    AlreadyExists(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A package file named on the command line does not exist
    #[error("File {0} doesn't exist")]
    MissingFile(String),

    /// The control block of a package file could not be extracted
    #[error("Failed to read control file of {path}: {message}")]
    ControlExtraction { path: String, message: String },

    /// The signing tool failed or did not produce its output
    #[error("Signing failed: {0}")]
    Signing(String),

    /// Another claimant overwrote the lock between our write and read-back
    #[error("Lock at {path} was taken by {holder}")]
    LockLost { path: String, holder: String },

    /// The lock never became free
    #[error("Unable to obtain lock at {path} after {attempts} attempts, giving up")]
    LockTimeout { path: String, attempts: u32 },

    /// Delete or copy matched no packages
    #[error("No packages were {action}")]
    NothingMatched { action: &'static str },

    /// No such package for `show`
    #[error("No such package found")]
    PackageNotFound,

    /// An `all` package was uploaded to a repository without concrete architectures
    #[error(
        "Package {0} has architecture 'all' but no architecture-specific manifests exist; \
         upload a package for a concrete architecture first"
    )]
    AllArchitectureWithoutManifests(String),
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, Error>;
