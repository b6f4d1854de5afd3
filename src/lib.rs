//! Manage a Debian APT repository kept in an object store.
//!
//! Package indices, the `Release` file and the package pool are plain
//! objects; [`repository::Repository`] keeps them consistent across
//! read-modify-write cycles, optionally under an advisory [`lock`].

pub mod config;
pub mod deb;
pub mod error;
pub mod lock;
pub mod logging;
pub mod manifest;
pub mod release;
pub mod repository;
pub mod signing;
pub mod storage;

pub use error::{Error, Result};
pub use manifest::Manifest;
pub use release::ReleaseDescriptor;
pub use repository::{Repository, UploadOptions, VerifyReport};
