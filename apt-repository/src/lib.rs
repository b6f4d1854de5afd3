//! # APT Repository Library
//!
//! Data model for the metadata of a Debian (APT) repository, independent
//! of where that repository is stored.
//!
//! ## Features
//!
//! - Parse and render binary package stanzas (`Packages` files)
//! - Split `epoch:version-iteration` version strings
//! - Parse and normalize dependency relations
//! - Parse and render `Release` files with deterministic output
//! - MD5, SHA1 and SHA256 hashing of index artifacts
//! - Gzip compression of index artifacts
//!
//! ## Example
//!
//! ```rust
//! use apt_repository::{HashedFile, Package, PackageFile, Release};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let package = Package::from_control("Package: foo\nVersion: 1.0-1\nArchitecture: amd64\n")?;
//! assert_eq!(package.full_version().as_deref(), Some("1.0-1"));
//!
//! let mut packages = PackageFile::new();
//! packages.add(package, false);
//! let index = packages.to_string();
//!
//! let mut release = Release::new("stable");
//! release.architectures.insert("amd64".to_string());
//! release.components.insert("main".to_string());
//! release.add_file("main/binary-amd64/Packages", HashedFile::from_data(index.as_bytes()));
//! assert!(release.to_string().contains("Architectures: amd64"));
//! # Ok(())
//! # }
//! ```

pub mod compression;
pub mod control;
pub mod dependency;
pub mod error;
pub mod hash;
pub mod packages;
pub mod release;
pub mod version;

pub use compression::Compression;
pub use dependency::{Dependency, NormalizedDependency};
pub use error::{AptRepositoryError, Result};
pub use hash::{HashAlgorithm, HashedFile};
pub use packages::{Package, PackageFile, PackageKey};
pub use release::Release;
pub use version::Version;

/// Compression formats every index artifact is published in.
pub const DEFAULT_COMPRESSIONS: &[Compression] = &[Compression::None, Compression::Gzip];

/// The architecture of architecture-independent packages.
pub const ARCH_ALL: &str = "all";
