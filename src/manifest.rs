//! Per-architecture package index.

use crate::error::{Error, Result};
use crate::storage::{Conflict, Storage, StoreOutcome};
use apt_repository::{AptRepositoryError, HashedFile, Package, PackageFile, DEFAULT_COMPRESSIONS};
use std::collections::BTreeMap;
use tracing::{debug, info};

const PACKAGE_CONTENT_TYPE: &str = "application/octet-stream; charset=binary";

/// The `Packages` index of one (codename, component, architecture).
#[derive(Debug, Clone)]
pub struct Manifest {
    pub codename: String,
    pub component: String,
    pub architecture: String,
    pub packages: PackageFile,
    /// Packages whose content still has to be written to the pool.
    pending: Vec<Package>,
    /// Index artifacts produced by the last [`Manifest::write`], keyed by
    /// path relative to `dists/{codename}`.
    pub files: BTreeMap<String, HashedFile>,
    pub cache_control: Option<String>,
    /// Refuse to overwrite pool objects whose content differs.
    pub fail_if_exists: bool,
}

impl Manifest {
    pub fn new(codename: &str, component: &str, architecture: &str) -> Self {
        Self {
            codename: codename.to_string(),
            component: component.to_string(),
            architecture: architecture.to_string(),
            packages: PackageFile::new(),
            pending: Vec::new(),
            files: BTreeMap::new(),
            cache_control: None,
            fail_if_exists: false,
        }
    }

    /// Load the index from the store; a missing index is an empty one.
    pub fn retrieve(
        storage: &Storage,
        codename: &str,
        component: &str,
        architecture: &str,
        cache_control: Option<&str>,
    ) -> Result<Self> {
        let mut manifest = Self::new(codename, component, architecture);
        manifest.cache_control = cache_control.map(str::to_string);
        if let Some(data) = storage.read(&manifest.packages_path())? {
            let text = String::from_utf8(data).map_err(|e| {
                AptRepositoryError::invalid_package(format!("{}: {}", manifest.packages_path(), e))
            })?;
            manifest.packages = text.parse()?;
            debug!(
                "Loaded {} packages from {}",
                manifest.packages.len(),
                manifest.packages_path()
            );
        }
        Ok(manifest)
    }

    /// Directory of the index relative to `dists/{codename}`.
    pub fn index_dir(&self) -> String {
        format!("{}/binary-{}", self.component, self.architecture)
    }

    /// Repository path of the uncompressed index.
    pub fn packages_path(&self) -> String {
        format!("dists/{}/{}/Packages", self.codename, self.index_dir())
    }

    /// Insert `package`, evicting per [`PackageFile::add`].
    ///
    /// With `needs_uploading` the package's content is written to its pool
    /// path by the next [`Manifest::write`].
    pub fn add(&mut self, mut package: Package, preserve_versions: bool, needs_uploading: bool) {
        if package.url_filename.is_none() {
            package.url_filename = Some(package.pool_path(&self.codename));
        }
        let evicted = self.packages.add(package.clone(), preserve_versions);
        self.pending.retain(|p| !evicted.contains(p));
        if needs_uploading {
            self.pending.push(package);
        }
    }

    /// Remove packages called `name`, limited to `versions` if given.
    /// Returns what was removed.
    pub fn delete_package(&mut self, name: &str, versions: Option<&[String]>) -> Vec<Package> {
        let removed = self.packages.remove(name, versions);
        self.pending.retain(|p| !removed.contains(p));
        removed
    }

    /// Drop exactly `package`, matched on name and full version.
    pub fn remove_package(&mut self, package: &Package) -> Vec<Package> {
        let removed = self.packages.remove_matching(|p| p == package);
        self.pending.retain(|p| p != package);
        removed
    }

    /// Packages queued for upload by [`Manifest::add`].
    pub fn pending(&self) -> &[Package] {
        &self.pending
    }

    fn upload_package(&self, storage: &Storage, package: &Package) -> Result<StoreOutcome> {
        let data = match (&package.file, &package.filename) {
            (Some(file), _) => std::fs::read(file)?,
            (None, Some(source)) => storage
                .read(source)?
                .ok_or_else(|| Error::MissingFile(source.clone()))?,
            (None, None) => return Err(Error::MissingFile(package.basename())),
        };
        let conflict = if self.fail_if_exists {
            Conflict::Fail
        } else {
            Conflict::Overwrite
        };
        storage.store(
            &package.url_filename(&self.codename),
            &data,
            PACKAGE_CONTENT_TYPE,
            self.cache_control.as_deref(),
            conflict,
        )
    }

    /// Upload pending packages, then the index in every published
    /// compression, recording each artifact in `files`.
    ///
    /// `progress` is called with the path of every object written or
    /// checked, in that order.
    pub fn write(&mut self, storage: &Storage, progress: &mut dyn FnMut(&str)) -> Result<()> {
        for package in std::mem::take(&mut self.pending) {
            let path = package.url_filename(&self.codename);
            progress(&path);
            if self.upload_package(storage, &package)? == StoreOutcome::Uploaded {
                info!("Uploaded {}", path);
            }
        }

        let text = self.packages.to_string();
        self.files.clear();
        for compression in DEFAULT_COMPRESSIONS {
            let data = compression.compress(text.as_bytes())?;
            let path = format!("{}{}", self.packages_path(), compression.extension());
            progress(&path);
            storage.store(
                &path,
                &data,
                compression.content_type(),
                self.cache_control.as_deref(),
                Conflict::Overwrite,
            )?;
            self.files.insert(
                format!("{}/Packages{}", self.index_dir(), compression.extension()),
                HashedFile::from_data(&data),
            );
        }
        Ok(())
    }
}
