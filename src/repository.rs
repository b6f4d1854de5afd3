//! The repository commands: upload, delete, copy, verify, list and show.
//!
//! Every mutating command follows the same cycle: read the current
//! `Release` and the manifests it touches, change them in memory, write
//! the manifests, then write the `Release`. Any failed write aborts the
//! command before the `Release` is replaced.

use crate::config::{validate_name, Settings};
use crate::deb::{ControlExtractor, DpkgExtractor};
use crate::error::{Error, Result};
use crate::lock::{self, LockScope};
use crate::manifest::Manifest;
use crate::release::ReleaseDescriptor;
use crate::signing::{GpgSigner, Signer};
use crate::storage::Storage;
use apt_repository::{AptRepositoryError, Package, ARCH_ALL};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Switches for [`Repository::upload`].
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Use this architecture instead of the one in the package.
    pub architecture: Option<String>,
    /// Keep other versions of the same package in the index.
    pub preserve_versions: bool,
    /// Fail instead of replacing a pool object with different content.
    pub fail_if_exists: bool,
    /// Only update the indices; assume the pool already has the files.
    pub skip_package_upload: bool,
    /// Translate `=` dependencies into ranges that ignore the iteration.
    pub ignore_iteration: bool,
}

/// Pool objects found missing by [`Repository::verify`].
#[derive(Debug, Clone, Default)]
pub struct VerifyReport {
    /// Architecture and descriptor of every entry without a pool object.
    pub missing: Vec<(String, Package)>,
    /// Whether the missing entries were dropped from the indices.
    pub fixed: bool,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty()
    }
}

pub struct Repository {
    storage: Storage,
    settings: Settings,
    signer: Option<Box<dyn Signer>>,
    extractor: Box<dyn ControlExtractor>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("storage", &self.storage)
            .field("settings", &self.settings)
            .field("signed", &self.signer.is_some())
            .finish_non_exhaustive()
    }
}

impl Repository {
    /// Signs with gpg when `settings` names a signing setup and reads
    /// package files with dpkg-deb.
    pub fn new(storage: Storage, settings: Settings) -> Self {
        let signer = settings
            .signing
            .as_ref()
            .map(|config| Box::new(GpgSigner::new(config)) as Box<dyn Signer>);
        Self {
            storage,
            settings,
            signer,
            extractor: Box::new(DpkgExtractor),
        }
    }

    pub fn with_signer(mut self, signer: Option<Box<dyn Signer>>) -> Self {
        self.signer = signer;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn ControlExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn signer(&self) -> Option<&dyn Signer> {
        self.signer.as_deref()
    }

    fn cache_control(&self) -> Option<&str> {
        self.settings.cache_control.as_deref()
    }

    /// Run `f` holding the lock on `codename`, if locking is enabled.
    ///
    /// Every mutation rewrites the codename's `Release`, so they all share
    /// one scope.
    fn with_lock<T>(&self, codename: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        if !self.settings.lock.enabled {
            return f();
        }
        let scope = LockScope::codename(codename);
        info!("Checking for existing lock file");
        lock::acquire(
            &self.storage,
            &scope,
            self.settings.lock.max_attempts,
            self.settings.lock.wait,
        )?;
        let result = f();
        let unlocked = lock::unlock(&self.storage, &scope);
        let value = result?;
        unlocked?;
        Ok(value)
    }

    fn retrieve_release(&self, codename: &str) -> Result<ReleaseDescriptor> {
        info!("Retrieving existing manifests");
        ReleaseDescriptor::retrieve(
            &self.storage,
            codename,
            self.settings.origin.as_deref(),
            self.settings.suite.as_deref(),
            self.cache_control(),
        )
    }

    fn retrieve_manifest(&self, codename: &str, component: &str, arch: &str) -> Result<Manifest> {
        Manifest::retrieve(&self.storage, codename, component, arch, self.cache_control())
    }

    fn write_all(
        &self,
        release: &mut ReleaseDescriptor,
        manifests: impl IntoIterator<Item = Manifest>,
        progress: &mut dyn FnMut(&str),
    ) -> Result<()> {
        info!("Uploading packages and new manifests");
        for mut manifest in manifests {
            manifest.write(&self.storage, progress)?;
            release.update_manifest(&manifest);
        }
        info!("Updating release file");
        release.write(&self.storage, self.signer(), progress)
    }

    fn read_package(&self, file: &std::path::Path, options: &UploadOptions) -> Result<Package> {
        let control = self.extractor.extract_control(file)?;
        let mut package = Package::from_control(&control)?;
        package.apply_file_info(file)?;
        package.normalize_dependencies(options.ignore_iteration);
        if let Some(arch) = &options.architecture {
            package.architecture = Some(arch.clone());
        }
        match package.architecture.as_deref() {
            Some(arch) => validate_name("architecture", arch)?,
            None => return Err(AptRepositoryError::missing_field("Architecture").into()),
        }
        Ok(package)
    }

    /// Add package files to the repository.
    ///
    /// Packages for architecture `all` are also added to every concrete
    /// architecture known from the `Release` or from the other files.
    pub fn upload(
        &self,
        files: &[PathBuf],
        options: &UploadOptions,
        progress: &mut dyn FnMut(&str),
    ) -> Result<Vec<Package>> {
        for file in files {
            if !file.is_file() {
                return Err(Error::MissingFile(file.display().to_string()));
            }
        }
        if let Some(arch) = &options.architecture {
            validate_name("architecture", arch)?;
        }

        let codename = self.settings.codename.as_str();
        let component = self.settings.component.as_str();
        self.with_lock(codename, || {
            let mut release = self.retrieve_release(codename)?;
            let mut manifests: BTreeMap<String, Manifest> = BTreeMap::new();
            let mut uploaded = Vec::new();
            let mut arch_all = Vec::new();

            for file in files {
                info!("Examining package file {}", file.display());
                let package = self.read_package(file, options)?;
                let arch = package
                    .architecture
                    .clone()
                    .unwrap_or_else(|| ARCH_ALL.to_string());

                if !manifests.contains_key(&arch) {
                    let mut manifest = self.retrieve_manifest(codename, component, &arch)?;
                    manifest.fail_if_exists = options.fail_if_exists;
                    manifests.insert(arch.clone(), manifest);
                }
                if let Some(manifest) = manifests.get_mut(&arch) {
                    manifest.add(
                        package.clone(),
                        options.preserve_versions,
                        !options.skip_package_upload,
                    );
                }
                if arch == ARCH_ALL {
                    arch_all.push(package.clone());
                }
                uploaded.push(package);
            }

            if let Some(first) = arch_all.first() {
                let concrete: BTreeSet<String> = release
                    .architectures()
                    .map(str::to_string)
                    .chain(manifests.keys().cloned())
                    .filter(|a| a != ARCH_ALL)
                    .collect();
                if concrete.is_empty() {
                    return Err(Error::AllArchitectureWithoutManifests(first.name.clone()));
                }
                for arch in concrete {
                    if !manifests.contains_key(&arch) {
                        let manifest = self.retrieve_manifest(codename, component, &arch)?;
                        manifests.insert(arch.clone(), manifest);
                    }
                    if let Some(manifest) = manifests.get_mut(&arch) {
                        for package in &arch_all {
                            debug!("Adding {} to {}", package.name, arch);
                            // the pool object is uploaded once, via the `all` index
                            manifest.add(package.clone(), options.preserve_versions, false);
                        }
                    }
                }
            }

            self.write_all(&mut release, manifests.into_values(), progress)?;
            Ok(uploaded)
        })
    }

    /// Remove `name` from the `arch` index; all versions unless `versions`
    /// narrows it down.
    pub fn delete(
        &self,
        name: &str,
        arch: &str,
        versions: Option<&[String]>,
        progress: &mut dyn FnMut(&str),
    ) -> Result<Vec<Package>> {
        validate_name("architecture", arch)?;
        let codename = self.settings.codename.as_str();
        let component = self.settings.component.as_str();
        self.with_lock(codename, || {
            let mut release = self.retrieve_release(codename)?;
            let mut manifest = self.retrieve_manifest(codename, component, arch)?;

            match versions {
                None => warn!("Deleting all versions of {}", name),
                Some(versions) => info!("Deleting {} versions {}", name, versions.join(", ")),
            }
            let removed = manifest.delete_package(name, versions);
            if removed.is_empty() {
                return Err(Error::NothingMatched { action: "deleted" });
            }
            for package in &removed {
                info!(
                    "Deleting {}_{}",
                    package.name,
                    package.full_version().unwrap_or_default()
                );
            }

            self.write_all(&mut release, [manifest], progress)?;
            Ok(removed)
        })
    }

    /// Copy `name` from the configured codename and component into
    /// `to_codename`/`to_component`, including the pool objects.
    #[allow(clippy::too_many_arguments)]
    pub fn copy(
        &self,
        name: &str,
        to_codename: &str,
        to_component: &str,
        arch: &str,
        versions: Option<&[String]>,
        preserve_versions: bool,
        progress: &mut dyn FnMut(&str),
    ) -> Result<Vec<Package>> {
        validate_name("codename", to_codename)?;
        validate_name("component", to_component)?;
        validate_name("architecture", arch)?;
        let codename = self.settings.codename.as_str();
        let component = self.settings.component.as_str();

        self.with_lock(to_codename, || {
            info!("Retrieving existing manifests");
            let source = self.retrieve_manifest(codename, component, arch)?;
            let mut release = self.retrieve_release(to_codename)?;
            let mut destination = self.retrieve_manifest(to_codename, to_component, arch)?;

            let matched: Vec<Package> = source
                .packages
                .find(name, versions)
                .into_iter()
                .cloned()
                .collect();
            if matched.is_empty() {
                return Err(Error::NothingMatched { action: "copied" });
            }

            for package in &matched {
                let mut copied = package.clone();
                copied.filename = Some(package.url_filename(codename));
                copied.url_filename = None;
                copied.file = None;
                info!(
                    "Copying {}_{} to {}/{}",
                    package.name,
                    package.full_version().unwrap_or_default(),
                    to_codename,
                    to_component
                );
                destination.add(copied, preserve_versions, true);
            }

            self.write_all(&mut release, [destination], progress)?;
            Ok(matched)
        })
    }

    /// Check that every indexed package has its pool object.
    ///
    /// With `fix_manifests`, or when signing is configured, the indices and
    /// `Release` are rewritten without the dangling entries.
    pub fn verify(
        &self,
        fix_manifests: bool,
        progress: &mut dyn FnMut(&str),
    ) -> Result<VerifyReport> {
        let codename = self.settings.codename.as_str();
        let component = self.settings.component.as_str();
        let rewrite = fix_manifests || self.signer.is_some();

        self.with_lock(codename, || {
            let mut release = self.retrieve_release(codename)?;
            let architectures: Vec<String> = release.architectures().map(str::to_string).collect();
            let mut report = VerifyReport {
                fixed: fix_manifests,
                ..Default::default()
            };
            let mut manifests = Vec::new();

            for arch in architectures {
                info!("Checking for missing packages in: {}/{} {}", codename, component, arch);
                let mut manifest = self.retrieve_manifest(codename, component, &arch)?;
                let mut missing = Vec::new();
                for package in manifest.packages.iter() {
                    if !self.storage.exists(&package.url_filename(codename))? {
                        missing.push(package.clone());
                    }
                }

                for package in missing {
                    warn!(
                        "The following package is missing: {}_{} ({})",
                        package.name,
                        package.full_version().unwrap_or_default(),
                        package.url_filename(codename)
                    );
                    if fix_manifests {
                        manifest.remove_package(&package);
                    }
                    report.missing.push((arch.clone(), package));
                }

                if rewrite {
                    manifests.push(manifest);
                }
            }

            if rewrite {
                self.write_all(&mut release, manifests, progress)?;
            }
            Ok(report)
        })
    }

    /// Indexed packages, optionally restricted to one architecture.
    pub fn list(&self, arch: Option<&str>) -> Result<Vec<Package>> {
        let codename = self.settings.codename.as_str();
        let component = self.settings.component.as_str();
        let release = self.retrieve_release(codename)?;
        let mut packages = Vec::new();
        for candidate in release.architectures() {
            if let Some(arch) = arch.filter(|a| *a != ARCH_ALL) {
                if candidate != arch {
                    continue;
                }
            }
            let manifest = self.retrieve_manifest(codename, component, candidate)?;
            packages.extend(manifest.packages.iter().cloned());
        }
        Ok(packages)
    }

    /// The package `name` at full version `version` in the `arch` index.
    pub fn show(&self, name: &str, version: &str, arch: &str) -> Result<Package> {
        validate_name("architecture", arch)?;
        let manifest = self.retrieve_manifest(
            &self.settings.codename,
            &self.settings.component,
            arch,
        )?;
        manifest
            .packages
            .get(name, Some(version))
            .cloned()
            .ok_or(Error::PackageNotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StorageConfig, Visibility};
    use crate::deb::StaticControl;
    use crate::release::tests::FakeSigner;
    use crate::storage::MemoryStore;
    use apt_repository::{PackageFile, Release};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        td: TempDir,
        backend: Arc<MemoryStore>,
        controls: StaticControl,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                td: tempfile::tempdir().unwrap(),
                backend: Arc::new(MemoryStore::new()),
                controls: StaticControl::new(),
            }
        }

        fn deb(&mut self, name: &str, version: &str, arch: &str) -> PathBuf {
            let path = self.td.path().join(format!("{}_{}_{}.deb", name, version, arch));
            std::fs::write(&path, format!("{} {} {}", name, version, arch)).unwrap();
            self.controls.insert(
                &path,
                format!(
                    "Package: {}\nVersion: {}\nArchitecture: {}\nMaintainer: Jane <jane@example.com>\nDescription: {}\n some package\n",
                    name, version, arch, name
                ),
            );
            path
        }

        fn repository(&self, settings: Settings) -> Repository {
            let storage = Storage::new(self.backend.clone(), None, Visibility::Public, false);
            Repository::new(storage, settings)
                .with_extractor(Box::new(self.controls.clone()))
                .with_signer(None)
        }

        fn default_repository(&self) -> Repository {
            self.repository(Settings::new(StorageConfig::Local {
                root: self.td.path().to_path_buf(),
            }))
        }

        fn packages(&self, path: &str) -> PackageFile {
            let data = self.backend.object(path).unwrap().data;
            String::from_utf8(data).unwrap().parse().unwrap()
        }

        fn release(&self) -> Release {
            let data = self.backend.object("dists/stable/Release").unwrap().data;
            String::from_utf8(data).unwrap().parse().unwrap()
        }
    }

    fn names(packages: &PackageFile) -> Vec<String> {
        packages
            .iter()
            .map(|p| format!("{}_{}", p.name, p.full_version().unwrap_or_default()))
            .collect()
    }

    #[test]
    fn test_upload_missing_file() {
        let fixture = Fixture::new();
        let repo = fixture.default_repository();
        let err = repo
            .upload(&[PathBuf::from("/nonexistent.deb")], &UploadOptions::default(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::MissingFile(_)));
        assert!(fixture.backend.keys().is_empty());
    }

    #[test]
    fn test_upload_and_delete() {
        let mut fixture = Fixture::new();
        let deb = fixture.deb("foo", "1.0", "amd64");
        let repo = fixture.default_repository();

        let mut seen = Vec::new();
        repo.upload(&[deb], &UploadOptions::default(), &mut |p| seen.push(p.to_string()))
            .unwrap();
        assert_eq!(
            seen,
            vec![
                "pool/stable/f/fo/foo_1.0_amd64.deb",
                "dists/stable/main/binary-amd64/Packages",
                "dists/stable/main/binary-amd64/Packages.gz",
                "dists/stable/Release",
            ]
        );
        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert_eq!(names(&packages), vec!["foo_1.0"]);
        let release = fixture.release();
        assert_eq!(release.architectures.iter().collect::<Vec<_>>(), vec!["amd64"]);
        assert!(release.has_file("main/binary-amd64/Packages"));

        let removed = repo.delete("foo", "amd64", None, &mut |_| {}).unwrap();
        assert_eq!(removed.len(), 1);
        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert!(packages.is_empty());

        let err = repo.delete("foo", "amd64", None, &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::NothingMatched { .. }));
    }

    #[test]
    fn test_preserve_versions() {
        let mut fixture = Fixture::new();
        let one = fixture.deb("foo", "1.0", "amd64");
        let two = fixture.deb("foo", "2.0", "amd64");
        let repo = fixture.default_repository();
        let preserve = UploadOptions {
            preserve_versions: true,
            ..Default::default()
        };
        repo.upload(&[one], &preserve, &mut |_| {}).unwrap();
        repo.upload(&[two.clone()], &preserve, &mut |_| {}).unwrap();
        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert_eq!(names(&packages), vec!["foo_1.0", "foo_2.0"]);

        repo.delete("foo", "amd64", Some(&["1.0".to_string()]), &mut |_| {})
            .unwrap();
        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert_eq!(names(&packages), vec!["foo_2.0"]);
    }

    #[test]
    fn test_upload_all_without_architectures() {
        let mut fixture = Fixture::new();
        let deb = fixture.deb("docs", "1.0", "all");
        let repo = fixture.default_repository();
        let err = repo
            .upload(&[deb], &UploadOptions::default(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::AllArchitectureWithoutManifests(ref n) if n == "docs"));
        assert!(fixture.backend.puts().is_empty());
    }

    #[test]
    fn test_upload_all_propagates() {
        let mut fixture = Fixture::new();
        // `all` comes first; the concrete architecture is only seen later
        let docs = fixture.deb("docs", "1.0", "all");
        let amd64 = fixture.deb("foo", "1.0", "amd64");
        let arm64 = fixture.deb("foo", "1.0", "arm64");
        let repo = fixture.default_repository();
        repo.upload(&[docs, amd64, arm64], &UploadOptions::default(), &mut |_| {})
            .unwrap();

        for arch in ["amd64", "arm64"] {
            let packages =
                fixture.packages(&format!("dists/stable/main/binary-{}/Packages", arch));
            assert_eq!(names(&packages), vec!["docs_1.0", "foo_1.0"]);
        }
        let all = fixture.packages("dists/stable/main/binary-all/Packages");
        assert_eq!(names(&all), vec!["docs_1.0"]);

        let pool_puts = fixture
            .backend
            .puts()
            .into_iter()
            .filter(|k| k == "pool/stable/d/do/docs_1.0_all.deb")
            .count();
        assert_eq!(pool_puts, 1);
    }

    #[test]
    fn test_upload_all_uses_release_architectures() {
        let mut fixture = Fixture::new();
        let amd64 = fixture.deb("foo", "1.0", "amd64");
        let docs = fixture.deb("docs", "1.0", "all");
        let repo = fixture.default_repository();
        repo.upload(&[amd64], &UploadOptions::default(), &mut |_| {})
            .unwrap();
        repo.upload(&[docs], &UploadOptions::default(), &mut |_| {})
            .unwrap();
        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert_eq!(names(&packages), vec!["docs_1.0", "foo_1.0"]);
    }

    #[test]
    fn test_arch_override() {
        let mut fixture = Fixture::new();
        let deb = fixture.deb("foo", "1.0", "amd64");
        let repo = fixture.default_repository();
        let options = UploadOptions {
            architecture: Some("i386".to_string()),
            ..Default::default()
        };
        repo.upload(&[deb], &options, &mut |_| {}).unwrap();
        let packages = fixture.packages("dists/stable/main/binary-i386/Packages");
        assert_eq!(names(&packages), vec!["foo_1.0"]);
    }

    #[test]
    fn test_copy() {
        let mut fixture = Fixture::new();
        let deb = fixture.deb("foo", "1.0", "amd64");
        let repo = fixture.default_repository();
        repo.upload(&[deb], &UploadOptions::default(), &mut |_| {})
            .unwrap();

        let copied = repo
            .copy("foo", "testing", "main", "amd64", None, false, &mut |_| {})
            .unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(
            fixture
                .backend
                .object("pool/testing/f/fo/foo_1.0_amd64.deb")
                .unwrap()
                .data,
            b"foo 1.0 amd64"
        );
        let packages = fixture.packages("dists/testing/main/binary-amd64/Packages");
        let foo = packages.get("foo", Some("1.0")).unwrap();
        assert_eq!(
            foo.url_filename.as_deref(),
            Some("pool/testing/f/fo/foo_1.0_amd64.deb")
        );
        assert!(fixture.backend.object("dists/testing/Release").is_some());

        let err = repo
            .copy("bar", "testing", "main", "amd64", None, false, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::NothingMatched { .. }));
    }

    #[test]
    fn test_verify() {
        let mut fixture = Fixture::new();
        let foo = fixture.deb("foo", "1.0", "amd64");
        let bar = fixture.deb("bar", "1.0", "amd64");
        let repo = fixture.default_repository();
        repo.upload(&[foo, bar], &UploadOptions::default(), &mut |_| {})
            .unwrap();
        assert!(repo.verify(false, &mut |_| {}).unwrap().is_clean());

        repo.storage()
            .remove("pool/stable/b/ba/bar_1.0_amd64.deb")
            .unwrap();
        let report = repo.verify(false, &mut |_| {}).unwrap();
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].1.name, "bar");
        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert_eq!(packages.len(), 2);

        let report = repo.verify(true, &mut |_| {}).unwrap();
        assert!(report.fixed);
        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert_eq!(names(&packages), vec!["foo_1.0"]);
        assert!(repo.verify(false, &mut |_| {}).unwrap().is_clean());
    }

    #[test]
    fn test_verify_fix_keeps_sibling_versions() {
        let mut fixture = Fixture::new();
        let old = fixture.deb("foo", "1.0-1", "amd64");
        let newer = fixture.deb("foo", "1.0-1-2", "amd64");
        let repo = fixture.default_repository();
        let options = UploadOptions {
            preserve_versions: true,
            ..Default::default()
        };
        repo.upload(&[old, newer], &options, &mut |_| {}).unwrap();
        assert_eq!(
            fixture.packages("dists/stable/main/binary-amd64/Packages").len(),
            2
        );

        repo.storage()
            .remove("pool/stable/f/fo/foo_1.0-1_amd64.deb")
            .unwrap();
        let report = repo.verify(true, &mut |_| {}).unwrap();
        assert_eq!(report.missing.len(), 1);
        assert_eq!(report.missing[0].1.full_version().as_deref(), Some("1.0-1"));

        let packages = fixture.packages("dists/stable/main/binary-amd64/Packages");
        assert_eq!(names(&packages), vec!["foo_1.0-1-2"]);
    }

    #[test]
    fn test_list_and_show() {
        let mut fixture = Fixture::new();
        let amd64 = fixture.deb("foo", "1.0", "amd64");
        let arm64 = fixture.deb("bar", "2.0-1", "arm64");
        let repo = fixture.default_repository();
        repo.upload(&[amd64, arm64], &UploadOptions::default(), &mut |_| {})
            .unwrap();

        assert_eq!(repo.list(None).unwrap().len(), 2);
        assert_eq!(repo.list(Some(ARCH_ALL)).unwrap().len(), 2);
        let arm = repo.list(Some("arm64")).unwrap();
        assert_eq!(arm.len(), 1);
        assert_eq!(arm[0].name, "bar");

        let shown = repo.show("bar", "2.0-1", "arm64").unwrap();
        assert_eq!(shown.iteration.as_deref(), Some("1"));
        // the upstream version alone does not name a package
        assert!(matches!(
            repo.show("bar", "2.0", "arm64").unwrap_err(),
            Error::PackageNotFound
        ));
        assert!(matches!(
            repo.show("bar", "9", "arm64").unwrap_err(),
            Error::PackageNotFound
        ));
    }

    #[test]
    fn test_signed_upload_and_lock() {
        let mut fixture = Fixture::new();
        let deb = fixture.deb("foo", "1.0", "amd64");
        let mut settings = Settings::new(StorageConfig::Local {
            root: fixture.td.path().to_path_buf(),
        });
        settings.lock.enabled = true;
        let repo = fixture
            .repository(settings)
            .with_signer(Some(Box::new(FakeSigner)));
        repo.upload(&[deb], &UploadOptions::default(), &mut |_| {})
            .unwrap();

        assert!(fixture.backend.object("dists/stable/InRelease").is_some());
        assert!(fixture.backend.object("dists/stable/Release.gpg").is_some());
        assert!(fixture
            .backend
            .puts()
            .contains(&"dists/stable/lockfile".to_string()));
        assert!(fixture.backend.object("dists/stable/lockfile").is_none());
    }

    #[test]
    fn test_mutations_share_codename_lock() {
        let mut fixture = Fixture::new();
        let foo = fixture.deb("foo", "1.0", "amd64");
        let bar = fixture.deb("bar", "1.0", "amd64");
        fixture
            .default_repository()
            .upload(&[foo], &UploadOptions::default(), &mut |_| {})
            .unwrap();

        let mut settings = Settings::new(StorageConfig::Local {
            root: fixture.td.path().to_path_buf(),
        });
        settings.lock.enabled = true;
        settings.lock.max_attempts = 1;
        settings.lock.wait = Duration::from_millis(1);
        let repo = fixture.repository(settings);

        lock::lock(repo.storage(), &LockScope::codename("stable")).unwrap();
        let before = fixture.backend.object("dists/stable/Release").unwrap().data;

        let err = repo
            .upload(&[bar], &UploadOptions::default(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        let err = repo.delete("foo", "amd64", None, &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        let err = repo.verify(true, &mut |_| {}).unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));

        assert_eq!(
            names(&fixture.packages("dists/stable/main/binary-amd64/Packages")),
            vec!["foo_1.0"]
        );
        assert_eq!(
            fixture.backend.object("dists/stable/Release").unwrap().data,
            before
        );
        // a refused operation leaves the holder's lock in place
        assert!(lock::locked(repo.storage(), &LockScope::codename("stable")).unwrap());

        lock::lock(repo.storage(), &LockScope::codename("testing")).unwrap();
        lock::unlock(repo.storage(), &LockScope::codename("stable")).unwrap();
        let err = repo
            .copy("foo", "testing", "main", "amd64", None, false, &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        assert!(fixture.backend.object("dists/testing/Release").is_none());
    }
}
