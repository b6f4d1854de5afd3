//! The `Release` file of a codename and its signatures.

use crate::error::Result;
use crate::manifest::Manifest;
use crate::signing::Signer;
use crate::storage::{Conflict, Storage};
use apt_repository::{AptRepositoryError, Release};
use chrono::Utc;
use tracing::{debug, info};

const RELEASE_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
const SIGNATURE_CONTENT_TYPE: &str = "application/pgp-signature; charset=us-ascii";

/// A codename's `Release` file as stored in the repository.
#[derive(Debug, Clone)]
pub struct ReleaseDescriptor {
    pub release: Release,
    pub cache_control: Option<String>,
}

impl ReleaseDescriptor {
    pub fn new(codename: &str) -> Self {
        Self {
            release: Release::new(codename),
            cache_control: None,
        }
    }

    /// Load the `Release` of `codename`, or start an empty one.
    ///
    /// `origin` and `suite`, when given, replace the stored values.
    pub fn retrieve(
        storage: &Storage,
        codename: &str,
        origin: Option<&str>,
        suite: Option<&str>,
        cache_control: Option<&str>,
    ) -> Result<Self> {
        let path = release_path(codename, "Release");
        let mut release = match storage.read(&path)? {
            Some(data) => {
                let text = String::from_utf8(data)
                    .map_err(|e| AptRepositoryError::invalid_release(format!("{}: {}", path, e)))?;
                let release: Release = text.parse()?;
                debug!(
                    "Loaded {} with {} files",
                    path,
                    release.files.len()
                );
                release
            }
            None => Release::new(codename),
        };
        release.codename = Some(codename.to_string());
        if let Some(origin) = origin {
            release.origin = Some(origin.to_string());
        }
        if let Some(suite) = suite {
            release.suite = Some(suite.to_string());
        }
        Ok(Self {
            release,
            cache_control: cache_control.map(str::to_string),
        })
    }

    pub fn codename(&self) -> &str {
        self.release.codename.as_deref().unwrap_or_default()
    }

    pub fn architectures(&self) -> impl Iterator<Item = &str> {
        self.release.architectures.iter().map(String::as_str)
    }

    /// Register the manifest's component and architecture and take over
    /// its artifact entries.
    pub fn update_manifest(&mut self, manifest: &Manifest) {
        self.release.components.insert(manifest.component.clone());
        self.release
            .architectures
            .insert(manifest.architecture.clone());
        self.release.merge_files(&manifest.files);
    }

    /// Make sure every component and architecture pair has an index.
    pub fn validate_others(
        &mut self,
        storage: &Storage,
        progress: &mut dyn FnMut(&str),
    ) -> Result<()> {
        let codename = self.codename().to_string();
        let pairs: Vec<(String, String)> = self
            .release
            .components
            .iter()
            .flat_map(|c| {
                self.release
                    .architectures
                    .iter()
                    .map(move |a| (c.clone(), a.clone()))
            })
            .collect();

        for (component, arch) in pairs {
            if self
                .release
                .has_file(&format!("{}/binary-{}/Packages", component, arch))
            {
                continue;
            }
            info!("Creating index for {}/{}", component, arch);
            let mut manifest = Manifest::retrieve(
                storage,
                &codename,
                &component,
                &arch,
                self.cache_control.as_deref(),
            )?;
            manifest.write(storage, progress)?;
            self.update_manifest(&manifest);
        }
        Ok(())
    }

    /// Complete, stamp and upload the `Release` file, then its signatures.
    ///
    /// Without a signer, signatures left over from a signed state are
    /// removed.
    pub fn write(
        &mut self,
        storage: &Storage,
        signer: Option<&dyn Signer>,
        progress: &mut dyn FnMut(&str),
    ) -> Result<()> {
        self.validate_others(storage, progress)?;
        self.release.date = Some(Utc::now());

        let text = self.release.to_string();
        let codename = self.codename().to_string();
        let path = release_path(&codename, "Release");
        progress(&path);
        storage.store(
            &path,
            text.as_bytes(),
            RELEASE_CONTENT_TYPE,
            self.cache_control.as_deref(),
            Conflict::Overwrite,
        )?;

        let in_release = release_path(&codename, "InRelease");
        let detached = release_path(&codename, "Release.gpg");
        match signer {
            Some(signer) => {
                let td = tempfile::tempdir()?;
                let local = td.path().join("Release");
                std::fs::write(&local, &text)?;

                let clearsigned = signer.clearsign(&local)?;
                progress(&in_release);
                storage.store(
                    &in_release,
                    &clearsigned,
                    RELEASE_CONTENT_TYPE,
                    self.cache_control.as_deref(),
                    Conflict::Overwrite,
                )?;

                let signature = signer.detach_sign(&local)?;
                progress(&detached);
                storage.store(
                    &detached,
                    &signature,
                    SIGNATURE_CONTENT_TYPE,
                    self.cache_control.as_deref(),
                    Conflict::Overwrite,
                )?;
            }
            None => {
                storage.remove(&detached)?;
                storage.remove(&in_release)?;
            }
        }
        Ok(())
    }
}

fn release_path(codename: &str, name: &str) -> String {
    format!("dists/{}/{}", codename, name)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Visibility;
    use crate::error::Error;
    use crate::storage::MemoryStore;
    use std::path::Path;
    use std::sync::Arc;

    /// Signs by wrapping the input in fixed markers.
    pub(crate) struct FakeSigner;

    impl Signer for FakeSigner {
        fn clearsign(&self, release: &Path) -> Result<Vec<u8>> {
            let text = std::fs::read_to_string(release)?;
            Ok(format!("-----BEGIN PGP SIGNED MESSAGE-----\n{}", text).into_bytes())
        }

        fn detach_sign(&self, _release: &Path) -> Result<Vec<u8>> {
            Ok(b"-----BEGIN PGP SIGNATURE-----\n".to_vec())
        }
    }

    struct BrokenSigner;

    impl Signer for BrokenSigner {
        fn clearsign(&self, _release: &Path) -> Result<Vec<u8>> {
            Err(Error::Signing("no secret key".to_string()))
        }

        fn detach_sign(&self, _release: &Path) -> Result<Vec<u8>> {
            Err(Error::Signing("no secret key".to_string()))
        }
    }

    fn storage() -> (Arc<MemoryStore>, Storage) {
        let backend = Arc::new(MemoryStore::new());
        let storage = Storage::new(backend.clone(), None, Visibility::Public, false);
        (backend, storage)
    }

    #[test]
    fn test_retrieve_overrides_origin() {
        let (backend, storage) = storage();
        backend.insert(
            "dists/stable/Release",
            b"Origin: old\nSuite: stable\nCodename: stable\nArchitectures: amd64\nComponents: main\n",
        );
        let release =
            ReleaseDescriptor::retrieve(&storage, "stable", Some("new"), None, None).unwrap();
        assert_eq!(release.release.origin.as_deref(), Some("new"));
        assert_eq!(release.release.suite.as_deref(), Some("stable"));
        assert_eq!(release.architectures().collect::<Vec<_>>(), vec!["amd64"]);
    }

    #[test]
    fn test_retrieve_rejects_invalid_utf8() {
        let (backend, storage) = storage();
        backend.insert("dists/stable/Release", b"Origin: caf\xe9\nCodename: stable\n");
        let err = ReleaseDescriptor::retrieve(&storage, "stable", None, None, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Metadata(AptRepositoryError::InvalidReleaseData(_))
        ));
    }

    #[test]
    fn test_update_manifest_is_a_set() {
        let mut release = ReleaseDescriptor::new("stable");
        let manifest = Manifest::new("stable", "main", "amd64");
        release.update_manifest(&manifest);
        release.update_manifest(&manifest);
        assert_eq!(release.release.architectures.len(), 1);
        assert_eq!(release.release.components.len(), 1);
    }

    #[test]
    fn test_validate_others_fills_cross_product() {
        let (backend, storage) = storage();
        let mut release = ReleaseDescriptor::new("stable");
        release.release.components.extend(["main".to_string(), "contrib".to_string()]);
        release.release.architectures.extend(["amd64".to_string(), "arm64".to_string()]);

        release.validate_others(&storage, &mut |_| {}).unwrap();
        for component in ["main", "contrib"] {
            for arch in ["amd64", "arm64"] {
                let path = format!("{}/binary-{}/Packages", component, arch);
                assert!(release.release.has_file(&path), "{} missing", path);
                assert!(release.release.has_file(&format!("{}.gz", path)));
                assert!(backend
                    .object(&format!("dists/stable/{}", path))
                    .is_some());
            }
        }
    }

    #[test]
    fn test_write_unsigned_removes_signatures() {
        let (backend, storage) = storage();
        backend.insert("dists/stable/Release.gpg", b"stale");
        backend.insert("dists/stable/InRelease", b"stale");

        let mut release = ReleaseDescriptor::new("stable");
        let mut seen = Vec::new();
        release
            .write(&storage, None, &mut |p| seen.push(p.to_string()))
            .unwrap();
        assert_eq!(seen, vec!["dists/stable/Release"]);
        assert!(backend.object("dists/stable/Release.gpg").is_none());
        assert!(backend.object("dists/stable/InRelease").is_none());

        let stored = String::from_utf8(backend.object("dists/stable/Release").unwrap().data)
            .unwrap();
        assert!(stored.contains("Codename: stable\n"));
        assert!(stored.contains("Date: "));
    }

    #[test]
    fn test_write_signed() {
        let (backend, storage) = storage();
        let mut release = ReleaseDescriptor::new("stable");
        release
            .write(&storage, Some(&FakeSigner), &mut |_| {})
            .unwrap();

        let text = backend.object("dists/stable/Release").unwrap().data;
        let in_release = backend.object("dists/stable/InRelease").unwrap().data;
        assert!(in_release.ends_with(&text));
        let detached = backend.object("dists/stable/Release.gpg").unwrap();
        assert_eq!(detached.options.content_type, SIGNATURE_CONTENT_TYPE);
    }

    #[test]
    fn test_signing_failure_is_fatal() {
        let (_, storage) = storage();
        let mut release = ReleaseDescriptor::new("stable");
        let err = release
            .write(&storage, Some(&BrokenSigner), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }
}
