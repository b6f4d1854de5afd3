//! Package descriptors and the package sets written to `Packages` files.

use crate::control::{format_multiline, split_paragraphs, Paragraph};
use crate::dependency::{format_depends, normalize_dependency, parse_depends, Dependency};
use crate::hash::HashedFile;
use crate::version::{full_version, Version};
use crate::{AptRepositoryError, Result};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Characters escaped in the `Filename` field.
const FILENAME_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b'/');

/// Free-form fields with a fixed place in a rendered stanza.
const PLACED_ATTRIBUTES: &[&str] = &[
    "Installed-Size",
    "Breaks",
    "Pre-Depends",
    "Recommends",
    "Suggests",
    "Enhances",
    "Priority",
    "Origin",
];

/// A Debian binary package, as described by its control block or by a
/// stanza of an existing `Packages` index.
///
/// Two descriptors are equal when their name and full version are equal.
#[derive(Debug, Clone, Default)]
pub struct Package {
    pub name: String,
    pub version: Option<String>,
    pub epoch: Option<u64>,
    pub iteration: Option<String>,
    pub architecture: Option<String>,
    pub maintainer: Option<String>,
    /// Synopsis, followed by the extended description on further lines.
    pub description: Option<String>,
    /// The `Section` field.
    pub category: Option<String>,
    pub license: Option<String>,
    pub vendor: Option<String>,
    /// The `Homepage` field.
    pub url: Option<String>,
    /// Everything else: `Priority`, `Installed-Size`, `Breaks`, ... and
    /// custom fields with their `X[BCS]-` prefix removed.
    pub attributes: BTreeMap<String, String>,
    pub dependencies: Vec<Dependency>,
    pub conflicts: Vec<Dependency>,
    pub provides: Vec<Dependency>,
    pub replaces: Vec<Dependency>,
    pub size: Option<u64>,
    pub sha1: Option<String>,
    pub sha256: Option<String>,
    pub md5: Option<String>,
    /// Where the package content currently lives: a local path for a new
    /// upload, or a repository-relative path for an indexed package.
    pub filename: Option<String>,
    /// Repository-relative pool path, once assigned.
    pub url_filename: Option<String>,
    /// The local file this descriptor was read from, if any.
    pub file: Option<PathBuf>,
}

/// Identity of a package within a set: name, then full version.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageKey {
    pub name: String,
    pub full_version: Option<String>,
}

impl Package {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// `epoch:version-iteration`, or `None` if all three are absent.
    pub fn full_version(&self) -> Option<String> {
        full_version(
            self.epoch,
            self.version.as_deref(),
            self.iteration.as_deref(),
        )
    }

    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.name.clone(),
            full_version: self.full_version(),
        }
    }

    /// Set version, epoch and iteration from a version string.
    pub fn set_version(&mut self, version: &str) -> Result<()> {
        let parsed: Version = version.parse()?;
        self.epoch = parsed.epoch;
        self.version = Some(parsed.version);
        self.iteration = parsed.iteration;
        Ok(())
    }

    /// Parse a control block or an index stanza.
    pub fn from_control(text: &str) -> Result<Self> {
        let paragraph = Paragraph::parse(text)?;
        let mut package = Package::default();

        for (field, value) in paragraph.iter() {
            match field.to_ascii_lowercase().as_str() {
                "package" => package.name = value.to_string(),
                "version" => package.set_version(value)?,
                "architecture" => package.architecture = Some(value.to_string()),
                "maintainer" => package.maintainer = Some(value.to_string()),
                "description" => package.description = Some(parse_description(value)),
                "section" => package.category = Some(value.to_string()),
                "license" => package.license = Some(value.to_string()),
                "vendor" => package.vendor = Some(value.to_string()),
                "homepage" => package.url = Some(value.to_string()),
                "depends" => package.dependencies = parse_depends(value),
                "conflicts" => package.conflicts = parse_depends(value),
                "provides" => package.provides = parse_depends(value),
                "replaces" => package.replaces = parse_depends(value),
                "size" => {
                    let size = value
                        .parse::<u64>()
                        .map_err(|_| AptRepositoryError::invalid_field("Size", value))?;
                    package.size = Some(size);
                }
                "sha1" => package.sha1 = Some(value.to_string()),
                "sha256" => package.sha256 = Some(value.to_string()),
                "md5sum" => package.md5 = Some(value.to_string()),
                "filename" => {
                    let decoded = percent_decode_str(value)
                        .decode_utf8()
                        .map_err(|_| AptRepositoryError::invalid_field("Filename", value))?
                        .into_owned();
                    package.filename = Some(decoded.clone());
                    package.url_filename = Some(decoded);
                }
                _ => {
                    package
                        .attributes
                        .insert(attribute_name(field), value.to_string());
                }
            }
        }

        if package.name.is_empty() {
            return Err(AptRepositoryError::missing_field("Package"));
        }
        if package.version.is_none() {
            return Err(AptRepositoryError::MalformedVersion(String::new()));
        }

        Ok(package)
    }

    /// Read a local package file and record its size and digests.
    pub fn apply_file_info(&mut self, path: &Path) -> Result<()> {
        let file = std::fs::File::open(path)?;
        let hashed = HashedFile::from_reader(std::io::BufReader::new(file))?;
        self.size = Some(hashed.size);
        self.md5 = hashed.md5().map(str::to_string);
        self.sha1 = hashed.sha1().map(str::to_string);
        self.sha256 = hashed.sha256().map(str::to_string);
        self.filename = Some(path.to_string_lossy().into_owned());
        self.file = Some(path.to_path_buf());
        Ok(())
    }

    /// Rewrite loosely written relations into Debian syntax.
    ///
    /// `!=` constraints in `Depends` are moved to `Conflicts`.
    pub fn normalize_dependencies(&mut self, ignore_iteration: bool) {
        let mut dependencies = Vec::new();
        for dep in &self.dependencies {
            let normalized = normalize_dependency(&dep.to_string(), ignore_iteration);
            dependencies.extend(normalized.depends.iter().map(|d| Dependency::parse(d)));
            self.conflicts
                .extend(normalized.conflicts.iter().map(|d| Dependency::parse(d)));
        }
        self.dependencies = dependencies;

        for list in [&mut self.conflicts, &mut self.provides, &mut self.replaces] {
            *list = list
                .iter()
                .flat_map(|dep| normalize_dependency(&dep.to_string(), ignore_iteration).depends)
                .map(|d| Dependency::parse(&d))
                .collect();
        }
    }

    /// Base name of the package file.
    pub fn basename(&self) -> String {
        self.filename
            .as_deref()
            .and_then(|f| f.rsplit('/').next())
            .filter(|f| !f.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!(
                    "{}_{}_{}.deb",
                    self.name,
                    self.full_version().unwrap_or_default(),
                    self.architecture.as_deref().unwrap_or("all")
                )
            })
    }

    /// `pool/{codename}/{n}/{na}/{basename}`.
    pub fn pool_path(&self, codename: &str) -> String {
        let first: String = self.name.chars().take(1).collect();
        let prefix: String = self.name.chars().take(2).collect();
        format!("pool/{}/{}/{}/{}", codename, first, prefix, self.basename())
    }

    /// The assigned pool path, or the one derived for `codename`.
    pub fn url_filename(&self, codename: &str) -> String {
        self.url_filename
            .clone()
            .unwrap_or_else(|| self.pool_path(codename))
    }

    /// Render the stanza written to a `Packages` file.
    pub fn to_paragraph(&self) -> String {
        let mut paragraph = String::new();
        let mut field = |name: &str, value: Option<&str>| {
            if let Some(value) = value {
                paragraph.push_str(&format!("{}: {}\n", name, format_multiline(value)));
            }
        };
        let attr = |name: &str| self.attributes.get(name).map(String::as_str);
        let deps = |list: &[Dependency]| (!list.is_empty()).then(|| format_depends(list));

        field("Package", Some(self.name.as_str()));
        field("Version", self.full_version().as_deref());
        field("License", self.license.as_deref());
        field("Vendor", self.vendor.as_deref());
        field("Architecture", self.architecture.as_deref());
        field("Maintainer", self.maintainer.as_deref());
        field("Installed-Size", attr("Installed-Size"));
        field("Depends", deps(&self.dependencies).as_deref());
        field("Conflicts", deps(&self.conflicts).as_deref());
        field("Breaks", attr("Breaks"));
        field("Pre-Depends", attr("Pre-Depends"));
        field("Provides", deps(&self.provides).as_deref());
        field("Replaces", deps(&self.replaces).as_deref());
        field("Recommends", attr("Recommends"));
        field("Suggests", attr("Suggests"));
        field("Enhances", attr("Enhances"));
        field("Section", self.category.as_deref());
        field("Priority", attr("Priority"));
        field("Origin", attr("Origin"));
        field("Homepage", self.url.as_deref());

        for (name, value) in &self.attributes {
            if !PLACED_ATTRIBUTES.contains(&name.as_str()) {
                field(name.as_str(), Some(value.as_str()));
            }
        }

        let filename = self
            .url_filename
            .as_deref()
            .map(|f| utf8_percent_encode(f, FILENAME_ESCAPE).to_string());
        field("Filename", filename.as_deref());
        field("Size", self.size.map(|s| s.to_string()).as_deref());
        field("SHA1", self.sha1.as_deref());
        field("SHA256", self.sha256.as_deref());
        field("MD5sum", self.md5.as_deref());
        field("Description", self.description.as_deref());

        paragraph
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.full_version() == other.full_version()
    }
}

impl Eq for Package {}

impl Hash for Package {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_paragraph())
    }
}

/// Blank lines of a description body are written as `.`.
fn parse_description(value: &str) -> String {
    value
        .split('\n')
        .enumerate()
        .map(|(i, line)| if i > 0 && line == "." { "" } else { line })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip the `X[BCS]-` marker of custom fields and canonicalize the
/// spelling of known ones.
fn attribute_name(field: &str) -> String {
    if let Some((_, rest)) = lazy_regex::regex_captures!(r"^[Xx][BCSbcs]+-(.+)$", field) {
        return rest.to_string();
    }
    PLACED_ATTRIBUTES
        .iter()
        .find(|known| known.eq_ignore_ascii_case(field))
        .map(|known| known.to_string())
        .unwrap_or_else(|| field.to_string())
}

/// A set of packages keyed by name and full version, iterated in that order.
#[derive(Debug, Clone, Default)]
pub struct PackageFile {
    packages: BTreeMap<PackageKey, Package>,
}

impl PackageFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a package.
    ///
    /// With `preserve_versions`, only an entry with the same name and full
    /// version is replaced; otherwise every entry with the same name is.
    /// Returns the evicted entries.
    pub fn add(&mut self, package: Package, preserve_versions: bool) -> Vec<Package> {
        let key = package.key();
        let mut evicted = Vec::new();
        if preserve_versions {
            evicted.extend(self.packages.remove(&key));
        } else {
            evicted.extend(self.remove_matching(|p| p.name == package.name));
        }
        self.packages.insert(key, package);
        evicted
    }

    /// Remove every package called `name`, restricted to the given versions
    /// (matched against either the version or the full version) if any.
    pub fn remove(&mut self, name: &str, versions: Option<&[String]>) -> Vec<Package> {
        self.remove_matching(|p| p.name == name && version_matches(p, versions))
    }

    /// Remove every package the predicate accepts.
    pub fn remove_matching<F: Fn(&Package) -> bool>(&mut self, predicate: F) -> Vec<Package> {
        let keys: Vec<PackageKey> = self
            .packages
            .iter()
            .filter(|(_, p)| predicate(p))
            .map(|(k, _)| k.clone())
            .collect();
        keys.iter()
            .filter_map(|k| self.packages.remove(k))
            .collect()
    }

    /// Packages called `name`, restricted to the given versions if any.
    pub fn find(&self, name: &str, versions: Option<&[String]>) -> Vec<&Package> {
        self.packages
            .values()
            .filter(|p| p.name == name && version_matches(p, versions))
            .collect()
    }

    pub fn get(&self, name: &str, full_version: Option<&str>) -> Option<&Package> {
        self.packages.get(&PackageKey {
            name: name.to_string(),
            full_version: full_version.map(str::to_string),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

fn version_matches(package: &Package, versions: Option<&[String]>) -> bool {
    let Some(versions) = versions else {
        return true;
    };
    let full = package.full_version();
    versions.iter().any(|v| {
        package.version.as_deref() == Some(v.as_str()) || full.as_deref() == Some(v.as_str())
    })
}

impl FromStr for PackageFile {
    type Err = AptRepositoryError;

    fn from_str(content: &str) -> Result<Self> {
        let mut file = PackageFile::new();
        for paragraph in split_paragraphs(content) {
            file.add(Package::from_control(&paragraph)?, true);
        }
        Ok(file)
    }
}

impl fmt::Display for PackageFile {
    /// Stanzas separated by a blank line.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, package) in self.packages.values().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(&package.to_paragraph())?;
        }
        Ok(())
    }
}
