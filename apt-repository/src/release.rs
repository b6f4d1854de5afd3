//! Release files for APT repositories.

use crate::{AptRepositoryError, HashAlgorithm, HashedFile, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S UTC";

/// The top-level descriptor of one codename.
///
/// Rendering is deterministic: architectures, components and file paths
/// are emitted in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Release {
    pub origin: Option<String>,
    pub label: Option<String>,
    pub suite: Option<String>,
    pub codename: Option<String>,
    /// Omitted from the rendered file when unset.
    pub date: Option<DateTime<Utc>>,
    pub architectures: BTreeSet<String>,
    pub components: BTreeSet<String>,
    pub description: Option<String>,
    /// Index artifacts, keyed by path relative to `dists/{codename}`.
    pub files: BTreeMap<String, HashedFile>,
    /// Fields not covered above, kept so a rewrite does not drop them.
    pub additional_fields: BTreeMap<String, String>,
}

impl Release {
    pub fn new<S: Into<String>>(codename: S) -> Self {
        Self {
            codename: Some(codename.into()),
            ..Default::default()
        }
    }

    /// Add or replace an artifact entry.
    pub fn add_file<S: Into<String>>(&mut self, path: S, file: HashedFile) {
        self.files.insert(path.into(), file);
    }

    /// Merge artifact entries; incoming entries replace existing ones.
    pub fn merge_files<'a, I>(&mut self, files: I)
    where
        I: IntoIterator<Item = (&'a String, &'a HashedFile)>,
    {
        for (path, file) in files {
            self.files.insert(path.clone(), file.clone());
        }
    }

    pub fn has_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Files carrying a digest for `algorithm`, sorted by path.
    pub fn get_files_by_hash(&self, algorithm: &HashAlgorithm) -> Vec<(&str, &HashedFile, &str)> {
        self.files
            .iter()
            .filter_map(|(path, file)| {
                file.get_hash(algorithm)
                    .map(|hash| (path.as_str(), file, hash))
            })
            .collect()
    }

    /// Record a ` <hash> <size> <path>` table line, classifying the digest
    /// by its length.
    fn parse_file_line(&mut self, line: &str) -> Result<()> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let &[hash, size, path] = parts.as_slice() else {
            return Err(AptRepositoryError::invalid_release(format!(
                "Invalid file list line: {}",
                line.trim()
            )));
        };
        let size = size
            .parse::<u64>()
            .map_err(|_| AptRepositoryError::invalid_field("size", size))?;

        // Digests we do not track (SHA512, ...) are dropped.
        let Some(algorithm) = HashAlgorithm::from_hex_len(hash.len()) else {
            return Ok(());
        };

        let file = self
            .files
            .entry(path.to_string())
            .or_insert_with(|| HashedFile::new(size));
        file.size = size;
        file.add_hash(algorithm, hash.to_string());
        Ok(())
    }
}

/// RFC 2822 dates, also accepting the `UTC` zone name APT tools write.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc2822(value) {
        return Some(date.with_timezone(&Utc));
    }
    let naive = value.strip_suffix(" UTC")?;
    NaiveDateTime::parse_from_str(naive, "%a, %d %b %Y %H:%M:%S")
        .ok()
        .map(|d| Utc.from_utc_datetime(&d))
}

impl FromStr for Release {
    type Err = AptRepositoryError;

    fn from_str(content: &str) -> Result<Self> {
        let mut release = Release::default();

        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                release.parse_file_line(line)?;
                continue;
            }

            let Some((field, value)) = line.split_once(':') else {
                return Err(AptRepositoryError::invalid_release(format!(
                    "Invalid line format: {}",
                    line
                )));
            };
            let value = value.trim();
            let list = || value.split_whitespace().map(str::to_string).collect();

            match field.trim().to_ascii_lowercase().as_str() {
                "origin" => release.origin = Some(value.to_string()),
                "label" => release.label = Some(value.to_string()),
                "suite" => release.suite = Some(value.to_string()),
                "codename" => release.codename = Some(value.to_string()),
                "description" => release.description = Some(value.to_string()),
                "date" => release.date = parse_date(value),
                "architectures" => release.architectures = list(),
                "components" => release.components = list(),
                "md5sum" | "sha1" | "sha256" | "sha512" if value.is_empty() => {}
                _ => {
                    release
                        .additional_fields
                        .insert(field.trim().to_string(), value.to_string());
                }
            }
        }

        Ok(release)
    }
}

impl fmt::Display for Release {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref origin) = self.origin {
            writeln!(f, "Origin: {}", origin)?;
        }
        if let Some(ref label) = self.label {
            writeln!(f, "Label: {}", label)?;
        }
        if let Some(ref suite) = self.suite {
            writeln!(f, "Suite: {}", suite)?;
        }
        if let Some(ref codename) = self.codename {
            writeln!(f, "Codename: {}", codename)?;
        }
        if let Some(date) = self.date {
            writeln!(f, "Date: {}", date.format(DATE_FORMAT))?;
        }
        if !self.architectures.is_empty() {
            let architectures: Vec<&str> = self.architectures.iter().map(String::as_str).collect();
            writeln!(f, "Architectures: {}", architectures.join(" "))?;
        }
        if !self.components.is_empty() {
            let components: Vec<&str> = self.components.iter().map(String::as_str).collect();
            writeln!(f, "Components: {}", components.join(" "))?;
        }
        if let Some(ref description) = self.description {
            writeln!(f, "Description: {}", description)?;
        }
        for (key, value) in &self.additional_fields {
            writeln!(f, "{}: {}", key, value)?;
        }

        for algorithm in HashAlgorithm::all() {
            let files = self.get_files_by_hash(algorithm);
            if files.is_empty() {
                continue;
            }
            writeln!(f, "{}:", algorithm.as_str())?;
            for (path, file, hash) in files {
                writeln!(f, " {} {:>16} {}", hash, file.size, path)?;
            }
        }

        Ok(())
    }
}
