//! Splitting Debian version strings into epoch, upstream version and iteration.

use crate::{AptRepositoryError, Result};
use std::fmt;
use std::str::FromStr;

/// A version string split into its `epoch:version-iteration` parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub epoch: Option<u64>,
    pub version: String,
    pub iteration: Option<String>,
}

impl FromStr for Version {
    type Err = AptRepositoryError;

    /// The epoch is a run of digits terminated by `:`, the iteration is
    /// whatever follows the last `-`, and the version is what remains.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let malformed = || AptRepositoryError::MalformedVersion(s.to_string());

        let (epoch, rest) = match s.split_once(':') {
            Some((digits, rest))
                if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) =>
            {
                (Some(digits.parse::<u64>().map_err(|_| malformed())?), rest)
            }
            _ => (None, s),
        };

        let (version, iteration) = match rest.rsplit_once('-') {
            Some((version, iteration)) => (version, Some(iteration.to_string())),
            None => (rest, None),
        };

        if version.is_empty() {
            return Err(malformed());
        }

        Ok(Version {
            epoch,
            version: version.to_string(),
            iteration,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let full = full_version(self.epoch, Some(&self.version), self.iteration.as_deref())
            .unwrap_or_default();
        f.write_str(&full)
    }
}

/// Join the present parts as `epoch:version-iteration`.
///
/// Returns `None` only when all three parts are absent.
pub fn full_version(
    epoch: Option<u64>,
    version: Option<&str>,
    iteration: Option<&str>,
) -> Option<String> {
    if epoch.is_none() && version.is_none() && iteration.is_none() {
        return None;
    }

    let mut head = Vec::with_capacity(2);
    if let Some(epoch) = epoch {
        head.push(epoch.to_string());
    }
    if let Some(version) = version {
        head.push(version.to_string());
    }
    let head = head.join(":");

    Some(match iteration {
        Some(iteration) => format!("{}-{}", head, iteration),
        None => head,
    })
}
