//! Content hashing for index artifacts and package files.

use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::Digest;
use std::collections::BTreeMap;
use std::fmt;
use std::io::{Read, Write};

/// Digests listed in Release files and package stanzas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
}

impl HashAlgorithm {
    /// Section name in a Release file.
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Md5 => "MD5Sum",
            HashAlgorithm::Sha1 => "SHA1",
            HashAlgorithm::Sha256 => "SHA256",
        }
    }

    /// Every algorithm, in the order Release sections are written.
    pub fn all() -> &'static [HashAlgorithm] {
        &[HashAlgorithm::Md5, HashAlgorithm::Sha1, HashAlgorithm::Sha256]
    }

    /// The algorithm whose hex digests are `len` characters long.
    pub fn from_hex_len(len: usize) -> Option<HashAlgorithm> {
        Self::all()
            .iter()
            .copied()
            .find(|algorithm| algorithm.hex_len() == len)
    }

    fn hex_len(&self) -> usize {
        match self {
            HashAlgorithm::Md5 => 32,
            HashAlgorithm::Sha1 => 40,
            HashAlgorithm::Sha256 => 64,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size and hex digests of one artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedFile {
    pub size: u64,
    pub hashes: BTreeMap<HashAlgorithm, String>,
}

impl HashedFile {
    /// An entry with a known size and no digests yet.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            hashes: BTreeMap::new(),
        }
    }

    pub fn from_data(data: &[u8]) -> Self {
        let mut digester = Digester::default();
        digester.update(data);
        digester.finish()
    }

    /// Hash everything `reader` yields.
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut digester = Digester::default();
        std::io::copy(&mut reader, &mut digester)?;
        Ok(digester.finish())
    }

    pub fn add_hash(&mut self, algorithm: HashAlgorithm, hash: String) {
        self.hashes.insert(algorithm, hash);
    }

    pub fn get_hash(&self, algorithm: &HashAlgorithm) -> Option<&str> {
        self.hashes.get(algorithm).map(String::as_str)
    }

    pub fn md5(&self) -> Option<&str> {
        self.get_hash(&HashAlgorithm::Md5)
    }

    pub fn sha1(&self) -> Option<&str> {
        self.get_hash(&HashAlgorithm::Sha1)
    }

    pub fn sha256(&self) -> Option<&str> {
        self.get_hash(&HashAlgorithm::Sha256)
    }
}

/// Computes size and all three digests in one pass.
pub struct Digester {
    size: u64,
    md5: md5::Context,
    sha1: sha1::Sha1,
    sha256: sha2::Sha256,
}

impl Default for Digester {
    fn default() -> Self {
        Self {
            size: 0,
            md5: md5::Context::new(),
            sha1: sha1::Sha1::new(),
            sha256: sha2::Sha256::new(),
        }
    }
}

impl Digester {
    pub fn update(&mut self, data: &[u8]) {
        self.size += data.len() as u64;
        self.md5.consume(data);
        self.sha1.update(data);
        self.sha256.update(data);
    }

    pub fn finish(self) -> HashedFile {
        let mut file = HashedFile::new(self.size);
        file.add_hash(HashAlgorithm::Md5, format!("{:x}", self.md5.compute()));
        file.add_hash(HashAlgorithm::Sha1, hex::encode(self.sha1.finalize()));
        file.add_hash(HashAlgorithm::Sha256, hex::encode(self.sha256.finalize()));
        file
    }
}

impl Write for Digester {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Hex MD5 of `data`, as compared against object-store etags.
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}
