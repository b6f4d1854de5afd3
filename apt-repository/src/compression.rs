//! Compressed variants of index artifacts.

use crate::{AptRepositoryError, Result};
use std::io::{Read, Write};

/// Forms an index artifact is published in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    /// Suffix appended to the artifact path.
    pub fn extension(&self) -> &'static str {
        match self {
            Compression::None => "",
            Compression::Gzip => ".gz",
        }
    }

    /// Content type the artifact is stored with.
    pub fn content_type(&self) -> &'static str {
        match self {
            Compression::None => "text/plain; charset=utf-8",
            Compression::Gzip => "application/x-gzip; charset=binary",
        }
    }

    /// The gzip header is written with a zero mtime and no file name, so
    /// equal input gives byte-identical output and an unchanged index is
    /// never re-uploaded.
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let Compression::Gzip = self else {
            return Ok(data.to_vec());
        };
        let mut encoder = flate2::GzBuilder::new()
            .mtime(0)
            .write(Vec::new(), flate2::Compression::best());
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let Compression::Gzip = self else {
            return Ok(data.to_vec());
        };
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| AptRepositoryError::Compression(e.to_string()))?;
        Ok(out)
    }
}
