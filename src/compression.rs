//! Compression algorithms applied to dump output
//!
//! Codecs come from `flate2` (gzip) and `bzip2`; `none` passes bytes through.

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressionError {
    #[error("invalid compression algorithm: {0}")]
    InvalidCompressionAlgorithm(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compressor {
    None,
    #[default]
    Gzip,
    Bzip2,
}

impl Compressor {
    /// Resolve an algorithm by name
    pub fn from_name(name: &str) -> Result<Self, CompressionError> {
        match name.to_lowercase().as_str() {
            "none" | "" => Ok(Compressor::None),
            "gzip" | "gz" => Ok(Compressor::Gzip),
            "bzip2" | "bz2" => Ok(Compressor::Bzip2),
            _ => Err(CompressionError::InvalidCompressionAlgorithm(name.to_string())),
        }
    }

    /// Resolve the algorithm that produced a file with this extension
    pub fn from_extension(extension: &str) -> Result<Self, CompressionError> {
        // `sql.gz` and friends: the last component decides
        let last = extension.rsplit('.').next().unwrap_or(extension);
        match last {
            "sql" => Ok(Compressor::None),
            "gz" | "tgz" => Ok(Compressor::Gzip),
            "bz2" | "tbz2" => Ok(Compressor::Bzip2),
            _ => Err(CompressionError::InvalidCompressionAlgorithm(extension.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Compressor::None => "none",
            Compressor::Gzip => "gzip",
            Compressor::Bzip2 => "bzip2",
        }
    }

    /// File extension for artifacts written with this algorithm
    pub fn extension(&self) -> &'static str {
        match self {
            Compressor::None => "sql",
            Compressor::Gzip => "gz",
            Compressor::Bzip2 => "bz2",
        }
    }

    /// Compress everything from `input` into `output`, returning the number
    /// of uncompressed bytes consumed.
    pub fn compress<R: Read, W: Write>(&self, mut input: R, output: W) -> io::Result<u64> {
        match self {
            Compressor::None => {
                let mut output = output;
                let copied = io::copy(&mut input, &mut output)?;
                output.flush()?;
                Ok(copied)
            }
            Compressor::Gzip => {
                let mut encoder = GzEncoder::new(output, flate2::Compression::default());
                let copied = io::copy(&mut input, &mut encoder)?;
                encoder.finish()?.flush()?;
                Ok(copied)
            }
            Compressor::Bzip2 => {
                let mut encoder = BzEncoder::new(output, bzip2::Compression::default());
                let copied = io::copy(&mut input, &mut encoder)?;
                encoder.finish()?.flush()?;
                Ok(copied)
            }
        }
    }

    /// Decompress everything from `input` into `output`, returning the number
    /// of decompressed bytes written.
    pub fn decompress<R: Read, W: Write>(&self, input: R, mut output: W) -> io::Result<u64> {
        let copied = match self {
            Compressor::None => {
                let mut input = input;
                io::copy(&mut input, &mut output)?
            }
            Compressor::Gzip => io::copy(&mut GzDecoder::new(input), &mut output)?,
            Compressor::Bzip2 => io::copy(&mut BzDecoder::new(input), &mut output)?,
        };
        output.flush()?;
        Ok(copied)
    }

    /// Compress `source` into a new file at `destination`, returning the
    /// compressed size.
    pub fn compress_file(&self, source: &Path, destination: &Path) -> io::Result<u64> {
        let input = BufReader::new(File::open(source)?);
        let output = BufWriter::new(File::create(destination)?);
        self.compress(input, output)?;
        Ok(std::fs::metadata(destination)?.len())
    }

    /// Decompress `source` into a new file at `destination`
    pub fn decompress_file(&self, source: &Path, destination: &Path) -> io::Result<u64> {
        let input = BufReader::new(File::open(source)?);
        let output = BufWriter::new(File::create(destination)?);
        self.decompress(input, output)
    }
}

impl FromStr for Compressor {
    type Err = CompressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

impl fmt::Display for Compressor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
