//! Binary container for trained networks.
//!
//! ## Format Layout
//!
//! ```text
//! +------------------+
//! | Header (8 bytes) |
//! +------------------+
//! | bincode payload  |
//! | (variable)       |
//! +------------------+
//! ```
//!
//! ### Header (8 bytes)
//! - Magic number (4 bytes): "RBFN"
//! - Version (2 bytes, little endian)
//! - Flags (2 bytes, little endian): reserved, written as 0

use crate::error::{RbfError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic number for network files.
const MAGIC: &[u8; 4] = b"RBFN";

/// Current format version.
const VERSION: u16 = 1;

/// Header size in bytes.
const HEADER_SIZE: usize = 8;

/// Network file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelHeader {
    /// Format version.
    pub version: u16,
    /// Flags.
    pub flags: u16,
}

impl Default for ModelHeader {
    fn default() -> Self {
        Self {
            version: VERSION,
            flags: 0,
        }
    }
}

impl ModelHeader {
    /// Writes the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(MAGIC);
        bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
        bytes[6..8].copy_from_slice(&self.flags.to_le_bytes());
        bytes
    }

    /// Reads a header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(RbfError::InvalidModelFormat("Header too short".to_string()));
        }
        if &bytes[0..4] != MAGIC {
            return Err(RbfError::InvalidModelFormat("Invalid magic number".to_string()));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        let flags = u16::from_le_bytes([bytes[6], bytes[7]]);
        if version == 0 || version > VERSION {
            return Err(RbfError::InvalidModelFormat(format!(
                "Unsupported version {} (newest known is {})",
                version, VERSION
            )));
        }

        Ok(Self { version, flags })
    }
}

/// Binary reader/writer for network files.
pub struct ModelFormat;

impl ModelFormat {
    /// Encodes `value` behind a header into a byte buffer.
    pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut bytes = ModelHeader::default().to_bytes().to_vec();
        bincode::serialize_into(&mut bytes, value)?;
        Ok(bytes)
    }

    /// Decodes a buffer produced by [`ModelFormat::to_bytes`].
    pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        ModelHeader::from_bytes(bytes)?;
        let value = bincode::deserialize(&bytes[HEADER_SIZE..])?;
        Ok(value)
    }

    /// Writes `value` to a binary file.
    pub fn write<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(&ModelHeader::default().to_bytes())?;
        bincode::serialize_into(&mut writer, value)?;
        writer.flush()?;
        Ok(())
    }

    /// Reads a value from a binary file.
    pub fn read<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => RbfError::InvalidModelFormat("Header too short".to_string()),
            _ => RbfError::Io(e),
        })?;
        ModelHeader::from_bytes(&header)?;

        let value = bincode::deserialize_from(&mut reader)?;
        Ok(value)
    }
}
