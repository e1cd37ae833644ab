//! U-Boot environment codec
//!
//! Converts between the binary environment region as dumped from the device
//! and the `key=value` text form that the transport imports. The binary
//! region is a little-endian CRC-32 followed by NUL-terminated `key=value`
//! entries, an empty entry marking the end, and padding up to the region size.
//!
//! Both directions are pure. Text lines carry no escaping, so a key or value
//! may never contain a newline; such regions are rejected on decode.

use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::{ProvisionError, Result};

/// Default size of the environment region covered by the CRC
pub const DEFAULT_REGION_SIZE: usize = 0x10000;

const CRC_LEN: usize = 4;

/// Decode failures for a binary environment region
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvDecodeError {
    /// Region is too small to hold the CRC and an end marker
    #[error("region is {0} bytes, too short for an environment")]
    TooShort(usize),

    /// Stored CRC does not match the data
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch {
        /// CRC read from the region header
        stored: u32,
        /// CRC computed over the data area
        computed: u32,
    },

    /// Entry list runs to the end of the region without an end marker
    #[error("entry list is not terminated")]
    Unterminated,

    /// Entry is not valid UTF-8
    #[error("entry at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    /// Entry has no `=` separator
    #[error("entry at offset {offset} has no '=': {entry:?}")]
    MissingSeparator {
        /// Byte offset of the entry inside the region
        offset: usize,
        /// Offending entry
        entry: String,
    },

    /// Entry has an empty key
    #[error("entry at offset {0} has an empty key")]
    EmptyKey(usize),

    /// Entry contains a newline, which the text form cannot carry
    #[error("entry for key '{0}' contains a line break")]
    LineBreak(String),
}

/// Parse failures for the text form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvTextError {
    /// Line has no `=` separator
    #[error("line {line}: expected KEY=VALUE, got {content:?}")]
    MissingSeparator {
        /// 1-based line number
        line: usize,
        /// Offending line
        content: String,
    },

    /// Line has an empty key
    #[error("line {0}: empty key")]
    EmptyKey(usize),

    /// Line contains a NUL byte
    #[error("line {0}: contains a NUL byte")]
    NulByte(usize),
}

/// Encode failures for the binary form
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvEncodeError {
    /// Entries do not fit in the region
    #[error("environment needs {needed} bytes but the region holds {capacity}")]
    RegionTooSmall {
        /// Bytes needed for entries and end marker
        needed: usize,
        /// Data bytes available in the region
        capacity: usize,
    },

    /// Key or value cannot be represented
    #[error("entry for key '{0}' cannot be stored: keys may not contain '=', and no field may contain NUL or line breaks")]
    InvalidEntry(String),
}

/// Ordered `key → value` view of an environment region
///
/// Keys are unique. Inserting an existing key replaces its value but keeps
/// its original position, so serialization order is first-insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentMap {
    entries: IndexMap<String, String>,
}

impl EnvironmentMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a variable, returning the previous value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.entries.insert(key.into(), value.into())
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map has no variables
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in serialization order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether every entry survives both the text and the binary form
    pub fn is_representable(&self) -> bool {
        self.iter().all(|(k, v)| entry_is_representable(k, v))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

fn entry_is_representable(key: &str, value: &str) -> bool {
    let bad = |c: char| c == '\0' || c == '\n' || c == '\r';
    !key.is_empty() && !key.contains('=') && !key.contains(bad) && !value.contains(bad)
}

fn crc_of(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Decode a binary environment region
///
/// `region_size` is the size the CRC was computed over; a dump longer than
/// that (a whole partition) is truncated to it, a shorter one is checked as is.
pub fn decode(region: &[u8], region_size: usize) -> std::result::Result<EnvironmentMap, EnvDecodeError> {
    let limit = region.len().min(region_size);
    let Some((header, data)) = region.get(..limit).and_then(|r| r.split_first_chunk::<CRC_LEN>())
    else {
        return Err(EnvDecodeError::TooShort(region.len()));
    };
    if data.is_empty() {
        return Err(EnvDecodeError::TooShort(region.len()));
    }

    let stored = u32::from_le_bytes(*header);
    let computed = crc_of(data);
    if stored != computed {
        return Err(EnvDecodeError::ChecksumMismatch { stored, computed });
    }

    let mut map = EnvironmentMap::new();
    let mut offset = CRC_LEN;
    let mut rest = data;
    loop {
        let Some(end) = rest.iter().position(|&b| b == 0) else {
            return Err(EnvDecodeError::Unterminated);
        };
        let (raw, tail) = rest.split_at(end);
        if raw.is_empty() {
            break;
        }

        let Ok(entry) = std::str::from_utf8(raw) else {
            return Err(EnvDecodeError::InvalidUtf8(offset));
        };
        let Some((key, value)) = entry.split_once('=') else {
            return Err(EnvDecodeError::MissingSeparator {
                offset,
                entry: entry.to_string(),
            });
        };
        if key.is_empty() {
            return Err(EnvDecodeError::EmptyKey(offset));
        }
        if !entry_is_representable(key, value) {
            return Err(EnvDecodeError::LineBreak(key.to_string()));
        }
        map.insert(key, value);

        offset = offset.saturating_add(end).saturating_add(1);
        rest = tail.get(1..).unwrap_or_default();
    }

    Ok(map)
}

/// Encode a map into a binary region of exactly `region_size` bytes
pub fn encode_binary(
    map: &EnvironmentMap,
    region_size: usize,
) -> std::result::Result<Vec<u8>, EnvEncodeError> {
    let capacity = region_size.saturating_sub(CRC_LEN);
    let mut data = Vec::with_capacity(capacity);
    for (key, value) in map.iter() {
        if !entry_is_representable(key, value) {
            return Err(EnvEncodeError::InvalidEntry(key.to_string()));
        }
        data.extend_from_slice(key.as_bytes());
        data.push(b'=');
        data.extend_from_slice(value.as_bytes());
        data.push(0);
    }
    data.push(0);

    if data.len() > capacity {
        return Err(EnvEncodeError::RegionTooSmall {
            needed: data.len(),
            capacity,
        });
    }
    data.resize(capacity, 0);

    let mut region = Vec::with_capacity(region_size);
    region.extend_from_slice(&crc_of(&data).to_le_bytes());
    region.extend_from_slice(&data);
    Ok(region)
}

/// Render the text form: one `key=value` line per entry, in map order
pub fn encode_as_text(map: &EnvironmentMap) -> String {
    let mut out = String::new();
    for (key, value) in map.iter() {
        out.push_str(key);
        out.push('=');
        out.push_str(value);
        out.push('\n');
    }
    out
}

/// Parse the text form produced by [`encode_as_text`]
///
/// Blank lines are skipped and `\r\n` endings are accepted. The key ends at
/// the first `=`; everything after it is the value, verbatim.
pub fn parse_text(text: &str) -> std::result::Result<EnvironmentMap, EnvTextError> {
    let mut map = EnvironmentMap::new();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx.saturating_add(1);
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if line.trim().is_empty() {
            continue;
        }
        if line.contains('\0') {
            return Err(EnvTextError::NulByte(line_no));
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(EnvTextError::MissingSeparator {
                line: line_no,
                content: line.to_string(),
            });
        };
        if key.is_empty() {
            return Err(EnvTextError::EmptyKey(line_no));
        }
        map.insert(key, value);
    }
    Ok(map)
}

/// Read and parse an environment text file
pub async fn read_text_file(path: &Path) -> Result<EnvironmentMap> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ProvisionError::io(path, e))?;
    parse_text(&text).map_err(|source| ProvisionError::EnvText {
        path: path.to_path_buf(),
        source,
    })
}

/// Convert a local binary dump of the environment partition into its text form
///
/// Returns the decoded map so callers can report on it.
pub async fn convert_env_dump(
    dump_path: &Path,
    text_path: &Path,
    region_size: usize,
) -> Result<EnvironmentMap> {
    info!(
        "Converting partition dump {} to text file {}",
        dump_path.display(),
        text_path.display()
    );
    let region = tokio::fs::read(dump_path)
        .await
        .map_err(|e| ProvisionError::io(dump_path, e))?;
    let map = decode(&region, region_size).map_err(|source| ProvisionError::EnvDecode {
        path: dump_path.to_path_buf(),
        source,
    })?;
    tokio::fs::write(text_path, encode_as_text(&map))
        .await
        .map_err(|e| ProvisionError::io(text_path, e))?;
    Ok(map)
}
