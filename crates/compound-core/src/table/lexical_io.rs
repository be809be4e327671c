use std::fs::{self, File};
use std::path::Path;

use memmap2::Mmap;

use super::{LexicalTable, TableError};

pub(super) const MAGIC: &[u8; 4] = b"CPTT";
pub(super) const VERSION: u8 = 1;
const HEADER_SIZE: usize = 4 + 1 + 4 + 4; // magic + version + body_len + crc32 = 13

impl LexicalTable {
    /// Parse a text table with one `source target score` triple per line.
    ///
    /// Blank lines and lines starting with `#` are skipped. Empty targets are
    /// not representable in this format; unaligned words are modelled by the
    /// null translation instead.
    pub fn from_text(text: &str) -> Result<Self, TableError> {
        let mut table = Self::new();
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 3 {
                return Err(TableError::Parse {
                    line: i + 1,
                    reason: format!("expected 3 fields, got {}", fields.len()),
                });
            }
            let score: f64 = fields[2].parse().map_err(|e| TableError::Parse {
                line: i + 1,
                reason: format!("invalid score '{}': {e}", fields[2]),
            })?;
            if !score.is_finite() {
                return Err(TableError::Parse {
                    line: i + 1,
                    reason: format!("score must be finite, got {score}"),
                });
            }
            table.insert(fields[0], fields[1], score);
        }
        Ok(table)
    }

    /// Read a text table from disk.
    pub fn load_text(path: &Path) -> Result<Self, TableError> {
        Self::from_text(&fs::read_to_string(path)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, TableError> {
        let body = bincode::serialize(&self.entries).map_err(TableError::Serialize)?;
        let body_len: u32 = body
            .len()
            .try_into()
            .map_err(|_| TableError::InvalidHeader)?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + body.len());
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&body_len.to_le_bytes());
        buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
        buf.extend_from_slice(&body);
        Ok(buf)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self, TableError> {
        if data.len() < 5 {
            return Err(TableError::InvalidHeader);
        }
        if &data[..4] != MAGIC {
            return Err(TableError::InvalidMagic);
        }
        if data[4] != VERSION {
            return Err(TableError::UnsupportedVersion(data[4]));
        }
        if data.len() < HEADER_SIZE {
            return Err(TableError::InvalidHeader);
        }

        let body_len = read_u32(&data[5..9]) as usize;
        let expected_crc = read_u32(&data[9..13]);
        let body = data
            .get(HEADER_SIZE..HEADER_SIZE + body_len)
            .ok_or(TableError::InvalidHeader)?;

        let found = crc32fast::hash(body);
        if found != expected_crc {
            return Err(TableError::Checksum {
                expected: expected_crc,
                found,
            });
        }

        let entries = bincode::deserialize(body).map_err(TableError::Deserialize)?;
        Ok(Self { entries })
    }

    /// Open a compiled table file, using mmap to avoid an extra copy of the raw bytes.
    pub fn open(path: &Path) -> Result<Self, TableError> {
        let file = File::open(path)?;
        // SAFETY: The file is opened read-only and the mapping is immutable.
        // The Mmap is dropped after deserialization completes below.
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_bytes(&mmap)
    }

    /// Open either a compiled table or a text table, detected by magic bytes.
    pub fn open_any(path: &Path) -> Result<Self, TableError> {
        let data = fs::read(path)?;
        if data.starts_with(MAGIC) {
            Self::from_bytes(&data)
        } else {
            let text = String::from_utf8(data).map_err(|e| TableError::Parse {
                line: 0,
                reason: format!("not UTF-8: {e}"),
            })?;
            Self::from_text(&text)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), TableError> {
        Ok(fs::write(path, self.to_bytes()?)?)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(bytes);
    u32::from_le_bytes(raw)
}
