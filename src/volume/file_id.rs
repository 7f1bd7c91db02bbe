//! File identifiers
//!
//! A file id names one stored object: `<volume id>,<hex key+cookie>`.
//! The hex part is the big-endian key (8 bytes) followed by the big-endian
//! cookie (4 bytes), with leading zero bytes dropped, e.g. `3,01637037d6`.

use crate::common::{Error, Result};
use crate::volume::VolumeId;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId {
    pub volume_id: VolumeId,
    /// Sequence number from the sequencer
    pub key: u64,
    /// Random salt so ids cannot be guessed from the sequence
    pub cookie: u32,
}

impl FileId {
    pub fn new(volume_id: VolumeId, key: u64, cookie: u32) -> Self {
        Self {
            volume_id,
            key,
            cookie,
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut bytes = [0u8; 12];
        bytes[..8].copy_from_slice(&self.key.to_be_bytes());
        bytes[8..].copy_from_slice(&self.cookie.to_be_bytes());
        // at least one key byte is always kept
        let first = bytes[..7].iter().position(|b| *b != 0).unwrap_or(7);
        write!(f, "{},{}", self.volume_id, hex::encode(&bytes[first..]))
    }
}

impl FromStr for FileId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (vid, rest) = s
            .split_once(',')
            .ok_or_else(|| Error::InvalidFileId(s.to_string()))?;
        let volume_id: VolumeId = vid
            .parse()
            .map_err(|_| Error::InvalidFileId(s.to_string()))?;

        // hex digits only, so the byte split below lands on a char boundary
        if rest.len() <= 8 || rest.len() > 24 || !rest.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::InvalidFileId(s.to_string()));
        }
        let padded = if rest.len() % 2 == 1 {
            format!("0{}", rest)
        } else {
            rest.to_string()
        };
        let bytes = hex::decode(&padded).map_err(|_| Error::InvalidFileId(s.to_string()))?;
        let (key_bytes, cookie_bytes) = bytes.split_at(bytes.len() - 4);

        let mut key = [0u8; 8];
        key[8 - key_bytes.len()..].copy_from_slice(key_bytes);
        let mut cookie = [0u8; 4];
        cookie.copy_from_slice(cookie_bytes);
        let key = u64::from_be_bytes(key);
        let cookie = u32::from_be_bytes(cookie);

        Ok(FileId::new(volume_id, key, cookie))
    }
}
