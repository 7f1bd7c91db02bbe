//! Durable storage for the sequencer's high-water mark
//!
//! File format (16 bytes): [MAGIC "SEQ1"][CEILING u64 LE][CRC32 LE]
//!
//! The record is written to a temporary file, fsynced and renamed over the
//! previous one, so a crash leaves either the old or the new mark on disk.

use crate::common::utils::lock;
use crate::common::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SEQ_MAGIC: [u8; 4] = [0x53, 0x45, 0x51, 0x31]; // "SEQ1"
const RECORD_LEN: usize = 16;

/// Backend holding the persisted high-water mark
pub trait SequenceStore: Send + Sync {
    /// Last persisted mark, `None` if nothing was ever saved
    fn load(&self) -> Result<Option<u64>>;

    /// Durably record `ceiling`; must not return `Ok` before the write is stable
    fn save(&self, ceiling: u64) -> Result<()>;
}

/// File-backed store
pub struct FileSequenceStore {
    path: PathBuf,
}

impl FileSequenceStore {
    /// Use `path` as the sequence file, creating its parent directory
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(ceiling: u64) -> [u8; RECORD_LEN] {
        let mut record = [0u8; RECORD_LEN];
        record[..4].copy_from_slice(&SEQ_MAGIC);
        record[4..12].copy_from_slice(&ceiling.to_le_bytes());
        let checksum = crc32fast::hash(&record[4..12]);
        record[12..].copy_from_slice(&checksum.to_le_bytes());
        record
    }

    fn decode(record: &[u8]) -> Result<u64> {
        if record.len() != RECORD_LEN {
            return Err(Error::Corrupted(format!(
                "sequence record has {} bytes, expected {}",
                record.len(),
                RECORD_LEN
            )));
        }
        if record[..4] != SEQ_MAGIC {
            return Err(Error::Corrupted("invalid sequence magic".into()));
        }

        let mut ceiling_bytes = [0u8; 8];
        ceiling_bytes.copy_from_slice(&record[4..12]);
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&record[12..]);

        let expected = u32::from_le_bytes(crc_bytes);
        let actual = crc32fast::hash(&ceiling_bytes);
        if expected != actual {
            return Err(Error::Corrupted(format!(
                "sequence checksum mismatch: expected {:08x}, got {:08x}",
                expected, actual
            )));
        }

        Ok(u64::from_le_bytes(ceiling_bytes))
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

impl SequenceStore for FileSequenceStore {
    fn load(&self) -> Result<Option<u64>> {
        let mut file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut record = Vec::with_capacity(RECORD_LEN);
        file.read_to_end(&mut record)?;
        Self::decode(&record).map(Some)
    }

    fn save(&self, ceiling: u64) -> Result<()> {
        let tmp = self.tmp_path();
        let persist = || -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(&Self::encode(ceiling))?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                File::open(parent)?.sync_all()?;
            }
            Ok(())
        };

        persist().map_err(|e| {
            Error::SequencePersist(format!("{}: {}", self.path.display(), e))
        })
    }
}

/// In-memory store for tests and ephemeral masters
#[derive(Default)]
pub struct MemorySequenceStore {
    ceiling: Mutex<Option<u64>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SequenceStore for MemorySequenceStore {
    fn load(&self) -> Result<Option<u64>> {
        Ok(*lock(&self.ceiling))
    }

    fn save(&self, ceiling: u64) -> Result<()> {
        *lock(&self.ceiling) = Some(ceiling);
        Ok(())
    }
}

/// RocksDB-backed store
#[cfg(feature = "rocksdb-sequence")]
pub struct RocksSequenceStore {
    db: rocksdb::DB,
}

#[cfg(feature = "rocksdb-sequence")]
impl RocksSequenceStore {
    const KEY: &'static [u8] = b"sequence/ceiling";

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = rocksdb::DB::open(&opts, path)?;
        Ok(Self { db })
    }
}

#[cfg(feature = "rocksdb-sequence")]
impl SequenceStore for RocksSequenceStore {
    fn load(&self) -> Result<Option<u64>> {
        match self.db.get(Self::KEY)? {
            Some(bytes) => {
                let raw: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::Corrupted("sequence value is not 8 bytes".into()))?;
                Ok(Some(u64::from_le_bytes(raw)))
            }
            None => Ok(None),
        }
    }

    fn save(&self, ceiling: u64) -> Result<()> {
        let mut opts = rocksdb::WriteOptions::default();
        opts.set_sync(true);
        self.db.put_opt(Self::KEY, ceiling.to_le_bytes(), &opts)?;
        Ok(())
    }
}
