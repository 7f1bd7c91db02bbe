//! Durable monotonic identifier allocation

pub mod sequencer;
pub mod store;

pub use sequencer::{Sequencer, DEFAULT_BATCH};
#[cfg(feature = "rocksdb-sequence")]
pub use store::RocksSequenceStore;
pub use store::{FileSequenceStore, MemorySequenceStore, SequenceStore};
