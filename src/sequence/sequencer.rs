//! Monotonic file-key allocator
//!
//! Keys are handed out from an in-memory cursor. The durable store only holds
//! a ceiling: every key below it may already have been granted. Whenever a
//! request would cross the ceiling, a new ceiling rounded up to the batch size
//! is persisted first. After a restart the cursor resumes at the persisted
//! ceiling, so unused keys of the last batch are skipped and never reissued.

use crate::common::utils::lock;
use crate::common::{round_up, Error, Result, METRICS};
use crate::sequence::store::SequenceStore;
use std::sync::Mutex;

/// Default number of keys reserved per durable write
pub const DEFAULT_BATCH: u64 = 10_000;

struct SequenceState {
    /// Next key to hand out
    next: u64,
    /// Persisted high-water mark; keys `< ceiling` are covered
    ceiling: u64,
}

pub struct Sequencer {
    store: Box<dyn SequenceStore>,
    batch: u64,
    state: Mutex<SequenceState>,
}

impl Sequencer {
    /// Open a sequencer over `store`, resuming from its persisted ceiling
    pub fn open(store: impl SequenceStore + 'static, batch: u64) -> Result<Self> {
        let ceiling = store.load()?.unwrap_or(0);
        // Key 0 is never issued
        let next = ceiling.max(1);
        tracing::info!("Sequencer resuming at {} (batch {})", next, batch);

        Ok(Self {
            store: Box::new(store),
            batch: batch.max(1),
            state: Mutex::new(SequenceState { next, ceiling }),
        })
    }

    /// Reserve `count` consecutive keys.
    ///
    /// Returns the first key and the number of keys granted. Nothing is
    /// granted unless the covering ceiling has been durably recorded.
    pub fn next_file_id(&self, count: u64) -> Result<(u64, u64)> {
        let count = count.max(1);
        let mut state = lock(&self.state);

        let start = state.next;
        let end = start
            .checked_add(count)
            .ok_or_else(|| Error::SequencePersist("sequence space exhausted".into()))?;

        if end > state.ceiling {
            let ceiling = round_up(end, self.batch);
            self.store.save(ceiling)?;
            tracing::debug!("Persisted sequence ceiling {}", ceiling);
            METRICS.sequence_persists.inc();
            state.ceiling = ceiling;
        }

        state.next = end;
        METRICS.file_ids_granted.add(count);
        Ok((start, count))
    }

    /// Next key that would be handed out
    pub fn peek(&self) -> u64 {
        lock(&self.state).next
    }

    /// Currently persisted ceiling
    pub fn ceiling(&self) -> u64 {
        lock(&self.state).ceiling
    }
}
