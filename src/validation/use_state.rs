//! Per object concurrent use tracking.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use static_assertions::{assert_impl_all, const_assert_eq};

use crate::util::thread::{OsServices, ThreadId};
use crate::validation::config::ThreadSafetyConfig;

/// A snapshot of the reader and writer counts of an object.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct UseCount {
    pub readers: i32,
    pub writers: i32,
}

impl UseCount {
    const READER_MASK: i64 = 0xFFFFFFFF;
    const WRITER_OFFSET: u32 = 32;

    fn from_packed(packed: i64) -> Self {
        Self {
            readers: (packed & Self::READER_MASK) as i32,
            writers: (packed >> Self::WRITER_OFFSET) as i32,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.readers == 0 && self.writers == 0
    }

    pub fn get_state(&self) -> UseState {
        match (self.readers > 0, self.writers > 0) {
            (false, false) => UseState::Idle,
            (true, false) => UseState::ReadShared,
            (false, true) => UseState::WriteExclusive,
            (true, true) => UseState::Mixed,
        }
    }
}

/// The state of an object derived from its use counts.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum UseState {
    Idle,
    ReadShared,
    WriteExclusive,
    /// Readers and writers at the same time. Only reachable while a collision is in flight.
    Mixed,
}

/// Tracks the concurrent use of a single object.
///
/// Writer and reader counts live in one atomic so a single `fetch_add` updates either count and
/// a single load observes both. The owning thread is updated opportunistically and is only a hint
/// under contention.
#[repr(align(64))]
pub struct ObjectUseState {
    // Writers in the high 32 bits, readers in the low 32 bits
    counts: AtomicI64,
    owning_thread: AtomicU64,
}

const_assert_eq!(std::mem::align_of::<ObjectUseState>(), 64);
const_assert_eq!(std::mem::size_of::<ObjectUseState>(), 64);
assert_impl_all!(ObjectUseState: Send, Sync);

impl ObjectUseState {
    const WRITER_ONE: i64 = 1i64 << UseCount::WRITER_OFFSET;
    const READER_ONE: i64 = 1i64;

    pub fn new() -> Self {
        Self {
            counts: AtomicI64::new(0),
            owning_thread: AtomicU64::new(0),
        }
    }

    /// Increments the writer count and returns the counts observed before the increment.
    pub fn add_writer(&self) -> UseCount {
        UseCount::from_packed(self.counts.fetch_add(Self::WRITER_ONE, Ordering::AcqRel))
    }

    /// Increments the reader count and returns the counts observed before the increment.
    pub fn add_reader(&self) -> UseCount {
        UseCount::from_packed(self.counts.fetch_add(Self::READER_ONE, Ordering::AcqRel))
    }

    pub fn remove_writer(&self) {
        self.counts.fetch_sub(Self::WRITER_ONE, Ordering::AcqRel);
    }

    pub fn remove_reader(&self) {
        self.counts.fetch_sub(Self::READER_ONE, Ordering::AcqRel);
    }

    pub fn current_count(&self) -> UseCount {
        UseCount::from_packed(self.counts.load(Ordering::Acquire))
    }

    pub fn owning_thread(&self) -> Option<ThreadId> {
        ThreadId::from_raw(self.owning_thread.load(Ordering::Relaxed))
    }

    pub fn set_owning_thread(&self, thread: ThreadId) {
        self.owning_thread.store(thread.get_raw(), Ordering::Relaxed);
    }

    /// Polls until every other user of the object is gone.
    ///
    /// The calling thread must already hold its own reader or writer count. A prospective writer
    /// waits for all readers and all other writers to leave, a prospective reader only waits for
    /// writers. Returns `false` if the configured maximum number of attempts was exhausted first.
    pub fn wait_until_idle(&self, as_writer: bool, os: &dyn OsServices, config: &ThreadSafetyConfig) -> bool {
        let mut attempts = 0u64;
        loop {
            let count = self.current_count();
            let idle = if as_writer {
                count.readers <= 0 && count.writers <= 1
            } else {
                count.writers <= 0
            };
            if idle {
                return true;
            }

            if let Some(max) = config.get_max_wait_attempts() {
                if attempts >= max {
                    return false;
                }
            }
            attempts += 1;

            os.sleep(config.get_wait_poll_interval());
        }
    }
}

impl Default for ObjectUseState {
    fn default() -> Self {
        Self::new()
    }
}
