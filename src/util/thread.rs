//! Thread identity and sleeping, abstracted so the validator can be driven by a custom scheduler
//! in tests or embedded environments.

use std::fmt::{Debug, Formatter};
use std::num::NonZeroU64;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Identifies a thread calling into the validator.
///
/// The raw value `0` is reserved to represent "no thread" and is never handed out.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    /// Creates a thread id from a raw value. Returns `None` for `0`.
    pub const fn from_raw(raw: u64) -> Option<Self> {
        match NonZeroU64::new(raw) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    pub const fn get_raw(&self) -> u64 {
        self.0.get()
    }
}

impl Debug for ThreadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("ThreadId({:#X})", self.get_raw()))
    }
}

/// The operating system services the validator depends on.
pub trait OsServices: Send + Sync {
    /// Returns the id of the calling thread. Must be stable for the lifetime of the thread and
    /// distinct between live threads.
    fn current_thread(&self) -> ThreadId;

    /// Suspends the calling thread for roughly `duration`.
    fn sleep(&self, duration: Duration);
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_THREAD_ID: ThreadId = {
        let next = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        // Overflowing 64 bits of thread ids is not a realistic concern
        ThreadId(NonZeroU64::new(next).unwrap_or(NonZeroU64::MAX))
    };
}

/// [`OsServices`] backed by the standard library.
#[derive(Copy, Clone, Debug, Default)]
pub struct StdOsServices;

impl StdOsServices {
    pub fn new() -> Self {
        Self
    }
}

impl OsServices for StdOsServices {
    fn current_thread(&self) -> ThreadId {
        CURRENT_THREAD_ID.with(|id| *id)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}
