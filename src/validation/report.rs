//! Violation reports and the sinks receiving them.

use std::fmt::{Display, Formatter};

use ash::vk;
use parking_lot::Mutex;

use crate::util::thread::ThreadId;

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum ViolationKind {
    /// A write overlapped another use, or a read overlapped a write, from a different thread.
    ConcurrentUse,

    /// The handle has no tracked state. Either it was destroyed, never created or passed as the
    /// wrong type.
    ObjectNotFound,

    /// A sink requested blocking but the object did not become idle within the configured number
    /// of attempts.
    WaitTimedOut,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum AccessKind {
    Read,
    Write,
}

/// A single detected violation of the external synchronization rules.
#[derive(Clone, Debug)]
pub struct Violation {
    pub kind: ViolationKind,
    pub access: AccessKind,
    pub object_type: vk::ObjectType,
    pub type_name: &'static str,
    pub handle: u64,
    pub call_name: &'static str,
    pub current_thread: ThreadId,

    /// The thread last recorded as using the object. Only set for [`ViolationKind::ConcurrentUse`]
    /// and [`ViolationKind::WaitTimedOut`].
    pub other_thread: Option<ThreadId>,
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ViolationKind::ConcurrentUse => {
                let other = self.other_thread.map(|t| t.get_raw()).unwrap_or(0);
                write!(f, "THREADING ERROR : {}(): object of type {} (handle {:#X}) is simultaneously used in thread {:#X} and thread {:#X}",
                       self.call_name, self.type_name, self.handle, other, self.current_thread.get_raw())
            }
            ViolationKind::ObjectNotFound => {
                write!(f, "{}(): couldn't find {} object {:#X}. This should not happen and may indicate a bug in the application",
                       self.call_name, self.type_name, self.handle)
            }
            ViolationKind::WaitTimedOut => {
                let other = self.other_thread.map(|t| t.get_raw()).unwrap_or(0);
                write!(f, "{}(): gave up waiting for {} object {:#X} held by thread {:#X} in thread {:#X}, continuing with unsafe use",
                       self.call_name, self.type_name, self.handle, other, self.current_thread.get_raw())
            }
        }
    }
}

impl std::error::Error for Violation {
}

/// Receives violation reports.
pub trait ReportSink: Send + Sync {
    /// Called once per detected violation. Returning `true` requests that the calling thread waits
    /// until the object can be used safely instead of proceeding immediately. The return value is
    /// ignored for anything other than [`ViolationKind::ConcurrentUse`].
    fn report_violation(&self, violation: &Violation) -> bool;
}

/// Forwards violations to the `log` crate.
pub struct LogReportSink {
    block: bool,
}

impl LogReportSink {
    pub fn new() -> Self {
        Self {
            block: false,
        }
    }

    /// Creates a sink which requests blocking on every concurrent use.
    pub fn blocking() -> Self {
        Self {
            block: true,
        }
    }
}

impl Default for LogReportSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for LogReportSink {
    fn report_violation(&self, violation: &Violation) -> bool {
        match violation.kind {
            ViolationKind::WaitTimedOut => log::warn!("{}", violation),
            _ => log::error!("{}", violation),
        }
        self.block
    }
}

/// Stores all violations in memory.
pub struct CollectingReportSink {
    violations: Mutex<Vec<Violation>>,
    block: bool,
}

impl CollectingReportSink {
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
            block: false,
        }
    }

    pub fn blocking() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
            block: true,
        }
    }

    /// Returns a copy of all violations reported so far.
    pub fn get_violations(&self) -> Vec<Violation> {
        self.violations.lock().clone()
    }

    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.lock().iter().filter(|v| v.kind == kind).count()
    }

    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Removes and returns all violations reported so far.
    pub fn take(&self) -> Vec<Violation> {
        std::mem::take(&mut *self.violations.lock())
    }
}

impl Default for CollectingReportSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReportSink for CollectingReportSink {
    fn report_violation(&self, violation: &Violation) -> bool {
        log::debug!("{}", violation);
        self.violations.lock().push(violation.clone());
        self.block
    }
}
