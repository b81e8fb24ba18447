//! Detection of concurrent unsynchronized use of Vulkan objects.
//!
//! Vulkan requires the application to externally synchronize access to many objects. The
//! [`ValidationDispatcher`] is invoked before and after every intercepted API call with the handles
//! the call uses and classifies each use as a write (exclusive) or a read (shared). Every handle has
//! an [`ObjectUseState`] counting its current readers and writers. A use which overlaps a write
//! from a different thread, or a write overlapping any use from a different thread, is reported to
//! a [`ReportSink`].
//!
//! The validator only observes. Unless a sink explicitly asks the calling thread to wait, the
//! intercepted call always proceeds as if no validation took place.

pub mod calls;
pub mod config;
pub mod counter;
pub mod dispatcher;
pub mod handles;
pub mod report;
pub mod use_state;

mod lifecycle;

pub use calls::{Access, ArgumentMismatch, CallGuard, EntryPoint, ParamSync, entry_points};
pub use config::ThreadSafetyConfig;
pub use counter::{UseCounter, ValidationContext};
pub use dispatcher::ValidationDispatcher;
pub use handles::{HandleScope, ObjectKind, TrackedHandle};
pub use report::{AccessKind, CollectingReportSink, LogReportSink, ReportSink, Violation, ViolationKind};
pub use use_state::{ObjectUseState, UseCount, UseState};
