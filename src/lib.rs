//! Thread safety validation for Vulkan applications.
//!
//! See [`validation`] for an overview.

pub mod util;
pub mod validation;

pub use util::thread::ThreadId;

pub mod prelude {
    pub use crate::util::thread::{OsServices, StdOsServices, ThreadId};
    pub use crate::validation::{
        Access, EntryPoint, LogReportSink, ReportSink, ThreadSafetyConfig, TrackedHandle,
        ValidationDispatcher, Violation, ViolationKind,
    };
}
