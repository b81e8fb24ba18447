//! Use tracking for all objects of a single handle type.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;

use crate::util::concurrent_map::ConcurrentMap;
use crate::util::thread::{OsServices, StdOsServices, ThreadId};
use crate::validation::config::ThreadSafetyConfig;
use crate::validation::report::{AccessKind, ReportSink, Violation, ViolationKind};
use crate::validation::use_state::{ObjectUseState, UseCount};

/// State shared by every counter of a validator.
pub struct ValidationContext {
    config: ThreadSafetyConfig,
    sink: Arc<dyn ReportSink>,
    os: Arc<dyn OsServices>,
}

impl ValidationContext {
    pub fn new(config: ThreadSafetyConfig, sink: Arc<dyn ReportSink>) -> Arc<Self> {
        Self::with_os_services(config, sink, Arc::new(StdOsServices::new()))
    }

    pub fn with_os_services(config: ThreadSafetyConfig, sink: Arc<dyn ReportSink>, os: Arc<dyn OsServices>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sink,
            os,
        })
    }

    pub fn get_config(&self) -> &ThreadSafetyConfig {
        &self.config
    }

    pub fn current_thread(&self) -> ThreadId {
        self.os.current_thread()
    }
}

/// Maps every live handle of one type to its [`ObjectUseState`] and implements the read/write
/// entry and exit protocol.
pub struct UseCounter<H: Handle> {
    type_name: &'static str,
    objects: ConcurrentMap<H, Arc<ObjectUseState>>,
    context: Arc<ValidationContext>,
}

impl<H: Handle + Copy + Eq + std::hash::Hash> UseCounter<H> {
    pub fn new(type_name: &'static str, context: Arc<ValidationContext>) -> Self {
        Self {
            type_name,
            objects: ConcurrentMap::new(),
            context,
        }
    }

    pub fn get_type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn get_object_type(&self) -> vk::ObjectType {
        H::TYPE
    }

    /// Starts tracking a newly created handle. A handle which is already tracked gets a fresh
    /// state.
    pub fn create(&self, handle: H) {
        if Self::is_null(handle) {
            return;
        }
        if self.objects.insert(handle, Arc::new(ObjectUseState::new())).is_some() {
            log::debug!("{} {:#X} created while still tracked", self.type_name, handle.as_raw());
        }
    }

    /// Stops tracking a handle.
    pub fn destroy(&self, handle: H) {
        if Self::is_null(handle) {
            return;
        }
        self.objects.remove(&handle);
    }

    pub fn contains(&self, handle: H) -> bool {
        self.objects.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Returns the current use counts of a handle or `None` if it is not tracked.
    pub fn current_count(&self, handle: H) -> Option<UseCount> {
        self.objects.get(&handle).map(|state| state.current_count())
    }

    pub fn start_write(&self, handle: H, call_name: &'static str) {
        if Self::is_null(handle) {
            return;
        }
        let state = match self.find(handle, call_name, AccessKind::Write) {
            Some(state) => state,
            None => return,
        };
        let thread = self.context.current_thread();

        let prior = state.add_writer();
        if prior.is_idle() {
            state.set_owning_thread(thread);
            return;
        }

        // Readers or writers already present. A use from the same thread is either multiple use
        // in one call or recursion, neither of which can be made safe so we just continue.
        let owner = state.owning_thread();
        if owner != Some(thread) {
            self.on_collision(&state, handle, call_name, AccessKind::Write, thread, owner);
            state.set_owning_thread(thread);
        }
    }

    pub fn finish_write(&self, handle: H, call_name: &'static str) {
        if Self::is_null(handle) {
            return;
        }
        match self.objects.get(&handle) {
            Some(state) => state.remove_writer(),
            None => log::trace!("{}(): finished write of untracked {} {:#X}", call_name, self.type_name, handle.as_raw()),
        }
    }

    pub fn start_read(&self, handle: H, call_name: &'static str) {
        if Self::is_null(handle) {
            return;
        }
        let state = match self.find(handle, call_name, AccessKind::Read) {
            Some(state) => state,
            None => return,
        };
        let thread = self.context.current_thread();

        let prior = state.add_reader();
        if prior.is_idle() {
            state.set_owning_thread(thread);
            return;
        }

        // Readers never conflict with other readers
        if prior.writers > 0 {
            let owner = state.owning_thread();
            if owner != Some(thread) {
                if self.on_collision(&state, handle, call_name, AccessKind::Read, thread, owner) {
                    state.set_owning_thread(thread);
                }
            }
        }
    }

    pub fn finish_read(&self, handle: H, call_name: &'static str) {
        if Self::is_null(handle) {
            return;
        }
        match self.objects.get(&handle) {
            Some(state) => state.remove_reader(),
            None => log::trace!("{}(): finished read of untracked {} {:#X}", call_name, self.type_name, handle.as_raw()),
        }
    }

    fn is_null(handle: H) -> bool {
        handle.as_raw() == 0
    }

    fn find(&self, handle: H, call_name: &'static str, access: AccessKind) -> Option<Arc<ObjectUseState>> {
        let state = self.objects.get(&handle);
        if state.is_none() {
            self.report(ViolationKind::ObjectNotFound, handle, call_name, access, self.context.current_thread(), None);
        }
        state
    }

    /// Reports a cross thread collision and waits for the object if the sink asks for it.
    /// Returns true if the calling thread waited.
    fn on_collision(&self, state: &ObjectUseState, handle: H, call_name: &'static str, access: AccessKind, thread: ThreadId, owner: Option<ThreadId>) -> bool {
        let block = self.report(ViolationKind::ConcurrentUse, handle, call_name, access, thread, owner);
        if !block {
            return false;
        }

        let as_writer = access == AccessKind::Write;
        if !state.wait_until_idle(as_writer, self.context.os.as_ref(), &self.context.config) {
            self.report(ViolationKind::WaitTimedOut, handle, call_name, access, thread, state.owning_thread());
        }
        true
    }

    fn report(&self, kind: ViolationKind, handle: H, call_name: &'static str, access: AccessKind, thread: ThreadId, other: Option<ThreadId>) -> bool {
        let violation = Violation {
            kind,
            access,
            object_type: H::TYPE,
            type_name: self.type_name,
            handle: handle.as_raw(),
            call_name,
            current_thread: thread,
            other_thread: other,
        };
        self.context.sink.report_violation(&violation)
    }
}
