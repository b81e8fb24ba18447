//! Routes intercepted API calls to the counters of the handles they use.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

use ash::vk;
use parking_lot::Mutex;
use static_assertions::assert_impl_all;

use crate::util::concurrent_map::ConcurrentMap;
use crate::util::thread::OsServices;
use crate::validation::config::ThreadSafetyConfig;
use crate::validation::counter::{UseCounter, ValidationContext};
use crate::validation::handles::{Counters, HandleScope, ObjectKind, TrackedHandle};
use crate::validation::report::ReportSink;
use crate::validation::use_state::UseCount;

/// Bookkeeping of objects which are implicitly owned by a pool or device.
#[derive(Default)]
pub(super) struct Ownership {
    pub(super) pool_descriptor_sets: HashMap<vk::DescriptorPool, HashSet<vk::DescriptorSet>>,
    pub(super) device_queues: HashMap<vk::Device, HashSet<vk::Queue>>,
}

/// Thread safety validator for one instance or one device.
///
/// A device level validator holds a reference to the validator of its instance. Instance level
/// handle types (see [`HandleScope`]) are always tracked by the instance validator so every device
/// created from the same instance observes the same state for them.
pub struct ValidationDispatcher {
    context: Arc<ValidationContext>,
    parent: Option<Arc<ValidationDispatcher>>,
    counters: Counters,

    // Guards the contents of a command pool separately from the pool itself. Command buffer reads
    // take a read on this counter so that resetting or destroying the pool conflicts with them
    // while command buffers of the same pool used from different threads do not.
    command_pool_contents: UseCounter<vk::CommandPool>,

    pub(super) command_pool_map: ConcurrentMap<vk::CommandBuffer, vk::CommandPool>,
    pub(super) dsl_update_after_bind: ConcurrentMap<vk::DescriptorSetLayout, bool, 4>,
    pub(super) ds_update_after_bind: ConcurrentMap<vk::DescriptorSet, bool>,
    pub(super) ownership: Mutex<Ownership>,
}

assert_impl_all!(ValidationDispatcher: Send, Sync);

impl ValidationDispatcher {
    /// Creates the validator of a new instance.
    pub fn new_instance(config: ThreadSafetyConfig, sink: Arc<dyn ReportSink>) -> Arc<Self> {
        Self::from_context(ValidationContext::new(config, sink), None)
    }

    /// Creates the validator of a new instance using custom os services.
    pub fn new_instance_with_os(config: ThreadSafetyConfig, sink: Arc<dyn ReportSink>, os: Arc<dyn OsServices>) -> Arc<Self> {
        Self::from_context(ValidationContext::with_os_services(config, sink, os), None)
    }

    /// Creates the validator of a device created from the instance validated by `parent`.
    ///
    /// If `parent` is itself a device validator its instance validator is used instead.
    pub fn new_device(parent: &Arc<ValidationDispatcher>) -> Arc<Self> {
        let root = match &parent.parent {
            Some(root) => root.clone(),
            None => parent.clone(),
        };
        Self::from_context(root.context.clone(), Some(root))
    }

    fn from_context(context: Arc<ValidationContext>, parent: Option<Arc<ValidationDispatcher>>) -> Arc<Self> {
        log::info!("Creating {} thread safety validator", if parent.is_some() { "device" } else { "instance" });

        Arc::new(Self {
            counters: Counters::new(&context),
            command_pool_contents: UseCounter::new(ObjectKind::CommandPool.get_type_name(), context.clone()),
            context,
            parent,
            command_pool_map: ConcurrentMap::new(),
            dsl_update_after_bind: ConcurrentMap::new(),
            ds_update_after_bind: ConcurrentMap::new(),
            ownership: Mutex::new(Ownership::default()),
        })
    }

    pub fn get_parent(&self) -> Option<&Arc<ValidationDispatcher>> {
        self.parent.as_ref()
    }

    pub fn is_instance(&self) -> bool {
        self.parent.is_none()
    }

    pub fn get_config(&self) -> &ThreadSafetyConfig {
        self.context.get_config()
    }

    /// Returns the validator owning the counters of the instance level handle types.
    fn root(&self) -> &ValidationDispatcher {
        self.parent.as_deref().unwrap_or(self)
    }

    fn counters_for(&self, kind: ObjectKind) -> &Counters {
        match kind.get_scope() {
            HandleScope::Instance => &self.root().counters,
            HandleScope::Device => &self.counters,
        }
    }

    pub(super) fn command_pool_contents(&self) -> &UseCounter<vk::CommandPool> {
        &self.command_pool_contents
    }

    /// Starts tracking a newly created handle. A command pool also gets an entry guarding its
    /// contents.
    pub fn create_object<H: Into<TrackedHandle>>(&self, handle: H) {
        let handle = handle.into();
        if let TrackedHandle::CommandPool(pool) = handle {
            self.command_pool_contents.create(pool);
        }
        self.counters_for(handle.get_kind()).create(handle);
    }

    /// Stops tracking a destroyed handle. Destroying a command pool implicitly destroys every
    /// command buffer allocated from it.
    pub fn destroy_object<H: Into<TrackedHandle>>(&self, handle: H) {
        let handle = handle.into();
        match handle {
            TrackedHandle::CommandPool(pool) => self.forget_command_pool(pool),
            TrackedHandle::CommandBuffer(command_buffer) => self.forget_command_buffer(command_buffer),
            _ => {}
        }
        self.counters_for(handle.get_kind()).destroy(handle);
    }

    fn forget_command_pool(&self, pool: vk::CommandPool) {
        self.command_pool_contents.destroy(pool);

        let mut command_buffers = Vec::new();
        self.command_pool_map.retain(|command_buffer, owner| {
            if *owner == pool {
                command_buffers.push(*command_buffer);
                false
            } else {
                true
            }
        });
        for command_buffer in command_buffers {
            self.counters.command_buffer().destroy(command_buffer);
        }
    }

    fn forget_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        self.command_pool_map.remove(&command_buffer);
    }

    /// Returns true if the handle is currently tracked.
    pub fn is_tracked<H: Into<TrackedHandle>>(&self, handle: H) -> bool {
        let handle = handle.into();
        self.counters_for(handle.get_kind()).contains(handle)
    }

    /// Returns the current use counts of a handle or `None` if it is not tracked.
    pub fn current_count<H: Into<TrackedHandle>>(&self, handle: H) -> Option<UseCount> {
        let handle = handle.into();
        self.counters_for(handle.get_kind()).current_count(handle)
    }

    /// Returns the current use counts of the contents of a command pool.
    pub fn command_pool_contents_count(&self, pool: vk::CommandPool) -> Option<UseCount> {
        self.command_pool_contents.current_count(pool)
    }

    /// Returns the pool a command buffer was allocated from.
    pub fn get_command_pool(&self, command_buffer: vk::CommandBuffer) -> Option<vk::CommandPool> {
        self.command_pool_map.get(&command_buffer)
    }

    pub fn start_write_object<H: Into<TrackedHandle>>(&self, handle: H, call_name: &'static str) {
        match handle.into() {
            TrackedHandle::CommandBuffer(command_buffer) => {
                self.start_write_command_buffer(command_buffer, call_name, self.get_config().locks_command_pool())
            }
            handle => self.counters_for(handle.get_kind()).start_write(handle, call_name),
        }
    }

    pub fn finish_write_object<H: Into<TrackedHandle>>(&self, handle: H, call_name: &'static str) {
        match handle.into() {
            TrackedHandle::CommandBuffer(command_buffer) => {
                self.finish_write_command_buffer(command_buffer, call_name, self.get_config().locks_command_pool())
            }
            handle => self.counters_for(handle.get_kind()).finish_write(handle, call_name),
        }
    }

    pub fn start_read_object<H: Into<TrackedHandle>>(&self, handle: H, call_name: &'static str) {
        match handle.into() {
            TrackedHandle::CommandBuffer(command_buffer) => self.start_read_command_buffer(command_buffer, call_name),
            handle => self.counters_for(handle.get_kind()).start_read(handle, call_name),
        }
    }

    pub fn finish_read_object<H: Into<TrackedHandle>>(&self, handle: H, call_name: &'static str) {
        match handle.into() {
            TrackedHandle::CommandBuffer(command_buffer) => self.finish_read_command_buffer(command_buffer, call_name),
            handle => self.counters_for(handle.get_kind()).finish_read(handle, call_name),
        }
    }

    /// Writing a command buffer implicitly writes the pool it was allocated from.
    pub(super) fn start_write_command_buffer(&self, command_buffer: vk::CommandBuffer, call_name: &'static str, lock_pool: bool) {
        if lock_pool {
            if let Some(pool) = self.command_pool_map.get(&command_buffer) {
                self.counters.command_pool().start_write(pool, call_name);
            }
        }
        self.counters.command_buffer().start_write(command_buffer, call_name);
    }

    pub(super) fn finish_write_command_buffer(&self, command_buffer: vk::CommandBuffer, call_name: &'static str, lock_pool: bool) {
        self.counters.command_buffer().finish_write(command_buffer, call_name);
        if lock_pool {
            if let Some(pool) = self.command_pool_map.get(&command_buffer) {
                self.counters.command_pool().finish_write(pool, call_name);
            }
        }
    }

    /// Reading a command buffer reads the contents of its pool but not the pool itself.
    fn start_read_command_buffer(&self, command_buffer: vk::CommandBuffer, call_name: &'static str) {
        if let Some(pool) = self.command_pool_map.get(&command_buffer) {
            self.command_pool_contents.start_read(pool, call_name);
        }
        self.counters.command_buffer().start_read(command_buffer, call_name);
    }

    fn finish_read_command_buffer(&self, command_buffer: vk::CommandBuffer, call_name: &'static str) {
        self.counters.command_buffer().finish_read(command_buffer, call_name);
        if let Some(pool) = self.command_pool_map.get(&command_buffer) {
            self.command_pool_contents.finish_read(pool, call_name);
        }
    }
}

impl Debug for ValidationDispatcher {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationDispatcher")
            .field("instance", &self.is_instance())
            .field("config", self.get_config())
            .finish()
    }
}
