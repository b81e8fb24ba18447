//! The table of tracked Vulkan handle types.
//!
//! Every handle type gets one [`UseCounter`] per validator. The table below generates the
//! [`ObjectKind`] and [`TrackedHandle`] enums as well as the counter storage and the per type
//! routing, so adding a handle type only requires adding a single line.

use std::sync::Arc;

use ash::vk;
use ash::vk::Handle;
use paste::paste;

use crate::validation::counter::{UseCounter, ValidationContext};
use crate::validation::use_state::UseCount;

/// Which validator owns the counters of a handle type.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum HandleScope {
    /// Tracked by the instance level validator, even if the call was intercepted by a device
    /// level validator.
    Instance,

    /// Tracked by the validator which intercepted the call.
    Device,
}

macro_rules! tracked_handles {
    ($($name:ident => $scope:ident),* $(,)?) => {
        paste! {
            /// The type of a tracked handle.
            #[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
            pub enum ObjectKind {
                $($name,)*
            }

            impl ObjectKind {
                pub const ALL: &'static [ObjectKind] = &[$(ObjectKind::$name,)*];

                /// Returns the Vulkan name of the handle type, i.e. `"VkBuffer"`.
                pub const fn get_type_name(&self) -> &'static str {
                    match self {
                        $(ObjectKind::$name => concat!("Vk", stringify!($name)),)*
                    }
                }

                pub const fn get_scope(&self) -> HandleScope {
                    match self {
                        $(ObjectKind::$name => HandleScope::$scope,)*
                    }
                }

                pub fn get_object_type(&self) -> vk::ObjectType {
                    match self {
                        $(ObjectKind::$name => <vk::$name as Handle>::TYPE,)*
                    }
                }
            }

            /// A handle of any tracked type.
            #[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
            pub enum TrackedHandle {
                $($name(vk::$name),)*
            }

            impl TrackedHandle {
                pub fn get_kind(&self) -> ObjectKind {
                    match self {
                        $(TrackedHandle::$name(_) => ObjectKind::$name,)*
                    }
                }

                pub fn as_raw(&self) -> u64 {
                    match self {
                        $(TrackedHandle::$name(handle) => handle.as_raw(),)*
                    }
                }

                /// Creates a handle of the given kind from its raw value.
                pub fn from_raw(kind: ObjectKind, raw: u64) -> Self {
                    match kind {
                        $(ObjectKind::$name => TrackedHandle::$name(vk::$name::from_raw(raw)),)*
                    }
                }

                pub fn is_null(&self) -> bool {
                    self.as_raw() == 0
                }
            }

            $(
                impl From<vk::$name> for TrackedHandle {
                    fn from(handle: vk::$name) -> Self {
                        TrackedHandle::$name(handle)
                    }
                }
            )*

            /// One counter for every tracked handle type.
            pub(crate) struct Counters {
                $([<$name:snake>]: UseCounter<vk::$name>,)*
            }

            impl Counters {
                pub(crate) fn new(context: &Arc<ValidationContext>) -> Self {
                    Self {
                        $([<$name:snake>]: UseCounter::new(ObjectKind::$name.get_type_name(), context.clone()),)*
                    }
                }

                $(
                    #[allow(dead_code)]
                    pub(crate) fn [<$name:snake>](&self) -> &UseCounter<vk::$name> {
                        &self.[<$name:snake>]
                    }
                )*

                pub(crate) fn start_write(&self, handle: TrackedHandle, call_name: &'static str) {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].start_write(handle, call_name),)*
                    }
                }

                pub(crate) fn finish_write(&self, handle: TrackedHandle, call_name: &'static str) {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].finish_write(handle, call_name),)*
                    }
                }

                pub(crate) fn start_read(&self, handle: TrackedHandle, call_name: &'static str) {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].start_read(handle, call_name),)*
                    }
                }

                pub(crate) fn finish_read(&self, handle: TrackedHandle, call_name: &'static str) {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].finish_read(handle, call_name),)*
                    }
                }

                pub(crate) fn create(&self, handle: TrackedHandle) {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].create(handle),)*
                    }
                }

                pub(crate) fn destroy(&self, handle: TrackedHandle) {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].destroy(handle),)*
                    }
                }

                pub(crate) fn contains(&self, handle: TrackedHandle) -> bool {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].contains(handle),)*
                    }
                }

                pub(crate) fn current_count(&self, handle: TrackedHandle) -> Option<UseCount> {
                    match handle {
                        $(TrackedHandle::$name(handle) => self.[<$name:snake>].current_count(handle),)*
                    }
                }
            }
        }
    }
}

tracked_handles! {
    Instance => Instance,
    Device => Instance,
    SurfaceKHR => Instance,
    SwapchainKHR => Instance,
    DebugReportCallbackEXT => Instance,
    DebugUtilsMessengerEXT => Instance,

    Queue => Device,
    CommandBuffer => Device,
    AccelerationStructureKHR => Device,
    AccelerationStructureNV => Device,
    Buffer => Device,
    BufferView => Device,
    CommandPool => Device,
    DeferredOperationKHR => Device,
    DescriptorPool => Device,
    DescriptorSet => Device,
    DescriptorSetLayout => Device,
    DescriptorUpdateTemplate => Device,
    DeviceMemory => Device,
    DisplayKHR => Device,
    DisplayModeKHR => Device,
    Event => Device,
    Fence => Device,
    Framebuffer => Device,
    Image => Device,
    ImageView => Device,
    IndirectCommandsLayoutNV => Device,
    PerformanceConfigurationINTEL => Device,
    Pipeline => Device,
    PipelineCache => Device,
    PipelineLayout => Device,
    PrivateDataSlot => Device,
    QueryPool => Device,
    RenderPass => Device,
    Sampler => Device,
    SamplerYcbcrConversion => Device,
    Semaphore => Device,
    ShaderModule => Device,
    ValidationCacheEXT => Device,
}
