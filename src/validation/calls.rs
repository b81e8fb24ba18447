//! Data driven pre and post call tracking.
//!
//! Instead of one hand written hook per API entry point, each entry point is described once by an
//! [`EntryPoint`] listing how every handle parameter must be synchronized. A single generic routine
//! then performs the matching start and finish operations.

use crate::validation::dispatcher::ValidationDispatcher;
use crate::validation::handles::{ObjectKind, TrackedHandle};

/// The external synchronization requirement of a handle parameter.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub enum Access {
    /// The parameter must be externally synchronized.
    Write,

    /// The parameter may be used concurrently by other reads.
    Read,

    /// The parameter is not tracked.
    Untracked,
}

/// Describes one handle parameter of an entry point.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct ParamSync {
    pub kind: ObjectKind,
    pub access: Access,

    /// If set this parameter also applies to all following arguments. Only valid for the last
    /// parameter of an entry point.
    pub repeated: bool,
}

impl ParamSync {
    pub const fn write(kind: ObjectKind) -> Self {
        Self { kind, access: Access::Write, repeated: false }
    }

    pub const fn read(kind: ObjectKind) -> Self {
        Self { kind, access: Access::Read, repeated: false }
    }

    pub const fn untracked(kind: ObjectKind) -> Self {
        Self { kind, access: Access::Untracked, repeated: false }
    }

    /// Marks this parameter as an array of handles.
    pub const fn repeated(self) -> Self {
        Self { repeated: true, ..self }
    }
}

/// The synchronization requirements of an API entry point.
#[derive(Copy, Clone, Debug)]
pub struct EntryPoint {
    pub name: &'static str,
    pub params: &'static [ParamSync],
}

impl EntryPoint {
    pub const fn new(name: &'static str, params: &'static [ParamSync]) -> Self {
        Self { name, params }
    }

    /// Returns the parameter description applying to the argument at `index`.
    pub fn get_param(&self, index: usize) -> Option<&ParamSync> {
        match self.params.get(index) {
            Some(param) => Some(param),
            None => self.params.last().filter(|param| param.repeated),
        }
    }

    /// Returns how the argument at `index` of type `kind` must be synchronized.
    pub fn resolve_access(&self, index: usize, kind: ObjectKind) -> Result<Access, ArgumentMismatch> {
        match self.get_param(index) {
            Some(param) if param.kind == kind => Ok(param.access),
            Some(param) => Err(ArgumentMismatch::WrongKind { index, expected: param.kind, found: kind }),
            None => Err(ArgumentMismatch::Unexpected { index, found: kind }),
        }
    }
}

/// An argument which does not match the parameters of its [`EntryPoint`]. Such arguments are not
/// tracked.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArgumentMismatch {
    WrongKind { index: usize, expected: ObjectKind, found: ObjectKind },
    Unexpected { index: usize, found: ObjectKind },
}

impl std::fmt::Display for ArgumentMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgumentMismatch::WrongKind { index, expected, found } => {
                write!(f, "argument {} is a {} but a {} was expected", index, found.get_type_name(), expected.get_type_name())
            }
            ArgumentMismatch::Unexpected { index, found } => {
                write!(f, "unexpected argument {} of type {}", index, found.get_type_name())
            }
        }
    }
}

impl std::error::Error for ArgumentMismatch {
}

impl ValidationDispatcher {
    /// Starts tracking all handle arguments of a call. `args` must list the handles in parameter
    /// order with the elements of a repeated parameter following each other.
    ///
    /// Every call to this function must be paired with a call to [`Self::post_call`] using the
    /// same arguments. Prefer [`Self::begin_call`] which guarantees this.
    pub fn pre_call(&self, entry: &EntryPoint, args: &[TrackedHandle]) {
        for (index, handle) in args.iter().copied().enumerate() {
            let access = entry.resolve_access(index, handle.get_kind()).unwrap_or_else(|err| {
                log::warn!("{}(): {}, not tracking it", entry.name, err);
                Access::Untracked
            });
            match access {
                Access::Write => self.start_write_object(handle, entry.name),
                Access::Read => self.start_read_object(handle, entry.name),
                Access::Untracked => {}
            }
        }
    }

    /// Finishes tracking all handle arguments of a call in reverse order.
    pub fn post_call(&self, entry: &EntryPoint, args: &[TrackedHandle]) {
        // Mismatches were already logged by pre_call
        for (index, handle) in args.iter().copied().enumerate().rev() {
            match entry.resolve_access(index, handle.get_kind()).unwrap_or(Access::Untracked) {
                Access::Write => self.finish_write_object(handle, entry.name),
                Access::Read => self.finish_read_object(handle, entry.name),
                Access::Untracked => {}
            }
        }
    }

    /// Starts tracking all handle arguments of a call. Tracking is finished once the returned
    /// guard is dropped.
    #[must_use]
    pub fn begin_call<'a>(&'a self, entry: &'a EntryPoint, args: &'a [TrackedHandle]) -> CallGuard<'a> {
        self.pre_call(entry, args);
        CallGuard {
            dispatcher: self,
            entry,
            args,
        }
    }
}

/// Finishes tracking the arguments of a call when dropped.
pub struct CallGuard<'a> {
    dispatcher: &'a ValidationDispatcher,
    entry: &'a EntryPoint,
    args: &'a [TrackedHandle],
}

impl<'a> Drop for CallGuard<'a> {
    fn drop(&mut self) {
        self.dispatcher.post_call(self.entry, self.args);
    }
}

/// Synchronization requirements of commonly intercepted entry points.
pub mod entry_points {
    use super::{EntryPoint, ParamSync as P};
    use crate::validation::handles::ObjectKind as K;

    macro_rules! entry_point {
        ($const_name:ident, $name:literal, [$($param:expr),* $(,)?]) => {
            pub const $const_name: EntryPoint = EntryPoint { name: $name, params: &[$($param,)*] };
        }
    }

    entry_point!(QUEUE_SUBMIT, "vkQueueSubmit", [P::write(K::Queue), P::write(K::Fence)]);
    entry_point!(QUEUE_SUBMIT_2, "vkQueueSubmit2", [P::write(K::Queue), P::write(K::Fence)]);
    entry_point!(QUEUE_BIND_SPARSE, "vkQueueBindSparse", [P::write(K::Queue), P::write(K::Fence)]);
    entry_point!(QUEUE_WAIT_IDLE, "vkQueueWaitIdle", [P::write(K::Queue)]);
    entry_point!(QUEUE_PRESENT_KHR, "vkQueuePresentKHR", [P::write(K::Queue)]);

    entry_point!(BEGIN_COMMAND_BUFFER, "vkBeginCommandBuffer", [P::write(K::CommandBuffer)]);
    entry_point!(END_COMMAND_BUFFER, "vkEndCommandBuffer", [P::write(K::CommandBuffer)]);
    entry_point!(RESET_COMMAND_BUFFER, "vkResetCommandBuffer", [P::write(K::CommandBuffer)]);
    entry_point!(CMD_BIND_PIPELINE, "vkCmdBindPipeline", [P::write(K::CommandBuffer), P::read(K::Pipeline)]);
    entry_point!(CMD_BIND_DESCRIPTOR_SETS, "vkCmdBindDescriptorSets", [P::write(K::CommandBuffer), P::read(K::PipelineLayout), P::read(K::DescriptorSet).repeated()]);
    entry_point!(CMD_BIND_VERTEX_BUFFERS, "vkCmdBindVertexBuffers", [P::write(K::CommandBuffer), P::read(K::Buffer).repeated()]);
    entry_point!(CMD_DRAW, "vkCmdDraw", [P::write(K::CommandBuffer)]);
    entry_point!(CMD_DISPATCH, "vkCmdDispatch", [P::write(K::CommandBuffer)]);
    entry_point!(CMD_COPY_BUFFER, "vkCmdCopyBuffer", [P::write(K::CommandBuffer), P::read(K::Buffer), P::read(K::Buffer)]);
    entry_point!(CMD_COPY_IMAGE, "vkCmdCopyImage", [P::write(K::CommandBuffer), P::read(K::Image), P::read(K::Image)]);
    entry_point!(CMD_SET_EVENT, "vkCmdSetEvent", [P::write(K::CommandBuffer), P::read(K::Event)]);
    entry_point!(CMD_RESET_EVENT, "vkCmdResetEvent", [P::write(K::CommandBuffer), P::read(K::Event)]);
    entry_point!(CMD_EXECUTE_COMMANDS, "vkCmdExecuteCommands", [P::write(K::CommandBuffer), P::read(K::CommandBuffer).repeated()]);

    entry_point!(MAP_MEMORY, "vkMapMemory", [P::read(K::Device), P::write(K::DeviceMemory)]);
    entry_point!(UNMAP_MEMORY, "vkUnmapMemory", [P::read(K::Device), P::write(K::DeviceMemory)]);
    entry_point!(BIND_BUFFER_MEMORY, "vkBindBufferMemory", [P::read(K::Device), P::write(K::Buffer), P::read(K::DeviceMemory)]);
    entry_point!(BIND_IMAGE_MEMORY, "vkBindImageMemory", [P::read(K::Device), P::write(K::Image), P::read(K::DeviceMemory)]);

    entry_point!(RESET_FENCES, "vkResetFences", [P::read(K::Device), P::write(K::Fence).repeated()]);
    entry_point!(WAIT_FOR_FENCES, "vkWaitForFences", [P::read(K::Device), P::read(K::Fence).repeated()]);
    entry_point!(GET_FENCE_STATUS, "vkGetFenceStatus", [P::read(K::Device), P::read(K::Fence)]);
    entry_point!(SET_EVENT, "vkSetEvent", [P::read(K::Device), P::write(K::Event)]);
    entry_point!(RESET_EVENT, "vkResetEvent", [P::read(K::Device), P::write(K::Event)]);
    entry_point!(GET_EVENT_STATUS, "vkGetEventStatus", [P::read(K::Device), P::read(K::Event)]);

    entry_point!(ACQUIRE_NEXT_IMAGE_KHR, "vkAcquireNextImageKHR", [P::read(K::Device), P::write(K::SwapchainKHR), P::write(K::Semaphore), P::write(K::Fence)]);

    entry_point!(DESTROY_BUFFER, "vkDestroyBuffer", [P::read(K::Device), P::write(K::Buffer)]);
    entry_point!(DESTROY_IMAGE, "vkDestroyImage", [P::read(K::Device), P::write(K::Image)]);
    entry_point!(DESTROY_FENCE, "vkDestroyFence", [P::read(K::Device), P::write(K::Fence)]);
    entry_point!(DESTROY_SEMAPHORE, "vkDestroySemaphore", [P::read(K::Device), P::write(K::Semaphore)]);
    entry_point!(DESTROY_EVENT, "vkDestroyEvent", [P::read(K::Device), P::write(K::Event)]);
    entry_point!(DESTROY_PIPELINE, "vkDestroyPipeline", [P::read(K::Device), P::write(K::Pipeline)]);
    entry_point!(FREE_MEMORY, "vkFreeMemory", [P::read(K::Device), P::write(K::DeviceMemory)]);
}
