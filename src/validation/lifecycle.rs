//! Hooks for API calls which create, destroy or implicitly free objects.
//!
//! Each operation is split into a `pre_*` function called before the real call is dispatched and
//! a `post_*` function called after it returned. The `post_*` functions must be called on every
//! path, including when the real call failed.

use ash::vk;

use crate::validation::dispatcher::ValidationDispatcher;

fn succeeded(result: vk::Result) -> bool {
    result.as_raw() >= 0
}

impl ValidationDispatcher {
    pub fn post_create_device(&self, device: vk::Device, result: vk::Result) {
        if succeeded(result) {
            self.create_object(device);
        }
    }

    pub fn pre_destroy_device(&self, device: vk::Device) {
        self.start_write_object(device, "vkDestroyDevice");
    }

    /// Forgets the device together with every queue retrieved from it.
    pub fn post_destroy_device(&self, device: vk::Device) {
        self.finish_write_object(device, "vkDestroyDevice");
        self.destroy_object(device);

        let queues = self.ownership.lock().device_queues.remove(&device).unwrap_or_default();
        for queue in queues {
            self.destroy_object(queue);
        }
    }

    pub fn pre_get_device_queue(&self, device: vk::Device) {
        self.start_read_object(device, "vkGetDeviceQueue");
    }

    /// Registers a queue retrieved from a device. Retrieving the same queue again keeps its
    /// current state.
    pub fn post_get_device_queue(&self, device: vk::Device, queue: vk::Queue) {
        self.finish_read_object(device, "vkGetDeviceQueue");

        if queue == vk::Queue::null() {
            return;
        }
        let mut ownership = self.ownership.lock();
        if ownership.device_queues.entry(device).or_default().insert(queue) {
            self.create_object(queue);
        }
    }

    pub fn pre_queue_wait_idle(&self, queue: vk::Queue) {
        self.start_write_object(queue, "vkQueueWaitIdle");
    }

    pub fn post_queue_wait_idle(&self, queue: vk::Queue) {
        self.finish_write_object(queue, "vkQueueWaitIdle");
    }

    /// Waiting for a device implicitly writes every one of its queues.
    pub fn pre_device_wait_idle(&self, device: vk::Device) {
        self.start_read_object(device, "vkDeviceWaitIdle");
        for queue in self.device_queues(device) {
            self.start_write_object(queue, "vkDeviceWaitIdle");
        }
    }

    pub fn post_device_wait_idle(&self, device: vk::Device) {
        self.finish_read_object(device, "vkDeviceWaitIdle");
        for queue in self.device_queues(device) {
            self.finish_write_object(queue, "vkDeviceWaitIdle");
        }
    }

    fn device_queues(&self, device: vk::Device) -> Vec<vk::Queue> {
        self.ownership.lock().device_queues.get(&device).map(|queues| queues.iter().copied().collect()).unwrap_or_default()
    }

    pub fn pre_create_command_pool(&self, device: vk::Device) {
        self.start_read_object(device, "vkCreateCommandPool");
    }

    pub fn post_create_command_pool(&self, device: vk::Device, pool: vk::CommandPool, result: vk::Result) {
        self.finish_read_object(device, "vkCreateCommandPool");
        if succeeded(result) {
            self.create_object(pool);
        }
    }

    /// Resetting a pool writes the pool and its contents, which conflicts with any command buffer
    /// of the pool being read by another thread.
    pub fn pre_reset_command_pool(&self, device: vk::Device, pool: vk::CommandPool) {
        self.start_read_object(device, "vkResetCommandPool");
        self.start_write_object(pool, "vkResetCommandPool");
        self.command_pool_contents().start_write(pool, "vkResetCommandPool");
    }

    pub fn post_reset_command_pool(&self, device: vk::Device, pool: vk::CommandPool) {
        self.command_pool_contents().finish_write(pool, "vkResetCommandPool");
        self.finish_write_object(pool, "vkResetCommandPool");
        self.finish_read_object(device, "vkResetCommandPool");
    }

    pub fn pre_destroy_command_pool(&self, device: vk::Device, pool: vk::CommandPool) {
        self.start_read_object(device, "vkDestroyCommandPool");
        self.start_write_object(pool, "vkDestroyCommandPool");
        self.command_pool_contents().start_write(pool, "vkDestroyCommandPool");
    }

    /// Destroys the pool and every command buffer still allocated from it.
    pub fn post_destroy_command_pool(&self, device: vk::Device, pool: vk::CommandPool) {
        self.command_pool_contents().finish_write(pool, "vkDestroyCommandPool");
        self.finish_write_object(pool, "vkDestroyCommandPool");
        self.destroy_object(pool);
        self.finish_read_object(device, "vkDestroyCommandPool");
    }

    pub fn pre_allocate_command_buffers(&self, device: vk::Device, pool: vk::CommandPool) {
        self.start_read_object(device, "vkAllocateCommandBuffers");
        self.start_write_object(pool, "vkAllocateCommandBuffers");
    }

    pub fn post_allocate_command_buffers(&self, device: vk::Device, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer], result: vk::Result) {
        self.finish_write_object(pool, "vkAllocateCommandBuffers");
        self.finish_read_object(device, "vkAllocateCommandBuffers");
        if !succeeded(result) {
            return;
        }

        for command_buffer in command_buffers.iter().copied().filter(|cb| *cb != vk::CommandBuffer::null()) {
            self.create_object(command_buffer);
            self.command_pool_map.insert(command_buffer, pool);
        }
    }

    /// The command buffers are written without implicitly locking the pool since the pool itself
    /// is already written by this call.
    pub fn pre_free_command_buffers(&self, device: vk::Device, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        self.start_read_object(device, "vkFreeCommandBuffers");
        self.start_write_object(pool, "vkFreeCommandBuffers");
        for command_buffer in command_buffers.iter().copied() {
            self.start_write_command_buffer(command_buffer, "vkFreeCommandBuffers", false);
        }
    }

    pub fn post_free_command_buffers(&self, device: vk::Device, pool: vk::CommandPool, command_buffers: &[vk::CommandBuffer]) {
        for command_buffer in command_buffers.iter().copied() {
            self.finish_write_command_buffer(command_buffer, "vkFreeCommandBuffers", false);
            self.destroy_object(command_buffer);
        }
        self.finish_write_object(pool, "vkFreeCommandBuffers");
        self.finish_read_object(device, "vkFreeCommandBuffers");
    }

    pub fn pre_create_descriptor_set_layout(&self, device: vk::Device) {
        self.start_read_object(device, "vkCreateDescriptorSetLayout");
    }

    /// Registers a layout and remembers whether sets using it may be updated after being bound.
    pub fn post_create_descriptor_set_layout(&self, device: vk::Device, flags: vk::DescriptorSetLayoutCreateFlags, layout: vk::DescriptorSetLayout, result: vk::Result) {
        self.finish_read_object(device, "vkCreateDescriptorSetLayout");
        if succeeded(result) {
            self.create_object(layout);
            self.dsl_update_after_bind.insert(layout, flags.contains(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL));
        }
    }

    pub fn pre_destroy_descriptor_set_layout(&self, device: vk::Device, layout: vk::DescriptorSetLayout) {
        self.start_read_object(device, "vkDestroyDescriptorSetLayout");
        self.start_write_object(layout, "vkDestroyDescriptorSetLayout");
    }

    pub fn post_destroy_descriptor_set_layout(&self, device: vk::Device, layout: vk::DescriptorSetLayout) {
        self.finish_write_object(layout, "vkDestroyDescriptorSetLayout");
        self.destroy_object(layout);
        self.dsl_update_after_bind.remove(&layout);
        self.finish_read_object(device, "vkDestroyDescriptorSetLayout");
    }

    pub fn pre_create_descriptor_pool(&self, device: vk::Device) {
        self.start_read_object(device, "vkCreateDescriptorPool");
    }

    pub fn post_create_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool, result: vk::Result) {
        self.finish_read_object(device, "vkCreateDescriptorPool");
        if succeeded(result) {
            self.create_object(pool);
        }
    }

    pub fn pre_allocate_descriptor_sets(&self, device: vk::Device, pool: vk::DescriptorPool) {
        self.start_read_object(device, "vkAllocateDescriptorSets");
        self.start_write_object(pool, "vkAllocateDescriptorSets");
    }

    /// Registers the allocated sets. `layouts` must contain the layout of each set in the same
    /// order.
    pub fn post_allocate_descriptor_sets(&self, device: vk::Device, pool: vk::DescriptorPool, layouts: &[vk::DescriptorSetLayout], sets: &[vk::DescriptorSet], result: vk::Result) {
        self.finish_write_object(pool, "vkAllocateDescriptorSets");
        self.finish_read_object(device, "vkAllocateDescriptorSets");
        if !succeeded(result) {
            return;
        }

        let mut ownership = self.ownership.lock();
        let owned = ownership.pool_descriptor_sets.entry(pool).or_default();
        for (index, set) in sets.iter().copied().enumerate().filter(|(_, set)| *set != vk::DescriptorSet::null()) {
            let update_after_bind = layouts.get(index)
                .and_then(|layout| self.dsl_update_after_bind.get(layout))
                .unwrap_or(false);

            self.create_object(set);
            self.ds_update_after_bind.insert(set, update_after_bind);
            owned.insert(set);
        }
    }

    pub fn pre_free_descriptor_sets(&self, device: vk::Device, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet]) {
        self.start_read_object(device, "vkFreeDescriptorSets");
        self.start_write_object(pool, "vkFreeDescriptorSets");
        for set in sets.iter().copied() {
            self.start_write_object(set, "vkFreeDescriptorSets");
        }
    }

    pub fn post_free_descriptor_sets(&self, device: vk::Device, pool: vk::DescriptorPool, sets: &[vk::DescriptorSet], result: vk::Result) {
        for set in sets.iter().copied() {
            self.finish_write_object(set, "vkFreeDescriptorSets");
        }
        self.finish_write_object(pool, "vkFreeDescriptorSets");
        self.finish_read_object(device, "vkFreeDescriptorSets");
        if !succeeded(result) {
            return;
        }

        let mut ownership = self.ownership.lock();
        let owned = ownership.pool_descriptor_sets.get_mut(&pool);
        for set in sets.iter().copied() {
            self.destroy_object(set);
            self.ds_update_after_bind.remove(&set);
        }
        if let Some(owned) = owned {
            for set in sets {
                owned.remove(set);
            }
        }
    }

    /// Resetting a descriptor pool implicitly writes and then frees every set allocated from it.
    pub fn pre_reset_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool) {
        self.start_read_object(device, "vkResetDescriptorPool");
        self.start_write_object(pool, "vkResetDescriptorPool");
        for set in self.pool_descriptor_sets(pool) {
            self.start_write_object(set, "vkResetDescriptorPool");
        }
    }

    pub fn post_reset_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool, result: vk::Result) {
        let sets = self.pool_descriptor_sets(pool);
        for set in sets.iter().copied() {
            self.finish_write_object(set, "vkResetDescriptorPool");
        }
        self.finish_write_object(pool, "vkResetDescriptorPool");
        self.finish_read_object(device, "vkResetDescriptorPool");
        if !succeeded(result) {
            return;
        }

        self.forget_descriptor_sets(&sets);
        if let Some(owned) = self.ownership.lock().pool_descriptor_sets.get_mut(&pool) {
            owned.clear();
        }
    }

    pub fn pre_destroy_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool) {
        self.start_read_object(device, "vkDestroyDescriptorPool");
        self.start_write_object(pool, "vkDestroyDescriptorPool");
        for set in self.pool_descriptor_sets(pool) {
            self.start_write_object(set, "vkDestroyDescriptorPool");
        }
    }

    /// Destroys the pool and every set still allocated from it.
    pub fn post_destroy_descriptor_pool(&self, device: vk::Device, pool: vk::DescriptorPool) {
        let sets = self.ownership.lock().pool_descriptor_sets.remove(&pool).unwrap_or_default();
        let sets: Vec<_> = sets.into_iter().collect();
        for set in sets.iter().copied() {
            self.finish_write_object(set, "vkDestroyDescriptorPool");
        }
        self.forget_descriptor_sets(&sets);

        self.finish_write_object(pool, "vkDestroyDescriptorPool");
        self.destroy_object(pool);
        self.finish_read_object(device, "vkDestroyDescriptorPool");
    }

    fn pool_descriptor_sets(&self, pool: vk::DescriptorPool) -> Vec<vk::DescriptorSet> {
        self.ownership.lock().pool_descriptor_sets.get(&pool).map(|sets| sets.iter().copied().collect()).unwrap_or_default()
    }

    fn forget_descriptor_sets(&self, sets: &[vk::DescriptorSet]) {
        for set in sets.iter().copied() {
            self.destroy_object(set);
            self.ds_update_after_bind.remove(&set);
        }
    }

    /// Returns true if the set was allocated with a layout created with
    /// `UPDATE_AFTER_BIND_POOL`.
    pub fn is_update_after_bind(&self, set: vk::DescriptorSet) -> bool {
        self.ds_update_after_bind.get(&set).unwrap_or(false)
    }

    /// Updates of sets allocated from update after bind layouts only conflict with the set being
    /// freed or its pool being reset, so they are tracked as reads instead of writes.
    pub fn pre_update_descriptor_sets(&self, device: vk::Device, writes: &[vk::WriteDescriptorSet], copies: &[vk::CopyDescriptorSet]) {
        self.start_read_object(device, "vkUpdateDescriptorSets");
        for write in writes {
            self.start_descriptor_set_update(write.dst_set);
        }
        for copy in copies {
            self.start_descriptor_set_update(copy.dst_set);
            self.start_read_object(copy.src_set, "vkUpdateDescriptorSets");
        }
    }

    pub fn post_update_descriptor_sets(&self, device: vk::Device, writes: &[vk::WriteDescriptorSet], copies: &[vk::CopyDescriptorSet]) {
        for copy in copies {
            self.finish_read_object(copy.src_set, "vkUpdateDescriptorSets");
            self.finish_descriptor_set_update(copy.dst_set);
        }
        for write in writes {
            self.finish_descriptor_set_update(write.dst_set);
        }
        self.finish_read_object(device, "vkUpdateDescriptorSets");
    }

    fn start_descriptor_set_update(&self, set: vk::DescriptorSet) {
        if self.is_update_after_bind(set) {
            self.start_read_object(set, "vkUpdateDescriptorSets");
        } else {
            self.start_write_object(set, "vkUpdateDescriptorSets");
        }
    }

    fn finish_descriptor_set_update(&self, set: vk::DescriptorSet) {
        if self.is_update_after_bind(set) {
            self.finish_read_object(set, "vkUpdateDescriptorSets");
        } else {
            self.finish_write_object(set, "vkUpdateDescriptorSets");
        }
    }
}
