mod test_common;

use std::sync::{Arc, Barrier};

use ash::vk;
use ash::vk::Handle;
use rand::Rng;

use b4d_thread_safety::validation::entry_points;
use b4d_thread_safety::validation::{CollectingReportSink, ThreadSafetyConfig, TrackedHandle, UseCount, ValidationDispatcher, ViolationKind};

use test_common::{make_device_fixture, make_scripted_fixture};

const IDLE: UseCount = UseCount { readers: 0, writers: 0 };

#[test]
fn sequential_use_is_silent() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let fence = vk::Fence::from_raw(0x10);
    validator.create_object(fence);

    for thread in 1..=4u64 {
        os.switch_to(thread);
        validator.start_write_object(fence, "vkResetFences");
        validator.finish_write_object(fence, "vkResetFences");
        validator.start_read_object(fence, "vkGetFenceStatus");
        validator.finish_read_object(fence, "vkGetFenceStatus");
    }

    assert!(fixture.sink.is_empty());
    assert_eq!(validator.current_count(fence), Some(IDLE));
}

#[test]
fn overlapping_writes_name_both_threads() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let buffer = vk::Buffer::from_raw(0x20);
    validator.create_object(buffer);

    os.switch_to(1);
    validator.start_write_object(buffer, "vkBindBufferMemory");
    os.switch_to(2);
    validator.start_write_object(buffer, "vkDestroyBuffer");

    let violations = fixture.sink.get_violations();
    assert_eq!(violations.len(), 1);
    let violation = &violations[0];
    assert_eq!(violation.kind, ViolationKind::ConcurrentUse);
    assert_eq!(violation.object_type, vk::ObjectType::BUFFER);
    assert_eq!(violation.handle, 0x20);
    assert_eq!(violation.call_name, "vkDestroyBuffer");
    assert_eq!(violation.current_thread.get_raw(), 2);
    assert_eq!(violation.other_thread.map(|t| t.get_raw()), Some(1));

    let message = violation.to_string();
    assert!(message.contains("vkDestroyBuffer"));
    assert!(message.contains("VkBuffer"));

    validator.finish_write_object(buffer, "vkDestroyBuffer");
    os.switch_to(1);
    validator.finish_write_object(buffer, "vkBindBufferMemory");
    assert_eq!(validator.current_count(buffer), Some(IDLE));
}

#[test]
fn overlapping_reads_are_silent() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let pipeline = vk::Pipeline::from_raw(0x30);
    validator.create_object(pipeline);

    for thread in 1..=3u64 {
        os.switch_to(thread);
        validator.start_read_object(pipeline, "vkCmdBindPipeline");
    }
    assert_eq!(validator.current_count(pipeline), Some(UseCount { readers: 3, writers: 0 }));

    for thread in 1..=3u64 {
        os.switch_to(thread);
        validator.finish_read_object(pipeline, "vkCmdBindPipeline");
    }

    assert!(fixture.sink.is_empty());
    assert_eq!(validator.current_count(pipeline), Some(IDLE));
}

#[test]
fn read_during_write_is_reported() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let event = vk::Event::from_raw(0x40);
    validator.create_object(event);

    os.switch_to(1);
    validator.start_write_object(event, "vkSetEvent");
    os.switch_to(2);
    validator.start_read_object(event, "vkGetEventStatus");

    assert_eq!(fixture.sink.count(ViolationKind::ConcurrentUse), 1);
    assert_eq!(fixture.sink.get_violations()[0].call_name, "vkGetEventStatus");

    validator.finish_read_object(event, "vkGetEventStatus");
    os.switch_to(1);
    validator.finish_write_object(event, "vkSetEvent");
    assert_eq!(validator.current_count(event), Some(IDLE));
}

/// Thread A reads H1, thread B writes H1 before A finished.
#[test]
fn write_during_read_names_both_threads() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let h1 = vk::Image::from_raw(0x48);
    validator.create_object(h1);

    os.switch_to(1);
    validator.start_read_object(h1, "vkGetImageSubresourceLayout");
    os.switch_to(2);
    validator.start_write_object(h1, "vkDestroyImage");

    let violations = fixture.sink.get_violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::ConcurrentUse);
    assert_eq!(violations[0].current_thread.get_raw(), 2);
    assert_eq!(violations[0].other_thread.map(|t| t.get_raw()), Some(1));

    os.switch_to(1);
    validator.finish_read_object(h1, "vkGetImageSubresourceLayout");
    os.switch_to(2);
    validator.finish_write_object(h1, "vkDestroyImage");

    assert_eq!(fixture.sink.get_violations().len(), 1);
    assert_eq!(validator.current_count(h1), Some(IDLE));
}

#[test]
fn same_thread_reentry_is_silent() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let image = vk::Image::from_raw(0x50);
    validator.create_object(image);

    os.switch_to(7);
    validator.start_write_object(image, "vkBindImageMemory");
    validator.start_read_object(image, "vkGetImageMemoryRequirements");
    validator.start_write_object(image, "vkBindImageMemory");
    assert_eq!(validator.current_count(image), Some(UseCount { readers: 1, writers: 2 }));
    validator.finish_write_object(image, "vkBindImageMemory");
    validator.finish_read_object(image, "vkGetImageMemoryRequirements");
    validator.finish_write_object(image, "vkBindImageMemory");

    assert!(fixture.sink.is_empty());
    assert_eq!(validator.current_count(image), Some(IDLE));
}

#[test]
fn destroyed_objects_are_not_found() {
    let fixture = make_device_fixture();
    let validator = &fixture.validator;
    let sampler = vk::Sampler::from_raw(0x60);

    validator.create_object(sampler);
    validator.destroy_object(sampler);
    assert!(!validator.is_tracked(sampler));

    validator.start_write_object(sampler, "vkDestroySampler");
    validator.finish_write_object(sampler, "vkDestroySampler");

    let violations = fixture.sink.get_violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::ObjectNotFound);
    assert_eq!(violations[0].object_type, vk::ObjectType::SAMPLER);
    assert_eq!(validator.current_count(sampler), None);
}

#[test]
fn null_handles_are_ignored() {
    let fixture = make_device_fixture();
    let validator = &fixture.validator;

    validator.create_object(vk::Buffer::null());
    validator.start_write_object(vk::Buffer::null(), "vkDestroyBuffer");
    validator.finish_write_object(vk::Buffer::null(), "vkDestroyBuffer");
    validator.start_read_object(vk::CommandBuffer::null(), "vkCmdDraw");
    validator.finish_read_object(vk::CommandBuffer::null(), "vkCmdDraw");

    assert!(fixture.sink.is_empty());
    assert!(!validator.is_tracked(vk::Buffer::null()));
}

#[test]
fn command_buffer_write_conflicts_with_pool_write() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let device = fixture.device;
    let pool = vk::CommandPool::from_raw(0x70);
    let command_buffer = vk::CommandBuffer::from_raw(0x71);

    validator.pre_create_command_pool(device);
    validator.post_create_command_pool(device, pool, vk::Result::SUCCESS);
    validator.pre_allocate_command_buffers(device, pool);
    validator.post_allocate_command_buffers(device, pool, &[command_buffer], vk::Result::SUCCESS);
    assert_eq!(validator.get_command_pool(command_buffer), Some(pool));

    os.switch_to(1);
    validator.start_write_object(command_buffer, "vkBeginCommandBuffer");
    os.switch_to(2);
    validator.start_write_object(pool, "vkTrimCommandPool");

    let violations = fixture.sink.get_violations();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].kind, ViolationKind::ConcurrentUse);
    assert_eq!(violations[0].object_type, vk::ObjectType::COMMAND_POOL);

    validator.finish_write_object(pool, "vkTrimCommandPool");
    os.switch_to(1);
    validator.finish_write_object(command_buffer, "vkBeginCommandBuffer");
    assert_eq!(validator.current_count(pool), Some(IDLE));
    assert_eq!(validator.current_count(command_buffer), Some(IDLE));
}

#[test]
fn disabled_pool_lock_allows_parallel_recording() {
    let sink = Arc::new(CollectingReportSink::new());
    let mut config = ThreadSafetyConfig::new();
    config.disable_command_pool_lock();
    let instance = ValidationDispatcher::new_instance(config, sink.clone());
    let validator = ValidationDispatcher::new_device(&instance);

    let device = vk::Device::from_raw(0xDE01);
    let pool = vk::CommandPool::from_raw(0x80);
    let command_buffers = [vk::CommandBuffer::from_raw(0x81), vk::CommandBuffer::from_raw(0x82)];
    instance.post_create_device(device, vk::Result::SUCCESS);
    validator.pre_create_command_pool(device);
    validator.post_create_command_pool(device, pool, vk::Result::SUCCESS);
    validator.pre_allocate_command_buffers(device, pool);
    validator.post_allocate_command_buffers(device, pool, &command_buffers, vk::Result::SUCCESS);

    let barrier = Barrier::new(2);
    std::thread::scope(|scope| {
        for command_buffer in command_buffers {
            let validator = &validator;
            let barrier = &barrier;
            scope.spawn(move || {
                validator.start_write_object(command_buffer, "vkBeginCommandBuffer");
                barrier.wait();
                validator.finish_write_object(command_buffer, "vkBeginCommandBuffer");
            });
        }
    });

    assert!(sink.is_empty());
    assert_eq!(validator.current_count(pool), Some(IDLE));
}

/// Thread A reads X and writes Y while thread B reads X and later writes Y after A finished.
#[test]
fn read_write_scenario_leaves_objects_idle() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let x = vk::Buffer::from_raw(0x90);
    let y = vk::Buffer::from_raw(0x91);
    validator.create_object(x);
    validator.create_object(y);

    os.switch_to(1);
    validator.start_read_object(x, "vkCmdCopyBuffer");
    validator.start_write_object(y, "vkCmdCopyBuffer");
    os.switch_to(2);
    validator.start_read_object(x, "vkCmdCopyBuffer");
    os.switch_to(1);
    validator.finish_write_object(y, "vkCmdCopyBuffer");
    validator.finish_read_object(x, "vkCmdCopyBuffer");
    os.switch_to(2);
    validator.start_write_object(y, "vkCmdCopyBuffer");
    validator.finish_write_object(y, "vkCmdCopyBuffer");
    validator.finish_read_object(x, "vkCmdCopyBuffer");

    assert!(fixture.sink.is_empty());
    assert_eq!(validator.current_count(x), Some(IDLE));
    assert_eq!(validator.current_count(y), Some(IDLE));
}

#[test]
fn device_handles_are_tracked_by_the_instance() {
    let fixture = make_device_fixture();
    let second = ValidationDispatcher::new_device(&fixture.validator);

    assert!(fixture.instance.is_tracked(fixture.device));
    assert!(fixture.validator.is_tracked(fixture.device));
    assert!(second.is_tracked(fixture.device));
    assert!(Arc::ptr_eq(second.get_parent().unwrap(), &fixture.instance));

    let buffer = vk::Buffer::from_raw(0xA0);
    fixture.validator.create_object(buffer);
    assert!(!fixture.instance.is_tracked(buffer));
    assert!(!second.is_tracked(buffer));
}

#[test]
fn entry_point_guards_release_on_every_path() {
    let (os, fixture) = make_scripted_fixture();
    let validator = &fixture.validator;
    let queue = vk::Queue::from_raw(0xB0);
    let fences = [vk::Fence::from_raw(0xB1), vk::Fence::from_raw(0xB2)];
    validator.pre_get_device_queue(fixture.device);
    validator.post_get_device_queue(fixture.device, queue);
    for fence in fences {
        validator.create_object(fence);
    }

    os.switch_to(1);
    let args: [TrackedHandle; 3] = [fixture.device.into(), fences[0].into(), fences[1].into()];
    {
        let _guard = validator.begin_call(&entry_points::WAIT_FOR_FENCES, &args);
        assert_eq!(validator.current_count(fences[1]), Some(UseCount { readers: 1, writers: 0 }));

        os.switch_to(2);
        let reset: [TrackedHandle; 2] = [fixture.device.into(), fences[1].into()];
        let _reset_guard = validator.begin_call(&entry_points::RESET_FENCES, &reset);
        assert_eq!(fixture.sink.count(ViolationKind::ConcurrentUse), 1);
        os.switch_to(1);
    }

    let submit: [TrackedHandle; 2] = [queue.into(), fences[0].into()];
    drop(validator.begin_call(&entry_points::QUEUE_SUBMIT, &submit));

    assert_eq!(fixture.sink.get_violations().len(), 1);
    for fence in fences {
        assert_eq!(validator.current_count(fence), Some(IDLE));
    }
    assert_eq!(validator.current_count(queue), Some(IDLE));
}

#[test]
fn random_disjoint_use_has_no_false_positives() {
    let fixture = make_device_fixture();
    let validator = &fixture.validator;
    let shared = vk::PipelineLayout::from_raw(0xC000);
    validator.create_object(shared);

    std::thread::scope(|scope| {
        for thread in 0..8u64 {
            scope.spawn(move || {
                let mut rng = rand::thread_rng();
                let owned: Vec<vk::Buffer> = (0..16).map(|i| vk::Buffer::from_raw(0x1_0000 * (thread + 1) + i)).collect();
                for buffer in &owned {
                    validator.create_object(*buffer);
                }

                for _ in 0..2000 {
                    let buffer = owned[rng.gen_range(0..owned.len())];
                    validator.start_read_object(shared, "vkCmdPushConstants");
                    if rng.gen_bool(0.5) {
                        validator.start_write_object(buffer, "vkBindBufferMemory");
                        validator.finish_write_object(buffer, "vkBindBufferMemory");
                    } else {
                        validator.start_read_object(buffer, "vkCmdCopyBuffer");
                        validator.finish_read_object(buffer, "vkCmdCopyBuffer");
                    }
                    validator.finish_read_object(shared, "vkCmdPushConstants");
                }

                for buffer in &owned {
                    assert_eq!(validator.current_count(*buffer), Some(IDLE));
                    validator.destroy_object(*buffer);
                }
            });
        }
    });

    assert!(fixture.sink.is_empty());
    assert_eq!(validator.current_count(shared), Some(IDLE));
}
