#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use ash::vk::Handle;

use b4d_thread_safety::prelude::*;
use b4d_thread_safety::validation::CollectingReportSink;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Os services where the "current thread" is chosen by the test. Lets a single test thread play
/// through an interleaving of several simulated threads deterministically.
pub struct ScriptedOs {
    current: AtomicU64,
}

impl ScriptedOs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            current: AtomicU64::new(1),
        })
    }

    pub fn switch_to(&self, thread: u64) {
        self.current.store(thread, Ordering::SeqCst);
    }
}

impl OsServices for ScriptedOs {
    fn current_thread(&self) -> ThreadId {
        ThreadId::from_raw(self.current.load(Ordering::SeqCst)).unwrap()
    }

    fn sleep(&self, _: Duration) {
        std::thread::yield_now();
    }
}

pub struct DeviceFixture {
    pub sink: Arc<CollectingReportSink>,
    pub instance: Arc<ValidationDispatcher>,
    pub validator: Arc<ValidationDispatcher>,
    pub device: vk::Device,
}

pub fn make_device_fixture() -> DeviceFixture {
    init_logging();

    let sink = Arc::new(CollectingReportSink::new());
    let instance = ValidationDispatcher::new_instance(ThreadSafetyConfig::new(), sink.clone());
    let validator = ValidationDispatcher::new_device(&instance);
    let device = vk::Device::from_raw(0xDE00);
    instance.post_create_device(device, vk::Result::SUCCESS);

    DeviceFixture {
        sink,
        instance,
        validator,
        device,
    }
}

pub fn make_scripted_fixture() -> (Arc<ScriptedOs>, DeviceFixture) {
    init_logging();

    let os = ScriptedOs::new();
    let sink = Arc::new(CollectingReportSink::new());
    let instance = ValidationDispatcher::new_instance_with_os(ThreadSafetyConfig::new(), sink.clone(), os.clone());
    let validator = ValidationDispatcher::new_device(&instance);
    let device = vk::Device::from_raw(0xDE00);
    instance.post_create_device(device, vk::Result::SUCCESS);

    (os, DeviceFixture {
        sink,
        instance,
        validator,
        device,
    })
}
