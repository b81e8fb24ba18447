use std::time::Duration;

/// Configuration of a thread safety validator.
#[derive(Clone, Debug)]
pub struct ThreadSafetyConfig {
    wait_poll_interval: Duration,
    max_wait_attempts: Option<u64>,
    lock_pool_on_command_buffer_write: bool,
}

impl ThreadSafetyConfig {
    pub fn new() -> Self {
        Self {
            wait_poll_interval: Duration::from_micros(1),
            max_wait_attempts: None,
            lock_pool_on_command_buffer_write: true,
        }
    }

    /// Sets how long a blocked thread sleeps between checks of the object state.
    pub fn set_wait_poll_interval(&mut self, interval: Duration) {
        self.wait_poll_interval = interval;
    }

    /// Limits how often a blocked thread checks the object state before it gives up and proceeds.
    /// `None` waits forever.
    pub fn set_max_wait_attempts(&mut self, attempts: Option<u64>) {
        self.max_wait_attempts = attempts;
    }

    /// Disables the implicit write of a command pool whenever one of its command buffers is
    /// written.
    pub fn disable_command_pool_lock(&mut self) {
        self.lock_pool_on_command_buffer_write = false;
    }

    pub fn get_wait_poll_interval(&self) -> Duration {
        self.wait_poll_interval
    }

    pub fn get_max_wait_attempts(&self) -> Option<u64> {
        self.max_wait_attempts
    }

    pub fn locks_command_pool(&self) -> bool {
        self.lock_pool_on_command_buffer_write
    }
}

impl Default for ThreadSafetyConfig {
    fn default() -> Self {
        Self::new()
    }
}
