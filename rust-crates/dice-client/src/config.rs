use crate::{
    history::DEFAULT_CAPACITY,
    state_machine::ResolutionPolicy,
    watcher::RetryPolicy,
};
use ethers::types::U256;

/// Wager sent with a standard roll: 0.002 ether.
pub const STANDARD_WAGER_WEI: u64 = 2_000_000_000_000_000;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub history_capacity: usize,
    pub standard_wager: U256,
    pub resolution: ResolutionPolicy,
    /// First block replayed by both watchers.
    pub from_block: u64,
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_CAPACITY,
            standard_wager: U256::from(STANDARD_WAGER_WEI),
            resolution: ResolutionPolicy::default(),
            from_block: 0,
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    pub fn with_from_block(mut self, from_block: u64) -> Self {
        self.from_block = from_block;
        self
    }

    pub fn with_resolution(mut self, resolution: ResolutionPolicy) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }
}
