use thiserror::Error;

use crate::{BatchSizeState, DEFAULT_CEILING, DEFAULT_FLOOR};

pub const DEFAULT_MAX_REQUESTS: u32 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Starting page size, clamped into `[floor, max_batch_size]`.
    pub initial_batch_size: u64,
    /// Upper bound on adaptive growth.
    pub max_batch_size: u64,
    /// Lower bound on adaptive shrink.
    pub floor: u64,
    /// Hard cap on requests issued by one fetch run, retries included.
    pub max_requests: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            initial_batch_size: DEFAULT_FLOOR,
            max_batch_size: DEFAULT_CEILING,
            floor: DEFAULT_FLOOR,
            max_requests: DEFAULT_MAX_REQUESTS,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("floor must be greater than zero")]
    ZeroFloor,
    #[error("floor {floor} exceeds max batch size {ceiling}")]
    FloorAboveCeiling { floor: u64, ceiling: u64 },
    #[error("max requests must be greater than zero")]
    ZeroMaxRequests,
}

impl FetchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.floor == 0 {
            return Err(ConfigError::ZeroFloor);
        }
        if self.floor > self.max_batch_size {
            return Err(ConfigError::FloorAboveCeiling {
                floor: self.floor,
                ceiling: self.max_batch_size,
            });
        }
        if self.max_requests == 0 {
            return Err(ConfigError::ZeroMaxRequests);
        }
        Ok(())
    }

    pub fn initial_size(&self) -> BatchSizeState {
        BatchSizeState::initial(self.floor, self.max_batch_size, self.initial_batch_size)
    }
}
