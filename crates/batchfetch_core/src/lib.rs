//! Batch fetch core: pure batch sizing and fetch-session state machine.
mod batch_size;
mod config;
mod request;
mod session;

pub use batch_size::{BatchSizeState, DEFAULT_CEILING, DEFAULT_FLOOR};
pub use config::{ConfigError, FetchConfig, DEFAULT_MAX_REQUESTS};
pub use request::BatchRequest;
pub use session::{
    ErrorRecord, FailureKind, FetchReport, FetchSession, Observation, Step, Termination,
    TransportFailure,
};
