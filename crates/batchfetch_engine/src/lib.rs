//! Batch fetch engine: HTTP transport, record extraction, the adaptive fetch loop
//! and multi-stream merging.
mod caller;
mod combine;
mod engine;
mod events;
mod extract;
mod fetch_loop;
mod types;

pub use batchfetch_core::{
    BatchRequest, BatchSizeState, ConfigError, ErrorRecord, FailureKind, FetchConfig, FetchReport,
    Termination, TransportFailure,
};
pub use caller::{CallParams, CallerError, CallerSettings, HttpCaller, ReqwestHttpCaller};
pub use combine::{CombinedReport, MultiStreamCombiner, StreamError, StreamSummary};
pub use engine::{run_dataset_job, DatasetJob, EngineHandle, StreamSpec};
pub use events::{ChannelEventSink, EventSink, FetchEvent, NoopSink};
pub use extract::{Extracted, ExtractionStrategy, RecordExtractor};
pub use fetch_loop::{FetchLoop, TransformError, TransformFn};
pub use types::{EngineEvent, FetchOutcome, JobId, Record};
pub use tokio_util::sync::CancellationToken;
