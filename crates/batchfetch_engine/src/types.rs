use batchfetch_core::TransportFailure;
use serde_json::Value;

use crate::combine::CombinedReport;
use crate::events::FetchEvent;

pub type JobId = u64;

/// A caller-defined record. The engine only looks inside it to locate record lists
/// and, when asked, to compute deduplication keys.
pub type Record = Value;

/// Result of one HTTP attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A response arrived. `body` is `None` when it was empty or not JSON.
    Response { status: u16, body: Option<Value> },
    /// No response at all.
    Transport {
        failure: TransportFailure,
        message: String,
    },
}

impl FetchOutcome {
    pub fn ok(body: Value) -> Self {
        FetchOutcome::Response {
            status: 200,
            body: Some(body),
        }
    }

    pub fn status(status: u16) -> Self {
        FetchOutcome::Response { status, body: None }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self, FetchOutcome::Response { status, .. } if (200..300).contains(status))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchOutcome::Response { status, .. } => Some(*status),
            FetchOutcome::Transport { .. } => None,
        }
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, FetchOutcome::Transport { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Fetch(FetchEvent),
    JobCompleted {
        job_id: JobId,
        report: CombinedReport,
    },
}
