use std::sync::mpsc;

use batchfetch_core::{ErrorRecord, Termination};

use crate::EngineEvent;

/// Observable milestones of a fetch run. Every size change and every terminal
/// state produces one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchEvent {
    /// `request` is the 1-based request number, shrink-retries included.
    RequestIssued {
        stream: String,
        request: u32,
        offset: u64,
        batch_size: u64,
        total: usize,
    },
    BatchGrown {
        stream: String,
        from: u64,
        to: u64,
    },
    BatchShrunk {
        stream: String,
        from: u64,
        to: u64,
        status: u16,
    },
    SafetyCapHit {
        stream: String,
        requests: u32,
    },
    Terminated {
        stream: String,
        termination: Termination,
        records: usize,
    },
    StreamFailed {
        stream: String,
        errors: Vec<ErrorRecord>,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: FetchEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: FetchEvent) {}
}

pub struct ChannelEventSink {
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: FetchEvent) {
        let _ = self.tx.send(EngineEvent::Fetch(event));
    }
}
