use std::collections::BTreeMap;
use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use batchfetch_core::FetchConfig;
use engine_logging::engine_info;
use tokio_util::sync::CancellationToken;

use crate::{
    ChannelEventSink, CombinedReport, EngineEvent, EventSink, FetchLoop, HttpCaller, JobId,
    MultiStreamCombiner, RecordExtractor,
};

/// One filtered fetch within a dataset job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub label: String,
    pub filters: BTreeMap<String, String>,
}

impl StreamSpec {
    pub fn unfiltered(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            filters: BTreeMap::new(),
        }
    }
}

/// A complete dataset: one stream per filter set, merged into one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetJob {
    pub streams: Vec<StreamSpec>,
    /// Deduplicate merged records on this top-level field.
    pub dedup_field: Option<String>,
    pub extractor: RecordExtractor,
    /// Streams fetched at once; the combiner default when unset.
    pub concurrency: Option<usize>,
}

/// Run every stream of `job` and merge the results.
pub async fn run_dataset_job(
    caller: Arc<dyn HttpCaller>,
    config: FetchConfig,
    job: DatasetJob,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) -> CombinedReport {
    let mut combiner = match job.dedup_field {
        Some(field) => MultiStreamCombiner::keyed_by_field(field),
        None => MultiStreamCombiner::new(),
    }
    .with_sink(sink.clone());
    if let Some(concurrency) = job.concurrency {
        combiner = combiner.with_concurrency(concurrency);
    }

    for stream in job.streams {
        combiner.add_loop(
            FetchLoop::new(caller.clone(), config.clone())
                .with_label(stream.label)
                .with_filters(stream.filters)
                .with_extractor(job.extractor.clone())
                .with_sink(sink.clone())
                .with_cancellation(cancel.clone()),
        );
    }

    combiner.run().await
}

enum EngineCommand {
    Enqueue { job_id: JobId, job: DatasetJob },
}

/// Runs dataset jobs on a background runtime for hosts without one.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
    cancel: CancellationToken,
}

impl EngineHandle {
    pub fn new(caller: Arc<dyn HttpCaller>, config: FetchConfig) -> io::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();

        thread::spawn(move || {
            while let Ok(command) = cmd_rx.recv() {
                let caller = caller.clone();
                let config = config.clone();
                let event_tx = event_tx.clone();
                let cancel = worker_cancel.clone();
                runtime.spawn(async move {
                    handle_command(caller, config, command, event_tx, cancel).await;
                });
            }
        });

        Ok(Self {
            cmd_tx,
            event_rx,
            cancel,
        })
    }

    pub fn enqueue(&self, job_id: JobId, job: DatasetJob) {
        let _ = self.cmd_tx.send(EngineCommand::Enqueue { job_id, job });
    }

    /// Stop every running and future job at its next page boundary.
    pub fn cancel_all(&self) {
        self.cancel.cancel();
    }

    /// Token shared by every job of this engine, for signal handlers and the like.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Block until the next event; `None` once the engine thread is gone.
    pub fn recv(&self) -> Option<EngineEvent> {
        self.event_rx.recv().ok()
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

async fn handle_command(
    caller: Arc<dyn HttpCaller>,
    config: FetchConfig,
    command: EngineCommand,
    event_tx: mpsc::Sender<EngineEvent>,
    cancel: CancellationToken,
) {
    match command {
        EngineCommand::Enqueue { job_id, job } => {
            engine_info!("Job {} started with {} streams", job_id, job.streams.len());
            let sink: Arc<dyn EventSink> = Arc::new(ChannelEventSink::new(event_tx.clone()));
            let report = run_dataset_job(caller, config, job, sink, cancel).await;
            let _ = event_tx.send(EngineEvent::JobCompleted { job_id, report });
        }
    }
}
