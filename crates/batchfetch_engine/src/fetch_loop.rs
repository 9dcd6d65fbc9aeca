use std::collections::BTreeMap;
use std::sync::Arc;

use batchfetch_core::{
    BatchRequest, FetchConfig, FetchReport, FetchSession, Observation, Step, Termination,
};
use engine_logging::{engine_debug, engine_info, engine_warn};
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    CallParams, EventSink, FetchEvent, FetchOutcome, HttpCaller, NoopSink, Record,
    RecordExtractor,
};

/// Raised by a caller-supplied transform; ends the run as a fatal error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransformError(pub String);

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

pub type TransformFn = dyn Fn(Vec<Record>) -> Result<Vec<Record>, TransformError> + Send + Sync;

/// Pulls a complete dataset from a paginated endpoint, one page at a time.
///
/// Each page is sized by the previous outcome: full pages double the batch size,
/// size-attributable rejections (400, 413, 429) halve it and retry the same offset.
/// The run ends on an empty page, a short page, the request cap, cancellation, or
/// a fatal failure; records accumulated so far are returned in every case.
pub struct FetchLoop {
    caller: Arc<dyn HttpCaller>,
    config: FetchConfig,
    extractor: RecordExtractor,
    transform: Option<Arc<TransformFn>>,
    filters: BTreeMap<String, String>,
    label: String,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
}

impl FetchLoop {
    pub fn new(caller: Arc<dyn HttpCaller>, config: FetchConfig) -> Self {
        Self {
            caller,
            config,
            extractor: RecordExtractor::default(),
            transform: None,
            filters: BTreeMap::new(),
            label: "default".to_string(),
            sink: Arc::new(NoopSink),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn with_filters(mut self, filters: BTreeMap<String, String>) -> Self {
        self.filters.extend(filters);
        self
    }

    pub fn with_extractor(mut self, extractor: RecordExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Vec<Record>) -> Result<Vec<Record>, TransformError> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub async fn run(&self) -> FetchReport<Record> {
        let mut session = FetchSession::new(&self.config);

        loop {
            if self.cancel.is_cancelled() {
                session.cancel();
                break;
            }
            let Some(request) = session.next_request() else {
                break;
            };

            let number = session.requests_issued();
            let total = session.records().len();
            engine_debug!(
                "[{}] request #{} offset={} batch_size={} total={}",
                self.label,
                number,
                request.offset,
                request.count,
                total
            );
            self.sink.emit(FetchEvent::RequestIssued {
                stream: self.label.clone(),
                request: number,
                offset: request.offset,
                batch_size: request.count,
                total,
            });

            let params = CallParams {
                request,
                filters: self.filters.clone(),
            };
            let outcome = self.caller.call(&params).await;
            let observation = self.classify(request, outcome);

            match session.observe(request, observation) {
                Step::Advance { from, to } => {
                    if to != from {
                        engine_info!("[{}] batch size grown {} -> {}", self.label, from, to);
                        self.sink.emit(FetchEvent::BatchGrown {
                            stream: self.label.clone(),
                            from,
                            to,
                        });
                    }
                }
                Step::Retry { status, from, to } => {
                    engine_info!(
                        "[{}] status {} at offset {}; batch size shrunk {} -> {}",
                        self.label,
                        status,
                        request.offset,
                        from,
                        to
                    );
                    self.sink.emit(FetchEvent::BatchShrunk {
                        stream: self.label.clone(),
                        from,
                        to,
                        status,
                    });
                }
                Step::Done(_) => break,
            }
        }

        let report = session.into_report();
        self.report_termination(&report);
        report
    }

    fn classify(&self, request: BatchRequest, outcome: FetchOutcome) -> Observation<Record> {
        match outcome {
            FetchOutcome::Transport { failure, message } => {
                Observation::TransportFailed { failure, message }
            }
            FetchOutcome::Response { status, body } if !(200..300).contains(&status) => {
                Observation::Rejected {
                    status,
                    message: rejection_message(status, body.as_ref()),
                }
            }
            FetchOutcome::Response { body, .. } => {
                let extracted = self.extractor.extract(body, request.count);
                if extracted.records.is_empty() {
                    return Observation::Empty;
                }
                let matched = extracted.matched_requested_count;
                match self.apply_transform(extracted.records) {
                    Ok(records) => Observation::Page { records, matched },
                    Err(err) => Observation::TransformFailed {
                        message: err.to_string(),
                    },
                }
            }
        }
    }

    fn apply_transform(&self, records: Vec<Record>) -> Result<Vec<Record>, TransformError> {
        match &self.transform {
            Some(transform) => transform(records),
            None => Ok(records),
        }
    }

    fn report_termination(&self, report: &FetchReport<Record>) {
        let records = report.records.len();
        match report.termination {
            Termination::SafetyCapHit if report.cancelled => {
                engine_info!(
                    "[{}] cancelled after {} requests with {} records",
                    self.label,
                    report.requests_issued,
                    records
                );
            }
            Termination::SafetyCapHit => {
                engine_warn!(
                    "[{}] safety cap of {} requests hit; returning {} records",
                    self.label,
                    self.config.max_requests,
                    records
                );
                self.sink.emit(FetchEvent::SafetyCapHit {
                    stream: self.label.clone(),
                    requests: report.requests_issued,
                });
            }
            Termination::FatalError => {
                let last = report
                    .errors
                    .last()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                engine_warn!(
                    "[{}] fetch failed after {} requests with {} records: {}",
                    self.label,
                    report.requests_issued,
                    records,
                    last
                );
            }
            Termination::NoMoreData | Termination::ReachedEnd => {
                engine_info!(
                    "[{}] fetch finished ({}) after {} requests with {} records",
                    self.label,
                    report.termination,
                    report.requests_issued,
                    records
                );
            }
        }
        self.sink.emit(FetchEvent::Terminated {
            stream: self.label.clone(),
            termination: report.termination,
            records,
        });
    }
}

fn rejection_message(status: u16, body: Option<&Value>) -> String {
    let reason = reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("unknown status");
    let detail = body.and_then(|body| {
        ["message", "error"]
            .iter()
            .find_map(|field| body.get(*field).and_then(Value::as_str))
    });
    match detail {
        Some(detail) => format!("{reason}: {detail}"),
        None => reason.to_string(),
    }
}
