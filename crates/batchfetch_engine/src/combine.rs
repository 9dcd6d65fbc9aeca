use std::collections::HashSet;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use batchfetch_core::{ErrorRecord, FetchReport, Termination};
use engine_logging::{engine_info, engine_warn};
use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{self, StreamExt};
use serde_json::Value;

use crate::{EventSink, FetchEvent, FetchLoop, NoopSink, Record};

const DEFAULT_CONCURRENCY: usize = 4;

type KeyFn<K> = dyn Fn(&Record) -> Option<K> + Send + Sync;

/// An error raised inside one stream, tagged with the stream's label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    pub stream: String,
    pub error: ErrorRecord,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSummary {
    pub label: String,
    pub termination: Termination,
    pub records: usize,
    pub requests_issued: u32,
    pub cancelled: bool,
}

impl StreamSummary {
    pub fn failed(&self) -> bool {
        self.termination.is_error()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CombinedReport {
    /// Deduplicated records from every stream that did not fail, first seen wins.
    pub records: Vec<Record>,
    /// Errors from all streams, including recovered ones.
    pub errors: Vec<StreamError>,
    pub streams: Vec<StreamSummary>,
}

impl CombinedReport {
    pub fn failed_streams(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|stream| stream.failed())
            .map(|stream| stream.label.as_str())
            .collect()
    }

    pub fn all_failed(&self) -> bool {
        !self.streams.is_empty() && self.streams.iter().all(StreamSummary::failed)
    }
}

/// Runs independent fetch streams and merges their records.
///
/// Streams run concurrently (bounded), but results are merged in the order the
/// streams were added, so deduplication is deterministic. A stream that ends in
/// a fatal error contributes its errors and none of its records.
pub struct MultiStreamCombiner<K = String> {
    streams: Vec<(String, BoxFuture<'static, FetchReport<Record>>)>,
    key_of: Option<Arc<KeyFn<K>>>,
    concurrency: usize,
    sink: Arc<dyn EventSink>,
}

impl MultiStreamCombiner<String> {
    /// Straight concatenation, no deduplication.
    pub fn new() -> Self {
        Self::with_key_fn(None)
    }

    /// Deduplicate on the JSON rendering of a top-level field. Records without the
    /// field are always kept.
    pub fn keyed_by_field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::keyed(move |record: &Record| {
            record
                .get(field.as_str())
                .filter(|value| !value.is_null())
                .map(Value::to_string)
        })
    }
}

impl Default for MultiStreamCombiner<String> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> MultiStreamCombiner<K>
where
    K: Eq + Hash,
{
    pub fn keyed<F>(key_of: F) -> Self
    where
        F: Fn(&Record) -> Option<K> + Send + Sync + 'static,
    {
        let key_of: Arc<KeyFn<K>> = Arc::new(key_of);
        Self::with_key_fn(Some(key_of))
    }

    fn with_key_fn(key_of: Option<Arc<KeyFn<K>>>) -> Self {
        Self {
            streams: Vec::new(),
            key_of,
            concurrency: DEFAULT_CONCURRENCY,
            sink: Arc::new(NoopSink),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Add any future that yields a fetch report.
    pub fn add_stream<F>(&mut self, label: impl Into<String>, fetch: F)
    where
        F: Future<Output = FetchReport<Record>> + Send + 'static,
    {
        self.streams.push((label.into(), fetch.boxed()));
    }

    pub fn add_loop(&mut self, fetch: FetchLoop) {
        let label = fetch.label().to_string();
        self.add_stream(label, async move { fetch.run().await });
    }

    pub async fn run(self) -> CombinedReport {
        let stream_count = self.streams.len();
        let pending: Vec<BoxFuture<'static, (String, FetchReport<Record>)>> = self
            .streams
            .into_iter()
            .map(|(label, fetch)| fetch.map(move |report| (label, report)).boxed())
            .collect();
        let reports: Vec<(String, FetchReport<Record>)> = stream::iter(pending)
            .buffered(self.concurrency)
            .collect()
            .await;

        merge(reports, self.key_of.as_deref(), self.sink.as_ref(), stream_count)
    }
}

fn merge<K: Eq + Hash>(
    reports: Vec<(String, FetchReport<Record>)>,
    key_of: Option<&KeyFn<K>>,
    sink: &dyn EventSink,
    stream_count: usize,
) -> CombinedReport {
    let mut records = Vec::new();
    let mut errors = Vec::new();
    let mut streams = Vec::with_capacity(reports.len());
    let mut seen = HashSet::new();
    let mut duplicates = 0usize;

    for (label, report) in reports {
        let summary = StreamSummary {
            label: label.clone(),
            termination: report.termination,
            records: report.records.len(),
            requests_issued: report.requests_issued,
            cancelled: report.cancelled,
        };

        if summary.failed() {
            engine_warn!(
                "Stream {} failed; dropping its {} records",
                label,
                report.records.len()
            );
            sink.emit(FetchEvent::StreamFailed {
                stream: label.clone(),
                errors: report.errors.clone(),
            });
        } else {
            for record in report.records {
                let fresh = match key_of.and_then(|key_of| key_of(&record)) {
                    Some(key) => seen.insert(key),
                    None => true,
                };
                if fresh {
                    records.push(record);
                } else {
                    duplicates += 1;
                }
            }
        }

        errors.extend(report.errors.into_iter().map(|error| StreamError {
            stream: label.clone(),
            error,
        }));
        streams.push(summary);
    }

    let failed = streams.iter().filter(|stream| stream.failed()).count();
    engine_info!(
        "Merged {} records from {} streams ({} failed, {} duplicates dropped)",
        records.len(),
        stream_count,
        failed,
        duplicates
    );

    CombinedReport {
        records,
        errors,
        streams,
    }
}
