#![allow(dead_code)]

use std::sync::{Arc, Mutex, Once};

use batchfetch_engine::{
    BatchRequest, CallParams, EventSink, FetchEvent, FetchOutcome, HttpCaller, Record,
};
use serde_json::{json, Value};

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(engine_logging::initialize_for_tests);
}

type Script = dyn Fn(&CallParams) -> FetchOutcome + Send + Sync;

/// In-memory caller that answers from a closure and remembers every call.
pub struct ScriptedCaller {
    script: Box<Script>,
    calls: Mutex<Vec<CallParams>>,
}

impl ScriptedCaller {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&CallParams) -> FetchOutcome + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Serves `total` records, `{"id": n}`, as `{"records": [...]}` pages.
    pub fn dataset(total: u64) -> Arc<Self> {
        Self::new(move |params| FetchOutcome::ok(records_body(params.request, total)))
    }

    pub fn requests(&self) -> Vec<BatchRequest> {
        self.calls().into_iter().map(|call| call.request).collect()
    }

    pub fn calls(&self) -> Vec<CallParams> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpCaller for ScriptedCaller {
    async fn call(&self, params: &CallParams) -> FetchOutcome {
        self.calls.lock().unwrap().push(params.clone());
        (self.script)(params)
    }
}

pub fn records(offset: u64, count: u64) -> Vec<Record> {
    (offset..offset + count).map(|id| json!({ "id": id })).collect()
}

pub fn records_body(request: BatchRequest, total: u64) -> Value {
    let end = (request.offset + request.count).min(total);
    let count = end.saturating_sub(request.offset);
    json!({ "records": records(request.offset, count) })
}

#[derive(Default)]
pub struct TestSink {
    events: Arc<Mutex<Vec<FetchEvent>>>,
}

impl TestSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn take(&self) -> Vec<FetchEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

impl EventSink for TestSink {
    fn emit(&self, event: FetchEvent) {
        self.events.lock().unwrap().push(event);
    }
}
