mod support;

use std::time::Duration;

use batchfetch_engine::{
    BatchRequest, ErrorRecord, FailureKind, FetchConfig, FetchEvent, FetchLoop, FetchOutcome,
    FetchReport, MultiStreamCombiner, Record, Termination,
};
use pretty_assertions::assert_eq;
use serde_json::json;

use support::{init_logging, records_body, ScriptedCaller, TestSink};

fn finished(records: Vec<Record>) -> FetchReport<Record> {
    FetchReport {
        records,
        errors: Vec::new(),
        termination: Termination::ReachedEnd,
        requests_issued: 1,
        final_batch_size: 100,
        cancelled: false,
    }
}

fn failed(records: Vec<Record>, status: u16) -> FetchReport<Record> {
    FetchReport {
        records,
        errors: vec![ErrorRecord {
            kind: FailureKind::HttpStatus(status),
            request: BatchRequest::new(100, 200),
            message: "boom".to_string(),
        }],
        termination: Termination::FatalError,
        requests_issued: 2,
        final_batch_size: 200,
        cancelled: false,
    }
}

#[tokio::test]
async fn overlapping_streams_merge_first_seen_wins() {
    init_logging();
    let mut combiner = MultiStreamCombiner::keyed_by_field("id");
    combiner.add_stream(
        "first",
        async { finished(vec![json!({"id": 1}), json!({"id": 2, "from": "first"})]) },
    );
    combiner.add_stream(
        "second",
        async { finished(vec![json!({"id": 2, "from": "second"}), json!({"id": 3})]) },
    );

    let report = combiner.run().await;

    assert_eq!(
        report.records,
        vec![
            json!({"id": 1}),
            json!({"id": 2, "from": "first"}),
            json!({"id": 3}),
        ]
    );
    assert!(report.errors.is_empty());
    assert!(report.failed_streams().is_empty());
}

#[tokio::test]
async fn same_record_twice_appears_once() {
    init_logging();
    let mut combiner = MultiStreamCombiner::keyed_by_field("id");
    combiner.add_stream("a", async { finished(vec![json!({"id": "x"})]) });
    combiner.add_stream("b", async { finished(vec![json!({"id": "x"})]) });

    let report = combiner.run().await;

    assert_eq!(report.records, vec![json!({"id": "x"})]);
}

#[tokio::test]
async fn without_key_streams_are_concatenated() {
    init_logging();
    let mut combiner = MultiStreamCombiner::new();
    combiner.add_stream("a", async { finished(vec![json!({"id": 1}), json!({"id": 2})]) });
    combiner.add_stream("b", async { finished(vec![json!({"id": 2}), json!({"id": 3})]) });

    let report = combiner.run().await;

    assert_eq!(report.records.len(), 4);
}

#[tokio::test]
async fn records_missing_the_key_are_kept() {
    init_logging();
    let mut combiner = MultiStreamCombiner::keyed_by_field("id");
    combiner.add_stream(
        "a",
        async { finished(vec![json!({"name": "n"}), json!({"id": null}), json!({"id": 1})]) },
    );
    combiner.add_stream("b", async { finished(vec![json!({"name": "n"}), json!({"id": 1})]) });

    let report = combiner.run().await;

    assert_eq!(
        report.records,
        vec![
            json!({"name": "n"}),
            json!({"id": null}),
            json!({"id": 1}),
            json!({"name": "n"}),
        ]
    );
}

#[tokio::test]
async fn custom_key_function_is_used() {
    init_logging();
    let mut combiner = MultiStreamCombiner::keyed(|record: &Record| {
        record["email"].as_str().map(str::to_lowercase)
    });
    combiner.add_stream("a", async { finished(vec![json!({"email": "A@x.io"})]) });
    combiner.add_stream("b", async { finished(vec![json!({"email": "a@X.io"})]) });

    let report = combiner.run().await;

    assert_eq!(report.records, vec![json!({"email": "A@x.io"})]);
}

#[tokio::test]
async fn failed_stream_contributes_errors_but_no_records() {
    init_logging();
    let sink = TestSink::new();
    let mut combiner = MultiStreamCombiner::keyed_by_field("id").with_sink(sink.clone());
    combiner.add_stream("ok", async { finished(vec![json!({"id": 1})]) });
    combiner.add_stream("broken", async { failed(vec![json!({"id": 9})], 500) });

    let report = combiner.run().await;

    assert_eq!(report.records, vec![json!({"id": 1})]);
    assert_eq!(report.failed_streams(), vec!["broken"]);
    assert!(!report.all_failed());
    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].stream, "broken");
    assert_eq!(report.errors[0].error.status_code(), Some(500));
    assert_eq!(report.streams[1].records, 1);

    let failures: Vec<_> = sink
        .take()
        .into_iter()
        .filter(|event| matches!(event, FetchEvent::StreamFailed { .. }))
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn merge_order_follows_stream_order_not_completion_order() {
    init_logging();
    let mut combiner = MultiStreamCombiner::keyed_by_field("id").with_concurrency(2);
    combiner.add_stream("slow", async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        finished(vec![json!({"id": 1, "from": "slow"})])
    });
    combiner.add_stream("fast", async { finished(vec![json!({"id": 1, "from": "fast"})]) });

    let report = combiner.run().await;

    assert_eq!(report.records, vec![json!({"id": 1, "from": "slow"})]);
    let labels: Vec<_> = report.streams.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["slow", "fast"]);
}

#[tokio::test]
async fn fetch_loops_per_filter_are_merged() {
    init_logging();
    let caller = ScriptedCaller::new(|params| match params.filters.get("region").map(String::as_str) {
        Some("north") => FetchOutcome::ok(json!({
            "data": [{"id": 1}, {"id": 2}]
        })),
        Some("south") => FetchOutcome::ok(json!([{"id": 2}, {"id": 3}])),
        _ => FetchOutcome::ok(records_body(params.request, 0)),
    });
    let config = FetchConfig::default();

    let mut combiner = MultiStreamCombiner::keyed_by_field("id");
    for region in ["north", "south"] {
        combiner.add_loop(
            FetchLoop::new(caller.clone(), config.clone())
                .with_label(region)
                .with_filter("region", region),
        );
    }
    assert_eq!(combiner.len(), 2);

    let report = combiner.run().await;

    assert_eq!(
        report.records,
        vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 3})]
    );
    assert!(report
        .streams
        .iter()
        .all(|stream| stream.termination == Termination::ReachedEnd));
    let labels: Vec<&str> = report.streams.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["north", "south"]);
}

#[tokio::test]
async fn every_stream_failing_is_reported() {
    init_logging();
    let caller = ScriptedCaller::new(|_| FetchOutcome::status(401));

    let mut combiner = MultiStreamCombiner::new();
    for label in ["a", "b"] {
        combiner.add_loop(FetchLoop::new(caller.clone(), FetchConfig::default()).with_label(label));
    }

    let report = combiner.run().await;

    assert!(report.records.is_empty());
    assert!(report.all_failed());
    assert_eq!(report.failed_streams(), vec!["a", "b"]);
    assert_eq!(report.errors.len(), 2);
}

#[tokio::test]
async fn combiner_runs_as_spawned_task() {
    init_logging();
    let caller = ScriptedCaller::dataset(120);
    let mut combiner = MultiStreamCombiner::keyed_by_field("id");
    combiner.add_loop(FetchLoop::new(caller.clone(), FetchConfig::default()).with_label("a"));
    combiner.add_loop(FetchLoop::new(caller, FetchConfig::default()).with_label("b"));

    let report = tokio::spawn(combiner.run()).await.expect("combiner task");

    assert_eq!(report.records.len(), 120);
    assert!(report.failed_streams().is_empty());
}
