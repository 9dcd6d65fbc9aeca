use batchfetch_engine::{ExtractionStrategy, RecordExtractor};
use pretty_assertions::assert_eq;
use serde_json::json;

#[test]
fn records_field_wins_over_data_field() {
    let extractor = RecordExtractor::default();
    let body = json!({
        "records": [{"id": 1}],
        "data": [{"id": 2}, {"id": 3}],
    });

    let extracted = extractor.extract(Some(body), 1);

    assert_eq!(extracted.records, vec![json!({"id": 1})]);
    assert!(extracted.matched_requested_count);
}

#[test]
fn data_field_used_when_records_missing_or_not_a_list() {
    let extractor = RecordExtractor::default();

    let extracted = extractor.extract(Some(json!({"data": [{"id": 2}, {"id": 3}]})), 5);
    assert_eq!(extracted.records.len(), 2);
    assert!(!extracted.matched_requested_count);

    let extracted = extractor.extract(
        Some(json!({"records": {"count": 2}, "data": [{"id": 2}, {"id": 3}]})),
        2,
    );
    assert_eq!(extracted.records.len(), 2);
    assert!(extracted.matched_requested_count);
}

#[test]
fn bare_list_of_objects_is_the_record_list() {
    let extractor = RecordExtractor::default();
    let extracted = extractor.extract(Some(json!([{"id": 1}, {"id": 2}])), 2);
    assert_eq!(extracted.records.len(), 2);
    assert!(extracted.matched_requested_count);
}

#[test]
fn unrecognised_shapes_yield_no_records() {
    let extractor = RecordExtractor::default();

    for body in [
        json!({"items": [{"id": 1}]}),
        json!([1, 2, 3]),
        json!("nothing"),
        json!(null),
    ] {
        let extracted = extractor.extract(Some(body), 100);
        assert!(extracted.records.is_empty());
        assert!(!extracted.matched_requested_count);
    }

    assert!(extractor.extract(None, 100).records.is_empty());
}

#[test]
fn custom_strategies_are_tried_in_order() {
    let extractor = RecordExtractor::new(vec![
        ExtractionStrategy::field("items"),
        ExtractionStrategy::BareList,
    ]);
    assert_eq!(extractor.strategies().len(), 2);

    let extracted = extractor.extract(Some(json!({"items": [{"id": 1}], "records": []})), 1);
    assert_eq!(extracted.records, vec![json!({"id": 1})]);

    let extracted = extractor.extract(Some(json!({"records": [{"id": 1}]})), 1);
    assert!(extracted.records.is_empty());
}
