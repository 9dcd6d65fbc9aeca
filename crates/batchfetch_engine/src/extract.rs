use serde_json::Value;

use crate::Record;

/// One way of locating the record list inside a response body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// A top-level field holding an array.
    Field(String),
    /// The body itself is an array of objects.
    BareList,
}

impl ExtractionStrategy {
    pub fn field(name: impl Into<String>) -> Self {
        ExtractionStrategy::Field(name.into())
    }

    fn locate<'a>(&self, body: &'a Value) -> Option<&'a Vec<Value>> {
        match self {
            ExtractionStrategy::Field(name) => body.get(name.as_str())?.as_array(),
            ExtractionStrategy::BareList => body
                .as_array()
                .filter(|items| items.iter().all(Value::is_object)),
        }
    }

    fn take(&self, body: Value) -> Option<Vec<Value>> {
        match (self, body) {
            (ExtractionStrategy::Field(name), Value::Object(mut fields)) => {
                match fields.remove(name.as_str()) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                }
            }
            (ExtractionStrategy::BareList, Value::Array(items)) => Some(items),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub records: Vec<Record>,
    /// True when exactly the requested number of records came back.
    pub matched_requested_count: bool,
}

/// Tries its strategies in order; the first match wins.
///
/// A body matching no strategy yields an empty list, which the fetch loop reads
/// as "no more data" rather than an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordExtractor {
    strategies: Vec<ExtractionStrategy>,
}

impl Default for RecordExtractor {
    fn default() -> Self {
        Self::new(vec![
            ExtractionStrategy::field("records"),
            ExtractionStrategy::field("data"),
            ExtractionStrategy::BareList,
        ])
    }
}

impl RecordExtractor {
    pub fn new(strategies: Vec<ExtractionStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[ExtractionStrategy] {
        &self.strategies
    }

    pub fn extract(&self, body: Option<Value>, requested: u64) -> Extracted {
        let records = body
            .and_then(|body| {
                let strategy = self
                    .strategies
                    .iter()
                    .find(|strategy| strategy.locate(&body).is_some())?;
                strategy.take(body)
            })
            .unwrap_or_default();
        let matched_requested_count = records.len() as u64 == requested;

        Extracted {
            records,
            matched_requested_count,
        }
    }
}
