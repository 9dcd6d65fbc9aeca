//! RON configuration file for the command line fetcher.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use batchfetch_engine::{
    CallerSettings, DatasetJob, ExtractionStrategy, FetchConfig, RecordExtractor, StreamSpec,
};
use ron::extensions::Extensions;
use ron::Options;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub batching: BatchingConfig,
    /// One fetch per entry; a single unfiltered stream when empty.
    #[serde(default)]
    pub streams: Vec<StreamConfig>,
    #[serde(default)]
    pub dedup_field: Option<String>,
    /// Overrides the default `records` / `data` / bare list lookup.
    #[serde(default)]
    pub record_fields: Option<Vec<String>>,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    pub base_url: String,
    #[serde(default)]
    pub offset_param: Option<String>,
    #[serde(default)]
    pub count_param: Option<String>,
    #[serde(default)]
    pub query: BTreeMap<String, String>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchingConfig {
    #[serde(default)]
    pub initial_batch_size: Option<u64>,
    #[serde(default)]
    pub max_batch_size: Option<u64>,
    #[serde(default)]
    pub floor: Option<u64>,
    #[serde(default)]
    pub max_requests: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    pub label: String,
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("invalid config {}", path.display()))
    }

    /// Optional fields may be written bare; `Some(..)` is accepted too.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let options = Options::default().with_default_extension(Extensions::IMPLICIT_SOME);
        Ok(options.from_str(content)?)
    }

    pub fn caller_settings(&self) -> CallerSettings {
        let endpoint = &self.endpoint;
        let defaults = CallerSettings::for_url(endpoint.base_url.clone());
        CallerSettings {
            offset_param: endpoint
                .offset_param
                .clone()
                .unwrap_or(defaults.offset_param.clone()),
            count_param: endpoint
                .count_param
                .clone()
                .unwrap_or(defaults.count_param.clone()),
            default_query: endpoint
                .query
                .iter()
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
            connect_timeout: endpoint
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.connect_timeout),
            request_timeout: endpoint
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            max_bytes: endpoint.max_bytes.unwrap_or(defaults.max_bytes),
            ..defaults
        }
    }

    pub fn fetch_config(&self) -> anyhow::Result<FetchConfig> {
        let defaults = FetchConfig::default();
        let batching = &self.batching;
        let config = FetchConfig {
            initial_batch_size: batching
                .initial_batch_size
                .unwrap_or(defaults.initial_batch_size),
            max_batch_size: batching.max_batch_size.unwrap_or(defaults.max_batch_size),
            floor: batching.floor.unwrap_or(defaults.floor),
            max_requests: batching.max_requests.unwrap_or(defaults.max_requests),
        };
        config.validate().context("invalid batching settings")?;
        Ok(config)
    }

    pub fn dataset_job(&self) -> DatasetJob {
        let streams = if self.streams.is_empty() {
            vec![StreamSpec::unfiltered("all")]
        } else {
            self.streams
                .iter()
                .map(|stream| StreamSpec {
                    label: stream.label.clone(),
                    filters: stream.filters.clone(),
                })
                .collect()
        };
        let extractor = match &self.record_fields {
            Some(fields) => {
                let mut strategies: Vec<_> =
                    fields.iter().map(ExtractionStrategy::field).collect();
                strategies.push(ExtractionStrategy::BareList);
                RecordExtractor::new(strategies)
            }
            None => RecordExtractor::default(),
        };

        DatasetJob {
            streams,
            dedup_field: self.dedup_field.clone(),
            extractor,
            concurrency: self.concurrency,
        }
    }
}
