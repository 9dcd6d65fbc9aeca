use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use batchfetch_engine::{CombinedReport, Record};
use serde::Serialize;
use tempfile::NamedTempFile;

#[derive(Debug, Serialize)]
pub struct DatasetDocument<'a> {
    pub fetched_at: String,
    pub records: &'a [Record],
    pub errors: Vec<ErrorEntry>,
    pub streams: Vec<StreamEntry>,
}

#[derive(Debug, Serialize)]
pub struct ErrorEntry {
    pub stream: String,
    pub kind: String,
    pub status: Option<u16>,
    pub offset: u64,
    pub count: u64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StreamEntry {
    pub label: String,
    pub termination: String,
    pub records: usize,
    pub requests: u32,
    pub cancelled: bool,
}

impl<'a> DatasetDocument<'a> {
    pub fn new(report: &'a CombinedReport, fetched_at: String) -> Self {
        let errors = report
            .errors
            .iter()
            .map(|entry| ErrorEntry {
                stream: entry.stream.clone(),
                kind: entry.error.kind.to_string(),
                status: entry.error.status_code(),
                offset: entry.error.request.offset,
                count: entry.error.request.count,
                message: entry.error.message.clone(),
            })
            .collect();
        let streams = report
            .streams
            .iter()
            .map(|stream| StreamEntry {
                label: stream.label.clone(),
                termination: stream.termination.to_string(),
                records: stream.records,
                requests: stream.requests_issued,
                cancelled: stream.cancelled,
            })
            .collect();

        Self {
            fetched_at,
            records: &report.records,
            errors,
            streams,
        }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialize dataset")
    }
}

/// Atomically write content to `path` by writing a temp file in the same
/// directory, then renaming it into place.
pub fn write_atomic(path: &Path, content: &str) -> io::Result<PathBuf> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir)?;

    let mut tmp = NamedTempFile::new_in(&dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(path.to_path_buf())
}
