use std::collections::BTreeMap;
use std::time::Duration;

use batchfetch_core::{BatchRequest, TransportFailure};
use engine_logging::engine_warn;
use futures_util::StreamExt;
use reqwest::Url;
use serde_json::Value;
use thiserror::Error;

use crate::FetchOutcome;

/// Parameters for one page call: the page itself plus any stream filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParams {
    pub request: BatchRequest,
    pub filters: BTreeMap<String, String>,
}

impl CallParams {
    pub fn new(request: BatchRequest) -> Self {
        Self {
            request,
            filters: BTreeMap::new(),
        }
    }
}

/// Performs one authenticated request. Transport retries, timeouts and session
/// handling are the implementor's business; the fetch loop never retries a
/// transport failure.
#[async_trait::async_trait]
pub trait HttpCaller: Send + Sync {
    async fn call(&self, params: &CallParams) -> FetchOutcome;
}

#[derive(Debug, Clone)]
pub struct CallerSettings {
    pub base_url: String,
    pub offset_param: String,
    pub count_param: String,
    /// Sent with every request, before the stream filters.
    pub default_query: Vec<(String, String)>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
}

impl Default for CallerSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            offset_param: "offset".to_string(),
            count_param: "limit".to_string(),
            default_query: Vec::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 16 * 1024 * 1024,
        }
    }
}

impl CallerSettings {
    pub fn for_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn is_pagination_param(&self, key: &str) -> bool {
        key == self.offset_param || key == self.count_param
    }
}

#[derive(Debug, Error)]
pub enum CallerError {
    #[error("invalid base url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("default query parameter {0} collides with a pagination parameter")]
    ReservedParam(String),
    #[error("failed to build http client: {0}")]
    Client(String),
}

/// `GET base_url?offset=..&limit=..&filters..`, JSON body.
#[derive(Debug, Clone)]
pub struct ReqwestHttpCaller {
    settings: CallerSettings,
    base_url: Url,
    client: reqwest::Client,
}

impl ReqwestHttpCaller {
    pub fn new(settings: CallerSettings) -> Result<Self, CallerError> {
        let base_url = Url::parse(&settings.base_url).map_err(|err| CallerError::InvalidUrl {
            url: settings.base_url.clone(),
            message: err.to_string(),
        })?;
        if let Some((key, _)) = settings
            .default_query
            .iter()
            .find(|(key, _)| settings.is_pagination_param(key))
        {
            return Err(CallerError::ReservedParam(key.clone()));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| CallerError::Client(err.to_string()))?;

        Ok(Self {
            settings,
            base_url,
            client,
        })
    }

    fn request_url(&self, params: &CallParams) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair(&self.settings.offset_param, &params.request.offset.to_string());
            query.append_pair(&self.settings.count_param, &params.request.count.to_string());
            for (key, value) in &self.settings.default_query {
                query.append_pair(key, value);
            }
            for (key, value) in &params.filters {
                if self.settings.is_pagination_param(key) {
                    engine_warn!("Ignoring filter {}={} at {}", key, value, params.request);
                    continue;
                }
                query.append_pair(key, value);
            }
        }
        url
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, FetchOutcome> {
        let max_bytes = self.settings.max_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, Some(content_len)));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, Some(next_len)));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl HttpCaller for ReqwestHttpCaller {
    async fn call(&self, params: &CallParams) -> FetchOutcome {
        let url = self.request_url(params);
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(err) => return map_reqwest_error(err),
        };

        let status = response.status().as_u16();
        let bytes = match self.read_body(response).await {
            Ok(bytes) => bytes,
            Err(outcome) => return outcome,
        };

        let body = if bytes.is_empty() {
            None
        } else {
            match serde_json::from_slice::<Value>(&bytes) {
                Ok(body) => Some(body),
                Err(err) => {
                    if (200..300).contains(&status) {
                        engine_warn!(
                            "Response body at {} is not JSON: {}",
                            params.request,
                            err
                        );
                    }
                    None
                }
            }
        };

        FetchOutcome::Response { status, body }
    }
}

fn too_large(max_bytes: u64, actual: Option<u64>) -> FetchOutcome {
    FetchOutcome::Transport {
        failure: TransportFailure::TooLarge { max_bytes, actual },
        message: "response too large".to_string(),
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchOutcome {
    let failure = if err.is_timeout() {
        TransportFailure::Timeout
    } else if err.is_builder() {
        TransportFailure::InvalidUrl
    } else {
        TransportFailure::Network
    };
    FetchOutcome::Transport {
        failure,
        message: err.to_string(),
    }
}
