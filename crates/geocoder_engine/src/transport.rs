use std::path::Path;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use geocoder_core::{validate_input_name, RunStats, WireStats};
use geocoder_logging::{ingest_debug, ingest_warn};
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, CONTENT_DISPOSITION, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use url::Url;

use crate::{ClientError, FailureKind};

pub const STATS_HEADER: &str = "X-Processing-Stats";
pub const TIME_HEADER: &str = "X-Processing-Time";

/// Chunks of a response body, in arrival order.
pub type ByteStream = BoxStream<'static, Result<Bytes, ClientError>>;

/// Periods of the two per-run tickers.
#[derive(Debug, Clone, Copy)]
pub struct TimerSettings {
    pub elapsed_period: Duration,
    pub estimator_period: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        Self {
            elapsed_period: Duration::from_secs(1),
            estimator_period: Duration::from_millis(400),
        }
    }
}

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/";

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Endpoint paths are joined onto this, so it should end with a slash.
    pub base_url: String,
    pub stream_path: String,
    pub one_shot_path: String,
    pub connect_timeout: Duration,
    /// Applies to the one-shot request only; a stream may run for as long
    /// as the server keeps sending.
    pub request_timeout: Duration,
    pub max_artifact_bytes: u64,
    pub timers: TimerSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            stream_path: "api/process-stream".to_string(),
            one_shot_path: "api/process".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(15 * 60),
            max_artifact_bytes: 100 * 1024 * 1024,
            timers: TimerSettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        let invalid = |err: url::ParseError| {
            ClientError::new(FailureKind::InvalidUrl, format!("{}: {err}", self.base_url))
        };
        Url::parse(&self.base_url)
            .map_err(invalid)?
            .join(path.trim_start_matches('/'))
            .map_err(invalid)
    }
}

/// Spreadsheet plus the optional geographic filters sent with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Bytes,
    pub province: Option<String>,
    pub municipality: Option<String>,
}

impl UploadRequest {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Result<Self, ClientError> {
        let file_name = file_name.into();
        validate_input_name(&file_name)?;
        Ok(Self {
            file_name,
            bytes: bytes.into(),
            province: None,
            municipality: None,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self, ClientError> {
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ClientError::new(FailureKind::InvalidInput, format!("{path:?} has no file name"))
            })?
            .to_string();
        validate_input_name(&file_name)?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|err| ClientError::new(FailureKind::Io, format!("{path:?}: {err}")))?;
        Self::new(file_name, bytes)
    }

    /// Blank filters are treated as absent.
    pub fn with_filters(mut self, province: Option<String>, municipality: Option<String>) -> Self {
        self.province = province.filter(|p| !p.trim().is_empty());
        self.municipality = municipality.filter(|m| !m.trim().is_empty());
        self
    }

    fn to_form(&self) -> Form {
        let part = Part::bytes(self.bytes.to_vec()).file_name(self.file_name.clone());
        let mut form = Form::new().part("file", part);
        if let Some(province) = &self.province {
            form = form.text("filtro_provincia", province.clone());
        }
        if let Some(municipality) = &self.municipality {
            form = form.text("filtro_municipio", municipality.clone());
        }
        form
    }
}

/// Final answer of the one-shot endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OneShotResponse {
    pub body: Bytes,
    pub stats: RunStats,
    pub elapsed_label: String,
    pub filename: Option<String>,
    pub content_type: Option<String>,
}

#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Uploads the file and returns the streaming body once headers arrive.
    async fn open_stream(&self, upload: &UploadRequest) -> Result<ByteStream, ClientError>;

    /// Uploads the file and waits for the complete result.
    async fn send_one_shot(&self, upload: &UploadRequest) -> Result<OneShotResponse, ClientError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let client = build_client(&settings)?;
        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }
}

fn build_client(settings: &ClientSettings) -> Result<reqwest::Client, ClientError> {
    reqwest::Client::builder()
        .connect_timeout(settings.connect_timeout)
        .build()
        .map_err(|err| ClientError::new(FailureKind::Network, err.to_string()))
}

#[async_trait::async_trait]
impl Transport for ReqwestTransport {
    async fn open_stream(&self, upload: &UploadRequest) -> Result<ByteStream, ClientError> {
        let url = self.settings.endpoint(&self.settings.stream_path)?;
        ingest_debug!("POST {} ({} bytes)", url, upload.bytes.len());
        let response = self
            .client
            .post(url)
            .multipart(upload.to_form())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(map_reqwest_error))
            .boxed())
    }

    async fn send_one_shot(&self, upload: &UploadRequest) -> Result<OneShotResponse, ClientError> {
        let url = self.settings.endpoint(&self.settings.one_shot_path)?;
        ingest_debug!("POST {} ({} bytes)", url, upload.bytes.len());
        let response = self
            .client
            .post(url)
            .timeout(self.settings.request_timeout)
            .multipart(upload.to_form())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;

        let max_bytes = self.settings.max_artifact_bytes;
        if let Some(content_len) = response.content_length() {
            if content_len > max_bytes {
                return Err(too_large(max_bytes, content_len));
            }
        }

        let headers = response.headers().clone();
        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            let next_len = body.len() as u64 + chunk.len() as u64;
            if next_len > max_bytes {
                return Err(too_large(max_bytes, next_len));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(OneShotResponse {
            body: Bytes::from(body),
            stats: stats_from_headers(&headers),
            elapsed_label: header_text(&headers, TIME_HEADER).unwrap_or_default(),
            filename: header_text(&headers, CONTENT_DISPOSITION.as_str())
                .and_then(|value| filename_from_disposition(&value)),
            content_type: header_text(&headers, CONTENT_TYPE.as_str()),
        })
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = error_detail(&body).unwrap_or_else(|| status.to_string());
    Err(ClientError::new(
        FailureKind::HttpStatus(status.as_u16()),
        message,
    ))
}

/// Pulls a human readable message out of a JSON error body.
fn error_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    ["detail", "message", "error"]
        .iter()
        .find_map(|key| value.get(key).and_then(|v| v.as_str()))
        .map(str::to_string)
}

fn too_large(max_bytes: u64, actual: u64) -> ClientError {
    ClientError::new(
        FailureKind::TooLarge {
            max_bytes,
            actual: Some(actual),
        },
        "response too large",
    )
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Missing or unreadable stats yield an all-zero summary.
pub fn stats_from_headers(headers: &HeaderMap) -> RunStats {
    let Some(raw) = header_text(headers, STATS_HEADER) else {
        ingest_warn!("response has no {} header; reporting zero counts", STATS_HEADER);
        return RunStats::default();
    };
    match serde_json::from_str::<WireStats>(&raw) {
        Ok(stats) => stats.into(),
        Err(err) => {
            ingest_warn!("unreadable {} header {:?}: {}", STATS_HEADER, raw, err);
            RunStats::default()
        }
    }
}

/// Extracts the suggested filename from a `Content-Disposition` value,
/// preferring the RFC 5987 `filename*` form.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    for param in value.split(';').map(str::trim) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();
        if key == "filename*" {
            let encoded = raw.split_once("''").map(|(_, rest)| rest).unwrap_or(raw);
            match percent_decode_str(encoded.trim_matches('"')).decode_utf8() {
                Ok(decoded) if !decoded.is_empty() => return Some(decoded.into_owned()),
                Ok(_) => {}
                Err(err) => ingest_warn!("ignoring undecodable filename* {:?}: {}", raw, err),
            }
        } else if key == "filename" {
            let name = raw.trim_matches('"').to_string();
            if !name.is_empty() {
                plain = Some(name);
            }
        }
    }
    plain
}

fn map_reqwest_error(err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::new(FailureKind::Timeout, err.to_string());
    }
    ClientError::new(FailureKind::Network, err.to_string())
}
