use serde::Deserialize;
use serde_json::Value;

use crate::{AddressFields, Completion, Event, Frame, RowResult, RowStatus, RunStats};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("frame payload is not valid JSON: {0}")]
    Malformed(String),
    #[error("`{kind}` frame has an unexpected shape: {message}")]
    Shape { kind: String, message: String },
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    total: u64,
}

#[derive(Debug, Default, Deserialize)]
struct ProgressStats {
    procesadas: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProgressPayload {
    #[serde(default)]
    stats: ProgressStats,
    total: Option<u64>,
    #[serde(default)]
    status: String,
    row: u64,
    #[serde(default)]
    direccion: String,
    #[serde(default)]
    municipio: String,
    #[serde(default)]
    cp: String,
}

#[derive(Debug, Deserialize)]
struct RowErrorPayload {
    row: u64,
    #[serde(default)]
    error: String,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: String,
}

/// Counter block shared by the `complete` frame and the one-shot
/// `X-Processing-Stats` header.
#[derive(Debug, Default, Deserialize)]
pub struct WireStats {
    #[serde(default)]
    pub procesadas: u64,
    #[serde(default)]
    pub encontradas: u64,
    #[serde(default)]
    pub no_encontradas: u64,
    #[serde(default)]
    pub errores: u64,
}

impl From<WireStats> for RunStats {
    fn from(stats: WireStats) -> Self {
        Self {
            processed: stats.procesadas,
            found: stats.encontradas,
            not_found: stats.no_encontradas,
            errors: stats.errores,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletePayload {
    #[serde(default)]
    stats: WireStats,
    #[serde(default)]
    elapsed: String,
    file: Option<String>,
    filename: Option<String>,
}

/// Parses a frame payload into an event.
///
/// Returns `Ok(None)` for frames without a recognised `type`; those are
/// ignored rather than treated as errors.
pub fn parse_frame(frame: &Frame) -> Result<Option<Event>, ParseError> {
    parse_payload(frame.payload())
}

pub fn parse_payload(payload: &str) -> Result<Option<Event>, ParseError> {
    let value: Value =
        serde_json::from_str(payload).map_err(|err| ParseError::Malformed(err.to_string()))?;
    let Some(kind) = value.get("type").and_then(Value::as_str).map(str::to_owned) else {
        return Ok(None);
    };

    let event = match kind.as_str() {
        "start" => {
            let p: StartPayload = shaped(&kind, value)?;
            Event::Start { total: p.total }
        }
        "progress" => {
            let p: ProgressPayload = shaped(&kind, value)?;
            let status = if p.status == "found" {
                RowStatus::Found
            } else {
                RowStatus::NotFound
            };
            Event::RowResult(RowResult {
                row: p.row,
                status,
                fields: AddressFields {
                    address: p.direccion,
                    municipality: p.municipio,
                    postal_code: p.cp,
                },
                processed: p.stats.procesadas,
                total: p.total,
            })
        }
        "row_error" => {
            let p: RowErrorPayload = shaped(&kind, value)?;
            Event::RowError {
                row: p.row,
                message: p.error,
            }
        }
        "error" => {
            let p: ErrorPayload = shaped(&kind, value)?;
            Event::Error { message: p.message }
        }
        "complete" => {
            let p: CompletePayload = shaped(&kind, value)?;
            Event::Complete(Completion {
                stats: p.stats.into(),
                elapsed_label: p.elapsed,
                artifact_base64: p.file,
                filename: p.filename,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn shaped<T: serde::de::DeserializeOwned>(kind: &str, value: Value) -> Result<T, ParseError> {
    serde_json::from_value(value).map_err(|err| ParseError::Shape {
        kind: kind.to_string(),
        message: err.to_string(),
    })
}

/// Percentage of rows processed, rounded and clamped to `[0, 100]`.
///
/// `None` while the total is unknown (zero).
pub fn derive_percent(processed: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let percent = (processed as f64 / total as f64 * 100.0).round();
    Some(percent.clamp(0.0, 100.0))
}
