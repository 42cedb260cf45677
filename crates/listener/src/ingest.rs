//! Shape detection and line formatting for ingested payloads.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Client-side problems with an `/ingest` payload. Nothing is written for these.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum IngestError {
    #[error("invalid json")]
    InvalidJson,
    #[error("empty body")]
    EmptyBody,
}

/// ISO-8601 UTC with microseconds and a trailing `Z`.
pub fn timestamp(now: DateTime<Utc>) -> String {
    now.format(TIMESTAMP_FORMAT).to_string()
}

/// True when the media type of a `Content-Type` value is `application/json`,
/// ignoring case and any parameters.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Lossy UTF-8 decode followed by a whitespace trim. Never fails.
pub fn decode_text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).trim().to_string()
}

/// Line for the `/ingest` route.
pub fn ingest_line(
    content_type: Option<&str>,
    body: &[u8],
    ts: &str,
) -> Result<String, IngestError> {
    if is_json_content_type(content_type) {
        return json_line(body, ts);
    }

    let payload = decode_text(body);
    if payload.is_empty() {
        return Err(IngestError::EmptyBody);
    }
    Ok(text_line(ts, &payload))
}

/// Line for the `/logline` route. Empty payloads are kept.
pub fn logline(body: &[u8], ts: &str) -> String {
    text_line(ts, &decode_text(body))
}

/// `ts` first, then the caller's fields in arrival order. A caller-supplied
/// `ts` replaces the generated value in place. Numbers are copied verbatim,
/// whatever their size or precision.
fn json_line(body: &[u8], ts: &str) -> Result<String, IngestError> {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    let fields = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(fields)) => fields,
        _ => return Err(IngestError::InvalidJson),
    };

    let mut record = Map::with_capacity(fields.len() + 1);
    record.insert("ts".to_string(), Value::String(ts.to_string()));
    record.extend(fields);

    Ok(Value::Object(record).to_string())
}

fn text_line(ts: &str, payload: &str) -> String {
    format!("{ts} {payload}")
}
