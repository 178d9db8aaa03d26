use crate::error::{QuillError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored document together with its version tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub key: String,
    pub value: Value,
    pub schema_version: u32,
    /// `None` for legacy payloads written before records carried an envelope.
    pub written_at: Option<DateTime<Utc>>,
}

/// On-disk shape handed to the backend.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    schema_version: u32,
    written_at: DateTime<Utc>,
    value: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeRef<'a> {
    schema_version: u32,
    written_at: DateTime<Utc>,
    value: &'a Value,
}

pub(crate) fn encode(value: &Value, schema_version: u32, written_at: DateTime<Utc>) -> Result<String> {
    Ok(serde_json::to_string(&EnvelopeRef {
        schema_version,
        written_at,
        value,
    })?)
}

/// Decode a backend payload.
///
/// Payloads without an envelope are legacy raw documents and read as v1.
/// Anything that is not JSON at all is a corrupted entry.
pub(crate) fn decode(key: &str, raw: &str) -> Result<Record> {
    let parsed: Value = serde_json::from_str(raw).map_err(|e| QuillError::CorruptedEntry {
        key: key.to_string(),
        reason: e.to_string(),
    })?;

    let is_envelope = parsed
        .as_object()
        .is_some_and(|o| o.contains_key("schemaVersion") && o.contains_key("value"));

    if is_envelope {
        let envelope: Envelope =
            serde_json::from_value(parsed).map_err(|e| QuillError::CorruptedEntry {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        return Ok(Record {
            key: key.to_string(),
            value: envelope.value,
            schema_version: envelope.schema_version,
            written_at: Some(envelope.written_at),
        });
    }

    Ok(Record {
        key: key.to_string(),
        value: parsed,
        schema_version: 1,
        written_at: None,
    })
}
