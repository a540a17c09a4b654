use serde::Serialize;
use serde_json::{Map, Value};

use crate::envelope::Envelope;
use crate::error::{FrameError, Result};
use crate::role::{Role, CHANNEL_KEY};

/// Default maximum number of envelopes accepted in one batch.
pub const DEFAULT_MAX_MESSAGES: usize = 4096;

/// How a batch is laid out on the transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// Structured object keyed by [`CHANNEL_KEY`]. Supports domains.
    #[default]
    Batch,
    /// Role prefix followed by a JSON array string. Domain is always empty.
    Legacy,
}

/// Configuration for the batch codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum envelopes decoded from one batch. Default: 4096.
    pub max_messages: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

/// A decoded batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Role that sent the batch.
    pub role: Role,
    /// Encoding the batch arrived in.
    pub format: WireFormat,
    /// Scoping domain; empty when unscoped.
    pub domain: String,
    /// Envelopes in send order.
    pub messages: Vec<Envelope>,
}

#[derive(Serialize)]
struct BatchBody<'a> {
    bridge: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    domain: &'a str,
    messages: &'a [Envelope],
}

/// Encode envelopes sent by `role` into one transport payload.
///
/// Wire layouts:
/// ```text
/// Batch:  { "bridge": "BRHOST#2", "domain": "a", "messages": [ {..}, {..} ] }
/// Legacy: "BRHOST#[ {..}, {..} ]"
/// ```
pub fn encode_batch(
    role: Role,
    domain: &str,
    format: WireFormat,
    messages: &[Envelope],
) -> Result<Value> {
    match format {
        WireFormat::Batch => Ok(serde_json::to_value(BatchBody {
            bridge: role.marker(),
            domain,
            messages,
        })?),
        WireFormat::Legacy => {
            if !domain.is_empty() {
                return Err(FrameError::DomainUnsupported(domain.to_string()));
            }
            let body = serde_json::to_string(messages)?;
            Ok(Value::String(format!("{}{}", role.legacy_prefix(), body)))
        }
    }
}

/// Decode a transport payload expected to be sent by `sender`.
///
/// Returns `Ok(None)` for anything not stamped with `sender`'s marker: the
/// transport is shared, so foreign traffic is normal. Returns an error only
/// when the marker matches but the body is unusable.
pub fn decode_batch(raw: &Value, sender: Role, config: &FrameConfig) -> Result<Option<Batch>> {
    match raw {
        Value::Object(map) => decode_structured(map, sender, config),
        Value::String(text) => match text.strip_prefix(sender.legacy_prefix()) {
            Some(body) => {
                let values: Vec<Value> = serde_json::from_str(body)
                    .map_err(|err| FrameError::Malformed(format!("legacy body: {err}")))?;
                let messages = decode_messages(values, config)?;
                Ok(Some(Batch {
                    role: sender,
                    format: WireFormat::Legacy,
                    domain: String::new(),
                    messages,
                }))
            }
            None => Ok(None),
        },
        _ => Ok(None),
    }
}

fn decode_structured(
    map: &Map<String, Value>,
    sender: Role,
    config: &FrameConfig,
) -> Result<Option<Batch>> {
    match map.get(CHANNEL_KEY).and_then(Value::as_str) {
        Some(marker) if marker == sender.marker() => {}
        _ => return Ok(None),
    }

    let domain = match map.get("domain") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(domain)) => domain.clone(),
        Some(_) => return Err(FrameError::Malformed("domain must be a string".to_string())),
    };

    let values = match map.get("messages") {
        Some(Value::Array(values)) => values.clone(),
        Some(_) => return Err(FrameError::Malformed("messages must be an array".to_string())),
        None => return Err(FrameError::Malformed("missing messages".to_string())),
    };

    Ok(Some(Batch {
        role: sender,
        format: WireFormat::Batch,
        domain,
        messages: decode_messages(values, config)?,
    }))
}

fn decode_messages(values: Vec<Value>, config: &FrameConfig) -> Result<Vec<Envelope>> {
    if values.len() > config.max_messages {
        return Err(FrameError::TooManyMessages {
            count: values.len(),
            max: config.max_messages,
        });
    }
    values
        .into_iter()
        .map(|value| {
            serde_json::from_value(value).map_err(|err| FrameError::Malformed(err.to_string()))
        })
        .collect()
}
