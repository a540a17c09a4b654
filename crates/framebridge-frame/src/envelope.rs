use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::id::CorrelationId;

/// What an envelope means to its receiver.
///
/// A request is an `Event` that carries a correlation id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    #[default]
    Event,
    Progress,
    Response,
    Error,
}

impl EnvelopeKind {
    /// `response` and `error` close a request.
    pub fn is_terminal(self) -> bool {
        matches!(self, EnvelopeKind::Response | EnvelopeKind::Error)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeKind::Event => "event",
            EnvelopeKind::Progress => "progress",
            EnvelopeKind::Response => "response",
            EnvelopeKind::Error => "error",
        }
    }

    fn is_event(&self) -> bool {
        *self == EnvelopeKind::Event
    }
}

/// One protocol message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Creation time in milliseconds since the Unix epoch. Informational.
    #[serde(rename = "ts", default)]
    pub timestamp: u64,
    #[serde(rename = "guid", default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(rename = "type", default, skip_serializing_if = "EnvelopeKind::is_event")]
    pub kind: EnvelopeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// `None` when absent on the wire; `Some(Value::Null)` for an explicit null.
    #[serde(
        rename = "data",
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub payload: Option<Value>,
    /// Debugging identifier of the endpoint that created the request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

impl Envelope {
    /// Broadcast event with no correlation id.
    pub fn event(command: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            timestamp: now_millis(),
            correlation_id: None,
            kind: EnvelopeKind::Event,
            command: Some(command.into()),
            payload,
            tag: None,
        }
    }

    /// Correlated request. `args` become the positional payload; no args means no payload.
    pub fn request(
        id: CorrelationId,
        command: impl Into<String>,
        args: Vec<Value>,
        tag: Option<String>,
    ) -> Self {
        Self {
            timestamp: now_millis(),
            correlation_id: Some(id),
            kind: EnvelopeKind::Event,
            command: Some(command.into()),
            payload: (!args.is_empty()).then_some(Value::Array(args)),
            tag,
        }
    }

    /// Intermediate state for a pending request.
    pub fn progress(id: CorrelationId, state: Value) -> Self {
        Self::reply(id, EnvelopeKind::Progress, state)
    }

    /// Successful completion carrying ordered result values.
    pub fn response(id: CorrelationId, values: Vec<Value>) -> Self {
        Self::reply(id, EnvelopeKind::Response, Value::Array(values))
    }

    /// Failed completion.
    pub fn error(id: CorrelationId, error: Value) -> Self {
        Self::reply(id, EnvelopeKind::Error, error)
    }

    fn reply(id: CorrelationId, kind: EnvelopeKind, payload: Value) -> Self {
        Self {
            timestamp: now_millis(),
            correlation_id: Some(id),
            kind,
            command: None,
            payload: Some(payload),
            tag: None,
        }
    }

    /// A correlated envelope that asks the host to run a command.
    pub fn is_request(&self) -> bool {
        self.correlation_id.is_some() && self.kind == EnvelopeKind::Event && self.command.is_some()
    }

    /// An uncorrelated broadcast.
    pub fn is_event(&self) -> bool {
        self.correlation_id.is_none() && self.kind == EnvelopeKind::Event
    }

    /// Payload interpreted as positional arguments or result values.
    ///
    /// Absent payload yields no values; a non-array payload yields itself.
    pub fn positional(&self) -> Vec<Value> {
        match &self.payload {
            None => Vec::new(),
            Some(Value::Array(values)) => values.clone(),
            Some(other) => vec![other.clone()],
        }
    }
}

/// Milliseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn event_omits_guid_and_type() {
        let env = Envelope::event("hello", Some(json!({"x": 1})));
        let wire = serde_json::to_value(&env).unwrap();
        assert!(wire.get("guid").is_none());
        assert!(wire.get("type").is_none());
        assert_eq!(wire["command"], "hello");
        assert_eq!(wire["data"], json!({"x": 1}));
    }

    #[test]
    fn absent_and_null_payload_are_distinct() {
        let absent: Envelope = serde_json::from_value(json!({"ts": 1, "command": "a"})).unwrap();
        let null: Envelope =
            serde_json::from_value(json!({"ts": 1, "command": "a", "data": null})).unwrap();
        assert_eq!(absent.payload, None);
        assert_eq!(null.payload, Some(Value::Null));
    }

    #[test]
    fn request_without_args_has_no_payload() {
        let env = Envelope::request(CorrelationId::generate(), "ping", Vec::new(), None);
        assert!(env.payload.is_none());
        assert!(env.is_request());
        assert!(!env.is_event());
    }

    #[test]
    fn reply_kinds_serialize_lowercase() {
        let id = CorrelationId::from_wire("id-1");
        let wire = serde_json::to_value(Envelope::progress(id.clone(), json!("50%"))).unwrap();
        assert_eq!(wire["type"], "progress");
        assert_eq!(wire["guid"], "id-1");

        let wire = serde_json::to_value(Envelope::response(id, vec![json!(5)])).unwrap();
        assert_eq!(wire["type"], "response");
        assert_eq!(wire["data"], json!([5]));
    }

    #[test]
    fn positional_unwraps_arrays_only() {
        let mut env = Envelope::event("x", Some(json!([1, 2])));
        assert_eq!(env.positional(), vec![json!(1), json!(2)]);
        env.payload = Some(json!("solo"));
        assert_eq!(env.positional(), vec![json!("solo")]);
        env.payload = None;
        assert!(env.positional().is_empty());
    }

    #[test]
    fn terminal_kinds() {
        assert!(EnvelopeKind::Response.is_terminal());
        assert!(EnvelopeKind::Error.is_terminal());
        assert!(!EnvelopeKind::Progress.is_terminal());
        assert!(!EnvelopeKind::Event.is_terminal());
    }
}
