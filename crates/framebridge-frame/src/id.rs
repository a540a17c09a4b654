use std::fmt;

use serde::{Deserialize, Serialize};

/// Length of the canonical `8-4-4-4-12` token.
pub const ID_LEN: usize = 36;

/// Token linking a request to its progress/response/error envelopes.
///
/// Generated ids are RFC 4122 version-4 shaped. Ids received from the wire
/// are treated as opaque and are not required to have that shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Produce a fresh id from a fast, non-cryptographic random source.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().hyphenated().to_string())
    }

    /// Wrap a token exactly as received.
    pub fn from_wire(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parse a token, requiring the canonical version-4 shape.
    pub fn parse(raw: &str) -> Option<Self> {
        is_canonical(raw).then(|| Self(raw.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `raw` is `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx` with `y` in `8..=b`.
pub fn is_canonical(raw: &str) -> bool {
    let bytes = raw.as_bytes();
    if bytes.len() != ID_LEN {
        return false;
    }
    for (idx, byte) in bytes.iter().enumerate() {
        let ok = match idx {
            8 | 13 | 18 | 23 => *byte == b'-',
            14 => *byte == b'4',
            19 => matches!(byte.to_ascii_lowercase(), b'8' | b'9' | b'a' | b'b'),
            _ => byte.is_ascii_hexdigit(),
        };
        if !ok {
            return false;
        }
    }
    true
}
