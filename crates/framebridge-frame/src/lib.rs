//! Wire schema for framebridge traffic.
//!
//! Every cross-context send carries one batch: a marker identifying the
//! sending role, an optional scoping domain, and an ordered list of
//! envelopes. Two encodings exist:
//! - Batch: a JSON object `{ "bridge": <marker>, "domain"?: .., "messages": [..] }`
//! - Legacy: a string `<prefix>` followed by the JSON-encoded envelope array
//!
//! Anything without the expected marker is foreign traffic and decodes to
//! `None`, never to an error.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod id;
pub mod role;

pub use codec::{decode_batch, encode_batch, Batch, FrameConfig, WireFormat, DEFAULT_MAX_MESSAGES};
pub use envelope::{now_millis, Envelope, EnvelopeKind};
pub use error::{FrameError, Result};
pub use id::CorrelationId;
pub use role::{Role, CHANNEL_KEY};
