//! Cross-context transport abstraction.
//!
//! Models the only primitive two isolated contexts share: an untyped,
//! unordered, fire-and-forget send plus a per-context subscription that
//! delivers `(source, payload)` pairs. Also models discovery of the nested
//! context tree that the upper layers walk to find send targets.
//!
//! This is the lowest layer of framebridge. [`LocalBus`] is an in-memory
//! binding of both contracts, used by tests, the CLI demo, and any
//! single-process embedding.

pub mod error;
pub mod local;
pub mod traits;

pub use error::{Result, TransportError};
pub use local::LocalBus;
pub use traits::{ContextId, ContextTree, Listener, ListenerId, Transport};
