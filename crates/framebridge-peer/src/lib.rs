//! Correlated request/response and event broadcast between contexts.
//!
//! This is the "just works" layer. A [`Host`] registers command handlers and
//! broadcasts events; a [`Client`] issues requests and listens for events.
//! Both sides batch outgoing envelopes per flush tick and walk the context
//! tree afresh on every flush, so contexts may come and go at any time.
//!
//! Everything here is single-threaded: endpoints are `!Send` and are driven
//! by transport deliveries plus flush ticks (manual via `tick`/`flush`, or a
//! [`FlushTimer`] such as `TokioTimer` with the `async` feature).

pub mod args;
pub mod batcher;
pub mod client;
pub mod config;
mod endpoint;
pub mod error;
pub mod handlers;
pub mod host;
pub mod pending;
pub mod responder;
#[cfg(feature = "async")]
pub mod timer;
pub mod walker;

pub use batcher::{Batcher, FlushTimer};
pub use client::Client;
pub use config::{Discovery, EndpointConfig, HandlerPolicy, DEFAULT_GATHER, MAX_GATHER, MIN_GATHER};
pub use error::{PeerError, Result};
pub use handlers::HandlerId;
pub use host::Host;
pub use pending::{Outcome, PendingRequest};
pub use responder::RequestHandle;
#[cfg(feature = "async")]
pub use timer::TokioTimer;
pub use walker::discover_targets;
