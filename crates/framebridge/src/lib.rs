//! Batched request/response and event broadcast between isolated contexts.
//!
//! framebridge lets code in one context call commands served by a host in
//! another context and listen for the host's broadcast events, over nothing
//! more than a best-effort, fire-and-forget message primitive.
//!
//! # Crate Structure
//!
//! - [`transport`]: transport and context-tree contracts, plus the in-memory `LocalBus`
//! - [`frame`]: envelopes, correlation ids and the batch wire codec
//! - [`schema`]: optional per-command JSON Schema validation (behind `schema` feature)
//! - [`peer`]: host and client endpoints, batching and tree walking (behind `peer` feature)
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "peer")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::rc::Rc;
//!
//! use framebridge::peer::{Client, EndpointConfig, Host, Outcome};
//! use framebridge::transport::LocalBus;
//! use serde_json::json;
//!
//! let bus = Rc::new(LocalBus::new());
//! let top = bus.add_root("top");
//! let frame = bus.add_child(top, "frame")?;
//!
//! let host = Host::bind(Rc::clone(&bus), top, EndpointConfig::default())?;
//! host.on_request("add", |handle, args| {
//!     let total: i64 = args.iter().filter_map(|v| v.as_i64()).sum();
//!     let _ = handle.respond(vec![json!(total)]);
//! })?;
//!
//! let client = Client::connect(Rc::clone(&bus), frame, EndpointConfig::default())?;
//! let pending = client.request("add", vec![json!(2), json!(3)])?;
//!
//! client.flush()?;
//! bus.pump();
//! host.flush()?;
//! bus.pump();
//!
//! assert_eq!(pending.outcome(), Some(Outcome::Success(vec![json!(5)])));
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "peer"))]
//! # fn main() {}
//! ```

/// Re-export transport types.
pub mod transport {
    pub use framebridge_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framebridge_frame::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use framebridge_schema::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use framebridge_peer::*;
}
