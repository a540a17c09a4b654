use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::error::Result;

/// Opaque identifier of one isolated execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    /// Wrap a raw context number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw context number.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

/// Handle returned by [`Transport::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Wrap a raw listener number.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Callback receiving `(source context, raw payload)` for every delivered message.
pub type Listener = Box<dyn FnMut(ContextId, &Value)>;

/// Best-effort, unordered, fire-and-forget message primitive.
///
/// Implementations never acknowledge delivery. Sending to a context that has
/// been torn down is not an error: the message is silently dropped.
pub trait Transport {
    /// Register a listener for messages delivered to `context`.
    fn subscribe(&self, context: ContextId, listener: Listener) -> Result<ListenerId>;

    /// Remove a previously registered listener.
    fn unsubscribe(&self, listener: ListenerId) -> Result<()>;

    /// Queue `payload` for delivery from `source` to `target`. Never blocks.
    fn send(&self, source: ContextId, target: ContextId, payload: Value) -> Result<()>;
}

/// Read-only view of the externally owned context hierarchy.
pub trait ContextTree {
    /// The enclosing context, or `None` for a top-level context.
    fn parent(&self, context: ContextId) -> Option<ContextId>;

    /// Direct sub-contexts in document order. Unknown contexts have none.
    fn children(&self, context: ContextId) -> Vec<ContextId>;

    /// The designated relay sub-context of `context`, if one is tagged.
    ///
    /// May fail with [`TransportError::AccessDenied`](crate::TransportError::AccessDenied)
    /// when the context refuses inspection.
    fn relay_of(&self, context: ContextId) -> Result<Option<ContextId>>;

    /// The top-level context of the hierarchy containing `context`.
    fn root_of(&self, context: ContextId) -> ContextId {
        let mut seen = HashSet::new();
        let mut current = context;
        while seen.insert(current) {
            match self.parent(current) {
                Some(parent) => current = parent,
                None => break,
            }
        }
        current
    }
}
