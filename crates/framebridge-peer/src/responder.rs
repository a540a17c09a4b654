use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use framebridge_frame::{CorrelationId, Envelope};
use serde::Serialize;
use serde_json::Value;

use crate::args::to_positional;
use crate::batcher::Batcher;
use crate::error::{PeerError, Result};

struct HandleInner {
    id: CorrelationId,
    command: String,
    tag: Option<String>,
    completed: Cell<bool>,
    outbound: Weak<Batcher>,
}

/// Host-side handle to one inbound request.
///
/// Open until [`respond`](Self::respond) or [`fail`](Self::fail) is called,
/// then completed for good. Clones share the same state, so a handler may
/// keep a clone and complete the request later.
#[derive(Clone)]
pub struct RequestHandle {
    inner: Rc<HandleInner>,
}

impl RequestHandle {
    pub(crate) fn new(
        id: CorrelationId,
        command: &str,
        tag: Option<String>,
        outbound: Weak<Batcher>,
    ) -> Self {
        Self {
            inner: Rc::new(HandleInner {
                id,
                command: command.to_string(),
                tag,
                completed: Cell::new(false),
                outbound,
            }),
        }
    }

    /// Correlation id of the request.
    pub fn id(&self) -> &CorrelationId {
        &self.inner.id
    }

    pub fn command(&self) -> &str {
        &self.inner.command
    }

    /// Debugging tag the client attached to the request.
    pub fn tag(&self) -> Option<&str> {
        self.inner.tag.as_deref()
    }

    pub fn is_completed(&self) -> bool {
        self.inner.completed.get()
    }

    /// Report intermediate state. The request stays open.
    #[must_use = "a completed handle rejects progress with an error"]
    pub fn progress(&self, state: Value) -> Result<()> {
        self.ensure_open("progress")?;
        self.send(Envelope::progress(self.inner.id.clone(), state))
    }

    /// Complete successfully with ordered result values.
    #[must_use = "completing a request twice is a protocol violation reported here"]
    pub fn respond(&self, values: Vec<Value>) -> Result<()> {
        self.ensure_open("respond")?;
        self.inner.completed.set(true);
        self.send(Envelope::response(self.inner.id.clone(), values))
    }

    /// Complete with an error value.
    #[must_use = "completing a request twice is a protocol violation reported here"]
    pub fn fail(&self, error: Value) -> Result<()> {
        self.ensure_open("fail")?;
        self.inner.completed.set(true);
        self.send(Envelope::error(self.inner.id.clone(), error))
    }

    /// [`respond`](Self::respond) with values serialized from `values`.
    ///
    /// A tuple gives several result values; `()` gives none.
    #[must_use = "completing a request twice is a protocol violation reported here"]
    pub fn respond_with<V: Serialize>(&self, values: V) -> Result<()> {
        self.ensure_open("respond")?;
        let values = to_positional(values)?;
        self.respond(values)
    }

    /// [`progress`](Self::progress) with a serialized state.
    #[must_use = "a completed handle rejects progress with an error"]
    pub fn progress_with<S: Serialize>(&self, state: S) -> Result<()> {
        self.ensure_open("progress")?;
        let state = serde_json::to_value(state)?;
        self.progress(state)
    }

    fn ensure_open(&self, attempted: &'static str) -> Result<()> {
        if self.inner.completed.get() {
            tracing::error!(
                correlation_id = %self.inner.id,
                command = %self.inner.command,
                attempted,
                "request handle used after completion"
            );
            return Err(PeerError::AlreadyCompleted {
                correlation_id: self.inner.id.clone(),
                attempted,
            });
        }
        Ok(())
    }

    fn send(&self, envelope: Envelope) -> Result<()> {
        match self.inner.outbound.upgrade() {
            Some(batcher) => batcher.enqueue(envelope),
            None => Err(PeerError::Shutdown),
        }
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.inner.id)
            .field("command", &self.inner.command)
            .field("completed", &self.inner.completed.get())
            .finish()
    }
}
