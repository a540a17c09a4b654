use std::cell::RefCell;
use std::rc::Rc;
#[cfg(feature = "schema")]
use std::sync::Arc;
use std::time::{Duration, Instant};

use framebridge_frame::{Envelope, Role};
use framebridge_transport::{ContextId, ContextTree, Transport};
use serde::Serialize;
use serde_json::Value;

use crate::batcher::FlushTimer;
use crate::config::EndpointConfig;
use crate::endpoint::EndpointCore;
use crate::error::Result;
use crate::handlers::{HandlerId, HandlerTable, Shared};
use crate::responder::RequestHandle;

type RequestHandler = dyn FnMut(RequestHandle, &[Value]);

struct HostInner {
    core: EndpointCore,
    handlers: RefCell<HandlerTable<RequestHandler>>,
    #[cfg(feature = "schema")]
    schemas: RefCell<Option<Arc<framebridge_schema::SchemaRegistry>>>,
}

/// Serves client requests and broadcasts events.
///
/// Each inbound request reaches the handlers registered for its command
/// together with a [`RequestHandle`] bound to that request. A request for a
/// command with no handler is dropped and never answered.
#[derive(Clone)]
pub struct Host {
    inner: Rc<HostInner>,
}

impl Host {
    /// Create a host living in `context` and start listening there.
    pub fn bind<L>(link: Rc<L>, context: ContextId, config: EndpointConfig) -> Result<Self>
    where
        L: Transport + ContextTree + 'static,
    {
        let core = EndpointCore::new(Role::Host, link, context, &config)?;
        let inner = Rc::new(HostInner {
            core,
            handlers: RefCell::new(HandlerTable::new(config.handlers)),
            #[cfg(feature = "schema")]
            schemas: RefCell::new(None),
        });

        let weak = Rc::downgrade(&inner);
        inner.core.listen(Box::new(move |source, raw| {
            if let Some(inner) = weak.upgrade() {
                inner.receive(source, raw);
            }
        }))?;

        Ok(Self { inner })
    }

    /// Schedule flushes with `timer` instead of relying on [`tick`](Self::tick).
    pub fn with_timer(self, timer: Rc<dyn FlushTimer>) -> Self {
        self.inner.core.set_timer(timer);
        self
    }

    /// Validate request arguments against per-command schemas.
    ///
    /// A request that fails validation is failed with
    /// `{"error": "<reason>"}` and never reaches a handler.
    #[cfg(feature = "schema")]
    pub fn with_schema_registry(self, registry: Arc<framebridge_schema::SchemaRegistry>) -> Self {
        *self.inner.schemas.borrow_mut() = Some(registry);
        self
    }

    /// Register `handler` for requests of `command`.
    pub fn on_request(
        &self,
        command: &str,
        handler: impl FnMut(RequestHandle, &[Value]) + 'static,
    ) -> Result<HandlerId> {
        self.inner.core.ensure_open()?;
        let handler: Shared<RequestHandler> = Rc::new(RefCell::new(handler));
        Ok(self.inner.handlers.borrow_mut().insert(command, handler))
    }

    /// Remove every handler for `command`. Returns how many were removed.
    pub fn remove_request(&self, command: &str) -> usize {
        self.inner.handlers.borrow_mut().remove_command(command)
    }

    pub fn remove_handler(&self, id: HandlerId) -> bool {
        self.inner.handlers.borrow_mut().remove(id)
    }

    /// Broadcast `command` to every client with the next flush.
    pub fn dispatch(&self, command: &str, payload: Option<Value>) -> Result<()> {
        self.inner.core.ensure_open()?;
        self.inner
            .core
            .batcher()
            .enqueue(Envelope::event(command, payload))?;
        tracing::trace!(command, "event queued");
        Ok(())
    }

    /// [`dispatch`](Self::dispatch) with a serialized payload; `()` sends none.
    pub fn dispatch_with<P: Serialize>(&self, command: &str, payload: P) -> Result<()> {
        let payload = match serde_json::to_value(payload)? {
            Value::Null => None,
            value => Some(value),
        };
        self.dispatch(command, payload)
    }

    /// Envelopes waiting for the next flush.
    pub fn queued(&self) -> usize {
        self.inner.core.batcher().queued()
    }

    /// Send queued envelopes now. Returns how many were sent.
    pub fn flush(&self) -> Result<usize> {
        self.inner.core.batcher().flush()
    }

    /// Flush if the scheduled deadline passed by `now`.
    pub fn tick(&self, now: Instant) -> Result<usize> {
        self.inner.core.batcher().tick(now)
    }

    pub fn next_flush_at(&self) -> Option<Instant> {
        self.inner.core.batcher().next_flush_at()
    }

    pub fn context(&self) -> ContextId {
        self.inner.core.context()
    }

    pub fn domain(&self) -> String {
        self.inner.core.domain()
    }

    pub fn set_domain(&self, domain: impl Into<String>) -> Result<()> {
        self.inner.core.set_domain(domain.into())
    }

    pub fn gather(&self) -> Duration {
        self.inner.core.gather()
    }

    /// Change the flush interval; clamped to [`MIN_GATHER`](crate::MIN_GATHER)..=[`MAX_GATHER`](crate::MAX_GATHER).
    pub fn set_gather(&self, gather: Duration) {
        self.inner.core.set_gather(gather);
    }

    /// Stop listening, discard queued envelopes and release all handlers.
    ///
    /// Handles held by handlers report [`PeerError::Shutdown`](crate::PeerError::Shutdown).
    pub fn shutdown(&self) {
        if self.inner.core.shutdown() {
            self.inner.handlers.borrow_mut().clear();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.core.ensure_open().is_err()
    }
}

impl HostInner {
    fn receive(&self, source: ContextId, raw: &Value) {
        let Some(batch) = self.core.accept(source, raw) else {
            return;
        };
        tracing::trace!(%source, messages = batch.messages.len(), "host batch");

        for message in batch.messages {
            if self.core.ensure_open().is_err() {
                return;
            }
            if !message.is_request() {
                tracing::trace!(kind = message.kind.as_str(), "non-request envelope ignored by host");
                continue;
            }
            self.serve(message);
        }
    }

    fn serve(&self, request: Envelope) {
        let args = request.positional();
        let (Some(id), Some(command)) = (request.correlation_id, request.command) else {
            return;
        };

        let handlers = self.handlers.borrow().resolve(&command);
        if handlers.is_empty() {
            tracing::debug!(command = %command, correlation_id = %id, "no handler registered; request dropped");
            return;
        }

        let handle = RequestHandle::new(
            id,
            &command,
            request.tag,
            Rc::downgrade(self.core.batcher()),
        );

        if let Some(reason) = self.schema_rejection(&command, &args) {
            tracing::warn!(command = %command, correlation_id = %handle.id(), reason = %reason, "request rejected by schema");
            if let Err(err) = handle.fail(serde_json::json!({ "error": reason })) {
                tracing::warn!(error = %err, "could not report schema rejection");
            }
            return;
        }

        tracing::debug!(command = %command, correlation_id = %handle.id(), tag = ?handle.tag(), "serving request");
        for handler in handlers {
            match handler.try_borrow_mut() {
                Ok(mut handler) => (handler)(handle.clone(), &args),
                Err(_) => tracing::debug!(command = %command, "request handler re-entered; skipped"),
            }
        }
    }

    #[cfg(feature = "schema")]
    fn schema_rejection(&self, command: &str, args: &[Value]) -> Option<String> {
        let registry = self.schemas.borrow().clone()?;
        registry
            .validate(command, args)
            .err()
            .map(|err| err.to_string())
    }

    #[cfg(not(feature = "schema"))]
    fn schema_rejection(&self, _command: &str, _args: &[Value]) -> Option<String> {
        None
    }
}

impl Drop for HostInner {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}
