use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use framebridge_frame::{decode_batch, Batch, FrameConfig, Role, WireFormat};
use framebridge_transport::{ContextId, ContextTree, Listener, ListenerId, Transport};
use serde_json::Value;

use crate::batcher::{Batcher, FlushTimer};
use crate::config::{check_domain, EndpointConfig};
use crate::error::{PeerError, Result};

/// State shared by host and client endpoints: the transport subscription,
/// the outgoing batcher and the inbound batch filter.
pub(crate) struct EndpointCore {
    role: Role,
    context: ContextId,
    tag: Option<String>,
    transport: Rc<dyn Transport>,
    batcher: Rc<Batcher>,
    frame: FrameConfig,
    wire: WireFormat,
    listener: Cell<Option<ListenerId>>,
}

impl EndpointCore {
    pub(crate) fn new<L>(
        role: Role,
        link: Rc<L>,
        context: ContextId,
        config: &EndpointConfig,
    ) -> Result<Self>
    where
        L: Transport + ContextTree + 'static,
    {
        config.validate()?;
        let transport: Rc<dyn Transport> = link.clone();
        let tree: Rc<dyn ContextTree> = link;
        let batcher = Batcher::new(role, context, Rc::clone(&transport), tree, config);
        Ok(Self {
            role,
            context,
            tag: config.tag.clone(),
            transport,
            batcher,
            frame: config.frame.clone(),
            wire: config.wire,
            listener: Cell::new(None),
        })
    }

    /// Subscribe `listener` to deliveries in this endpoint's context.
    pub(crate) fn listen(&self, listener: Listener) -> Result<()> {
        let id = self.transport.subscribe(self.context, listener)?;
        self.listener.set(Some(id));
        tracing::debug!(role = %self.role, context = %self.context, listener = %id, "endpoint listening");
        Ok(())
    }

    /// Accept `raw` only if it is a well-formed batch from the peer role in
    /// this endpoint's domain.
    pub(crate) fn accept(&self, source: ContextId, raw: &Value) -> Option<Batch> {
        match decode_batch(raw, self.role.peer(), &self.frame) {
            Ok(Some(batch)) => {
                let domain = self.batcher.domain();
                if batch.domain == domain {
                    Some(batch)
                } else {
                    tracing::trace!(%source, theirs = %batch.domain, ours = %domain, "batch from other domain ignored");
                    None
                }
            }
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(%source, error = %err, "dropping malformed batch");
                None
            }
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn context(&self) -> ContextId {
        self.context
    }

    pub(crate) fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub(crate) fn batcher(&self) -> &Rc<Batcher> {
        &self.batcher
    }

    pub(crate) fn set_timer(&self, timer: Rc<dyn FlushTimer>) {
        self.batcher.set_timer(timer);
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.batcher.is_closed() {
            Err(PeerError::Shutdown)
        } else {
            Ok(())
        }
    }

    pub(crate) fn domain(&self) -> String {
        self.batcher.domain()
    }

    pub(crate) fn set_domain(&self, domain: String) -> Result<()> {
        check_domain(self.wire, &domain)?;
        self.batcher.set_domain(domain);
        Ok(())
    }

    pub(crate) fn gather(&self) -> Duration {
        self.batcher.gather()
    }

    pub(crate) fn set_gather(&self, gather: Duration) {
        self.batcher.set_gather(gather);
    }

    /// Stop listening and discard the outgoing queue. Returns false if
    /// already shut down.
    pub(crate) fn shutdown(&self) -> bool {
        if self.batcher.is_closed() {
            return false;
        }
        self.batcher.close();
        if let Some(id) = self.listener.take() {
            if let Err(err) = self.transport.unsubscribe(id) {
                tracing::debug!(listener = %id, error = %err, "unsubscribe on shutdown failed");
            }
        }
        tracing::debug!(role = %self.role, context = %self.context, "endpoint shut down");
        true
    }
}
