use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use serde_json::Value;

use crate::error::{Result, TransportError};
use crate::traits::{ContextId, ContextTree, Listener, ListenerId, Transport};

struct ContextNode {
    name: String,
    parent: Option<ContextId>,
    children: Vec<ContextId>,
    relay: Option<ContextId>,
    restricted: bool,
}

struct Subscription {
    context: ContextId,
    listener: Rc<RefCell<Listener>>,
}

struct Delivery {
    source: ContextId,
    target: ContextId,
    payload: Value,
}

#[derive(Default)]
struct BusState {
    next_context: u64,
    next_listener: u64,
    contexts: BTreeMap<ContextId, ContextNode>,
    listeners: BTreeMap<ListenerId, Subscription>,
    in_flight: VecDeque<Delivery>,
    delivered: u64,
    dropped: u64,
}

/// In-memory transport and context tree.
///
/// `send` only queues; nothing is delivered until [`LocalBus::pump`] runs,
/// so the sender never observes its own message synchronously. Contexts can
/// be added and removed at any time between pumps.
#[derive(Default)]
pub struct LocalBus {
    state: RefCell<BusState>,
    pumping: Cell<bool>,
}

impl LocalBus {
    /// Create an empty bus with no contexts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new top-level context.
    pub fn add_root(&self, name: &str) -> ContextId {
        let mut state = self.state.borrow_mut();
        let id = state.allocate_context();
        state.contexts.insert(id, ContextNode::new(name, None));
        id
    }

    /// Create a sub-context nested in `parent`, appended after its siblings.
    pub fn add_child(&self, parent: ContextId, name: &str) -> Result<ContextId> {
        let mut state = self.state.borrow_mut();
        if !state.contexts.contains_key(&parent) {
            return Err(TransportError::UnknownContext(parent));
        }
        let id = state.allocate_context();
        state.contexts.insert(id, ContextNode::new(name, Some(parent)));
        if let Some(node) = state.contexts.get_mut(&parent) {
            node.children.push(id);
        }
        Ok(id)
    }

    /// Tear down `context` and every context nested in it.
    ///
    /// Listeners in removed contexts are dropped and queued deliveries to
    /// them are discarded when pumped.
    pub fn remove(&self, context: ContextId) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let parent = match state.contexts.get(&context) {
            Some(node) => node.parent,
            None => return Err(TransportError::UnknownContext(context)),
        };

        if let Some(parent) = parent.and_then(|p| state.contexts.get_mut(&p)) {
            parent.children.retain(|child| *child != context);
            if parent.relay == Some(context) {
                parent.relay = None;
            }
        }

        let mut stack = vec![context];
        let mut removed = Vec::new();
        while let Some(id) = stack.pop() {
            if let Some(node) = state.contexts.remove(&id) {
                stack.extend(node.children);
                removed.push(id);
            }
        }
        state
            .listeners
            .retain(|_, subscription| !removed.contains(&subscription.context));

        tracing::debug!(%context, removed = removed.len(), "contexts torn down");
        Ok(())
    }

    /// Tag `relay` as the relay sub-context of `context`, or clear the tag.
    pub fn set_relay(&self, context: ContextId, relay: Option<ContextId>) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some(relay) = relay {
            if !state.contexts.contains_key(&relay) {
                return Err(TransportError::UnknownContext(relay));
            }
        }
        let node = state
            .contexts
            .get_mut(&context)
            .ok_or(TransportError::UnknownContext(context))?;
        node.relay = relay;
        Ok(())
    }

    /// Make relay inspection of `context` fail, as an isolation boundary would.
    pub fn restrict(&self, context: ContextId, restricted: bool) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let node = state
            .contexts
            .get_mut(&context)
            .ok_or(TransportError::UnknownContext(context))?;
        node.restricted = restricted;
        Ok(())
    }

    /// Human-readable name given at creation.
    pub fn name(&self, context: ContextId) -> Option<String> {
        self.state
            .borrow()
            .contexts
            .get(&context)
            .map(|node| node.name.clone())
    }

    /// Whether `context` currently exists.
    pub fn contains(&self, context: ContextId) -> bool {
        self.state.borrow().contexts.contains_key(&context)
    }

    /// Number of messages queued and not yet pumped.
    pub fn in_flight(&self) -> usize {
        self.state.borrow().in_flight.len()
    }

    /// Total messages handed to at least one listener so far.
    pub fn delivered(&self) -> u64 {
        self.state.borrow().delivered
    }

    /// Total messages dropped because the target context was gone.
    pub fn dropped(&self) -> u64 {
        self.state.borrow().dropped
    }

    /// Deliver every message queued before this call.
    ///
    /// Messages sent by listeners while pumping wait for the next pump.
    /// Returns the number of messages taken off the queue. Re-entrant calls
    /// from inside a listener return 0.
    pub fn pump(&self) -> usize {
        if self.pumping.replace(true) {
            return 0;
        }

        let batch: Vec<Delivery> = self.state.borrow_mut().in_flight.drain(..).collect();
        let count = batch.len();
        for delivery in batch {
            self.deliver(delivery);
        }

        self.pumping.set(false);
        count
    }

    fn deliver(&self, delivery: Delivery) {
        let targets: Vec<(ListenerId, Rc<RefCell<Listener>>)> = {
            let mut state = self.state.borrow_mut();
            if !state.contexts.contains_key(&delivery.target) {
                state.dropped += 1;
                tracing::trace!(target_context = %delivery.target, "dropping message to torn-down context");
                return;
            }
            state.delivered += 1;
            state
                .listeners
                .iter()
                .filter(|(_, subscription)| subscription.context == delivery.target)
                .map(|(id, subscription)| (*id, Rc::clone(&subscription.listener)))
                .collect()
        };

        for (id, listener) in targets {
            // A listener removed by an earlier listener in this round must not fire.
            if !self.state.borrow().listeners.contains_key(&id) {
                continue;
            }
            if let Ok(mut listener) = listener.try_borrow_mut() {
                (listener)(delivery.source, &delivery.payload);
            }
        }
    }
}

impl BusState {
    fn allocate_context(&mut self) -> ContextId {
        self.next_context += 1;
        ContextId::new(self.next_context)
    }
}

impl ContextNode {
    fn new(name: &str, parent: Option<ContextId>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            relay: None,
            restricted: false,
        }
    }
}

impl Transport for LocalBus {
    fn subscribe(&self, context: ContextId, listener: Listener) -> Result<ListenerId> {
        let mut state = self.state.borrow_mut();
        if !state.contexts.contains_key(&context) {
            return Err(TransportError::UnknownContext(context));
        }
        state.next_listener += 1;
        let id = ListenerId::new(state.next_listener);
        state.listeners.insert(
            id,
            Subscription {
                context,
                listener: Rc::new(RefCell::new(listener)),
            },
        );
        Ok(id)
    }

    fn unsubscribe(&self, listener: ListenerId) -> Result<()> {
        self.state
            .borrow_mut()
            .listeners
            .remove(&listener)
            .map(|_| ())
            .ok_or(TransportError::UnknownListener(listener))
    }

    fn send(&self, source: ContextId, target: ContextId, payload: Value) -> Result<()> {
        self.state.borrow_mut().in_flight.push_back(Delivery {
            source,
            target,
            payload,
        });
        Ok(())
    }
}

impl ContextTree for LocalBus {
    fn parent(&self, context: ContextId) -> Option<ContextId> {
        self.state
            .borrow()
            .contexts
            .get(&context)
            .and_then(|node| node.parent)
    }

    fn children(&self, context: ContextId) -> Vec<ContextId> {
        self.state
            .borrow()
            .contexts
            .get(&context)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    fn relay_of(&self, context: ContextId) -> Result<Option<ContextId>> {
        let state = self.state.borrow();
        match state.contexts.get(&context) {
            Some(node) if node.restricted => Err(TransportError::AccessDenied(context)),
            Some(node) => Ok(node.relay),
            None => Ok(None),
        }
    }
}
