use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use framebridge_frame::{CorrelationId, Envelope, EnvelopeKind, Role};
use framebridge_transport::{ContextId, ContextTree, Transport};
use serde::Serialize;
use serde_json::Value;

use crate::args::to_positional;
use crate::batcher::FlushTimer;
use crate::config::EndpointConfig;
use crate::endpoint::EndpointCore;
use crate::error::{PeerError, Result};
use crate::handlers::{HandlerId, HandlerTable, Shared};
use crate::pending::{Outcome, PendingRequest, RequestSlot};

type EventHandler = dyn FnMut(Option<&Value>);
type AnyEventHandler = dyn FnMut(&str, Option<&Value>);

struct ClientState {
    events: HandlerTable<EventHandler>,
    any: Vec<(HandlerId, Shared<AnyEventHandler>)>,
    pending: HashMap<CorrelationId, Rc<RequestSlot>>,
}

struct ClientInner {
    core: EndpointCore,
    state: RefCell<ClientState>,
    request_timeout: Option<Duration>,
}

/// Issues requests to hosts and listens for their broadcast events.
///
/// Clones share one endpoint. Dropping the last clone unsubscribes it from
/// the transport; [`shutdown`](Self::shutdown) does so explicitly and also
/// releases every registered handler and pending request.
#[derive(Clone)]
pub struct Client {
    inner: Rc<ClientInner>,
}

impl Client {
    /// Create a client living in `context` and start listening there.
    pub fn connect<L>(link: Rc<L>, context: ContextId, config: EndpointConfig) -> Result<Self>
    where
        L: Transport + ContextTree + 'static,
    {
        let core = EndpointCore::new(Role::Client, link, context, &config)?;
        let inner = Rc::new(ClientInner {
            core,
            state: RefCell::new(ClientState {
                events: HandlerTable::new(config.handlers),
                any: Vec::new(),
                pending: HashMap::new(),
            }),
            request_timeout: config.request_timeout,
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

    /// Send `command` with positional `args`. Never blocks.
    ///
    /// The request leaves with the next flush. The returned handle completes
    /// when a host responds or fails it; with no listening host it stays
    /// pending unless a request timeout is configured.
    pub fn request(&self, command: &str, args: Vec<Value>) -> Result<PendingRequest> {
        self.inner.core.ensure_open()?;
        let id = CorrelationId::generate();
        let slot = RequestSlot::new(id.clone(), command);
        self.inner
            .state
            .borrow_mut()
            .pending
            .insert(id.clone(), Rc::clone(&slot));

        let tag = self.inner.core.tag().map(str::to_string);
        if let Err(err) = self
            .inner
            .core
            .batcher()
            .enqueue(Envelope::request(id.clone(), command, args, tag))
        {
            self.inner.state.borrow_mut().pending.remove(&id);
            return Err(err);
        }

        tracing::debug!(command, correlation_id = %id, "request queued");
        Ok(PendingRequest::new(slot))
    }

    /// [`request`](Self::request) with arguments serialized from `args`.
    ///
    /// A tuple or sequence gives several arguments, `()` gives none, and any
    /// other value is a single argument.
    pub fn request_with<A: Serialize>(&self, command: &str, args: A) -> Result<PendingRequest> {
        let args = to_positional(args)?;
        self.request(command, args)
    }

    /// Register `handler` for broadcasts of `command`.
    ///
    /// The handler receives `None` when the event carries no payload.
    pub fn on_event(
        &self,
        command: &str,
        handler: impl FnMut(Option<&Value>) + 'static,
    ) -> Result<HandlerId> {
        self.inner.core.ensure_open()?;
        let handler: Shared<EventHandler> = Rc::new(RefCell::new(handler));
        Ok(self.inner.state.borrow_mut().events.insert(command, handler))
    }

    /// Remove every handler for `command`. Returns how many were removed.
    pub fn remove_event(&self, command: &str) -> usize {
        self.inner.state.borrow_mut().events.remove_command(command)
    }

    /// Observe every broadcast, after the command's own handlers.
    pub fn on_any_event(
        &self,
        handler: impl FnMut(&str, Option<&Value>) + 'static,
    ) -> Result<HandlerId> {
        self.inner.core.ensure_open()?;
        let mut state = self.inner.state.borrow_mut();
        let id = state.events.allocate_id();
        state.any.push((id, Rc::new(RefCell::new(handler))));
        Ok(id)
    }

    /// Remove one registration made by `on_event` or `on_any_event`.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut state = self.inner.state.borrow_mut();
        let before = state.any.len();
        state.any.retain(|(entry, _)| *entry != id);
        state.any.len() != before || state.events.remove(id)
    }

    /// Requests still waiting for a terminal envelope.
    pub fn pending_count(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    /// Envelopes waiting for the next flush.
    pub fn queued(&self) -> usize {
        self.inner.core.batcher().queued()
    }

    /// Send queued envelopes now. Returns how many were sent.
    pub fn flush(&self) -> Result<usize> {
        self.inner.core.batcher().flush()
    }

    /// Expire timed-out requests, then flush if the scheduled deadline passed.
    pub fn tick(&self, now: Instant) -> Result<usize> {
        self.inner.expire(now);
        self.inner.core.batcher().tick(now)
    }

    pub fn next_flush_at(&self) -> Option<Instant> {
        self.inner.core.batcher().next_flush_at()
    }

    pub fn tag(&self) -> Option<&str> {
        self.inner.core.tag()
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

    /// Stop listening and release all tables.
    ///
    /// Pending requests are dropped without a callback.
    pub fn shutdown(&self) {
        if self.inner.core.shutdown() {
            let mut state = self.inner.state.borrow_mut();
            let abandoned = state.pending.len();
            state.pending.clear();
            state.events.clear();
            state.any.clear();
            tracing::debug!(abandoned, "client released");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.core.ensure_open().is_err()
    }
}

impl ClientInner {
    fn receive(&self, source: ContextId, raw: &Value) {
        let Some(batch) = self.core.accept(source, raw) else {
            return;
        };
        tracing::trace!(%source, messages = batch.messages.len(), "client batch");

        let (events, replies): (Vec<Envelope>, Vec<Envelope>) = batch
            .messages
            .into_iter()
            .partition(|message| message.correlation_id.is_none());

        for event in events {
            if self.core.ensure_open().is_err() {
                return;
            }
            self.dispatch_event(event);
        }
        for reply in replies {
            if self.core.ensure_open().is_err() {
                return;
            }
            self.apply_reply(reply);
        }
    }

    fn dispatch_event(&self, event: Envelope) {
        let Some(command) = event.command.as_deref() else {
            tracing::trace!("event without command ignored");
            return;
        };
        let payload = event.payload.as_ref();

        let (handlers, observers) = {
            let state = self.state.borrow();
            let observers: Vec<Shared<AnyEventHandler>> =
                state.any.iter().map(|(_, h)| Rc::clone(h)).collect();
            (state.events.resolve(command), observers)
        };
        if handlers.is_empty() && observers.is_empty() {
            tracing::trace!(command, "no handler for event");
        }

        for handler in handlers {
            match handler.try_borrow_mut() {
                Ok(mut handler) => (handler)(payload),
                Err(_) => tracing::debug!(command, "event handler re-entered; skipped"),
            }
        }
        for observer in observers {
            if let Ok(mut observer) = observer.try_borrow_mut() {
                (observer)(command, payload);
            }
        }
    }

    fn apply_reply(&self, reply: Envelope) {
        let Some(id) = reply.correlation_id.clone() else {
            return;
        };

        match reply.kind {
            EnvelopeKind::Progress => {
                let slot = self.state.borrow().pending.get(&id).cloned();
                match slot {
                    Some(slot) => slot.progress(reply.payload.as_ref().unwrap_or(&Value::Null)),
                    None => tracing::trace!(correlation_id = %id, "progress for unknown request"),
                }
            }
            EnvelopeKind::Response | EnvelopeKind::Error => {
                let slot = self.state.borrow_mut().pending.remove(&id);
                let Some(slot) = slot else {
                    tracing::trace!(correlation_id = %id, "reply for unknown or completed request");
                    return;
                };
                let outcome = if reply.kind == EnvelopeKind::Response {
                    Outcome::Success(reply.positional())
                } else {
                    Outcome::Failure(reply.payload.unwrap_or(Value::Null))
                };
                tracing::debug!(correlation_id = %id, success = outcome.is_success(), "request completed");
                slot.complete(outcome);
            }
            EnvelopeKind::Event => {
                tracing::trace!(correlation_id = %id, "correlated event ignored by client");
            }
        }
    }

    fn expire(&self, now: Instant) {
        let Some(timeout) = self.request_timeout else {
            return;
        };
        let expired: Vec<Rc<RequestSlot>> = {
            let mut state = self.state.borrow_mut();
            let ids: Vec<CorrelationId> = state
                .pending
                .iter()
                .filter(|(_, slot)| {
                    slot.issued_at()
                        .checked_add(timeout)
                        .is_some_and(|deadline| deadline <= now)
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| state.pending.remove(id))
                .collect()
        };
        for slot in expired {
            let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
            tracing::debug!(timeout_ms, "request timed out");
            slot.complete(Outcome::TimedOut);
        }
    }
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.core.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use framebridge_frame::{encode_batch, WireFormat};
    use framebridge_transport::LocalBus;
    use serde_json::json;

    use super::*;
    use crate::config::HandlerPolicy;

    struct Fixture {
        bus: Rc<LocalBus>,
        top: ContextId,
        client: Client,
    }

    fn fixture(config: EndpointConfig) -> Fixture {
        let bus = Rc::new(LocalBus::new());
        let top = bus.add_root("top");
        let frame = bus.add_child(top, "frame").unwrap();
        let client = Client::connect(Rc::clone(&bus), frame, config).unwrap();
        Fixture { bus, top, client }
    }

    impl Fixture {
        /// Deliver envelopes to the client as if a host in the top context sent them.
        fn host_sends(&self, messages: &[Envelope]) {
            let raw = encode_batch(Role::Host, &self.client.domain(), WireFormat::Batch, messages)
                .unwrap();
            self.bus.send(self.top, self.client.context(), raw).unwrap();
            self.bus.pump();
        }
    }

    #[test]
    fn request_is_queued_not_sent() {
        let fx = fixture(EndpointConfig::default().with_tag("tester"));
        let pending = fx.client.request("add", vec![json!(2), json!(3)]).unwrap();
        assert_eq!(fx.client.queued(), 1);
        assert_eq!(fx.client.pending_count(), 1);
        assert_eq!(fx.bus.in_flight(), 0);
        assert!(!pending.is_complete());
        assert_eq!(fx.client.tag(), Some("tester"));

        fx.client.flush().unwrap();
        assert_eq!(fx.bus.in_flight(), 2);
    }

    #[test]
    fn correlation_ids_are_fresh_per_request() {
        let fx = fixture(EndpointConfig::default());
        let a = fx.client.request("x", Vec::new()).unwrap();
        let b = fx.client.request("x", Vec::new()).unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn response_values_are_positional() {
        let fx = fixture(EndpointConfig::default());
        let pending = fx.client.request("pair", Vec::new()).unwrap();
        fx.host_sends(&[Envelope::response(pending.id().clone(), vec![json!(1), json!("b")])]);
        assert_eq!(
            pending.outcome(),
            Some(Outcome::Success(vec![json!(1), json!("b")]))
        );
        assert_eq!(fx.client.pending_count(), 0);
    }

    #[test]
    fn duplicate_terminal_delivery_is_ignored() {
        let fx = fixture(EndpointConfig::default());
        let pending = fx.client.request("add", Vec::new()).unwrap();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        pending.on_result(move |_| seen.set(seen.get() + 1));

        let id = pending.id().clone();
        let batch = [
            Envelope::progress(id.clone(), json!("50%")),
            Envelope::response(id.clone(), vec![json!(5)]),
        ];
        fx.host_sends(&batch);
        fx.host_sends(&batch);
        fx.host_sends(&[Envelope::error(id, json!("late"))]);

        assert_eq!(calls.get(), 1);
        assert_eq!(pending.progress_count(), 1);
        assert_eq!(pending.outcome(), Some(Outcome::Success(vec![json!(5)])));
    }

    #[test]
    fn error_reply_is_failure() {
        let fx = fixture(EndpointConfig::default());
        let pending = fx.client.request("div", vec![json!(1), json!(0)]).unwrap();
        fx.host_sends(&[Envelope::error(pending.id().clone(), json!({"error": "div by zero"}))]);
        assert_eq!(
            pending.outcome().as_ref().and_then(Outcome::error),
            Some(&json!({"error": "div by zero"}))
        );
    }

    #[test]
    fn events_distinguish_absent_and_null_payload() {
        let fx = fixture(EndpointConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        fx.client
            .on_event("tick", move |payload| sink.borrow_mut().push(payload.cloned()))
            .unwrap();

        fx.host_sends(&[
            Envelope::event("tick", None),
            Envelope::event("tick", Some(Value::Null)),
            Envelope::event("tick", Some(json!(3))),
        ]);
        assert_eq!(
            *seen.borrow(),
            vec![None, Some(Value::Null), Some(json!(3))]
        );
    }

    #[test]
    fn events_run_before_replies_in_a_batch() {
        let fx = fixture(EndpointConfig::default());
        let order = Rc::new(RefCell::new(Vec::new()));
        let pending = fx.client.request("work", Vec::new()).unwrap();

        let sink = Rc::clone(&order);
        pending.on_result(move |_| sink.borrow_mut().push("result"));
        let sink = Rc::clone(&order);
        fx.client
            .on_event("status", move |_| sink.borrow_mut().push("event"))
            .unwrap();

        fx.host_sends(&[
            Envelope::response(pending.id().clone(), Vec::new()),
            Envelope::event("status", None),
        ]);
        assert_eq!(*order.borrow(), vec!["event", "result"]);
    }

    #[test]
    fn catch_all_observer_sees_every_event() {
        let fx = fixture(EndpointConfig::default());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let id = fx
            .client
            .on_any_event(move |command, _| sink.borrow_mut().push(command.to_string()))
            .unwrap();

        fx.host_sends(&[Envelope::event("a", None), Envelope::event("b", None)]);
        assert!(fx.client.remove_handler(id));
        fx.host_sends(&[Envelope::event("c", None)]);
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn multicast_policy_invokes_all_handlers() {
        let fx = fixture(EndpointConfig::default().with_handlers(HandlerPolicy::Multicast));
        let seen = Rc::new(RefCell::new(Vec::new()));
        for n in 1..=2 {
            let sink = Rc::clone(&seen);
            fx.client
                .on_event("x", move |_| sink.borrow_mut().push(n))
                .unwrap();
        }
        fx.host_sends(&[Envelope::event("x", None)]);
        assert_eq!(*seen.borrow(), vec![1, 2]);

        assert_eq!(fx.client.remove_event("x"), 2);
        fx.host_sends(&[Envelope::event("x", None)]);
        assert_eq!(seen.borrow().len(), 2);
    }

    #[test]
    fn foreign_and_own_role_traffic_is_ignored() {
        let fx = fixture(EndpointConfig::default());
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        fx.client.on_event("x", move |_| sink.set(sink.get() + 1)).unwrap();

        let own = encode_batch(Role::Client, "", WireFormat::Batch, &[Envelope::event("x", None)])
            .unwrap();
        fx.bus.send(fx.top, fx.client.context(), own).unwrap();
        fx.bus.send(fx.top, fx.client.context(), json!("chatter")).unwrap();
        fx.bus
            .send(fx.top, fx.client.context(), json!({"bridge": "BRHOST#2", "messages": 5}))
            .unwrap();
        fx.bus.pump();
        assert_eq!(seen.get(), 0);
    }

    #[test]
    fn request_timeout_expires_on_tick() {
        let fx = fixture(EndpointConfig::default().with_request_timeout(Duration::from_secs(5)));
        let pending = fx.client.request("slow", Vec::new()).unwrap();

        fx.client.tick(Instant::now()).unwrap();
        assert!(!pending.is_complete());

        fx.client.tick(Instant::now() + Duration::from_secs(6)).unwrap();
        assert_eq!(pending.outcome(), Some(Outcome::TimedOut));
        assert_eq!(fx.client.pending_count(), 0);

        fx.host_sends(&[Envelope::response(pending.id().clone(), vec![json!(1)])]);
        assert_eq!(pending.outcome(), Some(Outcome::TimedOut));
    }

    #[test]
    fn unrepresentable_timeout_never_expires() {
        let fx = fixture(EndpointConfig::default().with_request_timeout(Duration::MAX));
        let pending = fx.client.request("slow", Vec::new()).unwrap();

        fx.client.tick(Instant::now() + Duration::from_secs(3600)).unwrap();
        assert!(!pending.is_complete());
        assert_eq!(fx.client.pending_count(), 1);
    }

    #[test]
    fn without_timeout_requests_stay_pending() {
        let fx = fixture(EndpointConfig::default());
        let pending = fx.client.request("nobody", Vec::new()).unwrap();
        fx.client.tick(Instant::now() + Duration::from_secs(3600)).unwrap();
        assert!(!pending.is_complete());
        assert_eq!(fx.client.pending_count(), 1);
    }

    #[test]
    fn shutdown_drops_pending_without_callbacks() {
        let fx = fixture(EndpointConfig::default());
        let pending = fx.client.request("add", Vec::new()).unwrap();
        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        pending.on_result(move |_| flag.set(true));

        fx.client.shutdown();
        assert!(fx.client.is_shut_down());
        assert_eq!(fx.client.pending_count(), 0);
        assert_eq!(fx.client.queued(), 0);

        fx.host_sends(&[Envelope::response(pending.id().clone(), Vec::new())]);
        assert!(!fired.get());
        assert!(matches!(
            fx.client.request("again", Vec::new()),
            Err(PeerError::Shutdown)
        ));
        fx.client.shutdown();
    }

    #[test]
    fn handler_may_issue_request_reentrantly() {
        let fx = fixture(EndpointConfig::default());
        let client = fx.client.clone();
        fx.client
            .on_event("ping", move |_| {
                client.request("pong", Vec::new()).unwrap();
            })
            .unwrap();
        fx.host_sends(&[Envelope::event("ping", None)]);
        assert_eq!(fx.client.pending_count(), 1);
        fx.client.shutdown();
    }

    #[test]
    fn legacy_wire_with_domain_is_rejected() {
        let bus = Rc::new(LocalBus::new());
        let top = bus.add_root("top");
        let result = Client::connect(
            bus,
            top,
            EndpointConfig::default()
                .with_wire(WireFormat::Legacy)
                .with_domain("a"),
        );
        assert!(matches!(result, Err(PeerError::Config(_))));
    }
}
