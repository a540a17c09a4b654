use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Instant;

use framebridge_frame::CorrelationId;
use serde_json::Value;

/// Terminal result of a request.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The host responded; values in the order it passed them.
    Success(Vec<Value>),
    /// The host failed the request with this error value.
    Failure(Value),
    /// No terminal envelope arrived within the configured request timeout.
    TimedOut,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Result values of a successful outcome.
    pub fn values(&self) -> Option<&[Value]> {
        match self {
            Outcome::Success(values) => Some(values),
            _ => None,
        }
    }

    /// Error value of a failed outcome.
    pub fn error(&self) -> Option<&Value> {
        match self {
            Outcome::Failure(error) => Some(error),
            _ => None,
        }
    }
}

type ResultCallback = Box<dyn FnOnce(Outcome)>;
type ProgressCallback = Box<dyn FnMut(&Value)>;

#[derive(Default)]
struct SlotState {
    outcome: Option<Outcome>,
    on_result: Option<ResultCallback>,
    on_progress: Option<ProgressCallback>,
    progress_seen: usize,
    wakers: Vec<Waker>,
}

/// Client-side record of one outstanding request.
pub(crate) struct RequestSlot {
    id: CorrelationId,
    command: String,
    issued_at: Instant,
    state: RefCell<SlotState>,
}

impl RequestSlot {
    pub(crate) fn new(id: CorrelationId, command: &str) -> Rc<Self> {
        Rc::new(Self {
            id,
            command: command.to_string(),
            issued_at: Instant::now(),
            state: RefCell::default(),
        })
    }

    pub(crate) fn issued_at(&self) -> Instant {
        self.issued_at
    }

    /// Deliver a progress state. Ignored once the request is complete.
    pub(crate) fn progress(&self, update: &Value) {
        let callback = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return;
            }
            state.progress_seen += 1;
            state.on_progress.take()
        };

        if let Some(mut callback) = callback {
            callback(update);
            let mut state = self.state.borrow_mut();
            // Keep a callback installed from inside this one.
            if state.on_progress.is_none() {
                state.on_progress = Some(callback);
            }
        }
    }

    /// Record the terminal outcome. Returns false if one was already recorded.
    pub(crate) fn complete(&self, outcome: Outcome) -> bool {
        let (callback, wakers) = {
            let mut state = self.state.borrow_mut();
            if state.outcome.is_some() {
                return false;
            }
            state.outcome = Some(outcome.clone());
            state.on_progress = None;
            (state.on_result.take(), std::mem::take(&mut state.wakers))
        };

        for waker in wakers {
            waker.wake();
        }
        if let Some(callback) = callback {
            callback(outcome);
        }
        true
    }
}

/// Handle to an issued request.
///
/// The terminal outcome can be polled with [`outcome`](Self::outcome),
/// awaited, or observed through [`on_result`](Self::on_result). Clones
/// share the same request.
#[derive(Clone)]
pub struct PendingRequest {
    slot: Rc<RequestSlot>,
}

impl PendingRequest {
    pub(crate) fn new(slot: Rc<RequestSlot>) -> Self {
        Self { slot }
    }

    pub fn id(&self) -> &CorrelationId {
        &self.slot.id
    }

    pub fn command(&self) -> &str {
        &self.slot.command
    }

    /// Call `callback` once with the terminal outcome.
    ///
    /// If the outcome has already arrived the callback runs immediately.
    /// A later registration replaces an earlier one that has not fired.
    pub fn on_result(&self, callback: impl FnOnce(Outcome) + 'static) -> &Self {
        let ready = self.slot.state.borrow().outcome.clone();
        match ready {
            Some(outcome) => callback(outcome),
            None => self.slot.state.borrow_mut().on_result = Some(Box::new(callback)),
        }
        self
    }

    /// Call `callback` for every progress state received before completion.
    ///
    /// Progress that arrived before registration is not replayed.
    pub fn on_progress(&self, callback: impl FnMut(&Value) + 'static) -> &Self {
        let mut state = self.slot.state.borrow_mut();
        if state.outcome.is_none() {
            state.on_progress = Some(Box::new(callback));
        }
        self
    }

    /// The terminal outcome, if it has arrived.
    pub fn outcome(&self) -> Option<Outcome> {
        self.slot.state.borrow().outcome.clone()
    }

    pub fn is_complete(&self) -> bool {
        self.slot.state.borrow().outcome.is_some()
    }

    /// Number of progress envelopes received so far.
    pub fn progress_count(&self) -> usize {
        self.slot.state.borrow().progress_seen
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.slot.id)
            .field("command", &self.slot.command)
            .field("outcome", &self.slot.state.borrow().outcome)
            .finish()
    }
}

impl Future for PendingRequest {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Outcome> {
        let mut state = self.slot.state.borrow_mut();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use serde_json::json;

    use super::*;

    fn pending() -> (Rc<RequestSlot>, PendingRequest) {
        let slot = RequestSlot::new(CorrelationId::generate(), "add");
        (Rc::clone(&slot), PendingRequest::new(slot))
    }

    #[test]
    fn result_callback_fires_once() {
        let (slot, handle) = pending();
        let calls = Rc::new(Cell::new(0));
        let seen = Rc::clone(&calls);
        handle.on_result(move |outcome| {
            assert_eq!(outcome, Outcome::Success(vec![json!(5)]));
            seen.set(seen.get() + 1);
        });

        assert!(slot.complete(Outcome::Success(vec![json!(5)])));
        assert!(!slot.complete(Outcome::Failure(json!("late"))));
        assert_eq!(calls.get(), 1);
        assert_eq!(handle.outcome(), Some(Outcome::Success(vec![json!(5)])));
    }

    #[test]
    fn late_subscription_replays_outcome() {
        let (slot, handle) = pending();
        slot.complete(Outcome::Failure(json!({"error": "nope"})));

        let got = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&got);
        handle.on_result(move |outcome| *sink.borrow_mut() = Some(outcome));
        assert_eq!(
            got.borrow().as_ref().and_then(Outcome::error),
            Some(&json!({"error": "nope"}))
        );
    }

    #[test]
    fn progress_stops_after_completion() {
        let (slot, handle) = pending();
        let states = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&states);
        handle.on_progress(move |state| sink.borrow_mut().push(state.clone()));

        slot.progress(&json!("25%"));
        slot.progress(&json!("50%"));
        slot.complete(Outcome::Success(Vec::new()));
        slot.progress(&json!("75%"));

        assert_eq!(*states.borrow(), vec![json!("25%"), json!("50%")]);
        assert_eq!(handle.progress_count(), 2);
    }

    #[test]
    fn future_resolves_on_completion() {
        let (slot, handle) = pending();
        let mut fut = handle.clone();
        let mut cx = Context::from_waker(Waker::noop());

        assert!(Pin::new(&mut fut).poll(&mut cx).is_pending());
        slot.complete(Outcome::TimedOut);
        assert_eq!(Pin::new(&mut fut).poll(&mut cx), Poll::Ready(Outcome::TimedOut));
    }

    #[tokio::test]
    async fn await_after_completion_returns_outcome() {
        let (slot, handle) = pending();
        slot.complete(Outcome::Success(vec![json!("done")]));
        let outcome = handle.await;
        assert_eq!(outcome.values(), Some(&[json!("done")][..]));
    }
}
