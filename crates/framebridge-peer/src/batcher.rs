use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use framebridge_frame::{encode_batch, Envelope, Role, WireFormat};
use framebridge_transport::{ContextId, ContextTree, Transport};

use crate::config::{clamp_gather, Discovery, EndpointConfig};
use crate::error::{PeerError, Result};
use crate::walker::discover_targets;

/// One-shot timer used to schedule batch flushes.
///
/// `arm` must call `fire` once, no earlier than `delay` from now, on the
/// thread that owns the endpoint. It must not call `fire` synchronously from
/// within `arm`.
pub trait FlushTimer {
    fn arm(&self, delay: Duration, fire: Box<dyn FnOnce()>);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Scheduled { due: Instant, generation: u64 },
}

struct BatchState {
    queue: Vec<Envelope>,
    phase: Phase,
    generation: u64,
    domain: String,
    gather: Duration,
}

/// Outgoing queue of one endpoint.
///
/// Idle until the first enqueue, which schedules a flush `gather` later.
/// A flush swaps out the whole queue, encodes it as one batch and sends
/// that batch once to every target the tree walk finds at that moment.
/// Envelopes enqueued after a flush has started belong to the next batch.
pub struct Batcher {
    role: Role,
    context: ContextId,
    transport: Rc<dyn Transport>,
    tree: Rc<dyn ContextTree>,
    discovery: Discovery,
    format: WireFormat,
    state: RefCell<BatchState>,
    timer: RefCell<Option<Rc<dyn FlushTimer>>>,
    closed: Cell<bool>,
    this: Weak<Batcher>,
}

impl Batcher {
    /// Create a batcher sending as `role` from `context`.
    pub fn new(
        role: Role,
        context: ContextId,
        transport: Rc<dyn Transport>,
        tree: Rc<dyn ContextTree>,
        config: &EndpointConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            role,
            context,
            transport,
            tree,
            discovery: config.discovery,
            format: config.wire,
            state: RefCell::new(BatchState {
                queue: Vec::new(),
                phase: Phase::Idle,
                generation: 0,
                domain: config.domain.clone(),
                gather: clamp_gather(config.gather),
            }),
            timer: RefCell::new(None),
            closed: Cell::new(false),
            this: this.clone(),
        })
    }

    /// Install the timer used for future schedules.
    ///
    /// A flush that is already scheduled keeps relying on `tick`.
    pub fn set_timer(&self, timer: Rc<dyn FlushTimer>) {
        *self.timer.borrow_mut() = Some(timer);
    }

    /// Append an envelope to the outgoing queue, scheduling a flush if idle.
    pub fn enqueue(&self, envelope: Envelope) -> Result<()> {
        if self.closed.get() {
            return Err(PeerError::Shutdown);
        }

        let armed = {
            let mut state = self.state.borrow_mut();
            state.queue.push(envelope);
            match state.phase {
                Phase::Scheduled { .. } => None,
                Phase::Idle => {
                    state.generation += 1;
                    let generation = state.generation;
                    let now = Instant::now();
                    state.phase = Phase::Scheduled {
                        due: now.checked_add(state.gather).unwrap_or(now),
                        generation,
                    };
                    Some((state.gather, generation))
                }
            }
        };

        if let Some((delay, generation)) = armed {
            let timer = self.timer.borrow().clone();
            if let Some(timer) = timer {
                let this = self.this.clone();
                timer.arm(
                    delay,
                    Box::new(move || {
                        if let Some(batcher) = this.upgrade() {
                            batcher.fire(generation);
                        }
                    }),
                );
            }
        }
        Ok(())
    }

    /// Flush if the scheduled deadline has passed by `now`.
    ///
    /// Returns the number of envelopes sent, 0 when nothing was due.
    pub fn tick(&self, now: Instant) -> Result<usize> {
        if self.closed.get() {
            return Ok(0);
        }
        let due = match self.state.borrow().phase {
            Phase::Scheduled { due, .. } => due <= now,
            Phase::Idle => false,
        };
        if due {
            self.flush()
        } else {
            Ok(0)
        }
    }

    fn fire(&self, generation: u64) {
        if self.closed.get() {
            return;
        }
        let current = matches!(
            self.state.borrow().phase,
            Phase::Scheduled { generation: g, .. } if g == generation
        );
        if !current {
            tracing::trace!(generation, "stale flush timer ignored");
            return;
        }
        if let Err(err) = self.flush() {
            tracing::warn!(error = %err, "scheduled flush failed");
        }
    }

    /// Send everything queued right now as one batch.
    ///
    /// Returns the number of envelopes in the batch. Delivery to each target
    /// is best-effort: a failed send is logged and the remaining targets are
    /// still attempted.
    pub fn flush(&self) -> Result<usize> {
        if self.closed.get() {
            return Err(PeerError::Shutdown);
        }

        let (messages, domain) = {
            let mut state = self.state.borrow_mut();
            state.phase = Phase::Idle;
            (std::mem::take(&mut state.queue), state.domain.clone())
        };
        if messages.is_empty() {
            return Ok(0);
        }

        let payload = encode_batch(self.role, &domain, self.format, &messages)?;
        let root = self.tree.root_of(self.context);
        let targets = discover_targets(self.tree.as_ref(), root, self.discovery);

        for target in &targets {
            if let Err(err) = self.transport.send(self.context, *target, payload.clone()) {
                tracing::warn!(%target, error = %err, "batch send failed");
            }
        }

        tracing::debug!(
            role = %self.role,
            messages = messages.len(),
            targets = targets.len(),
            domain = %domain,
            "flushed batch"
        );
        Ok(messages.len())
    }

    /// Envelopes waiting for the next flush.
    pub fn queued(&self) -> usize {
        self.state.borrow().queue.len()
    }

    /// Deadline of the scheduled flush, if one is scheduled.
    pub fn next_flush_at(&self) -> Option<Instant> {
        match self.state.borrow().phase {
            Phase::Scheduled { due, .. } => Some(due),
            Phase::Idle => None,
        }
    }

    pub fn domain(&self) -> String {
        self.state.borrow().domain.clone()
    }

    pub fn set_domain(&self, domain: impl Into<String>) {
        self.state.borrow_mut().domain = domain.into();
    }

    pub fn gather(&self) -> Duration {
        self.state.borrow().gather
    }

    /// Change the flush interval for future schedules; clamped.
    pub fn set_gather(&self, gather: Duration) {
        self.state.borrow_mut().gather = clamp_gather(gather);
    }

    pub fn wire_format(&self) -> WireFormat {
        self.format
    }

    /// Drop anything queued and refuse further envelopes.
    pub fn close(&self) {
        self.closed.set(true);
        let mut state = self.state.borrow_mut();
        let dropped = state.queue.len();
        state.queue.clear();
        state.phase = Phase::Idle;
        if dropped > 0 {
            tracing::debug!(dropped, "outgoing queue discarded on close");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.get()
    }
}
