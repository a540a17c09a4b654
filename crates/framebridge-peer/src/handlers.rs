//! Per-command handler registration shared by both endpoint kinds.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::config::HandlerPolicy;

/// Identifies one handler registration so it can be removed later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

pub(crate) type Shared<H> = Rc<RefCell<H>>;

/// Command name to handler list, honoring a [`HandlerPolicy`].
pub(crate) struct HandlerTable<H: ?Sized> {
    policy: HandlerPolicy,
    next_id: u64,
    entries: HashMap<String, Vec<(HandlerId, Shared<H>)>>,
}

impl<H: ?Sized> HandlerTable<H> {
    pub(crate) fn new(policy: HandlerPolicy) -> Self {
        Self {
            policy,
            next_id: 0,
            entries: HashMap::new(),
        }
    }

    pub(crate) fn allocate_id(&mut self) -> HandlerId {
        self.next_id += 1;
        HandlerId(self.next_id)
    }

    pub(crate) fn insert(&mut self, command: &str, handler: Shared<H>) -> HandlerId {
        let id = self.allocate_id();
        let slot = self.entries.entry(command.to_string()).or_default();
        if self.policy == HandlerPolicy::Replace && !slot.is_empty() {
            tracing::debug!(command, "replacing existing handler");
            slot.clear();
        }
        slot.push((id, handler));
        id
    }

    /// Drop every handler for `command`. Returns how many were removed.
    pub(crate) fn remove_command(&mut self, command: &str) -> usize {
        self.entries.remove(command).map_or(0, |slot| slot.len())
    }

    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        let mut found = false;
        self.entries.retain(|_, slot| {
            let before = slot.len();
            slot.retain(|(entry, _)| *entry != id);
            found |= slot.len() != before;
            !slot.is_empty()
        });
        found
    }

    /// Snapshot of the handlers for `command`, in registration order.
    pub(crate) fn resolve(&self, command: &str) -> Vec<Shared<H>> {
        self.entries
            .get(command)
            .map(|slot| slot.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }
}
