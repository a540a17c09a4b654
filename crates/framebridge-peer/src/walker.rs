use std::collections::{HashSet, VecDeque};

use framebridge_transport::{ContextId, ContextTree};

use crate::config::Discovery;

/// Collect the contexts a batch should be sent to, starting at `root`.
///
/// The tree is walked breadth-first every time; nothing is cached. Each
/// context appears at most once even if the tree reports it twice.
///
/// With [`Discovery::RelayOnly`] the root and the tagged relays are
/// returned, root first. The walk still descends into every context because
/// relays may be nested anywhere. A context whose relay slot cannot be read
/// counts as having no relay.
pub fn discover_targets<T>(tree: &T, root: ContextId, discovery: Discovery) -> Vec<ContextId>
where
    T: ContextTree + ?Sized,
{
    let mut visited = HashSet::new();
    let mut targets = Vec::new();
    let mut emitted = HashSet::new();
    let mut queue = VecDeque::from([root]);
    if discovery == Discovery::RelayOnly {
        emitted.insert(root);
        targets.push(root);
    }

    while let Some(context) = queue.pop_front() {
        if !visited.insert(context) {
            continue;
        }

        match discovery {
            Discovery::BroadcastAll => {
                if emitted.insert(context) {
                    targets.push(context);
                }
            }
            Discovery::RelayOnly => match tree.relay_of(context) {
                Ok(Some(relay)) => {
                    if emitted.insert(relay) {
                        targets.push(relay);
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::trace!(%context, error = %err, "relay slot unreadable; treating as absent");
                }
            },
        }

        queue.extend(tree.children(context));
    }

    targets
}

#[cfg(test)]
mod tests {
    use framebridge_transport::LocalBus;

    use super::*;

    /// top
    /// ├── a
    /// │   ├── a1
    /// │   └── a2
    /// └── b
    ///     └── b1
    fn sample_tree() -> (LocalBus, [ContextId; 6]) {
        let bus = LocalBus::new();
        let top = bus.add_root("top");
        let a = bus.add_child(top, "a").unwrap();
        let b = bus.add_child(top, "b").unwrap();
        let a1 = bus.add_child(a, "a1").unwrap();
        let a2 = bus.add_child(a, "a2").unwrap();
        let b1 = bus.add_child(b, "b1").unwrap();
        (bus, [top, a, b, a1, a2, b1])
    }

    #[test]
    fn broadcast_lists_every_context_breadth_first() {
        let (bus, [top, a, b, a1, a2, b1]) = sample_tree();
        let targets = discover_targets(&bus, top, Discovery::BroadcastAll);
        assert_eq!(targets, vec![top, a, b, a1, a2, b1]);
    }

    #[test]
    fn broadcast_sees_topology_changes() {
        let (bus, [top, a, b, ..]) = sample_tree();
        bus.remove(a).unwrap();
        let late = bus.add_child(b, "late").unwrap();

        let targets = discover_targets(&bus, top, Discovery::BroadcastAll);
        assert!(!targets.contains(&a));
        assert!(targets.contains(&late));
        assert_eq!(targets.len(), 4);
    }

    #[test]
    fn relay_only_targets_relays_at_every_level() {
        let (bus, [top, a, b, a1, _a2, b1]) = sample_tree();
        bus.set_relay(top, Some(a)).unwrap();
        bus.set_relay(a, Some(a1)).unwrap();
        bus.set_relay(b, Some(b1)).unwrap();

        let targets = discover_targets(&bus, top, Discovery::RelayOnly);
        assert_eq!(targets, vec![top, a, a1, b1]);
    }

    #[test]
    fn relay_only_without_relays_targets_root() {
        let (bus, [top, ..]) = sample_tree();
        assert_eq!(discover_targets(&bus, top, Discovery::RelayOnly), vec![top]);
    }

    #[test]
    fn unreadable_relay_slot_is_skipped_not_fatal() {
        let (bus, [top, a, b, _a1, a2, b1]) = sample_tree();
        bus.set_relay(a, Some(a2)).unwrap();
        bus.restrict(a, true).unwrap();
        bus.set_relay(b, Some(b1)).unwrap();

        let targets = discover_targets(&bus, top, Discovery::RelayOnly);
        assert_eq!(targets, vec![top, b1]);
    }
}
