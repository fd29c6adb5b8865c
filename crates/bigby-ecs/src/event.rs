//! Per-query add/remove notification.
//!
//! Every query owns two [`EventChannel`]s, one for entities entering its
//! membership and one for entities leaving it. Listeners run synchronously,
//! in subscription order, at the moment the store detects the change, and get
//! mutable access to the [`World`] so they can react by mutating it.
//!
//! Listeners are `Fn` behind an `Rc`: a listener that mutates the store can
//! trigger a nested cascade that reaches the same listener again, and it must
//! be callable while its outer invocation is still on the stack. Listeners
//! that need state use interior mutability.

use std::fmt;
use std::rc::Rc;

use crate::entity::EntityId;
use crate::world::World;

/// A callback invoked with the world and the entity that joined or left.
pub type Listener = Rc<dyn Fn(&mut World, EntityId)>;

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);

/// Which way an entity crossed a query's membership boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryEventKind {
    Added,
    Removed,
}

impl fmt::Display for QueryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryEventKind::Added => f.write_str("added"),
            QueryEventKind::Removed => f.write_str("removed"),
        }
    }
}

/// An ordered list of listeners for one kind of membership change.
#[derive(Default)]
pub struct EventChannel {
    listeners: Vec<(ListenerId, Listener)>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, id: ListenerId, listener: Listener) {
        self.listeners.push((id, listener));
    }

    /// Returns `false` if `id` was not subscribed here.
    pub fn unsubscribe(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    /// The listeners to call for one event, in subscription order.
    ///
    /// Emission works on this copy so listeners may subscribe, unsubscribe or
    /// dispose queries while it runs.
    pub fn snapshot(&self) -> Vec<Listener> {
        self.listeners.iter().map(|(_, l)| Rc::clone(l)).collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn snapshot_preserves_subscription_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut channel = EventChannel::new();
        for n in 0..3 {
            let log = Rc::clone(&log);
            channel.subscribe(
                ListenerId(n),
                Rc::new(move |_: &mut World, _: EntityId| log.borrow_mut().push(n)),
            );
        }

        let mut world = World::new();
        let entity = world.add(()).unwrap();
        for listener in channel.snapshot() {
            listener(&mut world, entity);
        }
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn unsubscribe_removes_only_the_named_listener() {
        let mut channel = EventChannel::new();
        channel.subscribe(ListenerId(1), Rc::new(|_: &mut World, _: EntityId| {}));
        channel.subscribe(ListenerId(2), Rc::new(|_: &mut World, _: EntityId| {}));
        assert!(channel.unsubscribe(ListenerId(1)));
        assert!(!channel.unsubscribe(ListenerId(1)));
        assert_eq!(channel.len(), 1);
    }
}
