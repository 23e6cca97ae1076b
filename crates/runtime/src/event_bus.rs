use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

type Listener<E> = Box<dyn FnMut(&E)>;

/// Records every emitted event and fans it out to subscribers.
///
/// Subscribers are invoked in subscription order. The log is kept so a host
/// (or a test) can inspect the exact sequence of notifications without
/// registering a listener.
pub struct EventBus<E> {
    next_id: u64,
    listeners: BTreeMap<SubscriptionId, Listener<E>>,
    events: Vec<E>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            listeners: BTreeMap::new(),
            events: Vec::new(),
        }
    }
}

impl<E: fmt::Debug> fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listeners.len())
            .field("events", &self.events)
            .finish()
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&E) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn emit(&mut self, event: E) {
        for listener in self.listeners.values_mut() {
            listener(&event);
        }
        self.events.push(event);
    }

    pub fn events(&self) -> &[E] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<E> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn records_events_in_order() {
        let mut bus = EventBus::new();
        bus.emit("a");
        bus.emit("b");
        assert_eq!(bus.events(), &["a", "b"]);
    }

    #[test]
    fn drain_clears_events() {
        let mut bus = EventBus::new();
        bus.emit(1);
        let drained = bus.drain();
        assert_eq!(drained, vec![1]);
        assert!(bus.events().is_empty());
    }

    #[test]
    fn subscribers_see_events_until_unsubscribed() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut bus = EventBus::new();
        let id = bus.subscribe(move |e: &u32| sink.borrow_mut().push(*e));

        bus.emit(7);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(8);

        assert_eq!(*seen.borrow(), vec![7]);
        assert_eq!(bus.events(), &[7, 8]);
    }
}
