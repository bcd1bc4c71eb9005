//! A minimal typed pub/sub emitter.
//!
//! Each collab embeds one [`EventEmitter<E>`] per distinct event name it
//! fires (e.g. an LWW register owns an `EventEmitter<SetEvent<V>>`), which
//! is what gives "one subscriber list per event name" without needing a
//! type-erased dispatch table: the event name *is* the field, and the field
//! owns its own subscriber list.

/// Boxed subscriber callback for event type `E`.
type Subscriber<E> = Box<dyn FnMut(&E)>;

/// A single named event's subscriber list.
pub struct EventEmitter<E> {
    subscribers: Vec<Subscriber<E>>,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E> EventEmitter<E> {
    /// An emitter with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber, called once per [`EventEmitter::emit`] after
    /// registration, in registration order.
    pub fn on(&mut self, handler: impl FnMut(&E) + 'static) {
        self.subscribers.push(Box::new(handler));
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Invoke every subscriber with `event`, in registration order.
    pub fn emit(&mut self, event: &E) {
        for subscriber in &mut self.subscribers {
            subscriber(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn subscribers_fire_in_registration_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut emitter: EventEmitter<u32> = EventEmitter::new();

        let seen_a = seen.clone();
        emitter.on(move |v| seen_a.borrow_mut().push(("a", *v)));
        let seen_b = seen.clone();
        emitter.on(move |v| seen_b.borrow_mut().push(("b", *v)));

        emitter.emit(&1);
        emitter.emit(&2);

        assert_eq!(
            *seen.borrow(),
            vec![("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn emitter_with_no_subscribers_is_a_no_op() {
        let mut emitter: EventEmitter<&str> = EventEmitter::new();
        emitter.emit(&"nobody listening");
        assert_eq!(emitter.subscriber_count(), 0);
    }
}
