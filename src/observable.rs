//! Observable value cell.
//!
//! One lock guards the value and its subscriber list. Every transition stores
//! the new value and fans it out to subscribers while the lock is still held,
//! so subscribers see transitions in order. Delivery is a non-blocking send
//! (unbounded channel or callback); sinks that report themselves closed are
//! dropped on the next publish.

use std::sync::mpsc;

use parking_lot::Mutex;

type Sink<T> = Box<dyn Fn(&T) -> bool + Send>;

struct Inner<T> {
    value: T,
    sinks: Vec<Sink<T>>,
}

impl<T> Inner<T> {
    fn publish(&mut self) {
        let value = &self.value;
        self.sinks.retain(|sink| sink(value));
    }
}

pub struct Observable<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone + Send + 'static> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                sinks: Vec::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.inner.lock().value.clone()
    }

    /// Channel subscription. The current value is delivered first.
    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel();
        self.subscribe_with(move |value: &T| tx.send(value.clone()).is_ok());
        rx
    }

    /// Callback subscription. The callback runs under the value lock and must
    /// not call back into this observable; returning `false` unsubscribes.
    pub fn subscribe_with<F>(&self, sink: F)
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        let mut inner = self.inner.lock();
        if sink(&inner.value) {
            inner.sinks.push(Box::new(sink));
        }
    }

    pub fn set(&self, value: T) {
        let mut inner = self.inner.lock();
        inner.value = value;
        inner.publish();
    }

    /// Apply `f` to the value. Subscribers are notified only when `f`
    /// returns `true`.
    pub fn update<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        let mut inner = self.inner.lock();
        let changed = f(&mut inner.value);
        if changed {
            inner.publish();
        }
        changed
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().sinks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_gets_current_value_first() {
        let cell = Observable::new(1);
        let rx = cell.subscribe();
        assert_eq!(rx.try_recv().unwrap(), 1);
        cell.set(2);
        cell.set(3);
        assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![2, 3]);
    }

    #[test]
    fn unchanged_update_publishes_nothing() {
        let cell = Observable::new(0);
        let rx = cell.subscribe();
        let _ = rx.try_recv();
        assert!(!cell.update(|_| false));
        assert!(rx.try_recv().is_err());
        assert!(cell.update(|v| {
            *v += 5;
            true
        }));
        assert_eq!(rx.try_recv().unwrap(), 5);
        assert_eq!(cell.get(), 5);
    }

    #[test]
    fn dropped_receivers_are_pruned() {
        let cell = Observable::new("a".to_string());
        let rx = cell.subscribe();
        assert_eq!(cell.subscriber_count(), 1);
        drop(rx);
        cell.set("b".into());
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn callback_returning_false_unsubscribes() {
        let cell = Observable::new(0);
        cell.subscribe_with(|v: &i32| *v < 1);
        assert_eq!(cell.subscriber_count(), 1);
        cell.set(1);
        assert_eq!(cell.subscriber_count(), 0);
    }
}
