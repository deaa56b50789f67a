use std::sync::{Mutex, MutexGuard, PoisonError};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};

/// Stream of values for one field: the value current at subscription time, then every update.
pub type FieldStream<T> = UnboundedReceiver<T>;

struct FieldInner<T> {
    value: T,
    subscribers: Vec<UnboundedSender<T>>,
}

/// A single value that can be read from any thread and observed as a stream.
///
/// Reading the current value and attaching a subscriber happen under the same lock as
/// updates, so a subscriber never misses the value that was current when it attached and
/// receives updates in the order they were made.
pub struct ObservableField<T> {
    inner: Mutex<FieldInner<T>>,
}

impl<T: Clone> ObservableField<T> {
    pub fn new(value: T) -> Self {
        ObservableField {
            inner: Mutex::new(FieldInner {
                value,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FieldInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    pub fn subscribe(&self) -> FieldStream<T> {
        let (sender, receiver) = unbounded();
        let mut inner = self.lock();

        if sender.unbounded_send(inner.value.clone()).is_ok() {
            inner.subscribers.push(sender);
        }

        receiver
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub(crate) fn set(&self, value: T) {
        let mut inner = self.lock();
        inner.value = value;

        let FieldInner { value, subscribers } = &mut *inner;
        subscribers.retain(|subscriber| subscriber.unbounded_send(value.clone()).is_ok());
    }

    /// Sets `value` only when `predicate` holds for the current value. Returns whether it was set.
    pub(crate) fn set_if<F>(&self, predicate: F, value: T) -> bool
    where
        F: FnOnce(&T) -> bool,
    {
        let mut inner = self.lock();
        if !predicate(&inner.value) {
            return false;
        }

        inner.value = value;
        let FieldInner { value, subscribers } = &mut *inner;
        subscribers.retain(|subscriber| subscriber.unbounded_send(value.clone()).is_ok());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};

    fn next_now<T>(stream: &mut FieldStream<T>) -> Option<T> {
        stream.next().now_or_never().flatten()
    }

    #[test]
    fn subscriber_receives_current_value_first() {
        let field = ObservableField::new(0);
        let mut stream = field.subscribe();
        assert_eq!(next_now(&mut stream), Some(0));
        assert_eq!(next_now(&mut stream), None);
    }

    #[test]
    fn late_subscriber_receives_latest_then_updates() {
        let field = ObservableField::new(0);
        field.set(1);
        field.set(2);
        field.set(3);

        let mut stream = field.subscribe();
        assert_eq!(next_now(&mut stream), Some(3));

        field.set(4);
        field.set(5);
        assert_eq!(next_now(&mut stream), Some(4));
        assert_eq!(next_now(&mut stream), Some(5));
        assert_eq!(field.get(), 5);
    }

    #[test]
    fn every_update_is_delivered_in_order() {
        let field = ObservableField::new(String::new());
        let mut stream = field.subscribe();
        for i in 0..100 {
            field.set(i.to_string());
        }

        assert_eq!(next_now(&mut stream), Some(String::new()));
        for i in 0..100 {
            assert_eq!(next_now(&mut stream), Some(i.to_string()));
        }
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let field = ObservableField::new(false);
        let kept = field.subscribe();
        let dropped = field.subscribe();
        assert_eq!(field.subscriber_count(), 2);

        drop(dropped);
        field.set(true);
        assert_eq!(field.subscriber_count(), 1);
        drop(kept);
    }

    #[test]
    fn set_if_respects_predicate() {
        let field = ObservableField::new(1);
        assert!(!field.set_if(|v| *v == 2, 10));
        assert_eq!(field.get(), 1);
        assert!(field.set_if(|v| *v == 1, 10));
        assert_eq!(field.get(), 10);
    }
}
