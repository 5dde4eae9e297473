//! Typed event channel.
//!
//! A registry of subscriber callbacks for one event kind. Dispatch is
//! synchronous and in subscription order. The listener list is snapshotted
//! under the lock and the lock released before any callback runs, so a
//! callback may add or remove listeners (including itself) freely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::guard::lock;

/// Token returned by [`Emitter::add`] / [`Emitter::once`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Handler<A, R> = Arc<dyn Fn(&A) -> R + Send + Sync>;

struct Listener<A, R> {
    id: ListenerId,
    once: bool,
    handler: Handler<A, R>,
}

impl<A, R> Clone for Listener<A, R> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            once: self.once,
            handler: Arc::clone(&self.handler),
        }
    }
}

pub struct Emitter<A, R = ()> {
    listeners: Mutex<Vec<Listener<A, R>>>,
    next_id: AtomicU64,
}

impl<A, R> Default for Emitter<A, R> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<A, R> Emitter<A, R> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, once: bool, handler: Handler<A, R>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push(Listener { id, once, handler });
        id
    }

    pub fn add<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        self.push(false, Arc::new(handler))
    }

    /// Add, then immediately call the handler once with `init`.
    pub fn add_and_call<F>(&self, handler: F, init: &A) -> ListenerId
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        let handler: Handler<A, R> = Arc::new(handler);
        let id = self.push(false, Arc::clone(&handler));
        handler(init);
        id
    }

    /// Listener removed right before its first call.
    pub fn once<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&A) -> R + Send + Sync + 'static,
    {
        self.push(true, Arc::new(handler))
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        listeners.len() != before
    }

    /// Call every current listener in order and collect their results.
    pub fn dispatch(&self, args: &A) -> Vec<R> {
        let snapshot: Vec<Listener<A, R>> = {
            let mut listeners = lock(&self.listeners);
            let snapshot = listeners.clone();
            listeners.retain(|l| !l.once);
            snapshot
        };
        snapshot.iter().map(|l| (l.handler)(args)).collect()
    }

    pub fn clear(&self) {
        lock(&self.listeners).clear();
    }

    pub fn len(&self) -> usize {
        lock(&self.listeners).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn dispatch_in_order_and_collect() {
        let e: Emitter<u32, u32> = Emitter::new();
        e.add(|x| x + 1);
        e.add(|x| x * 10);
        assert_eq!(e.dispatch(&2), vec![3, 20]);
    }

    #[test]
    fn once_fires_a_single_time() {
        let hits = Arc::new(AtomicUsize::new(0));
        let e: Emitter<()> = Emitter::new();
        let h = Arc::clone(&hits);
        e.once(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        e.dispatch(&());
        e.dispatch(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(e.is_empty());
    }

    #[test]
    fn remove_by_id() {
        let e: Emitter<u8, u8> = Emitter::new();
        let id = e.add(|x| *x);
        assert!(e.remove(id));
        assert!(!e.remove(id));
        assert!(e.dispatch(&1).is_empty());
    }

    #[test]
    fn add_and_call_runs_immediately() {
        let hits = Arc::new(AtomicUsize::new(0));
        let e: Emitter<bool> = Emitter::new();
        let h = Arc::clone(&hits);
        e.add_and_call(
            move |_| {
                h.fetch_add(1, Ordering::SeqCst);
            },
            &true,
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(e.len(), 1);
    }
}
