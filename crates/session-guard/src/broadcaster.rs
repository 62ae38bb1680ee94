//! Authenticated-verdict notifications.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Emitted whenever the authenticated verdict flips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStateChanged {
    pub is_authenticated: bool,
}

/// Listener registered with [`SessionStateBroadcaster::subscribe`].
pub type SessionListener = Arc<dyn Fn(SessionStateChanged) + Send + Sync>;

/// Fans verdict changes out to callback listeners and a `watch` channel.
pub struct SessionStateBroadcaster {
    listeners: Mutex<Vec<SessionListener>>,
    verdict: watch::Sender<bool>,
}

impl SessionStateBroadcaster {
    pub fn new(is_authenticated: bool) -> Self {
        let (verdict, _) = watch::channel(is_authenticated);
        Self {
            listeners: Mutex::new(Vec::new()),
            verdict,
        }
    }

    /// Register a listener. Registering the same `Arc` twice is a no-op and
    /// returns `false`.
    pub fn subscribe(&self, listener: SessionListener) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Remove a listener previously passed to [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&self, listener: &SessionListener) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    /// Receiver that always holds the latest verdict.
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.verdict.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        *self.verdict.borrow()
    }

    /// Record the current verdict. Listeners run only when it differs from the
    /// previous one. Returns whether it did.
    pub fn publish(&self, is_authenticated: bool) -> bool {
        let flipped = self.verdict.send_if_modified(|current| {
            if *current == is_authenticated {
                return false;
            }
            *current = is_authenticated;
            true
        });
        if !flipped {
            return false;
        }

        debug!(is_authenticated, "Session verdict changed");

        // Listeners may subscribe or unsubscribe from inside the callback.
        let listeners = self.listeners.lock().clone();
        let event = SessionStateChanged { is_authenticated };
        for listener in listeners {
            listener(event);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_listener() -> (SessionListener, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        let listener: SessionListener = Arc::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });
        (listener, count)
    }

    #[test]
    fn test_emits_once_per_flip() {
        let broadcaster = SessionStateBroadcaster::new(false);
        let (listener, count) = counting_listener();
        broadcaster.subscribe(listener);

        assert!(broadcaster.publish(true));
        assert!(!broadcaster.publish(true));
        assert!(broadcaster.publish(false));
        assert!(!broadcaster.publish(false));

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_resubscribe_is_idempotent() {
        let broadcaster = SessionStateBroadcaster::new(true);
        let (listener, count) = counting_listener();

        assert!(broadcaster.subscribe(listener.clone()));
        assert!(!broadcaster.subscribe(listener.clone()));

        broadcaster.publish(false);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let broadcaster = SessionStateBroadcaster::new(false);
        let (listener, count) = counting_listener();
        broadcaster.subscribe(listener.clone());

        assert!(broadcaster.unsubscribe(&listener));
        assert!(!broadcaster.unsubscribe(&listener));

        broadcaster.publish(true);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_receives_verdict() {
        let broadcaster = SessionStateBroadcaster::new(true);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        broadcaster.subscribe(Arc::new(move |event: SessionStateChanged| {
            seen_clone.lock().push(event.is_authenticated);
        }));

        broadcaster.publish(false);
        broadcaster.publish(true);
        assert_eq!(*seen.lock(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_watch_observes_latest_verdict() {
        let broadcaster = SessionStateBroadcaster::new(false);
        let mut rx = broadcaster.watch();
        assert!(!*rx.borrow());

        broadcaster.publish(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
        assert!(broadcaster.is_authenticated());
    }
}
