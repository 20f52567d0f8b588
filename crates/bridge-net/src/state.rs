//! Shared session state: connection status, session identity, and the
//! bookkeeping the controller and worker both touch.
//!
//! Connection status is broadcast via a [`watch`] channel so consumers can
//! either poll [`ConnectionStateWatch::current`] once per frame or await
//! transitions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use tokio::sync::watch;

use crate::reconnection::{ReconnectConfig, ReconnectState};
use crate::store::EntityStore;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live connection. Initial state.
    Disconnected,
    /// Socket open or handshake in flight.
    Connecting,
    /// Handshake sent, session worker running.
    Connected,
}

/// Connection state cell. Writers publish through [`set`](Self::set); readers
/// either poll [`current`](Self::current) or hold a [`watch::Receiver`].
pub struct ConnectionStateWatch {
    tx: watch::Sender<ConnectionState>,
}

impl Default for ConnectionStateWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateWatch {
    /// Starts out [`ConnectionState::Disconnected`].
    pub fn new() -> Self {
        Self {
            tx: watch::Sender::new(ConnectionState::Disconnected),
        }
    }

    /// Publish `state`. Subscribers are only woken on an actual transition.
    pub fn set(&self, state: ConnectionState) {
        self.tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!("Connection state {current:?} -> {state:?}");
            *current = state;
            true
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }
}

/// Everything shared between the controller, the worker and consumers.
pub(crate) struct SessionShared {
    pub(crate) state: ConnectionStateWatch,
    pub(crate) store: EntityStore,
    identity: RwLock<String>,
    status_message: RwLock<String>,
    retry: Mutex<ReconnectState>,
    epoch: AtomicU64,
}

impl SessionShared {
    pub(crate) fn new(reconnect: ReconnectConfig) -> Self {
        Self {
            state: ConnectionStateWatch::new(),
            store: EntityStore::new(),
            identity: RwLock::new(String::new()),
            status_message: RwLock::new("Disconnected.".to_string()),
            retry: Mutex::new(ReconnectState::new(reconnect)),
            epoch: AtomicU64::new(0),
        }
    }

    pub(crate) fn identity(&self) -> String {
        self.identity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Adopt the identity carried by a `CONNECTED` message.
    ///
    /// A held identity is never replaced; returns `false` if `assigned`
    /// conflicts with it.
    pub(crate) fn adopt_identity(&self, assigned: &str) -> bool {
        let mut identity = self.identity.write().unwrap_or_else(|e| e.into_inner());
        if identity.is_empty() {
            *identity = assigned.to_string();
            true
        } else {
            *identity == assigned
        }
    }

    /// Forget the session identity and every mirrored entity.
    pub(crate) fn clear_session(&self) {
        self.identity
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.store.clear();
    }

    pub(crate) fn status_message(&self) -> String {
        self.status_message
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn set_status_message(&self, message: impl Into<String>) {
        *self
            .status_message
            .write()
            .unwrap_or_else(|e| e.into_inner()) = message.into();
    }

    pub(crate) fn retry(&self) -> MutexGuard<'_, ReconnectState> {
        self.retry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Start a new worker generation and return its number.
    pub(crate) fn next_epoch(&self) -> u64 {
        self.epoch.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Flip to [`ConnectionState::Disconnected`] on behalf of the worker of
    /// generation `epoch`. A stale worker changes nothing.
    pub(crate) fn worker_disconnected(&self, epoch: u64) -> bool {
        if self.epoch.load(Ordering::Acquire) != epoch {
            return false;
        }
        self.state.set(ConnectionState::Disconnected);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connection_state_starts_disconnected() {
        let watch = ConnectionStateWatch::new();
        assert_eq!(watch.current(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_state_watch_subscriber_receives_updates() {
        let watch = ConnectionStateWatch::new();
        let mut rx = watch.subscribe();

        watch.set(ConnectionState::Connecting);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Connecting);

        watch.set(ConnectionState::Connected);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), ConnectionState::Connected);
    }

    #[test]
    fn test_repeated_state_does_not_wake_subscribers() {
        let watch = ConnectionStateWatch::new();
        let rx = watch.subscribe();

        watch.set(ConnectionState::Disconnected);
        assert!(!rx.has_changed().unwrap());

        watch.set(ConnectionState::Connecting);
        assert!(rx.has_changed().unwrap());
    }

    #[test]
    fn test_identity_is_never_reassigned() {
        let shared = SessionShared::new(ReconnectConfig::default());
        assert!(shared.adopt_identity("Client-0"));
        assert!(shared.adopt_identity("Client-0"));
        assert!(!shared.adopt_identity("Client-7"));
        assert_eq!(shared.identity(), "Client-0");

        shared.clear_session();
        assert_eq!(shared.identity(), "");
        assert!(shared.adopt_identity("Client-7"));
    }

    #[test]
    fn test_stale_worker_cannot_flip_state() {
        let shared = SessionShared::new(ReconnectConfig::default());
        let old = shared.next_epoch();
        let current = shared.next_epoch();
        shared.state.set(ConnectionState::Connected);

        assert!(!shared.worker_disconnected(old));
        assert_eq!(shared.state.current(), ConnectionState::Connected);

        assert!(shared.worker_disconnected(current));
        assert_eq!(shared.state.current(), ConnectionState::Disconnected);
    }
}
