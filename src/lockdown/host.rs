// src/lockdown/host.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;

/// A window lifecycle event reported by the host controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Blur,
    LeaveFullscreen,
    MinimizeAttempt,
    CloseAttempt,
    /// Raw key chord, e.g. "Alt+Tab" or "Ctrl+Shift+I".
    KeyChord(String),
}

/// Failure of a host-window command. Command failures are never fatal to the
/// session; they are logged and the release protocol retries.
#[derive(Debug, Clone)]
pub struct HostError(pub String);

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host window command failed: {}", self.0)
    }
}

impl std::error::Error for HostError {}

/// The OS-level restricted-window manager, external to this core.
///
/// One controller is shared per attempt. Only the session's event-forwarding
/// path and the release protocol may issue commands on it.
#[async_trait]
pub trait HostWindowController: Send + Sync {
    async fn open_restricted_window(&self, quiz_id: i64) -> Result<(), HostError>;

    /// Lift kiosk/fullscreen enforcement, re-enable closability, remove
    /// always-on-top. Must be called before `close_restricted_window`: a
    /// controller still enforcing closability rejects the close.
    async fn release_restrictions(&self) -> Result<(), HostError>;

    async fn close_restricted_window(&self) -> Result<(), HostError>;

    /// Event-emission contract; the session registers one subscription per
    /// event kind and cancels them all at teardown.
    fn events(&self) -> &EventHub;
}

/// Lockdown release protocol.
///
/// Restrictions are lifted before the close is attempted: a controller that
/// is still enforcing closability rejects the close request. The
/// confirmation delay sits between the two. A failed release is retried
/// once immediately; a rejected close gets one more release+close cycle.
/// Failures are logged and never propagated into the session.
pub async fn release_lockdown(host: &dyn HostWindowController) {
    if let Err(e) = host.release_restrictions().await {
        tracing::warn!("release_restrictions failed: {}; retrying", e);
        if let Err(e) = host.release_restrictions().await {
            tracing::error!("release_restrictions retry failed: {}", e);
        }
    }

    tokio::time::sleep(crate::config::POST_SUBMIT_DELAY).await;

    if let Err(e) = host.close_restricted_window().await {
        tracing::warn!("close rejected: {}; re-releasing restrictions", e);
        if let Err(e) = host.release_restrictions().await {
            tracing::error!("release_restrictions retry failed: {}", e);
        }
        if let Err(e) = host.close_restricted_window().await {
            tracing::error!("close_restricted_window retry failed: {}", e);
        }
    }
}

type Callback = Box<dyn Fn(&HostEvent) + Send + Sync>;

struct HubInner {
    next_id: u64,
    callbacks: HashMap<u64, Callback>,
}

/// Registry of host-event callbacks with explicit unsubscription.
///
/// Each `on_*` registration returns a [`Subscription`] that removes the
/// callback when cancelled; after cancellation the callback can never fire
/// again.
pub struct EventHub {
    inner: Arc<Mutex<HubInner>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubInner {
                next_id: 1,
                callbacks: HashMap::new(),
            })),
        }
    }

    fn subscribe(&self, callback: Callback) -> Subscription {
        let mut inner = self.inner.lock().expect("event hub poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        inner.callbacks.insert(id, callback);
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    pub fn on_blur(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(Box::new(move |event| {
            if matches!(event, HostEvent::Blur) {
                f();
            }
        }))
    }

    pub fn on_leave_fullscreen(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(Box::new(move |event| {
            if matches!(event, HostEvent::LeaveFullscreen) {
                f();
            }
        }))
    }

    pub fn on_minimize_attempt(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(Box::new(move |event| {
            if matches!(event, HostEvent::MinimizeAttempt) {
                f();
            }
        }))
    }

    pub fn on_close_attempt(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.subscribe(Box::new(move |event| {
            if matches!(event, HostEvent::CloseAttempt) {
                f();
            }
        }))
    }

    pub fn on_forbidden_key_chord(
        &self,
        f: impl Fn(&str) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe(Box::new(move |event| {
            if let HostEvent::KeyChord(chord) = event {
                f(chord);
            }
        }))
    }

    /// Deliver an event to every live subscription.
    pub fn emit(&self, event: HostEvent) {
        let inner = self.inner.lock().expect("event hub poisoned");
        for callback in inner.callbacks.values() {
            callback(&event);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().expect("event hub poisoned").callbacks.len()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle for one registered callback. Cancelling (or dropping) removes the
/// callback from the hub.
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn cancel(self) {
        // Removal happens in Drop.
    }

    fn remove(&self) {
        if let Some(inner) = self.hub.upgrade() {
            inner
                .lock()
                .expect("event hub poisoned")
                .callbacks
                .remove(&self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn callbacks_fire_only_for_their_kind() {
        let hub = EventHub::new();
        let blurs = Arc::new(AtomicUsize::new(0));
        let chords = Arc::new(AtomicUsize::new(0));

        let b = blurs.clone();
        let _s1 = hub.on_blur(move || {
            b.fetch_add(1, Ordering::SeqCst);
        });
        let c = chords.clone();
        let _s2 = hub.on_forbidden_key_chord(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(HostEvent::Blur);
        hub.emit(HostEvent::KeyChord("Alt+Tab".into()));
        hub.emit(HostEvent::MinimizeAttempt);

        assert_eq!(blurs.load(Ordering::SeqCst), 1);
        assert_eq!(chords.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancelled_subscription_never_fires_again() {
        let hub = EventHub::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = count.clone();
        let sub = hub.on_blur(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        hub.emit(HostEvent::Blur);
        sub.cancel();
        hub.emit(HostEvent::Blur);
        hub.emit(HostEvent::Blur);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(hub.len(), 0);
    }
}
