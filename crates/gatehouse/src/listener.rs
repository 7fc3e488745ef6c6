//! Fan-out to observers interested in newly authenticated peers.
//!
//! Admission control, presence, and moderation typically register here to
//! learn which identity sits behind a connection.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use gatehouse_protocol::{PeerAddress, SessionToken};

/// Notified every time a peer authenticates.
///
/// Called synchronously on the request task, after the registry lock has
/// been released. Keep it short; hand off anything slow.
pub trait AuthenticationListener: Send + Sync + 'static {
    fn peer_authenticated(
        &self,
        peer: &PeerAddress,
        identity: &str,
        token: &SessionToken,
    );
}

impl<F> AuthenticationListener for F
where
    F: Fn(&PeerAddress, &str, &SessionToken) + Send + Sync + 'static,
{
    fn peer_authenticated(
        &self,
        peer: &PeerAddress,
        identity: &str,
        token: &SessionToken,
    ) {
        self(peer, identity, token)
    }
}

/// Registered listeners, in registration order.
#[derive(Default)]
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn AuthenticationListener>>>,
}

impl ListenerSet {
    /// Adds a listener. Adding the same handle twice is a no-op.
    pub(crate) fn add(&self, listener: Arc<dyn AuthenticationListener>) -> bool {
        let mut listeners = self.lock();
        if listeners.iter().any(|l| same_listener(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Removes a listener. Returns `false` if it wasn't registered.
    pub(crate) fn remove(&self, listener: &Arc<dyn AuthenticationListener>) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|l| !same_listener(l, listener));
        listeners.len() != before
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Calls every listener in order. A listener that panics is logged and
    /// skipped; the others still run.
    pub(crate) fn notify(
        &self,
        peer: &PeerAddress,
        identity: &str,
        token: &SessionToken,
    ) {
        // Snapshot so a listener can (un)register listeners without
        // deadlocking on the list.
        let snapshot: Vec<_> = self.lock().clone();

        for (index, listener) in snapshot.iter().enumerate() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                listener.peer_authenticated(peer, identity, token)
            }));
            if let Err(payload) = outcome {
                tracing::warn!(
                    index,
                    %peer,
                    panic = panic_message(payload.as_ref()),
                    "authentication listener panicked"
                );
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Arc<dyn AuthenticationListener>>> {
        // Listeners run outside this lock, so poisoning can only come from
        // a panic in `Vec` itself; the list is still usable.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identity comparison on the data pointer only; vtable pointers for the
/// same type may differ between codegen units.
fn same_listener(
    a: &Arc<dyn AuthenticationListener>,
    b: &Arc<dyn AuthenticationListener>,
) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}
