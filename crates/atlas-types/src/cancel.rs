//! Cooperative cancellation.
//!
//! A [`CancelSignal`] is a set of shared flags and reads as cancelled as soon
//! as any one of them is set. Linking two signals concatenates their flags,
//! which gives the "caller AND session" signal every operation runs under.
//!
//! A [`CancellationSource`] owns the session flag. After `cancel()` the
//! session calls `renew()` so later operations start with a clear flag;
//! signals handed out before the renewal stay cancelled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Read side of one or more cancellation flags.
#[derive(Clone, Debug, Default)]
pub struct CancelSignal {
    flags: Vec<Arc<AtomicBool>>,
}

impl CancelSignal {
    /// A signal that can never be cancelled.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags.iter().any(|f| f.load(Ordering::SeqCst))
    }

    /// The conjunction of `self` and `other`: cancelled when either is.
    pub fn linked(&self, other: &CancelSignal) -> CancelSignal {
        let mut flags = self.flags.clone();
        flags.extend(other.flags.iter().cloned());
        CancelSignal { flags }
    }
}

/// Owner of a renewable cancellation flag. Clones share the same flag.
#[derive(Clone, Debug)]
pub struct CancellationSource {
    current: Arc<Mutex<Arc<AtomicBool>>>,
}

impl CancellationSource {
    pub fn new() -> Self {
        Self {
            current: Arc::new(Mutex::new(Arc::new(AtomicBool::new(false)))),
        }
    }

    /// A signal tied to the current flag.
    pub fn signal(&self) -> CancelSignal {
        let flag = self.current.lock().expect("lock poisoned").clone();
        CancelSignal { flags: vec![flag] }
    }

    pub fn cancel(&self) {
        self.current
            .lock()
            .expect("lock poisoned")
            .store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.current.lock().expect("lock poisoned").load(Ordering::SeqCst)
    }

    /// Replace the flag with a fresh one.
    pub fn renew(&self) {
        *self.current.lock().expect("lock poisoned") = Arc::new(AtomicBool::new(false));
    }
}

impl Default for CancellationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_never_cancelled() {
        assert!(!CancelSignal::none().is_cancelled());
    }

    #[test]
    fn linked_signal_follows_either_side() {
        let caller = CancellationSource::new();
        let session = CancellationSource::new();
        let linked = caller.signal().linked(&session.signal());
        assert!(!linked.is_cancelled());

        session.cancel();
        assert!(linked.is_cancelled());
        assert!(!caller.signal().is_cancelled());
    }

    #[test]
    fn renew_clears_future_signals_only() {
        let source = CancellationSource::new();
        let before = source.signal();
        source.cancel();
        source.renew();

        assert!(before.is_cancelled());
        assert!(!source.signal().is_cancelled());
        assert!(!source.is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let source = CancellationSource::new();
        let clone = source.clone();
        let signal = source.signal();
        clone.cancel();
        assert!(signal.is_cancelled());
    }
}
