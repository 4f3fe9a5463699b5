use crate::claim::Claim;
use crate::sync::atomic::{fence, AtomicBool, AtomicUsize, Ordering};
use crate::sync::{Arc, Mutex};
use crate::WakeChannel;
use std::sync::PoisonError;

// Same limit as `Arc`: past this, an overflow could wrap the count back to zero.
const MAX_COUNT: usize = isize::MAX as usize;

/// State shared by everything descended from one population of an exclusive handle.
struct Lineage {
    /// Number of live liveness tokens.
    count: AtomicUsize,
    /// Set once finalize has released `claim`. Never cleared.
    fired: AtomicBool,
    /// The second claim on the pointee's storage, released by finalize.
    claim: Mutex<Option<Claim>>,
    channel: WakeChannel,
}

impl Lineage {
    fn finalize(&self) {
        let claim = self
            .claim
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug_assert!(claim.is_some(), "lineage finalized twice");

        // Announce even if the deleter panics, or waiters would never wake.
        let _announce = Announce(self);
        drop(claim);
    }
}

struct Announce<'a>(&'a Lineage);

impl Drop for Announce<'_> {
    fn drop(&mut self) {
        self.0.fired.store(true, Ordering::Release);
        log::trace!("lineage {:p} drained", self.0);
        self.0.channel.broadcast();
    }
}

/// One unit of a lineage's liveness count.
///
/// The exclusive handle holds one of these for as long as it is active, and every shared observer
/// holds one. Dropping the last token runs finalize exactly once.
pub(crate) struct LivenessToken {
    lineage: Arc<Lineage>,
}

impl LivenessToken {
    /// Starts a new lineage that captures `claim`, returning its first token.
    pub(crate) fn new(claim: Claim) -> Self {
        let lineage = Arc::new(Lineage {
            count: AtomicUsize::new(1),
            fired: AtomicBool::new(false),
            claim: Mutex::new(Some(claim)),
            channel: WakeChannel::new(),
        });
        log::trace!("lineage {:p} created", &*lineage);
        Self { lineage }
    }

    /// The number of live tokens in this lineage, including `self`.
    pub(crate) fn count(&self) -> usize {
        self.lineage.count.load(Ordering::Acquire)
    }

    /// Gives up this token's unit of the count, keeping only the ability to observe the lineage.
    pub(crate) fn downgrade(self) -> WeakToken {
        WeakToken {
            lineage: Arc::clone(&self.lineage),
        }
        // `self` is dropped here, which may run finalize.
    }
}

impl Clone for LivenessToken {
    fn clone(&self) -> Self {
        // Increasing the count can be Relaxed: a new token can only be made from an existing one,
        // and handing that existing one to another thread already provides any required
        // synchronization.
        let old = self.lineage.count.fetch_add(1, Ordering::Relaxed);
        debug_assert_ne!(old, 0, "token cloned from a drained lineage");
        if old > MAX_COUNT {
            std::process::abort();
        }
        Self {
            lineage: Arc::clone(&self.lineage),
        }
    }
}

impl Drop for LivenessToken {
    fn drop(&mut self) {
        if self.lineage.count.fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        // Synchronizes with the decrements of every other token, so that all their uses of the
        // pointee happen before finalize releases the storage.
        fence(Ordering::Acquire);
        self.lineage.finalize();
    }
}

/// A non-counting view of a lineage, used to answer "has it drained?"
pub(crate) struct WeakToken {
    lineage: Arc<Lineage>,
}

impl WeakToken {
    pub(crate) fn drained(&self) -> bool {
        self.lineage.fired.load(Ordering::Acquire)
    }

    pub(crate) fn channel(&self) -> &WakeChannel {
        &self.lineage.channel
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::LivenessToken;
    use std::panic::AssertUnwindSafe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountDrops(Arc<AtomicUsize>);
    impl Drop for CountDrops {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn finalize_releases_captured_claim() {
        let drops = Arc::new(AtomicUsize::new(0));
        let token = LivenessToken::new(Arc::new(CountDrops(Arc::clone(&drops))));
        let other = token.clone();
        assert_eq!(token.count(), 2);

        drop(token);
        assert_eq!(other.count(), 1);
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        let weak = other.downgrade();
        assert!(weak.drained());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn weak_token_does_not_count() {
        let drops = Arc::new(AtomicUsize::new(0));
        let token = LivenessToken::new(Arc::new(CountDrops(Arc::clone(&drops))));
        let keep = token.clone();
        let weak = token.downgrade();
        assert_eq!(keep.count(), 1);
        assert!(!weak.drained());

        drop(keep);
        assert!(weak.drained());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn waiters_wake_when_release_panics() {
        struct PanicOnDrop;
        impl Drop for PanicOnDrop {
            fn drop(&mut self) {
                panic!("deleter failed");
            }
        }

        let token = LivenessToken::new(Arc::new(PanicOnDrop));
        let weak = token.clone().downgrade();
        assert!(!weak.drained());

        let released = std::panic::catch_unwind(AssertUnwindSafe(move || drop(token)));
        assert!(released.is_err());
        assert!(weak.drained());
        weak.channel().wait_until(|| weak.drained());
    }

    #[test]
    fn shared_claim_outlives_finalize() {
        let drops = Arc::new(AtomicUsize::new(0));
        let claim: crate::claim::Claim = Arc::new(CountDrops(Arc::clone(&drops)));
        let token = LivenessToken::new(Arc::clone(&claim));

        let weak = token.downgrade();
        assert!(weak.drained());
        assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(claim);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
