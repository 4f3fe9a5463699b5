//! Single-owner handles whose shared observers can be drained before teardown.
//!
//! Some objects need different ownership guarantees at different points in their life. While an
//! object is _active_ it has one owner, but that owner lends it out to other threads for
//! concurrent use. Later the owner _retires_ the object: nothing new should start using it, but
//! work already in flight may finish. Only once that work is done is the object actually torn
//! down. A registry that hands entries out to worker threads, and has to wait for all in-flight
//! requests before reclaiming an entry, is the typical example.
//!
//! This crate models those phases with three handle types:
//!
//!  - [`ExclusiveHandle`] is the active owner. It is move-only and issues observers through
//!    [`ExclusiveHandle::share`].
//!  - [`SharedObserver`] is a cloneable reference to the object that can be sent to other threads
//!    and may outlive everything else.
//!  - [`DrainingHandle`] is what the owner becomes once it retires the object with
//!    [`ExclusiveHandle::into_draining`]. It still owns the object, but can no longer issue
//!    observers. Instead it can tell whether all observers are gone
//!    ([`DrainingHandle::drained`]) and block until they are ([`DrainingHandle::wait`] and its
//!    timed variants), without polling.
//!
//! Under the hood, every population of an exclusive handle starts a _lineage_: a liveness count
//! that the exclusive handle and every observer take part in, and a [`WakeChannel`] that is
//! broadcast on when that count reaches zero. The object's storage is claimed twice, once by the
//! owning handle and once by the lineage's finalizer, and it is only released once both claims
//! are gone. So neither dropping the draining handle early nor holding on to an observer for too
//! long can cause the object to be destroyed twice or while still in use.
//!
//! ```rust
//! use drainable::ExclusiveHandle;
//! use std::time::Duration;
//!
//! let handle = ExclusiveHandle::new(42);
//! let first = handle.share();
//! let second = first.clone();
//!
//! let draining = handle.into_draining();
//! drop(first);
//! assert!(draining.wait_timeout(Duration::from_millis(10)).timed_out());
//!
//! drop(second);
//! draining.wait();
//! assert_eq!(*draining, 42);
//! ```
//!
//! The crate does not synchronize access to the object itself; only shared references are ever
//! given out, so use interior mutability where state needs to change.
//!
//! # Logging
//!
//! Lineage creation, conversion to draining, finalization and wait timeouts are reported through
//! the [`log`] facade at `trace` level.

#![deny(unsafe_op_in_unsafe_fn)]

mod channel;
mod claim;
mod deleter;
mod draining;
mod exclusive;
mod observer;
mod sync;
mod token;

pub use channel::{WaitStatus, WakeChannel};
pub use deleter::{deleters, Deleter};
pub use draining::DrainingHandle;
pub use exclusive::ExclusiveHandle;
pub use observer::SharedObserver;

#[cfg(doctest)]
mod fails {
    /// ```compile_fail
    /// use drainable::ExclusiveHandle;
    ///
    /// let handle = ExclusiveHandle::new(1);
    /// let _copy = Clone::clone(&handle);
    /// ```
    struct CannotCloneExclusive;

    /// ```compile_fail
    /// use drainable::ExclusiveHandle;
    ///
    /// let handle = ExclusiveHandle::new(1);
    /// let draining = handle.into_draining();
    /// let _again = handle.into_draining();
    /// ```
    struct CannotConvertTwice;

    /// ```compile_fail
    /// use drainable::ExclusiveHandle;
    ///
    /// let draining = ExclusiveHandle::new(1).into_draining();
    /// let _observer = draining.share();
    /// ```
    struct CannotShareWhileDraining;

    /// ```compile_fail
    /// use drainable::ExclusiveHandle;
    /// use std::rc::Rc;
    ///
    /// let handle = ExclusiveHandle::new(Rc::new(1));
    /// let observer = handle.share();
    /// std::thread::spawn(move || drop(observer));
    /// ```
    struct CannotSendNonSendObserver;
}
