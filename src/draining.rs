use crate::claim::Claim;
use crate::token::WeakToken;
use crate::{ExclusiveHandle, WaitStatus, WakeChannel};
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;
use std::time::{Duration, Instant};

/// The owner of an object that is no longer being handed out.
///
/// A `DrainingHandle` is made by converting an [`ExclusiveHandle`]. It still owns the object, and
/// the object can still be reached through it, but it cannot issue new
/// [`SharedObserver`](crate::SharedObserver)s. Instead it reports whether the observers issued
/// earlier have all gone away, and lets threads block until they have.
///
/// Dropping (or [`reset`](DrainingHandle::reset)ting) the handle gives up its claim on the object.
/// The object is destroyed once that has happened _and_ the lineage has drained, in whichever
/// order the two occur.
///
/// An empty `DrainingHandle`, such as one converted from an empty `ExclusiveHandle` or one that
/// has been reset, has nothing to wait for: it always reports itself as drained, and
/// [`wait`](DrainingHandle::wait) returns immediately.
///
/// ```rust
/// use drainable::ExclusiveHandle;
/// use std::thread;
///
/// let handle = ExclusiveHandle::new(vec![1, 2, 3]);
/// let workers: Vec<_> = (0..4)
///     .map(|_| {
///         let observer = handle.share();
///         thread::spawn(move || observer.iter().sum::<i32>())
///     })
///     .collect();
///
/// let draining = handle.into_draining();
/// draining.wait();
/// assert!(draining.drained());
/// # for w in workers { assert_eq!(w.join().unwrap(), 6); }
/// ```
pub struct DrainingHandle<T: ?Sized> {
    inner: Option<Retiring<T>>,
    _marker: PhantomData<T>,
}

struct Retiring<T: ?Sized> {
    // Valid for as long as `claim` is held.
    ptr: NonNull<T>,
    claim: Claim,
    token: WeakToken,
}

// Safety: same reasoning as for ExclusiveHandle.
unsafe impl<T: ?Sized + Send + Sync> Send for DrainingHandle<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for DrainingHandle<T> {}

impl<T: ?Sized> DrainingHandle<T> {
    pub(crate) fn from_parts(ptr: NonNull<T>, claim: Claim, token: WeakToken) -> Self {
        Self {
            inner: Some(Retiring { ptr, claim, token }),
            _marker: PhantomData,
        }
    }

    /// Makes a handle that holds nothing, and so is always drained.
    pub const fn empty() -> Self {
        Self {
            inner: None,
            _marker: PhantomData,
        }
    }

    /// Returns `true` if there is no pointee.
    pub fn is_empty(&self) -> bool {
        self.inner.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        // Safety: the pointer is valid for as long as we hold the claim.
        self.inner.as_ref().map(|r| unsafe { r.ptr.as_ref() })
    }

    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.inner.as_ref().map(|r| r.ptr)
    }

    /// Returns `true` once every observer of the pointee has been dropped.
    ///
    /// Once this has returned `true` it keeps doing so. An empty handle is always drained.
    pub fn drained(&self) -> bool {
        self.inner.as_ref().map_or(true, |r| r.token.drained())
    }

    /// Blocks the current thread until [`drained`](DrainingHandle::drained) returns `true`.
    pub fn wait(&self) {
        self.wait_until(|| self.drained());
    }

    /// Blocks the current thread until `predicate` returns `true`.
    ///
    /// The predicate is checked up front, and again every time the thread is woken, which happens
    /// when the lineage drains or spuriously. It usually includes
    /// [`drained`](DrainingHandle::drained), for example to also stop on an external cancellation
    /// flag. Note that nothing wakes the thread when only that flag changes; pair it with
    /// [`wait_timeout_until`](DrainingHandle::wait_timeout_until) to poll it.
    pub fn wait_until<F>(&self, predicate: F)
    where
        F: FnMut() -> bool,
    {
        self.with_channel(|channel| channel.wait_until(predicate))
    }

    /// Blocks until drained or until `timeout` has elapsed, whichever comes first.
    pub fn wait_timeout(&self, timeout: Duration) -> WaitStatus {
        self.wait_timeout_until(timeout, || self.drained())
    }

    /// Blocks until drained or until `deadline` is reached, whichever comes first.
    pub fn wait_deadline(&self, deadline: Instant) -> WaitStatus {
        self.wait_deadline_until(deadline, || self.drained())
    }

    /// Like [`wait_until`](DrainingHandle::wait_until), but gives up after `timeout`.
    pub fn wait_timeout_until<F>(&self, timeout: Duration, predicate: F) -> WaitStatus
    where
        F: FnMut() -> bool,
    {
        let status = self.with_channel(|channel| channel.wait_timeout_until(timeout, predicate));
        if status.timed_out() {
            log::trace!("drain wait timed out after {:?}", timeout);
        }
        status
    }

    /// Like [`wait_until`](DrainingHandle::wait_until), but gives up at `deadline`.
    pub fn wait_deadline_until<F>(&self, deadline: Instant, predicate: F) -> WaitStatus
    where
        F: FnMut() -> bool,
    {
        let status = self.with_channel(|channel| channel.wait_deadline_until(deadline, predicate));
        if status.timed_out() {
            log::trace!("drain wait reached its deadline");
        }
        status
    }

    /// Gives up this handle's claim on the pointee, leaving the handle empty.
    ///
    /// If the lineage has already drained, this destroys the pointee. Otherwise the pointee is
    /// destroyed when the last observer is dropped.
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// Moves ownership into a handle for a different view of the same pointee.
    ///
    /// See [`ExclusiveHandle::map`].
    pub fn map<U, F>(self, f: F) -> DrainingHandle<U>
    where
        T: Send + Sync,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        let inner = self.inner.map(|Retiring { ptr, claim, token }| {
            // Safety: we hold the claim, so ptr is valid for the duration of the call, and the
            // view borrows from the pointee.
            let view = f(unsafe { ptr.as_ref() });
            Retiring {
                ptr: NonNull::from(view),
                claim,
                token,
            }
        });
        DrainingHandle {
            inner,
            _marker: PhantomData,
        }
    }

    fn with_channel<R>(&self, f: impl FnOnce(&WakeChannel) -> R) -> R {
        match &self.inner {
            Some(r) => f(r.token.channel()),
            // Nothing will ever broadcast here, just like on a lineage that drained long ago, so
            // any channel gives the same behavior.
            None => f(&WakeChannel::new()),
        }
    }
}

impl<T: ?Sized> Default for DrainingHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized> From<ExclusiveHandle<T>> for DrainingHandle<T> {
    fn from(handle: ExclusiveHandle<T>) -> Self {
        handle.into_draining()
    }
}

impl<T: ?Sized> Deref for DrainingHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.get().expect("dereferenced an empty DrainingHandle")
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for DrainingHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DrainingHandle")
            .field("value", &self.get())
            .field("drained", &self.drained())
            .finish()
    }
}
