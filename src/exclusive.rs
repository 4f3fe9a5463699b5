use crate::claim::{self, Claim};
use crate::deleter::deleters::DropBox;
use crate::token::LivenessToken;
use crate::{Deleter, DrainingHandle, SharedObserver};
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

/// The single, fully usable owner of a heap object.
///
/// An `ExclusiveHandle` owns its pointee the way a `Box` does, and additionally hands out
/// [`SharedObserver`]s through [`share`](ExclusiveHandle::share) so that other threads can use the
/// object concurrently. When the owner decides the object should no longer be handed out, it
/// converts the handle into a [`DrainingHandle`] with
/// [`into_draining`](ExclusiveHandle::into_draining) and can then wait for every observer to go
/// away before tearing the object down.
///
/// The handle is move-only. It may also be empty, in which case [`get`](ExclusiveHandle::get)
/// returns `None` and [`share`](ExclusiveHandle::share) returns a null observer.
///
/// Only shared access to the pointee is ever given out, since observers may be reading it at the
/// same time. Use interior mutability for state that needs to change.
///
/// ```rust
/// use drainable::ExclusiveHandle;
///
/// let handle = ExclusiveHandle::new(String::from("entry"));
/// let observer = handle.share();
///
/// let draining = handle.into_draining();
/// assert!(!draining.drained());
///
/// drop(observer);
/// assert!(draining.drained());
/// ```
pub struct ExclusiveHandle<T: ?Sized> {
    inner: Option<Active<T>>,
    _marker: PhantomData<T>,
}

struct Active<T: ?Sized> {
    // Valid for as long as `claim` is held.
    ptr: NonNull<T>,
    claim: Claim,
    token: LivenessToken,
}

// Safety: dropping a handle may release the pointee on this thread, and observers issued from it
// read the pointee from other threads, so T must be both Send and Sync (just like for Arc).
unsafe impl<T: ?Sized + Send + Sync> Send for ExclusiveHandle<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for ExclusiveHandle<T> {}

impl<T: ?Sized> ExclusiveHandle<T> {
    /// Makes a handle that holds nothing.
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
        self.inner.as_ref().map(|a| unsafe { a.ptr.as_ref() })
    }

    /// The address of the pointee, if any. Never dereference it after the handle is gone.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.inner.as_ref().map(|a| a.ptr)
    }

    /// Issues a new observer of the current pointee.
    ///
    /// The observer counts towards the current lineage: once this handle has been converted into a
    /// [`DrainingHandle`], that handle does not report itself drained until the observer (and all
    /// of its clones) are dropped. An empty handle yields a null observer.
    pub fn share(&self) -> SharedObserver<T> {
        match &self.inner {
            Some(a) => SharedObserver::from_parts(a.ptr, a.token.clone()),
            None => SharedObserver::null(),
        }
    }

    /// The number of observers currently outstanding for this pointee.
    pub fn observers(&self) -> usize {
        self.inner.as_ref().map_or(0, |a| a.token.count() - 1)
    }

    /// Drops this handle's claims on the pointee, leaving the handle empty.
    ///
    /// The pointee is destroyed right away unless observers are still holding on to it, in which
    /// case it is destroyed when the last of them is dropped.
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// Stops handing out the pointee and starts draining its observers.
    ///
    /// This gives up the handle's own unit of the liveness count. The returned [`DrainingHandle`]
    /// keeps owning the pointee, but can no longer issue observers.
    pub fn into_draining(self) -> DrainingHandle<T> {
        match self.inner {
            Some(Active { ptr, claim, token }) => {
                let token = token.downgrade();
                log::trace!("handle for {:p} now draining", ptr);
                DrainingHandle::from_parts(ptr, claim, token)
            }
            None => DrainingHandle::empty(),
        }
    }

    /// Moves ownership into a handle for a different view of the same pointee.
    ///
    /// `f` picks the view: a trait object the pointee implements, one of its fields, or anything
    /// else reachable from a `&T`. The storage, the liveness count and any observers
    /// already issued are unaffected.
    pub fn map<U, F>(self, f: F) -> ExclusiveHandle<U>
    where
        T: Send + Sync,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        let inner = self.inner.map(|Active { ptr, claim, token }| {
            // Safety: we hold the claim, so ptr is valid for the duration of the call. The view
            // borrows from the pointee, so it stays valid for as long as the claim is kept.
            let view = f(unsafe { ptr.as_ref() });
            Active {
                ptr: NonNull::from(view),
                claim,
                token,
            }
        });
        ExclusiveHandle {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> ExclusiveHandle<T> {
    /// Allocates `value` on the heap and takes exclusive ownership of it.
    pub fn new(value: T) -> Self {
        Self::from_box(Box::new(value))
    }

    /// Replaces the pointee with a freshly allocated `value`.
    ///
    /// The new pointee starts a new lineage. Observers issued before the reset keep referring to
    /// the old pointee and keep it alive on their own.
    pub fn reset_with(&mut self, value: T) {
        *self = Self::new(value);
    }
}

impl<T: ?Sized + 'static> ExclusiveHandle<T> {
    /// Takes exclusive ownership of an already boxed value.
    pub fn from_box(value: Box<T>) -> Self {
        let ptr = NonNull::from(Box::leak(value));
        // Safety: ptr came from a Box, which is exactly what DropBox releases.
        unsafe { Self::adopt(ptr, DropBox) }
    }

    /// Takes exclusive ownership of a pointer produced by [`Box::into_raw`].
    ///
    /// A null `ptr` produces an empty handle.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or come from [`Box::into_raw`], and must not be used by the caller
    /// afterwards.
    pub unsafe fn from_raw(ptr: *mut T) -> Self {
        // Safety: forwarded to the caller.
        unsafe { Self::from_raw_with_deleter(ptr, DropBox) }
    }

    /// Takes exclusive ownership of `ptr`, to be released with `deleter`.
    ///
    /// The deleter runs exactly once, on whichever thread drops the last claim on the pointee. A
    /// null `ptr` produces an empty handle, and `deleter` is dropped without being called.
    ///
    /// # Safety
    ///
    /// 1. `ptr` must be null or valid as a `&T` until it is passed to `deleter`.
    /// 2. `deleter` must be a valid way to release `ptr`.
    /// 3. Nothing else may release or mutably access `ptr` afterwards.
    pub unsafe fn from_raw_with_deleter<D>(ptr: *mut T, deleter: D) -> Self
    where
        D: Deleter<T> + Send + 'static,
    {
        match NonNull::new(ptr) {
            // Safety: forwarded to the caller.
            Some(ptr) => unsafe { Self::adopt(ptr, deleter) },
            None => Self::empty(),
        }
    }

    /// Replaces the pointee with `ptr`, to be released with `deleter`.
    ///
    /// Behaves like assigning a handle made by
    /// [`from_raw_with_deleter`](ExclusiveHandle::from_raw_with_deleter): the old pointee is
    /// released as by [`reset`](ExclusiveHandle::reset), and a non-null `ptr` starts a new lineage.
    ///
    /// # Safety
    ///
    /// Same as for [`from_raw_with_deleter`](ExclusiveHandle::from_raw_with_deleter).
    pub unsafe fn reset_raw_with_deleter<D>(&mut self, ptr: *mut T, deleter: D)
    where
        D: Deleter<T> + Send + 'static,
    {
        // Safety: forwarded to the caller.
        *self = unsafe { Self::from_raw_with_deleter(ptr, deleter) };
    }

    unsafe fn adopt<D>(ptr: NonNull<T>, deleter: D) -> Self
    where
        D: Deleter<T> + 'static,
    {
        // Safety: forwarded to the caller.
        let claim = unsafe { claim::claim(ptr, deleter) };
        let token = LivenessToken::new(Claim::clone(&claim));
        Self {
            inner: Some(Active { ptr, claim, token }),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Default for ExclusiveHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T: ?Sized + 'static> From<Box<T>> for ExclusiveHandle<T> {
    fn from(value: Box<T>) -> Self {
        Self::from_box(value)
    }
}

impl<T: ?Sized> Deref for ExclusiveHandle<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.get().expect("dereferenced an empty ExclusiveHandle")
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for ExclusiveHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExclusiveHandle")
            .field("value", &self.get())
            .field("observers", &self.observers())
            .finish()
    }
}
