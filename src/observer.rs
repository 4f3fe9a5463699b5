use crate::token::LivenessToken;
use core::fmt;
use core::marker::PhantomData;
use core::ops::Deref;
use core::ptr::NonNull;

/// A cloneable reference to an object owned by an [`ExclusiveHandle`](crate::ExclusiveHandle).
///
/// Observers keep the object alive, and every live observer holds off the moment its lineage
/// counts as drained. They never own the object outright though: they cannot be turned back into
/// a handle, and an observer whose handle has already been converted to a
/// [`DrainingHandle`](crate::DrainingHandle) only delays teardown.
///
/// Observers can be cloned, sent to other threads, and dropped in any order. A null observer
/// (from [`Default`], or from sharing an empty handle) refers to nothing.
pub struct SharedObserver<T: ?Sized> {
    inner: Option<Alias<T>>,
    _marker: PhantomData<T>,
}

struct Alias<T: ?Sized> {
    // Valid for as long as `token` is held, since the lineage's finalizer keeps the storage
    // claimed until the last token is gone.
    ptr: NonNull<T>,
    token: LivenessToken,
}

// Safety: an observer gives out &T on any thread, and dropping it may release the pointee on any
// thread.
unsafe impl<T: ?Sized + Send + Sync> Send for SharedObserver<T> {}
unsafe impl<T: ?Sized + Send + Sync> Sync for SharedObserver<T> {}

impl<T: ?Sized> SharedObserver<T> {
    pub(crate) fn from_parts(ptr: NonNull<T>, token: LivenessToken) -> Self {
        Self {
            inner: Some(Alias { ptr, token }),
            _marker: PhantomData,
        }
    }

    /// Makes an observer that refers to nothing.
    pub const fn null() -> Self {
        Self {
            inner: None,
            _marker: PhantomData,
        }
    }

    pub fn is_null(&self) -> bool {
        self.inner.is_none()
    }

    pub fn get(&self) -> Option<&T> {
        // Safety: the pointer is valid for as long as we hold the token.
        self.inner.as_ref().map(|a| unsafe { a.ptr.as_ref() })
    }

    /// The address this observer refers to.
    pub fn as_ptr(&self) -> Option<NonNull<T>> {
        self.inner.as_ref().map(|a| a.ptr)
    }

    /// Releases this observer, leaving it null.
    pub fn reset(&mut self) {
        self.inner = None;
    }

    /// The number of live units in this observer's lineage.
    ///
    /// That is every observer of the same pointee, plus one for the exclusive handle if it has not
    /// been converted yet. A null observer reports 0.
    pub fn use_count(&self) -> usize {
        self.inner.as_ref().map_or(0, |a| a.token.count())
    }

    /// Returns `true` if both observers refer to the same address.
    ///
    /// Two null observers are equal.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        match (&this.inner, &other.inner) {
            (Some(a), Some(b)) => a.ptr.cast::<u8>() == b.ptr.cast::<u8>(),
            (None, None) => true,
            _ => false,
        }
    }

    /// Projects this observer onto a different view of the same pointee.
    ///
    /// See [`ExclusiveHandle::map`](crate::ExclusiveHandle::map).
    pub fn map<U, F>(self, f: F) -> SharedObserver<U>
    where
        T: Send + Sync,
        U: ?Sized,
        F: FnOnce(&T) -> &U,
    {
        let inner = self.inner.map(|Alias { ptr, token }| {
            // Safety: we hold a token, so ptr is valid for the duration of the call, and the view
            // borrows from the pointee.
            let view = f(unsafe { ptr.as_ref() });
            Alias {
                ptr: NonNull::from(view),
                token,
            }
        });
        SharedObserver {
            inner,
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Clone for SharedObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.as_ref().map(|a| Alias {
                ptr: a.ptr,
                token: a.token.clone(),
            }),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> Default for SharedObserver<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T: ?Sized> Deref for SharedObserver<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.get().expect("dereferenced a null SharedObserver")
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SharedObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedObserver").field(&self.get()).finish()
    }
}
