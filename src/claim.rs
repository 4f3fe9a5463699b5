use crate::Deleter;
use core::ptr::NonNull;
// Always std's Arc: loom's can not be unsized to `dyn Reclaim`.
use std::sync::Arc;

/// Trait for types that can be dropped (which is all of them).
///
/// A [`Claim`] only needs to be able to drop its storage, so the concrete pointee and deleter
/// types are erased behind `dyn Reclaim`. This is what lets a handle be projected to a different
/// element type without touching the storage it keeps alive.
pub(crate) trait Reclaim {}
impl<T: ?Sized> Reclaim for T {}

/// A type-erased, reference-counted claim on a pointee's storage.
///
/// Every lineage has exactly two clones of its claim: the one held directly by the owning handle
/// and the one captured by the liveness token's finalizer. The storage is released once both are
/// gone.
pub(crate) type Claim = Arc<dyn Reclaim>;

struct Storage<T: ?Sized, D: Deleter<T>> {
    ptr: NonNull<T>,
    deleter: D,
}

impl<T: ?Sized, D: Deleter<T>> Drop for Storage<T, D> {
    fn drop(&mut self) {
        // Safety: by the contract on `claim`, ptr was allocated to match the deleter, and
        // Storage owns it exclusively so this is the only call to delete.
        unsafe { self.deleter.delete(self.ptr.as_ptr()) };
    }
}

/// Wraps `ptr` in a fresh [`Claim`] that will call `deleter` when released.
///
/// # Safety
///
/// 1. `ptr` must be valid as a `&T` until `deleter` is invoked on it.
/// 2. `deleter` must be a valid way to release `ptr`.
/// 3. Nothing else may release `ptr`.
pub(crate) unsafe fn claim<T, D>(ptr: NonNull<T>, deleter: D) -> Claim
where
    T: ?Sized + 'static,
    D: Deleter<T> + 'static,
{
    Arc::new(Storage { ptr, deleter })
}
