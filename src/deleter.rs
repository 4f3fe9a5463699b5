/// Releases the storage behind a pointer adopted by an
/// [`ExclusiveHandle`](crate::ExclusiveHandle).
///
/// A deleter runs exactly once, on whichever thread gives up the last claim on the storage. That
/// may be the thread dropping the [`DrainingHandle`](crate::DrainingHandle), or the thread dropping
/// the last [`SharedObserver`](crate::SharedObserver).
pub trait Deleter<T: ?Sized> {
    /// # Safety
    ///
    /// `ptr` must have been allocated by the allocation method this deleter corresponds to.
    /// delete must be called at most once for each `ptr`.
    unsafe fn delete(&self, ptr: *mut T);
}

impl<T: ?Sized, F> Deleter<T> for F
where
    F: Fn(*mut T),
{
    unsafe fn delete(&self, ptr: *mut T) {
        (self)(ptr)
    }
}

pub mod deleters {
    use super::Deleter;

    /// Reconstructs and drops the `Box` a pointer came from.
    ///
    /// This is the deleter used by [`ExclusiveHandle::new`](crate::ExclusiveHandle::new) and
    /// [`ExclusiveHandle::from_raw`](crate::ExclusiveHandle::from_raw).
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DropBox;

    impl<T: ?Sized> Deleter<T> for DropBox {
        unsafe fn delete(&self, ptr: *mut T) {
            // Safety: the caller promises that ptr came from Box::into_raw and is released once.
            let _ = unsafe { Box::from_raw(ptr) };
        }
    }

    /// Runs the pointee's destructor without freeing its memory.
    ///
    /// Useful for objects placed in memory that something else owns, such as an arena slot.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct DropInPlace;

    impl<T: ?Sized> Deleter<T> for DropInPlace {
        unsafe fn delete(&self, ptr: *mut T) {
            // Safety: the caller promises ptr is valid and released once.
            unsafe { core::ptr::drop_in_place(ptr) };
        }
    }
}
