//! Handles the actual memory finnicky details of reference counting.

use core::{alloc::Layout, marker::PhantomData, ptr::NonNull};

use alloc::boxed::Box;

use crate::{ControlBlock, SharedError, Transition};

/// The pair of pointers shared by `SharedPtr` and `WeakPtr`.
///
/// A `RawShared` is a mere copy of the pointers, it does not own anything: the handles wrapping it are responsible for
/// maintaining the counts, and for releasing exactly once each count they acquired.
pub(crate) struct RawShared<T> {
    //  Safety:
    //  -   Suitable: `payload` was obtained from `Box::into_raw`, and is only dereferenced while the owning count > 0.
    payload: NonNull<T>,
    //  Safety:
    //  -   Suitable: `control` was obtained from `Box::into_raw`, and is valid as long as any count is > 0.
    control: NonNull<ControlBlock>,
    _marker: PhantomData<T>,
}

//
//  Construction
//

impl<T> RawShared<T> {
    /// Takes ownership of `payload`, allocating a fresh control block.
    ///
    /// The resulting instance accounts for exactly 1 owning handle.
    ///
    /// #   Panics
    ///
    /// Aborts, as per `handle_alloc_error`, if the control block cannot be allocated.
    #[inline]
    pub(crate) fn new(payload: Box<T>) -> Self {
        let control = Box::new(ControlBlock::new());

        Self::from_parts(payload, control)
    }

    /// Attempts to take ownership of `payload`, allocating a fresh control block.
    ///
    /// The resulting instance accounts for exactly 1 owning handle. On failure, `payload` is dropped.
    #[inline]
    pub(crate) fn try_new(payload: Box<T>) -> Result<Self, SharedError> {
        let control = try_box(ControlBlock::new())?;

        Ok(Self::from_parts(payload, control))
    }

    fn from_parts(payload: Box<T>, control: Box<ControlBlock>) -> Self {
        debug_assert_eq!(1, control.owning_count());

        let payload = NonNull::from(Box::leak(payload));
        let control = NonNull::from(Box::leak(control));

        #[cfg(test)]
        tracking::allocated();

        trace!("control block {:p} allocated", control);

        Self {
            payload,
            control,
            _marker: PhantomData,
        }
    }
}

/// Attempts to allocate memory on the heap and then places `value` into it.
///
/// Returns an error if the allocation fails, rather than aborting as `Box::new` would.
pub(crate) fn try_box<T>(value: T) -> Result<Box<T>, SharedError> {
    let layout = Layout::new::<T>();

    if layout.size() == 0 {
        //  Zero-sized types do not allocate.
        return Ok(Box::new(value));
    }

    //  Safety:
    //  -   NonZero: `layout.size()` is non-zero, as checked above.
    let ptr = unsafe { alloc::alloc::alloc(layout) };

    let Some(ptr) = NonNull::new(ptr.cast::<T>()) else {
        return Err(SharedError::MemoryExhausted);
    };

    //  Safety:
    //  -   Suitable: freshly allocated with the layout of `T`.
    unsafe { ptr.as_ptr().write(value) };

    //  Safety:
    //  -   Compatible: allocated by the global allocator, with `Layout::new::<T>()`, and initialized.
    Ok(unsafe { Box::from_raw(ptr.as_ptr()) })
}

//
//  Accounting
//

impl<T> RawShared<T> {
    /// Accounts for one more owning handle.
    ///
    /// #   Safety
    ///
    /// -   Alive: the caller guarantees that the payload is alive, ie this instance is copied from an owning handle.
    #[inline(always)]
    pub(crate) unsafe fn acquire_owning(self) {
        //  Safety:
        //  -   Lifetime: the owning count is > 0, hence the control block is alive.
        let control = unsafe { self.control() };

        //  Safety:
        //  -   Accounting: the caller creates one more owning handle.
        //  -   Alive: as per pre-condition.
        unsafe { control.increment_owning() };
    }

    /// Attempts to account for one more owning handle, unless the payload is dead.
    ///
    /// Returns whether an owning handle was accounted for.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the caller guarantees that the control block is alive, ie this instance is copied from a handle.
    #[inline(always)]
    pub(crate) unsafe fn try_acquire_owning(self) -> bool {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let control = unsafe { self.control() };

        //  Safety:
        //  -   Accounting: the caller creates one more owning handle on success.
        unsafe { control.try_increment_owning() }
    }

    /// Accounts for one more observing handle.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the caller guarantees that the control block is alive, ie this instance is copied from a handle.
    #[inline(always)]
    pub(crate) unsafe fn acquire_observing(self) {
        //  Safety:
        //  -   Lifetime: as per pre-condition.
        let control = unsafe { self.control() };

        //  Safety:
        //  -   Accounting: the caller creates one more observing handle.
        unsafe { control.increment_observing() };
    }

    /// Releases one owning handle, dropping the payload and deallocating the control block as appropriate.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that this instance represented an owning handle, which is now gone.
    /// -   EndOfLife: if this was the last owning handle, the payload will no longer be accessed.
    #[inline]
    pub(crate) unsafe fn release_owning(self) {
        //  Safety:
        //  -   Lifetime: the owning count is > 0 until decremented, and the reference is not used afterwards.
        //  -   Accounting: as per pre-condition.
        let transition = unsafe { self.control().decrement_owning() };

        if transition == Transition::Retained {
            return;
        }

        debug_assert_eq!(Transition::DropPayload, transition);

        //  Unpins the control block, even if dropping the payload panics.
        let _guard = UnpinGuard(self);

        //  Safety:
        //  -   EndOfLife: as per pre-condition.
        unsafe { self.drop_payload() };
    }

    /// Releases the last owning handle, moving the payload out rather than dropping it.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that this instance represented the last owning handle, which is now gone.
    #[inline]
    pub(crate) unsafe fn release_owning_into_inner(self) -> T {
        //  Safety:
        //  -   Lifetime: the owning count is > 0 until decremented, and the reference is not used afterwards.
        //  -   Accounting: as per pre-condition.
        let transition = unsafe { self.control().decrement_owning() };

        debug_assert_eq!(Transition::DropPayload, transition);

        //  Safety:
        //  -   Suitable: obtained from `Box::into_raw`, the owning count only just reached 0.
        let payload = unsafe { Box::from_raw(self.payload.as_ptr()) };

        //  Safety:
        //  -   Pinned: the payload was moved out.
        unsafe { self.unpin() };

        *payload
    }

    /// Releases one observing handle, deallocating the control block as appropriate.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that this instance represented an observing handle, which is now gone.
    #[inline]
    pub(crate) unsafe fn release_observing(self) {
        //  Safety:
        //  -   Lifetime: the observing count is > 0 until decremented, and the reference is not used afterwards.
        //  -   Accounting: as per pre-condition.
        let transition = unsafe { self.control().decrement_observing() };

        if transition == Transition::Retained {
            return;
        }

        debug_assert_eq!(Transition::Deallocate, transition);

        //  Safety:
        //  -   EndOfLife: both counts are 0, no handle refers to the control block any longer.
        unsafe { self.deallocate_control() };
    }

    /// Releases the pin taken when the owning count reached 0, deallocating the control block as appropriate.
    ///
    /// #   Safety
    ///
    /// -   Pinned: the caller guarantees that the payload was dropped, or moved out, after `DropPayload`.
    #[inline]
    unsafe fn unpin(self) {
        //  Safety:
        //  -   Lifetime: the control block is pinned until unpinned, and the reference is not used afterwards.
        //  -   Pinned: as per pre-condition.
        let transition = unsafe { self.control().unpin() };

        if transition == Transition::Retained {
            trace!("control block {:p} orphaned", self.control);

            return;
        }

        debug_assert_eq!(Transition::Deallocate, transition);

        //  Safety:
        //  -   EndOfLife: both counts are 0, and the pin is released.
        unsafe { self.deallocate_control() };
    }
}

//
//  Access
//

impl<T> RawShared<T> {
    /// Returns a reference to the control block.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the control block is only guaranteed to be alive as long as either count is > 0.
    #[inline(always)]
    pub(crate) unsafe fn control(&self) -> &ControlBlock {
        //  Safety:
        //  -   Convertible: as per pre-condition.
        unsafe { self.control.as_ref() }
    }

    /// Returns a reference to the payload.
    ///
    /// #   Safety
    ///
    /// -   Lifetime: the payload is only guaranteed to be alive as long as the owning count is > 0.
    #[inline(always)]
    pub(crate) unsafe fn payload(&self) -> &T {
        //  Safety:
        //  -   Convertible: as per pre-condition.
        unsafe { self.payload.as_ref() }
    }

    /// Returns a pointer to the payload.
    ///
    /// The pointer MAY be dangling, if the owning count is 0.
    #[inline(always)]
    pub(crate) const fn as_payload_ptr(&self) -> *mut T {
        self.payload.as_ptr()
    }

    /// Returns a pointer to the control block.
    ///
    /// The pointer MAY be dangling, if both counts are 0.
    #[inline(always)]
    pub(crate) const fn as_control_ptr(&self) -> *const ControlBlock {
        self.control.as_ptr()
    }
}

//
//  Clone
//

impl<T> Clone for RawShared<T> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for RawShared<T> {}

//
//  Implementation
//

impl<T> RawShared<T> {
    //  Safety:
    //  -   EndOfLife: the owning count reached 0, the payload will no longer be accessed.
    #[inline(never)]
    unsafe fn drop_payload(self) {
        //  Safety:
        //  -   Suitable: obtained from `Box::into_raw`, as per invariant.
        //  -   EndOfLife: as per pre-condition.
        let payload = unsafe { Box::from_raw(self.payload.as_ptr()) };

        drop(payload);
    }

    //  Safety:
    //  -   EndOfLife: both counts reached 0, the control block will no longer be accessed.
    #[inline(never)]
    unsafe fn deallocate_control(self) {
        trace!("control block {:p} destroyed", self.control);

        #[cfg(test)]
        tracking::deallocated();

        //  Safety:
        //  -   Suitable: obtained from `Box::into_raw`, as per invariant.
        //  -   EndOfLife: as per pre-condition.
        let control = unsafe { Box::from_raw(self.control.as_ptr()) };

        drop(control);
    }
}

//  Releases the pin taken on the control block while the payload is dropped.
struct UnpinGuard<T>(RawShared<T>);

impl<T> Drop for UnpinGuard<T> {
    fn drop(&mut self) {
        //  Safety:
        //  -   Pinned: the payload drop completed, or unwound; the pin is released exactly once, here.
        unsafe { self.0.unpin() };
    }
}


// mod tests
