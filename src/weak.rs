//! The observing handle, equivalent of `Weak<T>`.

use core::{
    fmt,
    panic::{RefUnwindSafe, UnwindSafe},
    ptr,
};

use crate::{RawShared, SharedPtr};

/// An observing handle to a payload `T`, equivalent to `Weak<T>`.
///
/// A `WeakPtr` keeps the control block alive, but not the payload. It can only ever tell whether the payload is still
/// alive; accessing the payload requires promoting it to a `SharedPtr` first, via `lock`.
pub struct WeakPtr<T> {
    //  The payload pointer is a cache, only ever dereferenced by the `SharedPtr` obtained by `lock`.
    inner: Option<RawShared<T>>,
}

//
//  Construction
//

impl<T> WeakPtr<T> {
    /// Constructs an empty instance, which observes nothing.
    ///
    /// It is always expired.
    #[inline(always)]
    pub const fn new() -> Self {
        Self { inner: None }
    }

    /// Attempts to promote `this` to an owning handle.
    ///
    /// Returns an empty `SharedPtr`, without touching any count, if `this` is expired. Otherwise, the owning count is
    /// incremented by exactly 1, and the observing count is untouched.
    pub fn lock(this: &Self) -> SharedPtr<T> {
        if Self::is_expired(this) {
            return SharedPtr::empty();
        }

        SharedPtr::upgrade(this)
    }

    /// Moves the observed control block, if any, out of `this` into a new instance, leaving `this` empty.
    ///
    /// The counts are untouched.
    #[inline(always)]
    pub fn take(this: &mut Self) -> Self {
        let inner = this.inner.take();

        Self { inner }
    }
}

//
//  High-level Access
//

impl<T> WeakPtr<T> {
    /// Returns whether `this` is empty, ie observes no control block at all.
    #[inline(always)]
    pub const fn is_empty(this: &Self) -> bool {
        this.inner.is_none()
    }

    /// Returns whether the payload has been dropped, or `this` is empty.
    ///
    /// Once expired, a `WeakPtr` never becomes alive again.
    #[inline]
    pub fn is_expired(this: &Self) -> bool {
        //  Safety:
        //  -   Lifetime: `this` holds an observing count, hence the control block is alive.
        this.inner.as_ref().map_or(true, |raw| !unsafe { raw.control() }.is_alive())
    }

    /// Returns the number of owning handles, ie non-empty `SharedPtr`, or 0 if empty.
    #[inline]
    pub fn owning_count(this: &Self) -> u64 {
        //  Safety:
        //  -   Lifetime: `this` holds an observing count, hence the control block is alive.
        this.inner.as_ref().map_or(0, |raw| unsafe { raw.control() }.owning_count())
    }

    /// Returns the number of observing handles, ie non-empty `WeakPtr`, or 0 if empty.
    #[inline]
    pub fn observing_count(this: &Self) -> u64 {
        //  Safety:
        //  -   Lifetime: `this` holds an observing count, hence the control block is alive.
        this.inner.as_ref().map_or(0, |raw| unsafe { raw.control() }.observing_count())
    }

    /// Returns whether both handles share the same control block, or are both empty.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        let control = |inner: &Option<RawShared<T>>| inner.as_ref().map_or(ptr::null(), RawShared::as_control_ptr);

        control(&this.inner) == control(&other.inner)
    }
}

//
//  Crate Access
//

impl<T> WeakPtr<T> {
    /// Returns a copy of the pointers, if any.
    #[inline(always)]
    pub(crate) fn as_raw(this: &Self) -> Option<RawShared<T>> {
        this.inner
    }
}

//
//  Destruction
//

impl<T> WeakPtr<T> {
    //  Empties `this`, first, then releases its observing count, if any.
    //
    //  Idempotent: releasing an empty instance does nothing.
    fn release(this: &mut Self) {
        let Some(raw) = this.inner.take() else { return };

        //  Safety:
        //  -   Accounting: `this` no longer represents an observing handle.
        unsafe { raw.release_observing() };
    }
}

impl<T> Drop for WeakPtr<T> {
    fn drop(&mut self) {
        Self::release(self);
    }
}

//
//  Clone
//

impl<T> Clone for WeakPtr<T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.inner {
            //  Safety:
            //  -   Lifetime: `self` holds an observing count.
            unsafe { raw.acquire_observing() };
        }

        Self { inner: self.inner }
    }

    fn clone_from(&mut self, source: &Self) {
        //  Observing the same control block, or both empty: nothing changes.
        if Self::ptr_eq(self, source) {
            return;
        }

        Self::release(self);

        *self = source.clone();
    }
}

impl<T> Default for WeakPtr<T> {
    #[inline(always)]
    fn default() -> Self {
        Self::new()
    }
}

//
//  Conversions
//

impl<T> From<&SharedPtr<T>> for WeakPtr<T> {
    fn from(shared: &SharedPtr<T>) -> Self {
        let inner = SharedPtr::as_raw(shared);

        if let Some(raw) = inner {
            //  Safety:
            //  -   Lifetime: `shared` holds an owning count, hence the control block is alive.
            unsafe { raw.acquire_observing() };
        }

        Self { inner }
    }
}

//
//  Formatting
//

impl<T> fmt::Debug for WeakPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "(WeakPtr)")
    }
}

//
//  Markers
//

impl<T> Unpin for WeakPtr<T> {}

impl<T> UnwindSafe for WeakPtr<T> where T: RefUnwindSafe {}

// mod tests
