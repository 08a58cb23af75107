//! The owning handle, equivalent of `Rc<T>`, which may be empty.

use core::{
    cmp, fmt, hash, ops,
    panic::{RefUnwindSafe, UnwindSafe},
    ptr,
};

use alloc::boxed::Box;

use crate::{raw, RawShared, SharedError, WeakPtr};

/// An owning handle to a payload `T`, equivalent to `Rc<T>`, except that it may be empty.
///
/// The payload and the control block are allocated separately. The control block is allocated as soon as a payload is
/// provided, and is shared with all clones of this handle, as well as all `WeakPtr` derived from them.
///
/// Most functionality is exposed as associated functions, as with `Rc`, so as not to shadow the methods of `T`.
pub struct SharedPtr<T> {
    inner: Option<RawShared<T>>,
}

//
//  Construction
//

impl<T> SharedPtr<T> {
    /// Constructs an empty instance, which owns nothing.
    ///
    /// No control block is allocated.
    #[inline(always)]
    pub const fn empty() -> Self {
        Self { inner: None }
    }

    /// Allocates memory on the heap and then places `value` into it.
    ///
    /// #   Panics
    ///
    /// If there is not enough memory. Use `try_new` to handle failures gracefully.
    #[inline]
    pub fn new(value: T) -> Self {
        Self::from_box(Some(Box::new(value)))
    }

    /// Attempts to allocate memory on the heap and then places `value` into it.
    ///
    /// Returns an error if the allocation fails. Use `new` for a panicking version instead.
    #[inline]
    pub fn try_new(value: T) -> Result<Self, SharedError> {
        let payload = raw::try_box(value)?;

        Self::try_from_box(Some(payload))
    }

    /// Takes ownership of `payload`, if any.
    ///
    /// If `payload` is `None`, the result is empty, otherwise a fresh control block is allocated.
    ///
    /// #   Panics
    ///
    /// If there is not enough memory for the control block. Use `try_from_box` to handle failures gracefully.
    #[inline]
    pub fn from_box(payload: Option<Box<T>>) -> Self {
        let inner = payload.map(RawShared::new);

        Self { inner }
    }

    /// Attempts to take ownership of `payload`, if any.
    ///
    /// If `payload` is `None`, the result is empty, otherwise a fresh control block is allocated. If the allocation
    /// fails, `payload` is dropped and an error is returned.
    #[inline]
    pub fn try_from_box(payload: Option<Box<T>>) -> Result<Self, SharedError> {
        let inner = payload.map(RawShared::try_new).transpose()?;

        Ok(Self { inner })
    }

    /// Attempts to promote `weak` to an owning handle.
    ///
    /// Returns an empty instance if `weak` is empty, or if its payload has already been dropped.
    pub fn upgrade(weak: &WeakPtr<T>) -> Self {
        //  Safety:
        //  -   Lifetime: `weak` holds an observing count, hence the control block is alive.
        let inner = WeakPtr::as_raw(weak).filter(|raw| unsafe { raw.try_acquire_owning() });

        Self { inner }
    }

    /// Constructs a new `WeakPtr` observing this payload.
    ///
    /// If `this` is empty, so is the result.
    #[inline]
    pub fn downgrade(this: &Self) -> WeakPtr<T> {
        WeakPtr::from(this)
    }

    /// Moves the payload, if any, out of `this` into a new instance, leaving `this` empty.
    ///
    /// The counts are untouched.
    #[inline(always)]
    pub fn take(this: &mut Self) -> Self {
        let inner = this.inner.take();

        Self { inner }
    }

    /// Releases the current payload, if any, then takes ownership of `payload`, if any.
    ///
    /// A fresh control block is allocated for `payload`; the previous control block is never reused, so that any
    /// `WeakPtr` to the previous payload expires.
    ///
    /// #   Panics
    ///
    /// If there is not enough memory for the control block. Use `try_reset` to handle failures gracefully.
    pub fn reset(this: &mut Self, payload: Option<Box<T>>) {
        Self::release(this);

        this.inner = payload.map(RawShared::new);
    }

    /// Releases the current payload, if any, then attempts to take ownership of `payload`, if any.
    ///
    /// On failure, `this` is left empty and `payload` is dropped.
    pub fn try_reset(this: &mut Self, payload: Option<Box<T>>) -> Result<(), SharedError> {
        Self::release(this);

        this.inner = payload.map(RawShared::try_new).transpose()?;

        Ok(())
    }

    /// Returns the payload, if `this` is the only owner.
    ///
    /// Otherwise, including if `this` is empty, returns `this`. Any `WeakPtr` to the payload expires on success.
    pub fn try_unwrap(this: Self) -> Result<T, Self> {
        let mut this = this;

        match this.inner {
            //  Safety:
            //  -   Lifetime: `this` holds an owning count, hence the control block is alive.
            Some(raw) if unsafe { raw.control() }.owning_count() == 1 => {
                this.inner = None;

                //  Safety:
                //  -   Accounting: `this` was the last owning handle, and is now empty.
                Ok(unsafe { raw.release_owning_into_inner() })
            }
            _ => Err(this),
        }
    }
}

//
//  High-level Access
//

impl<T> SharedPtr<T> {
    /// Returns whether `this` is empty.
    #[inline(always)]
    pub const fn is_empty(this: &Self) -> bool {
        this.inner.is_none()
    }

    /// Returns a reference to the payload, or `None` if empty.
    #[inline(always)]
    pub fn get(this: &Self) -> Option<&T> {
        //  Safety:
        //  -   Lifetime: `this` holds an owning count, hence the payload is alive, and will remain so as long as
        //      `this` is borrowed.
        this.inner.as_ref().map(|raw| unsafe { raw.payload() })
    }

    /// Returns a reference to the payload, or `NullDereference` if empty.
    #[inline]
    pub fn try_deref(this: &Self) -> Result<&T, SharedError> {
        Self::get(this).ok_or(SharedError::NullDereference)
    }

    /// Returns a mutable reference to the payload, if `this` is the only handle, owning or observing, to it.
    ///
    /// Returns `None` if `this` is empty, or shared.
    pub fn get_mut(this: &mut Self) -> Option<&mut T> {
        let raw = this.inner?;

        //  Safety:
        //  -   Lifetime: `this` holds an owning count, hence the control block is alive.
        let control = unsafe { raw.control() };

        if control.owning_count() != 1 || control.observing_count() != 0 {
            return None;
        }

        //  Safety:
        //  -   Lifetime: as per `get`.
        //  -   Exclusive: no other handle exists, and `this` is mutably borrowed.
        Some(unsafe { &mut *raw.as_payload_ptr() })
    }

    /// Returns a pointer to the payload, or a null pointer if empty.
    #[inline(always)]
    pub fn as_ptr(this: &Self) -> *const T {
        this.inner.as_ref().map_or(ptr::null(), |raw| raw.as_payload_ptr().cast_const())
    }

    /// Returns the number of owning handles, ie non-empty `SharedPtr`, or 0 if empty.
    #[inline]
    pub fn owning_count(this: &Self) -> u64 {
        //  Safety:
        //  -   Lifetime: `this` holds an owning count, hence the control block is alive.
        this.inner.as_ref().map_or(0, |raw| unsafe { raw.control() }.owning_count())
    }

    /// Returns the number of observing handles, ie non-empty `WeakPtr`, or 0 if empty.
    #[inline]
    pub fn observing_count(this: &Self) -> u64 {
        //  Safety:
        //  -   Lifetime: `this` holds an owning count, hence the control block is alive.
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

impl<T> SharedPtr<T> {
    /// Returns a copy of the pointers, if any.
    #[inline(always)]
    pub(crate) fn as_raw(this: &Self) -> Option<RawShared<T>> {
        this.inner
    }
}

//
//  Destruction
//

impl<T> SharedPtr<T> {
    //  Empties `this`, first, then releases its owning count, if any.
    //
    //  Idempotent: releasing an empty instance does nothing.
    fn release(this: &mut Self) {
        let Some(raw) = this.inner.take() else { return };

        //  Safety:
        //  -   Accounting: `this` no longer represents an owning handle.
        //  -   EndOfLife: `this` is empty, and no longer refers to the payload.
        unsafe { raw.release_owning() };
    }
}

impl<T> Drop for SharedPtr<T> {
    fn drop(&mut self) {
        Self::release(self);
    }
}

//
//  Clone
//

impl<T> Clone for SharedPtr<T> {
    fn clone(&self) -> Self {
        if let Some(raw) = self.inner {
            //  Safety:
            //  -   Alive: `self` holds an owning count.
            unsafe { raw.acquire_owning() };
        }

        Self { inner: self.inner }
    }

    fn clone_from(&mut self, source: &Self) {
        //  Sharing the same control block, or both empty: nothing changes.
        if Self::ptr_eq(self, source) {
            return;
        }

        Self::release(self);

        *self = source.clone();
    }
}

impl<T> Default for SharedPtr<T> {
    #[inline(always)]
    fn default() -> Self {
        Self::empty()
    }
}

//
//  Conversions
//

impl<T> From<Box<T>> for SharedPtr<T> {
    fn from(payload: Box<T>) -> Self {
        Self::from_box(Some(payload))
    }
}

impl<T> From<Option<Box<T>>> for SharedPtr<T> {
    fn from(payload: Option<Box<T>>) -> Self {
        Self::from_box(payload)
    }
}

impl<T> From<&WeakPtr<T>> for SharedPtr<T> {
    fn from(weak: &WeakPtr<T>) -> Self {
        Self::upgrade(weak)
    }
}

//
//  Value Access
//

impl<T> ops::Deref for SharedPtr<T> {
    type Target = T;

    /// Returns a reference to the payload.
    ///
    /// #   Panics
    ///
    /// If `self` is empty. Use `SharedPtr::try_deref` to handle empty instances gracefully.
    #[track_caller]
    fn deref(&self) -> &T {
        match Self::get(self) {
            Some(value) => value,
            None => null_dereference(),
        }
    }
}

#[cold]
#[inline(never)]
#[track_caller]
fn null_dereference() -> ! {
    panic!("{}: dereferencing an empty SharedPtr", SharedError::NullDereference)
}

//
//  Formatting
//

impl<T> fmt::Debug for SharedPtr<T>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        f.debug_struct("SharedPtr")
            .field("value", &Self::get(self))
            .field("owning", &Self::owning_count(self))
            .field("observing", &Self::observing_count(self))
            .finish()
    }
}

impl<T> fmt::Pointer for SharedPtr<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        fmt::Pointer::fmt(&Self::as_ptr(self), f)
    }
}

//
//  Identity
//
//  An empty instance compares equal to any other empty instance, and less than any non-empty instance.
//

impl<T> Eq for SharedPtr<T> where T: Eq {}

impl<T> PartialEq for SharedPtr<T>
where
    T: PartialEq,
{
    #[inline(always)]
    fn eq(&self, other: &Self) -> bool {
        Self::get(self).eq(&Self::get(other))
    }
}

impl<T> hash::Hash for SharedPtr<T>
where
    T: hash::Hash,
{
    #[inline(always)]
    fn hash<HS>(&self, hasher: &mut HS)
    where
        HS: hash::Hasher,
    {
        hash::Hash::hash(&Self::get(self), hasher);
    }
}

//
//  Ordering
//

impl<T> Ord for SharedPtr<T>
where
    T: Ord,
{
    #[inline(always)]
    fn cmp(&self, other: &Self) -> cmp::Ordering {
        Self::get(self).cmp(&Self::get(other))
    }
}

impl<T> PartialOrd for SharedPtr<T>
where
    T: PartialOrd,
{
    #[inline(always)]
    fn partial_cmp(&self, other: &Self) -> Option<cmp::Ordering> {
        Self::get(self).partial_cmp(&Self::get(other))
    }
}

//
//  Markers
//

//  The payload lives in its own allocation, moving the handle never moves it.
impl<T> Unpin for SharedPtr<T> {}

//  As `Rc`.
impl<T> UnwindSafe for SharedPtr<T> where T: RefUnwindSafe {}

// mod tests
