//! The out-of-band control block, shared by all handles of a payload.

use core::cell::Cell;

/// The owning and observing counts of a payload.
///
/// The owning count represents the number of owning handles to the payload, ie the number of non-empty `SharedPtr`.
/// The payload is dropped, and its memory released, when the owning count reaches 0.
///
/// The observing count represents the number of observing handles to the control block, ie the number of non-empty
/// `WeakPtr`. The control block is deallocated when both counts are 0, and it is not pinned.
///
/// The control block is pinned from the moment the owning count reaches 0 until the payload is fully dropped, so that
/// the last `WeakPtr` being dropped along with the payload does not deallocate it mid-way.
///
/// Every decrement reports the resulting `Transition`, which the caller MUST act upon.
#[derive(Debug)]
pub(crate) struct ControlBlock {
    owning: Cell<u64>,
    observing: Cell<u64>,
    pinned: Cell<bool>,
}

/// The action required from the caller after a decrement.
#[must_use]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Transition {
    /// Nothing to do, the control block is still referenced.
    Retained,
    /// The owning count reached 0: the payload must be dropped, and then `unpin` must be called once.
    ///
    /// The control block is pinned until then, so that dropping the payload never deallocates the control block.
    DropPayload,
    /// Both counts reached 0: the control block must be deallocated.
    Deallocate,
}

impl ControlBlock {
    /// Constructs the control block of a freshly owned payload.
    ///
    /// A freshly constructed control block has an owning count of exactly 1, and an observing count of exactly 0.
    #[inline(always)]
    pub(crate) fn new() -> Self {
        let owning = Cell::new(1);
        let observing = Cell::new(0);
        let pinned = Cell::new(false);

        Self {
            owning,
            observing,
            pinned,
        }
    }

    /// Returns the owning count, ie the number of owning handles.
    #[inline(always)]
    pub(crate) fn owning_count(&self) -> u64 {
        self.owning.get()
    }

    /// Returns the observing count, ie the number of observing handles.
    #[inline(always)]
    pub(crate) fn observing_count(&self) -> u64 {
        self.observing.get()
    }

    /// Returns whether the payload is still alive.
    #[inline(always)]
    pub(crate) fn is_alive(&self) -> bool {
        self.owning.get() > 0
    }

    /// Returns whether the payload is being dropped.
    #[inline(always)]
    pub(crate) fn is_pinned(&self) -> bool {
        self.pinned.get()
    }

    /// Increments the owning count.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that the incremented count faithfully represents the number of owning
    ///     handles.
    /// -   Alive: the owning count is not 0.
    #[inline(always)]
    pub(crate) unsafe fn increment_owning(&self) {
        debug_assert!(self.is_alive());

        self.owning.set(self.owning.get() + 1);
    }

    /// Increments the owning count, unless it is already 0.
    ///
    /// Returns whether the increment succeeded.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that, on success, the incremented count faithfully represents the number
    ///     of owning handles.
    #[inline(always)]
    pub(crate) unsafe fn try_increment_owning(&self) -> bool {
        let owning = self.owning.get();

        if owning == 0 {
            return false;
        }

        self.owning.set(owning + 1);

        true
    }

    /// Decrements the owning count.
    ///
    /// Returns `DropPayload`, pinning the control block, if the count reached 0, `Retained` otherwise.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that the decremented count faithfully represents the number of owning
    ///     handles.
    #[inline]
    pub(crate) unsafe fn decrement_owning(&self) -> Transition {
        debug_assert!(self.is_alive());

        let owning = self.owning.get() - 1;
        self.owning.set(owning);

        if owning > 0 {
            return Transition::Retained;
        }

        //  Pin the block for the duration of the payload drop.
        self.pinned.set(true);

        Transition::DropPayload
    }

    /// Increments the observing count.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that the incremented count faithfully represents the number of observing
    ///     handles.
    #[inline(always)]
    pub(crate) unsafe fn increment_observing(&self) {
        self.observing.set(self.observing.get() + 1);
    }

    /// Decrements the observing count.
    ///
    /// Returns `Deallocate` if both counts are now 0 and the control block is not pinned, `Retained` otherwise.
    ///
    /// #   Safety
    ///
    /// -   Accounting: the caller guarantees that the decremented count faithfully represents the number of observing
    ///     handles.
    #[inline]
    pub(crate) unsafe fn decrement_observing(&self) -> Transition {
        debug_assert!(self.observing.get() > 0);

        let observing = self.observing.get() - 1;
        self.observing.set(observing);

        if observing > 0 || self.is_alive() || self.is_pinned() {
            return Transition::Retained;
        }

        Transition::Deallocate
    }

    /// Releases the pin taken when the owning count reached 0.
    ///
    /// Returns `Deallocate` if the observing count is 0, `Retained` otherwise.
    ///
    /// #   Safety
    ///
    /// -   Pinned: the caller guarantees that the payload has been dropped, or moved out, following `DropPayload`.
    #[inline]
    pub(crate) unsafe fn unpin(&self) -> Transition {
        debug_assert!(self.is_pinned());
        debug_assert!(!self.is_alive());

        self.pinned.set(false);

        if self.observing.get() > 0 {
            return Transition::Retained;
        }

        Transition::Deallocate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh() {
        let count = ControlBlock::new();

        assert_eq!(1, count.owning_count());
        assert_eq!(0, count.observing_count());
        assert!(count.is_alive());
    }

    #[test]
    fn owning_only() {
        let count = ControlBlock::new();

        unsafe { count.increment_owning() };

        assert_eq!(2, count.owning_count());
        assert_eq!(Transition::Retained, unsafe { count.decrement_owning() });
        assert_eq!(Transition::DropPayload, unsafe { count.decrement_owning() });

        //  Pinned while the payload is dropped.
        assert_eq!(0, count.owning_count());
        assert_eq!(0, count.observing_count());
        assert!(count.is_pinned());

        assert_eq!(Transition::Deallocate, unsafe { count.unpin() });
    }

    #[test]
    fn owning_last() {
        let count = ControlBlock::new();

        unsafe { count.increment_observing() };

        assert_eq!(Transition::Retained, unsafe { count.decrement_observing() });
        assert_eq!(Transition::DropPayload, unsafe { count.decrement_owning() });
        assert_eq!(Transition::Deallocate, unsafe { count.unpin() });
    }

    #[test]
    fn observing_last() {
        let count = ControlBlock::new();

        unsafe { count.increment_observing() };

        assert_eq!(Transition::DropPayload, unsafe { count.decrement_owning() });
        assert_eq!(1, count.observing_count());

        assert_eq!(Transition::Retained, unsafe { count.unpin() });
        assert!(!count.is_alive());
        assert!(!count.is_pinned());

        assert_eq!(Transition::Deallocate, unsafe { count.decrement_observing() });
    }

    #[test]
    fn observing_while_pinned() {
        let count = ControlBlock::new();

        unsafe { count.increment_observing() };

        assert_eq!(Transition::DropPayload, unsafe { count.decrement_owning() });

        //  The last observer goes away while the payload is being dropped.
        assert_eq!(Transition::Retained, unsafe { count.decrement_observing() });
        assert_eq!(0, count.observing_count());

        assert_eq!(Transition::Deallocate, unsafe { count.unpin() });
    }

    #[test]
    fn try_increment() {
        let count = ControlBlock::new();

        assert!(unsafe { count.try_increment_owning() });
        assert_eq!(2, count.owning_count());

        assert_eq!(Transition::Retained, unsafe { count.decrement_owning() });
        assert_eq!(Transition::DropPayload, unsafe { count.decrement_owning() });

        assert!(!unsafe { count.try_increment_owning() });
        assert_eq!(0, count.owning_count());
    }
} // mod tests
