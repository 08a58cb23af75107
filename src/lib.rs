//! Single-threaded shared & weak pointers, with an out-of-band control block.
//!
//! #   Available pointers
//!
//! -   `SharedPtr<T>`: an owning handle, equivalent to `Rc<T>`, which may be empty.
//! -   `WeakPtr<T>`: an observing handle, equivalent to `Weak<T>`, which may be empty.
//!
//! Unlike `Rc<T>`, the value and the reference counts live in two distinct memory blocks:
//!
//! ```txt
//!   SharedPtr / WeakPtr             control block
//! +---------+---------+         +--------+-----------+
//! | payload | control | ------> | owning | observing |
//! +---------+---------+         +--------+-----------+
//!      |
//!      |                        payload
//!      |                        +-------+
//!      +----------------------> |   T   |
//!                               +-------+
//! ```
//!
//! #   Lifecycle
//!
//! -   The control block is allocated when the first `SharedPtr` of a payload is constructed, and never by a
//!     `WeakPtr`.
//! -   The payload is dropped, and its memory released, when the owning count reaches 0.
//! -   The control block is deallocated when both owning and observing counts reach 0, in either order.
//!
//! Hence the state machine of a control block:
//!
//! ```txt
//! Live (owning >= 1) --[last SharedPtr, WeakPtr remain]--> Orphaned (owning == 0) --[last WeakPtr]--> Destroyed
//!         |                                                                                              ^
//!         +-------------------------------[last SharedPtr, no WeakPtr]-----------------------------------+
//! ```
//!
//! #   Threads
//!
//! The counts are not atomic, hence neither handle is `Send` nor `Sync`.
//!
//! #   Features
//!
//! -   `log`: traces the allocation, orphaning, and destruction of control blocks, at the `trace` level.

//  Use only core and alloc, guaranteeing no I/O nor threads.
#![cfg_attr(not(test), no_std)]
//  Ensure unsafe operations are duly checked.
#![deny(unsafe_op_in_unsafe_fn)]
//  Ensure proper documentation.
#![deny(missing_docs)]

//  Non-core must be explicitly depended on in no_std.
extern crate alloc;

//  Traces control block lifecycle events, when the `log` feature is enabled.
macro_rules! trace {
    ($($arg:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($arg)*);
    };
}

mod count;
mod error;
mod raw;
mod shared;
mod weak;

pub use error::SharedError;
pub use shared::SharedPtr;
pub use weak::WeakPtr;

pub(crate) use count::{ControlBlock, Transition};
pub(crate) use raw::RawShared;
