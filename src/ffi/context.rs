//! Access to the engine-owned aggregate block.
//!
//! `sqlite3_aggregate_context(ctx, n)` allocates a zero-filled block of `n`
//! bytes on the first call with `n > 0` for a group and returns the same block
//! on every later call, whatever `n`. With `n == 0` it never allocates and
//! returns null if nothing was allocated yet. The engine frees the block after
//! the group's `xFinal`.

use crate::aggregate::ContextSlot;
use crate::error::CallbackFault;
use libsqlite3_sys::*;
use std::os::raw::c_int;

/// Returns the group's slot, allocating it on first use.
///
/// Used by `xStep` and `xInverse`. A null block means the engine could not
/// allocate and is reported as [`CallbackFault::OutOfMemory`].
///
/// # Safety
///
/// `ctx` must be the context of an aggregate callback whose function was
/// registered with state type `S`, and the returned reference must not
/// outlive the callback.
pub unsafe fn acquire<'a, S>(ctx: *mut sqlite3_context) -> Result<&'a mut ContextSlot<S>, CallbackFault> {
    unsafe {
        let size = ContextSlot::<S>::SIZE as c_int;
        let block = sqlite3_aggregate_context(ctx, size).cast::<ContextSlot<S>>();
        block.as_mut().ok_or(CallbackFault::OutOfMemory)
    }
}

/// Returns the group's slot if one was allocated, without allocating.
///
/// Used by `xValue` and `xFinal`, for which "no block" means the group never
/// saw a row.
///
/// # Safety
///
/// Same contract as [`acquire`].
pub unsafe fn existing<'a, S>(ctx: *mut sqlite3_context) -> Option<&'a mut ContextSlot<S>> {
    unsafe { sqlite3_aggregate_context(ctx, 0).cast::<ContextSlot<S>>().as_mut() }
}
