//! Generic C-ABI entry points for the [`crate::function`] traits.
//!
//! Each function here is monomorphized per implementation, giving a distinct,
//! stable `extern "C"` address per role. Bodies run inside
//! [`marshal::guard`]/[`marshal::guard_step`], so nothing unwinds into the
//! engine.

use crate::ffi::{context, marshal};
use crate::function::{AggregateFunction, ScalarFunction, WindowFunction};
use libsqlite3_sys::*;
use std::os::raw::c_int;

// SAFETY: `argv` holds `argc` protected values valid for this call, as the
// engine guarantees for xFunc.
/// `xFunc` for a [`ScalarFunction`].
pub unsafe extern "C" fn scalar<F: ScalarFunction>(
    ctx: *mut sqlite3_context,
    argc: c_int,
    argv: *mut *mut sqlite3_value,
) {
    unsafe {
        marshal::guard(ctx, || F::call(&marshal::read_args(argc, argv)));
    }
}

// SAFETY: `ctx` belongs to an aggregate registered with `A`, so its block (if
// any) was laid out as `ContextSlot<A::State>` by an earlier call.
/// `xStep` for an [`AggregateFunction`].
pub unsafe extern "C" fn step<A: AggregateFunction>(
    ctx: *mut sqlite3_context,
    argc: c_int,
    argv: *mut *mut sqlite3_value,
) {
    unsafe {
        marshal::guard_step(ctx, || {
            let slot = context::acquire::<A::State>(ctx)?;
            slot.step::<A>(&marshal::read_args(argc, argv))
        });
    }
}

// SAFETY: as for `step`; the engine only calls xInverse for rows it stepped.
/// `xInverse` for a [`WindowFunction`].
pub unsafe extern "C" fn inverse<W: WindowFunction>(
    ctx: *mut sqlite3_context,
    argc: c_int,
    argv: *mut *mut sqlite3_value,
) {
    unsafe {
        marshal::guard_step(ctx, || {
            let slot = context::acquire::<W::State>(ctx)?;
            slot.inverse::<W>(&marshal::read_args(argc, argv))
        });
    }
}

// SAFETY: `ctx` belongs to a window aggregate registered with `W`. A missing
// block means an empty frame; nothing is allocated to read it.
/// `xValue` for a [`WindowFunction`].
pub unsafe extern "C" fn value<W: WindowFunction>(ctx: *mut sqlite3_context) {
    unsafe {
        marshal::guard(ctx, || match context::existing::<W::State>(ctx) {
            Some(slot) => slot.value::<W>(),
            None => W::value(&Default::default()),
        });
    }
}

// SAFETY: `ctx` belongs to an aggregate registered with `A`. The slot's state
// is moved out here; the engine frees the block afterwards.
/// `xFinal` for an [`AggregateFunction`].
pub unsafe extern "C" fn finalize<A: AggregateFunction>(ctx: *mut sqlite3_context) {
    unsafe {
        marshal::guard(ctx, || match context::existing::<A::State>(ctx) {
            Some(slot) => slot.finalize::<A>(),
            None => A::finalize(Default::default()),
        });
    }
}
