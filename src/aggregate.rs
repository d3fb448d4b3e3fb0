// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/sqlite-native-udf)

//! Aggregate context manager.
//!
//! SQLite hands every aggregate callback the same zero-filled block for the
//! lifetime of a group (`sqlite3_aggregate_context`). The block belongs to the
//! engine: it is allocated on first request, never moved, and freed by the
//! engine after the final callback. [`ContextSlot`] is the layout the bridge
//! imposes on that block:
//!
//! ```text
//! offset 0   phase: u8        (0 = Empty, see crate::window::Phase)
//! offset 8   rows:  u64       (rows currently folded in, for inverse clamping)
//! offset 16  state: S         (written on first step, moved out by finalize)
//! ```
//!
//! The all-zero block decodes as "no state yet", so initialization is lazy and
//! the bridge never needs an `init` callback. The Rust state placed in the
//! block is dropped exactly once, when `finalize` moves it out. The block
//! itself is never freed by the bridge.

use crate::error::CallbackFault;
use crate::function::{AggregateFunction, WindowFunction};
use crate::value::Value;
use crate::window::{Phase, ProtocolViolation, WindowEvent};
use std::mem::MaybeUninit;

/// Largest context block the bridge ever requests from the engine.
///
/// States that do not fit must box their payload (`Box<T>` is one word).
pub const MAX_CONTEXT_SIZE: usize = 256;

/// Alignment guaranteed by the engine allocator for aggregate blocks.
pub const ENGINE_ALIGN: usize = 8;

/// In-place layout of one engine-owned aggregate block.
#[repr(C)]
pub struct ContextSlot<S> {
    phase: u8,
    rows: u64,
    state: MaybeUninit<S>,
}

impl<S> ContextSlot<S> {
    /// Number of bytes to request from the engine for this state type.
    ///
    /// Referencing this constant fails the build if the slot would not fit in
    /// [`MAX_CONTEXT_SIZE`] bytes at [`ENGINE_ALIGN`] alignment.
    pub const SIZE: usize = {
        assert!(
            std::mem::size_of::<Self>() <= MAX_CONTEXT_SIZE,
            "aggregate state does not fit in the engine context block"
        );
        assert!(
            std::mem::align_of::<Self>() <= ENGINE_ALIGN,
            "aggregate state needs stricter alignment than the engine provides"
        );
        std::mem::size_of::<Self>()
    };

    /// Creates a slot equivalent to a freshly zero-filled engine block.
    #[must_use]
    pub const fn new() -> Self {
        let _ = Self::SIZE;
        Self {
            phase: 0,
            rows: 0,
            state: MaybeUninit::uninit(),
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> Phase {
        Phase::from_byte(self.phase)
    }

    /// Rows currently folded into the state (steps minus inverses).
    #[must_use]
    pub const fn rows(&self) -> u64 {
        self.rows
    }

    fn set_phase(&mut self, phase: Phase) {
        self.phase = phase as u8;
    }
}

impl<S> Default for ContextSlot<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Default> ContextSlot<S> {
    /// Folds one row into the group, initializing the state on first use.
    pub fn step<A>(&mut self, args: &[Value]) -> Result<(), CallbackFault>
    where
        A: AggregateFunction<State = S>,
    {
        let phase = self.phase();
        let next = phase.on(WindowEvent::Step)?;
        if phase == Phase::Empty {
            self.state.write(S::default());
        }
        self.set_phase(next);
        // SAFETY: the phase is live, so the state was written above or by an
        // earlier step and has not been moved out by finalize.
        let state = unsafe { self.state.assume_init_mut() };
        A::step(state, args)?;
        self.rows += 1;
        Ok(())
    }

    /// Removes one row from the frame.
    ///
    /// If no rows are live the call is ignored rather than letting the
    /// aggregate's counters go negative.
    pub fn inverse<W>(&mut self, args: &[Value]) -> Result<(), CallbackFault>
    where
        W: WindowFunction<State = S>,
    {
        let phase = self.phase();
        if phase == Phase::Retired {
            return Err(ProtocolViolation {
                phase,
                event: WindowEvent::Inverse,
            }
            .into());
        }
        if self.rows == 0 {
            tracing::warn!(?phase, "inverse with no live rows in frame; ignored");
            return Ok(());
        }
        self.set_phase(phase.on(WindowEvent::Inverse)?);
        // SAFETY: rows > 0 implies at least one successful step, so the phase
        // is live and the state is initialized.
        let state = unsafe { self.state.assume_init_mut() };
        W::inverse(state, args)?;
        self.rows -= 1;
        Ok(())
    }

    /// Reads the current result without consuming the state.
    ///
    /// An empty frame reads as the aggregate's empty-input result.
    pub fn value<W>(&mut self) -> Result<Value, CallbackFault>
    where
        W: WindowFunction<State = S>,
    {
        let next = self.phase().on(WindowEvent::Value)?;
        self.set_phase(next);
        if next == Phase::Empty {
            return W::value(&S::default());
        }
        // SAFETY: a non-empty, non-retired phase means the state is initialized.
        let state = unsafe { self.state.assume_init_ref() };
        W::value(state)
    }

    /// Retires the slot and produces the group's result.
    ///
    /// The state is moved out before the aggregate's `finalize` runs, so it is
    /// dropped exactly once even if `finalize` fails or panics. The slot is
    /// left `Retired`, which is safe for the engine to reclaim.
    pub fn finalize<A>(&mut self) -> Result<Value, CallbackFault>
    where
        A: AggregateFunction<State = S>,
    {
        let phase = self.phase();
        self.set_phase(phase.on(WindowEvent::Finalize)?);
        let state = if phase.is_live() {
            // SAFETY: live phase means initialized; the phase is now Retired so
            // the value cannot be read a second time.
            unsafe { self.state.assume_init_read() }
        } else {
            S::default()
        };
        A::finalize(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Frame {
        sum: i64,
        count: u64,
    }

    struct FrameSum;

    impl AggregateFunction for FrameSum {
        type State = Frame;

        fn step(state: &mut Frame, args: &[Value]) -> Result<(), CallbackFault> {
            let v = args[0]
                .as_integer()
                .ok_or_else(|| CallbackFault::native("integer expected"))?;
            state.sum = state
                .sum
                .checked_add(v)
                .ok_or_else(|| CallbackFault::OutOfRange("sum overflow".into()))?;
            state.count += 1;
            Ok(())
        }

        fn finalize(state: Frame) -> Result<Value, CallbackFault> {
            Self::value(&state)
        }
    }

    impl WindowFunction for FrameSum {
        fn value(state: &Frame) -> Result<Value, CallbackFault> {
            Ok(if state.count == 0 {
                Value::Null
            } else {
                Value::Integer(state.sum)
            })
        }

        fn inverse(state: &mut Frame, args: &[Value]) -> Result<(), CallbackFault> {
            state.sum -= args[0].as_integer().unwrap_or(0);
            state.count -= 1;
            Ok(())
        }
    }

    thread_local! {
        static DROPS: Cell<usize> = const { Cell::new(0) };
    }

    #[derive(Default)]
    struct Tracked(Vec<i64>);

    impl Drop for Tracked {
        fn drop(&mut self) {
            DROPS.with(|d| d.set(d.get() + 1));
        }
    }

    struct Collect;

    impl AggregateFunction for Collect {
        type State = Tracked;

        fn step(state: &mut Tracked, args: &[Value]) -> Result<(), CallbackFault> {
            state.0.push(args[0].as_integer().unwrap_or_default());
            Ok(())
        }

        fn finalize(state: Tracked) -> Result<Value, CallbackFault> {
            Ok(Value::Integer(state.0.len() as i64))
        }
    }

    struct Brittle;

    impl AggregateFunction for Brittle {
        type State = Tracked;

        fn step(state: &mut Tracked, args: &[Value]) -> Result<(), CallbackFault> {
            let v = args[0].as_integer().unwrap_or_default();
            assert_ne!(v, 13, "unlucky row");
            state.0.push(v);
            Ok(())
        }

        fn finalize(state: Tracked) -> Result<Value, CallbackFault> {
            assert!(state.0.len() < 3, "too many rows to finalize");
            Ok(Value::Integer(state.0.len() as i64))
        }
    }

    fn int(v: i64) -> [Value; 1] {
        [Value::Integer(v)]
    }

    #[test]
    fn test_zeroed_block_is_empty() {
        // SAFETY: all-zero is a valid ContextSlot; MaybeUninit accepts any bytes.
        let slot: ContextSlot<Frame> = unsafe { std::mem::zeroed() };
        assert_eq!(slot.phase(), Phase::Empty);
        assert_eq!(slot.rows(), 0);
    }

    #[test]
    fn test_slot_fits_engine_block() {
        assert!(ContextSlot::<Frame>::SIZE <= MAX_CONTEXT_SIZE);
        assert_eq!(std::mem::align_of::<ContextSlot<Frame>>(), ENGINE_ALIGN);
    }

    #[test]
    fn test_sum_over_rows() {
        let mut slot = ContextSlot::<Frame>::new();
        for v in [1, 2, 3] {
            slot.step::<FrameSum>(&int(v)).unwrap();
        }
        assert_eq!(slot.rows(), 3);
        assert_eq!(slot.finalize::<FrameSum>(), Ok(Value::Integer(6)));
        assert_eq!(slot.phase(), Phase::Retired);
    }

    #[test]
    fn test_empty_group_finalizes_to_null() {
        let mut slot = ContextSlot::<Frame>::new();
        assert_eq!(slot.finalize::<FrameSum>(), Ok(Value::Null));
    }

    #[test]
    fn test_moving_sum_frame_sequence() {
        let mut slot = ContextSlot::<Frame>::new();
        slot.step::<FrameSum>(&int(1)).unwrap();
        slot.step::<FrameSum>(&int(2)).unwrap();
        assert_eq!(slot.value::<FrameSum>(), Ok(Value::Integer(3)));
        slot.step::<FrameSum>(&int(3)).unwrap();
        slot.inverse::<FrameSum>(&int(1)).unwrap();
        assert_eq!(slot.value::<FrameSum>(), Ok(Value::Integer(5)));
        assert_eq!(slot.phase(), Phase::Readable);
    }

    #[test]
    fn test_value_is_idempotent() {
        let mut slot = ContextSlot::<Frame>::new();
        slot.step::<FrameSum>(&int(4)).unwrap();
        for _ in 0..5 {
            assert_eq!(slot.value::<FrameSum>(), Ok(Value::Integer(4)));
        }
        assert_eq!(slot.rows(), 1);
        assert_eq!(slot.finalize::<FrameSum>(), Ok(Value::Integer(4)));
    }

    #[test]
    fn test_value_on_empty_frame() {
        let mut slot = ContextSlot::<Frame>::new();
        assert_eq!(slot.value::<FrameSum>(), Ok(Value::Null));
        assert_eq!(slot.phase(), Phase::Empty);
    }

    #[test]
    fn test_inverse_is_clamped_at_zero() {
        let mut slot = ContextSlot::<Frame>::new();
        slot.inverse::<FrameSum>(&int(9)).unwrap();
        assert_eq!(slot.phase(), Phase::Empty);

        slot.step::<FrameSum>(&int(2)).unwrap();
        slot.inverse::<FrameSum>(&int(2)).unwrap();
        slot.inverse::<FrameSum>(&int(2)).unwrap();
        assert_eq!(slot.rows(), 0);
        assert_eq!(slot.value::<FrameSum>(), Ok(Value::Null));
    }

    #[test]
    fn test_use_after_finalize_is_rejected() {
        let mut slot = ContextSlot::<Frame>::new();
        slot.step::<FrameSum>(&int(1)).unwrap();
        slot.finalize::<FrameSum>().unwrap();
        assert!(matches!(
            slot.step::<FrameSum>(&int(1)),
            Err(CallbackFault::Protocol(_))
        ));
        assert!(matches!(
            slot.value::<FrameSum>(),
            Err(CallbackFault::Protocol(_))
        ));
        assert!(matches!(
            slot.inverse::<FrameSum>(&int(1)),
            Err(CallbackFault::Protocol(_))
        ));
        assert!(matches!(
            slot.finalize::<FrameSum>(),
            Err(CallbackFault::Protocol(_))
        ));
    }

    #[test]
    fn test_step_fault_leaves_other_groups_untouched() {
        let mut failing = ContextSlot::<Frame>::new();
        let mut healthy = ContextSlot::<Frame>::new();
        failing.step::<FrameSum>(&int(i64::MAX)).unwrap();
        healthy.step::<FrameSum>(&int(10)).unwrap();

        let err = failing.step::<FrameSum>(&int(1)).unwrap_err();
        assert!(matches!(err, CallbackFault::OutOfRange(_)));

        healthy.step::<FrameSum>(&int(5)).unwrap();
        assert_eq!(healthy.finalize::<FrameSum>(), Ok(Value::Integer(15)));
        assert_eq!(failing.rows(), 1);
    }

    #[test]
    fn test_state_dropped_exactly_once() {
        DROPS.with(|d| d.set(0));
        let mut slot = ContextSlot::<Tracked>::new();
        slot.step::<Collect>(&int(1)).unwrap();
        slot.step::<Collect>(&int(2)).unwrap();
        assert_eq!(DROPS.with(Cell::get), 0);
        assert_eq!(slot.finalize::<Collect>(), Ok(Value::Integer(2)));
        assert_eq!(DROPS.with(Cell::get), 1);
        drop(slot);
        assert_eq!(DROPS.with(Cell::get), 1);
    }

    #[test]
    fn test_panicking_step_keeps_state_consistent() {
        DROPS.with(|d| d.set(0));
        let mut slot = ContextSlot::<Tracked>::new();
        slot.step::<Brittle>(&int(1)).unwrap();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            slot.step::<Brittle>(&int(13))
        }));
        assert!(caught.is_err());
        assert_eq!(slot.rows(), 1);
        assert_eq!(DROPS.with(Cell::get), 0);

        assert_eq!(slot.finalize::<Brittle>(), Ok(Value::Integer(1)));
        assert_eq!(DROPS.with(Cell::get), 1);
    }

    #[test]
    fn test_panicking_finalize_drops_state_once() {
        DROPS.with(|d| d.set(0));
        let mut slot = ContextSlot::<Tracked>::new();
        for v in [1, 2, 3] {
            slot.step::<Brittle>(&int(v)).unwrap();
        }
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            slot.finalize::<Brittle>()
        }));
        assert!(caught.is_err());
        assert_eq!(DROPS.with(Cell::get), 1);
        assert_eq!(slot.phase(), Phase::Retired);

        drop(slot);
        assert_eq!(DROPS.with(Cell::get), 1);
    }
}
