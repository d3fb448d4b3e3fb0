//! Traits implemented by native functions that use the crate's own trampolines.
//!
//! An implementation of one of these traits is turned into C-ABI callback
//! addresses by [`FunctionDescriptor::for_scalar`],
//! [`FunctionDescriptor::for_aggregate`] and [`FunctionDescriptor::for_window`].
//! Functions compiled elsewhere skip these traits entirely and come in through
//! [`RawCallbacks`](crate::descriptor::RawCallbacks).
//!
//! [`FunctionDescriptor::for_scalar`]: crate::descriptor::FunctionDescriptor::for_scalar
//! [`FunctionDescriptor::for_aggregate`]: crate::descriptor::FunctionDescriptor::for_aggregate
//! [`FunctionDescriptor::for_window`]: crate::descriptor::FunctionDescriptor::for_window

use crate::error::CallbackFault;
use crate::value::Value;

/// One row in, one value out.
pub trait ScalarFunction: 'static {
    /// Evaluates the function for one row.
    fn call(args: &[Value]) -> Result<Value, CallbackFault>;
}

/// Reduces the rows of a group to one value.
///
/// `State::default()` is the state of a group that has seen no rows, so
/// `finalize(State::default())` must produce the empty-input result (for a
/// sum, `Value::Null`).
pub trait AggregateFunction: 'static {
    /// Running state. Stored in place inside the engine's aggregate block.
    type State: Default;

    /// Folds one row into the state.
    fn step(state: &mut Self::State, args: &[Value]) -> Result<(), CallbackFault>;

    /// Consumes the state and produces the group's result.
    fn finalize(state: Self::State) -> Result<Value, CallbackFault>;
}

/// An aggregate that can also slide over a window frame.
pub trait WindowFunction: AggregateFunction {
    /// Reads the current result without consuming the state.
    fn value(state: &Self::State) -> Result<Value, CallbackFault>;

    /// Removes the contribution of one earlier `step` with the same `args`.
    fn inverse(state: &mut Self::State, args: &[Value]) -> Result<(), CallbackFault>;
}
