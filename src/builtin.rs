// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/sqlite-native-udf)

//! Reference functions built on the crate's own trampolines.
//!
//! | Function | Kind | Description |
//! |----------|------|-------------|
//! | `add_one(x)` | Scalar | `x + 1` for integers and floats, `NULL` for `NULL` |
//! | `my_sum(x)` | Aggregate | Checked `i64` sum, `NULL` over zero non-null rows |
//! | `moving_sum(x)` | Window | `my_sum` with `inverse`, usable with `OVER (...)` |
//!
//! ```sql
//! SELECT moving_sum(x) OVER (ORDER BY t ROWS BETWEEN 1 PRECEDING AND CURRENT ROW)
//! FROM samples
//! ```

use crate::descriptor::{Arity, FunctionDescriptor};
use crate::error::{CallbackFault, RegistrationError};
use crate::function::{AggregateFunction, ScalarFunction, WindowFunction};
use crate::registry::{FunctionTable, Registry};
use crate::value::Value;

/// `add_one(x)`.
///
/// `NULL` maps to `NULL`. Text and blobs are rejected, and `i64::MAX + 1`
/// is an out-of-range fault rather than a wrap.
pub struct AddOne;

impl ScalarFunction for AddOne {
    fn call(args: &[Value]) -> Result<Value, CallbackFault> {
        match args.first().unwrap_or(&Value::Null) {
            Value::Null => Ok(Value::Null),
            Value::Integer(v) => v
                .checked_add(1)
                .map(Value::Integer)
                .ok_or_else(|| CallbackFault::OutOfRange(format!("add_one({v}) overflows i64"))),
            Value::Float(v) => Ok(Value::Float(v + 1.0)),
            other => Err(CallbackFault::native(format!(
                "add_one: expected a numeric argument, got {}",
                other.value_type()
            ))),
        }
    }
}

/// Running state shared by [`IntegerSum`] and [`MovingSum`].
///
/// `count` tracks non-null rows so the empty result can be told apart from a
/// sum that happens to be zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SumState {
    /// Sum of the non-null rows currently folded in.
    pub sum: i64,
    /// Number of non-null rows currently folded in.
    pub count: u64,
}

impl SumState {
    fn add(&mut self, arg: &Value) -> Result<(), CallbackFault> {
        let Some(v) = integer_arg(arg)? else {
            return Ok(());
        };
        self.sum = self
            .sum
            .checked_add(v)
            .ok_or_else(|| CallbackFault::OutOfRange("integer sum overflows i64".into()))?;
        self.count += 1;
        Ok(())
    }

    fn remove(&mut self, arg: &Value) -> Result<(), CallbackFault> {
        let Some(v) = integer_arg(arg)? else {
            return Ok(());
        };
        if self.count == 0 {
            return Ok(());
        }
        self.sum = self
            .sum
            .checked_sub(v)
            .ok_or_else(|| CallbackFault::OutOfRange("integer sum overflows i64".into()))?;
        self.count -= 1;
        Ok(())
    }

    const fn result(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Integer(self.sum)
        }
    }
}

fn integer_arg(arg: &Value) -> Result<Option<i64>, CallbackFault> {
    match arg {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(*v)),
        other => Err(CallbackFault::native(format!(
            "integer argument required, got {}",
            other.value_type()
        ))),
    }
}

/// `my_sum(x)`: plain aggregate over `i64`.
pub struct IntegerSum;

impl AggregateFunction for IntegerSum {
    type State = SumState;

    fn step(state: &mut SumState, args: &[Value]) -> Result<(), CallbackFault> {
        state.add(args.first().unwrap_or(&Value::Null))
    }

    fn finalize(state: SumState) -> Result<Value, CallbackFault> {
        Ok(state.result())
    }
}

/// `moving_sum(x)`: [`IntegerSum`] with frame removal.
pub struct MovingSum;

impl AggregateFunction for MovingSum {
    type State = SumState;

    fn step(state: &mut SumState, args: &[Value]) -> Result<(), CallbackFault> {
        state.add(args.first().unwrap_or(&Value::Null))
    }

    fn finalize(state: SumState) -> Result<Value, CallbackFault> {
        Ok(state.result())
    }
}

impl WindowFunction for MovingSum {
    fn value(state: &SumState) -> Result<Value, CallbackFault> {
        Ok(state.result())
    }

    fn inverse(state: &mut SumState, args: &[Value]) -> Result<(), CallbackFault> {
        state.remove(args.first().unwrap_or(&Value::Null))
    }
}

/// Descriptors for all reference functions. All are deterministic.
pub fn descriptors() -> Vec<FunctionDescriptor> {
    vec![
        FunctionDescriptor::for_scalar::<AddOne>("add_one", Arity::Fixed(1)).deterministic(true),
        FunctionDescriptor::for_aggregate::<IntegerSum>("my_sum", Arity::Fixed(1))
            .deterministic(true),
        FunctionDescriptor::for_window::<MovingSum>("moving_sum", Arity::Fixed(1))
            .deterministic(true),
    ]
}

/// Registers every reference function with `registry`.
pub fn register_builtins<T: FunctionTable>(
    registry: &mut Registry<T>,
) -> Result<(), RegistrationError> {
    for descriptor in descriptors() {
        registry.register(&descriptor)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::ContextSlot;

    #[test]
    fn test_add_one_integer() {
        assert_eq!(AddOne::call(&[Value::Integer(5)]), Ok(Value::Integer(6)));
    }

    #[test]
    fn test_add_one_null_is_null() {
        assert_eq!(AddOne::call(&[Value::Null]), Ok(Value::Null));
    }

    #[test]
    fn test_add_one_float() {
        assert_eq!(AddOne::call(&[Value::Float(1.5)]), Ok(Value::Float(2.5)));
    }

    #[test]
    fn test_add_one_overflow_is_fault() {
        assert!(matches!(
            AddOne::call(&[Value::Integer(i64::MAX)]),
            Err(CallbackFault::OutOfRange(_))
        ));
    }

    #[test]
    fn test_add_one_rejects_text() {
        let err = AddOne::call(&[Value::from("5")]).unwrap_err();
        assert!(err.to_string().contains("TEXT"));
    }

    #[test]
    fn test_my_sum_rows() {
        let mut slot = ContextSlot::<SumState>::new();
        for v in [1, 2, 3] {
            slot.step::<IntegerSum>(&[Value::Integer(v)]).unwrap();
        }
        assert_eq!(slot.finalize::<IntegerSum>(), Ok(Value::Integer(6)));
    }

    #[test]
    fn test_my_sum_zero_rows_is_null() {
        let mut slot = ContextSlot::<SumState>::new();
        assert_eq!(slot.finalize::<IntegerSum>(), Ok(Value::Null));
    }

    #[test]
    fn test_my_sum_skips_nulls() {
        let mut slot = ContextSlot::<SumState>::new();
        slot.step::<IntegerSum>(&[Value::Null]).unwrap();
        assert_eq!(slot.finalize::<IntegerSum>(), Ok(Value::Null));

        let mut slot = ContextSlot::<SumState>::new();
        slot.step::<IntegerSum>(&[Value::Null]).unwrap();
        slot.step::<IntegerSum>(&[Value::Integer(0)]).unwrap();
        assert_eq!(slot.finalize::<IntegerSum>(), Ok(Value::Integer(0)));
    }

    #[test]
    fn test_my_sum_overflow_is_fault() {
        let mut state = SumState::default();
        IntegerSum::step(&mut state, &[Value::Integer(i64::MAX)]).unwrap();
        assert!(matches!(
            IntegerSum::step(&mut state, &[Value::Integer(1)]),
            Err(CallbackFault::OutOfRange(_))
        ));
        assert_eq!(state.sum, i64::MAX);
    }

    #[test]
    fn test_moving_sum_inverse_of_null_is_noop() {
        let mut state = SumState::default();
        MovingSum::step(&mut state, &[Value::Integer(4)]).unwrap();
        MovingSum::inverse(&mut state, &[Value::Null]).unwrap();
        assert_eq!(MovingSum::value(&state), Ok(Value::Integer(4)));
    }

    #[test]
    fn test_moving_sum_remove_clamps_count() {
        let mut state = SumState::default();
        MovingSum::inverse(&mut state, &[Value::Integer(4)]).unwrap();
        assert_eq!(state, SumState::default());
    }

    #[test]
    fn test_descriptors_kinds() {
        use crate::descriptor::FunctionKind;
        let kinds: Vec<_> = descriptors()
            .iter()
            .map(FunctionDescriptor::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                FunctionKind::Scalar,
                FunctionKind::Aggregate,
                FunctionKind::Window
            ]
        );
    }
}
