// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/sqlite-native-udf)

//! Function registry: validates descriptors and submits them to the engine.
//!
//! Scalar and plain aggregate functions both go through the engine's generic
//! registration call (`sqlite3_create_function_v2`); the engine tells them
//! apart by which callback slots are set. Window functions go through
//! `sqlite3_create_window_function`, which always receives all four aggregate
//! roles.
//!
//! Registering the same `(name, arity)` again replaces the earlier function,
//! as the engine does. Names compare ASCII case-insensitively, so `F` replaces
//! `f`. Statements prepared afterwards see the new callbacks.
//!
//! The engine is reached through the [`FunctionTable`] trait so the choice of
//! registration call can be observed without a database.

use crate::descriptor::{
    Arity, CallbackSet, DestroyFn, FinalizeFn, FunctionDescriptor, FunctionKind, InverseFn,
    ScalarFn, StepFn, ValueFn,
};
use crate::error::RegistrationError;
use libsqlite3_sys::{SQLITE_DETERMINISTIC, SQLITE_UTF8};
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_int;

/// First engine version with `sqlite3_create_window_function` (3.25.0).
pub const WINDOW_FUNCTION_MIN_VERSION: i32 = 3_025_000;

/// Non-success status reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStatus {
    /// Engine result code.
    pub code: c_int,
    /// Engine error message for the connection.
    pub message: String,
}

/// The subset of the engine's extension API the registry needs.
pub trait FunctionTable {
    /// Engine version as `X * 1_000_000 + Y * 1_000 + Z`.
    fn engine_version(&self) -> i32;

    /// Maximum number of function arguments allowed on this connection.
    fn function_arg_limit(&self) -> i32;

    /// Generic registration. Exactly one of `scalar` or `step` + `finalize`
    /// is set.
    fn create_function(
        &mut self,
        name: &CStr,
        n_arg: c_int,
        flags: c_int,
        scalar: Option<ScalarFn>,
        step: Option<StepFn>,
        finalize: Option<FinalizeFn>,
    ) -> Result<(), EngineStatus>;

    /// Window registration.
    fn create_window_function(
        &mut self,
        name: &CStr,
        n_arg: c_int,
        flags: c_int,
        step: StepFn,
        finalize: FinalizeFn,
        value: ValueFn,
        inverse: InverseFn,
        destroy: Option<DestroyFn>,
    ) -> Result<(), EngineStatus>;
}

/// Registration flags: UTF-8 always, determinism per descriptor.
#[must_use]
pub const fn function_flags(deterministic: bool) -> c_int {
    if deterministic {
        SQLITE_UTF8 | SQLITE_DETERMINISTIC
    } else {
        SQLITE_UTF8
    }
}

/// Formats a packed engine version number as `X.Y.Z`.
#[must_use]
pub fn format_version(version: i32) -> String {
    format!(
        "{}.{}.{}",
        version / 1_000_000,
        (version / 1_000) % 1_000,
        version % 1_000
    )
}

/// Identity of a registration as the engine sees it. The engine folds ASCII
/// case when looking up function names; other bytes compare exactly.
fn registration_key(name: &[u8], arity: Arity) -> (Vec<u8>, Arity) {
    (name.to_ascii_lowercase(), arity)
}

/// Registers function descriptors with one connection.
///
/// Registration takes `&mut self`, so it cannot interleave with another
/// registration on the same connection.
pub struct Registry<T> {
    table: T,
    registered: HashMap<(Vec<u8>, Arity), FunctionKind>,
}

impl<T: FunctionTable> Registry<T> {
    /// Wraps an engine function table.
    pub fn new(table: T) -> Self {
        Self {
            table,
            registered: HashMap::new(),
        }
    }

    /// Validates `descriptor` and submits it to the engine.
    pub fn register(&mut self, descriptor: &FunctionDescriptor) -> Result<(), RegistrationError> {
        let name = self.validate(descriptor)?;
        let n_arg = descriptor.arity().to_engine();
        let flags = function_flags(descriptor.is_deterministic());

        let status = match *descriptor.callbacks() {
            CallbackSet::Scalar { scalar } => {
                self.table
                    .create_function(&name, n_arg, flags, Some(scalar), None, None)
            }
            CallbackSet::Aggregate { step, finalize } => {
                self.table
                    .create_function(&name, n_arg, flags, None, Some(step), Some(finalize))
            }
            CallbackSet::Window {
                step,
                finalize,
                value,
                inverse,
                destroy,
            } => self.table.create_window_function(
                &name, n_arg, flags, step, finalize, value, inverse, destroy,
            ),
        };

        status.map_err(|status| RegistrationError::RegistrationFailure {
            name: descriptor.display_name(),
            code: status.code,
            message: status.message,
        })?;

        match self
            .registered
            .insert(registration_key(descriptor.name(), descriptor.arity()), descriptor.kind())
        {
            Some(previous) => tracing::debug!(
                name = %descriptor.display_name(),
                arity = %descriptor.arity(),
                %previous,
                kind = %descriptor.kind(),
                "replaced function registration"
            ),
            None => tracing::debug!(
                name = %descriptor.display_name(),
                arity = %descriptor.arity(),
                kind = %descriptor.kind(),
                deterministic = descriptor.is_deterministic(),
                "registered function"
            ),
        }
        Ok(())
    }

    fn validate(&self, descriptor: &FunctionDescriptor) -> Result<CString, RegistrationError> {
        if descriptor.name().is_empty() {
            return Err(RegistrationError::invalid("function name must not be empty"));
        }
        let name = CString::new(descriptor.name()).map_err(|_| {
            RegistrationError::invalid(format!(
                "function name {:?} contains a NUL byte",
                descriptor.display_name()
            ))
        })?;

        if let Arity::Fixed(n) = descriptor.arity() {
            let limit = self.table.function_arg_limit();
            if i32::from(n) > limit {
                return Err(RegistrationError::invalid(format!(
                    "arity {n} exceeds the connection limit of {limit} arguments"
                )));
            }
        }

        if descriptor.kind() == FunctionKind::Window {
            let version = self.table.engine_version();
            if version < WINDOW_FUNCTION_MIN_VERSION {
                return Err(RegistrationError::WindowUnsupported {
                    version: format_version(version),
                });
            }
        }

        Ok(name)
    }

    /// Kind of the latest successful registration for `(name, arity)`.
    pub fn registered(&self, name: &[u8], arity: Arity) -> Option<FunctionKind> {
        self.registered.get(&registration_key(name, arity)).copied()
    }

    /// The wrapped function table.
    pub const fn table(&self) -> &T {
        &self.table
    }

    /// Unwraps the function table.
    pub fn into_inner(self) -> T {
        self.table
    }
}
