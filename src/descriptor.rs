// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/sqlite-native-udf)

//! Function descriptors: everything needed to register one function.
//!
//! A [`FunctionDescriptor`] pairs a name, an arity and a determinism flag with
//! a [`CallbackSet`]. The function's kind is not stored; it is the variant of
//! the callback set, so a descriptor cannot claim to be a window function
//! without carrying both `value` and `inverse`.
//!
//! Descriptors come from two places:
//!
//! - Rust implementations of [`ScalarFunction`], [`AggregateFunction`] or
//!   [`WindowFunction`], via [`FunctionDescriptor::for_scalar`] and friends.
//!   The callbacks are the crate's monomorphized trampolines.
//! - Raw addresses produced by an external compiler, via [`RawCallbacks`].
//!   The pairing of roles is validated when converting to a [`CallbackSet`].

use crate::error::RegistrationError;
use crate::ffi::trampoline;
use crate::function::{AggregateFunction, ScalarFunction, WindowFunction};
use libsqlite3_sys::{sqlite3_context, sqlite3_value};
use std::fmt;
use std::os::raw::{c_int, c_void};

/// `xFunc`: evaluates a scalar function for one row.
pub type ScalarFn = unsafe extern "C" fn(*mut sqlite3_context, c_int, *mut *mut sqlite3_value);
/// `xStep`: folds one row into an aggregate context.
pub type StepFn = unsafe extern "C" fn(*mut sqlite3_context, c_int, *mut *mut sqlite3_value);
/// `xFinal`: produces an aggregate's result and retires its context.
pub type FinalizeFn = unsafe extern "C" fn(*mut sqlite3_context);
/// `xValue`: reads a window aggregate's current result.
pub type ValueFn = unsafe extern "C" fn(*mut sqlite3_context);
/// `xInverse`: removes one row from a window aggregate context.
pub type InverseFn = unsafe extern "C" fn(*mut sqlite3_context, c_int, *mut *mut sqlite3_value);
/// `xDestroy`: releases auxiliary resources when the function is replaced or
/// the connection closes. Receives the (always null) user data pointer.
pub type DestroyFn = unsafe extern "C" fn(*mut c_void);

/// Number of arguments a function accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    /// Exactly this many arguments.
    Fixed(u16),
    /// Any number of arguments (the engine's `-1`).
    Variadic,
}

impl Arity {
    /// Encodes the arity as the engine's `nArg`.
    #[must_use]
    pub fn to_engine(self) -> c_int {
        match self {
            Self::Fixed(n) => c_int::from(n),
            Self::Variadic => -1,
        }
    }

    /// Decodes an engine-style `nArg`, where `-1` means variadic.
    pub fn from_engine(n_arg: c_int) -> Result<Self, RegistrationError> {
        match n_arg {
            -1 => Ok(Self::Variadic),
            n => u16::try_from(n).map(Self::Fixed).map_err(|_| {
                RegistrationError::invalid(format!(
                    "arity {n_arg} is neither -1 (variadic) nor a valid argument count"
                ))
            }),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Variadic => f.write_str("variadic"),
        }
    }
}

/// The three function shapes the engine supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionKind {
    /// One row in, one value out.
    Scalar,
    /// `step` per row, `finalize` per group.
    Aggregate,
    /// Aggregate with `value` and `inverse` for sliding frames.
    Window,
}

impl fmt::Display for FunctionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scalar => "scalar",
            Self::Aggregate => "aggregate",
            Self::Window => "window",
        })
    }
}

/// Callback addresses, one per role, shaped by function kind.
#[derive(Debug, Clone, Copy)]
pub enum CallbackSet {
    /// Scalar function.
    Scalar {
        /// `xFunc`.
        scalar: ScalarFn,
    },
    /// Plain aggregate.
    Aggregate {
        /// `xStep`.
        step: StepFn,
        /// `xFinal`.
        finalize: FinalizeFn,
    },
    /// Window aggregate. Also usable as a plain aggregate.
    Window {
        /// `xStep`.
        step: StepFn,
        /// `xFinal`.
        finalize: FinalizeFn,
        /// `xValue`.
        value: ValueFn,
        /// `xInverse`.
        inverse: InverseFn,
        /// `xDestroy`, if the native side owns anything to release.
        destroy: Option<DestroyFn>,
    },
}

impl CallbackSet {
    /// The function kind these callbacks implement.
    #[must_use]
    pub const fn kind(&self) -> FunctionKind {
        match self {
            Self::Scalar { .. } => FunctionKind::Scalar,
            Self::Aggregate { .. } => FunctionKind::Aggregate,
            Self::Window { .. } => FunctionKind::Window,
        }
    }
}

/// Callback addresses as handed over by an external compiler.
///
/// Zero means "role not supplied". Every non-zero address must be the entry
/// point of a function with the C signature of its role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCallbacks {
    /// `xFunc` address.
    pub scalar: usize,
    /// `xStep` address.
    pub step: usize,
    /// `xFinal` address.
    pub finalize: usize,
    /// `xValue` address.
    pub value: usize,
    /// `xInverse` address.
    pub inverse: usize,
    /// `xDestroy` address.
    pub destroy: usize,
}

impl RawCallbacks {
    /// Checks the role/kind pairing and converts to typed callbacks.
    ///
    /// - `Scalar` needs `scalar` and nothing else.
    /// - `Aggregate` needs `step` and `finalize`, and forbids `scalar`,
    ///   `value`, `inverse` and `destroy`.
    /// - `Window` needs `step`, `finalize`, `value` and `inverse`, forbids
    ///   `scalar`, and accepts an optional `destroy`.
    ///
    /// # Safety
    ///
    /// Every non-zero address must point to a function with the C ABI and the
    /// signature of its role, and must stay valid for as long as the function
    /// is registered with any connection.
    pub unsafe fn into_callback_set(
        self,
        kind: FunctionKind,
    ) -> Result<CallbackSet, RegistrationError> {
        if (self.value == 0) != (self.inverse == 0) {
            return Err(RegistrationError::invalid(
                "value and inverse must be supplied together",
            ));
        }

        let require = |address: usize, role: &str| {
            if address == 0 {
                Err(RegistrationError::invalid(format!(
                    "{kind} function requires a {role} callback"
                )))
            } else {
                Ok(address)
            }
        };
        let forbid = |address: usize, role: &str| {
            if address == 0 {
                Ok(())
            } else {
                Err(RegistrationError::invalid(format!(
                    "{kind} function must not supply a {role} callback"
                )))
            }
        };

        match kind {
            FunctionKind::Scalar => {
                let scalar = require(self.scalar, "scalar")?;
                forbid(self.step, "step")?;
                forbid(self.finalize, "finalize")?;
                forbid(self.value, "value")?;
                forbid(self.destroy, "destroy")?;
                Ok(CallbackSet::Scalar {
                    scalar: std::mem::transmute::<usize, ScalarFn>(scalar),
                })
            }
            FunctionKind::Aggregate => {
                forbid(self.scalar, "scalar")?;
                let step = require(self.step, "step")?;
                let finalize = require(self.finalize, "finalize")?;
                forbid(self.value, "value")?;
                forbid(self.destroy, "destroy")?;
                Ok(CallbackSet::Aggregate {
                    step: std::mem::transmute::<usize, StepFn>(step),
                    finalize: std::mem::transmute::<usize, FinalizeFn>(finalize),
                })
            }
            FunctionKind::Window => {
                forbid(self.scalar, "scalar")?;
                let step = require(self.step, "step")?;
                let finalize = require(self.finalize, "finalize")?;
                let value = require(self.value, "value")?;
                let inverse = require(self.inverse, "inverse")?;
                Ok(CallbackSet::Window {
                    step: std::mem::transmute::<usize, StepFn>(step),
                    finalize: std::mem::transmute::<usize, FinalizeFn>(finalize),
                    value: std::mem::transmute::<usize, ValueFn>(value),
                    inverse: std::mem::transmute::<usize, InverseFn>(inverse),
                    destroy: if self.destroy == 0 {
                        None
                    } else {
                        Some(std::mem::transmute::<usize, DestroyFn>(self.destroy))
                    },
                })
            }
        }
    }
}

/// One function registration.
///
/// Immutable once built: the builder methods consume and return the
/// descriptor, and there are no setters.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    name: Vec<u8>,
    arity: Arity,
    deterministic: bool,
    callbacks: CallbackSet,
}

impl FunctionDescriptor {
    /// Creates a non-deterministic descriptor.
    ///
    /// The name is kept byte-exact; validation happens at registration.
    pub fn new(name: impl Into<Vec<u8>>, arity: Arity, callbacks: CallbackSet) -> Self {
        Self {
            name: name.into(),
            arity,
            deterministic: false,
            callbacks,
        }
    }

    /// Descriptor for a Rust scalar function.
    pub fn for_scalar<F: ScalarFunction>(name: impl Into<Vec<u8>>, arity: Arity) -> Self {
        Self::new(
            name,
            arity,
            CallbackSet::Scalar {
                scalar: trampoline::scalar::<F>,
            },
        )
    }

    /// Descriptor for a Rust aggregate function.
    pub fn for_aggregate<A: AggregateFunction>(name: impl Into<Vec<u8>>, arity: Arity) -> Self {
        Self::new(
            name,
            arity,
            CallbackSet::Aggregate {
                step: trampoline::step::<A>,
                finalize: trampoline::finalize::<A>,
            },
        )
    }

    /// Descriptor for a Rust window function.
    pub fn for_window<W: WindowFunction>(name: impl Into<Vec<u8>>, arity: Arity) -> Self {
        Self::new(
            name,
            arity,
            CallbackSet::Window {
                step: trampoline::step::<W>,
                finalize: trampoline::finalize::<W>,
                value: trampoline::value::<W>,
                inverse: trampoline::inverse::<W>,
                destroy: None,
            },
        )
    }

    /// Descriptor from raw compiled addresses and an engine-style `n_arg`
    /// (`-1` for variadic), as an external compiler emits them.
    ///
    /// # Safety
    ///
    /// Same contract as [`RawCallbacks::into_callback_set`].
    pub unsafe fn from_raw(
        name: impl Into<Vec<u8>>,
        n_arg: c_int,
        kind: FunctionKind,
        callbacks: RawCallbacks,
    ) -> Result<Self, RegistrationError> {
        let arity = Arity::from_engine(n_arg)?;
        Ok(Self::new(name, arity, callbacks.into_callback_set(kind)?))
    }

    /// Sets the determinism flag.
    ///
    /// Only assert determinism if identical inputs give identical outputs for
    /// every input, `NULL` and NaN included.
    #[must_use]
    pub const fn deterministic(mut self, deterministic: bool) -> Self {
        self.deterministic = deterministic;
        self
    }

    /// Upgrades an aggregate descriptor to a window descriptor.
    pub fn with_window(self, value: ValueFn, inverse: InverseFn) -> Result<Self, RegistrationError> {
        match self.callbacks {
            CallbackSet::Aggregate { step, finalize } => Ok(Self {
                callbacks: CallbackSet::Window {
                    step,
                    finalize,
                    value,
                    inverse,
                    destroy: None,
                },
                ..self
            }),
            other => Err(RegistrationError::invalid(format!(
                "only an aggregate can gain value/inverse callbacks, not a {}",
                other.kind()
            ))),
        }
    }

    /// Attaches a destroy hook to a window descriptor.
    pub fn with_destroy(mut self, hook: DestroyFn) -> Result<Self, RegistrationError> {
        match &mut self.callbacks {
            CallbackSet::Window { destroy, .. } => {
                *destroy = Some(hook);
                Ok(self)
            }
            other => Err(RegistrationError::invalid(format!(
                "destroy hooks are only registered for window functions, not a {}",
                other.kind()
            ))),
        }
    }

    /// Function name, byte-exact.
    #[must_use]
    pub fn name(&self) -> &[u8] {
        &self.name
    }

    /// Name decoded for messages.
    #[must_use]
    pub fn display_name(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }

    /// Declared arity.
    #[must_use]
    pub const fn arity(&self) -> Arity {
        self.arity
    }

    /// Whether the engine may fold or cache calls.
    #[must_use]
    pub const fn is_deterministic(&self) -> bool {
        self.deterministic
    }

    /// Function kind, derived from the callbacks.
    #[must_use]
    pub const fn kind(&self) -> FunctionKind {
        self.callbacks.kind()
    }

    /// Callback addresses.
    #[must_use]
    pub const fn callbacks(&self) -> &CallbackSet {
        &self.callbacks
    }
}
