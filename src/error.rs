// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/sqlite-native-udf)

//! Error types for registration and for individual callback invocations.
//!
//! Both families are local: a [`RegistrationError`] concerns one call to
//! [`Registry::register`](crate::registry::Registry::register), a
//! [`CallbackFault`] concerns one engine callback. Neither leaves global state
//! behind.

use crate::window::ProtocolViolation;

/// Failure to register a function with the engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    /// The descriptor failed static validation. The engine was not called.
    #[error("invalid function descriptor: {reason}")]
    InvalidDescriptor {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// The engine rejected the registration call.
    #[error("engine rejected registration of `{name}` (status {code}): {message}")]
    RegistrationFailure {
        /// Function name as submitted, lossily decoded for display.
        name: String,
        /// Status code returned by the engine.
        code: i32,
        /// The engine's own error message for the connection.
        message: String,
    },

    /// The linked engine predates window function support.
    #[error("SQLite {version} does not support window functions (added in 3.25.0)")]
    WindowUnsupported {
        /// Dotted engine version, e.g. `3.24.0`.
        version: String,
    },
}

impl RegistrationError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            reason: reason.into(),
        }
    }
}

/// A fault raised while evaluating a single callback invocation.
///
/// Every fault is converted to an engine-level error result for the
/// invocation that raised it; see [`crate::ffi::marshal::write_result`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CallbackFault {
    /// Integer division or remainder by zero.
    #[error("division by zero")]
    DivideByZero,

    /// A result did not fit the target representation (e.g. `i64` overflow).
    #[error("value out of range: {0}")]
    OutOfRange(String),

    /// Memory could not be obtained, including the engine's aggregate block.
    #[error("out of memory")]
    OutOfMemory,

    /// A text or blob result exceeded the engine's length limit.
    #[error("string or blob too big")]
    TooBig,

    /// A value could not be represented faithfully across the boundary.
    #[error("marshal fault: {0}")]
    Marshal(String),

    /// The native function reported an error of its own.
    #[error("{0}")]
    Native(String),

    /// The engine drove an aggregate context through an illegal transition.
    #[error("aggregate protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The native function panicked; the panic was caught at the boundary.
    #[error("native callback panicked: {0}")]
    Panic(String),
}

impl CallbackFault {
    /// Convenience constructor for [`CallbackFault::Native`].
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native(message.into())
    }

    /// Builds a fault from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Panic(message)
    }
}
