// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Tom F. (https://github.com/tomtom215/sqlite-native-udf)

//! Call-ordering state machine for aggregate and window contexts.
//!
//! SQLite drives a window aggregate with four callbacks. For one context the
//! legal sequence is:
//!
//! ```text
//!             step                      step / inverse
//!   Empty ───────────▶ Accumulating ◀──────────────────┐
//!     │                   │     ▲                       │
//!     │             value │     │ step / inverse        │
//!     │                   ▼     │                       │
//!     │                 Readable ──── value ────────────┘
//!     │                   │
//!     └──── finalize ─────┴──── finalize ───▶ Retired
//! ```
//!
//! `value` never mutates the aggregate state, so `Readable` differs from
//! `Accumulating` only in recording that a read has happened since the last
//! mutation. A plain (non-window) aggregate walks the same machine using only
//! `step` and `finalize`.
//!
//! The phase is stored as a single byte inside the engine-owned block, and
//! zero must decode to [`Phase::Empty`] because the engine zero-fills new
//! blocks.

use std::fmt;

/// Lifecycle phase of one aggregate context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    /// Zero-filled block, no `step` yet.
    Empty = 0,
    /// At least one `step`; last call mutated the state.
    Accumulating = 1,
    /// At least one `step`; last call was a non-consuming `value`.
    Readable = 2,
    /// `finalize` ran. The context must not be touched again.
    Retired = 3,
}

/// A callback the engine makes against a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowEvent {
    /// A row enters the frame.
    Step,
    /// A row leaves the frame.
    Inverse,
    /// The current result is read.
    Value,
    /// The context is retired.
    Finalize,
}

impl fmt::Display for WindowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Step => "step",
            Self::Inverse => "inverse",
            Self::Value => "value",
            Self::Finalize => "finalize",
        })
    }
}

/// An event arrived in a phase that does not accept it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{event}` called on a context in phase {phase:?}")]
pub struct ProtocolViolation {
    /// Phase the context was in.
    pub phase: Phase,
    /// The rejected event.
    pub event: WindowEvent,
}

impl Phase {
    /// Decodes the phase byte stored in an engine block.
    ///
    /// Unknown bytes decode to `Retired` so a corrupted block is never
    /// treated as holding live state.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Self {
        match byte {
            0 => Self::Empty,
            1 => Self::Accumulating,
            2 => Self::Readable,
            _ => Self::Retired,
        }
    }

    /// Returns `true` if the context holds an initialized aggregate state.
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Accumulating | Self::Readable)
    }

    /// Applies `event`, returning the next phase.
    ///
    /// `value` on an `Empty` context is accepted and stays `Empty`: the
    /// engine reads empty frames (e.g. `ROWS BETWEEN 1 FOLLOWING AND
    /// 1 FOLLOWING` on the last row) without a preceding `step`. `inverse` on
    /// an `Empty` context and any event after `Retired` are violations.
    pub const fn on(self, event: WindowEvent) -> Result<Self, ProtocolViolation> {
        match (self, event) {
            (Self::Retired, _) | (Self::Empty, WindowEvent::Inverse) => {
                Err(ProtocolViolation { phase: self, event })
            }
            (Self::Empty, WindowEvent::Value) => Ok(Self::Empty),
            (_, WindowEvent::Step | WindowEvent::Inverse) => Ok(Self::Accumulating),
            (_, WindowEvent::Value) => Ok(Self::Readable),
            (_, WindowEvent::Finalize) => Ok(Self::Retired),
        }
    }
}
