//! FFI glue between the pure Rust function model and SQLite's C extension API.
//!
//! # Architecture
//!
//! SQLite calls user functions through plain C function pointers with the
//! signatures `xFunc`/`xStep`/`xInverse(ctx, argc, argv)` and
//! `xFinal`/`xValue(ctx)`. Nothing in that protocol may unwind, so every
//! callback in this module funnels through [`marshal::guard`] or
//! [`marshal::guard_step`], which catch panics and convert every fault into an
//! engine-level error result.
//!
//! - [`marshal`] converts `sqlite3_value` handles to [`Value`](crate::Value)
//!   and writes results (or errors) into the `sqlite3_context`.
//! - [`context`] obtains the engine-owned aggregate block for a group.
//! - [`trampoline`] holds the generic `extern "C"` entry points that adapt the
//!   [`crate::function`] traits to the C signatures.
//! - [`sqlite`] implements [`FunctionTable`](crate::registry::FunctionTable)
//!   for a raw `sqlite3*` connection handle.

pub mod context;
pub mod marshal;
pub mod sqlite;
pub mod trampoline;
