//! # `native_udf` — Native Function Bridge for `SQLite`
//!
//! Registers natively compiled functions with `SQLite` as scalar, aggregate
//! and window functions through the engine's C extension API.
//!
//! ## Pieces
//!
//! | Module | Role |
//! |--------|------|
//! | [`value`] | The [`Value`] type every argument and result crosses the boundary as |
//! | [`descriptor`] | [`FunctionDescriptor`]: name, arity, determinism, callbacks |
//! | [`registry`] | Validates descriptors and picks the generic or window registration call |
//! | [`aggregate`] | Per-group state inside the engine-owned aggregate block |
//! | [`window`] | Call-ordering state machine for `step`/`inverse`/`value`/`finalize` |
//! | [`function`] | Traits for functions written in Rust |
//! | [`ffi`] | Marshalling, trampolines and the raw connection table |
//! | [`builtin`] | `add_one`, `my_sum` and `moving_sum` |
//!
//! ## Usage
//!
//! ```no_run
//! use native_udf::builtin::MovingSum;
//! use native_udf::ffi::sqlite::SqliteConnection;
//! use native_udf::{Arity, FunctionDescriptor, Registry};
//!
//! # fn demo(db: *mut libsqlite3_sys::sqlite3) -> Result<(), Box<dyn std::error::Error>> {
//! let table = unsafe { SqliteConnection::from_raw(db) }.ok_or("null connection")?;
//! let mut registry = Registry::new(table);
//! registry.register(
//!     &FunctionDescriptor::for_window::<MovingSum>("moving_sum", Arity::Fixed(1))
//!         .deterministic(true),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! Functions compiled by other toolchains are registered from their entry
//! point addresses with [`FunctionDescriptor::from_raw`].

pub mod aggregate;
pub mod builtin;
pub mod descriptor;
pub mod error;
pub mod ffi;
pub mod function;
pub mod registry;
pub mod value;
pub mod window;

pub use descriptor::{Arity, CallbackSet, FunctionDescriptor, FunctionKind, RawCallbacks};
pub use error::{CallbackFault, RegistrationError};
pub use function::{AggregateFunction, ScalarFunction, WindowFunction};
pub use registry::{FunctionTable, Registry};
pub use value::{Value, ValueType};
