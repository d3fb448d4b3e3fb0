//! Value marshalling across the C boundary.
//!
//! Inbound conversion never fails: anything the bridge cannot represent
//! degrades to [`Value::Null`] with a logged anomaly. Outbound, exactly one of
//! a value or an error is written per value-producing callback.

use crate::error::CallbackFault;
use crate::value::Value;
use libsqlite3_sys::*;
use std::os::raw::{c_char, c_int, c_void};
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Reads one argument handle.
///
/// # Safety
///
/// `handle` must be null or a protected `sqlite3_value` valid for the
/// duration of the current callback.
pub unsafe fn read_value(handle: *mut sqlite3_value) -> Value {
    unsafe {
        if handle.is_null() {
            tracing::warn!("null sqlite3_value handle read as NULL");
            return Value::Null;
        }
        match sqlite3_value_type(handle) {
            SQLITE_NULL => Value::Null,
            SQLITE_INTEGER => Value::Integer(sqlite3_value_int64(handle)),
            SQLITE_FLOAT => Value::Float(sqlite3_value_double(handle)),
            // Text must be fetched before its byte length: the engine may
            // convert the encoding on the first call.
            SQLITE_TEXT => {
                let data = sqlite3_value_text(handle);
                let len = sqlite3_value_bytes(handle);
                copy_bytes(data.cast(), len).map_or_else(
                    || {
                        tracing::warn!("text argument unavailable (out of memory); read as NULL");
                        Value::Null
                    },
                    Value::Text,
                )
            }
            SQLITE_BLOB => {
                let data = sqlite3_value_blob(handle);
                let len = sqlite3_value_bytes(handle);
                copy_bytes(data.cast(), len).map_or_else(
                    || {
                        tracing::warn!("blob argument unavailable (out of memory); read as NULL");
                        Value::Null
                    },
                    Value::Blob,
                )
            }
            other => {
                tracing::warn!(storage_class = other, "unrecognized storage class read as NULL");
                Value::Null
            }
        }
    }
}

/// Copies `len` bytes. A null pointer is only legal for an empty buffer.
unsafe fn copy_bytes(data: *const u8, len: c_int) -> Option<Vec<u8>> {
    let len = usize::try_from(len).unwrap_or(0);
    if len == 0 {
        return Some(Vec::new());
    }
    if data.is_null() {
        return None;
    }
    Some(unsafe { std::slice::from_raw_parts(data, len) }.to_vec())
}

/// Reads the argument vector of a callback.
///
/// # Safety
///
/// `argv` must point to `argc` valid argument handles (or be null with
/// `argc <= 0`).
pub unsafe fn read_args(argc: c_int, argv: *mut *mut sqlite3_value) -> Vec<Value> {
    unsafe {
        let argc = usize::try_from(argc).unwrap_or(0);
        if argc == 0 || argv.is_null() {
            return Vec::new();
        }
        std::slice::from_raw_parts(argv, argc)
            .iter()
            .map(|&handle| read_value(handle))
            .collect()
    }
}

/// Writes a callback outcome into the result slot.
///
/// # Safety
///
/// `ctx` must be the `sqlite3_context` of the current callback.
pub unsafe fn write_result(ctx: *mut sqlite3_context, outcome: Result<Value, CallbackFault>) {
    unsafe {
        match outcome {
            Ok(value) => write_value(ctx, &value),
            Err(fault) => write_fault(ctx, &fault),
        }
    }
}

/// Sets the result slot to `value`.
///
/// Text and blob lengths are passed explicitly and the bytes are copied by
/// the engine (`SQLITE_TRANSIENT`). An oversized payload is turned into a
/// "too big" error by the engine itself. NaN has no engine representation
/// (it would be stored as `NULL`) and is reported as a marshal fault.
///
/// # Safety
///
/// `ctx` must be the `sqlite3_context` of the current callback.
pub unsafe fn write_value(ctx: *mut sqlite3_context, value: &Value) {
    unsafe {
        match value {
            Value::Null => sqlite3_result_null(ctx),
            Value::Integer(v) => sqlite3_result_int64(ctx, *v),
            Value::Float(v) if v.is_nan() => write_fault(
                ctx,
                &CallbackFault::Marshal("NaN result has no SQL representation".to_string()),
            ),
            Value::Float(v) => sqlite3_result_double(ctx, *v),
            Value::Text(bytes) => sqlite3_result_text64(
                ctx,
                bytes.as_ptr().cast::<c_char>(),
                bytes.len() as sqlite3_uint64,
                SQLITE_TRANSIENT(),
                SQLITE_UTF8 as u8,
            ),
            // A zero-length blob with a null pointer would read back as NULL.
            Value::Blob(bytes) if bytes.is_empty() => sqlite3_result_zeroblob(ctx, 0),
            Value::Blob(bytes) => sqlite3_result_blob64(
                ctx,
                bytes.as_ptr().cast::<c_void>(),
                bytes.len() as sqlite3_uint64,
                SQLITE_TRANSIENT(),
            ),
        }
    }
}

/// Puts the result slot into an error state.
///
/// # Safety
///
/// `ctx` must be the `sqlite3_context` of the current callback.
pub unsafe fn write_fault(ctx: *mut sqlite3_context, fault: &CallbackFault) {
    unsafe {
        match fault {
            CallbackFault::OutOfMemory => sqlite3_result_error_nomem(ctx),
            CallbackFault::TooBig => sqlite3_result_error_toobig(ctx),
            other => {
                let message = other.to_string();
                let len = c_int::try_from(message.len()).unwrap_or(c_int::MAX);
                sqlite3_result_error(ctx, message.as_ptr().cast::<c_char>(), len);
            }
        }
    }
}

fn caught(payload: &(dyn std::any::Any + Send)) -> CallbackFault {
    let fault = CallbackFault::from_panic(payload);
    tracing::warn!(%fault, "panic caught at callback boundary");
    fault
}

/// Runs a value-producing callback body (`xFunc`, `xValue`, `xFinal`).
///
/// Panics are caught, and the outcome is written exactly once: either a value
/// or an error, never both.
///
/// # Safety
///
/// `ctx` must be the `sqlite3_context` of the current callback.
pub unsafe fn guard<F>(ctx: *mut sqlite3_context, body: F)
where
    F: FnOnce() -> Result<Value, CallbackFault>,
{
    let outcome =
        catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| Err(caught(&*payload)));
    unsafe { write_result(ctx, outcome) };
}

/// Runs a mutating callback body (`xStep`, `xInverse`).
///
/// These callbacks produce no value; only a fault is written.
///
/// # Safety
///
/// `ctx` must be the `sqlite3_context` of the current callback.
pub unsafe fn guard_step<F>(ctx: *mut sqlite3_context, body: F)
where
    F: FnOnce() -> Result<(), CallbackFault>,
{
    let outcome =
        catch_unwind(AssertUnwindSafe(body)).unwrap_or_else(|payload| Err(caught(&*payload)));
    if let Err(fault) = outcome {
        unsafe { write_fault(ctx, &fault) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Arity, FunctionDescriptor};
    use crate::ffi::sqlite::SqliteConnection;
    use crate::function::ScalarFunction;
    use crate::registry::Registry;
    use rusqlite::types::Value as SqlValue;

    struct Identity;

    impl ScalarFunction for Identity {
        fn call(args: &[Value]) -> Result<Value, CallbackFault> {
            Ok(args[0].clone())
        }
    }

    struct Fail;

    impl ScalarFunction for Fail {
        fn call(args: &[Value]) -> Result<Value, CallbackFault> {
            match args[0].as_integer() {
                Some(0) => Err(CallbackFault::DivideByZero),
                Some(1) => Err(CallbackFault::OutOfMemory),
                Some(2) => Err(CallbackFault::TooBig),
                Some(3) => panic!("native code blew up"),
                Some(4) => Ok(Value::Float(f64::NAN)),
                _ => Err(CallbackFault::native("custom failure")),
            }
        }
    }

    pub(super) fn connection() -> rusqlite::Connection {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        let table = unsafe { SqliteConnection::from_raw(conn.handle()) }.unwrap();
        let mut registry = Registry::new(table);
        registry
            .register(&FunctionDescriptor::for_scalar::<Identity>(
                "identity",
                Arity::Fixed(1),
            ))
            .unwrap();
        registry
            .register(&FunctionDescriptor::for_scalar::<Fail>("fail", Arity::Fixed(1)))
            .unwrap();
        conn
    }

    fn identity(conn: &rusqlite::Connection, v: &SqlValue) -> SqlValue {
        conn.query_row("SELECT identity(?1)", [v], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_round_trip_each_storage_class() {
        let conn = connection();
        for v in [
            SqlValue::Null,
            SqlValue::Integer(-42),
            SqlValue::Real(0.25),
            SqlValue::Text("héllo".to_string()),
            SqlValue::Text(String::new()),
            SqlValue::Blob(vec![0, 1, 2, 255]),
        ] {
            assert_eq!(identity(&conn, &v), v);
        }
    }

    #[test]
    fn test_empty_blob_stays_blob() {
        let conn = connection();
        let (kind, len): (String, i64) = conn
            .query_row(
                "SELECT typeof(identity(x'')), length(identity(x''))",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "blob");
        assert_eq!(len, 0);
    }

    #[test]
    fn test_text_bytes_pass_through_unvalidated() {
        let conn = connection();
        let (kind, hex): (String, String) = conn
            .query_row(
                "SELECT typeof(identity(CAST(x'ff00fe' AS TEXT))), hex(identity(CAST(x'ff00fe' AS TEXT)))",
                [],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .unwrap();
        assert_eq!(kind, "text");
        assert_eq!(hex, "FF00FE");
    }

    #[test]
    fn test_fault_becomes_statement_error() {
        let conn = connection();
        let err = conn
            .query_row("SELECT fail(0)", [], |r| r.get::<_, i64>(0))
            .unwrap_err();
        assert!(err.to_string().contains("division by zero"), "{err}");

        let err = conn
            .query_row("SELECT fail(9)", [], |r| r.get::<_, i64>(0))
            .unwrap_err();
        assert!(err.to_string().contains("custom failure"), "{err}");
    }

    #[test]
    fn test_toobig_uses_engine_code() {
        let conn = connection();
        let err = conn
            .query_row("SELECT fail(2)", [], |r| r.get::<_, i64>(0))
            .unwrap_err();
        assert_eq!(err.sqlite_error_code(), Some(rusqlite::ErrorCode::TooBig));
    }

    #[test]
    fn test_nan_result_is_statement_error() {
        let conn = connection();
        let err = conn
            .query_row("SELECT typeof(fail(4))", [], |r| r.get::<_, String>(0))
            .unwrap_err();
        assert!(err.to_string().contains("marshal fault"), "{err}");
        assert!(err.to_string().contains("NaN"), "{err}");
    }

    #[test]
    fn test_panic_is_caught_and_connection_survives() {
        let conn = connection();
        let err = conn
            .query_row("SELECT fail(3)", [], |r| r.get::<_, i64>(0))
            .unwrap_err();
        assert!(err.to_string().contains("native code blew up"), "{err}");

        let v: i64 = conn
            .query_row("SELECT identity(7)", [], |r| r.get(0))
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_copy_bytes_null_pointer() {
        assert_eq!(unsafe { copy_bytes(std::ptr::null(), 0) }, Some(Vec::new()));
        assert_eq!(unsafe { copy_bytes(std::ptr::null(), 4) }, None);
    }

    #[test]
    fn test_read_args_empty() {
        assert!(unsafe { read_args(0, std::ptr::null_mut()) }.is_empty());
        assert_eq!(
            unsafe { read_value(std::ptr::null_mut()) },
            Value::Null
        );
    }
}
