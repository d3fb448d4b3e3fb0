//! [`FunctionTable`] over a raw SQLite connection handle.

use crate::descriptor::{DestroyFn, FinalizeFn, InverseFn, ScalarFn, StepFn, ValueFn};
use crate::registry::{EngineStatus, FunctionTable};
use libsqlite3_sys::*;
use std::ffi::CStr;
use std::os::raw::c_int;
use std::ptr::NonNull;

/// Version number of the linked SQLite library, e.g. `3046001`.
pub fn engine_version() -> i32 {
    // SAFETY: no preconditions.
    unsafe { sqlite3_libversion_number() }
}

/// Version string of the linked SQLite library, e.g. `"3.46.1"`.
pub fn engine_version_string() -> String {
    // SAFETY: sqlite3_libversion returns a static, NUL-terminated string.
    unsafe { CStr::from_ptr(sqlite3_libversion()) }
        .to_string_lossy()
        .into_owned()
}

/// A borrowed `sqlite3*` used for function registration.
///
/// The bridge neither opens nor closes the connection; whoever owns the handle
/// keeps it alive for as long as this value is used.
pub struct SqliteConnection {
    db: NonNull<sqlite3>,
}

impl SqliteConnection {
    /// Wraps a raw connection handle. Returns `None` for a null handle.
    ///
    /// # Safety
    ///
    /// `db` must be an open connection that outlives the returned value and
    /// is not used to run statements concurrently with registration.
    pub unsafe fn from_raw(db: *mut sqlite3) -> Option<Self> {
        NonNull::new(db).map(|db| Self { db })
    }

    /// The raw handle.
    pub const fn as_ptr(&self) -> *mut sqlite3 {
        self.db.as_ptr()
    }

    fn check(&self, code: c_int) -> Result<(), EngineStatus> {
        if code == SQLITE_OK {
            return Ok(());
        }
        // SAFETY: the handle is open; sqlite3_errmsg never returns null for an
        // open connection and the string stays valid until the next API call.
        let message = unsafe { CStr::from_ptr(sqlite3_errmsg(self.as_ptr())) }
            .to_string_lossy()
            .into_owned();
        Err(EngineStatus { code, message })
    }
}

impl FunctionTable for SqliteConnection {
    fn engine_version(&self) -> i32 {
        engine_version()
    }

    fn function_arg_limit(&self) -> i32 {
        // SAFETY: a negative new value only queries the limit.
        unsafe { sqlite3_limit(self.as_ptr(), SQLITE_LIMIT_FUNCTION_ARG, -1) }
    }

    fn create_function(
        &mut self,
        name: &CStr,
        n_arg: c_int,
        flags: c_int,
        scalar: Option<ScalarFn>,
        step: Option<StepFn>,
        finalize: Option<FinalizeFn>,
    ) -> Result<(), EngineStatus> {
        // SAFETY: the handle is open and `name` is NUL-terminated. User data is
        // null and no destroy hook is attached.
        let code = unsafe {
            sqlite3_create_function_v2(
                self.as_ptr(),
                name.as_ptr(),
                n_arg,
                flags,
                std::ptr::null_mut(),
                scalar,
                step,
                finalize,
                None,
            )
        };
        self.check(code)
    }

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
    ) -> Result<(), EngineStatus> {
        // SAFETY: as for `create_function`.
        let code = unsafe {
            sqlite3_create_window_function(
                self.as_ptr(),
                name.as_ptr(),
                n_arg,
                flags,
                std::ptr::null_mut(),
                Some(step),
                Some(finalize),
                Some(value),
                Some(inverse),
                destroy,
            )
        };
        self.check(code)
    }
}
