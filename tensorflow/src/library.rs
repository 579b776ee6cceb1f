//! Loading of the TensorFlow shared library.
//!
//! The library is loaded at most once per process; the resolved
//! entry-point table is kept in a static and handed out through
//! [`tf_api`]. Every other module calls the runtime through that table.

use std::ffi::OsString;

use once_cell::sync::OnceCell;
use tensorflow_sys as sys;
use tracing::debug;

use crate::error::TfResult;

static LIB: OnceCell<sys::tensorflow> = OnceCell::new();

static API: OnceCell<sys::TF_Api> = OnceCell::new();

pub(crate) fn tf_api() -> &'static sys::TF_Api {
    API.get()
        .expect("TensorFlow library not loaded; call library::load() first")
}

/// Load the TensorFlow shared library under its platform default name
/// (`libtensorflow.so` / `libtensorflow.dylib` / `tensorflow.dll`),
/// resolved the normal way for the OS.
///
/// Loading happens once per process; later calls are no-ops.
pub fn load() -> TfResult<()> {
    load_impl(None)
}

/// Load the TensorFlow shared library from an explicit path.
///
/// Only the first successful load counts; if the library is already
/// loaded the path is ignored.
pub fn load_from<P>(path: P) -> TfResult<()>
where
    P: AsRef<std::ffi::OsStr>,
{
    load_impl(Some(path.as_ref().to_owned()))
}

fn load_impl(path: Option<OsString>) -> TfResult<()> {
    let lib = LIB.get_or_try_init(|| unsafe {
        match path {
            Some(path) => sys::tensorflow::new(path),
            None => sys::tensorflow::new(sys::library_filename("tensorflow")),
        }
    })?;

    API.get_or_init(|| lib.api);
    debug!("TensorFlow library loaded.");
    Ok(())
}

/// Install an entry-point table without loading a shared library. Used by
/// the unit tests to route native calls into the in-process stub.
#[cfg(test)]
pub(crate) fn install_api_for_tests(api: sys::TF_Api) {
    API.get_or_init(|| api);
}
