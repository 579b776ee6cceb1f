//! Module abstracting TF_Status.

use tensorflow_sys as sys;
use tracing::trace;

use crate::{
    char_ptr_to_string,
    error::{TfError, TfResult},
    tf_api,
};

/// Owned `TF_Status` handle.
///
/// Created immediately before a fallible native call, inspected
/// immediately after, never reused across calls. Dropping it releases
/// the native object on every exit path, early returns included.
#[derive(Debug)]
pub(crate) struct Status {
    pub(crate) ptr: *mut sys::TF_Status,
}

impl Status {
    pub(crate) fn new() -> Status {
        let ptr = unsafe { (tf_api().TF_NewStatus)() };
        Status { ptr }
    }

    /// Numeric status code; `0` means success.
    pub(crate) fn code(&self) -> sys::TF_Code {
        unsafe { (tf_api().TF_GetCode)(self.ptr) }
    }

    /// Message text, verbatim from the runtime.
    pub(crate) fn message(&self) -> TfResult<String> {
        let raw = unsafe { (tf_api().TF_Message)(self.ptr) };
        char_ptr_to_string(raw)
    }

    /// Translate the status into a host result: unit on success, the
    /// code and message as reported otherwise.
    pub(crate) fn to_result(&self) -> TfResult<()> {
        let code = self.code();
        if code == sys::TF_OK {
            Ok(())
        } else {
            Err(TfError::NativeStatus {
                code,
                message: self.message()?,
            })
        }
    }
}

impl Drop for Status {
    #[tracing::instrument]
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            trace!("Dropping Status: {:?}.", self.ptr);
            unsafe { (tf_api().TF_DeleteStatus)(self.ptr) };
        }

        self.ptr = std::ptr::null_mut();
    }
}
