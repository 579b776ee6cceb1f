//! Owned copies of host bytes handed to the runtime as `TF_Buffer`s.

use std::os::raw::c_void;

use tensorflow_sys as sys;
use tracing::{error, trace};

use crate::{
    error::{assert_not_null_pointer, TfResult},
    tf_api,
};

/// A native byte buffer holding a copy of host bytes.
///
/// Used by the SavedModel loader for serialized run-options and
/// metagraph protos. Released exactly once, on drop, whether or not the
/// call it was built for succeeded.
#[derive(Debug)]
pub(crate) struct Buffer {
    ptr: *mut sys::TF_Buffer,
}

impl Buffer {
    /// Copy `bytes` into a fresh native buffer.
    pub(crate) fn from_bytes(bytes: &[u8]) -> TfResult<Buffer> {
        let ptr = unsafe {
            (tf_api().TF_NewBufferFromString)(bytes.as_ptr() as *const c_void, bytes.len())
        };
        assert_not_null_pointer(ptr, "Buffer")?;
        trace!("Created Buffer: {ptr:?}.");
        Ok(Buffer { ptr })
    }

    pub(crate) fn as_ptr(&self) -> *const sys::TF_Buffer {
        self.ptr
    }
}

impl Drop for Buffer {
    #[tracing::instrument]
    fn drop(&mut self) {
        if self.ptr.is_null() {
            error!("Buffer pointer is null, not dropping");
        } else {
            trace!("Dropping Buffer: {:?}.", self.ptr);
            unsafe { (tf_api().TF_DeleteBuffer)(self.ptr) };
        }

        self.ptr = std::ptr::null_mut();
    }
}
