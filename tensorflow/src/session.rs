//! Module containing session types.

use std::collections::HashMap;
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::sync::{RwLock, RwLockReadGuard};

use tensorflow_sys as sys;
use tracing::{error, trace};

use crate::{
    error::{assert_not_null_pointer, TfError, TfResult},
    status::Status,
    tensor::Tensor,
    tf_api,
};

/// Options for session creation.
///
/// Marshaled into the runtime's own representation for the duration of
/// each call that needs it, and released right after, success or not.
#[derive(Clone, Debug, Default)]
pub struct SessionOptions {
    target: String,
    config: Vec<u8>,
}

impl SessionOptions {
    /// Default options: empty target, runtime default config.
    #[must_use]
    pub fn new() -> SessionOptions {
        SessionOptions::default()
    }

    /// Execution engine to connect to; the empty string selects the
    /// in-process engine.
    #[must_use]
    pub fn with_target<S>(mut self, target: S) -> SessionOptions
    where
        S: Into<String>,
    {
        self.target = target.into();
        self
    }

    /// Serialized config proto, produced by an external tool; opaque to
    /// this binding.
    #[must_use]
    pub fn with_config<B>(mut self, config: B) -> SessionOptions
    where
        B: Into<Vec<u8>>,
    {
        self.config = config.into();
        self
    }

    pub(crate) fn to_native(&self) -> TfResult<NativeSessionOptions> {
        let ptr = unsafe { (tf_api().TF_NewSessionOptions)() };
        assert_not_null_pointer(ptr, "SessionOptions")?;
        let native = NativeSessionOptions { ptr };

        if !self.target.is_empty() {
            let target = CString::new(self.target.as_str())?;
            unsafe { (tf_api().TF_SetTarget)(native.ptr, target.as_ptr()) };
        }
        if !self.config.is_empty() {
            let status = Status::new();
            unsafe {
                (tf_api().TF_SetConfig)(
                    native.ptr,
                    self.config.as_ptr() as *const c_void,
                    self.config.len(),
                    status.ptr,
                )
            };
            status.to_result()?;
        }
        Ok(native)
    }
}

/// Scoped native `TF_SessionOptions` handle, released on drop.
#[derive(Debug)]
pub(crate) struct NativeSessionOptions {
    pub(crate) ptr: *mut sys::TF_SessionOptions,
}

impl Drop for NativeSessionOptions {
    #[tracing::instrument]
    fn drop(&mut self) {
        if self.ptr.is_null() {
            error!("SessionOptions pointer is null, not dropping");
        } else {
            trace!("Dropping SessionOptions: {:?}.", self.ptr);
            unsafe { (tf_api().TF_DeleteSessionOptions)(self.ptr) };
        }

        self.ptr = std::ptr::null_mut();
    }
}

/// An active session with the runtime.
///
/// A session moves one way, `Open` to `Closed`: after [`Session::close`]
/// every operation fails with [`TfError::ClosedHandle`] without touching
/// the runtime. Dropping an open session closes it as a safety net, but
/// the explicit `close()` is the primary release path — it is the only
/// place a close failure can be observed.
///
/// The handle sits behind an `RwLock`: [`Session::run`] and
/// [`Session::extend_graph`] share it for the duration of the native
/// call, and `close()` takes it exclusively, so closing waits for
/// in-flight operations instead of racing them.
#[derive(Debug)]
pub struct Session {
    handle: RwLock<*mut sys::TF_Session>,
}

unsafe impl Send for Session {}
unsafe impl Sync for Session {}

impl Session {
    /// Create a new session, with default options if none are given.
    #[tracing::instrument]
    pub fn new(options: Option<&SessionOptions>) -> TfResult<Session> {
        let default_options;
        let options = match options {
            Some(options) => options,
            None => {
                default_options = SessionOptions::new();
                &default_options
            }
        };

        let native_options = options.to_native()?;
        let status = Status::new();
        let ptr = unsafe { (tf_api().TF_NewSession)(native_options.ptr, status.ptr) };
        status.to_result()?;
        assert_not_null_pointer(ptr, "Session")?;

        trace!("Created Session: {ptr:?}.");
        Ok(Session {
            handle: RwLock::new(ptr),
        })
    }

    /// Wrap a session handle the runtime already created (SavedModel
    /// loading).
    pub(crate) fn from_ptr(ptr: *mut sys::TF_Session) -> Session {
        trace!("Created Session: {ptr:?}.");
        Session {
            handle: RwLock::new(ptr),
        }
    }

    /// Shared access to the handle, or `ClosedHandle` once closed.
    fn handle(&self) -> TfResult<RwLockReadGuard<'_, *mut sys::TF_Session>> {
        let guard = self.handle.read().expect("The lock is poisoned");
        if guard.is_null() {
            Err(TfError::ClosedHandle)
        } else {
            Ok(guard)
        }
    }

    /// Forward an already-serialized graph definition to the runtime.
    ///
    /// The serialization is produced by an external graph builder and is
    /// opaque to this binding.
    #[tracing::instrument(skip(graph_def))]
    pub fn extend_graph(&self, graph_def: &[u8]) -> TfResult<()> {
        let handle = self.handle()?;

        let status = Status::new();
        unsafe {
            (tf_api().TF_ExtendGraph)(
                *handle,
                graph_def.as_ptr() as *const c_void,
                graph_def.len(),
                status.ptr,
            )
        };
        status.to_result()
    }

    /// Run the graph: feed `inputs`, execute `target_names` for their
    /// side effects, and fetch `output_names`.
    ///
    /// The returned tensors correspond to `output_names` in order,
    /// regardless of the input map's iteration order. On failure the
    /// error is returned alone; no partial results are exposed. The call
    /// blocks until the runtime completes and cannot be cancelled from
    /// this layer.
    #[tracing::instrument(skip(inputs))]
    pub fn run(
        &self,
        inputs: &HashMap<String, &Tensor>,
        output_names: &[String],
        target_names: &[String],
    ) -> TfResult<Vec<Tensor>> {
        let handle = self.handle()?;

        // Parallel name/value lists; the runtime consumes them
        // positionally, so both must come from the same iteration.
        let mut input_names = Vec::with_capacity(inputs.len());
        let mut input_values: Vec<*mut sys::TF_Tensor> = Vec::with_capacity(inputs.len());
        for (name, tensor) in inputs {
            input_names.push(CString::new(name.as_str())?);
            input_values.push(tensor.ptr);
        }
        let input_name_ptrs: Vec<*const c_char> =
            input_names.iter().map(|name| name.as_ptr()).collect();

        let output_names_c = output_names
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let output_name_ptrs: Vec<*const c_char> =
            output_names_c.iter().map(|name| name.as_ptr()).collect();

        let target_names_c = target_names
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        let target_name_ptrs: Vec<*const c_char> =
            target_names_c.iter().map(|name| name.as_ptr()).collect();

        let mut output_values: Vec<*mut sys::TF_Tensor> =
            vec![std::ptr::null_mut(); output_names.len()];

        let status = Status::new();
        unsafe {
            (tf_api().TF_Run)(
                *handle,
                std::ptr::null(),
                input_name_ptrs.as_ptr(),
                input_values.as_ptr(),
                input_values.len() as c_int,
                output_name_ptrs.as_ptr(),
                output_values.as_mut_ptr(),
                output_values.len() as c_int,
                target_name_ptrs.as_ptr(),
                target_name_ptrs.len() as c_int,
                std::ptr::null_mut(),
                status.ptr,
            )
        };

        // Wrap whatever the runtime populated before looking at the
        // status, so nothing can leak on the error path.
        let outputs: Vec<Option<Tensor>> = output_values
            .into_iter()
            .map(|ptr| (!ptr.is_null()).then(|| Tensor::from_ptr(ptr)))
            .collect();
        status.to_result()?;

        outputs
            .into_iter()
            .enumerate()
            .map(|(i, tensor)| {
                tensor.ok_or_else(|| {
                    TfError::PointerShouldNotBeNull(format!("Run output {:?}", output_names[i]))
                })
            })
            .collect()
    }

    /// Release the native session handle.
    ///
    /// Idempotent: the first call closes and deletes the handle, every
    /// later call is a no-op. Blocks until in-flight `run` and
    /// `extend_graph` calls have finished.
    #[tracing::instrument]
    pub fn close(&self) -> TfResult<()> {
        let mut guard = self.handle.write().expect("The lock is poisoned");
        if guard.is_null() {
            return Ok(());
        }

        let status = Status::new();
        unsafe { (tf_api().TF_CloseSession)(*guard, status.ptr) };
        status.to_result()?;

        let status = Status::new();
        unsafe { (tf_api().TF_DeleteSession)(*guard, status.ptr) };
        status.to_result()?;

        trace!("Closed Session: {:?}.", *guard);
        *guard = std::ptr::null_mut();
        Ok(())
    }
}

impl Drop for Session {
    #[tracing::instrument]
    fn drop(&mut self) {
        // Safety net for a forgotten close(); errors have nowhere to go
        // here, so the explicit close remains the preferred path.
        if let Err(e) = self.close() {
            error!("Failed to close session on drop: {e}");
        }
    }
}
