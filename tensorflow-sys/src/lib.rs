//! Raw bindings for the TensorFlow C API (`tensorflow/c/c_api.h`).
//!
//! Hand-maintained for the subset of entry points the safe `tensorflow`
//! crate needs. The shared library is loaded at runtime through
//! [`libloading`], so there is no link-time dependency on
//! `libtensorflow`; the resolved entry points are collected into a
//! [`TF_Api`] table of plain function pointers.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::all)]

use std::os::raw::{c_char, c_int, c_uint, c_void};

pub use libloading::library_filename;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TF_Status {
    _unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TF_SessionOptions {
    _unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TF_Session {
    _unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TF_Graph {
    _unused: [u8; 0],
}

#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TF_Tensor {
    _unused: [u8; 0],
}

/// Length-tagged byte buffer passed to and from the runtime.
///
/// When `data_deallocator` is set the runtime invokes it from
/// `TF_DeleteBuffer` to release `data`.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct TF_Buffer {
    pub data: *const c_void,
    pub length: usize,
    pub data_deallocator: Option<unsafe extern "C" fn(data: *mut c_void, length: usize)>,
}

/// Callback invoked by the runtime when it releases a tensor's backing
/// buffer (from `TF_DeleteTensor`).
pub type TF_TensorDeallocator =
    Option<unsafe extern "C" fn(data: *mut c_void, len: usize, arg: *mut c_void)>;

pub type TF_DataType = c_uint;

pub const TF_FLOAT: TF_DataType = 1;
pub const TF_DOUBLE: TF_DataType = 2;
pub const TF_INT32: TF_DataType = 3;
pub const TF_UINT8: TF_DataType = 4;
pub const TF_INT16: TF_DataType = 5;
pub const TF_INT8: TF_DataType = 6;
pub const TF_STRING: TF_DataType = 7;
pub const TF_COMPLEX64: TF_DataType = 8;
pub const TF_INT64: TF_DataType = 9;
pub const TF_BOOL: TF_DataType = 10;
pub const TF_QINT8: TF_DataType = 11;
pub const TF_QUINT8: TF_DataType = 12;
pub const TF_QINT32: TF_DataType = 13;
pub const TF_BFLOAT16: TF_DataType = 14;
pub const TF_QINT16: TF_DataType = 15;
pub const TF_QUINT16: TF_DataType = 16;
pub const TF_UINT16: TF_DataType = 17;
pub const TF_COMPLEX128: TF_DataType = 18;
pub const TF_HALF: TF_DataType = 19;
pub const TF_RESOURCE: TF_DataType = 20;
pub const TF_VARIANT: TF_DataType = 21;
pub const TF_UINT32: TF_DataType = 22;
pub const TF_UINT64: TF_DataType = 23;

pub type TF_Code = c_int;

pub const TF_OK: TF_Code = 0;
pub const TF_CANCELLED: TF_Code = 1;
pub const TF_UNKNOWN: TF_Code = 2;
pub const TF_INVALID_ARGUMENT: TF_Code = 3;
pub const TF_DEADLINE_EXCEEDED: TF_Code = 4;
pub const TF_NOT_FOUND: TF_Code = 5;
pub const TF_ALREADY_EXISTS: TF_Code = 6;
pub const TF_PERMISSION_DENIED: TF_Code = 7;
pub const TF_RESOURCE_EXHAUSTED: TF_Code = 8;
pub const TF_FAILED_PRECONDITION: TF_Code = 9;
pub const TF_ABORTED: TF_Code = 10;
pub const TF_OUT_OF_RANGE: TF_Code = 11;
pub const TF_UNIMPLEMENTED: TF_Code = 12;
pub const TF_INTERNAL: TF_Code = 13;
pub const TF_UNAVAILABLE: TF_Code = 14;
pub const TF_DATA_LOSS: TF_Code = 15;
pub const TF_UNAUTHENTICATED: TF_Code = 16;

/// Resolved entry points of the TensorFlow C API.
///
/// Every field is a plain function pointer copied out of the loaded
/// library, so the table is `Copy` and can live in a `static` for the
/// lifetime of the process. The [`tensorflow`] struct that produced it
/// must be kept alive for the pointers to stay valid.
#[derive(Debug, Copy, Clone)]
pub struct TF_Api {
    // Status.
    pub TF_NewStatus: unsafe extern "C" fn() -> *mut TF_Status,
    pub TF_DeleteStatus: unsafe extern "C" fn(status: *mut TF_Status),
    pub TF_GetCode: unsafe extern "C" fn(status: *const TF_Status) -> TF_Code,
    pub TF_Message: unsafe extern "C" fn(status: *const TF_Status) -> *const c_char,

    // Session options.
    pub TF_NewSessionOptions: unsafe extern "C" fn() -> *mut TF_SessionOptions,
    pub TF_DeleteSessionOptions: unsafe extern "C" fn(options: *mut TF_SessionOptions),
    pub TF_SetTarget:
        unsafe extern "C" fn(options: *mut TF_SessionOptions, target: *const c_char),
    pub TF_SetConfig: unsafe extern "C" fn(
        options: *mut TF_SessionOptions,
        proto: *const c_void,
        proto_len: usize,
        status: *mut TF_Status,
    ),

    // Session lifecycle and execution.
    pub TF_NewSession: unsafe extern "C" fn(
        options: *const TF_SessionOptions,
        status: *mut TF_Status,
    ) -> *mut TF_Session,
    pub TF_CloseSession: unsafe extern "C" fn(session: *mut TF_Session, status: *mut TF_Status),
    pub TF_DeleteSession: unsafe extern "C" fn(session: *mut TF_Session, status: *mut TF_Status),
    pub TF_ExtendGraph: unsafe extern "C" fn(
        session: *mut TF_Session,
        proto: *const c_void,
        proto_len: usize,
        status: *mut TF_Status,
    ),
    pub TF_Run: unsafe extern "C" fn(
        session: *mut TF_Session,
        run_options: *const TF_Buffer,
        input_names: *const *const c_char,
        inputs: *const *mut TF_Tensor,
        ninputs: c_int,
        output_names: *const *const c_char,
        outputs: *mut *mut TF_Tensor,
        noutputs: c_int,
        target_names: *const *const c_char,
        ntargets: c_int,
        run_metadata: *mut TF_Buffer,
        status: *mut TF_Status,
    ),

    // Graph.
    pub TF_NewGraph: unsafe extern "C" fn() -> *mut TF_Graph,
    pub TF_DeleteGraph: unsafe extern "C" fn(graph: *mut TF_Graph),

    // SavedModel loading.
    pub TF_LoadSessionFromSavedModel: unsafe extern "C" fn(
        session_options: *const TF_SessionOptions,
        run_options: *const TF_Buffer,
        export_dir: *const c_char,
        tags: *const *const c_char,
        tags_len: c_int,
        graph: *mut TF_Graph,
        meta_graph_def: *const TF_Buffer,
        status: *mut TF_Status,
    ) -> *mut TF_Session,

    // Byte buffers.
    pub TF_NewBufferFromString:
        unsafe extern "C" fn(proto: *const c_void, proto_len: usize) -> *mut TF_Buffer,
    pub TF_DeleteBuffer: unsafe extern "C" fn(buffer: *mut TF_Buffer),

    // Tensors.
    pub TF_NewTensor: unsafe extern "C" fn(
        dtype: TF_DataType,
        dims: *const i64,
        num_dims: c_int,
        data: *mut c_void,
        len: usize,
        deallocator: TF_TensorDeallocator,
        deallocator_arg: *mut c_void,
    ) -> *mut TF_Tensor,
    pub TF_DeleteTensor: unsafe extern "C" fn(tensor: *mut TF_Tensor),
    pub TF_TensorType: unsafe extern "C" fn(tensor: *const TF_Tensor) -> TF_DataType,
    pub TF_TensorData: unsafe extern "C" fn(tensor: *const TF_Tensor) -> *mut c_void,
    pub TF_TensorByteSize: unsafe extern "C" fn(tensor: *const TF_Tensor) -> usize,
    pub TF_NumDims: unsafe extern "C" fn(tensor: *const TF_Tensor) -> c_int,
    pub TF_Dim: unsafe extern "C" fn(tensor: *const TF_Tensor, dim_index: c_int) -> i64,
}

impl TF_Api {
    /// Resolve every entry point from an already-loaded library.
    ///
    /// # Safety
    ///
    /// The library must export symbols with the documented C API
    /// signatures; the returned table is only valid while the library
    /// stays loaded.
    pub unsafe fn from_library(library: &libloading::Library) -> Result<Self, libloading::Error> {
        macro_rules! sym {
            ($name:ident) => {
                *library.get(concat!(stringify!($name), "\0").as_bytes())?
            };
        }

        Ok(TF_Api {
            TF_NewStatus: sym!(TF_NewStatus),
            TF_DeleteStatus: sym!(TF_DeleteStatus),
            TF_GetCode: sym!(TF_GetCode),
            TF_Message: sym!(TF_Message),
            TF_NewSessionOptions: sym!(TF_NewSessionOptions),
            TF_DeleteSessionOptions: sym!(TF_DeleteSessionOptions),
            TF_SetTarget: sym!(TF_SetTarget),
            TF_SetConfig: sym!(TF_SetConfig),
            TF_NewSession: sym!(TF_NewSession),
            TF_CloseSession: sym!(TF_CloseSession),
            TF_DeleteSession: sym!(TF_DeleteSession),
            TF_ExtendGraph: sym!(TF_ExtendGraph),
            TF_Run: sym!(TF_Run),
            TF_NewGraph: sym!(TF_NewGraph),
            TF_DeleteGraph: sym!(TF_DeleteGraph),
            TF_LoadSessionFromSavedModel: sym!(TF_LoadSessionFromSavedModel),
            TF_NewBufferFromString: sym!(TF_NewBufferFromString),
            TF_DeleteBuffer: sym!(TF_DeleteBuffer),
            TF_NewTensor: sym!(TF_NewTensor),
            TF_DeleteTensor: sym!(TF_DeleteTensor),
            TF_TensorType: sym!(TF_TensorType),
            TF_TensorData: sym!(TF_TensorData),
            TF_TensorByteSize: sym!(TF_TensorByteSize),
            TF_NumDims: sym!(TF_NumDims),
            TF_Dim: sym!(TF_Dim),
        })
    }
}

/// The dynamically-loaded TensorFlow library plus its resolved API table.
pub struct tensorflow {
    __library: libloading::Library,
    pub api: TF_Api,
}

impl tensorflow {
    /// Load the shared library from `path` and resolve the API table.
    ///
    /// # Safety
    ///
    /// Loading a foreign library runs its initializers; the file must be
    /// a TensorFlow C API build matching the declared signatures.
    pub unsafe fn new<P>(path: P) -> Result<Self, libloading::Error>
    where
        P: AsRef<std::ffi::OsStr>,
    {
        let library = libloading::Library::new(path)?;
        Self::from_library(library)
    }

    /// Wrap an already-opened library handle.
    ///
    /// # Safety
    ///
    /// Same contract as [`tensorflow::new`].
    pub unsafe fn from_library(library: libloading::Library) -> Result<Self, libloading::Error> {
        let api = TF_Api::from_library(&library)?;
        Ok(tensorflow {
            __library: library,
            api,
        })
    }
}
