//! In-process stand-in for the TensorFlow runtime, used by the unit
//! tests.
//!
//! Implements the entry-point table in plain Rust, with live-allocation
//! counters, call captures and failure injection, so lifecycle and
//! cleanup invariants are observable without the shared library. Tests
//! that assert on this shared state must hold the guard returned by
//! [`setup`].

#![allow(non_snake_case)]

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use tensorflow_sys as sys;

use crate::status::Status;
use crate::tensor::encode_strings;

static LIVE_STATUSES: AtomicUsize = AtomicUsize::new(0);
static LIVE_SESSION_OPTIONS: AtomicUsize = AtomicUsize::new(0);
static LIVE_SESSIONS: AtomicUsize = AtomicUsize::new(0);
static LIVE_GRAPHS: AtomicUsize = AtomicUsize::new(0);
static LIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);
static LIVE_TENSORS: AtomicUsize = AtomicUsize::new(0);

static RUN_CALLS: AtomicUsize = AtomicUsize::new(0);
static EXTEND_CALLS: AtomicUsize = AtomicUsize::new(0);

static FAIL_NEXT_LOAD: Mutex<Option<(i32, String)>> = Mutex::new(None);
static FAIL_NEXT_RUN: Mutex<Option<(i32, String)>> = Mutex::new(None);

static LAST_LOAD: Mutex<Option<LoadCapture>> = Mutex::new(None);
static LAST_RUN: Mutex<Option<RunCapture>> = Mutex::new(None);
static LAST_EXTEND: Mutex<Option<Vec<u8>>> = Mutex::new(None);

static TEST_LOCK: Mutex<()> = Mutex::new(());

/// Numbers of engine objects currently alive.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct LiveCounts {
    pub(crate) statuses: usize,
    pub(crate) session_options: usize,
    pub(crate) sessions: usize,
    pub(crate) graphs: usize,
    pub(crate) buffers: usize,
    pub(crate) tensors: usize,
}

/// Arguments the last `TF_LoadSessionFromSavedModel` call received.
#[derive(Clone, Debug, Default)]
pub(crate) struct LoadCapture {
    pub(crate) export_dir: String,
    pub(crate) tags: Vec<String>,
    pub(crate) run_options: Option<Vec<u8>>,
    pub(crate) meta_graph: Option<Vec<u8>>,
    pub(crate) target: String,
    pub(crate) config: Vec<u8>,
}

/// Name lists the last `TF_Run` call received.
#[derive(Clone, Debug, Default)]
pub(crate) struct RunCapture {
    pub(crate) input_names: Vec<String>,
    pub(crate) output_names: Vec<String>,
    pub(crate) target_names: Vec<String>,
}

/// Install the stub entry-point table and serialize access to the stub's
/// global state for the calling test.
pub(crate) fn setup() -> MutexGuard<'static, ()> {
    crate::library::install_api_for_tests(api_table());
    TEST_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn live_counts() -> LiveCounts {
    LiveCounts {
        statuses: LIVE_STATUSES.load(Ordering::SeqCst),
        session_options: LIVE_SESSION_OPTIONS.load(Ordering::SeqCst),
        sessions: LIVE_SESSIONS.load(Ordering::SeqCst),
        graphs: LIVE_GRAPHS.load(Ordering::SeqCst),
        buffers: LIVE_BUFFERS.load(Ordering::SeqCst),
        tensors: LIVE_TENSORS.load(Ordering::SeqCst),
    }
}

pub(crate) fn run_calls() -> usize {
    RUN_CALLS.load(Ordering::SeqCst)
}

pub(crate) fn extend_calls() -> usize {
    EXTEND_CALLS.load(Ordering::SeqCst)
}

pub(crate) fn fail_next_load(code: i32, message: &str) {
    *FAIL_NEXT_LOAD.lock().unwrap() = Some((code, message.to_owned()));
}

pub(crate) fn fail_next_run(code: i32, message: &str) {
    *FAIL_NEXT_RUN.lock().unwrap() = Some((code, message.to_owned()));
}

pub(crate) fn last_load() -> Option<LoadCapture> {
    LAST_LOAD.lock().unwrap().clone()
}

pub(crate) fn last_run() -> Option<RunCapture> {
    LAST_RUN.lock().unwrap().clone()
}

pub(crate) fn last_extend() -> Option<Vec<u8>> {
    LAST_EXTEND.lock().unwrap().clone()
}

/// Build an owned [`Status`] carrying an arbitrary code and message.
pub(crate) fn failing_status(code: i32, message: &str) -> Status {
    let status = Status::new();
    set_status(status.ptr, code, message);
    status
}

/// Build a native tensor with arbitrary type, dims and raw bytes —
/// including combinations the safe encoder would never produce.
pub(crate) fn raw_tensor(
    dtype: sys::TF_DataType,
    dims: &[i64],
    bytes: Vec<u8>,
) -> *mut sys::TF_Tensor {
    new_owned_tensor(dtype, dims, bytes)
}

fn api_table() -> sys::TF_Api {
    sys::TF_Api {
        TF_NewStatus,
        TF_DeleteStatus,
        TF_GetCode,
        TF_Message,
        TF_NewSessionOptions,
        TF_DeleteSessionOptions,
        TF_SetTarget,
        TF_SetConfig,
        TF_NewSession,
        TF_CloseSession,
        TF_DeleteSession,
        TF_ExtendGraph,
        TF_Run,
        TF_NewGraph,
        TF_DeleteGraph,
        TF_LoadSessionFromSavedModel,
        TF_NewBufferFromString,
        TF_DeleteBuffer,
        TF_NewTensor,
        TF_DeleteTensor,
        TF_TensorType,
        TF_TensorData,
        TF_TensorByteSize,
        TF_NumDims,
        TF_Dim,
    }
}

// --- Engine object bodies ---

struct StubStatus {
    code: c_int,
    message: CString,
}

#[derive(Default)]
struct StubSessionOptions {
    target: String,
    config: Vec<u8>,
}

struct StubSession {
    closed: bool,
}

struct StubGraph;

struct StubTensor {
    dtype: sys::TF_DataType,
    dims: Vec<i64>,
    data: *mut c_void,
    len: usize,
    deallocator: sys::TF_TensorDeallocator,
    deallocator_arg: *mut c_void,
    // Backing storage for tensors the stub itself produces.
    owned: Option<Box<[u8]>>,
}

// --- Helpers ---

fn set_status(status: *mut sys::TF_Status, code: c_int, message: &str) {
    let status = unsafe { &mut *(status as *mut StubStatus) };
    status.code = code;
    status.message = CString::new(message).expect("stub message with NUL");
}

fn copy_bytes(data: *const c_void, len: usize) -> Vec<u8> {
    if data.is_null() || len == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(data as *const u8, len).to_vec() }
    }
}

unsafe fn read_names(names: *const *const c_char, count: c_int) -> Vec<String> {
    (0..count as usize)
        .map(|i| {
            CStr::from_ptr(*names.add(i))
                .to_string_lossy()
                .into_owned()
        })
        .collect()
}

unsafe fn read_buffer(buffer: *const sys::TF_Buffer) -> Option<Vec<u8>> {
    if buffer.is_null() {
        None
    } else {
        Some(copy_bytes((*buffer).data, (*buffer).length))
    }
}

fn new_owned_tensor(dtype: sys::TF_DataType, dims: &[i64], bytes: Vec<u8>) -> *mut sys::TF_Tensor {
    LIVE_TENSORS.fetch_add(1, Ordering::SeqCst);
    let mut owned = bytes.into_boxed_slice();
    let data = owned.as_mut_ptr() as *mut c_void;
    let len = owned.len();
    Box::into_raw(Box::new(StubTensor {
        dtype,
        dims: dims.to_vec(),
        data,
        len,
        deallocator: None,
        deallocator_arg: std::ptr::null_mut(),
        owned: Some(owned),
    })) as *mut sys::TF_Tensor
}

unsafe fn clone_tensor(tensor: *mut sys::TF_Tensor) -> *mut sys::TF_Tensor {
    let tensor = &*(tensor as *const StubTensor);
    new_owned_tensor(tensor.dtype, &tensor.dims, copy_bytes(tensor.data, tensor.len))
}

// --- Status ---

unsafe extern "C" fn TF_NewStatus() -> *mut sys::TF_Status {
    LIVE_STATUSES.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(StubStatus {
        code: sys::TF_OK,
        message: CString::default(),
    })) as *mut sys::TF_Status
}

unsafe extern "C" fn TF_DeleteStatus(status: *mut sys::TF_Status) {
    if status.is_null() {
        return;
    }
    LIVE_STATUSES.fetch_sub(1, Ordering::SeqCst);
    drop(Box::from_raw(status as *mut StubStatus));
}

unsafe extern "C" fn TF_GetCode(status: *const sys::TF_Status) -> sys::TF_Code {
    (*(status as *const StubStatus)).code
}

unsafe extern "C" fn TF_Message(status: *const sys::TF_Status) -> *const c_char {
    (*(status as *const StubStatus)).message.as_ptr()
}

// --- Session options ---

unsafe extern "C" fn TF_NewSessionOptions() -> *mut sys::TF_SessionOptions {
    LIVE_SESSION_OPTIONS.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(StubSessionOptions::default())) as *mut sys::TF_SessionOptions
}

unsafe extern "C" fn TF_DeleteSessionOptions(options: *mut sys::TF_SessionOptions) {
    if options.is_null() {
        return;
    }
    LIVE_SESSION_OPTIONS.fetch_sub(1, Ordering::SeqCst);
    drop(Box::from_raw(options as *mut StubSessionOptions));
}

unsafe extern "C" fn TF_SetTarget(options: *mut sys::TF_SessionOptions, target: *const c_char) {
    (*(options as *mut StubSessionOptions)).target =
        CStr::from_ptr(target).to_string_lossy().into_owned();
}

unsafe extern "C" fn TF_SetConfig(
    options: *mut sys::TF_SessionOptions,
    proto: *const c_void,
    proto_len: usize,
    _status: *mut sys::TF_Status,
) {
    (*(options as *mut StubSessionOptions)).config = copy_bytes(proto, proto_len);
}

// --- Session lifecycle and execution ---

unsafe extern "C" fn TF_NewSession(
    _options: *const sys::TF_SessionOptions,
    _status: *mut sys::TF_Status,
) -> *mut sys::TF_Session {
    LIVE_SESSIONS.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(StubSession { closed: false })) as *mut sys::TF_Session
}

unsafe extern "C" fn TF_CloseSession(session: *mut sys::TF_Session, _status: *mut sys::TF_Status) {
    (*(session as *mut StubSession)).closed = true;
}

unsafe extern "C" fn TF_DeleteSession(session: *mut sys::TF_Session, _status: *mut sys::TF_Status) {
    LIVE_SESSIONS.fetch_sub(1, Ordering::SeqCst);
    drop(Box::from_raw(session as *mut StubSession));
}

unsafe extern "C" fn TF_ExtendGraph(
    _session: *mut sys::TF_Session,
    proto: *const c_void,
    proto_len: usize,
    _status: *mut sys::TF_Status,
) {
    EXTEND_CALLS.fetch_add(1, Ordering::SeqCst);
    *LAST_EXTEND.lock().unwrap() = Some(copy_bytes(proto, proto_len));
}

unsafe extern "C" fn TF_Run(
    session: *mut sys::TF_Session,
    _run_options: *const sys::TF_Buffer,
    input_names: *const *const c_char,
    inputs: *const *mut sys::TF_Tensor,
    ninputs: c_int,
    output_names: *const *const c_char,
    outputs: *mut *mut sys::TF_Tensor,
    noutputs: c_int,
    target_names: *const *const c_char,
    ntargets: c_int,
    _run_metadata: *mut sys::TF_Buffer,
    status: *mut sys::TF_Status,
) {
    RUN_CALLS.fetch_add(1, Ordering::SeqCst);

    if let Some((code, message)) = FAIL_NEXT_RUN.lock().unwrap().take() {
        set_status(status, code, &message);
        return;
    }
    if (*(session as *const StubSession)).closed {
        set_status(status, sys::TF_FAILED_PRECONDITION, "session is closed");
        return;
    }

    let in_names = read_names(input_names, ninputs);
    let out_names = read_names(output_names, noutputs);
    let tgt_names = read_names(target_names, ntargets);

    for (i, name) in out_names.iter().enumerate() {
        // Echo the matching input when there is one, otherwise hand back
        // a scalar string tensor holding the fetch name.
        let tensor = match in_names.iter().position(|n| n == name) {
            Some(j) => clone_tensor(*inputs.add(j)),
            None => new_owned_tensor(
                sys::TF_STRING,
                &[],
                encode_strings(std::slice::from_ref(name)),
            ),
        };
        *outputs.add(i) = tensor;
    }

    *LAST_RUN.lock().unwrap() = Some(RunCapture {
        input_names: in_names,
        output_names: out_names,
        target_names: tgt_names,
    });
}

// --- Graph ---

unsafe extern "C" fn TF_NewGraph() -> *mut sys::TF_Graph {
    LIVE_GRAPHS.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(StubGraph)) as *mut sys::TF_Graph
}

unsafe extern "C" fn TF_DeleteGraph(graph: *mut sys::TF_Graph) {
    if graph.is_null() {
        return;
    }
    LIVE_GRAPHS.fetch_sub(1, Ordering::SeqCst);
    drop(Box::from_raw(graph as *mut StubGraph));
}

// --- SavedModel loading ---

unsafe extern "C" fn TF_LoadSessionFromSavedModel(
    session_options: *const sys::TF_SessionOptions,
    run_options: *const sys::TF_Buffer,
    export_dir: *const c_char,
    tags: *const *const c_char,
    tags_len: c_int,
    _graph: *mut sys::TF_Graph,
    meta_graph_def: *const sys::TF_Buffer,
    status: *mut sys::TF_Status,
) -> *mut sys::TF_Session {
    let options = &*(session_options as *const StubSessionOptions);
    *LAST_LOAD.lock().unwrap() = Some(LoadCapture {
        export_dir: CStr::from_ptr(export_dir).to_string_lossy().into_owned(),
        tags: read_names(tags, tags_len),
        run_options: read_buffer(run_options),
        meta_graph: read_buffer(meta_graph_def),
        target: options.target.clone(),
        config: options.config.clone(),
    });

    if let Some((code, message)) = FAIL_NEXT_LOAD.lock().unwrap().take() {
        set_status(status, code, &message);
        return std::ptr::null_mut();
    }

    LIVE_SESSIONS.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(StubSession { closed: false })) as *mut sys::TF_Session
}

// --- Byte buffers ---

unsafe extern "C" fn free_buffer_copy(data: *mut c_void, length: usize) {
    if data.is_null() {
        return;
    }
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
        data as *mut u8,
        length,
    )));
}

unsafe extern "C" fn TF_NewBufferFromString(
    proto: *const c_void,
    proto_len: usize,
) -> *mut sys::TF_Buffer {
    LIVE_BUFFERS.fetch_add(1, Ordering::SeqCst);
    let copy = copy_bytes(proto, proto_len).into_boxed_slice();
    let length = copy.len();
    let data = Box::into_raw(copy).cast::<u8>() as *const c_void;
    Box::into_raw(Box::new(sys::TF_Buffer {
        data,
        length,
        data_deallocator: Some(free_buffer_copy),
    }))
}

unsafe extern "C" fn TF_DeleteBuffer(buffer: *mut sys::TF_Buffer) {
    if buffer.is_null() {
        return;
    }
    LIVE_BUFFERS.fetch_sub(1, Ordering::SeqCst);
    let buffer = Box::from_raw(buffer);
    if let Some(deallocator) = buffer.data_deallocator {
        deallocator(buffer.data as *mut c_void, buffer.length);
    }
}

// --- Tensors ---

unsafe extern "C" fn TF_NewTensor(
    dtype: sys::TF_DataType,
    dims: *const i64,
    num_dims: c_int,
    data: *mut c_void,
    len: usize,
    deallocator: sys::TF_TensorDeallocator,
    deallocator_arg: *mut c_void,
) -> *mut sys::TF_Tensor {
    LIVE_TENSORS.fetch_add(1, Ordering::SeqCst);
    let dims = if num_dims <= 0 || dims.is_null() {
        Vec::new()
    } else {
        std::slice::from_raw_parts(dims, num_dims as usize).to_vec()
    };
    Box::into_raw(Box::new(StubTensor {
        dtype,
        dims,
        data,
        len,
        deallocator,
        deallocator_arg,
        owned: None,
    })) as *mut sys::TF_Tensor
}

unsafe extern "C" fn TF_DeleteTensor(tensor: *mut sys::TF_Tensor) {
    if tensor.is_null() {
        return;
    }
    LIVE_TENSORS.fetch_sub(1, Ordering::SeqCst);
    let StubTensor {
        data,
        len,
        deallocator,
        deallocator_arg,
        owned,
        ..
    } = *Box::from_raw(tensor as *mut StubTensor);
    if let Some(deallocator) = deallocator {
        deallocator(data, len, deallocator_arg);
    }
    drop(owned);
}

unsafe extern "C" fn TF_TensorType(tensor: *const sys::TF_Tensor) -> sys::TF_DataType {
    (*(tensor as *const StubTensor)).dtype
}

unsafe extern "C" fn TF_TensorData(tensor: *const sys::TF_Tensor) -> *mut c_void {
    (*(tensor as *const StubTensor)).data
}

unsafe extern "C" fn TF_TensorByteSize(tensor: *const sys::TF_Tensor) -> usize {
    (*(tensor as *const StubTensor)).len
}

unsafe extern "C" fn TF_NumDims(tensor: *const sys::TF_Tensor) -> c_int {
    (*(tensor as *const StubTensor)).dims.len() as c_int
}

unsafe extern "C" fn TF_Dim(tensor: *const sys::TF_Tensor, dim_index: c_int) -> i64 {
    (&(*(tensor as *const StubTensor)).dims)[dim_index as usize]
}
