//! Tensor values and the codec between host values and the runtime's
//! flat tensor buffers.
//!
//! Numeric and boolean tensors are plain host-endian element arrays.
//! String tensors use the runtime's variable-length layout: an offset
//! table of one 8-byte little-endian entry per string (offsets relative
//! to the data region that follows the table), then one entry per string
//! made of a protobuf-style varint byte-length prefix followed by the
//! raw UTF-8 bytes. That layout is a compatibility contract with the
//! runtime and is reproduced bit for bit here.

use std::convert::TryFrom;
use std::os::raw::{c_int, c_void};

use ndarray::{ArrayD, IxDyn};
use prost::encoding::{decode_varint, encode_varint};
use tensorflow_sys as sys;
use tracing::{error, trace};

use crate::{
    error::{TfError, TfResult},
    tf_api, DataType,
};

/// Host-side values the tensor codec understands.
///
/// The set is closed: every variant can be encoded, and decoding only
/// ever produces these variants, so the encoder has no rejection path —
/// a value that cannot be represented does not typecheck.
#[derive(Clone, Debug, PartialEq)]
pub enum TensorValue {
    /// A single UTF-8 string, encoded as a rank-0 one-element tensor.
    Str(String),
    /// A shaped array of UTF-8 strings.
    StrArray(ArrayD<String>),
    /// A shaped array of `f32` elements.
    Float(ArrayD<f32>),
    /// A shaped array of `f64` elements.
    Double(ArrayD<f64>),
    /// A shaped array of `i32` elements.
    Int32(ArrayD<i32>),
    /// A shaped array of `i64` elements.
    Int64(ArrayD<i64>),
    /// A shaped array of `bool` elements, one byte per element.
    Bool(ArrayD<bool>),
}

impl TensorValue {
    /// Element type tag of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            TensorValue::Str(_) | TensorValue::StrArray(_) => DataType::String,
            TensorValue::Float(_) => DataType::Float,
            TensorValue::Double(_) => DataType::Double,
            TensorValue::Int32(_) => DataType::Int32,
            TensorValue::Int64(_) => DataType::Int64,
            TensorValue::Bool(_) => DataType::Bool,
        }
    }

    fn dims(&self) -> Vec<i64> {
        fn shape_dims<T>(values: &ArrayD<T>) -> Vec<i64> {
            values.shape().iter().map(|d| *d as i64).collect()
        }

        match self {
            TensorValue::Str(_) => Vec::new(),
            TensorValue::StrArray(values) => shape_dims(values),
            TensorValue::Float(values) => shape_dims(values),
            TensorValue::Double(values) => shape_dims(values),
            TensorValue::Int32(values) => shape_dims(values),
            TensorValue::Int64(values) => shape_dims(values),
            TensorValue::Bool(values) => shape_dims(values),
        }
    }
}

impl From<&str> for TensorValue {
    fn from(value: &str) -> TensorValue {
        TensorValue::Str(value.to_owned())
    }
}

impl From<String> for TensorValue {
    fn from(value: String) -> TensorValue {
        TensorValue::Str(value)
    }
}

macro_rules! impl_from_values {
    ($type_:ty, $variant:ident) => {
        impl From<ArrayD<$type_>> for TensorValue {
            fn from(values: ArrayD<$type_>) -> TensorValue {
                TensorValue::$variant(values)
            }
        }

        impl From<Vec<$type_>> for TensorValue {
            fn from(values: Vec<$type_>) -> TensorValue {
                let len = values.len();
                TensorValue::$variant(
                    ArrayD::from_shape_vec(IxDyn(&[len]), values).expect("1-D shape"),
                )
            }
        }
    };
}

impl_from_values!(String, StrArray);
impl_from_values!(f32, Float);
impl_from_values!(f64, Double);
impl_from_values!(i32, Int32);
impl_from_values!(i64, Int64);
impl_from_values!(bool, Bool);

/// A typed, shaped tensor owned by this binding.
///
/// Exactly one `Tensor` wraps each native handle. Dropping the wrapper
/// releases the handle, which in turn releases the backing buffer —
/// exactly once, never leaked.
#[derive(Debug)]
pub struct Tensor {
    pub(crate) ptr: *mut sys::TF_Tensor,
}

unsafe impl Send for Tensor {}
unsafe impl Sync for Tensor {}

/// Deallocator registered with every buffer this crate hands to the
/// runtime; invoked from `TF_DeleteTensor`.
unsafe extern "C" fn free_encoded_buffer(data: *mut c_void, len: usize, _arg: *mut c_void) {
    if data.is_null() {
        return;
    }
    drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
        data as *mut u8,
        len,
    )));
}

impl Tensor {
    pub(crate) fn from_ptr(ptr: *mut sys::TF_Tensor) -> Tensor {
        trace!("Created Tensor: {ptr:?}.");
        Tensor { ptr }
    }

    /// Encode a host value into a new native tensor.
    ///
    /// The byte buffer is allocated here and ownership passes to the
    /// runtime together with a deallocator callback.
    pub fn from_value(value: &TensorValue) -> TfResult<Tensor> {
        let dims = value.dims();
        let buffer = match value {
            TensorValue::Str(s) => encode_strings(std::slice::from_ref(s)),
            TensorValue::StrArray(values) => {
                let flat: Vec<&str> = values.iter().map(|s| s.as_str()).collect();
                encode_strings(&flat)
            }
            TensorValue::Float(values) => encode_elements(values, f32::to_ne_bytes),
            TensorValue::Double(values) => encode_elements(values, f64::to_ne_bytes),
            TensorValue::Int32(values) => encode_elements(values, i32::to_ne_bytes),
            TensorValue::Int64(values) => encode_elements(values, i64::to_ne_bytes),
            TensorValue::Bool(values) => values.iter().map(|b| u8::from(*b)).collect(),
        };
        Tensor::from_parts(value.data_type(), &dims, buffer)
    }

    fn from_parts(data_type: DataType, dims: &[i64], buffer: Vec<u8>) -> TfResult<Tensor> {
        let data = buffer.into_boxed_slice();
        let len = data.len();
        let raw = Box::into_raw(data).cast::<u8>();

        let ptr = unsafe {
            (tf_api().TF_NewTensor)(
                data_type.into(),
                dims.as_ptr(),
                dims.len() as c_int,
                raw as *mut c_void,
                len,
                Some(free_encoded_buffer),
                std::ptr::null_mut(),
            )
        };
        if ptr.is_null() {
            // The runtime rejected the tensor and will not invoke the
            // deallocator; reclaim the buffer before reporting.
            unsafe { free_encoded_buffer(raw as *mut c_void, len, std::ptr::null_mut()) };
            return Err(TfError::PointerShouldNotBeNull("Tensor".to_owned()));
        }
        trace!("Created Tensor: {ptr:?}.");
        Ok(Tensor { ptr })
    }

    /// Element type of this tensor.
    pub fn data_type(&self) -> TfResult<DataType> {
        DataType::try_from(unsafe { (tf_api().TF_TensorType)(self.ptr) })
    }

    /// Dimension sizes; an empty vector is a scalar.
    pub fn shape(&self) -> TfResult<Vec<i64>> {
        let num_dims = unsafe { (tf_api().TF_NumDims)(self.ptr) };
        if num_dims < 0 {
            return Err(TfError::MalformedTensor(format!(
                "negative rank {num_dims}"
            )));
        }
        (0..num_dims)
            .map(|i| {
                let dim = unsafe { (tf_api().TF_Dim)(self.ptr, i) };
                if dim < 0 {
                    Err(TfError::MalformedTensor(format!(
                        "negative dimension {dim} at index {i}"
                    )))
                } else {
                    Ok(dim)
                }
            })
            .collect()
    }

    fn data(&self) -> &[u8] {
        let len = unsafe { (tf_api().TF_TensorByteSize)(self.ptr) };
        let data = unsafe { (tf_api().TF_TensorData)(self.ptr) };
        if data.is_null() || len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(data as *const u8, len) }
        }
    }

    /// Decode this tensor back into a host value.
    ///
    /// Inverse of [`Tensor::from_value`] for the supported element
    /// types. A buffer inconsistent with the declared type and shape is
    /// a [`TfError::MalformedTensor`], never undefined behavior.
    pub fn to_value(&self) -> TfResult<TensorValue> {
        let data_type = self.data_type()?;
        let dims = self.shape()?;
        let data = self.data();

        match data_type {
            DataType::String => {
                let count = element_count(&dims)?;
                let mut strings = decode_strings(data, count)?;
                if dims.is_empty() {
                    strings
                        .pop()
                        .map(TensorValue::Str)
                        .ok_or_else(|| TfError::MalformedTensor("empty scalar".to_owned()))
                } else {
                    Ok(TensorValue::StrArray(build_array(&dims, strings)?))
                }
            }
            DataType::Float => Ok(TensorValue::Float(decode_elements(
                data,
                &dims,
                f32::from_ne_bytes,
            )?)),
            DataType::Double => Ok(TensorValue::Double(decode_elements(
                data,
                &dims,
                f64::from_ne_bytes,
            )?)),
            DataType::Int32 => Ok(TensorValue::Int32(decode_elements(
                data,
                &dims,
                i32::from_ne_bytes,
            )?)),
            DataType::Int64 => Ok(TensorValue::Int64(decode_elements(
                data,
                &dims,
                i64::from_ne_bytes,
            )?)),
            DataType::Bool => {
                let count = element_count(&dims)?;
                if data.len() != count {
                    return Err(TfError::MalformedTensor(format!(
                        "buffer is {} bytes, expected {count} for bool elements",
                        data.len()
                    )));
                }
                let values = data.iter().map(|b| *b != 0).collect();
                Ok(TensorValue::Bool(build_array(&dims, values)?))
            }
        }
    }
}

impl Drop for Tensor {
    #[tracing::instrument]
    fn drop(&mut self) {
        if self.ptr.is_null() {
            error!("Tensor pointer is null, not dropping");
        } else {
            trace!("Dropping Tensor: {:?}.", self.ptr);
            unsafe { (tf_api().TF_DeleteTensor)(self.ptr) };
        }

        self.ptr = std::ptr::null_mut();
    }
}

/// Encode strings into the runtime's variable-length layout.
pub(crate) fn encode_strings<S: AsRef<str>>(strings: &[S]) -> Vec<u8> {
    let mut table = Vec::with_capacity(8 * strings.len());
    let mut data = Vec::new();
    for s in strings {
        let bytes = s.as_ref().as_bytes();
        table.extend_from_slice(&(data.len() as u64).to_le_bytes());
        encode_varint(bytes.len() as u64, &mut data);
        data.extend_from_slice(bytes);
    }
    table.extend_from_slice(&data);
    table
}

/// Parse the variable-length string layout back into owned strings.
pub(crate) fn decode_strings(data: &[u8], count: usize) -> TfResult<Vec<String>> {
    let table_len = count
        .checked_mul(8)
        .ok_or_else(|| TfError::MalformedTensor("offset table size overflows".to_owned()))?;
    if data.len() < table_len {
        return Err(TfError::MalformedTensor(format!(
            "buffer is {} bytes, expected at least {table_len} for the offset table of {count} strings",
            data.len()
        )));
    }
    let payload = &data[table_len..];

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let mut offset_bytes = [0u8; 8];
        offset_bytes.copy_from_slice(&data[i * 8..(i + 1) * 8]);
        let offset = usize::try_from(u64::from_le_bytes(offset_bytes))
            .map_err(|_| TfError::MalformedTensor(format!("offset of string {i} overflows")))?;
        if offset > payload.len() {
            return Err(TfError::MalformedTensor(format!(
                "offset {offset} of string {i} is out of range"
            )));
        }

        let mut entry = &payload[offset..];
        let len = decode_varint(&mut entry).map_err(|e| {
            TfError::MalformedTensor(format!("length varint of string {i}: {e}"))
        })?;
        let len = usize::try_from(len)
            .map_err(|_| TfError::MalformedTensor(format!("length of string {i} overflows")))?;
        if len > entry.len() {
            return Err(TfError::MalformedTensor(format!(
                "string {i} of {len} bytes overruns the buffer"
            )));
        }

        let s = std::str::from_utf8(&entry[..len])
            .map_err(|e| TfError::MalformedTensor(format!("string {i} is not UTF-8: {e}")))?;
        out.push(s.to_owned());
    }
    Ok(out)
}

fn encode_elements<T: Copy, const N: usize>(
    values: &ArrayD<T>,
    to_bytes: fn(T) -> [u8; N],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * N);
    for v in values.iter() {
        out.extend_from_slice(&to_bytes(*v));
    }
    out
}

fn decode_elements<T, const N: usize>(
    data: &[u8],
    dims: &[i64],
    from_bytes: fn([u8; N]) -> T,
) -> TfResult<ArrayD<T>> {
    let count = element_count(dims)?;
    let expected = count
        .checked_mul(N)
        .ok_or_else(|| TfError::MalformedTensor("buffer size overflows".to_owned()))?;
    if data.len() != expected {
        return Err(TfError::MalformedTensor(format!(
            "buffer is {} bytes, expected {expected} for {count} elements of {N} bytes",
            data.len()
        )));
    }

    let values = data
        .chunks_exact(N)
        .map(|chunk| {
            let mut bytes = [0u8; N];
            bytes.copy_from_slice(chunk);
            from_bytes(bytes)
        })
        .collect();
    build_array(dims, values)
}

fn element_count(dims: &[i64]) -> TfResult<usize> {
    dims.iter().try_fold(1usize, |acc, dim| {
        usize::try_from(*dim)
            .ok()
            .and_then(|dim| acc.checked_mul(dim))
            .ok_or_else(|| TfError::MalformedTensor(format!("invalid dimensions {dims:?}")))
    })
}

fn build_array<T>(dims: &[i64], values: Vec<T>) -> TfResult<ArrayD<T>> {
    let shape: Vec<usize> = dims.iter().map(|d| *d as usize).collect();
    ArrayD::from_shape_vec(IxDyn(&shape), values)
        .map_err(|e| TfError::MalformedTensor(e.to_string()))
}
