#![warn(missing_docs)]

//! TensorFlow
//!
//! This crate is a safe wrapper around TensorFlow's
//! [C API](https://github.com/tensorflow/tensorflow/blob/master/tensorflow/c/c_api.h).
//!
//! The unsafe entry points are declared in `tensorflow-sys` and resolved
//! at runtime from the `libtensorflow` shared library; this crate wraps
//! them behind owned handle types that release their native resources on
//! drop.
//!
//! The numerical work all happens inside the runtime. What this crate
//! provides is the interop contract: encoding host values into the
//! runtime's flat tensor buffers (including its variable-length string
//! layout), translating status objects into [`TfError`], keeping session
//! and graph handles alive exactly as long as they are used, and driving
//! the SavedModel loading protocol with its tag and option marshaling.
//!
//! # Example
//!
//! ```no_run
//! use std::collections::HashMap;
//! use tensorflow::{library, load_saved_model, Tensor, TensorValue};
//!
//! # fn main() -> tensorflow::TfResult<()> {
//! library::load()?;
//!
//! let model = load_saved_model("exported/half_plus_two", &["serve"], None, None, None)?;
//!
//! let x = Tensor::from_value(&TensorValue::from(vec![1.0_f32, 2.0, 3.0]))?;
//! let mut inputs = HashMap::new();
//! inputs.insert("x".to_string(), &x);
//!
//! let outputs = model.session.run(&inputs, &["y".to_string()], &[])?;
//! let y = outputs[0].to_value()?;
//! # Ok(())
//! # }
//! ```

use std::convert::TryFrom;
use std::os::raw::c_char;

use tensorflow_sys as sys;

pub mod error;
pub use error::{TfError, TfResult};

pub mod library;
pub(crate) use library::tf_api;

mod status;

mod buffer;

pub mod graph;
pub use graph::Graph;

pub mod session;
pub use session::{Session, SessionOptions};

pub mod tensor;
pub use tensor::{Tensor, TensorValue};

pub mod saved_model;
pub use saved_model::{load_saved_model, SavedModel};

#[cfg(test)]
pub(crate) mod stub;

// Re-export ndarray as it's part of the public API anyway
pub use ndarray;

/// Element types a tensor can carry, as understood by this binding.
///
/// The runtime's type enumeration is wider; anything outside this set is
/// reported as [`TfError::UnsupportedType`] when it shows up in a
/// decoded tensor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataType {
    /// 32-bit floating point, equivalent to Rust's `f32`
    Float,
    /// 64-bit floating point, equivalent to Rust's `f64`
    Double,
    /// Signed 32-bit int, equivalent to Rust's `i32`
    Int32,
    /// Signed 64-bit int, equivalent to Rust's `i64`
    Int64,
    /// Boolean, equivalent to Rust's `bool`
    Bool,
    /// UTF-8 string, stored in the runtime's variable-length layout
    String,
}

impl From<DataType> for sys::TF_DataType {
    fn from(val: DataType) -> Self {
        match val {
            DataType::Float => sys::TF_FLOAT,
            DataType::Double => sys::TF_DOUBLE,
            DataType::Int32 => sys::TF_INT32,
            DataType::Int64 => sys::TF_INT64,
            DataType::Bool => sys::TF_BOOL,
            DataType::String => sys::TF_STRING,
        }
    }
}

impl TryFrom<sys::TF_DataType> for DataType {
    type Error = TfError;

    fn try_from(val: sys::TF_DataType) -> TfResult<DataType> {
        match val {
            sys::TF_FLOAT => Ok(DataType::Float),
            sys::TF_DOUBLE => Ok(DataType::Double),
            sys::TF_INT32 => Ok(DataType::Int32),
            sys::TF_INT64 => Ok(DataType::Int64),
            sys::TF_BOOL => Ok(DataType::Bool),
            sys::TF_STRING => Ok(DataType::String),
            other => Err(TfError::UnsupportedType(data_type_name(other))),
        }
    }
}

/// Name of a native type tag, for error messages.
fn data_type_name(dtype: sys::TF_DataType) -> String {
    let name = match dtype {
        sys::TF_FLOAT => "TF_FLOAT",
        sys::TF_DOUBLE => "TF_DOUBLE",
        sys::TF_INT32 => "TF_INT32",
        sys::TF_UINT8 => "TF_UINT8",
        sys::TF_INT16 => "TF_INT16",
        sys::TF_INT8 => "TF_INT8",
        sys::TF_STRING => "TF_STRING",
        sys::TF_COMPLEX64 => "TF_COMPLEX64",
        sys::TF_INT64 => "TF_INT64",
        sys::TF_BOOL => "TF_BOOL",
        sys::TF_QINT8 => "TF_QINT8",
        sys::TF_QUINT8 => "TF_QUINT8",
        sys::TF_QINT32 => "TF_QINT32",
        sys::TF_BFLOAT16 => "TF_BFLOAT16",
        sys::TF_QINT16 => "TF_QINT16",
        sys::TF_QUINT16 => "TF_QUINT16",
        sys::TF_UINT16 => "TF_UINT16",
        sys::TF_COMPLEX128 => "TF_COMPLEX128",
        sys::TF_HALF => "TF_HALF",
        sys::TF_RESOURCE => "TF_RESOURCE",
        sys::TF_VARIANT => "TF_VARIANT",
        sys::TF_UINT32 => "TF_UINT32",
        sys::TF_UINT64 => "TF_UINT64",
        other => return format!("TF_DataType({other})"),
    };
    name.to_owned()
}

fn char_ptr_to_string(raw: *const c_char) -> TfResult<String> {
    let c_str = unsafe { std::ffi::CStr::from_ptr(raw) };
    Ok(c_str.to_str().map_err(TfError::StringConversion)?.to_owned())
}
