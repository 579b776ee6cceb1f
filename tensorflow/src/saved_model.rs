//! Loading sessions and graphs from SavedModel directories.

use std::ffi::CString;
use std::os::raw::{c_char, c_int};

use tracing::debug;

use crate::{
    buffer::Buffer,
    error::{assert_not_null_pointer, TfResult},
    graph::Graph,
    session::{Session, SessionOptions},
    status::Status,
    tf_api,
};

/// The contents of a loaded SavedModel: one session paired with the
/// graph it was initialized from.
///
/// A `SavedModel` is not separately disposable; disposing of it means
/// disposing of its [`Session`].
#[derive(Debug)]
pub struct SavedModel {
    /// Session initialized with the loaded graph and with variables
    /// restored from the checkpoints on disk.
    pub session: Session,
    /// The graph identified by the requested tag set.
    pub graph: Graph,
}

/// Load a session and graph from a model previously exported to
/// `export_dir`, selecting the graph identified by `tags`.
///
/// `run_options` and `meta_graph` are optional serialized protos; when
/// absent, null buffers are passed and the runtime falls back to its
/// defaults. An empty tag set is passed through unchanged — the runtime
/// decides whether that is valid. The directory path is opaque to this
/// layer; the runtime reports the error if it does not exist or holds no
/// graph matching the tags.
///
/// Every native-heap allocation made for the call (session options, the
/// optional buffers, the tag strings) is released before this function
/// returns, on the success and failure paths alike.
#[tracing::instrument(skip(options, run_options, meta_graph))]
pub fn load_saved_model(
    export_dir: &str,
    tags: &[&str],
    options: Option<&SessionOptions>,
    run_options: Option<&[u8]>,
    meta_graph: Option<&[u8]>,
) -> TfResult<SavedModel> {
    let default_options;
    let options = match options {
        Some(options) => options,
        None => {
            default_options = SessionOptions::new();
            &default_options
        }
    };

    // Everything below is scoped: dropped in reverse order at the end of
    // the call or at any early return.
    let native_options = options.to_native()?;
    let run_options_buf = run_options.map(Buffer::from_bytes).transpose()?;
    let meta_graph_buf = meta_graph.map(Buffer::from_bytes).transpose()?;
    let graph = Graph::new()?;

    let c_export_dir = CString::new(export_dir)?;
    let c_tags = tags
        .iter()
        .map(|tag| CString::new(*tag))
        .collect::<Result<Vec<_>, _>>()?;
    let tag_ptrs: Vec<*const c_char> = c_tags.iter().map(|tag| tag.as_ptr()).collect();

    let status = Status::new();
    let session_ptr = unsafe {
        (tf_api().TF_LoadSessionFromSavedModel)(
            native_options.ptr,
            run_options_buf
                .as_ref()
                .map_or(std::ptr::null(), Buffer::as_ptr),
            c_export_dir.as_ptr(),
            tag_ptrs.as_ptr(),
            tag_ptrs.len() as c_int,
            graph.ptr,
            meta_graph_buf
                .as_ref()
                .map_or(std::ptr::null(), Buffer::as_ptr),
            status.ptr,
        )
    };
    status.to_result()?;
    assert_not_null_pointer(session_ptr, "Session")?;

    debug!("Loaded SavedModel from {export_dir:?}.");
    Ok(SavedModel {
        session: Session::from_ptr(session_ptr),
        graph,
    })
}
