//! Module containing the graph handle type.

use tensorflow_sys as sys;
use tracing::{error, trace};

use crate::{
    error::{assert_not_null_pointer, TfResult},
    tf_api,
};

/// Wraps a native graph handle.
///
/// A `Graph` starts empty and is populated by the runtime as a side
/// effect of SavedModel loading. Graph *construction* is out of scope
/// for this binding: serialized graph definitions arrive as opaque blobs
/// (see [`Session::extend_graph`](crate::Session::extend_graph)). One
/// graph is paired with one session for its lifetime.
#[derive(Debug)]
pub struct Graph {
    pub(crate) ptr: *mut sys::TF_Graph,
}

// Once loaded the graph is only read by the runtime.
unsafe impl Send for Graph {}
unsafe impl Sync for Graph {}

impl Graph {
    /// Allocate a fresh, empty native graph.
    pub(crate) fn new() -> TfResult<Graph> {
        let ptr = unsafe { (tf_api().TF_NewGraph)() };
        assert_not_null_pointer(ptr, "Graph")?;
        trace!("Created Graph: {ptr:?}.");
        Ok(Graph { ptr })
    }
}

impl Drop for Graph {
    #[tracing::instrument]
    fn drop(&mut self) {
        if self.ptr.is_null() {
            error!("Graph pointer is null, not dropping");
        } else {
            trace!("Dropping Graph: {:?}.", self.ptr);
            unsafe { (tf_api().TF_DeleteGraph)(self.ptr) };
        }

        self.ptr = std::ptr::null_mut();
    }
}
