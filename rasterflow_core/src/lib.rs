//! # rasterflow_core
//!
//! The job execution engine of an image-processing pipeline. A host builds a
//! DAG of image-operation nodes, registers I/O endpoints against the
//! placeholder ids the graph references, and calls [`Job::execute`]. The
//! engine then drives the graph to completion through a fixed-point sequence
//! of rewrites — dimension propagation, flatten, optimize — interleaved with
//! partial execution, until every live node has produced its result or the
//! pass limit is hit.
//!
//! Jobs are single-threaded: a job, its graph, and its I/O objects must be
//! touched by one thread at a time. Distinct jobs may run on distinct
//! threads.

pub mod codecs;
pub mod context;
pub mod errors;
pub mod flow;
pub mod io;
pub mod job;

pub use crate::codecs::{codec_select, CodecInstance, CodecKind};
pub use crate::context::Context;
pub use crate::errors::{CodeLocation, ErrorKind, FlowError, Result};
pub use crate::flow::definitions::{
    Bitmap, EdgeKind, FrameEstimate, FrameInfo, Node, NodeKind, NodeParams, NodeState,
};
pub use crate::flow::graph::{Graph, VisitorAction};
pub use crate::io::IoProxy;
pub use crate::job::Job;
pub use rasterflow_types::{GraphRecording, IoDirection, IoMode, PixelFormat};
