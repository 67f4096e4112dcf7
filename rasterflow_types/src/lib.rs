//! Shared vocabulary for the rasterflow engine.
//!
//! Everything here is serde-visible so hosts can describe jobs (and their
//! debug-recording configuration) as JSON without depending on the core
//! crate's internals.

use serde_derive::{Deserialize, Serialize};

/// Pixel layout of a frame as stored or reported by a codec.
///
/// The engine itself composites in `Rgba32`; `Rgb24` appears as the native
/// format of codecs without an alpha channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba32,
    Rgb24,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba32 => 4,
            PixelFormat::Rgb24 => 3,
        }
    }
}

/// Input or output?
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoDirection {
    In = 4,
    Out = 8,
}

/// What is possible with an I/O object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IoMode {
    None = 0,
    ReadSequential = 1,
    WriteSequential = 2,
    ReadSeekable = 5,
    WriteSeekable = 6,
    ReadWriteSeekable = 15,
}

impl IoMode {
    pub fn can_read(self) -> bool {
        (self as u8) & 1 > 0
    }
    pub fn can_write(self) -> bool {
        (self as u8) & 2 > 0
    }
    pub fn can_seek(self) -> bool {
        (self as u8) & 4 > 0
    }
}

/// Debug-recording configuration for a job.
///
/// Rendering flags imply the corresponding recording flags; the engine
/// enforces `render_graph_versions => record_graph_versions` and
/// `render_animated_graph => render_graph_versions` when these are applied.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRecording {
    pub record_graph_versions: bool,
    pub record_frame_images: bool,
    pub render_last_graph: bool,
    pub render_graph_versions: bool,
    pub render_animated_graph: bool,
}

impl GraphRecording {
    pub fn off() -> GraphRecording {
        GraphRecording::default()
    }

    pub fn debug_defaults() -> GraphRecording {
        GraphRecording {
            record_graph_versions: true,
            record_frame_images: false,
            render_last_graph: true,
            render_graph_versions: true,
            render_animated_graph: false,
        }
    }
}
