//! The job: an execution context binding a graph to I/O endpoints and codecs,
//! with recording and pass-limit configuration.
//!
//! The job owns its codec bindings and their I/O objects; dropping the job
//! releases everything registered to it.

use crate::codecs::{self, CodecInstance, SIGNATURE_LENGTH};
use crate::errors::{ErrorKind, Result};
use crate::flow::{self, graph::Graph};
use crate::io::IoProxy;
use crate::{here, nerror};
use log::debug;
use rasterflow_types::{GraphRecording, IoDirection};

pub const DEFAULT_MAX_PASSES: i32 = 6;

pub struct Job {
    pub debug_job_id: i32,
    /// Bumped by the graph-changed hook while version recording is active.
    pub next_graph_version: i32,
    /// Upper bound on outer dims/flatten/optimize/execute passes.
    pub max_calc_flatten_execute_passes: i32,
    pub record_graph_versions: bool,
    pub record_frame_images: bool,
    pub render_last_graph: bool,
    pub render_graph_versions: bool,
    pub render_animated_graph: bool,
    codecs: Vec<CodecInstance>,
}

impl Job {
    pub(crate) fn new(debug_job_id: i32) -> Job {
        Job {
            debug_job_id,
            next_graph_version: 0,
            max_calc_flatten_execute_passes: DEFAULT_MAX_PASSES,
            record_graph_versions: false,
            record_frame_images: false,
            render_last_graph: false,
            render_graph_versions: false,
            render_animated_graph: false,
            codecs: Vec::new(),
        }
    }

    /// Applies recording flags, enforcing the implications
    /// `render_graph_versions => record_graph_versions` and
    /// `render_animated_graph => render_graph_versions`.
    pub fn configure_recording(&mut self, recording: GraphRecording) {
        self.record_frame_images = recording.record_frame_images;
        self.record_graph_versions = recording.record_graph_versions;
        self.render_last_graph = recording.render_last_graph;
        self.render_graph_versions =
            recording.render_graph_versions && recording.record_graph_versions;
        self.render_animated_graph =
            recording.render_animated_graph && self.render_graph_versions;
    }

    /// Registers an I/O endpoint under `placeholder_id`. Inputs are sniffed:
    /// the first 8 bytes select the codec, the stream is rewound, and the
    /// frame header is cached. Output codecs are not determined this early —
    /// an encoder node claims the binding during execution.
    pub fn add_io(&mut self, io: IoProxy, placeholder_id: i32, direction: IoDirection) -> Result<()> {
        let mut instance = CodecInstance {
            placeholder_id,
            direction,
            io,
            codec_id: None,
            frame_info: None,
        };
        if direction == IoDirection::In {
            let mut signature = [0u8; SIGNATURE_LENGTH];
            instance.io.read_exact(&mut signature).map_err(|e| {
                nerror!(
                    ErrorKind::IoError,
                    "Failed to read the first 8 bytes of input {}: {}",
                    placeholder_id,
                    e.message
                )
            })?;
            instance.io.seek(0).map_err(|e| {
                nerror!(
                    ErrorKind::IoError,
                    "Failed to seek to byte 0 in input {}: {}",
                    placeholder_id,
                    e.message
                )
            })?;
            let kind = codecs::codec_select(&signature).ok_or_else(|| {
                // Or bad buffer, unsupported file type, etc.
                nerror!(
                    ErrorKind::NotImplemented,
                    "Unrecognized leading byte sequence {:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
                    signature[0],
                    signature[1],
                    signature[2],
                    signature[3],
                    signature[4],
                    signature[5],
                    signature[6],
                    signature[7]
                )
            })?;
            instance.codec_id = Some(kind);
            codecs::initialize_codec(&mut instance).map_err(|e| e.at(here!()))?;
            debug!(
                "job {}: input {} sniffed as {:?}",
                self.debug_job_id, placeholder_id, kind
            );
        }
        self.codecs.push(instance);
        Ok(())
    }

    /// First binding registered under `placeholder_id`, if any. Bindings are
    /// few enough that a linear scan is the right data structure.
    pub fn get_codec_instance(&self, placeholder_id: i32) -> Option<&CodecInstance> {
        self.codecs
            .iter()
            .find(|c| c.placeholder_id == placeholder_id)
    }

    pub(crate) fn codec_instance_index(&self, placeholder_id: i32) -> Option<usize> {
        self.codecs
            .iter()
            .position(|c| c.placeholder_id == placeholder_id)
    }

    pub fn codec_instance_by_index(&self, index: usize) -> Option<&CodecInstance> {
        self.codecs.get(index)
    }

    pub(crate) fn codec_instance_by_index_mut(&mut self, index: usize) -> Option<&mut CodecInstance> {
        self.codecs.get_mut(index)
    }

    pub fn get_io(&self, placeholder_id: i32) -> Result<&IoProxy> {
        self.get_codec_instance(placeholder_id)
            .map(|c| &c.io)
            .ok_or_else(|| {
                nerror!(
                    ErrorKind::InvalidArgument,
                    "No I/O registered for placeholder id {}",
                    placeholder_id
                )
            })
    }

    pub fn get_io_mut(&mut self, placeholder_id: i32) -> Result<&mut IoProxy> {
        self.codecs
            .iter_mut()
            .find(|c| c.placeholder_id == placeholder_id)
            .map(|c| &mut c.io)
            .ok_or_else(|| {
                nerror!(
                    ErrorKind::InvalidArgument,
                    "No I/O registered for placeholder id {}",
                    placeholder_id
                )
            })
    }

    /// The bytes an in-memory output sink accumulated during execution.
    pub fn get_output_buffer(&self, placeholder_id: i32) -> Result<&[u8]> {
        self.get_io(placeholder_id)
            .map_err(|e| e.at(here!()))?
            .get_output_buffer()
            .map_err(|e| e.at(here!()))
    }

    /// Drives the fixed-point pass loop over the graph.
    pub fn execute(&mut self, g: &mut Graph) -> Result<()> {
        flow::job_execute(self, g).map_err(|e| e.at(here!()))
    }
}
