//! Core graph vocabulary: node parameters, the per-node state lattice, edge
//! kinds, and frame/bitmap types.

use crate::codecs::CodecKind;
use crate::errors::{ErrorKind, Result};
use crate::nerror;
use bitflags::bitflags;
use rasterflow_types::PixelFormat;
use std::fmt;

bitflags! {
    /// Monotone per-node progress flags. Bits are only ever set, never
    /// cleared, for a given node; `update_state` recomputes the derivable
    /// ones and the stage passes set the rest.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct NodeState: u32 {
        const INPUT_DIMENSIONS_KNOWN = 1;
        const PRE_OPTIMIZE_FLATTENED = 2;
        const OPTIMIZED = 4;
        const POST_OPTIMIZE_FLATTENED = 8;
        const INPUTS_EXECUTED = 16;
        const EXECUTED = 32;
        const OUTBOUND_DIMENSIONS_KNOWN = 64;
    }
}

impl NodeState {
    fn ready(self, prerequisites: NodeState, own: NodeState) -> bool {
        self.contains(prerequisites) && !self.intersects(own)
    }

    pub fn ready_for_pre_optimize_flatten(self) -> bool {
        self.ready(
            NodeState::INPUT_DIMENSIONS_KNOWN,
            NodeState::PRE_OPTIMIZE_FLATTENED,
        )
    }

    pub fn ready_for_optimize(self) -> bool {
        self.ready(
            NodeState::INPUT_DIMENSIONS_KNOWN | NodeState::PRE_OPTIMIZE_FLATTENED,
            NodeState::OPTIMIZED,
        )
    }

    pub fn ready_for_post_optimize_flatten(self) -> bool {
        self.ready(
            NodeState::INPUT_DIMENSIONS_KNOWN
                | NodeState::PRE_OPTIMIZE_FLATTENED
                | NodeState::OPTIMIZED,
            NodeState::POST_OPTIMIZE_FLATTENED,
        )
    }

    pub fn ready_for_execution(self) -> bool {
        self.ready(
            NodeState::INPUT_DIMENSIONS_KNOWN
                | NodeState::OUTBOUND_DIMENSIONS_KNOWN
                | NodeState::PRE_OPTIMIZE_FLATTENED
                | NodeState::OPTIMIZED
                | NodeState::POST_OPTIMIZE_FLATTENED
                | NodeState::INPUTS_EXECUTED,
            NodeState::EXECUTED,
        )
    }
}

/// Edge roles. `None` is the tombstone left behind by graph rewrites; every
/// walker and query skips it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    None,
    Input,
    Canvas,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub w: i32,
    pub h: i32,
    pub fmt: PixelFormat,
}

/// What we know about a node's output frame. `None` means dimensions are
/// still unknown and downstream nodes cannot advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEstimate {
    None,
    Some(FrameInfo),
}

impl FrameEstimate {
    pub fn is_known(&self) -> bool {
        matches!(self, FrameEstimate::Some(_))
    }
}

/// Operation kind, without parameters. Stable vocabulary for validation and
/// rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Null,
    Decode,
    Encode,
    CreateCanvas,
    Scale,
    FlipVertical,
    FlipHorizontal,
    Transpose,
    Rotate90,
    Rotate180,
    Rotate270,
    CopyRectToCanvas,
    Placeholder,
}

/// Typed per-node parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeParams {
    /// Tombstone for a node removed by a rewrite.
    Null,
    Decode {
        placeholder_id: i32,
        /// Index into the job's codec bindings, resolved by the linker.
        codec_link: Option<usize>,
    },
    Encode {
        placeholder_id: i32,
        format: CodecKind,
        codec_link: Option<usize>,
    },
    CreateCanvas {
        w: i32,
        h: i32,
        color: [u8; 4],
    },
    Scale {
        w: i32,
        h: i32,
    },
    FlipVertical,
    FlipHorizontal,
    Transpose,
    Rotate90,
    Rotate180,
    Rotate270,
    CopyRectToCanvas {
        from_x: i32,
        from_y: i32,
        w: i32,
        h: i32,
        x: i32,
        y: i32,
    },
    /// A graph-template slot with no operation bound yet; its dimensions can
    /// never be resolved, so it stalls (and eventually fails) execution.
    Placeholder {
        placeholder_id: i32,
    },
}

impl NodeParams {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeParams::Null => NodeKind::Null,
            NodeParams::Decode { .. } => NodeKind::Decode,
            NodeParams::Encode { .. } => NodeKind::Encode,
            NodeParams::CreateCanvas { .. } => NodeKind::CreateCanvas,
            NodeParams::Scale { .. } => NodeKind::Scale,
            NodeParams::FlipVertical => NodeKind::FlipVertical,
            NodeParams::FlipHorizontal => NodeKind::FlipHorizontal,
            NodeParams::Transpose => NodeKind::Transpose,
            NodeParams::Rotate90 => NodeKind::Rotate90,
            NodeParams::Rotate180 => NodeKind::Rotate180,
            NodeParams::Rotate270 => NodeKind::Rotate270,
            NodeParams::CopyRectToCanvas { .. } => NodeKind::CopyRectToCanvas,
            NodeParams::Placeholder { .. } => NodeKind::Placeholder,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub params: NodeParams,
    pub state: NodeState,
    pub frame_est: FrameEstimate,
    pub result: Option<Bitmap>,
    /// Cumulative wall-clock nanoseconds attributed to this node.
    pub ticks_elapsed: u64,
}

impl Node {
    pub fn new(params: NodeParams) -> Node {
        Node {
            params,
            state: NodeState::empty(),
            frame_est: FrameEstimate::None,
            result: None,
            ticks_elapsed: 0,
        }
    }

    pub fn kind(&self) -> NodeKind {
        self.params.kind()
    }

    pub fn is_null(&self) -> bool {
        self.kind() == NodeKind::Null
    }

    pub fn result_width(&self) -> i32 {
        match self.frame_est {
            FrameEstimate::Some(info) => info.w,
            FrameEstimate::None => 0,
        }
    }

    pub fn result_height(&self) -> i32 {
        match self.frame_est {
            FrameEstimate::Some(info) => info.h,
            FrameEstimate::None => 0,
        }
    }
}

const MAX_BITMAP_DIMENSION: i32 = 1 << 15;

/// An RGBA32 frame buffer, row-major, no row padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    w: i32,
    h: i32,
    pixels: Vec<u8>,
}

impl Bitmap {
    pub fn new(w: i32, h: i32) -> Result<Bitmap> {
        Bitmap::filled(w, h, [0, 0, 0, 0])
    }

    pub fn filled(w: i32, h: i32, color: [u8; 4]) -> Result<Bitmap> {
        if w <= 0 || h <= 0 || w > MAX_BITMAP_DIMENSION || h > MAX_BITMAP_DIMENSION {
            return Err(nerror!(
                ErrorKind::InvalidArgument,
                "Invalid bitmap dimensions {}x{}",
                w,
                h
            ));
        }
        let mut pixels = vec![0u8; w as usize * h as usize * 4];
        for px in pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&color);
        }
        Ok(Bitmap { w, h, pixels })
    }

    pub fn w(&self) -> i32 {
        self.w
    }

    pub fn h(&self) -> i32 {
        self.h
    }

    pub fn frame_info(&self) -> FrameInfo {
        FrameInfo {
            w: self.w,
            h: self.h,
            fmt: PixelFormat::Rgba32,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        debug_assert!(x >= 0 && x < self.w && y >= 0 && y < self.h);
        (y as usize * self.w as usize + x as usize) * 4
    }

    pub fn get(&self, x: i32, y: i32) -> [u8; 4] {
        let o = self.offset(x, y);
        [
            self.pixels[o],
            self.pixels[o + 1],
            self.pixels[o + 2],
            self.pixels[o + 3],
        ]
    }

    pub fn set(&mut self, x: i32, y: i32, color: [u8; 4]) {
        let o = self.offset(x, y);
        self.pixels[o..o + 4].copy_from_slice(&color);
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Bitmap({}x{} Rgba32)", self.w, self.h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_node_is_ready_for_nothing() {
        let state = NodeState::empty();
        assert!(!state.ready_for_pre_optimize_flatten());
        assert!(!state.ready_for_optimize());
        assert!(!state.ready_for_post_optimize_flatten());
        assert!(!state.ready_for_execution());
    }

    #[test]
    fn gates_open_in_stage_order() {
        let mut state = NodeState::INPUT_DIMENSIONS_KNOWN;
        assert!(state.ready_for_pre_optimize_flatten());
        assert!(!state.ready_for_optimize());

        state.insert(NodeState::PRE_OPTIMIZE_FLATTENED);
        assert!(!state.ready_for_pre_optimize_flatten());
        assert!(state.ready_for_optimize());

        state.insert(NodeState::OPTIMIZED);
        assert!(state.ready_for_post_optimize_flatten());
        assert!(!state.ready_for_execution());

        state.insert(NodeState::POST_OPTIMIZE_FLATTENED);
        state.insert(NodeState::INPUTS_EXECUTED);
        assert!(!state.ready_for_execution());

        state.insert(NodeState::OUTBOUND_DIMENSIONS_KNOWN);
        assert!(state.ready_for_execution());

        state.insert(NodeState::EXECUTED);
        assert!(!state.ready_for_execution());
    }

    #[test]
    fn own_dimensions_do_not_block_flattening() {
        let state = NodeState::INPUT_DIMENSIONS_KNOWN | NodeState::OUTBOUND_DIMENSIONS_KNOWN;
        assert!(state.ready_for_pre_optimize_flatten());
    }

    #[test]
    fn bitmap_rejects_degenerate_dimensions() {
        assert!(Bitmap::new(0, 4).is_err());
        assert!(Bitmap::new(4, -1).is_err());
        assert!(Bitmap::new(MAX_BITMAP_DIMENSION + 1, 1).is_err());
    }

    #[test]
    fn bitmap_get_set_round_trip() {
        let mut b = Bitmap::filled(3, 2, [9, 9, 9, 255]).expect("bitmap");
        b.set(2, 1, [1, 2, 3, 4]);
        assert_eq!(b.get(2, 1), [1, 2, 3, 4]);
        assert_eq!(b.get(0, 0), [9, 9, 9, 255]);
    }
}
