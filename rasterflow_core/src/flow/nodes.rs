//! The node-operation library: one routine per node kind for state updates,
//! dimension propagation, flatten rewrites, and execution.

use crate::errors::{ErrorKind, Result};
use crate::flow::definitions::{
    Bitmap, EdgeKind, FrameEstimate, FrameInfo, NodeKind, NodeParams, NodeState,
};
use crate::flow::graph::Graph;
use crate::job::Job;
use crate::{here, nerror};
use rasterflow_types::PixelFormat;

/// Required inbound edge counts per kind, as `(inputs, canvases)`.
pub fn edge_arity(kind: NodeKind) -> (usize, usize) {
    match kind {
        NodeKind::Null
        | NodeKind::Decode
        | NodeKind::CreateCanvas
        | NodeKind::Placeholder => (0, 0),
        NodeKind::Encode
        | NodeKind::Scale
        | NodeKind::FlipVertical
        | NodeKind::FlipHorizontal
        | NodeKind::Transpose
        | NodeKind::Rotate90
        | NodeKind::Rotate180
        | NodeKind::Rotate270 => (1, 0),
        NodeKind::CopyRectToCanvas => (1, 1),
    }
}

/// Kinds with a pre-optimize flatten rewrite.
pub fn flattens_pre(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Rotate90 | NodeKind::Rotate270)
}

/// Kinds with a post-optimize flatten rewrite.
pub fn flattens_post(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Rotate180)
}

pub fn node_has_dimensions(g: &Graph, node_id: i32) -> bool {
    g.node(node_id)
        .map(|n| n.frame_est.is_known())
        .unwrap_or(false)
}

pub fn node_inputs_have_dimensions(g: &Graph, node_id: i32) -> bool {
    g.input_edges(node_id)
        .iter()
        .all(|&(_, from, _)| node_has_dimensions(g, from))
}

/// Recomputes the derivable state flags of one node from local data. Flags
/// are only ever added, so this is idempotent and safe to call at any point.
pub fn update_state(g: &mut Graph, node_id: i32) -> Result<()> {
    let inputs = g.input_edges(node_id);
    let mut add = NodeState::empty();
    {
        let node = g.node(node_id).ok_or_else(|| {
            nerror!(ErrorKind::InvalidArgument, "Node #{} does not exist", node_id)
        })?;
        if node.frame_est.is_known() {
            add |= NodeState::OUTBOUND_DIMENSIONS_KNOWN;
        }
        let kind = node.kind();
        if !flattens_pre(kind) {
            add |= NodeState::PRE_OPTIMIZE_FLATTENED;
        }
        if !flattens_post(kind) {
            add |= NodeState::POST_OPTIMIZE_FLATTENED;
        }
    }
    let mut inputs_known = true;
    let mut inputs_executed = true;
    for &(_, from, _) in &inputs {
        let parent = g.node(from).ok_or_else(|| {
            nerror!(
                ErrorKind::GraphInvalid,
                "Node #{} has an edge from missing node #{}",
                node_id,
                from
            )
        })?;
        if !parent.frame_est.is_known() {
            inputs_known = false;
        }
        if !parent.state.contains(NodeState::EXECUTED) {
            inputs_executed = false;
        }
    }
    if inputs_known {
        add |= NodeState::INPUT_DIMENSIONS_KNOWN;
    }
    if inputs_executed {
        add |= NodeState::INPUTS_EXECUTED;
    }
    if let Some(node) = g.node_mut(node_id) {
        node.state.insert(add);
    }
    Ok(())
}

fn input_estimate(g: &Graph, node_id: i32, kind: EdgeKind) -> FrameEstimate {
    g.input_node(node_id, kind)
        .and_then(|from| g.node(from))
        .map(|n| n.frame_est)
        .unwrap_or(FrameEstimate::None)
}

fn swapped(est: FrameEstimate) -> FrameEstimate {
    match est {
        FrameEstimate::Some(info) => FrameEstimate::Some(FrameInfo {
            w: info.h,
            h: info.w,
            fmt: info.fmt,
        }),
        FrameEstimate::None => FrameEstimate::None,
    }
}

/// Computes the node's output dimensions where its inputs permit.
///
/// `_force_estimate` exists for interface parity with hosts that want a
/// guess before inputs resolve; every implemented kind computes exact
/// dimensions, so it has no effect.
pub fn populate_dimensions(
    job: &mut Job,
    g: &mut Graph,
    node_id: i32,
    _force_estimate: bool,
) -> Result<()> {
    let params = g
        .node(node_id)
        .ok_or_else(|| nerror!(ErrorKind::InvalidArgument, "Node #{} does not exist", node_id))?
        .params
        .clone();
    let est = match params {
        NodeParams::Decode {
            placeholder_id,
            codec_link,
        } => {
            let index = codec_link.ok_or_else(|| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "Decoder node #{} has no linked codec for placeholder id {}",
                    node_id,
                    placeholder_id
                )
            })?;
            let instance = job.codec_instance_by_index(index).ok_or_else(|| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "Decoder node #{} links to missing codec binding {}",
                    node_id,
                    index
                )
            })?;
            let info = instance.frame_info.ok_or_else(|| {
                nerror!(
                    ErrorKind::InvalidArgument,
                    "Codec for placeholder id {} has no cached frame info",
                    placeholder_id
                )
            })?;
            // Decoders report the frame they will produce, not the stream's
            // native layout.
            FrameEstimate::Some(FrameInfo {
                w: info.w,
                h: info.h,
                fmt: PixelFormat::Rgba32,
            })
        }
        NodeParams::Encode { .. }
        | NodeParams::FlipVertical
        | NodeParams::FlipHorizontal
        | NodeParams::Rotate180 => input_estimate(g, node_id, EdgeKind::Input),
        NodeParams::Transpose | NodeParams::Rotate90 | NodeParams::Rotate270 => {
            swapped(input_estimate(g, node_id, EdgeKind::Input))
        }
        NodeParams::CreateCanvas { w, h, .. } | NodeParams::Scale { w, h } => {
            FrameEstimate::Some(FrameInfo {
                w,
                h,
                fmt: PixelFormat::Rgba32,
            })
        }
        NodeParams::CopyRectToCanvas { .. } => input_estimate(g, node_id, EdgeKind::Canvas),
        // Nothing is known about a template slot until something is bound to
        // it; dimensions stay unknown.
        NodeParams::Placeholder { .. } => FrameEstimate::None,
        NodeParams::Null => FrameEstimate::None,
    };
    if est.is_known() {
        if let Some(node) = g.node_mut(node_id) {
            node.frame_est = est;
        }
    }
    Ok(())
}

/// Replaces `node_id` with a linear chain of nodes, rewiring its inbound and
/// outbound edges and tombstoning the original.
fn replace_with_chain(g: &mut Graph, node_id: i32, chain: &[NodeParams]) -> Result<()> {
    let inputs = g.input_edges(node_id);
    let outputs = g.outbound_edges(node_id);
    let ids: Vec<i32> = chain.iter().map(|p| g.add_node(p.clone())).collect();
    for pair in ids.windows(2) {
        g.add_edge(pair[0], pair[1], EdgeKind::Input)
            .map_err(|e| e.at(here!()))?;
    }
    let first = ids[0];
    let last = ids[ids.len() - 1];
    for &(_, from, kind) in &inputs {
        g.add_edge(from, first, kind).map_err(|e| e.at(here!()))?;
    }
    for &(_, to, kind) in &outputs {
        g.add_edge(last, to, kind).map_err(|e| e.at(here!()))?;
    }
    g.tombstone_node(node_id);
    Ok(())
}

/// Rewrites one high-level node into primitives before the optimizer runs.
pub fn pre_optimize_flatten(g: &mut Graph, node_id: i32) -> Result<()> {
    let kind = g
        .node(node_id)
        .map(|n| n.kind())
        .ok_or_else(|| nerror!(ErrorKind::InvalidArgument, "Node #{} does not exist", node_id))?;
    match kind {
        NodeKind::Rotate90 => replace_with_chain(
            g,
            node_id,
            &[NodeParams::Transpose, NodeParams::FlipHorizontal],
        ),
        NodeKind::Rotate270 => replace_with_chain(
            g,
            node_id,
            &[NodeParams::Transpose, NodeParams::FlipVertical],
        ),
        _ => Err(nerror!(
            ErrorKind::InvalidArgument,
            "No pre-optimize flatten for {:?} (node #{})",
            kind,
            node_id
        )),
    }
}

/// Rewrites one high-level node into primitives after the optimizer ran.
pub fn post_optimize_flatten(g: &mut Graph, node_id: i32) -> Result<()> {
    let kind = g
        .node(node_id)
        .map(|n| n.kind())
        .ok_or_else(|| nerror!(ErrorKind::InvalidArgument, "Node #{} does not exist", node_id))?;
    match kind {
        NodeKind::Rotate180 => replace_with_chain(
            g,
            node_id,
            &[NodeParams::FlipVertical, NodeParams::FlipHorizontal],
        ),
        _ => Err(nerror!(
            ErrorKind::InvalidArgument,
            "No post-optimize flatten for {:?} (node #{})",
            kind,
            node_id
        )),
    }
}

fn input_result(g: &Graph, node_id: i32, kind: EdgeKind) -> Result<Bitmap> {
    let from = g.input_node(node_id, kind).ok_or_else(|| {
        nerror!(
            ErrorKind::GraphInvalid,
            "Node #{} has no {:?} edge",
            node_id,
            kind
        )
    })?;
    g.node(from)
        .and_then(|n| n.result.clone())
        .ok_or_else(|| {
            nerror!(
                ErrorKind::GraphInvalid,
                "Input node #{} of node #{} has not executed",
                from,
                node_id
            )
        })
}

/// Runs one node's operation, storing its result frame on the node.
pub fn execute(job: &mut Job, g: &mut Graph, node_id: i32) -> Result<()> {
    let params = g
        .node(node_id)
        .ok_or_else(|| nerror!(ErrorKind::InvalidArgument, "Node #{} does not exist", node_id))?
        .params
        .clone();
    let result = match params {
        NodeParams::Decode {
            placeholder_id,
            codec_link,
        } => {
            let index = codec_link.ok_or_else(|| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "Decoder node #{} has no linked codec for placeholder id {}",
                    node_id,
                    placeholder_id
                )
            })?;
            let instance = job.codec_instance_by_index_mut(index).ok_or_else(|| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "Decoder node #{} links to missing codec binding {}",
                    node_id,
                    index
                )
            })?;
            let kind = instance.codec_id.ok_or_else(|| {
                nerror!(
                    ErrorKind::InvalidArgument,
                    "No codec selected for placeholder id {}",
                    placeholder_id
                )
            })?;
            kind.read_frame(&mut instance.io).map_err(|e| e.at(here!()))?
        }
        NodeParams::Encode {
            placeholder_id,
            format,
            codec_link,
        } => {
            let frame = input_result(g, node_id, EdgeKind::Input).map_err(|e| e.at(here!()))?;
            let index = codec_link.ok_or_else(|| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "Encoder node #{} has no linked codec for placeholder id {}",
                    node_id,
                    placeholder_id
                )
            })?;
            let instance = job.codec_instance_by_index_mut(index).ok_or_else(|| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "Encoder node #{} links to missing codec binding {}",
                    node_id,
                    index
                )
            })?;
            // Output codecs are not determined at registration; the encoder
            // claims the binding here.
            instance.codec_id = Some(format);
            format
                .write_frame(&mut instance.io, &frame)
                .map_err(|e| e.at(here!()))?;
            frame
        }
        NodeParams::CreateCanvas { w, h, color } => {
            Bitmap::filled(w, h, color).map_err(|e| e.at(here!()))?
        }
        NodeParams::Scale { w, h } => {
            let source = input_result(g, node_id, EdgeKind::Input).map_err(|e| e.at(here!()))?;
            scale_nearest(&source, w, h).map_err(|e| e.at(here!()))?
        }
        NodeParams::FlipVertical => {
            let mut frame = input_result(g, node_id, EdgeKind::Input).map_err(|e| e.at(here!()))?;
            flip_vertical(&mut frame);
            frame
        }
        NodeParams::FlipHorizontal => {
            let mut frame = input_result(g, node_id, EdgeKind::Input).map_err(|e| e.at(here!()))?;
            flip_horizontal(&mut frame);
            frame
        }
        NodeParams::Transpose => {
            let source = input_result(g, node_id, EdgeKind::Input).map_err(|e| e.at(here!()))?;
            transpose(&source).map_err(|e| e.at(here!()))?
        }
        NodeParams::CopyRectToCanvas {
            from_x,
            from_y,
            w,
            h,
            x,
            y,
        } => {
            let source = input_result(g, node_id, EdgeKind::Input).map_err(|e| e.at(here!()))?;
            let mut canvas = input_result(g, node_id, EdgeKind::Canvas).map_err(|e| e.at(here!()))?;
            copy_rect(&source, &mut canvas, from_x, from_y, w, h, x, y)
                .map_err(|e| e.at(here!()))?;
            canvas
        }
        NodeParams::Rotate90 | NodeParams::Rotate180 | NodeParams::Rotate270 => {
            return Err(nerror!(
                ErrorKind::InvalidArgument,
                "{:?} (node #{}) must be flattened before execution",
                params.kind(),
                node_id
            ));
        }
        NodeParams::Placeholder { placeholder_id } => {
            return Err(nerror!(
                ErrorKind::InvalidArgument,
                "Placeholder node #{} (placeholder id {}) cannot execute",
                node_id,
                placeholder_id
            ));
        }
        NodeParams::Null => {
            return Err(nerror!(
                ErrorKind::InvalidArgument,
                "Null node #{} cannot execute",
                node_id
            ));
        }
    };
    if let Some(node) = g.node_mut(node_id) {
        node.result = Some(result);
    }
    Ok(())
}

fn transpose(source: &Bitmap) -> Result<Bitmap> {
    let mut out = Bitmap::new(source.h(), source.w())?;
    for y in 0..source.h() {
        for x in 0..source.w() {
            out.set(y, x, source.get(x, y));
        }
    }
    Ok(out)
}

fn flip_vertical(frame: &mut Bitmap) {
    let row = frame.w() as usize * 4;
    let h = frame.h() as usize;
    let pixels = frame.pixels_mut();
    for y in 0..h / 2 {
        let (top, bottom) = pixels.split_at_mut((h - 1 - y) * row);
        top[y * row..(y + 1) * row].swap_with_slice(&mut bottom[..row]);
    }
}

fn flip_horizontal(frame: &mut Bitmap) {
    let w = frame.w();
    for y in 0..frame.h() {
        for x in 0..w / 2 {
            let left = frame.get(x, y);
            let right = frame.get(w - 1 - x, y);
            frame.set(x, y, right);
            frame.set(w - 1 - x, y, left);
        }
    }
}

fn scale_nearest(source: &Bitmap, w: i32, h: i32) -> Result<Bitmap> {
    let mut out = Bitmap::new(w, h)?;
    for y in 0..h {
        let sy = ((y as i64 * source.h() as i64) / h as i64) as i32;
        for x in 0..w {
            let sx = ((x as i64 * source.w() as i64) / w as i64) as i32;
            out.set(x, y, source.get(sx, sy));
        }
    }
    Ok(out)
}

#[allow(clippy::too_many_arguments)]
fn copy_rect(
    source: &Bitmap,
    canvas: &mut Bitmap,
    from_x: i32,
    from_y: i32,
    w: i32,
    h: i32,
    x: i32,
    y: i32,
) -> Result<()> {
    if w <= 0
        || h <= 0
        || from_x < 0
        || from_y < 0
        || x < 0
        || y < 0
        || from_x + w > source.w()
        || from_y + h > source.h()
        || x + w > canvas.w()
        || y + h > canvas.h()
    {
        return Err(nerror!(
            ErrorKind::InvalidNodeParams,
            "Copy rect {}x{} from ({},{}) to ({},{}) does not fit {}x{} source and {}x{} canvas",
            w,
            h,
            from_x,
            from_y,
            x,
            y,
            source.w(),
            source.h(),
            canvas.w(),
            canvas.h()
        ));
    }
    for dy in 0..h {
        for dx in 0..w {
            canvas.set(x + dx, y + dy, source.get(from_x + dx, from_y + dy));
        }
    }
    Ok(())
}
