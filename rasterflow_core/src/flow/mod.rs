//! The job execution engine: a fixed-point loop of dimension propagation,
//! flatten rewrites, optimization, and partial execution over a mutable DAG.
//!
//! Each pass may change the graph's shape; every mutating stage restarts its
//! walk after a single rewrite rather than reasoning about stale node ids.
//! That costs O(n²) walks and is acceptable: graphs are tens to hundreds of
//! nodes.

pub mod definitions;
pub mod graph;
pub mod nodes;

use crate::codecs;
use crate::errors::{ErrorKind, Result};
use crate::io::IoProxy;
use crate::job::Job;
use crate::{here, nerror};
use log::{debug, trace};
use std::fs;
use std::process::Command;

use self::definitions::{NodeParams, NodeState};
use self::graph::{graph_walk, graph_walk_dependency_wise, Graph, VisitorAction};

/// Graph versions past this cap are no longer recorded.
const MAX_GRAPH_VERSIONS: i32 = 100;

/// Drives the graph to full execution, interleaving dimension propagation,
/// flatten, optimize, and execute phases until every live node has run or
/// the pass limit is hit.
pub fn job_execute(job: &mut Job, g: &mut Graph) -> Result<()> {
    job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
    job_link_codecs(job, g).map_err(|e| e.at(here!()))?;

    let mut passes: i32 = 0;
    while !job_graph_fully_executed(g) {
        if passes >= job.max_calc_flatten_execute_passes {
            let executed = g
                .live_nodes()
                .filter(|&id| {
                    g.node(id)
                        .map(|n| n.state.contains(NodeState::EXECUTED))
                        .unwrap_or(false)
                })
                .count();
            return Err(nerror!(
                ErrorKind::MaximumGraphPassesExceeded,
                "Maximum graph passes ({}) exceeded with {} of {} live nodes executed",
                job.max_calc_flatten_execute_passes,
                executed,
                g.live_node_count()
            ));
        }
        debug!(
            "job {}: pass {} of {}",
            job.debug_job_id,
            passes + 1,
            job.max_calc_flatten_execute_passes
        );
        job_populate_dimensions_where_certain(job, g).map_err(|e| e.at(here!()))?;
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        graph_pre_optimize_flatten(job, g).map_err(|e| e.at(here!()))?;
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        job_populate_dimensions_where_certain(job, g).map_err(|e| e.at(here!()))?;
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        graph_optimize(job, g).map_err(|e| e.at(here!()))?;
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        job_populate_dimensions_where_certain(job, g).map_err(|e| e.at(here!()))?;
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        graph_post_optimize_flatten(job, g).map_err(|e| e.at(here!()))?;
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        job_populate_dimensions_where_certain(job, g).map_err(|e| e.at(here!()))?;
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        job_execute_where_certain(job, g).map_err(|e| e.at(here!()))?;
        passes += 1;

        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
    }
    if job.next_graph_version > 0 && job.render_last_graph {
        job_render_graph_to_png(job, job.next_graph_version - 1).map_err(|e| e.at(here!()))?;
        if job.render_animated_graph {
            job_render_animated_graph(job).map_err(|e| e.at(here!()))?;
        }
    }
    Ok(())
}

/// True when every live node has executed.
pub fn job_graph_fully_executed(g: &Graph) -> bool {
    g.live_nodes().all(|id| {
        g.node(id)
            .map(|n| n.state.contains(NodeState::EXECUTED))
            .unwrap_or(false)
    })
}

/// Resolves codec bindings into every decoder/encoder node whose link is
/// still unset. Idempotent; re-running never changes an existing link.
pub fn job_link_codecs(job: &mut Job, g: &mut Graph) -> Result<()> {
    job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;

    let ids: Vec<i32> = g.live_nodes().collect();
    for id in ids {
        let unresolved = match g.node(id).map(|n| &n.params) {
            Some(NodeParams::Decode {
                placeholder_id,
                codec_link: None,
            }) => Some(*placeholder_id),
            Some(NodeParams::Encode {
                placeholder_id,
                codec_link: None,
                ..
            }) => Some(*placeholder_id),
            _ => None,
        };
        if let Some(placeholder_id) = unresolved {
            let index = job.codec_instance_index(placeholder_id).ok_or_else(|| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "No matching codec or io found for placeholder id {} (node #{}).",
                    placeholder_id,
                    id
                )
            })?;
            if let Some(node) = g.node_mut(id) {
                match &mut node.params {
                    NodeParams::Decode { codec_link, .. }
                    | NodeParams::Encode { codec_link, .. } => *codec_link = Some(index),
                    _ => {}
                }
            }
            trace!(
                "job {}: linked placeholder id {} to binding {} (node #{})",
                job.debug_job_id,
                placeholder_id,
                index,
                id
            );
        }
    }
    Ok(())
}

fn job_populate_dimensions_for_node(
    job: &mut Job,
    g: &mut Graph,
    node_id: i32,
    force_estimate: bool,
) -> Result<()> {
    let now = time::precise_time_ns();
    nodes::populate_dimensions(job, g, node_id, force_estimate).map_err(|e| e.at(here!()))?;
    let elapsed = time::precise_time_ns() - now;
    if let Some(node) = g.node_mut(node_id) {
        node.ticks_elapsed += elapsed;
    }
    Ok(())
}

fn node_visitor_dimensions(
    job: &mut Job,
    g: &mut Graph,
    node_id: i32,
    force_estimate: bool,
) -> Result<VisitorAction> {
    if !nodes::node_has_dimensions(g, node_id) {
        nodes::update_state(g, node_id).map_err(|e| e.at(here!()))?;
        let inputs_known = g
            .node(node_id)
            .map(|n| n.state.contains(NodeState::INPUT_DIMENSIONS_KNOWN))
            .unwrap_or(false);
        if inputs_known {
            job_populate_dimensions_for_node(job, g, node_id, force_estimate)
                .map_err(|e| e.at(here!()))?;
        }
        if !nodes::node_has_dimensions(g, node_id) {
            // We couldn't populate this node, so we sure can't populate
            // anything downstream of it.
            return Ok(VisitorAction::SkipOutboundPaths);
        }
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
    }
    Ok(VisitorAction::Continue)
}

/// Dependency-wise dimension propagation; nodes whose inputs are still
/// unknown are left for a later pass.
pub fn job_populate_dimensions_where_certain(job: &mut Job, g: &mut Graph) -> Result<()> {
    graph_walk_dependency_wise(job, g, &mut |job, g, id| {
        node_visitor_dimensions(job, g, id, false)
    })
}

/// Free-walk variant that asks nodes to estimate even where inputs have not
/// resolved.
pub fn job_force_populate_dimensions(job: &mut Job, g: &mut Graph) -> Result<()> {
    graph_walk(job, g, &mut |job, g, id| {
        node_visitor_dimensions(job, g, id, true)
    })
}

fn node_visitor_flatten(
    _job: &mut Job,
    g: &mut Graph,
    node_id: i32,
    re_walk: &mut bool,
) -> Result<VisitorAction> {
    nodes::update_state(g, node_id).map_err(|e| e.at(here!()))?;
    let state = g.node(node_id).map(|n| n.state).unwrap_or_default();
    if state.ready_for_pre_optimize_flatten() {
        nodes::pre_optimize_flatten(g, node_id).map_err(|e| e.at(here!()))?;
        *re_walk = true;
        return Ok(VisitorAction::Stop);
    } else if !state.contains(NodeState::INPUT_DIMENSIONS_KNOWN) {
        // we can't flatten past missing dimensions
        return Ok(VisitorAction::SkipOutboundPaths);
    }
    Ok(VisitorAction::Continue)
}

/// Applies pre-optimize flatten rewrites, one per walk, until a full walk
/// finds nothing left to rewrite.
pub fn graph_pre_optimize_flatten(job: &mut Job, g: &mut Graph) -> Result<()> {
    loop {
        let mut re_walk = false;
        graph_walk_dependency_wise(job, g, &mut |job, g, id| {
            node_visitor_flatten(job, g, id, &mut re_walk)
        })
        .map_err(|e| e.at(here!()))?;
        if !re_walk {
            return Ok(());
        }
    }
}

fn node_visitor_optimize(
    _job: &mut Job,
    g: &mut Graph,
    node_id: i32,
    _re_walk: &mut bool,
) -> Result<VisitorAction> {
    nodes::update_state(g, node_id).map_err(|e| e.at(here!()))?;
    // No peephole rewrites yet; promote eligible nodes and move on.
    if let Some(node) = g.node_mut(node_id) {
        if node.state.ready_for_optimize() {
            node.state.insert(NodeState::OPTIMIZED);
        }
    }
    Ok(VisitorAction::Continue)
}

/// The optimizer stage. Future rewrites must set `re_walk` and stop, exactly
/// like the flatteners.
pub fn graph_optimize(job: &mut Job, g: &mut Graph) -> Result<()> {
    loop {
        let mut re_walk = false;
        graph_walk(job, g, &mut |job, g, id| {
            node_visitor_optimize(job, g, id, &mut re_walk)
        })
        .map_err(|e| e.at(here!()))?;
        if !re_walk {
            return Ok(());
        }
    }
}

fn node_visitor_post_optimize_flatten(
    _job: &mut Job,
    g: &mut Graph,
    node_id: i32,
    re_walk: &mut bool,
) -> Result<VisitorAction> {
    nodes::update_state(g, node_id).map_err(|e| e.at(here!()))?;
    let state = g.node(node_id).map(|n| n.state).unwrap_or_default();
    if state.ready_for_post_optimize_flatten() {
        nodes::post_optimize_flatten(g, node_id).map_err(|e| e.at(here!()))?;
        g.validate().map_err(|e| e.at(here!()))?;
        *re_walk = true;
        return Ok(VisitorAction::Stop);
    } else if !state.contains(NodeState::INPUT_DIMENSIONS_KNOWN) {
        return Ok(VisitorAction::SkipOutboundPaths);
    }
    Ok(VisitorAction::Continue)
}

/// Applies post-optimize flatten rewrites, validating the graph after each.
pub fn graph_post_optimize_flatten(job: &mut Job, g: &mut Graph) -> Result<()> {
    loop {
        let mut re_walk = false;
        graph_walk(job, g, &mut |job, g, id| {
            node_visitor_post_optimize_flatten(job, g, id, &mut re_walk)
        })
        .map_err(|e| e.at(here!()))?;
        if !re_walk {
            return Ok(());
        }
    }
}

fn node_visitor_execute(job: &mut Job, g: &mut Graph, node_id: i32) -> Result<VisitorAction> {
    nodes::update_state(g, node_id).map_err(|e| e.at(here!()))?;
    let state = g.node(node_id).map(|n| n.state).unwrap_or_default();
    if !state.contains(NodeState::EXECUTED) && state.ready_for_execution() {
        let now = time::precise_time_ns();
        nodes::execute(job, g, node_id).map_err(|e| e.at(here!()))?;
        let elapsed = time::precise_time_ns() - now;
        if let Some(node) = g.node_mut(node_id) {
            node.ticks_elapsed += elapsed;
            node.state.insert(NodeState::EXECUTED);
        }
        job_notify_node_complete(job, g, node_id).map_err(|e| e.at(here!()))?;
    }
    let executed = g
        .node(node_id)
        .map(|n| n.state.contains(NodeState::EXECUTED))
        .unwrap_or(false);
    if !executed {
        // If we couldn't complete this node yet, end this branch.
        Ok(VisitorAction::SkipOutboundPaths)
    } else {
        job_notify_graph_changed(job, g).map_err(|e| e.at(here!()))?;
        Ok(VisitorAction::Continue)
    }
}

/// Runs every node whose inputs have executed and whose dimensions are
/// known, in dependency order.
pub fn job_execute_where_certain(job: &mut Job, g: &mut Graph) -> Result<()> {
    graph_walk_dependency_wise(job, g, &mut node_visitor_execute)
}

fn graph_version_path(job_id: i32, version: i32) -> String {
    format!("job_{}_graph_version_{}.dot", job_id, version)
}

fn files_identical(a: &str, b: &str) -> Result<bool> {
    let first = fs::read(a).map_err(|e| nerror!(ErrorKind::IoError, "Failed to read {}: {}", a, e))?;
    let second = fs::read(b).map_err(|e| nerror!(ErrorKind::IoError, "Failed to read {}: {}", b, e))?;
    Ok(first == second)
}

/// Records a graph version when recording is enabled. Consecutive identical
/// versions collapse: the duplicate file is removed and the counter rolled
/// back so the next mutation overwrites it.
pub fn job_notify_graph_changed(job: &mut Job, g: &Graph) -> Result<()> {
    if !job.record_graph_versions || job.next_graph_version > MAX_GRAPH_VERSIONS {
        return Ok(());
    }
    if job.next_graph_version == 0 {
        // Delete artifacts a previous run left under the same job id.
        for version in 0..=MAX_GRAPH_VERSIONS {
            let base = graph_version_path(job.debug_job_id, version);
            let _ = fs::remove_file(&base);
            let _ = fs::remove_file(format!("{}.png", base));
            let _ = fs::remove_file(format!("{}.svg", base));
        }
    }
    let prev_version = job.next_graph_version - 1;
    let current_version = job.next_graph_version;
    job.next_graph_version += 1;

    let filename = graph_version_path(job.debug_job_id, current_version);
    let mut file = fs::File::create(&filename).map_err(|e| {
        nerror!(
            ErrorKind::IoError,
            "Failed to open {} for graph dotfile export: {}",
            filename,
            e
        )
    })?;
    g.write_dot(&mut file).map_err(|e| e.at(here!()))?;

    if current_version > 0 {
        let prev_filename = graph_version_path(job.debug_job_id, prev_version);
        if files_identical(&prev_filename, &filename).map_err(|e| e.at(here!()))? {
            // Next time we will overwrite the duplicate graph.
            job.next_graph_version -= 1;
            let _ = fs::remove_file(&filename);
        } else if job.render_graph_versions {
            job_render_graph_to_png(job, prev_version).map_err(|e| e.at(here!()))?;
        }
    }
    Ok(())
}

/// Snapshots a completed node's frame when frame recording is enabled.
pub fn job_notify_node_complete(job: &mut Job, g: &Graph, node_id: i32) -> Result<()> {
    if !job.record_frame_images {
        return Ok(());
    }
    let result = match g.node(node_id).and_then(|n| n.result.as_ref()) {
        Some(result) => result,
        None => return Ok(()),
    };
    fs::create_dir_all("node_frames")
        .map_err(|e| nerror!(ErrorKind::IoError, "Failed to create ./node_frames: {}", e))?;
    let path = format!("./node_frames/job_{}_node_{}.ppm", job.debug_job_id, node_id);
    let mut io = IoProxy::file_writer(&path).map_err(|e| e.at(here!()))?;
    codecs::ppm::write_frame(&mut io, result).map_err(|e| e.at(here!()))?;
    Ok(())
}

/// Renders a recorded graph version with graphviz.
pub fn job_render_graph_to_png(job: &Job, graph_version: i32) -> Result<()> {
    let filename = graph_version_path(job.debug_job_id, graph_version);
    let status = Command::new("dot")
        .arg("-Tpng")
        .arg("-Gsize=11,16!")
        .arg("-Gdpi=150")
        .arg("-O")
        .arg(&filename)
        .status()
        .map_err(|e| {
            nerror!(
                ErrorKind::IoError,
                "Failed to run graphviz 'dot' on {}: {}",
                filename,
                e
            )
        })?;
    if !status.success() {
        return Err(nerror!(
            ErrorKind::IoError,
            "'dot' exited with {} while rendering {}",
            status,
            filename
        ));
    }
    Ok(())
}

/// Assembles the rendered versions into an animated GIF with ImageMagick.
fn job_render_animated_graph(job: &Job) -> Result<()> {
    let frames: Vec<String> = (0..job.next_graph_version)
        .map(|v| format!("{}.png", graph_version_path(job.debug_job_id, v)))
        .filter(|path| fs::metadata(path).is_ok())
        .collect();
    if frames.is_empty() {
        return Ok(());
    }
    let target = format!("job_{}_graph_animated.gif", job.debug_job_id);
    let status = Command::new("convert")
        .arg("-delay")
        .arg("40")
        .arg("-loop")
        .arg("0")
        .args(&frames)
        .arg(&target)
        .status()
        .map_err(|e| {
            nerror!(
                ErrorKind::IoError,
                "Failed to run ImageMagick 'convert' for {}: {}",
                target,
                e
            )
        })?;
    if !status.success() {
        return Err(nerror!(
            ErrorKind::IoError,
            "'convert' exited with {} while rendering {}",
            status,
            target
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codecs::farbfeld::tests::tiny_farbfeld;
    use crate::codecs::ppm::tests::tiny_ppm;
    use crate::codecs::CodecKind;
    use crate::context::Context;
    use crate::flow::definitions::{EdgeKind, NodeKind};
    use rasterflow_types::IoDirection;

    fn new_job() -> Job {
        Context::create().create_job()
    }

    fn decode_node(placeholder_id: i32) -> NodeParams {
        NodeParams::Decode {
            placeholder_id,
            codec_link: None,
        }
    }

    fn encode_node(placeholder_id: i32, format: CodecKind) -> NodeParams {
        NodeParams::Encode {
            placeholder_id,
            format,
            codec_link: None,
        }
    }

    fn decode_output(job: &Job, placeholder_id: i32, format: CodecKind) -> definitions::Bitmap {
        let bytes = job
            .get_output_buffer(placeholder_id)
            .expect("output buffer")
            .to_vec();
        assert!(!bytes.is_empty());
        format
            .read_frame(&mut IoProxy::from_vec(bytes))
            .expect("decode output")
    }

    #[test]
    fn null_only_graph_executes_in_zero_passes() {
        let mut job = new_job();
        let mut g = Graph::new();
        g.add_node(NodeParams::Null);
        job.execute(&mut g).expect("execute");
        assert_eq!(job.next_graph_version, 0);
    }

    #[test]
    fn unresolvable_dimensions_exhaust_the_pass_limit() {
        let mut job = new_job();
        job.max_calc_flatten_execute_passes = 2;
        let mut g = Graph::new();
        let slot = g.add_node(NodeParams::Placeholder { placeholder_id: 3 });
        let flip = g.add_node(NodeParams::FlipVertical);
        g.add_edge(slot, flip, EdgeKind::Input).expect("edge");

        let e = job.execute(&mut g).expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::MaximumGraphPassesExceeded);
        assert!(e.message.contains("Maximum graph passes (2) exceeded"));
    }

    #[test]
    fn zero_pass_limit_fails_before_any_work() {
        let mut job = new_job();
        job.max_calc_flatten_execute_passes = 0;
        let mut g = Graph::new();
        g.add_node(NodeParams::CreateCanvas {
            w: 1,
            h: 1,
            color: [0, 0, 0, 255],
        });
        let e = job.execute(&mut g).expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::MaximumGraphPassesExceeded);
    }

    #[test]
    fn late_bound_encoder_resolves_and_fills_the_output_buffer() {
        let mut job = new_job();
        job.add_io(IoProxy::output_buffer(), 99, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let canvas = g.add_node(NodeParams::CreateCanvas {
            w: 2,
            h: 2,
            color: [10, 20, 30, 255],
        });
        let encode = g.add_node(encode_node(99, CodecKind::Ppm));
        g.add_edge(canvas, encode, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("execute");

        let instance = job.get_codec_instance(99).expect("binding");
        assert_eq!(instance.codec_id, Some(CodecKind::Ppm));
        let bytes = job.get_output_buffer(99).expect("buffer");
        assert!(bytes.starts_with(b"P6\n"));
        let frame = decode_output(&job, 99, CodecKind::Ppm);
        assert_eq!(frame.get(1, 1), [10, 20, 30, 255]);
    }

    #[test]
    fn dangling_placeholder_fails_linking() {
        let mut job = new_job();
        let mut g = Graph::new();
        let node = g.add_node(decode_node(7));
        let e = job.execute(&mut g).expect_err("must fail");
        assert_eq!(e.kind(), ErrorKind::GraphInvalid);
        assert!(e.message.contains("placeholder id 7"));
        assert!(e.message.contains(&format!("node #{}", node)));
    }

    #[test]
    fn ppm_round_trips_through_decode_and_encode() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_ppm()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let e = g.add_node(encode_node(1, CodecKind::Ppm));
        g.add_edge(d, e, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("execute");

        let original = CodecKind::Ppm
            .read_frame(&mut IoProxy::from_vec(tiny_ppm()))
            .expect("decode original");
        assert_eq!(decode_output(&job, 1, CodecKind::Ppm), original);
    }

    #[test]
    fn farbfeld_round_trips_through_decode_and_encode() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_farbfeld()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let e = g.add_node(encode_node(1, CodecKind::Farbfeld));
        g.add_edge(d, e, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("execute");

        let original = CodecKind::Farbfeld
            .read_frame(&mut IoProxy::from_vec(tiny_farbfeld()))
            .expect("decode original");
        assert_eq!(decode_output(&job, 1, CodecKind::Farbfeld), original);
    }

    #[test]
    fn rotate90_flattens_into_primitives_and_executes() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_farbfeld()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let rot = g.add_node(NodeParams::Rotate90);
        let e = g.add_node(encode_node(1, CodecKind::Farbfeld));
        g.add_edge(d, rot, EdgeKind::Input).expect("edge");
        g.add_edge(rot, e, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("execute");

        assert!(!g.is_live(rot));
        let kinds: Vec<NodeKind> = g
            .live_nodes()
            .map(|id| g.node(id).expect("node").kind())
            .collect();
        assert!(kinds.contains(&NodeKind::Transpose));
        assert!(kinds.contains(&NodeKind::FlipHorizontal));

        // 2x1 [red, gray] rotated clockwise becomes 1x2 [red / gray].
        let frame = decode_output(&job, 1, CodecKind::Farbfeld);
        assert_eq!((frame.w(), frame.h()), (1, 2));
        assert_eq!(frame.get(0, 0), [255, 0, 0, 255]);
        assert_eq!(frame.get(0, 1), [128, 128, 128, 127]);
    }

    #[test]
    fn rotate180_flattens_after_the_optimizer() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_farbfeld()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let rot = g.add_node(NodeParams::Rotate180);
        let e = g.add_node(encode_node(1, CodecKind::Farbfeld));
        g.add_edge(d, rot, EdgeKind::Input).expect("edge");
        g.add_edge(rot, e, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("execute");

        assert!(!g.is_live(rot));
        let frame = decode_output(&job, 1, CodecKind::Farbfeld);
        assert_eq!((frame.w(), frame.h()), (2, 1));
        assert_eq!(frame.get(0, 0), [128, 128, 128, 127]);
        assert_eq!(frame.get(1, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn copy_rect_composites_through_a_canvas_edge() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_farbfeld()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let canvas = g.add_node(NodeParams::CreateCanvas {
            w: 4,
            h: 4,
            color: [0, 0, 255, 255],
        });
        let copy = g.add_node(NodeParams::CopyRectToCanvas {
            from_x: 0,
            from_y: 0,
            w: 2,
            h: 1,
            x: 1,
            y: 1,
        });
        let e = g.add_node(encode_node(1, CodecKind::Farbfeld));
        g.add_edge(d, copy, EdgeKind::Input).expect("edge");
        g.add_edge(canvas, copy, EdgeKind::Canvas).expect("edge");
        g.add_edge(copy, e, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("execute");

        let frame = decode_output(&job, 1, CodecKind::Farbfeld);
        assert_eq!((frame.w(), frame.h()), (4, 4));
        assert_eq!(frame.get(0, 0), [0, 0, 255, 255]);
        assert_eq!(frame.get(1, 1), [255, 0, 0, 255]);
        assert_eq!(frame.get(2, 1), [128, 128, 128, 127]);
        assert_eq!(frame.get(3, 1), [0, 0, 255, 255]);
    }

    #[test]
    fn force_populate_walks_free_and_fills_dimensions() {
        let mut job = new_job();
        let mut g = Graph::new();
        let canvas = g.add_node(NodeParams::CreateCanvas {
            w: 3,
            h: 2,
            color: [0, 0, 0, 255],
        });
        let t = g.add_node(NodeParams::Transpose);
        g.add_edge(canvas, t, EdgeKind::Input).expect("edge");

        job_force_populate_dimensions(&mut job, &mut g).expect("force dims");
        let node = g.node(t).expect("node");
        assert_eq!((node.result_width(), node.result_height()), (2, 3));
    }

    #[test]
    fn execute_is_idempotent_once_fully_executed() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_ppm()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let e = g.add_node(encode_node(1, CodecKind::Ppm));
        g.add_edge(d, e, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("first run");
        let first = job.get_output_buffer(1).expect("buffer").to_vec();
        job.execute(&mut g).expect("second run");
        assert_eq!(job.get_output_buffer(1).expect("buffer"), &first[..]);
        assert_eq!(job.next_graph_version, 0);
    }

    #[test]
    fn linking_twice_changes_nothing() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_ppm()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let e = g.add_node(encode_node(1, CodecKind::Ppm));
        g.add_edge(d, e, EdgeKind::Input).expect("edge");

        let links = |g: &Graph| -> Vec<NodeParams> {
            g.live_nodes()
                .map(|id| g.node(id).expect("node").params.clone())
                .collect()
        };
        job_link_codecs(&mut job, &mut g).expect("link");
        let first = links(&g);
        job_link_codecs(&mut job, &mut g).expect("relink");
        assert_eq!(links(&g), first);
    }

    #[test]
    fn state_flags_are_complete_and_stable_after_execution() {
        let mut job = new_job();
        job.add_io(IoProxy::from_vec(tiny_farbfeld()), 0, IoDirection::In)
            .expect("add input");
        job.add_io(IoProxy::output_buffer(), 1, IoDirection::Out)
            .expect("add output");
        let mut g = Graph::new();
        let d = g.add_node(decode_node(0));
        let rot = g.add_node(NodeParams::Rotate90);
        let scale = g.add_node(NodeParams::Scale { w: 3, h: 3 });
        let e = g.add_node(encode_node(1, CodecKind::Farbfeld));
        g.add_edge(d, rot, EdgeKind::Input).expect("edge");
        g.add_edge(rot, scale, EdgeKind::Input).expect("edge");
        g.add_edge(scale, e, EdgeKind::Input).expect("edge");

        job.execute(&mut g).expect("execute");

        let done = NodeState::INPUT_DIMENSIONS_KNOWN
            | NodeState::OUTBOUND_DIMENSIONS_KNOWN
            | NodeState::PRE_OPTIMIZE_FLATTENED
            | NodeState::OPTIMIZED
            | NodeState::POST_OPTIMIZE_FLATTENED
            | NodeState::INPUTS_EXECUTED
            | NodeState::EXECUTED;
        for id in g.live_nodes().collect::<Vec<i32>>() {
            assert!(g.node(id).expect("node").state.contains(done));
            let before = g.node(id).expect("node").state;
            nodes::update_state(&mut g, id).expect("update");
            assert_eq!(g.node(id).expect("node").state, before);
        }
        assert!(job_graph_fully_executed(&g));
    }
}
