//! The DAG container and its traversal strategies.
//!
//! Nodes are identified by stable `i32` ids. Removal is tombstoning — a
//! rewrite sets a node's params to `Null` and its touching edges to
//! `EdgeKind::None` — so ids are never reused and callers may hold ids (never
//! references) across mutations.

use crate::errors::{ErrorKind, Result};
use crate::flow::definitions::{EdgeKind, Node, NodeParams};
use crate::flow::nodes;
use crate::job::Job;
use crate::nerror;
use daggy::Dag;
use log::trace;
use petgraph::dot::Dot;
use petgraph::graph::{edge_index, node_index};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::io::Write;

pub struct Graph {
    dag: Dag<Node, EdgeKind, u32>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph { dag: Dag::new() }
    }

    /// Exclusive upper bound on node ids; ids below it are either live or
    /// tombstoned, never vacant.
    pub fn next_node_id(&self) -> i32 {
        self.dag.node_count() as i32
    }

    pub fn add_node(&mut self, params: NodeParams) -> i32 {
        self.dag.add_node(Node::new(params)).index() as i32
    }

    pub fn add_edge(&mut self, from: i32, to: i32, kind: EdgeKind) -> Result<i32> {
        self.dag
            .add_edge(node_index(from as usize), node_index(to as usize), kind)
            .map(|e| e.index() as i32)
            .map_err(|_| {
                nerror!(
                    ErrorKind::GraphInvalid,
                    "Edge from node #{} to node #{} would create a cycle",
                    from,
                    to
                )
            })
    }

    pub fn node(&self, id: i32) -> Option<&Node> {
        self.dag.node_weight(node_index(id as usize))
    }

    pub fn node_mut(&mut self, id: i32) -> Option<&mut Node> {
        self.dag.node_weight_mut(node_index(id as usize))
    }

    pub fn is_live(&self, id: i32) -> bool {
        self.node(id).map(|n| !n.is_null()).unwrap_or(false)
    }

    pub fn live_nodes(&self) -> impl Iterator<Item = i32> + '_ {
        (0..self.next_node_id()).filter(move |&id| self.is_live(id))
    }

    pub fn live_node_count(&self) -> usize {
        self.live_nodes().count()
    }

    pub fn edge_kind(&self, edge_id: i32) -> Option<EdgeKind> {
        self.dag.edge_weight(edge_index(edge_id as usize)).copied()
    }

    pub fn null_edge(&mut self, edge_id: i32) {
        if let Some(kind) = self.dag.edge_weight_mut(edge_index(edge_id as usize)) {
            *kind = EdgeKind::None;
        }
    }

    /// Non-null inbound edges of `id` as `(edge_id, from, kind)`.
    pub fn input_edges(&self, id: i32) -> Vec<(i32, i32, EdgeKind)> {
        let mut edges: Vec<(i32, i32, EdgeKind)> = self
            .dag
            .graph()
            .edges_directed(node_index(id as usize), Direction::Incoming)
            .filter(|e| *e.weight() != EdgeKind::None)
            .map(|e| (e.id().index() as i32, e.source().index() as i32, *e.weight()))
            .collect();
        edges.sort_by_key(|&(edge_id, _, _)| edge_id);
        edges
    }

    /// Non-null outbound edges of `id` as `(edge_id, to, kind)`.
    pub fn outbound_edges(&self, id: i32) -> Vec<(i32, i32, EdgeKind)> {
        let mut edges: Vec<(i32, i32, EdgeKind)> = self
            .dag
            .graph()
            .edges_directed(node_index(id as usize), Direction::Outgoing)
            .filter(|e| *e.weight() != EdgeKind::None)
            .map(|e| (e.id().index() as i32, e.target().index() as i32, *e.weight()))
            .collect();
        edges.sort_by_key(|&(edge_id, _, _)| edge_id);
        edges
    }

    /// Source node of the first inbound edge of the given kind.
    pub fn input_node(&self, id: i32, kind: EdgeKind) -> Option<i32> {
        self.input_edges(id)
            .into_iter()
            .find(|&(_, _, k)| k == kind)
            .map(|(_, from, _)| from)
    }

    /// Tombstones a node: params become `Null`, any result is dropped, and
    /// every touching edge becomes `EdgeKind::None`.
    pub fn tombstone_node(&mut self, id: i32) {
        let touching: Vec<i32> = self
            .dag
            .graph()
            .edges_directed(node_index(id as usize), Direction::Incoming)
            .chain(
                self.dag
                    .graph()
                    .edges_directed(node_index(id as usize), Direction::Outgoing),
            )
            .map(|e| e.id().index() as i32)
            .collect();
        for edge_id in touching {
            self.null_edge(edge_id);
        }
        if let Some(node) = self.node_mut(id) {
            node.params = NodeParams::Null;
            node.result = None;
        }
    }

    /// Structural validation: non-null edges must connect live nodes, and
    /// every live node must have the inbound edge counts its kind requires.
    pub fn validate(&self) -> Result<()> {
        for e in self.dag.graph().edge_references() {
            if *e.weight() == EdgeKind::None {
                continue;
            }
            let from = e.source().index() as i32;
            let to = e.target().index() as i32;
            if !self.is_live(from) || !self.is_live(to) {
                return Err(nerror!(
                    ErrorKind::GraphInvalid,
                    "Edge #{} ({:?}) connects node #{} to node #{}, but one of them is null",
                    e.id().index(),
                    e.weight(),
                    from,
                    to
                ));
            }
        }
        for id in self.live_nodes() {
            let kind = match self.node(id) {
                Some(n) => n.kind(),
                None => continue,
            };
            let inputs = self.input_edges(id);
            let input_count = inputs.iter().filter(|&&(_, _, k)| k == EdgeKind::Input).count();
            let canvas_count = inputs.iter().filter(|&&(_, _, k)| k == EdgeKind::Canvas).count();
            let (want_inputs, want_canvases) = nodes::edge_arity(kind);
            if input_count != want_inputs || canvas_count != want_canvases {
                return Err(nerror!(
                    ErrorKind::GraphInvalid,
                    "Node #{} ({:?}) has {} input and {} canvas edges; expected {} and {}",
                    id,
                    kind,
                    input_count,
                    canvas_count,
                    want_inputs,
                    want_canvases
                ));
            }
        }
        Ok(())
    }

    /// Writes the graph in Graphviz DOT form.
    pub fn write_dot<W: Write>(&self, out: &mut W) -> Result<()> {
        write!(out, "{:?}", Dot::new(self.dag.graph()))
            .map_err(|e| nerror!(ErrorKind::IoError, "Failed to write dot output: {}", e))
    }
}

impl Default for Graph {
    fn default() -> Graph {
        Graph::new()
    }
}

/// Visitor verdict for a single node. `SkipOutboundPaths` blocks every node
/// reachable only through this one; `Stop` aborts the walk immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitorAction {
    Continue,
    SkipOutboundPaths,
    Stop,
}

fn flag(flags: &[bool], id: i32) -> bool {
    flags.get(id as usize).copied().unwrap_or(false)
}

fn grow(flags: &mut Vec<bool>, bound: i32) {
    if flags.len() < bound as usize {
        flags.resize(bound as usize, false);
    }
}

/// Visits every reachable live node exactly once, every predecessor before
/// its successors, ids ascending within eligibility. The node-id bound is
/// re-read after each visit, so visitors may insert nodes; tombstoned ids are
/// never revisited.
pub fn graph_walk_dependency_wise<F>(job: &mut Job, g: &mut Graph, visitor: &mut F) -> Result<()>
where
    F: FnMut(&mut Job, &mut Graph, i32) -> Result<VisitorAction>,
{
    // resolved = visited, blocked, or null; dead = blocks outbound paths.
    let mut resolved: Vec<bool> = Vec::new();
    let mut dead: Vec<bool> = Vec::new();
    loop {
        let mut progress = false;
        let mut id: i32 = 0;
        while id < g.next_node_id() {
            grow(&mut resolved, g.next_node_id());
            grow(&mut dead, g.next_node_id());
            let ix = id as usize;
            if resolved[ix] {
                id += 1;
                continue;
            }
            if !g.is_live(id) {
                resolved[ix] = true;
                progress = true;
                id += 1;
                continue;
            }
            let inputs = g.input_edges(id);
            if inputs.iter().any(|&(_, from, _)| !flag(&resolved, from)) {
                id += 1;
                continue;
            }
            if !inputs.is_empty() && inputs.iter().all(|&(_, from, _)| flag(&dead, from)) {
                // Reachable only through skipped branches.
                dead[ix] = true;
                resolved[ix] = true;
                progress = true;
                id += 1;
                continue;
            }
            trace!("dependency-wise walk: visiting node #{}", id);
            match visitor(job, g, id)? {
                VisitorAction::Continue => {}
                VisitorAction::SkipOutboundPaths => dead[ix] = true,
                VisitorAction::Stop => return Ok(()),
            }
            resolved[ix] = true;
            progress = true;
            id += 1;
        }
        if !progress {
            return Ok(());
        }
    }
}

/// Visits every live node exactly once in ascending id order, regardless of
/// dependencies. Skip flags still block nodes reachable only through skipped
/// branches, to the extent the scan order has already revealed them.
pub fn graph_walk<F>(job: &mut Job, g: &mut Graph, visitor: &mut F) -> Result<()>
where
    F: FnMut(&mut Job, &mut Graph, i32) -> Result<VisitorAction>,
{
    let mut dead: Vec<bool> = Vec::new();
    let mut id: i32 = 0;
    while id < g.next_node_id() {
        grow(&mut dead, g.next_node_id());
        let ix = id as usize;
        if !g.is_live(id) {
            id += 1;
            continue;
        }
        let inputs = g.input_edges(id);
        if !inputs.is_empty() && inputs.iter().all(|&(_, from, _)| flag(&dead, from)) {
            dead[ix] = true;
            id += 1;
            continue;
        }
        trace!("free walk: visiting node #{}", id);
        match visitor(job, g, id)? {
            VisitorAction::Continue => {}
            VisitorAction::SkipOutboundPaths => dead[ix] = true,
            VisitorAction::Stop => return Ok(()),
        }
        id += 1;
    }
    Ok(())
}
