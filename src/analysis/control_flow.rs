//! Control-flow graph construction over a method body
//!
//! The graph is built in four steps, mirroring the classic presentation:
//! leader analysis marks the instructions that must start a basic block, the
//! sorted leader set partitions the sequence into contiguous non-empty blocks,
//! edges are derived from each block's terminating instruction (with synthetic
//! entry and exit sentinels guaranteeing single entry and exit points), and
//! finally every node is numbered with its position in the reverse postorder
//! of the forward graph and of the transpose graph.
//!
//! Both numberings are total even when the body contains unreachable code:
//! any node the depth-first traversal missed is retried as an extra root, in
//! the fixed order of the node array, so identical input always yields
//! identical numbers. The numbering (exported through
//! [`ControlFlowGraph::reverse_post_order_successors`]) is the iteration
//! order that downstream iterative fixed-point passes, dominator computation
//! first among them, rely on.
//!
//! A built graph is immutable: the indices never change once assigned, and
//! the graph is discarded wholesale once the successor map has been handed
//! off.

use super::Error;
use crate::jvm::{Insn, Label};
use crate::util::BitSet;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

/// Identifier of a node in a [`ControlFlowGraph`]
///
/// Node 0 is the entry sentinel, nodes `1..=N` the basic blocks in sequence
/// order, and node `N + 1` the exit sentinel.
#[derive(Copy, Clone, Eq, PartialEq, Hash)]
pub struct NodeId(usize);

impl fmt::Debug for NodeId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("n{}", self.0))
    }
}

/// Maximal straight-line run of instructions
///
/// A block covers the half-open range `[start, end)` of the method sequence
/// and owns a copy of those instructions. Its identity is its position in the
/// block array.
#[derive(Clone, Debug, PartialEq)]
pub struct BasicBlock {
    /// Index in the method sequence of the first instruction in this block
    pub start: usize,

    /// Index in the method sequence just past the last instruction in this
    /// block
    pub end: usize,

    /// Copy of the instructions in `start..end`
    pub instructions: Vec<Insn>,
}

impl BasicBlock {
    fn new(instructions: &[Insn], start: usize, end: usize) -> BasicBlock {
        // an empty or inverted range can only come from a bug in leader
        // computation, never from caller input
        assert!(
            start < end,
            "invalid range for basic block: [{}, {})",
            start,
            end,
        );
        BasicBlock {
            start,
            end,
            instructions: instructions[start..end].to_vec(),
        }
    }

    pub fn first_insn(&self) -> &Insn {
        &self.instructions[0]
    }

    pub fn last_insn(&self) -> &Insn {
        &self.instructions[self.instructions.len() - 1]
    }
}

/// What a graph node stands for
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Synthetic single entry point; carries no instructions
    Entry,

    /// Synthetic single exit point; carries no instructions
    Exit,

    Block(BasicBlock),
}

struct Node {
    kind: NodeKind,

    /// Nodes this node has an edge to, in edge-discovery order, deduplicated
    successors: SmallVec<[NodeId; 2]>,

    /// Nodes with an edge to this node, in edge-discovery order, deduplicated
    predecessors: SmallVec<[NodeId; 2]>,

    /// 1-based position in the reverse postorder of the forward graph, or 0
    /// until the numberer has run
    reverse_post_order_index: u32,

    /// 1-based position in the reverse postorder of the transpose graph, or 0
    /// until the numberer has run
    transpose_reverse_post_order_index: u32,
}

impl Node {
    fn new(kind: NodeKind) -> Node {
        Node {
            kind,
            successors: SmallVec::new(),
            predecessors: SmallVec::new(),
            reverse_post_order_index: 0,
            transpose_reverse_post_order_index: 0,
        }
    }
}

/// Control-flow graph of one method body
///
/// Immutable once [`ControlFlowGraph::analyze`] returns; safe to share
/// read-only across threads.
pub struct ControlFlowGraph {
    nodes: Vec<Node>,
}

impl ControlFlowGraph {
    /// The entry sentinel
    pub const ENTRY: NodeId = NodeId(0);

    /// Build the control-flow graph for a method body
    pub fn analyze(instructions: &[Insn]) -> Result<ControlFlowGraph, Error> {
        if instructions.is_empty() {
            return Err(Error::EmptyMethodBody);
        }

        let label_indices = label_instruction_indices(instructions);
        let leaders = leaders(instructions, &label_indices)?;
        let blocks = basic_blocks(instructions, &leaders);
        let label_blocks = label_block_indices(&blocks);
        let edges = control_flow_edges(&blocks, &label_blocks)?;
        log::trace!(
            "partitioned {} instructions into {} basic blocks ({} edges)",
            instructions.len(),
            blocks.len(),
            edges.len(),
        );

        let mut nodes = Vec::with_capacity(blocks.len() + 2);
        nodes.push(Node::new(NodeKind::Entry));
        nodes.extend(blocks.into_iter().map(|block| Node::new(NodeKind::Block(block))));
        nodes.push(Node::new(NodeKind::Exit));
        for (from, to) in edges {
            nodes[from].successors.push(NodeId(to));
            nodes[to].predecessors.push(NodeId(from));
        }

        number_nodes(&mut nodes);
        Ok(ControlFlowGraph { nodes })
    }

    /// The exit sentinel
    pub fn exit(&self) -> NodeId {
        NodeId(self.nodes.len() - 1)
    }

    /// Total node count: one entry, one exit, and every basic block
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// All node identifiers, in node-array order
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> {
        (0..self.nodes.len()).map(NodeId)
    }

    /// The basic blocks, in sequence order
    pub fn blocks(&self) -> impl Iterator<Item = (NodeId, &BasicBlock)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| match &node.kind {
                NodeKind::Block(block) => Some((NodeId(index), block)),
                _ => None,
            })
    }

    pub fn kind(&self, node: NodeId) -> &NodeKind {
        &self.nodes[node.0].kind
    }

    pub fn successors(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].successors
    }

    pub fn predecessors(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node.0].predecessors
    }

    /// 1-based position of the node in the reverse postorder of the forward
    /// graph (1 = earliest)
    pub fn reverse_post_order_index(&self, node: NodeId) -> u32 {
        self.nodes[node.0].reverse_post_order_index
    }

    /// 1-based position of the node in the reverse postorder of the transpose
    /// graph (1 = earliest)
    pub fn transpose_reverse_post_order_index(&self, node: NodeId) -> u32 {
        self.nodes[node.0].transpose_reverse_post_order_index
    }

    /// Successor map keyed by forward reverse-postorder index
    ///
    /// This is the artifact handed to the dominator computation: node
    /// identity does not survive the export, only the index space does.
    /// Successor lists keep edge-discovery order.
    pub fn reverse_post_order_successors(&self) -> FxHashMap<u32, Vec<u32>> {
        let mut map = FxHashMap::default();
        map.reserve(self.nodes.len());
        for node in &self.nodes {
            let successors: Vec<u32> = node
                .successors
                .iter()
                .map(|successor| self.nodes[successor.0].reverse_post_order_index)
                .collect();
            map.insert(node.reverse_post_order_index, successors);
        }
        map
    }
}

/// Map each label to the sequence index of its pseudo-instruction
fn label_instruction_indices(instructions: &[Insn]) -> FxHashMap<Label, usize> {
    let mut map = FxHashMap::default();
    for (index, insn) in instructions.iter().enumerate() {
        if let Insn::Label(label) = insn {
            map.insert(*label, index);
        }
    }
    map
}

/// Indices of instructions that must begin a basic block
///
/// The returned set is ascending and deduplicated, always contains 0, and may
/// contain the sequence length (such an entry starts no block).
fn leaders(
    instructions: &[Insn],
    label_indices: &FxHashMap<Label, usize>,
) -> Result<BitSet, Error> {
    let mut leaders = BitSet::new(instructions.len() + 1);
    leaders.insert(0); // first instruction leads the first block
    for (index, insn) in instructions.iter().enumerate() {
        match insn {
            Insn::Goto(target)
            | Insn::If(_, target)
            | Insn::IfICmp(_, target)
            | Insn::IfACmp(_, target)
            | Insn::IfNull(_, target) => {
                leaders.insert(resolve_label(target, label_indices)?);
                leaders.insert(index + 1);
            }
            Insn::TableSwitch {
                default, targets, ..
            } => {
                leaders.insert(resolve_label(default, label_indices)?);
                for target in targets {
                    leaders.insert(resolve_label(target, label_indices)?);
                }
                leaders.insert(index + 1);
            }
            Insn::LookupSwitch { default, targets } => {
                leaders.insert(resolve_label(default, label_indices)?);
                for (_, target) in targets {
                    leaders.insert(resolve_label(target, label_indices)?);
                }
                leaders.insert(index + 1);
            }
            insn if insn.is_exit() => {
                leaders.insert(index + 1);
            }
            _ => {}
        }
    }
    Ok(leaders)
}

fn resolve_label<V: Copy>(label: &Label, indices: &FxHashMap<Label, V>) -> Result<V, Error> {
    indices.get(label).copied().ok_or_else(|| {
        log::error!("branch target {:?} does not resolve to any instruction", label);
        Error::DanglingLabel(*label)
    })
}

/// Partition the sequence into contiguous blocks, one per leader below the
/// sequence length
fn basic_blocks(instructions: &[Insn], leaders: &BitSet) -> Vec<BasicBlock> {
    let starts: Vec<usize> = leaders
        .iter()
        .filter(|leader| *leader < instructions.len())
        .collect();
    let mut blocks = Vec::with_capacity(starts.len());
    for (block_index, &start) in starts.iter().enumerate() {
        let end = starts
            .get(block_index + 1)
            .copied()
            .unwrap_or(instructions.len());
        blocks.push(BasicBlock::new(instructions, start, end));
    }
    blocks
}

/// Map each label to the index of the basic block it starts
fn label_block_indices(blocks: &[BasicBlock]) -> FxHashMap<Label, usize> {
    let mut map = FxHashMap::default();
    for (index, block) in blocks.iter().enumerate() {
        if let Insn::Label(label) = block.first_insn() {
            map.insert(*label, index);
        }
    }
    map
}

/// Derive every edge of the graph as `(from, to)` pairs over node indices
///
/// The entry sentinel gets its single edge to the first block; every block
/// gets edges according to its terminating instruction. Branch targets are
/// collected through a bit set keyed by block index so that repeated targets
/// (eg. two switch cases sharing a label, or a conditional branch whose
/// target equals its fallthrough) collapse into a single edge.
fn control_flow_edges(
    blocks: &[BasicBlock],
    label_blocks: &FxHashMap<Label, usize>,
) -> Result<Vec<(usize, usize)>, Error> {
    let block_count = blocks.len();
    let exit = block_count + 1;
    let mut edges = vec![(0, 1)];
    for (block_index, block) in blocks.iter().enumerate() {
        let node = block_index + 1;
        let mut targets = BitSet::new(block_count);
        match block.last_insn() {
            Insn::Goto(target) => {
                targets.insert(resolve_label(target, label_blocks)?);
            }
            Insn::If(_, target)
            | Insn::IfICmp(_, target)
            | Insn::IfACmp(_, target)
            | Insn::IfNull(_, target) => {
                targets.insert(resolve_label(target, label_blocks)?);
                if block_index + 1 < block_count {
                    targets.insert(block_index + 1);
                }
            }
            Insn::TableSwitch {
                default, targets: switch_targets, ..
            } => {
                targets.insert(resolve_label(default, label_blocks)?);
                for target in switch_targets {
                    targets.insert(resolve_label(target, label_blocks)?);
                }
            }
            Insn::LookupSwitch {
                default,
                targets: switch_targets,
            } => {
                targets.insert(resolve_label(default, label_blocks)?);
                for (_, target) in switch_targets {
                    targets.insert(resolve_label(target, label_blocks)?);
                }
            }
            insn if insn.is_exit() => {
                edges.push((node, exit));
            }
            _ => {
                if block_index + 1 < block_count {
                    targets.insert(block_index + 1);
                }
            }
        }
        edges.extend(targets.iter().map(|target| (node, target + 1)));
    }
    Ok(edges)
}

/// Assign both reverse-postorder numberings
///
/// The forward pass walks successor edges rooted at the entry sentinel; the
/// transpose pass walks predecessor edges rooted at the exit sentinel. Either
/// way, nodes the traversal missed (unreachable code) are retried as extra
/// roots in node-array order, so the numbering is a total bijection onto
/// `1..=node_count` and reproducible across runs.
fn number_nodes(nodes: &mut [Node]) {
    let node_count = nodes.len();
    let exit = node_count - 1;

    let forward_roots: Vec<usize> = (0..node_count).collect();
    let order = depth_first_finish_order(nodes, &forward_roots, false);
    for (position, node_index) in order.into_iter().rev().enumerate() {
        nodes[node_index].reverse_post_order_index = position as u32 + 1;
    }

    let mut transpose_roots = Vec::with_capacity(node_count);
    transpose_roots.push(exit);
    transpose_roots.extend(1..exit);
    transpose_roots.push(0);
    let order = depth_first_finish_order(nodes, &transpose_roots, true);
    for (position, node_index) in order.into_iter().rev().enumerate() {
        nodes[node_index].transpose_reverse_post_order_index = position as u32 + 1;
    }
}

/// Nodes in depth-first finish order, over successor edges (or predecessor
/// edges when `transpose` is set)
///
/// The traversal keeps its own explicit stack: block counts are bounded only
/// by method size, and deep methods must not overflow the native call stack.
fn depth_first_finish_order(nodes: &[Node], roots: &[usize], transpose: bool) -> Vec<usize> {
    let mut visited = BitSet::new(nodes.len());
    let mut finished = Vec::with_capacity(nodes.len());
    let mut stack: Vec<(usize, usize)> = Vec::new();
    for &root in roots {
        if !visited.insert(root) {
            continue;
        }
        stack.push((root, 0));
        while !stack.is_empty() {
            let top = stack.len() - 1;
            let (node_index, cursor) = stack[top];
            let adjacent = if transpose {
                &nodes[node_index].predecessors
            } else {
                &nodes[node_index].successors
            };
            match adjacent.get(cursor) {
                Some(&NodeId(next)) => {
                    stack[top].1 += 1;
                    if visited.insert(next) {
                        stack.push((next, 0));
                    }
                }
                None => {
                    stack.pop();
                    finished.push(node_index);
                }
            }
        }
    }
    finished
}
