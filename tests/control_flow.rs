use pretty_assertions::assert_eq;
use shadeflow::analysis::{ControlFlowGraph, NodeKind};
use shadeflow::jvm::{EqComparison, Insn, Label, OrdComparison};

/// `[push-const, store-local-0, jump L, L: load-local-0, return]` splits into
/// two blocks chained from entry to exit.
#[test]
fn jump_over_a_label_makes_two_chained_blocks() {
    let l0 = Label::new(0);
    let cfg = ControlFlowGraph::analyze(&[
        Insn::IConst(1),
        Insn::IStore(0),
        Insn::Goto(l0),
        Insn::Label(l0),
        Insn::ILoad(0),
        Insn::IReturn,
    ])
    .unwrap();

    let blocks: Vec<_> = cfg.blocks().collect();
    assert_eq!(blocks.len(), 2);
    let (first, second) = (blocks[0].0, blocks[1].0);

    assert_eq!(cfg.successors(ControlFlowGraph::ENTRY), &[first]);
    assert_eq!(cfg.successors(first), &[second]);
    assert_eq!(cfg.successors(second), &[cfg.exit()]);
    assert!(cfg.successors(cfg.exit()).is_empty());

    // reverse postorder runs entry, first, second, exit
    let map = cfg.reverse_post_order_successors();
    assert_eq!(map.len(), 4);
    assert_eq!(map[&1], vec![2]);
    assert_eq!(map[&2], vec![3]);
    assert_eq!(map[&3], vec![4]);
    assert_eq!(map[&4], Vec::<u32>::new());
}

/// A conditional branch block has exactly two successors: its target and the
/// block that follows it in sequence.
#[test]
fn conditional_branch_reaches_target_and_fallthrough() {
    let l0 = Label::new(0);
    let cfg = ControlFlowGraph::analyze(&[
        Insn::ILoad(0),
        Insn::If(OrdComparison::EQ, l0),
        Insn::IConst(1),
        Insn::IReturn,
        Insn::Label(l0),
        Insn::IConst(0),
        Insn::IReturn,
    ])
    .unwrap();

    let blocks: Vec<_> = cfg.blocks().collect();
    assert_eq!(blocks.len(), 3);
    let branching = blocks[0].0;
    let fallthrough = blocks[1].0;
    let target = blocks[2].0;

    let successors = cfg.successors(branching);
    assert_eq!(successors.len(), 2);
    assert!(successors.contains(&fallthrough));
    assert!(successors.contains(&target));
    assert!(cfg.predecessors(fallthrough).contains(&branching));
    assert!(cfg.predecessors(target).contains(&branching));
}

/// A conditional branch whose target coincides with its fallthrough still
/// produces a single (deduplicated) edge.
#[test]
fn branch_to_own_fallthrough_is_one_edge() {
    let l0 = Label::new(0);
    let cfg = ControlFlowGraph::analyze(&[
        Insn::ILoad(0),
        Insn::IfNull(EqComparison::EQ, l0),
        Insn::Label(l0),
        Insn::Return,
    ])
    .unwrap();

    let blocks: Vec<_> = cfg.blocks().collect();
    assert_eq!(blocks.len(), 2);
    assert_eq!(cfg.successors(blocks[0].0), &[blocks[1].0]);
}

/// A switch with a default and three case targets, two of which coincide,
/// gets three successors, not four.
#[test]
fn switch_targets_are_deduplicated() {
    let shared = Label::new(0);
    let other = Label::new(1);
    let default = Label::new(2);
    let cfg = ControlFlowGraph::analyze(&[
        Insn::ILoad(0),
        Insn::TableSwitch {
            default,
            low: 0,
            targets: vec![shared, other, shared],
        },
        Insn::Label(shared),
        Insn::IConst(1),
        Insn::IReturn,
        Insn::Label(other),
        Insn::IConst(2),
        Insn::IReturn,
        Insn::Label(default),
        Insn::IConst(3),
        Insn::IReturn,
    ])
    .unwrap();

    let blocks: Vec<_> = cfg.blocks().collect();
    assert_eq!(blocks.len(), 4);
    let switch_block = blocks[0].0;

    let successors = cfg.successors(switch_block);
    assert_eq!(successors.len(), 3);
    for (id, _) in &blocks[1..] {
        assert!(successors.contains(id));
    }

    // every case block returns, so each one feeds the exit sentinel
    assert_eq!(cfg.predecessors(cfg.exit()).len(), 3);
}

/// Entry always has out-degree one (to the first block); exit in-degree
/// matches the number of blocks ending in an exit instruction.
#[test]
fn sentinel_degrees() {
    let l0 = Label::new(0);
    let cfg = ControlFlowGraph::analyze(&[
        Insn::ILoad(0),
        Insn::If(OrdComparison::GT, l0),
        Insn::AConstNull,
        Insn::AThrow,
        Insn::Label(l0),
        Insn::Return,
    ])
    .unwrap();

    assert_eq!(cfg.successors(ControlFlowGraph::ENTRY).len(), 1);
    assert_eq!(cfg.predecessors(ControlFlowGraph::ENTRY).len(), 0);
    // one block throws, one returns
    assert_eq!(cfg.predecessors(cfg.exit()).len(), 2);
    assert_eq!(cfg.successors(cfg.exit()).len(), 0);
}

/// Both numberings are bijections onto `1..=node_count`, even when part of
/// the graph is unreachable from entry (and, in the transpose, from exit).
#[test]
fn numberings_are_total_bijections() {
    let loop_head = Label::new(0);
    // an infinite loop: exit is unreachable forward, entry unreachable in the
    // transpose
    let cfg = ControlFlowGraph::analyze(&[Insn::Label(loop_head), Insn::Goto(loop_head)]).unwrap();

    let node_count = cfg.node_count() as u32;
    let mut forward: Vec<u32> = cfg
        .node_ids()
        .map(|node| cfg.reverse_post_order_index(node))
        .collect();
    let mut transpose: Vec<u32> = cfg
        .node_ids()
        .map(|node| cfg.transpose_reverse_post_order_index(node))
        .collect();
    forward.sort_unstable();
    transpose.sort_unstable();
    assert_eq!(forward, (1..=node_count).collect::<Vec<u32>>());
    assert_eq!(transpose, (1..=node_count).collect::<Vec<u32>>());

    // the self-loop shows up in the exported successor map
    let map = cfg.reverse_post_order_successors();
    let (block_id, _) = cfg.blocks().next().unwrap();
    let block_rpo = cfg.reverse_post_order_index(block_id);
    assert_eq!(map[&block_rpo], vec![block_rpo]);
}

/// Sentinels carry no instructions; every instruction lives in exactly one
/// block.
#[test]
fn kinds_partition_the_graph() {
    let l0 = Label::new(0);
    let instructions = [
        Insn::ILoad(0),
        Insn::If(OrdComparison::NE, l0),
        Insn::IConst(1),
        Insn::IReturn,
        Insn::Label(l0),
        Insn::IConst(0),
        Insn::IReturn,
    ];
    let cfg = ControlFlowGraph::analyze(&instructions).unwrap();

    let mut covered = 0;
    let mut sentinels = 0;
    for node in cfg.node_ids() {
        match cfg.kind(node) {
            NodeKind::Entry | NodeKind::Exit => sentinels += 1,
            NodeKind::Block(block) => {
                assert_eq!(block.start, covered);
                covered = block.end;
            }
        }
    }
    assert_eq!(sentinels, 2);
    assert_eq!(covered, instructions.len());
}
