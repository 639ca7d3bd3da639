//! Structural invariant checks.
//!
//! Run after construction and between passes in debug builds; every breakage
//! here means an upstream stage handed over a malformed program.

use crate::impls::reachable;
use crate::{Block, Opcode, Program};
use anyhow::{Context, Result, ensure};
use id_arena::Id;

fn occurrences(edges: &[Id<Block>], needle: Id<Block>) -> usize {
    edges.iter().filter(|e| **e == needle).count()
}

fn check_block(program: &Program, id: Id<Block>) -> Result<()> {
    let block = &program.blocks[id];

    // Edge symmetry, with multiplicity: degenerate collapsed branches keep
    // two identical successor entries, and both must be mirrored.
    for succ in &block.linear_succs {
        ensure!(
            occurrences(&program.blocks[*succ].linear_preds, id)
                == occurrences(&block.linear_succs, *succ),
            "linear edge to BB{} is not mirrored",
            succ.index()
        );
    }
    for succ in &block.logical_succs {
        ensure!(
            occurrences(&program.blocks[*succ].logical_preds, id)
                == occurrences(&block.logical_succs, *succ),
            "logical edge to BB{} is not mirrored",
            succ.index()
        );
    }

    // Phis lead the block; control flow ends it.
    let first_non_phi = block
        .instructions
        .iter()
        .position(|i| !i.opcode.is_phi())
        .unwrap_or(block.instructions.len());
    for (pos, instr) in block.instructions.iter().enumerate() {
        ensure!(
            !instr.opcode.is_phi() || pos < first_non_phi,
            "phi after non-phi instruction"
        );
        ensure!(
            !instr.is_branch() || pos + 1 == block.instructions.len(),
            "branch in non-terminating position"
        );
        ensure!(
            instr.opcode != Opcode::EndProgram || pos + 1 == block.instructions.len(),
            "program end in non-terminating position"
        );
        if instr.opcode == Opcode::LinearPhi {
            ensure!(
                instr.operands.len() == block.linear_preds.len(),
                "linear phi operand count does not match predecessor count"
            );
        }
        if instr.opcode == Opcode::ParallelCopy {
            ensure!(
                instr.defs.len() == instr.operands.len(),
                "parallel copy with mismatched definition and operand counts"
            );
        }
    }

    match block.instructions.last() {
        Some(last) if last.is_branch() => {
            let mut targets: Vec<usize> = last.targets.iter().map(|t| t.index()).collect();
            let mut succs: Vec<usize> = block.linear_succs.iter().map(|s| s.index()).collect();
            targets.sort_unstable();
            succs.sort_unstable();
            ensure!(
                targets == succs,
                "branch targets {targets:?} do not agree with linear successors {succs:?}"
            );
            match last.opcode {
                Opcode::Branch => {
                    ensure!(last.operands.is_empty(), "unconditional branch with operands");
                    ensure!(
                        last.targets.len() == 1
                            || (last.targets.len() == 2 && last.targets[0] == last.targets[1]),
                        "unconditional branch with distinct targets"
                    );
                }
                _ => {
                    ensure!(last.operands.len() == 1, "conditional branch without predicate");
                    ensure!(last.targets.len() == 2, "conditional branch without two targets");
                }
            }
        }
        Some(last) if last.opcode == Opcode::EndProgram => {
            ensure!(
                block.linear_succs.is_empty(),
                "program end with linear successors"
            );
        }
        Some(_) => {
            // A branchless block falls through; never to more than one place.
            ensure!(
                block.linear_succs.len() <= 1,
                "fallthrough block with multiple linear successors"
            );
        }
        None => {
            ensure!(
                block.linear_preds.is_empty() && block.linear_succs.is_empty() || id == program.entry,
                "empty block still has linear edges"
            );
        }
    }
    Ok(())
}

pub fn validate(program: &Program) -> Result<()> {
    let live = reachable(program);
    for id in program.block_ids() {
        check_block(program, id).with_context(|| format!("BB{}", id.index()))?;
        if !live.contains(&id) {
            let block = &program.blocks[id];
            ensure!(
                block.instructions.is_empty() && block.linear_preds.is_empty(),
                "unreachable BB{} still carries instructions or edges",
                id.index()
            );
        }
    }
    Ok(())
}
