//! Post-RA exec-mask jump threading.
//!
//! A single backward walk over the program that (a) tracks where the
//! active-lane mask is actually needed, deleting writes nobody reads,
//! (b) rewrites the compute-then-copy-to-exec sequence ahead of divergent
//! branches so the producing instruction writes exec directly, and
//! (c) splices out blocks that only exist to carry control flow: empty
//! simple blocks, merge blocks, inverted-condition blocks, and the
//! two-block break/continue tail of divergent loops.
//!
//! Blocks are visited from the highest arena index to the lowest. Forward
//! successors always have a strictly higher index, so their liveness is
//! known by the time it is needed; back-edge targets keep the conservative
//! default. The walk is deliberately not iterated to a fixed point.

use std::mem::take;

use bitvec::prelude::*;
use id_arena::Id;

use crate::{
    Block, BlockKind, Definition, EXEC_HI, EXEC_LO, HwGen, InstrFlags, Instruction, Opcode,
    Operand, PhysReg, Program, RegClass, RegSpan, SCC, exec_span,
};

struct JumpThreadingCtx<'a> {
    program: &'a mut Program,
    /// Dense block-index to id table, in arena order.
    ids: Vec<Id<Block>>,
    /// Whether the block still needs the exec mask its predecessors leave
    /// behind. All-true until a block is scanned, which keeps back-edge
    /// targets conservative.
    incoming_exec_used: BitVec,
}

impl<'a> JumpThreadingCtx<'a> {
    fn new(program: &'a mut Program) -> JumpThreadingCtx<'a> {
        let ids = program.block_ids();
        let incoming_exec_used = bitvec![1; ids.len()];
        JumpThreadingCtx {
            program,
            ids,
            incoming_exec_used,
        }
    }
}

/// Whether the block carries no state of its own: phis, boundary markers,
/// unconditional branches, no-op copies, and (optionally) writes that only
/// touch exec. A conditional branch reads its predicate, so it never counts
/// as empty.
fn is_empty_block(block: &Block, ignore_exec_writes: bool) -> bool {
    block.instructions.iter().all(|instr| match instr.opcode {
        Opcode::Phi
        | Opcode::LinearPhi
        | Opcode::LogicalStart
        | Opcode::LogicalEnd
        | Opcode::Branch => true,
        Opcode::ParallelCopy => instr
            .defs
            .iter()
            .zip(&instr.operands)
            .all(|(def, op)| {
                (ignore_exec_writes && def.reg == EXEC_LO) || op.reg() == Some(def.reg)
            }),
        Opcode::SAndNot => ignore_exec_writes && instr.defs[0].reg == EXEC_LO,
        _ => false,
    })
}

fn trailing_branch(block: &mut Block) -> &mut Instruction {
    let branch = block
        .instructions
        .last_mut()
        .expect("connected block ends in a branch");
    assert!(branch.is_branch());
    branch
}

/// Strip a merge or loop-exit block down to its terminating branch.
fn try_remove_merge_block(ctx: &mut JumpThreadingCtx, block_id: Id<Block>) {
    let block = &ctx.program.blocks[block_id];
    if block.linear_succs.len() != 1 {
        return;
    }
    let succ = block.linear_succs[0];

    // A successor with a smaller index has not been scanned yet; its
    // incoming bit is still the conservative default.
    let ignore_exec_writes =
        !ctx.incoming_exec_used[succ.index()] && block_id.index() < succ.index();
    if !is_empty_block(block, ignore_exec_writes) {
        return;
    }

    let block = &mut ctx.program.blocks[block_id];
    let branch = block
        .instructions
        .pop()
        .expect("connected block ends in a branch");
    block.instructions.clear();
    block.instructions.push(branch);
}

/// Splice out an inverted-condition block once both of its successor edges
/// lead to the same place.
fn try_remove_invert_block(ctx: &mut JumpThreadingCtx, block_id: Id<Block>) {
    let block = &ctx.program.blocks[block_id];
    assert_eq!(block.linear_succs.len(), 2);
    if block.linear_succs[0] != block.linear_succs[1] {
        return;
    }

    let succ = block.linear_succs[0];
    assert!(block_id.index() < succ.index());

    if !is_empty_block(block, !ctx.incoming_exec_used[succ.index()]) {
        return;
    }

    assert_eq!(block.linear_preds.len(), 2);
    let preds = [block.linear_preds[0], block.linear_preds[1]];
    for (i, pred_id) in preds.into_iter().enumerate() {
        {
            let pred = &mut ctx.program.blocks[pred_id];
            pred.linear_succs[0] = succ;
            let branch = trailing_branch(pred);
            for t in branch.targets.iter_mut() {
                *t = succ;
            }
        }
        ctx.program.blocks[succ].linear_preds[i] = pred_id;
    }

    let block = &mut ctx.program.blocks[block_id];
    block.instructions.clear();
    block.linear_preds.clear();
    block.linear_succs.clear();
}

/// Splice out an empty block with one predecessor and one successor by
/// retargeting the predecessor's branch.
fn try_remove_simple_block(ctx: &mut JumpThreadingCtx, block_id: Id<Block>) {
    let block = &ctx.program.blocks[block_id];
    if block.linear_succs.len() != 1 || !is_empty_block(block, false) {
        return;
    }
    let pred_id = block.linear_preds[0];
    let succ_id = block.linear_succs[0];

    let last = ctx.program.blocks[pred_id]
        .instructions
        .last()
        .expect("predecessor ends in a branch");
    assert!(last.is_branch());
    let opcode = last.opcode;
    let targets = last.targets.clone();

    if opcode == Opcode::Branch {
        let branch = trailing_branch(&mut ctx.program.blocks[pred_id]);
        for t in branch.targets.iter_mut() {
            *t = succ_id;
        }
    } else if targets[0] == block_id {
        trailing_branch(&mut ctx.program.blocks[pred_id]).targets[0] = succ_id;
    } else if targets[0] == succ_id {
        assert_eq!(targets[1], block_id);
        trailing_branch(&mut ctx.program.blocks[pred_id]).targets[1] = succ_id;
    } else if targets[1] == block_id {
        // The block sits on the fallthrough path. Keep it there if the
        // gap to the successor is all empty blocks.
        let mut falls_through = block_id.index() < succ_id.index();
        if falls_through {
            for j in block_id.index() + 1..succ_id.index() {
                if !ctx.program.blocks[ctx.ids[j]].instructions.is_empty() {
                    falls_through = false;
                    break;
                }
            }
        }
        if falls_through {
            trailing_branch(&mut ctx.program.blocks[pred_id]).targets[1] = succ_id;
        } else {
            // Otherwise the taken target must be reachable by fallthrough.
            let taken = targets[0];
            if block_id.index() >= taken.index() {
                return;
            }
            for j in block_id.index() + 1..taken.index() {
                if !ctx.program.blocks[ctx.ids[j]].instructions.is_empty() {
                    return;
                }
            }

            // A uniform break or continue block; invert the condition.
            let pred = &mut ctx.program.blocks[pred_id];
            let branch = trailing_branch(pred);
            branch.opcode = match branch.opcode {
                Opcode::BranchZ => Opcode::BranchNz,
                Opcode::BranchNz => Opcode::BranchZ,
                _ => unreachable!("conditional branch expected"),
            };
            branch.targets[1] = branch.targets[0];
            branch.targets[0] = succ_id;
            pred.linear_succs[0] = pred.linear_succs[1];
            pred.linear_succs[1] = succ_id;
        }
    } else {
        unreachable!("spliced block is not a target of its predecessor");
    }

    {
        let pred = &mut ctx.program.blocks[pred_id];
        let branch = trailing_branch(pred);
        if branch.opcode != Opcode::Branch && branch.targets[0] == branch.targets[1] {
            branch.operands.clear();
            branch.opcode = Opcode::Branch;
        }
        for s in pred.linear_succs.iter_mut() {
            if *s == block_id {
                *s = succ_id;
            }
        }
    }
    for p in ctx.program.blocks[succ_id].linear_preds.iter_mut() {
        if *p == block_id {
            *p = pred_id;
        }
    }

    let block = &mut ctx.program.blocks[block_id];
    block.instructions.clear();
    block.linear_preds.clear();
    block.linear_succs.clear();
}

/// Remove one linear edge, keeping phi operands aligned with the
/// predecessor list of the target.
fn remove_linear_edge(ctx: &mut JumpThreadingCtx, from: Id<Block>, to: Id<Block>) {
    let succs = &mut ctx.program.blocks[from].linear_succs;
    if let Some(i) = succs.iter().position(|s| *s == to) {
        succs.remove(i);
    }
    let pos = ctx.program.blocks[to]
        .linear_preds
        .iter()
        .position(|p| *p == from);
    if let Some(i) = pos {
        let to_block = &mut ctx.program.blocks[to];
        to_block.linear_preds.remove(i);
        for instr in to_block.instructions.iter_mut() {
            if instr.opcode == Opcode::LinearPhi {
                instr.operands.remove(i);
            }
        }
    }
}

/// Fuse the mask update of a divergent loop break into its continue merge
/// block:
///
/// ```text
/// BB1:  ...                      p_cbranch_z exec BB3, BB2
/// BB2:  ...  s0, scc = s_andn2 s0, exec
///            p_cbranch_z scc BB4, BB3
/// BB3:  exec = p_parallelcopy s0
///            p_branch BB1
/// BB4:  ...
/// ```
///
/// becomes
///
/// ```text
/// BB2:  ...  p_branch BB3
/// BB3:  s0, scc, exec = s_andn2_wrexec s0, exec
///            p_cbranch_nz scc BB1, BB4
/// ```
fn try_merge_break_with_continue(ctx: &mut JumpThreadingCtx, block_id: Id<Block>) {
    let lm = ctx.program.lane_mask;

    let block = &ctx.program.blocks[block_id];
    if block.linear_succs.len() != 2 || block.instructions.len() < 2 {
        return;
    }

    let branch = &block.instructions[block.instructions.len() - 1];
    if branch.opcode != Opcode::BranchZ || branch.operands[0].reg() != Some(SCC) {
        return;
    }
    let exit_id = branch.targets[0];
    let merge_id = branch.targets[1];

    // The merge block is just a jump back to the loop header.
    if ctx.program.blocks[merge_id].linear_succs.len() != 1 {
        return;
    }

    // The loop exit becomes the merge block's fallthrough, so nothing may
    // sit between them.
    for j in merge_id.index() + 1..exit_id.index() {
        if !ctx.program.blocks[ctx.ids[j]].instructions.is_empty() {
            return;
        }
    }

    // Every other path into the merge block must enter with no active
    // lanes, otherwise the fused instruction corrupts exec.
    let merge_preds = ctx.program.blocks[merge_id].linear_preds.clone();
    for pred_id in merge_preds {
        if pred_id == block_id {
            continue;
        }
        let Some(pred_branch) = ctx.program.blocks[pred_id].instructions.last() else {
            return;
        };
        if pred_branch.opcode != Opcode::BranchZ
            || pred_branch.operands[0].reg() != Some(EXEC_LO)
        {
            return;
        }
    }

    // Merge block: copy to exec, the logical markers, and the branch.
    let merge = &ctx.program.blocks[merge_id];
    if merge.instructions.len() != 4 || !is_empty_block(merge, true) {
        return;
    }
    let execwrite = &merge.instructions[0];
    if !execwrite.is_simple_copy() || execwrite.defs[0].reg != EXEC_LO {
        return;
    }
    let Some(saved) = execwrite.operands[0].reg() else {
        return;
    };

    let block = &ctx.program.blocks[block_id];
    let andn2_pos = block.instructions.len() - 2;
    let execsrc = &block.instructions[andn2_pos];
    if execsrc.opcode != Opcode::SAndNot
        || execsrc.defs[0].reg != saved
        || execsrc.defs[0].rc != lm
        || execsrc.operands[0].reg() != Some(saved)
        || execsrc.operands[1].reg() != Some(EXEC_LO)
    {
        return;
    }

    // Move the mask update into the merge block.
    let andn2 = ctx.program.blocks[block_id].instructions.remove(andn2_pos);
    ctx.program.blocks[merge_id].instructions.insert(0, andn2);

    let header_id = ctx.program.blocks[merge_id].linear_succs[0];

    // The break block's conditional branch moves into the merge block and
    // keeps looping while lanes remain; the merge block's old jump to the
    // header becomes the break block's jump into the merge block.
    {
        let branch = trailing_branch(&mut ctx.program.blocks[block_id]);
        branch.opcode = Opcode::BranchNz;
        branch.targets[0] = header_id;
        branch.targets[1] = exit_id;
    }
    {
        let branch = trailing_branch(&mut ctx.program.blocks[merge_id]);
        for t in branch.targets.iter_mut() {
            *t = merge_id;
        }
    }
    let merge_branch = ctx.program.blocks[merge_id]
        .instructions
        .pop()
        .expect("merge block ends in a branch");
    let block_branch = ctx.program.blocks[block_id]
        .instructions
        .pop()
        .expect("break block ends in a branch");
    ctx.program.blocks[merge_id].instructions.push(block_branch);
    ctx.program.blocks[block_id].instructions.push(merge_branch);

    let block = &mut ctx.program.blocks[block_id];
    block.linear_succs.clear();
    block.linear_succs.push(merge_id);
    let merge = &mut ctx.program.blocks[merge_id];
    merge.linear_succs.push(exit_id);
    merge.linear_succs.swap(0, 1);
    ctx.incoming_exec_used.set(merge_id.index(), true);

    for p in ctx.program.blocks[exit_id].linear_preds.iter_mut() {
        if *p == block_id {
            *p = merge_id;
        }
    }

    if ctx.program.r#gen < HwGen::Gfx9 {
        return;
    }

    // Combine the AND-NOT and the copy to exec into one instruction.
    let merge = &mut ctx.program.blocks[merge_id];
    let andn2 = merge.instructions.remove(0);
    merge.instructions[0] = Instruction::with(
        Opcode::SAndNotWrExec,
        vec![andn2.defs[0], andn2.defs[1], Definition::of(EXEC_LO, lm)],
        andn2.operands,
    );
}

/// Try to move a freshly required exec save out of a loop. The pattern is
/// produced by [`try_optimize_branching_sequence`] on a loop header: the
/// save is only needed on the first iteration when the continue edge
/// already leaves the same mask in the saved register.
fn try_hoist_exec_save(
    ctx: &mut JumpThreadingCtx,
    header_id: Id<Block>,
    header_code: &[Option<Instruction>],
    save: &Instruction,
    save_pos: usize,
) -> bool {
    let lm = ctx.program.lane_mask;
    let exec = exec_span(lm);

    let header = &ctx.program.blocks[header_id];
    if header.linear_preds.len() != 2 {
        return false;
    }
    let preheader_id = header.linear_preds[0];
    let cont_id = header.linear_preds[1];
    assert!(
        ctx.program.blocks[preheader_id]
            .kind
            .contains(BlockKind::LOOP_PREHEADER),
        "loop header's first predecessor is not the preheader"
    );

    let saved = save.defs[0];

    // The header prefix must leave both exec and the save destination
    // alone, or moving the save changes what it observes.
    for slot in &header_code[..save_pos] {
        let Some(instr) = slot else { continue };
        if instr.opcode == Opcode::LinearPhi {
            continue;
        }
        if instr.accesses(saved.span(), false) || instr.writes_exec(exec) {
            return false;
        }
    }

    // The continue edge must already leave the same mask in the saved
    // register, proving the save redundant after the first iteration.
    let cont = &ctx.program.blocks[cont_id];
    let mut proven = false;
    for instr in cont.instructions.iter().rev() {
        if instr.is_simple_copy()
            && instr.defs[0].reg == EXEC_LO
            && instr.defs[0].rc == lm
            && instr.operands[0].reg() == Some(saved.reg)
        {
            proven = true;
            break;
        }
        if instr.opcode == Opcode::SAndNotWrExec && instr.defs[0].reg == saved.reg {
            proven = true;
            break;
        }
        if instr.accesses(saved.span(), true) || instr.writes_exec(exec) {
            return false;
        }
    }
    if !proven {
        return false;
    }

    let pre = &mut ctx.program.blocks[preheader_id];
    let at = pre.instructions.len() - 1;
    pre.instructions.insert(at, save.clone());
    true
}

/// Rewrite the mask-producing sequence at the end of a block so the
/// producer writes exec directly:
///
/// ```text
/// s[N:M] = <producer>
/// ...                      // nothing here depends on exec
/// p_logical_end
/// exec = <copy> s[N:M]
/// p_cbranch exec
/// ```
///
/// The copy is eliminated where possible, converted into a reverse copy
/// where its value is still needed, and a separate save of the old exec is
/// inserted (or hoisted out of the loop) when the copy also saved it.
fn try_optimize_branching_sequence(
    ctx: &mut JumpThreadingCtx,
    block_id: Id<Block>,
    code: &mut Vec<Option<Instruction>>,
    val_idx: usize,
    copy_idx: usize,
) {
    let lm = ctx.program.lane_mask;
    let r#gen = ctx.program.r#gen;

    let Some(exec_copy) = code[copy_idx].as_ref() else { return };
    let Some(exec_val) = code[val_idx].as_ref() else { return };

    // Only plain copies, exec-preserving ANDs, and AND-and-save-exec are
    // understood as mask copies.
    let copy_is_masked_and =
        exec_copy.opcode == Opcode::SAnd && exec_copy.operands[1].reg() == Some(EXEC_LO);
    if exec_copy.opcode != Opcode::SAndSaveExec
        && exec_copy.opcode != Opcode::ParallelCopy
        && !copy_is_masked_and
    {
        return;
    }

    // The AND forms also define scc, which must be dead.
    if exec_copy.opcode != Opcode::ParallelCopy && !exec_copy.defs[1].kill {
        return;
    }

    // Multiple definitions are only reassignable on scalar ALU.
    if !exec_val.opcode.is_salu() && exec_val.defs.len() > 1 {
        return;
    }

    let vcmpx_exec_only = r#gen >= HwGen::Gfx10;
    let vcmpx = exec_val.opcode.as_vcmpx();
    let vopc = vcmpx.is_some();

    // Lane-crossing operand addressing returns zero for disabled lanes once
    // the compare writes exec, unlike the plain compare.
    if vopc && exec_val.flags.contains(InstrFlags::DPP) {
        return;
    }

    let save_original_exec = exec_copy.opcode == Opcode::SAndSaveExec;
    let exec_wr_def = exec_val.defs[0];
    let exec_copy_def = exec_copy.defs[0];

    // The copy goes away when it kills its source. Before Gfx10 the
    // promoted compare still writes its original destination, which keeps
    // later readers fed as well.
    let can_remove_copy = exec_copy.operands[0].kill() || (vopc && !vcmpx_exec_only);

    // Compares fold their own "& exec" since disabled lanes yield zero.
    // Anything else only when the value is moved as-is.
    let can_reassign = vopc
        || (exec_copy.opcode == Opcode::ParallelCopy
            && (exec_val.opcode.is_salu()
                || exec_val.opcode == Opcode::ParallelCopy
                || exec_val.opcode == Opcode::CreateVector));

    // Never finish with more instructions than we started with.
    if !can_reassign || (save_original_exec && !can_remove_copy) {
        return;
    }

    if save_original_exec {
        // The save is inserted ahead of the producer, so the producer must
        // not read the saved destination,
        for op in &exec_val.operands {
            if op.span().is_some_and(|s| s.intersects(exec_copy_def.span())) {
                return;
            }
        }
        // nor may the produced value overwrite it,
        if ((vopc && !vcmpx_exec_only) || !can_remove_copy)
            && exec_copy_def.span().intersects(exec_wr_def.span())
        {
            return;
        }
        // nor anything on the way to the old copy touch it.
        for idx in val_idx + 1..copy_idx {
            if let Some(instr) = code[idx].as_ref()
                && instr.accesses(exec_copy_def.span(), false)
            {
                return;
            }
        }
    }

    let val_is_pseudo = exec_val.opcode.is_pseudo();
    let val_nonzero_const = exec_val
        .operands
        .iter()
        .any(|op| op.const_value().is_some_and(|c| c != 0));

    // Reassign the producer to write exec directly.
    let exec_def = Definition::of(EXEC_LO, lm);
    if let Some(x) = vcmpx {
        if let Some(val) = code[val_idx].as_mut() {
            val.opcode = x;
            if vcmpx_exec_only {
                val.defs[0] = exec_def;
            } else {
                // The compare keeps its destination and gains exec.
                val.defs.push(exec_def);
            }
        }
    } else if let Some(val) = code[val_idx].as_mut() {
        val.defs[0] = exec_def;
    }

    // Uses of the old destination between producer and copy now read exec.
    for idx in val_idx + 1..copy_idx {
        let Some(instr) = code[idx].as_mut() else { continue };
        for op in instr.operands.iter_mut() {
            if op.reg() == Some(exec_wr_def.reg) {
                op.set_reg(EXEC_LO);
            } else if exec_wr_def.rc.size() == 2 && op.reg() == Some(exec_wr_def.reg.advance(1)) {
                op.set_reg(EXEC_HI);
            }
        }
    }

    if can_remove_copy {
        code[copy_idx] = None;
    } else {
        // Keep the value available in its old home.
        code[copy_idx] = Some(Instruction::copy(
            Definition::of(exec_wr_def.reg, exec_wr_def.rc),
            Operand::of(EXEC_LO, lm),
        ));
    }

    // A constant non-zero mask can never take the zero branch.
    if val_is_pseudo
        && val_nonzero_const
        && let Some(Some(branch)) = code.last_mut()
        && branch.opcode == Opcode::BranchZ
        && branch.operands[0].reg() == Some(EXEC_LO)
    {
        let dead = branch.targets[0];
        let live = branch.targets[1];
        branch.opcode = Opcode::Branch;
        branch.operands.clear();
        if dead != live {
            branch.targets = vec![live];
            remove_linear_edge(ctx, block_id, dead);
        }
    }

    if save_original_exec {
        let save = Instruction::copy(
            Definition::of(exec_copy_def.reg, exec_copy_def.rc),
            Operand::of(EXEC_LO, lm),
        );
        let in_loop_header = ctx.program.blocks[block_id]
            .kind
            .contains(BlockKind::LOOP_HEADER);
        if in_loop_header && try_hoist_exec_save(ctx, block_id, code, &save, val_idx) {
            return;
        }
        code.insert(val_idx, Some(save));
    }
}

/// Backward scan of one block: delete exec writes nothing reads, record
/// whether the block needs an incoming mask, and locate the branch
/// sequence for [`try_optimize_branching_sequence`]. Deleted slots are
/// tombstoned during the scan and compacted before the visit ends.
fn eliminate_dead_exec_writes(ctx: &mut JumpThreadingCtx, block_id: Id<Block>) {
    let exec = exec_span(ctx.program.lane_mask);

    let block = &ctx.program.blocks[block_id];
    let mut exec_write_used = if block.kind.contains(BlockKind::END_WITH_REGS) {
        // The final mask is read by whatever consumes the program's output.
        true
    } else {
        block
            .linear_succs
            .iter()
            .any(|s| ctx.incoming_exec_used[s.index()])
    };

    let mut code: Vec<Option<Instruction>> = take(&mut ctx.program.blocks[block_id].instructions)
        .into_iter()
        .map(Some)
        .collect();

    // The two-stage search: first the copy into exec just before the
    // branch, then the instruction producing the copied value.
    let mut copy_idx = None;
    let mut val_idx = None;
    let mut copy_seen = false;
    let mut copy_src: Option<(PhysReg, RegClass)> = None;

    for i in (0..code.len()).rev() {
        let Some(instr) = code[i].as_ref() else { continue };

        // Phi inputs are accounted for through the predecessors' bits.
        if instr.opcode.is_phi() {
            break;
        }

        let needs_exec = instr.needs_exec(exec);
        let writes_exec = instr.writes_exec(exec);

        if writes_exec && !exec_write_used {
            // Only delete writes producing nothing but the mask and scc; a
            // side value such as a saved exec may feed a later branch.
            let writes_other = instr
                .defs
                .iter()
                .any(|def| def.reg != EXEC_LO && def.reg != SCC);
            if !writes_other {
                code[i] = None;
                continue;
            }
        }

        if writes_exec {
            if !instr.operands.is_empty() && !copy_seen {
                copy_idx = Some(i);
                copy_src = instr.operands[0].reg().zip(instr.operands[0].rc());
                copy_seen = true;
            } else if val_idx.is_none() {
                // Exec is clobbered again before the producer was found.
                copy_idx = None;
                copy_src = None;
            }
            exec_write_used = false;
        } else if let Some((src_reg, src_rc)) = copy_src
            && val_idx.is_none()
        {
            if instr
                .defs
                .first()
                .is_some_and(|d| d.reg == src_reg && d.rc == src_rc)
            {
                val_idx = Some(i);
            } else if instr.accesses(RegSpan::new(src_reg, src_rc.size()), true) {
                // A partial or secondary redefinition of the copied value.
                copy_idx = None;
                copy_src = None;
            } else if needs_exec {
                // Something above still reads the pre-branch mask.
                copy_idx = None;
                copy_src = None;
            }
        }

        exec_write_used |= needs_exec;
    }

    ctx.incoming_exec_used.set(block_id.index(), exec_write_used);

    if let (Some(val_idx), Some(copy_idx)) = (val_idx, copy_idx) {
        try_optimize_branching_sequence(ctx, block_id, &mut code, val_idx, copy_idx);
    }

    ctx.program.blocks[block_id].instructions = code.into_iter().flatten().collect();
}

fn run(ctx: &mut JumpThreadingCtx) {
    for i in (0..ctx.ids.len()).rev() {
        let block_id = ctx.ids[i];
        eliminate_dead_exec_writes(ctx, block_id);

        let kind = ctx.program.blocks[block_id].kind;
        if kind.contains(BlockKind::BREAK) {
            try_merge_break_with_continue(ctx, block_id);
        }

        if kind.contains(BlockKind::INVERT) {
            try_remove_invert_block(ctx, block_id);
            continue;
        }

        if ctx.program.blocks[block_id].linear_succs.len() > 1 {
            continue;
        }

        if kind.intersects(BlockKind::MERGE | BlockKind::LOOP_EXIT) {
            try_remove_merge_block(ctx, block_id);
        }

        if ctx.program.blocks[block_id].linear_preds.len() == 1 {
            try_remove_simple_block(ctx, block_id);
        }
    }
}

/// Run exec-mask jump threading over the whole program. Blocks may end up
/// disconnected but are never removed from the arena; callers re-derive
/// layout afterwards.
pub fn jump_threading(program: &mut Program) {
    let mut ctx = JumpThreadingCtx::new(program);
    run(&mut ctx);
}
