//! Machine-level wavefront IR for the shader backend.
//!
//! This crate models the program as it looks after instruction selection and
//! register allocation: an arena of basic blocks over physical registers,
//! with the linear (machine) and logical (structured source-level) control
//! flow kept as separate edge sets. It is the representation the late
//! backend passes agree on.
//!
//! # Key Types
//!
//! - [`Program`]: the owning container: block arena, lane-mask width,
//!   hardware generation
//! - [`Block`]: instruction list, role flags, linear/logical edge vectors
//! - [`Instruction`]: opcode plus physical-register definitions and operands;
//!   branches carry their successor targets inline
//! - [`Opcode`]/[`CmpOp`]: the opcode set this stage of the pipeline uses
//!
//! # Modules
//!
//! - [`builder`]: program construction helpers
//! - [`impls`]: `cfg-traits` integration
//! - [`interp`]: reference lane-mask interpreter
//! - [`jump_threading`]: post-RA exec-mask liveness and CFG simplification
//! - [`validate`]: structural invariant checks

use std::fmt;
use std::iter::empty;

use bitflags::bitflags;
use either::Either;
use id_arena::{Arena, Id};

pub use gsc_common::*;

pub mod builder;
pub mod impls;
pub mod interp;
pub mod jump_threading;
pub mod validate;

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct BlockKind: u16 {
        const TOP_LEVEL = 0x1;
        const LOOP_PREHEADER = 0x2;
        const LOOP_HEADER = 0x4;
        const LOOP_EXIT = 0x8;
        const CONTINUE = 0x10;
        const BREAK = 0x20;
        const MERGE = 0x40;
        const INVERT = 0x80;
        const UNIFORM = 0x100;
        /// The block ends the program with live registers the caller reads;
        /// its final exec mask must be preserved.
        const END_WITH_REGS = 0x200;
    }
}

bitflags! {
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct InstrFlags: u8 {
        /// Lane-crossing operand addressing. Reads from disabled lanes
        /// behave differently once the instruction writes exec.
        const DPP = 0x1;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// The opcode set of the post-RA pipeline stage. Lane-mask ALU opcodes are
/// width-agnostic; the operating width is [`Program::lane_mask`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Opcode {
    Phi,
    LinearPhi,
    LogicalStart,
    LogicalEnd,
    ParallelCopy,
    CreateVector,
    Branch,
    BranchZ,
    BranchNz,
    EndProgram,
    SMov,
    SAnd,
    SOr,
    SAndNot,
    SAndSaveExec,
    SAndNotWrExec,
    VMov,
    VCmp(CmpOp),
    VCmpX(CmpOp),
}

impl Opcode {
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Branch | Opcode::BranchZ | Opcode::BranchNz)
    }
    pub fn is_phi(self) -> bool {
        matches!(self, Opcode::Phi | Opcode::LinearPhi)
    }
    pub fn is_salu(self) -> bool {
        matches!(
            self,
            Opcode::SMov
                | Opcode::SAnd
                | Opcode::SOr
                | Opcode::SAndNot
                | Opcode::SAndSaveExec
                | Opcode::SAndNotWrExec
        )
    }
    pub fn is_valu(self) -> bool {
        matches!(self, Opcode::VMov | Opcode::VCmp(_) | Opcode::VCmpX(_))
    }
    pub fn is_pseudo(self) -> bool {
        matches!(
            self,
            Opcode::Phi
                | Opcode::LinearPhi
                | Opcode::LogicalStart
                | Opcode::LogicalEnd
                | Opcode::ParallelCopy
                | Opcode::CreateVector
                | Opcode::Branch
                | Opcode::BranchZ
                | Opcode::BranchNz
        )
    }
    /// The compare-writes-exec encoding of a plain vector compare.
    pub fn as_vcmpx(self) -> Option<Opcode> {
        match self {
            Opcode::VCmp(op) => Some(Opcode::VCmpX(op)),
            _ => None,
        }
    }
}

/// An output of an instruction. `kill` marks a result that has no later
/// reader; upstream liveness computes it before this stage runs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Definition {
    pub reg: PhysReg,
    pub rc: RegClass,
    pub kill: bool,
}

impl Definition {
    pub const fn of(reg: PhysReg, rc: RegClass) -> Definition {
        Definition {
            reg,
            rc,
            kill: false,
        }
    }
    pub const fn killed(mut self) -> Definition {
        self.kill = true;
        self
    }
    pub const fn span(&self) -> RegSpan {
        RegSpan::new(self.reg, self.rc.size())
    }
}

/// An input of an instruction: a register or a compile-time constant.
/// `kill` marks a last use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Operand {
    Reg {
        reg: PhysReg,
        rc: RegClass,
        kill: bool,
    },
    Const(u64),
}

impl Operand {
    pub const fn of(reg: PhysReg, rc: RegClass) -> Operand {
        Operand::Reg {
            reg,
            rc,
            kill: false,
        }
    }
    pub const fn last_use(reg: PhysReg, rc: RegClass) -> Operand {
        Operand::Reg {
            reg,
            rc,
            kill: true,
        }
    }
    pub fn reg(&self) -> Option<PhysReg> {
        match self {
            Operand::Reg { reg, .. } => Some(*reg),
            Operand::Const(_) => None,
        }
    }
    pub fn rc(&self) -> Option<RegClass> {
        match self {
            Operand::Reg { rc, .. } => Some(*rc),
            Operand::Const(_) => None,
        }
    }
    pub fn kill(&self) -> bool {
        match self {
            Operand::Reg { kill, .. } => *kill,
            Operand::Const(_) => false,
        }
    }
    pub fn const_value(&self) -> Option<u64> {
        match self {
            Operand::Reg { .. } => None,
            Operand::Const(c) => Some(*c),
        }
    }
    pub fn span(&self) -> Option<RegSpan> {
        match self {
            Operand::Reg { reg, rc, .. } => Some(RegSpan::new(*reg, rc.size())),
            Operand::Const(_) => None,
        }
    }
    pub fn set_reg(&mut self, new: PhysReg) {
        if let Operand::Reg { reg, .. } = self {
            *reg = new;
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Instruction {
    pub opcode: Opcode,
    pub defs: Vec<Definition>,
    pub operands: Vec<Operand>,
    /// Branch successor targets. One for an unconditional branch (a
    /// collapsed conditional keeps its two, now equal, entries), two for a
    /// conditional: `[taken, fallthrough]`.
    pub targets: Vec<Id<Block>>,
    /// Scalar register some pseudo-ops may clobber during lowering.
    pub scratch: Option<PhysReg>,
    pub flags: InstrFlags,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Instruction {
        Instruction {
            opcode,
            defs: Vec::new(),
            operands: Vec::new(),
            targets: Vec::new(),
            scratch: None,
            flags: InstrFlags::empty(),
        }
    }
    pub fn with(opcode: Opcode, defs: Vec<Definition>, operands: Vec<Operand>) -> Instruction {
        Instruction {
            defs,
            operands,
            ..Instruction::new(opcode)
        }
    }
    pub fn copy(def: Definition, src: Operand) -> Instruction {
        Instruction::with(Opcode::ParallelCopy, vec![def], vec![src])
    }
    pub fn branch(target: Id<Block>) -> Instruction {
        Instruction {
            targets: vec![target],
            ..Instruction::new(Opcode::Branch)
        }
    }
    pub fn branch_z(pred: Operand, taken: Id<Block>, fallthrough: Id<Block>) -> Instruction {
        Instruction {
            operands: vec![pred],
            targets: vec![taken, fallthrough],
            ..Instruction::new(Opcode::BranchZ)
        }
    }
    pub fn branch_nz(pred: Operand, taken: Id<Block>, fallthrough: Id<Block>) -> Instruction {
        Instruction {
            operands: vec![pred],
            targets: vec![taken, fallthrough],
            ..Instruction::new(Opcode::BranchNz)
        }
    }

    pub fn is_branch(&self) -> bool {
        self.opcode.is_branch()
    }
    /// A parallel copy moving exactly one value.
    pub fn is_simple_copy(&self) -> bool {
        self.opcode == Opcode::ParallelCopy && self.defs.len() == 1
    }
    pub fn target_blocks(&self) -> impl Iterator<Item = Id<Block>> + '_ {
        if self.is_branch() {
            Either::Left(self.targets.iter().copied())
        } else {
            Either::Right(empty())
        }
    }

    pub fn writes_exec(&self, exec: RegSpan) -> bool {
        self.defs.iter().any(|def| def.span().intersects(exec))
    }
    /// Whether the instruction depends on the current exec mask: vector ALU
    /// is implicitly lane-gated, pseudo-ops moving vector registers lower to
    /// lane-gated moves, and anything else may read exec explicitly.
    pub fn needs_exec(&self, exec: RegSpan) -> bool {
        if self.opcode.is_valu() {
            return true;
        }
        if self.opcode.is_pseudo()
            && (self.defs.iter().any(|d| d.rc.is_vector())
                || self.operands.iter().any(|op| op.rc().is_some_and(RegClass::is_vector)))
        {
            return true;
        }
        self.operands
            .iter()
            .any(|op| op.span().is_some_and(|s| s.intersects(exec)))
    }
    /// Whether the instruction touches the given register range: reads
    /// (unless ignored), writes, or a possible scratch clobber.
    pub fn accesses(&self, span: RegSpan, ignore_reads: bool) -> bool {
        if !ignore_reads
            && self
                .operands
                .iter()
                .any(|op| op.span().is_some_and(|s| s.intersects(span)))
        {
            return true;
        }
        if self.defs.iter().any(|def| def.span().intersects(span)) {
            return true;
        }
        self.opcode.is_pseudo()
            && self
                .scratch
                .is_some_and(|r| RegSpan::new(r, 1).intersects(span))
    }
}

#[derive(Clone, Default, PartialEq, Eq, Debug)]
pub struct Block {
    pub instructions: Vec<Instruction>,
    pub kind: BlockKind,
    pub linear_preds: Vec<Id<Block>>,
    pub linear_succs: Vec<Id<Block>>,
    pub logical_preds: Vec<Id<Block>>,
    pub logical_succs: Vec<Id<Block>>,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Program {
    pub blocks: Arena<Block>,
    pub entry: Id<Block>,
    /// Width of the active-lane mask: `Sgpr(1)` in wave32 mode, `Sgpr(2)`
    /// in wave64 mode.
    pub lane_mask: RegClass,
    pub r#gen: HwGen,
}

impl Program {
    pub fn new(lane_mask: RegClass, r#gen: HwGen) -> Program {
        let mut blocks = Arena::new();
        let entry = blocks.alloc(Block {
            kind: BlockKind::TOP_LEVEL,
            ..Default::default()
        });
        Program {
            blocks,
            entry,
            lane_mask,
            r#gen,
        }
    }
    /// All block ids in arena order; `Id::index` is the block's position in
    /// this table.
    pub fn block_ids(&self) -> Vec<Id<Block>> {
        self.blocks.iter().map(|a| a.0).collect()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cmp = |op: &CmpOp| match op {
            CmpOp::Eq => "eq",
            CmpOp::Ne => "ne",
            CmpOp::Lt => "lt",
            CmpOp::Le => "le",
            CmpOp::Gt => "gt",
            CmpOp::Ge => "ge",
        };
        match self {
            Opcode::Phi => write!(f, "p_phi"),
            Opcode::LinearPhi => write!(f, "p_linear_phi"),
            Opcode::LogicalStart => write!(f, "p_logical_start"),
            Opcode::LogicalEnd => write!(f, "p_logical_end"),
            Opcode::ParallelCopy => write!(f, "p_parallelcopy"),
            Opcode::CreateVector => write!(f, "p_create_vector"),
            Opcode::Branch => write!(f, "p_branch"),
            Opcode::BranchZ => write!(f, "p_cbranch_z"),
            Opcode::BranchNz => write!(f, "p_cbranch_nz"),
            Opcode::EndProgram => write!(f, "s_endpgm"),
            Opcode::SMov => write!(f, "s_mov"),
            Opcode::SAnd => write!(f, "s_and"),
            Opcode::SOr => write!(f, "s_or"),
            Opcode::SAndNot => write!(f, "s_andn2"),
            Opcode::SAndSaveExec => write!(f, "s_and_saveexec"),
            Opcode::SAndNotWrExec => write!(f, "s_andn2_wrexec"),
            Opcode::VMov => write!(f, "v_mov"),
            Opcode::VCmp(op) => write!(f, "v_cmp_{}_u32", cmp(op)),
            Opcode::VCmpX(op) => write!(f, "v_cmpx_{}_u32", cmp(op)),
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, def) in self.defs.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { "" } else { ", " }, def.reg)?;
        }
        if !self.defs.is_empty() {
            write!(f, " = ")?;
        }
        write!(f, "{}", self.opcode)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match op {
                Operand::Reg { reg, .. } => write!(f, "{sep}{reg}")?,
                Operand::Const(c) => write!(f, "{sep}{c:#x}")?,
            }
        }
        for t in &self.targets {
            write!(f, " BB{}", t.index())?;
        }
        Ok(())
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (id, block) in self.blocks.iter() {
            write!(f, "BB{}:", id.index())?;
            for p in &block.linear_preds {
                write!(f, " <BB{}", p.index())?;
            }
            for s in &block.linear_succs {
                write!(f, " >BB{}", s.index())?;
            }
            writeln!(f)?;
            for instr in &block.instructions {
                writeln!(f, "   {instr}")?;
            }
        }
        Ok(())
    }
}
