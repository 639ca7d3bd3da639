#![no_std]
use core::fmt;

/// A physical register in the unified register file, numbered the way the
/// hardware numbers it: scalar registers live below [`VGPR0`], vector
/// registers at [`VGPR0`] and above. Multi-dword values occupy consecutive
/// registers starting at their base.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Default)]
pub struct PhysReg(pub u16);

pub const VCC_LO: PhysReg = PhysReg(106);
pub const VCC_HI: PhysReg = PhysReg(107);
pub const EXEC_LO: PhysReg = PhysReg(126);
pub const EXEC_HI: PhysReg = PhysReg(127);
pub const SCC: PhysReg = PhysReg(253);
pub const VGPR0: PhysReg = PhysReg(256);

impl PhysReg {
    pub const fn advance(self, n: u16) -> PhysReg {
        PhysReg(self.0 + n)
    }
    pub const fn is_vector(self) -> bool {
        self.0 >= VGPR0.0
    }
}

impl fmt::Display for PhysReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            VCC_LO => write!(f, "vcc_lo"),
            VCC_HI => write!(f, "vcc_hi"),
            EXEC_LO => write!(f, "exec_lo"),
            EXEC_HI => write!(f, "exec_hi"),
            SCC => write!(f, "scc"),
            PhysReg(r) if r >= VGPR0.0 => write!(f, "v{}", r - VGPR0.0),
            PhysReg(r) => write!(f, "s{}", r),
        }
    }
}

/// Register class of a definition or register operand: the file it lives in
/// and its width in dwords.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum RegClass {
    Sgpr(u16),
    Vgpr(u16),
}

impl RegClass {
    pub const fn size(self) -> u16 {
        match self {
            RegClass::Sgpr(n) | RegClass::Vgpr(n) => n,
        }
    }
    pub const fn is_vector(self) -> bool {
        matches!(self, RegClass::Vgpr(_))
    }
}

/// A contiguous range of physical registers, for overlap queries between
/// definitions and operands of possibly different widths.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct RegSpan {
    pub start: u16,
    pub size: u16,
}

impl RegSpan {
    pub const fn new(start: PhysReg, size: u16) -> RegSpan {
        RegSpan {
            start: start.0,
            size,
        }
    }
    pub const fn intersects(self, other: RegSpan) -> bool {
        self.start + self.size > other.start && other.start + other.size > self.start
    }
    pub const fn contains(self, reg: PhysReg) -> bool {
        reg.0 >= self.start && reg.0 < self.start + self.size
    }
}

/// The registers holding the active-lane mask: one dword in wave32 mode, the
/// exec_lo/exec_hi pair in wave64 mode.
pub const fn exec_span(lane_mask: RegClass) -> RegSpan {
    RegSpan::new(EXEC_LO, lane_mask.size())
}

/// Hardware generations, ordered. Gating rules the backend cares about:
/// the fused AND-NOT-write-exec op exists from [`HwGen::Gfx9`] on, and
/// compares promoted to write exec stop writing their original destination
/// from [`HwGen::Gfx10`] on.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum HwGen {
    Gfx8,
    Gfx9,
    Gfx10,
    Gfx11,
    Gfx12,
}
