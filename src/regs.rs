//! Register identifiers and save masks.
//!
//! Registers are named by their 64-bit spellings; on a 32-bit target the same
//! encoding index selects the 32-bit form (`Rax` emits as `EAX`, `Rsp` as
//! `ESP`). [`RegMask`] holds the set of registers a stub must preserve, kept
//! as two disjoint banks so general-purpose and vector registers can never
//! collide in one bit position.

/// General-purpose register, numbered in x86 encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Gpr {
    Rax = 0,
    Rcx = 1,
    Rdx = 2,
    Rbx = 3,
    Rsp = 4,
    Rbp = 5,
    Rsi = 6,
    Rdi = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    R13 = 13,
    R14 = 14,
    R15 = 15,
}

impl Gpr {
    /// All registers in encoding order.
    pub const ALL: [Gpr; 16] = [
        Gpr::Rax,
        Gpr::Rcx,
        Gpr::Rdx,
        Gpr::Rbx,
        Gpr::Rsp,
        Gpr::Rbp,
        Gpr::Rsi,
        Gpr::Rdi,
        Gpr::R8,
        Gpr::R9,
        Gpr::R10,
        Gpr::R11,
        Gpr::R12,
        Gpr::R13,
        Gpr::R14,
        Gpr::R15,
    ];

    /// Hardware encoding index (0-15).
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Register for an encoding index, if in range.
    pub fn from_index(index: u8) -> Option<Gpr> {
        Self::ALL.get(index as usize).copied()
    }

    /// Whether encoding this register needs a REX prefix (R8-R15).
    pub const fn is_extended(self) -> bool {
        (self as u8) >= 8
    }
}

/// SSE vector register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Xmm {
    Xmm0 = 0,
    Xmm1 = 1,
    Xmm2 = 2,
    Xmm3 = 3,
    Xmm4 = 4,
    Xmm5 = 5,
    Xmm6 = 6,
    Xmm7 = 7,
    Xmm8 = 8,
    Xmm9 = 9,
    Xmm10 = 10,
    Xmm11 = 11,
    Xmm12 = 12,
    Xmm13 = 13,
    Xmm14 = 14,
    Xmm15 = 15,
}

impl Xmm {
    /// All registers in encoding order. XMM8-XMM15 exist only in 64-bit mode.
    pub const ALL: [Xmm; 16] = [
        Xmm::Xmm0,
        Xmm::Xmm1,
        Xmm::Xmm2,
        Xmm::Xmm3,
        Xmm::Xmm4,
        Xmm::Xmm5,
        Xmm::Xmm6,
        Xmm::Xmm7,
        Xmm::Xmm8,
        Xmm::Xmm9,
        Xmm::Xmm10,
        Xmm::Xmm11,
        Xmm::Xmm12,
        Xmm::Xmm13,
        Xmm::Xmm14,
        Xmm::Xmm15,
    ];

    /// Hardware encoding index (0-15).
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Register for an encoding index, if in range.
    pub fn from_index(index: u8) -> Option<Xmm> {
        Self::ALL.get(index as usize).copied()
    }
}

/// Set of registers to save around a call, split into a general-purpose bank
/// and a vector bank.
///
/// The packed [`bits`](RegMask::bits) form keeps the general-purpose bank in
/// bits 0-15 and the vector bank in bits 16-31, so a full save set fits one
/// `u32`. Iteration over either bank always runs in ascending encoding order;
/// restore paths walk the general-purpose bank in reverse to mirror the pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RegMask {
    gpr: u16,
    xmm: u16,
}

impl RegMask {
    /// Mask containing no registers.
    pub const fn empty() -> Self {
        Self { gpr: 0, xmm: 0 }
    }

    /// Mask containing every general-purpose register except the stack pointer.
    pub const fn all_gprs() -> Self {
        Self {
            gpr: 0xffff & !(1 << Gpr::Rsp as u8),
            xmm: 0,
        }
    }

    /// Mask containing every vector register.
    pub const fn all_xmms() -> Self {
        Self { gpr: 0, xmm: 0xffff }
    }

    /// Builder-style insertion of a general-purpose register.
    pub const fn with_gpr(mut self, reg: Gpr) -> Self {
        self.gpr |= 1 << reg as u8;
        self
    }

    /// Builder-style insertion of a vector register.
    pub const fn with_xmm(mut self, reg: Xmm) -> Self {
        self.xmm |= 1 << reg as u8;
        self
    }

    pub fn insert_gpr(&mut self, reg: Gpr) {
        self.gpr |= 1 << reg as u8;
    }

    pub fn insert_xmm(&mut self, reg: Xmm) {
        self.xmm |= 1 << reg as u8;
    }

    pub fn remove_gpr(&mut self, reg: Gpr) {
        self.gpr &= !(1 << reg as u8);
    }

    pub fn remove_xmm(&mut self, reg: Xmm) {
        self.xmm &= !(1 << reg as u8);
    }

    pub const fn contains_gpr(self, reg: Gpr) -> bool {
        self.gpr & (1 << reg as u8) != 0
    }

    pub const fn contains_xmm(self, reg: Xmm) -> bool {
        self.xmm & (1 << reg as u8) != 0
    }

    /// Union of two masks.
    pub const fn union(self, other: Self) -> Self {
        Self {
            gpr: self.gpr | other.gpr,
            xmm: self.xmm | other.xmm,
        }
    }

    /// Number of general-purpose registers in the mask.
    pub const fn gpr_count(self) -> u32 {
        self.gpr.count_ones()
    }

    /// Number of vector registers in the mask.
    pub const fn xmm_count(self) -> u32 {
        self.xmm.count_ones()
    }

    pub const fn is_empty(self) -> bool {
        self.gpr == 0 && self.xmm == 0
    }

    /// Packed form: general-purpose bank in bits 0-15, vector bank in 16-31.
    pub const fn bits(self) -> u32 {
        self.gpr as u32 | (self.xmm as u32) << 16
    }

    /// Rebuild a mask from its packed form.
    pub const fn from_bits(bits: u32) -> Self {
        Self {
            gpr: bits as u16,
            xmm: (bits >> 16) as u16,
        }
    }

    /// General-purpose members in ascending encoding order.
    pub fn gprs(self) -> impl DoubleEndedIterator<Item = Gpr> {
        let bank = self.gpr;
        (0u8..16).filter(move |i| bank & (1 << i) != 0).map(|i| Gpr::ALL[i as usize])
    }

    /// Vector members in ascending encoding order.
    pub fn xmms(self) -> impl DoubleEndedIterator<Item = Xmm> {
        let bank = self.xmm;
        (0u8..16).filter(move |i| bank & (1 << i) != 0).map(|i| Xmm::ALL[i as usize])
    }
}
