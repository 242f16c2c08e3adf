//! Instruction-emitter seam between the ABI sequences and a code buffer.
//!
//! The ABI layer never touches instruction bytes itself; it drives an
//! [`Emitter`] implementation through the small set of operations the stub
//! sequences need. [`crate::X86Encoder`] is the bundled implementation that
//! produces machine code, [`crate::RecordingEmitter`] captures the operation
//! stream for tests.

use crate::error::EmitResult;
use crate::regs::{Gpr, Xmm};

/// Byte length of a near call with rel32 displacement.
pub const CALL_REL32_LEN: u64 = 5;

/// Whether a direct near call can reach `target` from an instruction ending
/// at `rip_after_call`.
///
/// The displacement is signed 32-bit and measured from the end of the call
/// instruction; everything outside the +/-2 GiB window needs an indirect
/// call through a register.
pub fn call_fits_rel32(target: u64, rip_after_call: u64) -> bool {
    let distance = target.wrapping_sub(rip_after_call);
    !(0x8000_0000..0xFFFF_FFFF_8000_0000).contains(&distance)
}

/// Base-plus-displacement memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mem {
    pub base: Gpr,
    pub disp: i32,
}

impl Mem {
    /// Operand addressing `[base]`.
    pub const fn base(base: Gpr) -> Self {
        Self { base, disp: 0 }
    }

    /// Operand addressing `[base + disp]`.
    pub const fn base_disp(base: Gpr, disp: i32) -> Self {
        Self { base, disp }
    }
}

/// Sink for the instructions the ABI sequences emit.
///
/// Implementations append to a code buffer at a fixed bitness; widths not
/// spelled out in a method name follow the machine word. All operations
/// report failure through [`EmitResult`] so encoding errors propagate to the
/// stub-level entry points.
pub trait Emitter {
    /// Address of the next instruction to be emitted.
    fn position(&self) -> u64;

    /// Push a general-purpose register (word-sized slot).
    fn push_reg(&mut self, reg: Gpr) -> EmitResult;

    /// Pop into a general-purpose register.
    fn pop_reg(&mut self, reg: Gpr) -> EmitResult;

    /// Push a 16-bit immediate into a 2-byte slot.
    fn push_imm16(&mut self, imm: u16) -> EmitResult;

    /// Push a 32-bit immediate.
    fn push_imm32(&mut self, imm: u32) -> EmitResult;

    /// Push the 32-bit value at `src`.
    fn push_mem32(&mut self, src: Mem) -> EmitResult;

    /// Word-width register move.
    fn mov_reg_reg(&mut self, dst: Gpr, src: Gpr) -> EmitResult;

    /// Load a 32-bit immediate; zero-extends on 64-bit targets.
    fn mov_reg_imm32(&mut self, dst: Gpr, imm: u32) -> EmitResult;

    /// Load a full 64-bit immediate. Only encodable on 64-bit targets.
    fn mov_reg_imm64(&mut self, dst: Gpr, imm: u64) -> EmitResult;

    /// Load the 32-bit value at `src`.
    fn mov_reg_mem32(&mut self, dst: Gpr, src: Mem) -> EmitResult;

    /// Subtract `bytes` from the stack pointer.
    fn sub_sp(&mut self, bytes: u32) -> EmitResult;

    /// Add `bytes` to the stack pointer.
    fn add_sp(&mut self, bytes: u32) -> EmitResult;

    /// Store a vector register to a 16-byte-aligned slot.
    fn store_xmm(&mut self, dst: Mem, src: Xmm) -> EmitResult;

    /// Load a vector register from a 16-byte-aligned slot.
    fn load_xmm(&mut self, dst: Xmm, src: Mem) -> EmitResult;

    /// Direct near call to an absolute address. On 64-bit targets the
    /// address must satisfy [`call_fits_rel32`] at the current position.
    fn call(&mut self, target: u64) -> EmitResult;

    /// Indirect call through a register.
    fn call_reg(&mut self, reg: Gpr) -> EmitResult;
}
