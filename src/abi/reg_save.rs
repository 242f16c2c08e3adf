//! Caller-side register saves and whole-frame entry prologues.

use super::AbiEmitter;
use crate::emitter::{Emitter, Mem};
use crate::error::EmitResult;
use crate::regs::{Gpr, RegMask};

impl<'e, E: Emitter> AbiEmitter<'e, E> {
    /// Save the masked registers ahead of a clobbering region.
    ///
    /// General-purpose members are pushed in ascending encoding order, then
    /// one stack adjustment reserves the vector slots, the alignment residue
    /// for the pushed words and the profile's shadow space, and the vector
    /// members are stored to 16-byte slots above the shadow space. The stack
    /// is call-ready when this returns.
    pub fn push_registers(&mut self, mask: RegMask, no_prolog: bool) -> EmitResult {
        debug_assert!(
            self.target.is_64() || mask.xmms().all(|reg| reg.index() < 8),
            "XMM8-XMM15 unavailable on 32-bit targets"
        );
        log::trace!(
            "saving {} gp / {} vector registers ({:?})",
            mask.gpr_count(),
            mask.xmm_count(),
            self.target.abi
        );
        for reg in mask.gprs() {
            self.emitter.push_reg(reg)?;
        }
        let frame = self.save_frame_size(mask, no_prolog);
        if frame != 0 {
            self.emitter.sub_sp(frame)?;
        }
        let mut offset = self.target.shadow as i32;
        for reg in mask.xmms() {
            self.emitter.store_xmm(Mem::base_disp(Gpr::Rsp, offset), reg)?;
            offset += 16;
        }
        Ok(())
    }

    /// Restore what [`push_registers`](Self::push_registers) saved. The mask
    /// and `no_prolog` flag must match the save site.
    pub fn pop_registers(&mut self, mask: RegMask, no_prolog: bool) -> EmitResult {
        debug_assert!(
            self.target.is_64() || mask.xmms().all(|reg| reg.index() < 8),
            "XMM8-XMM15 unavailable on 32-bit targets"
        );
        let mut offset = self.target.shadow as i32;
        for reg in mask.xmms() {
            self.emitter.load_xmm(reg, Mem::base_disp(Gpr::Rsp, offset))?;
            offset += 16;
        }
        let frame = self.save_frame_size(mask, no_prolog);
        if frame != 0 {
            self.emitter.add_sp(frame)?;
        }
        for reg in mask.gprs().rev() {
            self.emitter.pop_reg(reg)?;
        }
        Ok(())
    }

    /// Bytes of the single adjustment between the pushes and the call:
    /// alignment residue for the pushed words, one 16-byte slot per vector
    /// member, plus shadow space.
    fn save_frame_size(&self, mask: RegMask, no_prolog: bool) -> u32 {
        let word = self.target.word as i32;
        let baseline = if no_prolog { -word } else { 0 };
        let residue = ((baseline - mask.gpr_count() as i32 * word) & 0xf) as u32;
        residue + 16 * mask.xmm_count() + self.target.shadow
    }

    /// Entry prologue for stub code called from the host runtime: frame
    /// pointer, the profile's callee-saved registers, then a fixed
    /// reservation so nested calls stay aligned.
    pub fn push_callee_saved_frame(&mut self) -> EmitResult {
        self.emitter.push_reg(Gpr::Rbp)?;
        self.emitter.mov_reg_reg(Gpr::Rbp, Gpr::Rsp)?;
        for &reg in self.target.callee_saved {
            self.emitter.push_reg(reg)?;
        }
        self.emitter.sub_sp(self.target.entry_pad)
    }

    /// Epilogue matching
    /// [`push_callee_saved_frame`](Self::push_callee_saved_frame).
    pub fn pop_callee_saved_frame(&mut self) -> EmitResult {
        self.emitter.add_sp(self.target.entry_pad)?;
        for &reg in self.target.callee_saved.iter().rev() {
            self.emitter.pop_reg(reg)?;
        }
        self.emitter.pop_reg(Gpr::Rbp)
    }
}
