// This module emits complete call stubs: stack alignment, argument
// marshalling, the call itself and the cleanup. The 64-bit profiles place
// arguments in convention registers through a dependency-ordered walk that
// never overwrites a register another argument still reads; genuine cycles
// are broken by parking the contended value in the profile's scratch
// register. The 32-bit profiles push arguments right-to-left instead, with
// 2-byte slots for 16-bit immediates and 4-byte slots for everything else.
// Call targets reachable by a rel32 displacement get a direct near call;
// anything farther is materialized into the scratch register and called
// indirectly. Stubs may be emitted with or without a surrounding prologue;
// the flag feeds the alignment baseline.

//! Call stubs with argument marshalling and far-call handling.

use super::AbiEmitter;
use crate::emitter::{call_fits_rel32, Emitter, Mem, CALL_REL32_LEN};
use crate::error::EmitResult;
use crate::regs::Gpr;

/// Upper bound on stub arguments; matches the shortest register convention
/// (Win64's four).
pub const MAX_CALL_ARGS: usize = 4;

/// One call-stub argument.
///
/// All variants are word-sized values from the callee's point of view;
/// immediates and memory loads are zero-extended on the 64-bit profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arg {
    /// 16-bit immediate. Pushed into a 2-byte slot on the 32-bit profiles.
    Imm16(u16),
    /// 32-bit immediate.
    Imm(u32),
    /// Pointer-sized immediate. Must fit the 32-bit address space on the
    /// 32-bit profiles.
    Ptr(u64),
    /// Value already held in a register.
    Reg(Gpr),
    /// 32-bit value read from memory at call time.
    Mem(Mem),
}

impl Arg {
    /// Stack bytes the argument occupies on a 32-bit profile.
    fn slot_bytes(&self) -> u32 {
        match self {
            Arg::Imm16(_) => 2,
            _ => 4,
        }
    }
}

impl<'e, E: Emitter> AbiEmitter<'e, E> {
    /// Emit a complete call stub for code running under a normal prologue.
    ///
    /// Shorthand for [`emit_call`](Self::emit_call) with `no_prolog` unset.
    pub fn call(&mut self, target: u64, args: &[Arg]) -> EmitResult {
        self.emit_call(target, args, false)
    }

    /// Emit a complete call stub: align, marshal `args`, call `target`,
    /// release the frame.
    ///
    /// The 64-bit profiles pass every argument in registers and keep the
    /// stack untouched apart from the alignment reservation; the 32-bit
    /// profiles push the arguments right-to-left so the first argument ends
    /// up at the lowest address. `no_prolog` marks stubs running outside a
    /// normal function prologue, which shifts the alignment baseline.
    ///
    /// Panics when given more than [`MAX_CALL_ARGS`] arguments.
    pub fn emit_call(&mut self, target: u64, args: &[Arg], no_prolog: bool) -> EmitResult {
        assert!(
            args.len() <= MAX_CALL_ARGS,
            "call stubs take at most {MAX_CALL_ARGS} arguments"
        );
        log::trace!(
            "call stub to {target:#x}: {} args on {:?}",
            args.len(),
            self.target.abi
        );
        if self.target.is_64() {
            self.align_stack(0, no_prolog)?;
            self.marshal_args(args)?;
            self.far_aware_call(target)?;
            self.restore_stack(0, no_prolog)
        } else {
            let frame = args.iter().map(Arg::slot_bytes).sum();
            self.align_stack(frame, no_prolog)?;
            for arg in args.iter().rev() {
                self.push_arg(*arg)?;
            }
            self.emitter.call(target)?;
            self.restore_stack(frame, no_prolog)
        }
    }

    /// Call `target` directly when a rel32 displacement reaches it from the
    /// current position, otherwise through the scratch register.
    fn far_aware_call(&mut self, target: u64) -> EmitResult {
        let after_call = self.emitter.position().wrapping_add(CALL_REL32_LEN);
        if call_fits_rel32(target, after_call) {
            self.emitter.call(target)
        } else {
            log::trace!(
                "target {target:#x} beyond rel32 reach, calling through {:?}",
                self.target.scratch
            );
            self.emitter.mov_reg_imm64(self.target.scratch, target)?;
            self.emitter.call_reg(self.target.scratch)
        }
    }

    /// Push one argument for the 32-bit stack conventions.
    fn push_arg(&mut self, arg: Arg) -> EmitResult {
        match arg {
            Arg::Imm16(imm) => self.emitter.push_imm16(imm),
            Arg::Imm(imm) => self.emitter.push_imm32(imm),
            Arg::Ptr(ptr) => {
                debug_assert!(ptr <= u32::MAX as u64, "pointer beyond 32-bit address space");
                self.emitter.push_imm32(ptr as u32)
            }
            Arg::Reg(reg) => self.emitter.push_reg(reg),
            Arg::Mem(mem) => self.emitter.push_mem32(mem),
        }
    }

    /// Load one argument into its convention register.
    fn load_arg(&mut self, dst: Gpr, arg: Arg) -> EmitResult {
        match arg {
            Arg::Imm16(imm) => self.emitter.mov_reg_imm32(dst, imm as u32),
            Arg::Imm(imm) => self.emitter.mov_reg_imm32(dst, imm),
            Arg::Ptr(ptr) => self.emitter.mov_reg_imm64(dst, ptr),
            Arg::Reg(src) => self.emitter.mov_reg_reg(dst, src),
            Arg::Mem(mem) => self.emitter.mov_reg_mem32(dst, mem),
        }
    }

    /// Place `args` in the profile's argument registers without clobbering a
    /// register another argument still reads.
    ///
    /// Arguments already sitting in their slot are skipped. The remaining
    /// slots are filled in passes: a slot is ready once no other pending
    /// argument sources its destination register. When no slot is ready the
    /// pending arguments form a register cycle, which
    /// [`break_cycle`](Self::break_cycle) resolves.
    fn marshal_args(&mut self, args: &[Arg]) -> EmitResult {
        debug_assert!(args.len() <= self.target.arg_regs.len());
        let mut pending: [Option<Arg>; MAX_CALL_ARGS] = [None; MAX_CALL_ARGS];
        for (slot, &arg) in args.iter().enumerate() {
            if let Arg::Reg(reg) = arg {
                if reg == self.target.arg_regs[slot] {
                    continue;
                }
            }
            pending[slot] = Some(arg);
        }

        loop {
            let mut emitted = false;
            let mut blocked = 0;
            for slot in 0..args.len() {
                let Some(arg) = pending[slot] else { continue };
                let dst = self.target.arg_regs[slot];
                if self.source_still_needed(dst, slot, &pending, args.len()) {
                    blocked += 1;
                    continue;
                }
                self.load_arg(dst, arg)?;
                pending[slot] = None;
                emitted = true;
            }
            if blocked == 0 {
                return Ok(());
            }
            if !emitted {
                self.break_cycle(&mut pending, args.len())?;
            }
        }
    }

    /// Whether a pending argument other than `slot` still reads `reg`.
    fn source_still_needed(
        &self,
        reg: Gpr,
        slot: usize,
        pending: &[Option<Arg>; MAX_CALL_ARGS],
        len: usize,
    ) -> bool {
        (0..len).any(|other| {
            other != slot
                && match pending[other] {
                    Some(Arg::Reg(src)) => src == reg,
                    Some(Arg::Mem(mem)) => mem.base == reg,
                    _ => false,
                }
        })
    }

    /// Break a marshalling cycle by parking one contended value.
    ///
    /// The first pending slot's destination register still feeds other
    /// pending arguments; its current value moves to the scratch register
    /// and the readers are retargeted, which unblocks that slot on the next
    /// pass. An argument reading the scratch register is never pending when
    /// the walk stalls, so the parked value cannot be clobbered before its
    /// readers consume it.
    fn break_cycle(
        &mut self,
        pending: &mut [Option<Arg>; MAX_CALL_ARGS],
        len: usize,
    ) -> EmitResult {
        let scratch = self.target.scratch;
        for slot in 0..len {
            if pending[slot].is_none() {
                continue;
            }
            let contended = self.target.arg_regs[slot];
            self.emitter.mov_reg_reg(scratch, contended)?;
            for reader in pending.iter_mut().take(len) {
                match reader {
                    Some(Arg::Reg(src)) if *src == contended => *src = scratch,
                    Some(Arg::Mem(mem)) if mem.base == contended => mem.base = scratch,
                    _ => {}
                }
            }
            return Ok(());
        }
        Ok(())
    }
}
