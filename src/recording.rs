//! Recording emitter for inspecting stub sequences in tests.
//!
//! [`RecordingEmitter`] implements [`Emitter`] without producing machine
//! code: it captures every operation as an [`EmittedOp`] and tracks the net
//! stack-pointer movement, so tests can assert on instruction order, operand
//! choice and stack balance. Positions advance by nominal instruction
//! lengths, close enough for call-distance decisions.

use crate::emitter::{Emitter, Mem, CALL_REL32_LEN};
use crate::error::{EmitError, EmitResult};
use crate::regs::{Gpr, Xmm};
use crate::target::Target;

/// One recorded emitter operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmittedOp {
    PushReg(Gpr),
    PopReg(Gpr),
    PushImm16(u16),
    PushImm32(u32),
    PushMem32(Mem),
    MovRegReg { dst: Gpr, src: Gpr },
    MovRegImm32 { dst: Gpr, imm: u32 },
    MovRegImm64 { dst: Gpr, imm: u64 },
    MovRegMem32 { dst: Gpr, src: Mem },
    SubSp(u32),
    AddSp(u32),
    StoreXmm { dst: Mem, src: Xmm },
    LoadXmm { dst: Xmm, src: Mem },
    Call(u64),
    CallReg(Gpr),
}

/// [`Emitter`] that records operations instead of encoding them.
pub struct RecordingEmitter {
    ops: Vec<EmittedOp>,
    position: u64,
    sp_delta: i64,
    word: u32,
}

impl RecordingEmitter {
    /// Recorder for `target` starting at a default base address.
    pub fn new(target: &Target) -> Self {
        Self::with_base(target, 0x1000)
    }

    /// Recorder for `target` with an explicit base address, for tests that
    /// exercise call-distance decisions.
    pub fn with_base(target: &Target, base: u64) -> Self {
        Self {
            ops: Vec::new(),
            position: base,
            sp_delta: 0,
            word: target.word,
        }
    }

    /// Operations recorded so far, in emission order.
    pub fn ops(&self) -> &[EmittedOp] {
        &self.ops
    }

    /// Consume the recorder and return the operation stream.
    pub fn into_ops(self) -> Vec<EmittedOp> {
        self.ops
    }

    /// Net stack-pointer movement in bytes; 0 means the sequence is balanced.
    pub fn sp_delta(&self) -> i64 {
        self.sp_delta
    }

    fn record(&mut self, op: EmittedOp, len: u64, sp: i64) -> EmitResult {
        self.ops.push(op);
        self.position += len;
        self.sp_delta += sp;
        Ok(())
    }
}

impl Emitter for RecordingEmitter {
    fn position(&self) -> u64 {
        self.position
    }

    fn push_reg(&mut self, reg: Gpr) -> EmitResult {
        let len = 1 + reg.is_extended() as u64;
        self.record(EmittedOp::PushReg(reg), len, -(self.word as i64))
    }

    fn pop_reg(&mut self, reg: Gpr) -> EmitResult {
        let len = 1 + reg.is_extended() as u64;
        self.record(EmittedOp::PopReg(reg), len, self.word as i64)
    }

    fn push_imm16(&mut self, imm: u16) -> EmitResult {
        self.record(EmittedOp::PushImm16(imm), 4, -2)
    }

    fn push_imm32(&mut self, imm: u32) -> EmitResult {
        self.record(EmittedOp::PushImm32(imm), 5, -4)
    }

    fn push_mem32(&mut self, src: Mem) -> EmitResult {
        self.record(EmittedOp::PushMem32(src), 6, -4)
    }

    fn mov_reg_reg(&mut self, dst: Gpr, src: Gpr) -> EmitResult {
        let len = if self.word == 8 { 3 } else { 2 };
        self.record(EmittedOp::MovRegReg { dst, src }, len, 0)
    }

    fn mov_reg_imm32(&mut self, dst: Gpr, imm: u32) -> EmitResult {
        let len = 5 + dst.is_extended() as u64;
        self.record(EmittedOp::MovRegImm32 { dst, imm }, len, 0)
    }

    fn mov_reg_imm64(&mut self, dst: Gpr, imm: u64) -> EmitResult {
        if self.word != 8 {
            return Err(EmitError::UnsupportedOnTarget {
                operation: "mov reg, imm64",
                bits: self.word * 8,
            });
        }
        self.record(EmittedOp::MovRegImm64 { dst, imm }, 10, 0)
    }

    fn mov_reg_mem32(&mut self, dst: Gpr, src: Mem) -> EmitResult {
        self.record(EmittedOp::MovRegMem32 { dst, src }, 6, 0)
    }

    fn sub_sp(&mut self, bytes: u32) -> EmitResult {
        let len = if bytes >= 0x80 { 7 } else { 4 };
        self.record(EmittedOp::SubSp(bytes), len, -(bytes as i64))
    }

    fn add_sp(&mut self, bytes: u32) -> EmitResult {
        let len = if bytes >= 0x80 { 7 } else { 4 };
        self.record(EmittedOp::AddSp(bytes), len, bytes as i64)
    }

    fn store_xmm(&mut self, dst: Mem, src: Xmm) -> EmitResult {
        self.record(EmittedOp::StoreXmm { dst, src }, 7, 0)
    }

    fn load_xmm(&mut self, dst: Xmm, src: Mem) -> EmitResult {
        self.record(EmittedOp::LoadXmm { dst, src }, 7, 0)
    }

    fn call(&mut self, target: u64) -> EmitResult {
        self.record(EmittedOp::Call(target), CALL_REL32_LEN, 0)
    }

    fn call_reg(&mut self, reg: Gpr) -> EmitResult {
        let len = 2 + reg.is_extended() as u64;
        self.record(EmittedOp::CallReg(reg), len, 0)
    }
}
