// This module provides the machine-code emitter backend using the iced-x86
// library. X86Encoder implements the Emitter trait by encoding each operation
// to bytes immediately, at a fixed bitness of 32 or 64, and appending them to
// an internal code buffer. Immediate encoding (rather than deferred assembly)
// is what lets the ABI layer ask for the exact byte position mid-sequence,
// which the far-call decision depends on. The encoder maps Gpr/Xmm identifiers
// to iced registers through constant tables, picks short immediate forms for
// stack adjustments below 0x80 bytes, and rejects operations the configured
// bitness cannot encode (64-bit immediate moves on a 32-bit buffer, 32-bit
// memory pushes on a 64-bit buffer) before they reach the library.

//! Byte-exact instruction encoding using iced-x86.

use iced_x86::{Code, Encoder, Instruction, MemoryOperand, Register};

use crate::emitter::{call_fits_rel32, Emitter, Mem, CALL_REL32_LEN};
use crate::error::{EmitError, EmitResult};
use crate::regs::{Gpr, Xmm};
use crate::target::Target;

const GP64_REGS: [Register; 16] = [
    Register::RAX,
    Register::RCX,
    Register::RDX,
    Register::RBX,
    Register::RSP,
    Register::RBP,
    Register::RSI,
    Register::RDI,
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

const GP32_REGS: [Register; 16] = [
    Register::EAX,
    Register::ECX,
    Register::EDX,
    Register::EBX,
    Register::ESP,
    Register::EBP,
    Register::ESI,
    Register::EDI,
    Register::R8D,
    Register::R9D,
    Register::R10D,
    Register::R11D,
    Register::R12D,
    Register::R13D,
    Register::R14D,
    Register::R15D,
];

const XMM_REGS: [Register; 16] = [
    Register::XMM0,
    Register::XMM1,
    Register::XMM2,
    Register::XMM3,
    Register::XMM4,
    Register::XMM5,
    Register::XMM6,
    Register::XMM7,
    Register::XMM8,
    Register::XMM9,
    Register::XMM10,
    Register::XMM11,
    Register::XMM12,
    Register::XMM13,
    Register::XMM14,
    Register::XMM15,
];

/// [`Emitter`] that encodes instructions to bytes with iced-x86.
///
/// Each operation is encoded at the current position and appended to the code
/// buffer, so [`position`](Emitter::position) is exact at every point of a
/// sequence. The buffer may hold a partially emitted sequence after an error.
pub struct X86Encoder {
    encoder: Encoder,
    code: Vec<u8>,
    base: u64,
    bitness: u32,
}

impl X86Encoder {
    /// Encoder for raw `bitness` (32 or 64) emitting at `base`.
    pub fn new(bitness: u32, base: u64) -> Self {
        debug_assert!(bitness == 32 || bitness == 64);
        Self {
            encoder: Encoder::new(bitness),
            code: Vec::new(),
            base,
            bitness,
        }
    }

    /// Encoder matching a target profile's word size.
    pub fn for_target(target: &Target, base: u64) -> Self {
        Self::new(target.word * 8, base)
    }

    /// Bytes emitted so far.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Consume the encoder and return the emitted bytes.
    pub fn into_code(self) -> Vec<u8> {
        self.code
    }

    /// Address the buffer starts at.
    pub fn base(&self) -> u64 {
        self.base
    }

    fn emit(&mut self, instruction: Instruction) -> EmitResult {
        let rip = self.position();
        if let Err(e) = self.encoder.encode(&instruction, rip) {
            // A failed encode leaves whatever it already wrote in the
            // library's buffer; drain it so later instructions start clean.
            let _ = self.encoder.take_buffer();
            return Err(EmitError::Encoding {
                reason: e.to_string(),
            });
        }
        let bytes = self.encoder.take_buffer();
        self.code.extend_from_slice(&bytes);
        Ok(())
    }

    /// Word-sized register name for the configured bitness.
    fn gp(&self, reg: Gpr) -> Register {
        if self.bitness == 64 {
            GP64_REGS[reg.index() as usize]
        } else {
            GP32_REGS[reg.index() as usize]
        }
    }

    /// 32-bit register name regardless of bitness; writing it zero-extends
    /// on 64-bit targets.
    fn gp32(&self, reg: Gpr) -> Register {
        GP32_REGS[reg.index() as usize]
    }

    fn mem(&self, mem: Mem) -> MemoryOperand {
        MemoryOperand::with_base_displ(self.gp(mem.base), mem.disp as i64)
    }
}

impl Emitter for X86Encoder {
    fn position(&self) -> u64 {
        self.base + self.code.len() as u64
    }

    fn push_reg(&mut self, reg: Gpr) -> EmitResult {
        let code = if self.bitness == 64 {
            Code::Push_r64
        } else {
            Code::Push_r32
        };
        let instruction = Instruction::with1(code, self.gp(reg)).map_err(|e| {
            EmitError::Encoding {
                reason: e.to_string(),
            }
        })?;
        self.emit(instruction)
    }

    fn pop_reg(&mut self, reg: Gpr) -> EmitResult {
        let code = if self.bitness == 64 {
            Code::Pop_r64
        } else {
            Code::Pop_r32
        };
        let instruction = Instruction::with1(code, self.gp(reg)).map_err(|e| {
            EmitError::Encoding {
                reason: e.to_string(),
            }
        })?;
        self.emit(instruction)
    }

    fn push_imm16(&mut self, imm: u16) -> EmitResult {
        // 66-prefixed push: a 2-byte slot in both modes.
        let instruction =
            Instruction::with1(Code::Push_imm16, imm as u32).map_err(|e| EmitError::Encoding {
                reason: e.to_string(),
            })?;
        self.emit(instruction)
    }

    fn push_imm32(&mut self, imm: u32) -> EmitResult {
        // In 64-bit mode the hardware sign-extends imm32 into an 8-byte slot.
        let instruction = if self.bitness == 64 {
            Instruction::with1(Code::Pushq_imm32, imm as i32)
        } else {
            Instruction::with1(Code::Pushd_imm32, imm)
        }
        .map_err(|e| EmitError::Encoding {
            reason: e.to_string(),
        })?;
        self.emit(instruction)
    }

    fn push_mem32(&mut self, src: Mem) -> EmitResult {
        if self.bitness != 32 {
            return Err(EmitError::UnsupportedOnTarget {
                operation: "push m32",
                bits: self.bitness,
            });
        }
        let operand = self.mem(src);
        let instruction =
            Instruction::with1(Code::Push_rm32, operand).map_err(|e| EmitError::Encoding {
                reason: e.to_string(),
            })?;
        self.emit(instruction)
    }

    fn mov_reg_reg(&mut self, dst: Gpr, src: Gpr) -> EmitResult {
        let code = if self.bitness == 64 {
            Code::Mov_r64_rm64
        } else {
            Code::Mov_r32_rm32
        };
        let instruction =
            Instruction::with2(code, self.gp(dst), self.gp(src)).map_err(|e| {
                EmitError::Encoding {
                    reason: e.to_string(),
                }
            })?;
        self.emit(instruction)
    }

    fn mov_reg_imm32(&mut self, dst: Gpr, imm: u32) -> EmitResult {
        let instruction = Instruction::with2(Code::Mov_r32_imm32, self.gp32(dst), imm).map_err(
            |e| EmitError::Encoding {
                reason: e.to_string(),
            },
        )?;
        self.emit(instruction)
    }

    fn mov_reg_imm64(&mut self, dst: Gpr, imm: u64) -> EmitResult {
        if self.bitness != 64 {
            return Err(EmitError::UnsupportedOnTarget {
                operation: "mov reg, imm64",
                bits: self.bitness,
            });
        }
        let instruction = Instruction::with2(Code::Mov_r64_imm64, self.gp(dst), imm).map_err(
            |e| EmitError::Encoding {
                reason: e.to_string(),
            },
        )?;
        self.emit(instruction)
    }

    fn mov_reg_mem32(&mut self, dst: Gpr, src: Mem) -> EmitResult {
        let operand = self.mem(src);
        let instruction = Instruction::with2(Code::Mov_r32_rm32, self.gp32(dst), operand)
            .map_err(|e| EmitError::Encoding {
                reason: e.to_string(),
            })?;
        self.emit(instruction)
    }

    fn sub_sp(&mut self, bytes: u32) -> EmitResult {
        let code = match (self.bitness, bytes >= 0x80) {
            (64, false) => Code::Sub_rm64_imm8,
            (64, true) => Code::Sub_rm64_imm32,
            (_, false) => Code::Sub_rm32_imm8,
            (_, true) => Code::Sub_rm32_imm32,
        };
        let instruction = Instruction::with2(code, self.gp(Gpr::Rsp), bytes as i32).map_err(
            |e| EmitError::Encoding {
                reason: e.to_string(),
            },
        )?;
        self.emit(instruction)
    }

    fn add_sp(&mut self, bytes: u32) -> EmitResult {
        let code = match (self.bitness, bytes >= 0x80) {
            (64, false) => Code::Add_rm64_imm8,
            (64, true) => Code::Add_rm64_imm32,
            (_, false) => Code::Add_rm32_imm8,
            (_, true) => Code::Add_rm32_imm32,
        };
        let instruction = Instruction::with2(code, self.gp(Gpr::Rsp), bytes as i32).map_err(
            |e| EmitError::Encoding {
                reason: e.to_string(),
            },
        )?;
        self.emit(instruction)
    }

    fn store_xmm(&mut self, dst: Mem, src: Xmm) -> EmitResult {
        let operand = self.mem(dst);
        let instruction = Instruction::with2(
            Code::Movapd_xmmm128_xmm,
            operand,
            XMM_REGS[src.index() as usize],
        )
        .map_err(|e| EmitError::Encoding {
            reason: e.to_string(),
        })?;
        self.emit(instruction)
    }

    fn load_xmm(&mut self, dst: Xmm, src: Mem) -> EmitResult {
        let operand = self.mem(src);
        let instruction = Instruction::with2(
            Code::Movapd_xmm_xmmm128,
            XMM_REGS[dst.index() as usize],
            operand,
        )
        .map_err(|e| EmitError::Encoding {
            reason: e.to_string(),
        })?;
        self.emit(instruction)
    }

    fn call(&mut self, target: u64) -> EmitResult {
        let position = self.position();
        // rel32 spans the whole address space in 32-bit mode; only 64-bit
        // buffers can place a target out of reach.
        if self.bitness == 64 && !call_fits_rel32(target, position.wrapping_add(CALL_REL32_LEN)) {
            return Err(EmitError::DisplacementOutOfRange { position, target });
        }
        let code = if self.bitness == 64 {
            Code::Call_rel32_64
        } else {
            Code::Call_rel32_32
        };
        let instruction = Instruction::with_branch(code, target).map_err(|e| {
            EmitError::Encoding {
                reason: e.to_string(),
            }
        })?;
        self.emit(instruction)
    }

    fn call_reg(&mut self, reg: Gpr) -> EmitResult {
        let code = if self.bitness == 64 {
            Code::Call_rm64
        } else {
            Code::Call_rm32
        };
        let instruction = Instruction::with1(code, self.gp(reg)).map_err(|e| {
            EmitError::Encoding {
                reason: e.to_string(),
            }
        })?;
        self.emit(instruction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc64() -> X86Encoder {
        X86Encoder::new(64, 0x1000)
    }

    fn enc32() -> X86Encoder {
        X86Encoder::new(32, 0x1000)
    }

    #[test]
    fn push_pop_encodings() {
        let mut enc = enc64();
        enc.push_reg(Gpr::Rax).unwrap();
        enc.push_reg(Gpr::R12).unwrap();
        enc.pop_reg(Gpr::R12).unwrap();
        enc.pop_reg(Gpr::Rax).unwrap();
        assert_eq!(enc.code(), [0x50, 0x41, 0x54, 0x41, 0x5c, 0x58]);

        let mut enc = enc32();
        enc.push_reg(Gpr::Rbx).unwrap();
        enc.pop_reg(Gpr::Rbx).unwrap();
        assert_eq!(enc.code(), [0x53, 0x5b]);
    }

    #[test]
    fn stack_adjustments_pick_short_forms() {
        let mut enc = enc64();
        enc.sub_sp(0x28).unwrap();
        enc.add_sp(0x28).unwrap();
        assert_eq!(
            enc.code(),
            [0x48, 0x83, 0xec, 0x28, 0x48, 0x83, 0xc4, 0x28]
        );

        let mut enc = enc64();
        enc.sub_sp(0x80).unwrap();
        assert_eq!(enc.code(), [0x48, 0x81, 0xec, 0x80, 0x00, 0x00, 0x00]);

        let mut enc = enc32();
        enc.sub_sp(0x10).unwrap();
        assert_eq!(enc.code(), [0x83, 0xec, 0x10]);
    }

    #[test]
    fn immediate_moves() {
        let mut enc = enc64();
        enc.mov_reg_imm32(Gpr::Rax, 0x2a).unwrap();
        assert_eq!(enc.code(), [0xb8, 0x2a, 0x00, 0x00, 0x00]);

        let mut enc = enc64();
        enc.mov_reg_imm32(Gpr::R10, 0x2a).unwrap();
        assert_eq!(enc.code(), [0x41, 0xba, 0x2a, 0x00, 0x00, 0x00]);

        let mut enc = enc64();
        enc.mov_reg_imm64(Gpr::Rax, 0x1122_3344_5566_7788).unwrap();
        assert_eq!(
            enc.code(),
            [0x48, 0xb8, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11]
        );
    }

    #[test]
    fn imm64_needs_a_64_bit_buffer() {
        let mut enc = enc32();
        let err = enc.mov_reg_imm64(Gpr::Rax, 0x1_0000_0000).unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedOnTarget { bits: 32, .. }));
        assert!(enc.code().is_empty());
    }

    #[test]
    fn register_moves_use_word_width() {
        let mut enc = enc64();
        enc.mov_reg_reg(Gpr::Rdi, Gpr::Rsi).unwrap();
        assert_eq!(enc.code(), [0x48, 0x8b, 0xfe]);

        let mut enc = enc32();
        enc.mov_reg_reg(Gpr::Rdi, Gpr::Rsi).unwrap();
        assert_eq!(enc.code(), [0x8b, 0xfe]);
    }

    #[test]
    fn vector_saves_use_aligned_moves() {
        let mut enc = enc64();
        enc.store_xmm(Mem::base_disp(Gpr::Rsp, 0x20), Xmm::Xmm6).unwrap();
        assert_eq!(enc.code(), [0x66, 0x0f, 0x29, 0x74, 0x24, 0x20]);

        let mut enc = enc64();
        enc.load_xmm(Xmm::Xmm6, Mem::base_disp(Gpr::Rsp, 0x20)).unwrap();
        assert_eq!(enc.code(), [0x66, 0x0f, 0x28, 0x74, 0x24, 0x20]);
    }

    #[test]
    fn direct_call_encodes_rel32() {
        let mut enc = enc64();
        enc.call(0x2000).unwrap();
        // 0x2000 - (0x1000 + 5)
        assert_eq!(enc.code(), [0xe8, 0xfb, 0x0f, 0x00, 0x00]);
    }

    #[test]
    fn direct_call_rejects_far_targets() {
        let mut enc = enc64();
        let err = enc.call(0x2_0000_0000).unwrap_err();
        assert_eq!(
            err,
            EmitError::DisplacementOutOfRange {
                position: 0x1000,
                target: 0x2_0000_0000,
            }
        );
        assert!(enc.code().is_empty());
    }

    #[test]
    fn failed_encode_leaves_no_stale_bytes() {
        let mut enc = enc64();
        // Built directly so the rel32 window check in call() is bypassed;
        // iced itself rejects the distance mid-encode.
        let far = Instruction::with_branch(Code::Call_rel32_64, 0x7000_0000_0000).unwrap();
        assert!(matches!(enc.emit(far), Err(EmitError::Encoding { .. })));
        assert!(enc.code().is_empty());

        enc.push_reg(Gpr::Rbx).unwrap();
        assert_eq!(enc.code(), [0x53]);
    }

    #[test]
    fn indirect_calls() {
        let mut enc = enc64();
        enc.call_reg(Gpr::Rax).unwrap();
        enc.call_reg(Gpr::R11).unwrap();
        assert_eq!(enc.code(), [0xff, 0xd0, 0x41, 0xff, 0xd3]);
    }

    #[test]
    fn stack_argument_pushes() {
        let mut enc = enc32();
        enc.push_imm16(0x1234).unwrap();
        enc.push_imm32(0xdead_beef).unwrap();
        enc.push_mem32(Mem::base_disp(Gpr::Rbp, 8)).unwrap();
        assert_eq!(
            enc.code(),
            [
                0x66, 0x68, 0x34, 0x12, // push word 0x1234
                0x68, 0xef, 0xbe, 0xad, 0xde, // push dword 0xdeadbeef
                0xff, 0x75, 0x08, // push dword [ebp+8]
            ]
        );
    }

    #[test]
    fn memory_loads() {
        let mut enc = enc32();
        enc.mov_reg_mem32(Gpr::Rdx, Mem::base_disp(Gpr::Rbp, 0xc)).unwrap();
        assert_eq!(enc.code(), [0x8b, 0x55, 0x0c]);
    }

    #[test]
    fn mem_push_needs_a_32_bit_buffer() {
        let mut enc = enc64();
        let err = enc.push_mem32(Mem::base(Gpr::Rbp)).unwrap_err();
        assert!(matches!(err, EmitError::UnsupportedOnTarget { bits: 64, .. }));
    }

    #[test]
    fn position_tracks_emitted_bytes() {
        let mut enc = enc64();
        assert_eq!(enc.position(), 0x1000);
        enc.push_reg(Gpr::Rbx).unwrap();
        assert_eq!(enc.position(), 0x1001);
        enc.sub_sp(0x20).unwrap();
        assert_eq!(enc.position(), 0x1005);
    }
}
