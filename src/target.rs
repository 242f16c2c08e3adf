// This module implements target calling-convention profiles for stub emission.
// A Target bundles everything the emission sequences need to know about one
// platform ABI: word size, call-site stack alignment, shadow space, the ordered
// integer argument registers, the scratch register for far calls, and the
// callee-saved set for whole-frame entry stubs. Four profiles cover the
// supported conventions: WIN64 (Microsoft x64 with 0x20 bytes of shadow
// space), SYSV64 (System V AMD64), WIN32 (stdcall/cdecl-style stack args,
// 4-byte alignment) and SYSV32 (i386 System V with 16-byte call-site
// alignment). HOST selects the profile matching the compilation target at
// build time, while explicit profiles support cross-target emission and tests.

//! Calling-convention profiles and frame-size alignment.

use crate::regs::Gpr;

/// Calling convention implemented by a [`Target`] profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Abi {
    /// Microsoft x64: RCX, RDX, R8, R9 plus 0x20 bytes of shadow space.
    Win64,
    /// System V AMD64: RDI, RSI, RDX, RCX, R8, R9.
    SysV64,
    /// 32-bit Windows: all arguments on the stack, 4-byte alignment.
    Win32,
    /// 32-bit System V: stack arguments with 16-byte call-site alignment.
    SysV32,
}

/// One platform ABI as seen by the stub emitter.
///
/// Profiles are plain data; every emission sequence consults the active
/// profile instead of branching on compile-time platform flags.
#[derive(Debug, PartialEq, Eq)]
pub struct Target {
    /// Calling convention this profile implements.
    pub abi: Abi,
    /// Machine word size in bytes: 8 for the 64-bit profiles, 4 otherwise.
    pub word: u32,
    /// Stack alignment required at a call site.
    pub stack_align: u32,
    /// Fixed spill area the caller reserves directly below its outgoing
    /// stack arguments (Win64 only).
    pub shadow: u32,
    /// Integer argument registers in assignment order. Empty on the 32-bit
    /// profiles, which pass every argument on the stack.
    pub arg_regs: &'static [Gpr],
    /// Volatile register used to materialize far-call targets and to park
    /// values during argument marshalling.
    pub scratch: Gpr,
    /// Callee-saved registers beyond the frame pointer, in the order a
    /// whole-frame entry stub pushes them.
    pub callee_saved: &'static [Gpr],
    /// Stack bytes a whole-frame entry stub reserves after its pushes.
    pub entry_pad: u32,
}

impl Target {
    pub const WIN64: Target = Target {
        abi: Abi::Win64,
        word: 8,
        stack_align: 16,
        shadow: 0x20,
        arg_regs: &[Gpr::Rcx, Gpr::Rdx, Gpr::R8, Gpr::R9],
        scratch: Gpr::Rax,
        callee_saved: &[Gpr::Rbx, Gpr::Rsi, Gpr::Rdi, Gpr::R12, Gpr::R13, Gpr::R14, Gpr::R15],
        entry_pad: 0x28,
    };

    pub const SYSV64: Target = Target {
        abi: Abi::SysV64,
        word: 8,
        stack_align: 16,
        shadow: 0,
        arg_regs: &[Gpr::Rdi, Gpr::Rsi, Gpr::Rdx, Gpr::Rcx, Gpr::R8, Gpr::R9],
        scratch: Gpr::Rax,
        callee_saved: &[Gpr::Rbx, Gpr::R12, Gpr::R13, Gpr::R14, Gpr::R15],
        entry_pad: 8,
    };

    pub const WIN32: Target = Target {
        abi: Abi::Win32,
        word: 4,
        stack_align: 4,
        shadow: 0,
        arg_regs: &[],
        scratch: Gpr::Rax,
        callee_saved: &[Gpr::Rbx, Gpr::Rsi, Gpr::Rdi],
        entry_pad: 0xc,
    };

    pub const SYSV32: Target = Target {
        abi: Abi::SysV32,
        word: 4,
        stack_align: 16,
        shadow: 0,
        arg_regs: &[],
        scratch: Gpr::Rax,
        callee_saved: &[Gpr::Rbx, Gpr::Rsi, Gpr::Rdi],
        entry_pad: 0xc,
    };

    /// Profile matching the compilation target, selected at build time.
    #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
    pub const HOST: &'static Target = &Target::WIN64;
    /// Profile matching the compilation target, selected at build time.
    #[cfg(all(target_arch = "x86_64", not(target_os = "windows")))]
    pub const HOST: &'static Target = &Target::SYSV64;
    /// Profile matching the compilation target, selected at build time.
    #[cfg(all(target_arch = "x86", target_os = "windows"))]
    pub const HOST: &'static Target = &Target::WIN32;
    /// Profile matching the compilation target, selected at build time.
    #[cfg(all(target_arch = "x86", not(target_os = "windows")))]
    pub const HOST: &'static Target = &Target::SYSV32;

    /// Whether this profile uses 64-bit words.
    pub const fn is_64(&self) -> bool {
        self.word == 8
    }

    /// Frame size padded so a call made on top of it lands on an aligned
    /// stack.
    ///
    /// `frame_size` counts the outgoing stack arguments; it must be 0 on the
    /// 64-bit profiles, which marshal every supported argument in registers.
    /// `no_prolog` states that the stub runs without the surrounding
    /// function's prologue, so the bytes that prologue would have left on the
    /// stack are missing from the baseline:
    ///
    /// * 64-bit: 0x28 bytes re-align the frame and restore the shadow space
    ///   a prologue-less caller never reserved.
    /// * Win32: round up to the 4-byte word, baseline irrelevant.
    /// * SysV32: round up to a 16-byte boundary measured from a baseline of
    ///   0xc bytes when no prologue ran, 0 otherwise.
    pub fn aligned_frame_size(&self, frame_size: u32, no_prolog: bool) -> u32 {
        match self.abi {
            Abi::Win64 | Abi::SysV64 => {
                debug_assert_eq!(frame_size, 0, "64-bit stubs take no stack arguments");
                if no_prolog {
                    0x28
                } else {
                    0
                }
            }
            Abi::Win32 => (frame_size + 3) & !3,
            Abi::SysV32 => {
                let baseline: u32 = if no_prolog { 0xc } else { 0 };
                // frame_size may sit below the baseline; the math wraps.
                (frame_size.wrapping_sub(baseline).wrapping_add(15) & !15).wrapping_add(baseline)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_four_bit_frames() {
        for target in [&Target::WIN64, &Target::SYSV64] {
            assert_eq!(target.aligned_frame_size(0, false), 0);
            assert_eq!(target.aligned_frame_size(0, true), 0x28);
            assert_eq!(target.aligned_frame_size(0, true) % target.stack_align, 8);
        }
    }

    #[test]
    fn win32_rounds_to_word() {
        let target = &Target::WIN32;
        assert_eq!(target.aligned_frame_size(0, false), 0);
        assert_eq!(target.aligned_frame_size(1, false), 4);
        assert_eq!(target.aligned_frame_size(4, false), 4);
        assert_eq!(target.aligned_frame_size(6, false), 8);
        assert_eq!(target.aligned_frame_size(13, true), 16);
        for frame in 0..64 {
            assert_eq!(target.aligned_frame_size(frame, false) % 4, 0);
            assert!(target.aligned_frame_size(frame, false) >= frame);
        }
    }

    #[test]
    fn sysv32_respects_sixteen_byte_call_sites() {
        let target = &Target::SYSV32;
        assert_eq!(target.aligned_frame_size(0, false), 0);
        assert_eq!(target.aligned_frame_size(1, false), 16);
        assert_eq!(target.aligned_frame_size(16, false), 16);
        assert_eq!(target.aligned_frame_size(17, false), 32);
        for frame in 0..64 {
            assert_eq!(target.aligned_frame_size(frame, false) % 16, 0);
        }
    }

    #[test]
    fn sysv32_without_prologue_lands_on_baseline() {
        let target = &Target::SYSV32;
        // 0xc bytes are assumed present; padding tops the frame back up to
        // the same residue.
        assert_eq!(target.aligned_frame_size(0, true), 12);
        assert_eq!(target.aligned_frame_size(4, true), 12);
        assert_eq!(target.aligned_frame_size(12, true), 12);
        assert_eq!(target.aligned_frame_size(13, true), 28);
        for frame in 0..64 {
            assert_eq!(target.aligned_frame_size(frame, true) % 16, 12);
            assert!(target.aligned_frame_size(frame, true) >= frame);
        }
    }

    #[test]
    fn argument_register_order() {
        assert_eq!(
            Target::WIN64.arg_regs,
            [Gpr::Rcx, Gpr::Rdx, Gpr::R8, Gpr::R9]
        );
        assert_eq!(
            Target::SYSV64.arg_regs,
            [Gpr::Rdi, Gpr::Rsi, Gpr::Rdx, Gpr::Rcx, Gpr::R8, Gpr::R9]
        );
        assert!(Target::WIN32.arg_regs.is_empty());
        assert!(Target::SYSV32.arg_regs.is_empty());
    }

    #[test]
    fn shadow_space_is_win64_only() {
        assert_eq!(Target::WIN64.shadow, 0x20);
        assert_eq!(Target::SYSV64.shadow, 0);
        assert_eq!(Target::WIN32.shadow, 0);
        assert_eq!(Target::SYSV32.shadow, 0);
    }

    #[test]
    fn scratch_is_never_an_argument_register() {
        for target in [&Target::WIN64, &Target::SYSV64, &Target::WIN32, &Target::SYSV32] {
            assert!(!target.arg_regs.contains(&target.scratch));
        }
    }

    #[cfg(target_arch = "x86_64")]
    #[test]
    fn host_profile_is_64_bit() {
        assert!(Target::HOST.is_64());
    }
}
