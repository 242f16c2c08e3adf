// This module implements the ABI-level emission sequences on top of the
// Emitter seam. AbiEmitter binds an instruction emitter to a target
// calling-convention profile and exposes the three stub building blocks:
// call-site stack alignment (stack_align), caller-side register save and
// restore plus whole-frame entry prologues (reg_save), and complete call
// stubs with argument marshalling and far-call handling (call_stub). The
// sequences consult the profile for every platform-dependent choice, so one
// code path serves Win64, System V x86-64, Win32 and System V i386.

//! ABI emission sequences: alignment, register saves and call stubs.

mod call_stub;
mod reg_save;
mod stack_align;

pub use call_stub::{Arg, MAX_CALL_ARGS};

use crate::emitter::Emitter;
use crate::target::Target;

/// Stub emitter bound to an instruction emitter and a target profile.
///
/// Borrows the emitter so a code generator can interleave stub sequences
/// with its own emission on the same buffer.
pub struct AbiEmitter<'e, E: Emitter> {
    emitter: &'e mut E,
    target: &'static Target,
}

impl<'e, E: Emitter> AbiEmitter<'e, E> {
    /// Emitter for the build-time host profile.
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    pub fn new(emitter: &'e mut E) -> Self {
        Self::with_target(emitter, Target::HOST)
    }

    /// Emitter for an explicit profile, for cross-target emission and tests.
    pub fn with_target(emitter: &'e mut E, target: &'static Target) -> Self {
        Self { emitter, target }
    }

    /// Active target profile.
    pub fn target(&self) -> &'static Target {
        self.target
    }

    /// Underlying instruction emitter.
    pub fn emitter(&mut self) -> &mut E {
        self.emitter
    }
}
