//! xabi - ABI call stubs for x86/x86-64 JIT code generators.
//!
//! xabi emits the glue a JIT needs to call into host-runtime functions:
//! call-site stack alignment, caller-side register saves and complete call
//! stubs with argument marshalling and automatic far-call handling. One set
//! of emission sequences serves the four supported calling conventions
//! (Win64, System V x86-64, Win32, System V i386) through data-driven
//! target profiles.
//!
//! # Primary Usage
//!
//! ```
//! use xabi::{AbiEmitter, Arg, Target, X86Encoder};
//!
//! // Encode at a known base address so call displacements resolve.
//! let mut encoder = X86Encoder::for_target(&Target::SYSV64, 0x1000);
//! let mut abi = AbiEmitter::with_target(&mut encoder, &Target::SYSV64);
//!
//! // mov edi, 10; mov esi, 20; call 0x2000
//! abi.call(0x2000, &[Arg::Imm(10), Arg::Imm(20)])?;
//!
//! let code = encoder.into_code();
//! assert!(!code.is_empty());
//! # Ok::<(), xabi::EmitError>(())
//! ```
//!
//! # Architecture
//!
//! - [`abi`] - Emission sequences: alignment, register saves, call stubs
//! - [`target`] - Calling-convention profiles and frame-size math
//! - [`regs`] - Register identifiers and save masks
//! - [`emitter`] - The emitter seam the sequences drive
//! - [`encoder`] - iced-x86 backed machine-code emitter
//! - [`recording`] - Recording emitter for tests
//! - [`error`] - Error and result types

pub mod abi;
pub mod emitter;
pub mod encoder;
pub mod error;
pub mod recording;
pub mod regs;
pub mod target;

// Re-export the working set so typical users need a single import.
pub use abi::{AbiEmitter, Arg, MAX_CALL_ARGS};
pub use emitter::{call_fits_rel32, Emitter, Mem, CALL_REL32_LEN};
pub use encoder::X86Encoder;
pub use error::{EmitError, EmitResult};
pub use recording::{EmittedOp, RecordingEmitter};
pub use regs::{Gpr, RegMask, Xmm};
pub use target::{Abi, Target};
