// This module defines error types for stub emission using the thiserror crate for
// idiomatic Rust error handling. EmitError is the main error enum covering the
// failure scenarios of the emitter seam: an encoding backend rejecting an
// instruction, a direct call whose displacement falls outside the rel32 window,
// and requests the active target profile cannot express (such as a 64-bit
// immediate move on a 32-bit profile). Each variant carries the context needed
// to diagnose the failing emission site. The module also provides EmitResult as
// a convenience alias; every emitter operation returns it.

//! Error types for ABI stub emission.
//!
//! Using thiserror for more idiomatic error handling.

use thiserror::Error;

/// Main error type for stub emission.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("Instruction encoding failed: {reason}")]
    Encoding {
        reason: String,
    },

    #[error("Call displacement from {position:#x} to {target:#x} does not fit in rel32")]
    DisplacementOutOfRange {
        position: u64,
        target: u64,
    },

    #[error("Operation not encodable on a {bits}-bit target: {operation}")]
    UnsupportedOnTarget {
        operation: &'static str,
        bits: u32,
    },
}

/// Result type alias for emission operations.
pub type EmitResult = Result<(), EmitError>;
