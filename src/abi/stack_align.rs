//! Call-site stack alignment around outgoing arguments.

use super::AbiEmitter;
use crate::emitter::Emitter;
use crate::error::EmitResult;

impl<'e, E: Emitter> AbiEmitter<'e, E> {
    /// Pad the stack so a call emitted on top of `frame_size` bytes of
    /// outgoing arguments lands on the profile's required alignment.
    ///
    /// The padding is subtracted first and the arguments are pushed on top
    /// of it afterwards. Emits nothing when the frame is already aligned.
    pub fn align_stack(&mut self, frame_size: u32, no_prolog: bool) -> EmitResult {
        let fill = self.target.aligned_frame_size(frame_size, no_prolog) - frame_size;
        if fill != 0 {
            self.emitter.sub_sp(fill)?;
        }
        Ok(())
    }

    /// Release the padding together with the pushed arguments: the full
    /// aligned frame.
    ///
    /// The supported conventions are caller-cleanup, so the callee returns
    /// with the argument bytes still on the stack.
    pub fn restore_stack(&mut self, frame_size: u32, no_prolog: bool) -> EmitResult {
        let aligned = self.target.aligned_frame_size(frame_size, no_prolog);
        if aligned != 0 {
            self.emitter.add_sp(aligned)?;
        }
        Ok(())
    }
}
