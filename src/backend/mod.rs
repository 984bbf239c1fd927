//! The backend of the compiler decides where every temporary lives and
//! flattens the CFG into linear code.
//!
//! To get there, several steps are required:
//! 1. Compute which temporaries are live after each statement.
//! 2. Build the interference graph and allocate registers, spilling to the
//!    frame when they run out.
//! 3. Lay out the blocks and expand terminators into jumps.

pub mod interference;
pub mod linearize;
pub mod liveness;
pub mod regalloc;
