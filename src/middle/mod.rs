//! The CFG level of the compiler. Functions arrive here as a CFG of
//! three-address instructions over temporaries, are put in SSA form for the
//! back end, and are taken out of it again before linearization.

pub mod cfg;
pub mod dominance;
pub mod lir;
pub mod ssa;
