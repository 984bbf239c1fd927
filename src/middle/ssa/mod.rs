//! Conversion of a [`Cfg`](crate::middle::cfg::Cfg) into and out of static
//! single assignment form.

mod enter;
mod exit;
pub mod moves;

pub use enter::enter_ssa;
pub use exit::exit_ssa;
