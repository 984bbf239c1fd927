pub mod backend;
pub mod error;
pub mod index;
pub mod middle;
pub mod options;
pub mod pipeline;
