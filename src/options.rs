use strum::{Display, EnumString};

use crate::middle::lir::Register;

/// Which register allocator runs after SSA construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, clap::ValueEnum)]
#[strum(serialize_all = "kebab-case")]
pub enum AllocatorKind {
    /// Keep temporaries in the output
    None,
    /// Give every temporary a frame slot
    AllInMemory,
    /// Color the interference graph, spilling to the frame
    #[default]
    GraphColoring,
}

/// The order in which blocks are laid out by linearization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString, clap::ValueEnum)]
#[strum(serialize_all = "kebab-case")]
pub enum BlockOrder {
    /// Entry first, then in order of label creation
    #[default]
    Declaration,
    /// Chains of blocks following fall-through successors
    Trace,
}

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub allocator: AllocatorKind,
    /// How many of the allocatable registers the graph coloring allocator
    /// may hand out
    pub registers: usize,
    pub ssa: bool,
    pub block_order: BlockOrder,
    /// Drop unconditional jumps to the block laid out right after
    pub elide_jumps: bool,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        Self {
            allocator: AllocatorKind::default(),
            registers: Register::ALLOCATABLE.len(),
            ssa: true,
            block_order: BlockOrder::default(),
            elide_jumps: false,
        }
    }
}
