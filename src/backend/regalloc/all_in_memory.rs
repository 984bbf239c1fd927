use crate::{
    backend::regalloc::Allocator,
    middle::{
        cfg::Cfg,
        lir::{DataLocation, FunctionData},
    },
};

/// Gives every temporary its own frame slot
#[derive(Debug, Default)]
pub struct AllInMemoryAllocator;

impl Allocator for AllInMemoryAllocator {
    fn prepare(&mut self, _cfg: &Cfg, function: &mut FunctionData) {
        let allocation = function
            .temporaries()
            .into_iter()
            .map(|t| (t, DataLocation::Memory(function.fresh_offset())))
            .collect();

        function.set_allocation(allocation);
        log::debug!(
            "{}: {} bytes of frame for {} temporaries",
            function.symbol_name,
            function.frame_size(),
            function.temporary_count()
        );
    }
}
