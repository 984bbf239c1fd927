use std::collections::BTreeMap;

use crate::{
    error::internal_error,
    index::{Index, IndexVec},
    middle::lir::{DataLocation, Label, Offset, Temporary},
};

/// Size in bytes of every frame slot
pub const SLOT_SIZE: i64 = 8;

/// Per-function code generation context.
///
/// Owns every counter a pass may draw fresh names from (temporaries, labels,
/// frame slots) so that independent functions never share mutable state.
/// Once an allocator has run it also records where each temporary lives.
#[derive(Debug, Clone)]
pub struct FunctionData {
    pub symbol_name: String,
    /// Temporaries holding the incoming arguments, in order
    pub parameters: Vec<Temporary>,
    /// The pool. Each entry is the allocated location, if any.
    temporaries: IndexVec<Temporary, Option<DataLocation>>,
    next_label: Label,
    end_label: Label,
    /// Bytes of frame handed out so far
    frame_size: i64,
    allocated: bool,
}

impl FunctionData {
    pub fn new(symbol_name: impl Into<String>) -> Self {
        let mut next_label = Label::new(0);
        let end_label = next_label;
        next_label.increment_by(1);

        Self {
            symbol_name: symbol_name.into(),
            parameters: Vec::new(),
            temporaries: IndexVec::new(),
            next_label,
            end_label,
            frame_size: 0,
            allocated: false,
        }
    }

    pub fn fresh_temporary(&mut self) -> Temporary {
        self.temporaries.push(None)
    }

    pub fn fresh_label(&mut self) -> Label {
        let label = self.next_label;
        self.next_label.increment_by(1);
        label
    }

    /// The pseudo label of the function epilogue. No block carries it.
    pub fn end_label(&self) -> Label {
        self.end_label
    }

    /// Reserves a new frame slot below the frame pointer
    pub fn fresh_offset(&mut self) -> Offset {
        self.frame_size += SLOT_SIZE;
        Offset(-self.frame_size)
    }

    pub fn frame_size(&self) -> i64 {
        self.frame_size
    }

    /// Every temporary of the pool, including ones no instruction references
    /// anymore
    pub fn temporaries(&self) -> Vec<Temporary> {
        self.temporaries.indices().collect()
    }

    pub fn temporary_count(&self) -> usize {
        self.temporaries.len()
    }

    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Records the decision of an allocator. Every temporary of the pool must
    /// be given a location.
    pub fn set_allocation(&mut self, allocation: BTreeMap<Temporary, DataLocation>) {
        for temporary in self.temporaries.indices().collect::<Vec<_>>() {
            let Some(location) = allocation.get(&temporary) else {
                internal_error!("no location decided for temporary {temporary}");
            };
            self.temporaries[temporary] = Some(*location);
        }
        self.allocated = true;
    }

    /// Location of an allocated temporary
    pub fn location(&self, temporary: Temporary) -> Option<DataLocation> {
        self.temporaries.get(temporary).copied().flatten()
    }

    pub fn allocation(&self) -> BTreeMap<Temporary, DataLocation> {
        self.temporaries
            .enumerate()
            .filter_map(|(t, location)| location.map(|l| (t, l)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::lir::Register;

    #[test]
    fn fresh_names_are_distinct() {
        let mut function = FunctionData::new("f");
        let a = function.fresh_temporary();
        let b = function.fresh_temporary();
        assert_ne!(a, b);

        let l = function.fresh_label();
        assert_ne!(l, function.end_label());
        assert_ne!(l, function.fresh_label());
    }

    #[test]
    fn offsets_grow_downwards() {
        let mut function = FunctionData::new("f");
        assert_eq!(function.fresh_offset(), Offset(-8));
        assert_eq!(function.fresh_offset(), Offset(-16));
        assert_eq!(function.frame_size(), 16);
    }

    #[test]
    fn allocation_is_recorded() {
        let mut function = FunctionData::new("f");
        let a = function.fresh_temporary();
        let b = function.fresh_temporary();
        assert!(!function.is_allocated());

        let slot = function.fresh_offset();
        function.set_allocation(BTreeMap::from([
            (a, DataLocation::Register(Register::T0)),
            (b, DataLocation::Memory(slot)),
        ]));

        assert!(function.is_allocated());
        assert_eq!(function.location(a), Some(DataLocation::Register(Register::T0)));
        assert_eq!(function.location(b), Some(DataLocation::Memory(slot)));
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn partial_allocation_is_a_bug() {
        let mut function = FunctionData::new("f");
        function.fresh_temporary();
        function.set_allocation(BTreeMap::new());
    }
}
