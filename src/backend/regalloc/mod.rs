//! Register allocation.
//!
//! An [`Allocator`] decides a [`DataLocation`] for every temporary of a
//! function, then rewrites the instructions of the linearized code so that
//! they only mention physical registers. Temporaries living in the frame are
//! brought into the reserved scratch registers around each instruction.

use std::collections::BTreeMap;

use crate::{
    error::internal_error,
    middle::{
        cfg::Cfg,
        lir::{DataLocation, FunctionData, Instruction, Operand, Register, Temporary},
    },
};

mod all_in_memory;
mod coloring;

pub use all_in_memory::AllInMemoryAllocator;
pub use coloring::{GraphColoringAllocator, color};

pub trait Allocator {
    /// Decides a location for every temporary of `function` and records it
    fn prepare(&mut self, cfg: &Cfg, function: &mut FunctionData);

    /// Rewrites one instruction in terms of physical registers. Frame slots
    /// are loaded before and stored after the returned instruction.
    fn replace(&self, instruction: &Instruction, function: &FunctionData) -> Vec<Instruction> {
        replace_temporaries(instruction, function)
    }
}

pub fn replace_temporaries(instruction: &Instruction, function: &FunctionData) -> Vec<Instruction> {
    let mut scratch = Register::SCRATCH.iter();
    let mut replacements: BTreeMap<Temporary, (Register, Option<DataLocation>)> = BTreeMap::new();

    for temporary in instruction.temporaries() {
        let replacement = match function.location(temporary) {
            Some(DataLocation::Register(register)) => (register, None),
            Some(location @ DataLocation::Memory(_)) => match scratch.next() {
                Some(register) => (*register, Some(location)),
                None => internal_error!("out of scratch registers for `{instruction}`"),
            },
            None => internal_error!("temporary {temporary} was never allocated"),
        };
        replacements.insert(temporary, replacement);
    }

    let mut before = Vec::new();
    for temporary in instruction.uses() {
        if let (register, Some(DataLocation::Memory(offset))) = replacements[&temporary] {
            before.push(Instruction::Load {
                destination: register.into(),
                offset,
            });
        }
    }

    let mut after = Vec::new();
    for temporary in instruction.defines() {
        if let (register, Some(DataLocation::Memory(offset))) = replacements[&temporary] {
            after.push(Instruction::Store {
                source: register.into(),
                offset,
            });
        }
    }

    let substitute = |operand: Operand| match operand {
        Operand::Temporary(t) => Operand::Register(replacements[&t].0),
        other => other,
    };
    let mut replaced = instruction.clone();
    replaced.map_uses(substitute);
    replaced.map_defines(substitute);

    before.push(replaced);
    before.extend(after);
    before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middle::lir::{BinaryOperator, Offset};

    #[test]
    fn registers_are_substituted_in_place() {
        let mut function = FunctionData::new("f");
        let (a, b) = (function.fresh_temporary(), function.fresh_temporary());
        function.set_allocation(BTreeMap::from([
            (a, DataLocation::Register(Register::T0)),
            (b, DataLocation::Register(Register::T1)),
        ]));

        let replaced = replace_temporaries(
            &Instruction::BinaryOperation {
                operator: BinaryOperator::Add,
                destination: a.into(),
                lhs: b.into(),
                rhs: Operand::Immediate(1),
            },
            &function,
        );

        assert_eq!(
            replaced,
            vec![Instruction::BinaryOperation {
                operator: BinaryOperator::Add,
                destination: Register::T0.into(),
                lhs: Register::T1.into(),
                rhs: Operand::Immediate(1),
            }]
        );
    }

    #[test]
    fn frame_slots_go_through_scratch_registers() {
        let mut function = FunctionData::new("f");
        let (a, b, c) = (
            function.fresh_temporary(),
            function.fresh_temporary(),
            function.fresh_temporary(),
        );
        let (slot_a, slot_b, slot_c) = (
            function.fresh_offset(),
            function.fresh_offset(),
            function.fresh_offset(),
        );
        function.set_allocation(BTreeMap::from([
            (a, DataLocation::Memory(slot_a)),
            (b, DataLocation::Memory(slot_b)),
            (c, DataLocation::Memory(slot_c)),
        ]));

        let replaced = replace_temporaries(
            &Instruction::BinaryOperation {
                operator: BinaryOperator::Sub,
                destination: a.into(),
                lhs: b.into(),
                rhs: c.into(),
            },
            &function,
        );

        assert_eq!(
            replaced,
            vec![
                Instruction::Load {
                    destination: Register::S2.into(),
                    offset: slot_b,
                },
                Instruction::Load {
                    destination: Register::S3.into(),
                    offset: slot_c,
                },
                Instruction::BinaryOperation {
                    operator: BinaryOperator::Sub,
                    destination: Register::S1.into(),
                    lhs: Register::S2.into(),
                    rhs: Register::S3.into(),
                },
                Instruction::Store {
                    source: Register::S1.into(),
                    offset: slot_a,
                },
            ]
        );
    }

    #[test]
    fn a_temporary_read_and_written_uses_one_scratch_register() {
        let mut function = FunctionData::new("f");
        let n = function.fresh_temporary();
        function.set_allocation(BTreeMap::from([(n, DataLocation::Memory(Offset(-8)))]));

        let replaced = replace_temporaries(
            &Instruction::BinaryOperation {
                operator: BinaryOperator::Sub,
                destination: n.into(),
                lhs: n.into(),
                rhs: Operand::Immediate(1),
            },
            &function,
        );

        assert_eq!(replaced.len(), 3);
        assert_eq!(
            replaced[1],
            Instruction::BinaryOperation {
                operator: BinaryOperator::Sub,
                destination: Register::S1.into(),
                lhs: Register::S1.into(),
                rhs: Operand::Immediate(1),
            }
        );
    }

    #[test]
    fn instructions_without_temporaries_are_unchanged() {
        let function = FunctionData::new("f");
        let copy = Instruction::Move {
            destination: Register::A0.into(),
            source: Register::S3.into(),
        };

        assert_eq!(replace_temporaries(&copy, &function), vec![copy]);
    }
}
