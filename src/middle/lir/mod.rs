//! LIR (Low-level Intermediate Representation). In this form, many abstract
//! concepts like loops and conditionals are simplified to labels and jumps,
//! expression trees are flattened into three-address instructions over
//! temporaries, etc.
//!
//! The same instruction set is used in three places: inside the blocks of a
//! [`Cfg`](crate::middle::cfg::Cfg), in the flat [`LinearCode`] produced by
//! linearization, and after register allocation when temporaries have been
//! replaced by physical registers.

use std::collections::BTreeMap;

use strum::{EnumString, IntoStaticStr};

use crate::index::simple_index;

pub mod function;
pub mod interpret;
pub mod parse;
pub mod pretty_print;

pub use function::FunctionData;

simple_index! {
    /// Identifies an abstract value slot which is not yet bound to a register
    /// or a frame slot
    pub struct Temporary;
}

simple_index! {
    /// Identifies a block, or a jump target in linear code
    pub struct Label;
}

/// Physical registers of the RISC-V style target
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Register {
    /// Return value
    A0,
    /// Frame pointer, base of every [`Offset`]
    Fp,
    S1,
    S2,
    S3,
    T0,
    T1,
    T2,
    T3,
    T4,
    T5,
    T6,
    S4,
    S5,
    S6,
    S7,
    S8,
    S9,
    S10,
    S11,
}

impl Register {
    /// Registers handed out by the allocators, in order of preference
    pub const ALLOCATABLE: [Register; 15] = [
        Register::T0,
        Register::T1,
        Register::T2,
        Register::T3,
        Register::T4,
        Register::T5,
        Register::T6,
        Register::S4,
        Register::S5,
        Register::S6,
        Register::S7,
        Register::S8,
        Register::S9,
        Register::S10,
        Register::S11,
    ];

    /// Never allocated. Each use is contained in the expansion of a single
    /// instruction or a single phi move block.
    pub const SCRATCH: [Register; 3] = [Register::S1, Register::S2, Register::S3];
}

/// A frame slot, as a byte offset from [`Register::Fp`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(pub i64);

/// Where a temporary lives once it has been allocated
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DataLocation {
    Register(Register),
    Memory(Offset),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Operand {
    Temporary(Temporary),
    Register(Register),
    Immediate(i64),
}

impl Operand {
    pub fn as_temporary(self) -> Option<Temporary> {
        match self {
            Operand::Temporary(t) => Some(t),
            _ => None,
        }
    }
}

impl From<Temporary> for Operand {
    fn from(value: Temporary) -> Self {
        Operand::Temporary(value)
    }
}

impl From<Register> for Operand {
    fn from(value: Register) -> Self {
        Operand::Register(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Condition {
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            Condition::Eq => lhs == rhs,
            Condition::Ne => lhs != rhs,
            Condition::Lt => lhs < rhs,
            Condition::Le => lhs <= rhs,
            Condition::Gt => lhs > rhs,
            Condition::Ge => lhs >= rhs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum UnaryOperator {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    /// Set if less than
    Slt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    LoadImmediate {
        destination: Operand,
        value: i64,
    },
    Move {
        destination: Operand,
        source: Operand,
    },
    UnaryOperation {
        operator: UnaryOperator,
        destination: Operand,
        operand: Operand,
    },
    BinaryOperation {
        operator: BinaryOperator,
        destination: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    /// Reads a frame slot
    Load {
        destination: Operand,
        offset: Offset,
    },
    /// Writes a frame slot
    Store {
        source: Operand,
        offset: Offset,
    },
    /// Only found in linear code
    ConditionalJump {
        condition: Condition,
        lhs: Operand,
        rhs: Operand,
        target: Label,
    },
    /// Only found in linear code
    Jump {
        target: Label,
    },
}

impl Instruction {
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            Instruction::ConditionalJump { .. } | Instruction::Jump { .. }
        )
    }

    fn used_operands(&self) -> Vec<Operand> {
        match self {
            Instruction::LoadImmediate { .. }
            | Instruction::Load { .. }
            | Instruction::Jump { .. } => vec![],
            Instruction::Move { source, .. } => vec![*source],
            Instruction::UnaryOperation { operand, .. } => vec![*operand],
            Instruction::BinaryOperation { lhs, rhs, .. }
            | Instruction::ConditionalJump { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instruction::Store { source, .. } => vec![*source],
        }
    }

    fn defined_operand(&self) -> Option<Operand> {
        match self {
            Instruction::LoadImmediate { destination, .. }
            | Instruction::Move { destination, .. }
            | Instruction::UnaryOperation { destination, .. }
            | Instruction::BinaryOperation { destination, .. }
            | Instruction::Load { destination, .. } => Some(*destination),
            Instruction::Store { .. }
            | Instruction::ConditionalJump { .. }
            | Instruction::Jump { .. } => None,
        }
    }

    /// Temporaries read by this instruction, without duplicates
    pub fn uses(&self) -> Vec<Temporary> {
        let mut uses = Vec::new();
        for t in self.used_operands().into_iter().filter_map(Operand::as_temporary) {
            if !uses.contains(&t) {
                uses.push(t);
            }
        }
        uses
    }

    /// Temporaries written by this instruction
    pub fn defines(&self) -> Vec<Temporary> {
        self.defined_operand()
            .and_then(Operand::as_temporary)
            .into_iter()
            .collect()
    }

    /// Every temporary operand in textual order, without duplicates
    pub fn temporaries(&self) -> Vec<Temporary> {
        let mut temporaries = self.defines();
        for t in self.uses() {
            if !temporaries.contains(&t) {
                temporaries.push(t);
            }
        }
        temporaries
    }

    /// Rewrites every read operand
    pub fn map_uses(&mut self, mut f: impl FnMut(Operand) -> Operand) {
        match self {
            Instruction::LoadImmediate { .. }
            | Instruction::Load { .. }
            | Instruction::Jump { .. } => {}
            Instruction::Move { source, .. } => *source = f(*source),
            Instruction::UnaryOperation { operand, .. } => *operand = f(*operand),
            Instruction::BinaryOperation { lhs, rhs, .. }
            | Instruction::ConditionalJump { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
            Instruction::Store { source, .. } => *source = f(*source),
        }
    }

    /// Rewrites the written operand, if any
    pub fn map_defines(&mut self, mut f: impl FnMut(Operand) -> Operand) {
        match self {
            Instruction::LoadImmediate { destination, .. }
            | Instruction::Move { destination, .. }
            | Instruction::UnaryOperation { destination, .. }
            | Instruction::BinaryOperation { destination, .. }
            | Instruction::Load { destination, .. } => *destination = f(*destination),
            Instruction::Store { .. }
            | Instruction::ConditionalJump { .. }
            | Instruction::Jump { .. } => {}
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Return {
        value: Option<Operand>,
    },
    Jump {
        destination: Label,
    },
    Branch {
        condition: Condition,
        lhs: Operand,
        rhs: Operand,
        positive: Label,
        negative: Label,
    },
}

impl Terminator {
    /// Distinct jump targets, positive branch first
    pub fn successors(&self) -> Vec<Label> {
        match self {
            Terminator::Return { .. } => vec![],
            Terminator::Jump { destination } => vec![*destination],
            Terminator::Branch {
                positive, negative, ..
            } => {
                if positive == negative {
                    vec![*positive]
                } else {
                    vec![*positive, *negative]
                }
            }
        }
    }

    pub fn uses(&self) -> Vec<Temporary> {
        let operands: Vec<Operand> = match self {
            Terminator::Return { value } => value.iter().copied().collect(),
            Terminator::Jump { .. } => vec![],
            Terminator::Branch { lhs, rhs, .. } => vec![*lhs, *rhs],
        };

        let mut uses = Vec::new();
        for t in operands.into_iter().filter_map(Operand::as_temporary) {
            if !uses.contains(&t) {
                uses.push(t);
            }
        }
        uses
    }

    pub fn map_uses(&mut self, mut f: impl FnMut(Operand) -> Operand) {
        match self {
            Terminator::Return { value } => {
                if let Some(value) = value {
                    *value = f(*value);
                }
            }
            Terminator::Jump { .. } => {}
            Terminator::Branch { lhs, rhs, .. } => {
                *lhs = f(*lhs);
                *rhs = f(*rhs);
            }
        }
    }

    /// Points every reference to `from` at `to` instead. Returns whether
    /// anything was rewritten.
    pub fn retarget(&mut self, from: Label, to: Label) -> bool {
        match self {
            Terminator::Return { .. } => false,
            Terminator::Jump { destination } => {
                if *destination == from {
                    *destination = to;
                    true
                } else {
                    false
                }
            }
            Terminator::Branch {
                positive, negative, ..
            } => {
                let mut rewritten = false;
                if *positive == from {
                    *positive = to;
                    rewritten = true;
                }
                if *negative == from {
                    *negative = to;
                    rewritten = true;
                }
                rewritten
            }
        }
    }
}

/// `destination = phi(predecessor -> source, ...)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiNode {
    pub destination: Temporary,
    pub sources: BTreeMap<Label, Temporary>,
}

impl PhiNode {
    pub fn uses(&self) -> Vec<Temporary> {
        let mut uses = Vec::new();
        for t in self.sources.values() {
            if !uses.contains(t) {
                uses.push(*t);
            }
        }
        uses
    }
}

/// An element of [`LinearCode`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Label(Label),
    Instruction(Instruction),
}

/// The flat instruction stream of one function
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinearCode {
    pub symbol_name: String,
    pub statements: Vec<Statement>,
}

impl LinearCode {
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Instruction(i) => Some(i),
            Statement::Label(_) => None,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.statements.iter().filter_map(|s| match s {
            Statement::Label(l) => Some(*l),
            Statement::Instruction(_) => None,
        })
    }
}
