//! Reference interpreter for the LIR.
//!
//! Runs either a [`Cfg`] (phi nodes included) or a [`LinearCode`] stream
//! (registers and frame slots included) and reports the returned value. The
//! pipeline tests use it to check that every pass preserves behaviour.

use hashbrown::HashMap;

use crate::{
    error::InterpretError,
    index::Index,
    middle::{
        cfg::Cfg,
        lir::{
            BinaryOperator, DataLocation, FunctionData, Instruction, Label, LinearCode, Operand,
            Register, Statement, Temporary, Terminator, UnaryOperator,
        },
    },
};

pub const DEFAULT_STEP_LIMIT: usize = 1_000_000;

#[derive(Debug, Default)]
struct Machine {
    temporaries: HashMap<Temporary, i64>,
    registers: HashMap<Register, i64>,
    /// Frame slots by offset
    memory: HashMap<i64, i64>,
    steps: usize,
    step_limit: usize,
}

impl Machine {
    fn new(
        function: &FunctionData,
        arguments: &[i64],
        step_limit: usize,
    ) -> Result<Self, InterpretError> {
        if arguments.len() != function.parameters.len() {
            return Err(InterpretError::ArgumentCount {
                expected: function.parameters.len(),
                found: arguments.len(),
            });
        }

        let mut machine = Machine {
            step_limit,
            ..Default::default()
        };

        for (&parameter, &value) in function.parameters.iter().zip(arguments) {
            match function.location(parameter) {
                Some(DataLocation::Register(register)) => {
                    machine.registers.insert(register, value);
                }
                Some(DataLocation::Memory(offset)) => {
                    machine.memory.insert(offset.0, value);
                }
                None => {
                    machine.temporaries.insert(parameter, value);
                }
            }
        }

        Ok(machine)
    }

    fn step(&mut self) -> Result<(), InterpretError> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(InterpretError::StepLimit(self.step_limit));
        }
        Ok(())
    }

    fn read(&self, operand: Operand) -> Result<i64, InterpretError> {
        match operand {
            Operand::Temporary(t) => self
                .temporaries
                .get(&t)
                .copied()
                .ok_or_else(|| InterpretError::Undefined(format!("%{}", t.index()))),
            Operand::Register(r) => self
                .registers
                .get(&r)
                .copied()
                .ok_or_else(|| InterpretError::Undefined(r.to_string())),
            Operand::Immediate(value) => Ok(value),
        }
    }

    fn write(&mut self, operand: Operand, value: i64) {
        match operand {
            Operand::Temporary(t) => {
                self.temporaries.insert(t, value);
            }
            Operand::Register(r) => {
                self.registers.insert(r, value);
            }
            Operand::Immediate(_) => unreachable!("immediate used as a destination"),
        }
    }

    fn forget(&mut self, operand: Operand) {
        match operand {
            Operand::Temporary(t) => {
                self.temporaries.remove(&t);
            }
            Operand::Register(r) => {
                self.registers.remove(&r);
            }
            Operand::Immediate(_) => unreachable!("immediate used as a destination"),
        }
    }

    /// Copies a value without inspecting it. Copying an undefined value
    /// leaves the destination undefined.
    fn copy(&mut self, destination: Operand, value: Option<i64>) {
        match value {
            Some(value) => self.write(destination, value),
            None => self.forget(destination),
        }
    }

    /// Executes a non jump instruction
    fn execute(&mut self, instruction: &Instruction) -> Result<(), InterpretError> {
        self.step()?;

        match instruction {
            Instruction::LoadImmediate { destination, value } => self.write(*destination, *value),
            Instruction::Move {
                destination,
                source,
            } => {
                let value = self.read(*source).ok();
                self.copy(*destination, value);
            }
            Instruction::UnaryOperation {
                operator,
                destination,
                operand,
            } => {
                let value = self.read(*operand)?;
                let result = match operator {
                    UnaryOperator::Neg => value.wrapping_neg(),
                    UnaryOperator::Not => !value,
                };
                self.write(*destination, result);
            }
            Instruction::BinaryOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => {
                let lhs = self.read(*lhs)?;
                let rhs = self.read(*rhs)?;
                let result = evaluate(*operator, lhs, rhs)?;
                self.write(*destination, result);
            }
            Instruction::Load {
                destination,
                offset,
            } => {
                let value = self.memory.get(&offset.0).copied();
                self.copy(*destination, value);
            }
            Instruction::Store { source, offset } => match self.read(*source) {
                Ok(value) => {
                    self.memory.insert(offset.0, value);
                }
                Err(_) => {
                    self.memory.remove(&offset.0);
                }
            },
            Instruction::ConditionalJump { .. } | Instruction::Jump { .. } => {
                unreachable!("jumps are handled by the caller")
            }
        }

        Ok(())
    }
}

pub fn evaluate(operator: BinaryOperator, lhs: i64, rhs: i64) -> Result<i64, InterpretError> {
    Ok(match operator {
        BinaryOperator::Add => lhs.wrapping_add(rhs),
        BinaryOperator::Sub => lhs.wrapping_sub(rhs),
        BinaryOperator::Mul => lhs.wrapping_mul(rhs),
        BinaryOperator::Div if rhs == 0 => return Err(InterpretError::DivisionByZero),
        BinaryOperator::Div => lhs.wrapping_div(rhs),
        BinaryOperator::Rem if rhs == 0 => return Err(InterpretError::DivisionByZero),
        BinaryOperator::Rem => lhs.wrapping_rem(rhs),
        BinaryOperator::And => lhs & rhs,
        BinaryOperator::Or => lhs | rhs,
        BinaryOperator::Xor => lhs ^ rhs,
        BinaryOperator::Slt => (lhs < rhs) as i64,
    })
}

/// Runs a function in CFG form and returns the value given to `ret`
pub fn run_cfg(
    cfg: &Cfg,
    function: &FunctionData,
    arguments: &[i64],
) -> Result<Option<i64>, InterpretError> {
    let mut machine = Machine::new(function, arguments, DEFAULT_STEP_LIMIT)?;
    let mut previous: Option<Label> = None;
    let mut current = cfg.entry();

    loop {
        if !cfg.contains(current) {
            return Err(InterpretError::UnknownLabel(format!(".L{}", current.index())));
        }
        let block = cfg.block(current);

        // Phis read their sources before any of them writes
        let mut incoming = Vec::new();
        for phi in block.phis() {
            let source = previous
                .and_then(|p| phi.sources.get(&p))
                .ok_or_else(|| {
                    InterpretError::MissingPhiSource(
                        previous.map_or("the entry".to_owned(), |p| format!(".L{}", p.index())),
                    )
                })?;
            incoming.push((phi.destination, machine.read(Operand::Temporary(*source)).ok()));
        }
        for (destination, value) in incoming {
            machine.copy(Operand::Temporary(destination), value);
        }

        for instruction in &block.instructions {
            machine.execute(instruction)?;
        }

        machine.step()?;
        let next = match block.terminator() {
            Terminator::Return { value } => {
                return value.map(|v| machine.read(v)).transpose();
            }
            Terminator::Jump { destination } => *destination,
            Terminator::Branch {
                condition,
                lhs,
                rhs,
                positive,
                negative,
            } => {
                if condition.holds(machine.read(*lhs)?, machine.read(*rhs)?) {
                    *positive
                } else {
                    *negative
                }
            }
        };

        previous = Some(current);
        current = next;
    }
}

/// Runs linear code until it jumps to the end label and returns the content
/// of [`Register::A0`], if anything was written to it
pub fn run_linear(
    code: &LinearCode,
    function: &FunctionData,
    arguments: &[i64],
) -> Result<Option<i64>, InterpretError> {
    let mut machine = Machine::new(function, arguments, DEFAULT_STEP_LIMIT)?;

    let positions: HashMap<Label, usize> = code
        .statements
        .iter()
        .enumerate()
        .filter_map(|(i, s)| match s {
            Statement::Label(l) => Some((*l, i)),
            Statement::Instruction(_) => None,
        })
        .collect();

    let jump = |target: Label| -> Result<Option<usize>, InterpretError> {
        if target == function.end_label() {
            return Ok(None);
        }
        positions
            .get(&target)
            .map(|p| Some(*p))
            .ok_or_else(|| InterpretError::UnknownLabel(format!(".L{}", target.index())))
    };

    let mut pc = 0;
    while let Some(statement) = code.statements.get(pc) {
        pc += 1;
        let instruction = match statement {
            Statement::Label(_) => continue,
            Statement::Instruction(instruction) => instruction,
        };

        match instruction {
            Instruction::Jump { target } => {
                machine.step()?;
                match jump(*target)? {
                    Some(position) => pc = position,
                    None => break,
                }
            }
            Instruction::ConditionalJump {
                condition,
                lhs,
                rhs,
                target,
            } => {
                machine.step()?;
                if condition.holds(machine.read(*lhs)?, machine.read(*rhs)?) {
                    match jump(*target)? {
                        Some(position) => pc = position,
                        None => break,
                    }
                }
            }
            other => machine.execute(other)?,
        }
    }

    Ok(machine.registers.get(&Register::A0).copied())
}
