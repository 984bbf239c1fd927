use colored::Colorize;
use itertools::Itertools;

use crate::{
    index::Index,
    middle::{
        cfg::{Block, Cfg},
        lir::{
            DataLocation, FunctionData, Instruction, Label, LinearCode, Offset, Operand, PhiNode,
            Statement, Temporary, Terminator,
        },
    },
};

/// Renders a function in the textual form accepted by
/// [`parse_function`](crate::middle::lir::parse::parse_function)
pub fn format_cfg(cfg: &Cfg, function: &FunctionData) -> String {
    let mut out = format!(
        "{} {}{}{}{}\n",
        "fn".magenta(),
        function.symbol_name.blue(),
        "(".white(),
        function.parameters.iter().map(|arg| arg.to_string()).join(", "),
        ") {".white()
    );

    // Entry first so that the text reads back with the same entry
    let entry = cfg.block(cfg.entry());
    out.push_str(&entry.to_string());
    for block in cfg.blocks().filter(|b| b.label() != cfg.entry()) {
        out.push_str(&block.to_string());
    }

    out.push_str(&format!("{}\n", "}".white()));
    out
}

pub fn pretty_print_cfg(cfg: &Cfg, function: &FunctionData) {
    print!("{}", format_cfg(cfg, function));
}

pub fn pretty_print_linear(code: &LinearCode) {
    print!("{code}");
}

impl core::fmt::Display for Temporary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!("%{}", self.index()).yellow())
    }
}

impl core::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", format!(".L{}", self.index()).blue())
    }
}

impl core::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.0.to_string().purple(), "fp".red())
    }
}

impl core::fmt::Display for DataLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DataLocation::Register(register) => write!(f, "{}", register.to_string().red()),
            DataLocation::Memory(offset) => write!(f, "{offset}"),
        }
    }
}

impl core::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Temporary(t) => write!(f, "{t}"),
            Operand::Register(r) => write!(f, "{}", r.to_string().red()),
            Operand::Immediate(value) => write!(f, "{}", value.to_string().purple()),
        }
    }
}

impl core::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::LoadImmediate { destination, value } => write!(
                f,
                "{destination} {} {} {}",
                "=".white(),
                "li".cyan(),
                value.to_string().purple()
            ),
            Instruction::Move {
                destination,
                source,
            } => write!(f, "{destination} {} {} {source}", "=".white(), "mv".cyan()),
            Instruction::UnaryOperation {
                operator,
                destination,
                operand,
            } => write!(
                f,
                "{destination} {} {} {operand}",
                "=".white(),
                operator.to_string().cyan()
            ),
            Instruction::BinaryOperation {
                operator,
                destination,
                lhs,
                rhs,
            } => write!(
                f,
                "{destination} {} {} {lhs}, {rhs}",
                "=".white(),
                operator.to_string().cyan()
            ),
            Instruction::Load {
                destination,
                offset,
            } => write!(f, "{destination} {} {} {offset}", "=".white(), "ld".cyan()),
            Instruction::Store { source, offset } => {
                write!(f, "{} {source}, {offset}", "sd".cyan())
            }
            Instruction::ConditionalJump {
                condition,
                lhs,
                rhs,
                target,
            } => write!(
                f,
                "{} {} {lhs}, {rhs}, {target}",
                "br".cyan(),
                condition.to_string().white()
            ),
            Instruction::Jump { target } => write!(f, "{} {target}", "jmp".cyan()),
        }
    }
}

impl core::fmt::Display for Terminator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminator::Return { value: Some(value) } => write!(f, "{} {value}", "ret".cyan()),
            Terminator::Return { value: None } => write!(f, "{}", "ret".cyan()),
            Terminator::Jump { destination } => write!(f, "{} {destination}", "jmp".cyan()),
            Terminator::Branch {
                condition,
                lhs,
                rhs,
                positive,
                negative,
            } => write!(
                f,
                "{} {} {lhs}, {rhs}, {positive}, {negative}",
                "br".cyan(),
                condition.to_string().white()
            ),
        }
    }
}

impl core::fmt::Display for PhiNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} {}{}",
            self.destination,
            "=".white(),
            "phi".bright_green(),
            "(".white(),
        )?;

        write!(
            f,
            "{}",
            self.sources
                .iter()
                .map(|(label, source)| format!("{label} -> {source}"))
                .join(", ")
        )?;

        write!(f, "{}", ")".white())
    }
}

impl core::fmt::Display for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}{}", self.label(), ":".white())?;

        for phi in self.phis() {
            writeln!(f, "    {phi}")?;
        }
        for instruction in &self.instructions {
            writeln!(f, "    {instruction}")?;
        }
        writeln!(f, "    {}", self.terminator())
    }
}

impl core::fmt::Display for LinearCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}{}", self.symbol_name.blue(), ":".white())?;

        for statement in &self.statements {
            match statement {
                Statement::Label(label) => writeln!(f, "{label}{}", ":".white())?,
                Statement::Instruction(instruction) => writeln!(f, "    {instruction}")?,
            }
        }

        Ok(())
    }
}
