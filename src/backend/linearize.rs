//! Flattens a CFG into a single stream of instructions.
//!
//! Blocks are laid out one after the other, each introduced by its label,
//! and their terminators are expanded into explicit jumps: a branch becomes a
//! conditional jump to its positive target followed by a jump to its negative
//! target, and a return moves its value into `a0` and jumps to the end label.

use std::collections::BTreeSet;

use crate::{
    middle::{
        cfg::Cfg,
        lir::{FunctionData, Instruction, Label, LinearCode, Register, Statement, Terminator},
    },
    options::{BlockOrder, CodegenOptions},
};

pub fn linearize(cfg: &Cfg, function: &FunctionData, options: &CodegenOptions) -> LinearCode {
    let order = match options.block_order {
        BlockOrder::Declaration => declaration_order(cfg),
        BlockOrder::Trace => trace_order(cfg),
    };

    let mut statements = Vec::new();
    for label in order {
        let block = cfg.block(label);

        statements.push(Statement::Label(label));
        statements.extend(block.instructions.iter().cloned().map(Statement::Instruction));
        statements.extend(
            expand_terminator(block.terminator(), function.end_label())
                .into_iter()
                .map(Statement::Instruction),
        );
    }

    if options.elide_jumps {
        statements = elide_fallthrough_jumps(statements);
    }

    LinearCode {
        symbol_name: function.symbol_name.clone(),
        statements,
    }
}

fn expand_terminator(terminator: &Terminator, end: Label) -> Vec<Instruction> {
    match terminator {
        Terminator::Return { value } => value
            .iter()
            .map(|value| Instruction::Move {
                destination: Register::A0.into(),
                source: *value,
            })
            .chain(std::iter::once(Instruction::Jump { target: end }))
            .collect(),
        Terminator::Jump { destination } => vec![Instruction::Jump {
            target: *destination,
        }],
        Terminator::Branch {
            condition,
            lhs,
            rhs,
            positive,
            negative,
        } => vec![
            Instruction::ConditionalJump {
                condition: *condition,
                lhs: *lhs,
                rhs: *rhs,
                target: *positive,
            },
            Instruction::Jump { target: *negative },
        ],
    }
}

/// The entry, then every other block by label
fn declaration_order(cfg: &Cfg) -> Vec<Label> {
    std::iter::once(cfg.entry())
        .chain(cfg.labels().into_iter().filter(|l| *l != cfg.entry()))
        .collect()
}

/// Lays out traces: starting from a block, keep placing the successor control
/// falls into (the negative target of a branch, the target of a jump) while
/// it has not been placed yet. A new trace starts at the first block not
/// placed, in declaration order.
fn trace_order(cfg: &Cfg) -> Vec<Label> {
    let mut placed = BTreeSet::new();
    let mut order = Vec::with_capacity(cfg.len());

    for start in declaration_order(cfg) {
        let mut next = Some(start);

        while let Some(label) = next.take() {
            if !placed.insert(label) {
                break;
            }
            order.push(label);

            let candidates = match cfg.block(label).terminator() {
                Terminator::Return { .. } => vec![],
                Terminator::Jump { destination } => vec![*destination],
                Terminator::Branch {
                    positive, negative, ..
                } => vec![*negative, *positive],
            };
            next = candidates.into_iter().find(|l| !placed.contains(l));
        }
    }

    order
}

/// Removes every unconditional jump to the label that immediately follows it
fn elide_fallthrough_jumps(statements: Vec<Statement>) -> Vec<Statement> {
    let mut elided = Vec::with_capacity(statements.len());
    let mut statements = statements.into_iter().peekable();

    while let Some(statement) = statements.next() {
        if let Statement::Instruction(Instruction::Jump { target }) = &statement {
            if statements.peek() == Some(&Statement::Label(*target)) {
                continue;
            }
        }
        elided.push(statement);
    }

    elided
}
