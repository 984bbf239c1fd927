use std::collections::{BTreeMap, BTreeSet};

use crate::middle::{
    cfg::Cfg,
    dominance::Dominance,
    lir::{FunctionData, Label, Operand, Temporary},
};

/// Current SSA name of every original variable along one path of the
/// dominator tree
#[derive(Debug, Clone, Default)]
struct Renamer {
    current: BTreeMap<Temporary, Temporary>,
}

impl Renamer {
    /// Variables without a definition on the path keep their own name
    fn lookup(&self, variable: Temporary) -> Temporary {
        self.current.get(&variable).copied().unwrap_or(variable)
    }

    fn define(&mut self, variable: Temporary, function: &mut FunctionData) -> Temporary {
        let fresh = function.fresh_temporary();
        self.current.insert(variable, fresh);
        fresh
    }

    fn rename_use(&self, operand: Operand) -> Operand {
        match operand {
            Operand::Temporary(t) => Operand::Temporary(self.lookup(t)),
            other => other,
        }
    }
}

/// Puts `cfg` in SSA form: phi nodes are placed on the dominance frontiers
/// of every definition, then each definition is given a fresh temporary and
/// every use is rewritten to the definition that reaches it.
///
/// Unreachable blocks are removed first, and the entry is given no
/// predecessors so that it never needs a phi.
pub fn enter_ssa(cfg: &mut Cfg, function: &mut FunctionData) {
    cfg.remove_unreachable();
    cfg.isolate_entry(function);

    let dominance = Dominance::compute(cfg);
    let placed = insert_phis(cfg, &dominance);
    log::debug!("{}: placed {placed} phi nodes", function.symbol_name);

    rename(cfg, &dominance, function);

    #[cfg(debug_assertions)]
    cfg.verify();
}

fn insert_phis(cfg: &mut Cfg, dominance: &Dominance) -> usize {
    let mut placed = 0;

    for (variable, defining) in cfg.gather_defs() {
        let mut has_phi: BTreeSet<Label> = BTreeSet::new();
        let mut queued = defining.clone();
        let mut worklist: Vec<Label> = defining.into_iter().collect();

        while let Some(block) = worklist.pop() {
            for &join in dominance.frontier(block) {
                if !has_phi.insert(join) {
                    continue;
                }

                cfg.insert_phi(join, variable);
                placed += 1;

                // The phi is a new definition of the variable
                if queued.insert(join) {
                    worklist.push(join);
                }
            }
        }
    }

    placed
}

fn rename(cfg: &mut Cfg, dominance: &Dominance, function: &mut FunctionData) {
    let mut stack = vec![(cfg.entry(), Renamer::default())];

    while let Some((label, mut renamer)) = stack.pop() {
        let block = cfg.block_mut(label);

        for (variable, phi) in block.phis.iter_mut() {
            phi.destination = renamer.define(*variable, function);
        }

        for instruction in &mut block.instructions {
            instruction.map_uses(|operand| renamer.rename_use(operand));
            instruction.map_defines(|operand| match operand {
                Operand::Temporary(t) => Operand::Temporary(renamer.define(t, function)),
                other => other,
            });
        }

        block.map_terminator_uses(|operand| renamer.rename_use(operand));

        for successor in cfg.successors(label).clone() {
            for (variable, phi) in cfg.block_mut(successor).phis.iter_mut() {
                if let Some(source) = phi.sources.get_mut(&label) {
                    *source = renamer.lookup(*variable);
                }
            }
        }

        for &child in dominance.children(label).iter().rev() {
            stack.push((child, renamer.clone()));
        }
    }
}
