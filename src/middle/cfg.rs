//! The control flow graph of one function.
//!
//! Blocks are stored by label and refer to each other only through labels.
//! The edge relation is derived from the terminators and cached in both
//! directions; every mutation that changes a terminator goes through [`Cfg`]
//! so that the cache, and the source tables of phi nodes, always agree with
//! the terminators.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    error::internal_error,
    middle::lir::{FunctionData, Instruction, Label, Operand, PhiNode, Temporary, Terminator},
};

#[derive(Debug, Clone)]
pub struct Block {
    label: Label,
    /// Keyed by the variable the phi was placed for, which stays the same
    /// after renaming changes the destination
    pub(crate) phis: BTreeMap<Temporary, PhiNode>,
    pub instructions: Vec<Instruction>,
    terminator: Terminator,
}

/// One statement of a block, as seen by dataflow analyses: phis first, then
/// the body, then the terminator
#[derive(Debug, Clone, Copy)]
pub enum StatementRef<'a> {
    Phi(&'a PhiNode),
    Instruction(&'a Instruction),
    Terminator(&'a Terminator),
}

impl StatementRef<'_> {
    /// Temporaries read at this point. Phi sources are not included: they
    /// are read at the end of the corresponding predecessor.
    pub fn uses(&self) -> Vec<Temporary> {
        match self {
            StatementRef::Phi(_) => vec![],
            StatementRef::Instruction(i) => i.uses(),
            StatementRef::Terminator(t) => t.uses(),
        }
    }

    pub fn defines(&self) -> Vec<Temporary> {
        match self {
            StatementRef::Phi(phi) => vec![phi.destination],
            StatementRef::Instruction(i) => i.defines(),
            StatementRef::Terminator(_) => vec![],
        }
    }
}

impl Block {
    pub fn new(label: Label, instructions: Vec<Instruction>, terminator: Terminator) -> Self {
        Self {
            label,
            phis: BTreeMap::new(),
            instructions,
            terminator,
        }
    }

    pub fn label(&self) -> Label {
        self.label
    }

    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    pub fn phis(&self) -> impl Iterator<Item = &PhiNode> {
        self.phis.values()
    }

    pub fn phi_for(&self, variable: Temporary) -> Option<&PhiNode> {
        self.phis.get(&variable)
    }

    pub fn has_phis(&self) -> bool {
        !self.phis.is_empty()
    }

    pub fn statement_count(&self) -> usize {
        self.phis.len() + self.instructions.len() + 1
    }

    pub fn statements(&self) -> impl Iterator<Item = StatementRef<'_>> {
        self.phis
            .values()
            .map(StatementRef::Phi)
            .chain(self.instructions.iter().map(StatementRef::Instruction))
            .chain(std::iter::once(StatementRef::Terminator(&self.terminator)))
    }

    /// Rewrites the operands read by the terminator. Jump targets are left
    /// alone.
    pub fn map_terminator_uses(&mut self, f: impl FnMut(Operand) -> Operand) {
        self.terminator.map_uses(f);
    }

    /// Temporaries defined by the body of this block
    pub fn defines(&self) -> BTreeSet<Temporary> {
        self.instructions.iter().flat_map(|i| i.defines()).collect()
    }
}

#[derive(Debug, Clone)]
pub struct Cfg {
    blocks: BTreeMap<Label, Block>,
    successors: BTreeMap<Label, BTreeSet<Label>>,
    predecessors: BTreeMap<Label, BTreeSet<Label>>,
    entry: Label,
    end: Label,
}

impl Cfg {
    /// Creates an empty graph. `entry` must be added with [`Cfg::add_block`]
    /// before any pass runs.
    pub fn new(entry: Label, end: Label) -> Self {
        Self {
            blocks: BTreeMap::new(),
            successors: BTreeMap::new(),
            predecessors: BTreeMap::new(),
            entry,
            end,
        }
    }

    pub fn entry(&self) -> Label {
        self.entry
    }

    /// The label control reaches after a `ret`
    pub fn end(&self) -> Label {
        self.end
    }

    pub fn labels(&self) -> Vec<Label> {
        self.blocks.keys().copied().collect()
    }

    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn contains(&self, label: Label) -> bool {
        self.blocks.contains_key(&label)
    }

    #[track_caller]
    pub fn block(&self, label: Label) -> &Block {
        match self.blocks.get(&label) {
            Some(block) => block,
            None => internal_error!("no block labelled {label}"),
        }
    }

    /// Mutable access to a block. The terminator and the phi source keys can
    /// only be changed through the graph.
    #[track_caller]
    pub fn block_mut(&mut self, label: Label) -> &mut Block {
        match self.blocks.get_mut(&label) {
            Some(block) => block,
            None => internal_error!("no block labelled {label}"),
        }
    }

    pub fn successors(&self, label: Label) -> &BTreeSet<Label> {
        static EMPTY: BTreeSet<Label> = BTreeSet::new();
        self.successors.get(&label).unwrap_or(&EMPTY)
    }

    pub fn predecessors(&self, label: Label) -> &BTreeSet<Label> {
        static EMPTY: BTreeSet<Label> = BTreeSet::new();
        self.predecessors.get(&label).unwrap_or(&EMPTY)
    }

    pub fn add_block(&mut self, block: Block) {
        let label = block.label;
        if block.instructions.iter().any(Instruction::is_jump) {
            internal_error!("block {label} contains a jump in its body");
        }
        if !block.phis.is_empty() {
            internal_error!("block {label} is added with phi nodes");
        }

        let successors = block.terminator.successors();
        if self.blocks.insert(label, block).is_some() {
            internal_error!("block {label} is defined twice");
        }

        for successor in successors {
            self.link(label, successor);
        }
    }

    /// Replaces the terminator of `label`, updating edges and the phi source
    /// tables of any successor that loses this block as a predecessor
    pub fn set_terminator(&mut self, label: Label, terminator: Terminator) {
        let old: BTreeSet<Label> = self.successors(label).clone();
        let new: BTreeSet<Label> = terminator.successors().into_iter().collect();

        for removed in old.difference(&new) {
            self.unlink(label, *removed);
        }
        for added in new.difference(&old) {
            self.link(label, *added);
        }

        self.block_mut(label).terminator = terminator;
    }

    /// Inserts a block holding `instructions` on the edge `predecessor ->
    /// successor` and returns its label. The terminator of `predecessor` is
    /// retargeted and phi sources of `successor` keyed by `predecessor` are
    /// rekeyed by the new block.
    pub fn split_edge(
        &mut self,
        predecessor: Label,
        successor: Label,
        instructions: Vec<Instruction>,
        function: &mut FunctionData,
    ) -> Label {
        if !self.successors(predecessor).contains(&successor) {
            internal_error!("no edge {predecessor} -> {successor} to split");
        }

        let label = function.fresh_label();
        let block = Block::new(
            label,
            instructions,
            Terminator::Jump {
                destination: successor,
            },
        );
        self.blocks.insert(label, block);

        let mut terminator = self.block(predecessor).terminator.clone();
        if !terminator.retarget(successor, label) {
            internal_error!("terminator of {predecessor} does not reference {successor}");
        }
        self.block_mut(predecessor).terminator = terminator;

        self.remove_edge(predecessor, successor);
        self.insert_edge(predecessor, label);
        self.insert_edge(label, successor);

        for phi in self.block_mut(successor).phis.values_mut() {
            if let Some(source) = phi.sources.remove(&predecessor) {
                phi.sources.insert(label, source);
            }
        }

        label
    }

    /// Makes sure no edge enters the entry block by putting a new block in
    /// front of it when it is the target of a jump. Returns the new entry, if
    /// any.
    pub fn isolate_entry(&mut self, function: &mut FunctionData) -> Option<Label> {
        if self.predecessors(self.entry).is_empty() {
            return None;
        }

        let label = function.fresh_label();
        self.add_block(Block::new(
            label,
            vec![],
            Terminator::Jump {
                destination: self.entry,
            },
        ));
        self.entry = label;

        Some(label)
    }

    /// Places a phi for `variable` in `label` with every predecessor mapped to
    /// `variable` itself. Renaming fills in the real sources later.
    pub fn insert_phi(&mut self, label: Label, variable: Temporary) {
        let sources = self
            .predecessors(label)
            .iter()
            .map(|p| (*p, variable))
            .collect();
        let block = self.block_mut(label);

        if block.phis.contains_key(&variable) {
            internal_error!("second phi for {variable} in {label}");
        }

        block.phis.insert(
            variable,
            PhiNode {
                destination: variable,
                sources,
            },
        );
    }

    /// Removes and returns every phi of `label`
    pub fn take_phis(&mut self, label: Label) -> Vec<PhiNode> {
        std::mem::take(&mut self.block_mut(label).phis)
            .into_values()
            .collect()
    }

    /// For every variable, the set of blocks whose body defines it
    pub fn gather_defs(&self) -> BTreeMap<Temporary, BTreeSet<Label>> {
        let mut defs: BTreeMap<Temporary, BTreeSet<Label>> = BTreeMap::new();
        for block in self.blocks.values() {
            for variable in block.defines() {
                defs.entry(variable).or_default().insert(block.label);
            }
        }
        defs
    }

    /// Labels reachable from the entry, in depth first preorder
    pub fn reachable(&self) -> Vec<Label> {
        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![self.entry];

        while let Some(label) = stack.pop() {
            if !visited.insert(label) {
                continue;
            }
            order.push(label);

            // Reverse so that the positive branch is visited first
            let successors = self.block(label).terminator.successors();
            for successor in successors.into_iter().rev() {
                if !visited.contains(&successor) {
                    stack.push(successor);
                }
            }
        }

        order
    }

    /// Deletes every block the entry cannot reach. Returns how many blocks
    /// were removed.
    pub fn remove_unreachable(&mut self) -> usize {
        let reachable: BTreeSet<Label> = self.reachable().into_iter().collect();
        let dead: Vec<Label> = self
            .blocks
            .keys()
            .copied()
            .filter(|l| !reachable.contains(l))
            .collect();

        for label in &dead {
            for successor in self.successors(*label).clone() {
                self.unlink(*label, successor);
            }
        }
        for label in &dead {
            self.blocks.remove(label);
            self.successors.remove(label);
            self.predecessors.remove(label);
        }

        if !dead.is_empty() {
            log::debug!("removed {} unreachable blocks", dead.len());
        }

        dead.len()
    }

    /// Panics if the cached edges, the terminators and the phi source tables
    /// disagree
    pub fn verify(&self) {
        if !self.blocks.contains_key(&self.entry) {
            internal_error!("entry block {} is missing", self.entry);
        }

        for block in self.blocks.values() {
            let expected: BTreeSet<Label> = block.terminator.successors().into_iter().collect();
            if *self.successors(block.label) != expected {
                internal_error!("cached successors of {} are stale", block.label);
            }

            for successor in &expected {
                if !self.blocks.contains_key(successor) {
                    internal_error!("{} jumps to unknown label {successor}", block.label);
                }
                if !self.predecessors(*successor).contains(&block.label) {
                    internal_error!("{} is missing predecessor {}", successor, block.label);
                }
            }

            let predecessors = self.predecessors(block.label);
            for phi in block.phis.values() {
                if !phi.sources.keys().eq(predecessors.iter()) {
                    internal_error!(
                        "phi {} in {} does not cover exactly the predecessors",
                        phi.destination,
                        block.label
                    );
                }
            }
        }
    }

    fn insert_edge(&mut self, from: Label, to: Label) {
        self.successors.entry(from).or_default().insert(to);
        self.predecessors.entry(to).or_default().insert(from);
    }

    fn remove_edge(&mut self, from: Label, to: Label) {
        if let Some(successors) = self.successors.get_mut(&from) {
            successors.remove(&to);
        }
        if let Some(predecessors) = self.predecessors.get_mut(&to) {
            predecessors.remove(&from);
        }
    }

    /// New edge from a terminator. A phi block cannot gain a predecessor this
    /// way since there would be no source for it.
    fn link(&mut self, from: Label, to: Label) {
        if self.blocks.get(&to).is_some_and(Block::has_phis) {
            internal_error!("new edge {from} -> {to} into a block with phi nodes");
        }
        self.insert_edge(from, to);
    }

    /// Removed edge. The successor's phis forget the predecessor.
    fn unlink(&mut self, from: Label, to: Label) {
        self.remove_edge(from, to);
        if let Some(block) = self.blocks.get_mut(&to) {
            for phi in block.phis.values_mut() {
                phi.sources.remove(&from);
            }
        }
    }
}
