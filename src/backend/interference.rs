use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;

use crate::{
    backend::liveness::Liveness,
    middle::{
        cfg::Cfg,
        lir::{FunctionData, Temporary},
    },
};

/// Undirected graph over the temporaries of one function. Two temporaries
/// are adjacent when they can hold different values at the same time and
/// therefore must not share a location.
#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    adjacency: BTreeMap<Temporary, BTreeSet<Temporary>>,
}

impl InterferenceGraph {
    /// A graph with the given vertices and no edges
    pub fn new(vertices: impl IntoIterator<Item = Temporary>) -> Self {
        Self {
            adjacency: vertices.into_iter().map(|t| (t, BTreeSet::new())).collect(),
        }
    }

    /// Builds the graph of every temporary of the pool from the result of a
    /// liveness analysis over `cfg`
    pub fn build(cfg: &Cfg, liveness: &Liveness, function: &FunctionData) -> Self {
        let mut graph = Self::new(function.temporaries());

        for (label, position, live) in liveness.iter() {
            for (a, b) in live.iter().tuple_combinations() {
                graph.add_edge(*a, *b);
            }

            // A definition clobbers its location even when nothing reads it
            let statement = cfg.block(label).statements().nth(position);
            for defined in statement.iter().flat_map(|s| s.defines()) {
                for other in live {
                    graph.add_edge(defined, *other);
                }
            }
        }

        // Parameters all arrive at once on entry
        for (a, b) in function.parameters.iter().tuple_combinations() {
            graph.add_edge(*a, *b);
        }

        log::debug!(
            "{}: interference graph with {} vertices and {} edges",
            function.symbol_name,
            graph.len(),
            graph.edge_count()
        );

        graph
    }

    pub fn add_edge(&mut self, a: Temporary, b: Temporary) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn interferes(&self, a: Temporary, b: Temporary) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    pub fn neighbours(&self, t: Temporary) -> impl Iterator<Item = Temporary> + '_ {
        self.adjacency.get(&t).into_iter().flatten().copied()
    }

    pub fn degree(&self, t: Temporary) -> usize {
        self.adjacency.get(&t).map_or(0, BTreeSet::len)
    }

    pub fn vertices(&self) -> impl Iterator<Item = Temporary> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }
}
