use std::collections::{BTreeMap, BTreeSet};

use crate::{
    backend::{interference::InterferenceGraph, liveness::Liveness, regalloc::Allocator},
    error::internal_error,
    middle::{
        cfg::Cfg,
        lir::{DataLocation, FunctionData, Register, Temporary},
    },
};

/// Colors `graph` with at most `k` colors, numbered from 0. Vertices which
/// could not be colored are mapped to `None`.
///
/// Vertices of degree lower than `k` are removed first since they can always
/// be colored once their neighbours are. When none is left the vertex of
/// highest degree is removed anyway, and may still find a color when it is
/// put back.
pub fn color(graph: &InterferenceGraph, k: usize) -> BTreeMap<Temporary, Option<usize>> {
    let mut degrees: BTreeMap<Temporary, usize> =
        graph.vertices().map(|t| (t, graph.degree(t))).collect();
    let mut stack = Vec::with_capacity(degrees.len());

    while !degrees.is_empty() {
        let simplifiable = degrees
            .iter()
            .find(|&(_, degree)| *degree < k)
            .map(|(t, _)| *t);

        let vertex = match simplifiable {
            Some(t) => t,
            None => {
                let candidate = degrees
                    .iter()
                    .max_by_key(|&(t, degree)| (*degree, std::cmp::Reverse(*t)))
                    .map(|(t, _)| *t);
                let Some(t) = candidate else { break };
                log::trace!("{t} is a spill candidate");
                t
            }
        };

        degrees.remove(&vertex);
        for neighbour in graph.neighbours(vertex) {
            if let Some(degree) = degrees.get_mut(&neighbour) {
                *degree -= 1;
            }
        }
        stack.push(vertex);
    }

    let mut colors: BTreeMap<Temporary, Option<usize>> = BTreeMap::new();
    while let Some(vertex) = stack.pop() {
        let taken: BTreeSet<usize> = graph
            .neighbours(vertex)
            .filter_map(|n| colors.get(&n).copied().flatten())
            .collect();

        let color = (0..k).find(|c| !taken.contains(c));
        match color {
            Some(c) => log::trace!("{vertex} gets color {c}"),
            None => log::trace!("{vertex} is spilled"),
        }
        colors.insert(vertex, color);
    }

    colors
}

/// Allocates temporaries to registers by coloring their interference graph.
/// Temporaries which could not be colored live in the frame.
#[derive(Debug)]
pub struct GraphColoringAllocator {
    registers: usize,
    graph: Option<InterferenceGraph>,
}

impl GraphColoringAllocator {
    /// An allocator which uses the first `registers` allocatable registers
    pub fn new(registers: usize) -> Self {
        if registers == 0 || registers > Register::ALLOCATABLE.len() {
            internal_error!(
                "register budget {registers} outside of 1..={}",
                Register::ALLOCATABLE.len()
            );
        }

        Self {
            registers,
            graph: None,
        }
    }

    pub fn graph(&self) -> Option<&InterferenceGraph> {
        self.graph.as_ref()
    }

    /// Turns the coloring of the graph into locations
    fn assign(&self, function: &mut FunctionData) {
        let Some(graph) = &self.graph else {
            internal_error!("locations assigned before the interference graph was built");
        };

        let mut spilled = 0;
        let allocation: BTreeMap<Temporary, DataLocation> = color(graph, self.registers)
            .into_iter()
            .map(|(t, color)| match color {
                Some(c) => (t, DataLocation::Register(Register::ALLOCATABLE[c])),
                None => {
                    spilled += 1;
                    (t, DataLocation::Memory(function.fresh_offset()))
                }
            })
            .collect();

        function.set_allocation(allocation);
        log::debug!(
            "{}: {spilled} of {} temporaries spilled with {} registers",
            function.symbol_name,
            function.temporary_count(),
            self.registers
        );
    }
}

impl Allocator for GraphColoringAllocator {
    fn prepare(&mut self, cfg: &Cfg, function: &mut FunctionData) {
        let liveness = Liveness::run(cfg);
        self.graph = Some(InterferenceGraph::build(cfg, &liveness, function));
        self.assign(function);
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;
    use itertools::Itertools;

    use super::*;
    use crate::{index::Index, middle::lir::parse::parse_function};

    fn triangle() -> (InterferenceGraph, [Temporary; 3]) {
        let vertices = [Temporary::new(0), Temporary::new(1), Temporary::new(2)];
        let mut graph = InterferenceGraph::new(vertices);
        for (a, b) in vertices.iter().tuple_combinations() {
            graph.add_edge(*a, *b);
        }
        (graph, vertices)
    }

    fn assert_valid(graph: &InterferenceGraph, colors: &BTreeMap<Temporary, Option<usize>>) {
        for vertex in graph.vertices() {
            for neighbour in graph.neighbours(vertex) {
                if let (Some(a), Some(b)) = (colors[&vertex], colors[&neighbour]) {
                    assert_ne!(a, b, "{vertex:?} and {neighbour:?} share a color");
                }
            }
        }
    }

    #[test]
    fn triangle_with_three_colors() {
        let (graph, _) = triangle();

        let colors = color(&graph, 3);

        assert!(colors.values().all(Option::is_some));
        assert_valid(&graph, &colors);
    }

    #[test]
    fn triangle_with_two_colors_spills() {
        let (graph, vertices) = triangle();

        let colors = color(&graph, 2);

        assert_eq!(colors.len(), 3);
        assert!(colors.values().any(Option::is_none));
        assert_valid(&graph, &colors);
        assert!(vertices.iter().filter(|v| colors[*v].is_some()).count() == 2);
    }

    #[test]
    fn optimistic_coloring_of_a_square() {
        // Every vertex has degree 2, yet two colors are enough
        let vertices: Vec<Temporary> = (0..4).map(Temporary::new).collect();
        let mut graph = InterferenceGraph::new(vertices.iter().copied());
        for i in 0..4 {
            graph.add_edge(vertices[i], vertices[(i + 1) % 4]);
        }

        let colors = color(&graph, 2);

        assert!(colors.values().all(Option::is_some));
        assert_valid(&graph, &colors);
    }

    #[test]
    fn three_values_live_together_with_two_registers() {
        let (cfg, mut function) = parse_function(indoc! {"
            fn f() {
            entry:
                %a = li 1
                %b = li 2
                %c = li 3
                %d = add %a, %b
                %d = add %d, %c
                ret %d
            }
        "})
        .unwrap();
        let mut allocator = GraphColoringAllocator::new(2);

        allocator.prepare(&cfg, &mut function);

        let allocation = function.allocation();
        assert_eq!(allocation.len(), function.temporary_count());
        assert!(
            allocation
                .values()
                .any(|location| matches!(location, DataLocation::Memory(_)))
        );

        let graph = allocator.graph().unwrap();
        for (t, location) in &allocation {
            for neighbour in graph.neighbours(*t) {
                if let DataLocation::Register(r) = location {
                    assert_ne!(allocation[&neighbour], DataLocation::Register(*r));
                }
            }
        }
    }

    #[test]
    fn enough_registers_means_no_spill() {
        let (cfg, mut function) = parse_function(indoc! {"
            fn f(%x) {
            entry:
                %a = add %x, 1
                %b = add %x, 2
                %c = add %a, %b
                ret %c
            }
        "})
        .unwrap();
        let mut allocator = GraphColoringAllocator::new(15);

        allocator.prepare(&cfg, &mut function);

        assert_eq!(function.frame_size(), 0);
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn assigning_without_a_graph_is_a_bug() {
        let mut function = FunctionData::new("f");
        function.fresh_temporary();

        GraphColoringAllocator::new(4).assign(&mut function);
    }

    #[test]
    #[should_panic(expected = "internal compiler error")]
    fn empty_register_budget_is_a_bug() {
        GraphColoringAllocator::new(0);
    }
}
