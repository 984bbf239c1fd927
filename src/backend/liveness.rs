//! Liveness analysis on a CFG, possibly in SSA form.
//!
//! For every statement of every block (phis, then the body, then the
//! terminator) we compute the set of temporaries live right after it. Each
//! use is propagated backwards until a definition is met. A phi source is not
//! read where the phi stands: it is read at the end of the predecessor it is
//! keyed by, so it is made live there and nowhere else in the phi's block.

use hashbrown::{HashMap, HashSet};

use crate::{
    error::internal_error,
    middle::{
        cfg::{Cfg, StatementRef},
        lir::{Label, Temporary},
    },
};

/// One step of the backward propagation of a single temporary
#[derive(Debug, Clone, Copy)]
enum Work {
    /// Live at the end of a whole block
    LiveOutAtBlock(Label),
    /// Live right after the statement at this position
    LiveOutAt(Label, usize),
    /// Live right before the statement at this position
    LiveInAt(Label, usize),
}

#[derive(Debug, Default)]
pub struct Liveness {
    liveout: HashMap<(Label, usize), HashSet<Temporary>>,
}

impl Liveness {
    pub fn run(cfg: &Cfg) -> Self {
        let statements: HashMap<Label, Vec<StatementRef<'_>>> = cfg
            .blocks()
            .map(|block| (block.label(), block.statements().collect()))
            .collect();

        let mut liveness = Liveness::default();
        for (label, block) in &statements {
            for position in 0..block.len() {
                liveness.liveout.insert((*label, position), HashSet::new());
            }
        }

        // Blocks the end of which already carries a temporary
        let mut seen: HashMap<Temporary, HashSet<Label>> = HashMap::new();

        for block in cfg.blocks() {
            let label = block.label();

            for (position, statement) in statements[&label].iter().enumerate() {
                match statement {
                    StatementRef::Phi(phi) => {
                        for (predecessor, source) in &phi.sources {
                            liveness.propagate(
                                cfg,
                                &statements,
                                &mut seen,
                                *source,
                                Work::LiveOutAtBlock(*predecessor),
                            );
                        }
                    }
                    other => {
                        for temporary in other.uses() {
                            liveness.propagate(
                                cfg,
                                &statements,
                                &mut seen,
                                temporary,
                                Work::LiveInAt(label, position),
                            );
                        }
                    }
                }
            }

            // The destinations of the phis of a block are written together
            // when entering it, so they must all be live at once
            for phi in block.phis() {
                liveness.propagate(
                    cfg,
                    &statements,
                    &mut seen,
                    phi.destination,
                    Work::LiveOutAtBlock(label),
                );
            }
        }

        liveness
    }

    fn propagate(
        &mut self,
        cfg: &Cfg,
        statements: &HashMap<Label, Vec<StatementRef<'_>>>,
        seen: &mut HashMap<Temporary, HashSet<Label>>,
        temporary: Temporary,
        start: Work,
    ) {
        let mut worklist = vec![start];

        while let Some(work) = worklist.pop() {
            match work {
                Work::LiveOutAtBlock(label) => {
                    if seen.entry(temporary).or_default().insert(label) {
                        let last = statements[&label].len() - 1;
                        worklist.push(Work::LiveOutAt(label, last));
                    }
                }
                Work::LiveOutAt(label, position) => {
                    self.live_out_mut(label, position).insert(temporary);
                    if !statements[&label][position].defines().contains(&temporary) {
                        worklist.push(Work::LiveInAt(label, position));
                    }
                }
                Work::LiveInAt(label, 0) => {
                    for predecessor in cfg.predecessors(label) {
                        worklist.push(Work::LiveOutAtBlock(*predecessor));
                    }
                }
                Work::LiveInAt(label, position) => {
                    worklist.push(Work::LiveOutAt(label, position - 1));
                }
            }
        }
    }

    fn live_out_mut(&mut self, label: Label, position: usize) -> &mut HashSet<Temporary> {
        match self.liveout.get_mut(&(label, position)) {
            Some(set) => set,
            None => internal_error!("no statement {position} in {label}"),
        }
    }

    /// Temporaries live right after the statement at `position` of `label`
    pub fn live_out(&self, label: Label, position: usize) -> &HashSet<Temporary> {
        match self.liveout.get(&(label, position)) {
            Some(set) => set,
            None => internal_error!("no statement {position} in {label}"),
        }
    }

    /// Temporaries live at the end of `label`
    pub fn live_out_of_block(&self, cfg: &Cfg, label: Label) -> &HashSet<Temporary> {
        self.live_out(label, cfg.block(label).statement_count() - 1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Label, usize, &HashSet<Temporary>)> {
        self.liveout
            .iter()
            .map(|((label, position), set)| (*label, *position, set))
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::{lir::parse::parse_function, ssa::enter_ssa};

    #[test]
    fn straight_line() {
        let (cfg, function) = parse_function(indoc! {"
            fn f(%a) {
            entry:
                %b = add %a, 1
                %c = mul %b, 2
                ret %c
            }
        "})
        .unwrap();
        let [a, b, c] = function.temporaries()[..] else {
            panic!("expected three temporaries");
        };
        let entry = cfg.entry();

        let liveness = Liveness::run(&cfg);

        assert_eq!(liveness.live_out(entry, 0), &HashSet::from([b]));
        assert_eq!(liveness.live_out(entry, 1), &HashSet::from([c]));
        assert!(liveness.live_out(entry, 2).is_empty());
        assert!(liveness.iter().all(|(_, _, set)| !set.contains(&a)));
    }

    #[test]
    fn loop_carried_values_stay_live_around_the_loop() {
        let (cfg, _) = parse_function(indoc! {"
            fn f(%n) {
            entry:
                %s = li 0
                jmp header
            header:
                br gt %n, 0, body, exit
            body:
                %s = add %s, %n
                %n = sub %n, 1
                jmp header
            exit:
                ret %s
            }
        "})
        .unwrap();
        let [_, header, body, _] = cfg.labels()[..] else {
            panic!("expected four blocks");
        };
        let s = cfg.block(cfg.entry()).instructions[0].defines()[0];

        let liveness = Liveness::run(&cfg);

        assert!(liveness.live_out_of_block(&cfg, body).contains(&s));
        assert!(liveness.live_out_of_block(&cfg, header).contains(&s));
        assert!(liveness.live_out(cfg.entry(), 0).contains(&s));
    }

    #[test]
    fn phi_sources_are_live_only_on_their_edge() {
        let (mut cfg, mut function) = parse_function(indoc! {"
            fn f(%c) {
            entry:
                br eq %c, 0, left, right
            left:
                %x = li 1
                jmp join
            right:
                %x = li 2
                jmp join
            join:
                ret %x
            }
        "})
        .unwrap();
        let [_, left, right, join] = cfg.labels()[..] else {
            panic!("expected four blocks");
        };
        enter_ssa(&mut cfg, &mut function);
        let phi = cfg.block(join).phis().next().unwrap().clone();
        let (from_left, from_right) = (phi.sources[&left], phi.sources[&right]);

        let liveness = Liveness::run(&cfg);

        assert!(liveness.live_out_of_block(&cfg, left).contains(&from_left));
        assert!(!liveness.live_out_of_block(&cfg, left).contains(&from_right));
        assert!(liveness.live_out_of_block(&cfg, right).contains(&from_right));
        assert!(!liveness.live_out_of_block(&cfg, right).contains(&from_left));
        // Nothing flows past the phi into the join
        assert!(!liveness.live_out(join, 0).contains(&from_left));
        assert!(liveness.live_out(join, 0).contains(&phi.destination));
    }

    #[test]
    fn live_sets_only_hold_pool_temporaries() {
        let (mut cfg, mut function) = parse_function(indoc! {"
            fn f(%a, %b) {
            entry:
                jmp header
            header:
                br lt %a, %b, body, exit
            body:
                %t = mv %a
                %a = add %b, 1
                %b = mv %t
                jmp header
            exit:
                ret %a
            }
        "})
        .unwrap();
        enter_ssa(&mut cfg, &mut function);

        let liveness = Liveness::run(&cfg);
        let pool: HashSet<Temporary> = function.temporaries().into_iter().collect();

        for (_, _, set) in liveness.iter() {
            assert!(set.is_subset(&pool));
        }
    }
}
