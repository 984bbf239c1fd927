//! Dominance information for a [`Cfg`]: immediate dominators, the dominator
//! tree and dominance frontiers.
//!
//! Immediate dominators are computed with the iterative algorithm of Cooper,
//! Harvey and Kennedy over a reverse postorder; frontiers are collected by
//! walking up from the predecessors of every join block. Only blocks
//! reachable from the entry take part.

use std::collections::{BTreeMap, BTreeSet};

use crate::{error::internal_error, middle::cfg::Cfg, middle::lir::Label};

#[derive(Debug, Clone, Default)]
pub struct Dominance {
    /// Absent for the entry
    idom: BTreeMap<Label, Label>,
    children: BTreeMap<Label, Vec<Label>>,
    frontier: BTreeMap<Label, BTreeSet<Label>>,
    reverse_postorder: Vec<Label>,
}

impl Dominance {
    pub fn compute(cfg: &Cfg) -> Self {
        let entry = cfg.entry();
        let reverse_postorder = reverse_postorder(cfg);
        let number: BTreeMap<Label, usize> = reverse_postorder
            .iter()
            .enumerate()
            .map(|(i, &l)| (l, i))
            .collect();

        let mut doms: BTreeMap<Label, Label> = BTreeMap::from([(entry, entry)]);

        let mut changed = true;
        while changed {
            changed = false;
            for &block in reverse_postorder.iter().skip(1) {
                let mut processed = cfg
                    .predecessors(block)
                    .iter()
                    .copied()
                    .filter(|p| doms.contains_key(p));

                let Some(first) = processed.next() else {
                    continue;
                };

                let new_idom = processed.fold(first, |idom, pred| {
                    intersect(pred, idom, &doms, &number)
                });

                if doms.get(&block) != Some(&new_idom) {
                    doms.insert(block, new_idom);
                    changed = true;
                }
            }
        }

        doms.remove(&entry);

        let mut children: BTreeMap<Label, Vec<Label>> = BTreeMap::new();
        for &block in &reverse_postorder {
            if let Some(parent) = doms.get(&block) {
                children.entry(*parent).or_default().push(block);
            }
        }

        let mut frontier: BTreeMap<Label, BTreeSet<Label>> = BTreeMap::new();
        for &block in &reverse_postorder {
            let predecessors: Vec<Label> = cfg
                .predecessors(block)
                .iter()
                .copied()
                .filter(|p| number.contains_key(p))
                .collect();
            if predecessors.len() < 2 {
                continue;
            }

            let idom = doms.get(&block).copied();
            for predecessor in predecessors {
                let mut runner = Some(predecessor);
                while let Some(r) = runner {
                    if Some(r) == idom {
                        break;
                    }
                    frontier.entry(r).or_default().insert(block);
                    runner = doms.get(&r).copied();
                }
            }
        }

        Self {
            idom: doms,
            children,
            frontier,
            reverse_postorder,
        }
    }

    pub fn immediate_dominator(&self, label: Label) -> Option<Label> {
        self.idom.get(&label).copied()
    }

    /// Children of `label` in the dominator tree, in reverse postorder
    pub fn children(&self, label: Label) -> &[Label] {
        self.children.get(&label).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn frontier(&self, label: Label) -> &BTreeSet<Label> {
        static EMPTY: BTreeSet<Label> = BTreeSet::new();
        self.frontier.get(&label).unwrap_or(&EMPTY)
    }

    pub fn reverse_postorder(&self) -> &[Label] {
        &self.reverse_postorder
    }

    /// Whether every path from the entry to `b` goes through `a`
    pub fn dominates(&self, a: Label, b: Label) -> bool {
        let mut current = Some(b);
        while let Some(c) = current {
            if c == a {
                return true;
            }
            current = self.immediate_dominator(c);
        }
        false
    }
}

fn intersect(
    b1: Label,
    b2: Label,
    doms: &BTreeMap<Label, Label>,
    number: &BTreeMap<Label, usize>,
) -> Label {
    let mut finger1 = b1;
    let mut finger2 = b2;

    while finger1 != finger2 {
        while number[&finger1] > number[&finger2] {
            finger1 = match doms.get(&finger1) {
                Some(d) => *d,
                None => internal_error!("{finger1} has no dominator yet"),
            };
        }
        while number[&finger2] > number[&finger1] {
            finger2 = match doms.get(&finger2) {
                Some(d) => *d,
                None => internal_error!("{finger2} has no dominator yet"),
            };
        }
    }

    finger1
}

fn reverse_postorder(cfg: &Cfg) -> Vec<Label> {
    let mut postorder = Vec::new();
    let mut visited = BTreeSet::from([cfg.entry()]);
    let mut stack = vec![(cfg.entry(), cfg.block(cfg.entry()).terminator().successors(), 0)];

    while let Some((label, successors, next)) = stack.last_mut() {
        if let Some(&successor) = successors.get(*next) {
            *next += 1;
            if visited.insert(successor) {
                let successors = cfg.block(successor).terminator().successors();
                stack.push((successor, successors, 0));
            }
        } else {
            postorder.push(*label);
            stack.pop();
        }
    }

    postorder.reverse();
    postorder
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;
    use crate::middle::lir::parse::parse_function;

    #[test]
    fn diamond() {
        let (cfg, _) = parse_function(indoc! {"
            fn f(%c) {
            entry:
                br eq %c, 0, left, right
            left:
                jmp join
            right:
                jmp join
            join:
                ret
            }
        "})
        .unwrap();
        let [entry, left, right, join] = cfg.labels()[..] else {
            panic!("expected four blocks");
        };

        let dominance = Dominance::compute(&cfg);

        assert_eq!(dominance.immediate_dominator(entry), None);
        assert_eq!(dominance.immediate_dominator(left), Some(entry));
        assert_eq!(dominance.immediate_dominator(right), Some(entry));
        assert_eq!(dominance.immediate_dominator(join), Some(entry));
        assert_eq!(dominance.children(entry).len(), 3);

        assert_eq!(dominance.frontier(left), &BTreeSet::from([join]));
        assert_eq!(dominance.frontier(right), &BTreeSet::from([join]));
        assert!(dominance.frontier(entry).is_empty());
        assert!(dominance.frontier(join).is_empty());
    }

    #[test]
    fn loop_header_is_in_its_own_frontier() {
        let (cfg, _) = parse_function(indoc! {"
            fn f(%n) {
            entry:
                jmp header
            header:
                br lt %n, 10, body, exit
            body:
                %n = add %n, 1
                jmp header
            exit:
                ret %n
            }
        "})
        .unwrap();
        let [entry, header, body, exit] = cfg.labels()[..] else {
            panic!("expected four blocks");
        };

        let dominance = Dominance::compute(&cfg);

        assert_eq!(dominance.immediate_dominator(header), Some(entry));
        assert_eq!(dominance.immediate_dominator(body), Some(header));
        assert_eq!(dominance.immediate_dominator(exit), Some(header));
        assert_eq!(dominance.frontier(body), &BTreeSet::from([header]));
        assert_eq!(dominance.frontier(header), &BTreeSet::from([header]));
        assert!(dominance.dominates(header, body));
        assert!(!dominance.dominates(body, exit));
        assert_eq!(dominance.reverse_postorder()[0], entry);
    }
}
