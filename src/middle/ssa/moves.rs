//! Sequentialization of parallel copies.
//!
//! The moves generated for the phi nodes of one edge happen simultaneously:
//! every source is read before any destination is written. Emitting them one
//! after the other needs an order where no move clobbers a value another move
//! still has to read, and a spare location to break cycles.

/// Orders the parallel `(destination, source)` copies `moves` so that
/// executing them one at a time gives the same result.
///
/// Destinations must be distinct. `swap` is asked for a spare location the
/// first time a cycle has to be broken, and at most once.
pub fn sequentialize_moves<T: Copy + Eq>(
    moves: &[(T, T)],
    swap: impl FnOnce() -> T,
) -> Vec<(T, T)> {
    // Return the index of a move whose destination is not used as a source if any
    fn find_safe_move<T: Copy + Eq>(moves: &[(T, T)]) -> Option<usize> {
        moves
            .iter()
            .position(|&(dst, _)| moves.iter().all(|&(_, other_src)| other_src != dst))
    }

    let mut swap = Some(swap);
    let mut swap_location = None;

    let mut old_moves: Vec<(T, T)> = moves
        .iter()
        .copied()
        .filter(|&(dst, src)| dst != src)
        .collect();

    let mut new_moves = vec![];
    while !old_moves.is_empty() {
        while let Some(index) = find_safe_move(&old_moves) {
            new_moves.push(old_moves.remove(index));
        }

        // Only cycles are left. Save one source aside, which frees its
        // destination for the rest of the cycle.
        if !old_moves.is_empty() {
            let scratch = match (swap_location, swap.take()) {
                (Some(location), _) => location,
                (None, Some(spare)) => {
                    let location = spare();
                    swap_location = Some(location);
                    location
                }
                (None, None) => unreachable!("the spare location is only requested once"),
            };

            let (dst, src) = old_moves.remove(0);
            new_moves.push((scratch, src));
            old_moves.push((dst, scratch));
        }
    }

    new_moves
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    const SWAP: char = '$';

    /// Executes `moves` one by one over an initial state where every
    /// location holds its own name
    fn execute(moves: &[(char, char)]) -> BTreeMap<char, char> {
        let mut state = BTreeMap::new();
        for &(dst, src) in moves {
            let value = *state.get(&src).unwrap_or(&src);
            state.insert(dst, value);
        }
        state.remove(&SWAP);
        state
    }

    fn parallel(moves: &[(char, char)]) -> BTreeMap<char, char> {
        moves.iter().filter(|(d, s)| d != s).copied().collect()
    }

    #[test]
    fn independent_moves_need_no_swap() {
        let moves = [('a', 'x'), ('b', 'y')];
        let sequence = sequentialize_moves(&moves, || panic!("no swap needed"));

        assert_eq!(sequence.len(), 2);
        assert_eq!(execute(&sequence), parallel(&moves));
    }

    #[test]
    fn chains_are_ordered() {
        // a <- b must wait for b to be read by c <- b ... b <- d
        let moves = [('a', 'b'), ('b', 'c'), ('c', 'd')];
        let sequence = sequentialize_moves(&moves, || panic!("no swap needed"));

        assert_eq!(sequence, vec![('a', 'b'), ('b', 'c'), ('c', 'd')]);
        assert_eq!(execute(&sequence), parallel(&moves));
    }

    #[test]
    fn swaps_use_the_spare_location_once() {
        let moves = [('a', 'b'), ('b', 'a')];
        let sequence = sequentialize_moves(&moves, || SWAP);

        assert_eq!(sequence.len(), 3);
        assert_eq!(execute(&sequence), parallel(&moves));
    }

    #[test]
    fn two_cycles_share_the_spare_location() {
        let moves = [('a', 'b'), ('b', 'c'), ('c', 'a'), ('x', 'y'), ('y', 'x'), ('z', 'a')];
        let sequence = sequentialize_moves(&moves, || SWAP);

        assert_eq!(execute(&sequence), parallel(&moves));
    }

    #[test]
    fn self_moves_disappear() {
        let sequence = sequentialize_moves(&[('a', 'a')], || SWAP);
        assert!(sequence.is_empty());
    }
}
