//! Copying the accessible part of an automaton while rewriting edges.

use bit_set::BitSet;
use biodivine_lib_bdd::Bdd;
use oma_core::MarkSet;

use crate::automaton::{Automaton, PropSelection};
use crate::error::{Error, Result};
use crate::graph::StateId;

/// Copies the part of `aut` accessible from its initial state into `res`
/// (which must be empty of states), letting `fun` rewrite each edge's
/// label and marks. An edge whose label is rewritten to false is dropped,
/// and does not make its destination accessible.
///
/// `res` keeps the state numbering of `aut`; states that end up
/// inaccessible simply have no edges.
pub fn transform_accessible<F>(aut: &Automaton, res: &mut Automaton, fun: F) -> Result<()>
where
    F: FnMut(StateId, &mut Bdd, &mut MarkSet, StateId),
{
    transform_accessible_from(aut, res, fun, aut.init_state())
}

/// Like [`transform_accessible`], but explores from `root` instead of the
/// initial state (which `root` also becomes in `res`).
pub fn transform_accessible_from<F>(
    aut: &Automaton,
    res: &mut Automaton,
    mut fun: F,
    root: StateId,
) -> Result<()>
where
    F: FnMut(StateId, &mut Bdd, &mut MarkSet, StateId),
{
    if aut.is_alternating() {
        return Err(Error::InvalidInput(
            "transform_accessible() does not support alternating automata".into(),
        ));
    }
    if aut.num_states() == 0 {
        return Ok(());
    }
    res.new_states(aut.num_states());
    res.set_init_state(root)?;

    let mut seen = BitSet::with_capacity(aut.num_states() as usize);
    let mut todo = vec![root];
    seen.insert(root as usize);
    while let Some(src) = todo.pop() {
        for e in aut.out(src) {
            let mut label = e.label.clone();
            let mut marks = e.marks;
            fun(src, &mut label, &mut marks, e.dst);
            if label.is_false() {
                continue;
            }
            res.new_edge(src, e.dst, label, marks)?;
            if seen.insert(e.dst as usize) {
                todo.push(e.dst);
            }
        }
    }
    Ok(())
}

/// The sub-automaton of `aut` restricted to the states in `keep`, rooted
/// at `start`. Edges leaving `keep` are dropped; acceptance, propositions
/// and the state count are preserved.
pub fn mask_keep_accessible_states(
    aut: &Automaton,
    keep: &BitSet,
    start: StateId,
) -> Result<Automaton> {
    let mut res = Automaton::new(aut.dict().clone());
    res.copy_ap_of(aut);
    res.copy_acceptance_of(aut);
    res.prop_copy(
        aut,
        PropSelection { state_based: true, inherently_weak: false, deterministic: false, stutter_inv: true },
    );
    transform_accessible_from(
        aut,
        &mut res,
        |_, label, _, dst| {
            if !keep.contains(dst as usize) {
                *label = aut.dict().mk_false();
            }
        },
        start,
    )?;
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use crate::scc;

    #[test]
    fn masking_restricts_the_language() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(3);
        aut.set_init_state(0).unwrap();
        aut.set_buchi();
        aut.new_edge(0, 1, dict.mk_true(), MarkSet::singleton(0)).unwrap();
        aut.new_edge(1, 1, dict.mk_true(), MarkSet::singleton(0)).unwrap();
        aut.new_edge(1, 2, dict.mk_true(), MarkSet::EMPTY).unwrap();
        aut.new_edge(2, 2, dict.mk_true(), MarkSet::EMPTY).unwrap();

        let mut keep = BitSet::new();
        keep.insert(1);
        let masked = mask_keep_accessible_states(&aut, &keep, 1).unwrap();
        assert_eq!(masked.init_state(), 1);
        // Only the accepting self-loop survives.
        assert_eq!(masked.num_edges(), 1);
        assert!(!scc::is_empty(&masked));

        let mut keep = BitSet::new();
        keep.insert(2);
        let masked = mask_keep_accessible_states(&aut, &keep, 2).unwrap();
        assert!(scc::is_empty(&masked));
    }
}
