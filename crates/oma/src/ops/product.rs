//! The synchronous product of two automata.

use indexmap::IndexMap;
use tracing::trace;

use crate::automaton::Automaton;
use crate::dict::same_dictionary;
use crate::error::{Error, Result};
use crate::graph::StateId;

/// Builds the product of `left` and `right`: states are the reachable
/// pairs, a joint edge is labelled with the conjunction of the operand
/// labels and marked with the left marks united with the right marks
/// shifted past the left universe. The acceptance condition is the
/// conjunction of the left condition and the shifted right condition, so
/// a word is accepted iff both operands accept it.
///
/// Both operands must share one dictionary and be free of universal
/// branching.
pub fn product(left: &Automaton, right: &Automaton) -> Result<Automaton> {
    if !same_dictionary(left.dict(), right.dict()) {
        return Err(Error::InvalidInput(
            "product() operands must share their dictionary".into(),
        ));
    }
    if left.is_alternating() || right.is_alternating() {
        return Err(Error::InvalidInput(
            "product() does not support alternating operands".into(),
        ));
    }
    if left.num_states() == 0 || right.num_states() == 0 {
        return Err(Error::InvalidInput(
            "product() operands need at least one state".into(),
        ));
    }

    let shift = left.num_sets();
    let mut res = Automaton::new(left.dict().clone());
    res.copy_ap_of(left);
    res.copy_ap_of(right);
    res.set_acceptance(
        shift + right.num_sets(),
        left.acc().code().clone().and(right.acc().code().shift(shift)),
    )?;

    // The pair map doubles as the work list: entries are processed in
    // insertion order and the insertion index is the product state id.
    let mut pairs: IndexMap<(StateId, StateId), ()> = IndexMap::new();
    pairs.insert((left.init_state(), right.init_state()), ());
    res.new_state();
    res.set_init_state(0)?;

    let mut cursor = 0;
    while cursor < pairs.len() {
        let (&(sl, sr), _) = pairs.get_index(cursor).expect("cursor is in range");
        let src = cursor as StateId;
        cursor += 1;
        for el in left.out(sl) {
            for er in right.out(sr) {
                let label = el.label.and(&er.label);
                if label.is_false() {
                    continue;
                }
                let marks = el.marks | (er.marks << shift);
                let key = (el.dst, er.dst);
                let entry = pairs.entry(key);
                let dst = entry.index() as StateId;
                entry.or_insert(());
                if dst == res.num_states() {
                    res.new_state();
                }
                res.new_edge(src, dst, label, marks)?;
            }
        }
    }

    res.prop_state_based_acc(left.is_state_based_acc() & right.is_state_based_acc());
    res.prop_deterministic(left.is_deterministic() & right.is_deterministic());
    res.prop_stutter_invariant(left.is_stutter_invariant() & right.is_stutter_invariant());
    trace!(states = res.num_states(), "built product");
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use crate::scc;
    use oma_core::MarkSet;

    fn marks(sets: impl IntoIterator<Item = u32>) -> MarkSet {
        MarkSet::from_iter(sets)
    }

    // A single-state Büchi automaton accepting words with infinitely
    // many positions satisfying `label`.
    fn inf_often(dict: &std::rc::Rc<Dictionary>, label: biodivine_lib_bdd::Bdd) -> Automaton {
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_buchi();
        aut.new_edge(0, 0, label.clone(), marks([0])).unwrap();
        aut.new_edge(0, 0, label.not(), MarkSet::EMPTY).unwrap();
        aut
    }

    #[test]
    fn product_combines_marks_and_acceptance() {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let b = dict.register_ap("b").unwrap();
        let left = inf_often(&dict, dict.mk_var(a));
        let right = inf_often(&dict, dict.mk_var(b));

        let prod = product(&left, &right).unwrap();
        assert_eq!(prod.num_sets(), 2);
        assert!(prod.acc().is_generalized_buchi());
        assert_eq!(prod.num_states(), 1);
        assert_eq!(prod.num_edges(), 4);

        // The a&b edge carries both shifted marks.
        let both: Vec<_> = prod
            .edges()
            .filter(|(_, e)| e.label == dict.mk_var(a).and(&dict.mk_var(b)))
            .collect();
        assert_eq!(both.len(), 1);
        assert_eq!(both[0].1.marks, marks([0, 1]));
        assert!(!scc::is_empty(&prod));
    }

    #[test]
    fn product_with_empty_language_is_empty() {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let left = inf_often(&dict, dict.mk_var(a));

        // An automaton accepting nothing: its only mark never repeats.
        let mut right = Automaton::new(dict.clone());
        right.new_states(2);
        right.set_init_state(0).unwrap();
        right.set_buchi();
        right.new_edge(0, 1, dict.mk_true(), marks([0])).unwrap();
        right.new_edge(1, 1, dict.mk_true(), MarkSet::EMPTY).unwrap();

        let prod = product(&left, &right).unwrap();
        assert!(scc::is_empty(&prod));
    }

    #[test]
    fn product_requires_shared_dictionary() {
        let d1 = Dictionary::new();
        let d2 = Dictionary::new();
        let l = inf_often(&d1, d1.mk_true());
        let r = inf_often(&d2, d2.mk_true());
        assert!(matches!(product(&l, &r), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn product_intersects_incompatible_labels_away() {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        // Left forces a, right forces !a: the product accepts nothing and
        // has just the initial state with no edge.
        let mut left = Automaton::new(dict.clone());
        left.new_state();
        left.set_init_state(0).unwrap();
        left.set_buchi();
        left.new_edge(0, 0, dict.mk_var(a), marks([0])).unwrap();

        let mut right = Automaton::new(dict.clone());
        right.new_state();
        right.set_init_state(0).unwrap();
        right.set_buchi();
        right
            .new_edge(0, 0, dict.mk_var(a).not(), marks([0]))
            .unwrap();

        let prod = product(&left, &right).unwrap();
        assert_eq!(prod.num_states(), 1);
        assert_eq!(prod.num_edges(), 0);
    }
}
