//! Degeneralization: generalized Büchi → single-set Büchi.
//!
//! Output states are pairs `(s, ℓ)` of an input state and a *level*
//! `ℓ ∈ [0, n]` tracking which acceptance sets are still awaited, in a
//! fixed ordering of the `n` input sets. An edge whose marks contain the
//! awaited set advances the level (transitively, when level skipping is
//! on); level `n` is the accepting level, from which the construction
//! restarts at level 0. The transition-based variant never materializes
//! the level-`n` states and marks the wrap-around edges instead.

use std::collections::HashMap;
use std::collections::VecDeque;

use indexmap::IndexMap;
use oma_core::MarkSet;
use tracing::trace;

use crate::automaton::{Automaton, PropSelection};
use crate::error::{Error, Result};
use crate::graph::{EdgeId, StateId};
use crate::scc::SccInfo;

/// How the per-state level cache treats repeated entries into an SCC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LevelCache {
    Off,
    /// Reuse the level of the first visit.
    #[default]
    First,
    /// Reuse the smallest level seen so far.
    Smallest,
    /// Reuse the largest level seen so far.
    Largest,
}

/// Tuning knobs of the degeneralization; the defaults match the plain
/// construction.
#[derive(Clone, Copy, Debug)]
pub struct DegenOptions {
    /// Restart at level 0 when an edge changes SCC.
    pub reset_level_on_scc_change: bool,
    /// Maintain one set ordering per SCC, in mark-discovery order,
    /// instead of one global ordering.
    pub per_scc_orders: bool,
    /// Remember the level at which a state was first entered in its SCC
    /// and force re-entries to that level.
    pub level_cache: LevelCache,
    /// Advance past consecutive already-satisfied sets in one step.
    pub skip_levels: bool,
    /// Start (and re-enter SCCs) at the accepting level when the state
    /// has an accepting self-loop.
    pub accepting_self_loop_heuristic: bool,
}

impl Default for DegenOptions {
    fn default() -> Self {
        DegenOptions {
            reset_level_on_scc_change: false,
            per_scc_orders: false,
            level_cache: LevelCache::First,
            skip_levels: true,
            accepting_self_loop_heuristic: false,
        }
    }
}

/// Converts a generalized-Büchi automaton into a Büchi automaton with
/// state-based acceptance, with default options. Inputs that already are
/// state-based Büchi are returned unchanged (as a copy).
pub fn degeneralize(aut: &Automaton) -> Result<Automaton> {
    degeneralize_with(aut, DegenOptions::default())
}

/// See [`degeneralize`].
pub fn degeneralize_with(aut: &Automaton, opts: DegenOptions) -> Result<Automaton> {
    if aut.is_sba().is_true() {
        return Ok(Automaton::copy_of(aut, PropSelection::all()));
    }
    degeneralize_aux(aut, opts, true)
}

/// Converts a generalized-Büchi automaton into a transition-based Büchi
/// automaton, with default options. Büchi inputs are returned unchanged.
pub fn degeneralize_tba(aut: &Automaton) -> Result<Automaton> {
    degeneralize_tba_with(aut, DegenOptions::default())
}

/// See [`degeneralize_tba`].
pub fn degeneralize_tba_with(aut: &Automaton, opts: DegenOptions) -> Result<Automaton> {
    if aut.acc().is_buchi() {
        return Ok(Automaton::copy_of(aut, PropSelection::all()));
    }
    degeneralize_aux(aut, opts, false)
}

// Acceptance sets common to, united over, and self-looping at each
// state's intra-SCC out-edges.
struct OutgoingAcc {
    common: MarkSet,
    union: MarkSet,
    acc_self_loop: bool,
}

fn outgoing_cache(aut: &Automaton, si: Option<&SccInfo>) -> Vec<OutgoingAcc> {
    (0..aut.num_states())
        .map(|s| {
            let mut common = aut.acc().all_sets();
            let mut union = MarkSet::EMPTY;
            let mut acc_self_loop = false;
            let mut seen = false;
            let s_scc = si.and_then(|m| m.scc_of(s));
            for e in aut.out(s) {
                if let Some(m) = si {
                    if m.scc_of(e.dst) != s_scc {
                        continue;
                    }
                }
                common &= e.marks;
                union |= e.marks;
                acc_self_loop |= e.dst == s && aut.acc().accepting(e.marks);
                seen = true;
            }
            if !seen {
                common = MarkSet::EMPTY;
            }
            OutgoingAcc { common, union, acc_self_loop }
        })
        .collect()
}

// One ordering of the acceptance sets, extended in discovery order.
#[derive(Default)]
struct AccOrder {
    order: Vec<u32>,
    found: MarkSet,
}

impl AccOrder {
    fn next_level(&mut self, mut level: u32, set: MarkSet, skip_levels: bool) -> u32 {
        let newsets = set - self.found;
        if !newsets.is_empty() {
            self.order.extend(newsets.sets());
            self.found |= newsets;
        }
        while (level as usize) < self.order.len() && set.has(self.order[level as usize]) {
            level += 1;
            if !skip_levels {
                break;
            }
        }
        level
    }
}

fn degeneralize_aux(aut: &Automaton, opts: DegenOptions, want_sba: bool) -> Result<Automaton> {
    if !aut.acc().is_generalized_buchi() {
        return Err(Error::InvalidInput(
            "degeneralize() only works with generalized Büchi acceptance".into(),
        ));
    }
    if aut.is_alternating() {
        return Err(Error::InvalidInput(
            "degeneralize() does not support alternating automata".into(),
        ));
    }
    if aut.num_states() == 0 {
        return Err(Error::InvalidInput("degeneralize() needs an initial state".into()));
    }

    let n = aut.num_sets();
    let use_scc = opts.level_cache != LevelCache::Off
        || opts.per_scc_orders
        || opts.reset_level_on_scc_change
        || opts.accepting_self_loop_heuristic;

    let mut res = Automaton::new(aut.dict().clone());
    res.copy_ap_of(aut);
    res.set_buchi();
    if want_sba {
        res.prop_state_based_acc(true);
    }
    res.prop_copy(
        aut,
        PropSelection { state_based: false, inherently_weak: true, deterministic: true, stutter_inv: true },
    );

    let si = use_scc.then(|| SccInfo::new(aut));
    let outgoing = outgoing_cache(aut, si.as_ref());

    // The global set ordering; with per-SCC orders each SCC discovers its
    // own instead.
    let order: Vec<u32> = (0..n).rev().collect();
    let mut scc_orders: HashMap<u32, AccOrder> = HashMap::new();
    let walk = |mut level: u32, set: MarkSet| {
        while level < n && set.has(order[level as usize]) {
            level += 1;
            if !opts.skip_levels {
                break;
            }
        }
        level
    };

    let mut ds2num: IndexMap<(StateId, u32), u32> = IndexMap::new();
    let mut lvl_cache: Vec<Option<u32>> = vec![None; aut.num_states() as usize];
    let mut todo: VecDeque<(StateId, u32)> = VecDeque::new();

    let init = aut.init_state();
    let mut start = (init, 0u32);
    if want_sba && opts.accepting_self_loop_heuristic && outgoing[init as usize].acc_self_loop {
        start.1 = n;
    }
    ds2num.insert(start, res.new_state());
    res.set_init_state(0)?;
    todo.push_back(start);
    if opts.level_cache != LevelCache::Off {
        lvl_cache[init as usize] = Some(start.1);
    }

    while let Some(s) = todo.pop_front() {
        let src = ds2num[&s];
        let mut slevel = s.1;
        // A state on the accepting level restarts at 0 and marks its
        // outgoing edges.
        let is_acc = slevel == n;
        if want_sba && is_acc {
            slevel = 0;
        }
        let s_scc = si.as_ref().and_then(|m| m.scc_of(s.0));

        // Edges to the same (state, accepting?) pair merge their labels.
        let mut tr_cache: HashMap<(u32, bool), EdgeId> = HashMap::new();

        for e in aut.out(s.0) {
            let acc = e.marks;
            let (d_scc, is_scc_acc) = match &si {
                Some(m) => {
                    let c = m.scc_of(e.dst);
                    (c, c.is_some_and(|c| m.is_accepting_scc(c)))
                }
                // Without SCC information, treat every SCC as accepting.
                None => (None, true),
            };
            let entering = s_scc != d_scc;

            let mut dlevel = 0u32;
            let mut edge_acc = want_sba && is_acc;

            if is_scc_acc {
                if opts.level_cache != LevelCache::Off
                    && entering
                    && lvl_cache[e.dst as usize].is_some()
                {
                    dlevel = lvl_cache[e.dst as usize].unwrap();
                } else if want_sba
                    && entering
                    && opts.accepting_self_loop_heuristic
                    && outgoing[e.dst as usize].acc_self_loop
                {
                    dlevel = n;
                } else if want_sba && is_acc {
                    // From the accepting level, restart at 0.
                    dlevel = 0;
                } else {
                    let base = if opts.reset_level_on_scc_change && entering { 0 } else { slevel };
                    dlevel = if opts.per_scc_orders {
                        scc_orders
                            .entry(d_scc.unwrap_or(0))
                            .or_default()
                            .next_level(base, acc, opts.skip_levels)
                    } else {
                        walk(base, acc)
                    };
                }
            }

            if !want_sba {
                // Transition-based output: the accepting level exists only
                // virtually; reaching it marks the edge and wraps to 0.
                if dlevel == n {
                    edge_acc = true;
                    dlevel = 0;
                    if !aut.acc().accepting(acc) && !opts.skip_levels {
                        dlevel = if opts.per_scc_orders {
                            scc_orders
                                .entry(d_scc.unwrap_or(0))
                                .or_default()
                                .next_level(0, acc, true)
                        } else {
                            let mut l = 0;
                            while l < n && acc.has(order[l as usize]) {
                                l += 1;
                            }
                            l
                        };
                    }
                }
            }

            let d = (e.dst, dlevel);
            let dest = match ds2num.get(&d) {
                Some(&x) => x,
                None => {
                    let x = res.new_state();
                    ds2num.insert(d, x);
                    todo.push_back(d);
                    if opts.level_cache != LevelCache::Off {
                        let lvl = match (opts.level_cache, lvl_cache[e.dst as usize]) {
                            (LevelCache::First, Some(old)) => old,
                            (LevelCache::Smallest, Some(old)) => old.min(dlevel),
                            (LevelCache::Largest, Some(old)) => old.max(dlevel),
                            (_, _) => dlevel,
                        };
                        lvl_cache[e.dst as usize] = Some(lvl);
                    }
                    x
                }
            };

            match tr_cache.entry((dest, edge_acc)) {
                std::collections::hash_map::Entry::Occupied(o) => {
                    let id = *o.get();
                    let merged = res.edge(id).label.or(&e.label);
                    res.graph_mut().edge_mut(id).label = merged;
                }
                std::collections::hash_map::Entry::Vacant(v) => {
                    let id = res.new_acc_edge(src, dest, e.label.clone(), edge_acc)?;
                    v.insert(id);
                }
            }
        }
    }

    res.merge_edges();
    trace!(
        states = res.num_states(),
        sba = want_sba,
        "degeneralized automaton"
    );
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

    // One state, a true self-loop carrying {0,1}, acceptance
    // Inf(0)&Inf(1); its language is the single word true^ω.
    fn tick_tock() -> Automaton {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_generalized_buchi(2);
        aut.new_edge(0, 0, dict.mk_true(), marks([0, 1])).unwrap();
        aut
    }

    #[test]
    fn generalized_buchi_round_trip() {
        let aut = tick_tock();
        let degen = degeneralize(&aut).unwrap();

        assert!(degen.acc().is_buchi());
        assert!(degen.is_state_based_acc().is_true());
        // One copy of the state per level actually reached.
        assert_eq!(degen.num_states(), 2);
        assert_eq!(degen.num_edges(), 2);
        // The language is still nonempty.
        assert!(!scc::is_empty(&degen));
        // Exactly the edges leaving the accepting level are marked.
        let accepting: Vec<_> = degen
            .edges()
            .filter(|(_, e)| degen.acc().accepting(e.marks))
            .collect();
        assert_eq!(accepting.len(), 1);
    }

    #[test]
    fn tba_variant_avoids_the_accepting_level() {
        let aut = tick_tock();
        let degen = degeneralize_tba(&aut).unwrap();
        assert!(degen.acc().is_buchi());
        // The self-loop becomes a single accepting transition.
        assert_eq!(degen.num_states(), 1);
        assert_eq!(degen.num_edges(), 1);
        assert!(!scc::is_empty(&degen));
    }

    #[test]
    fn buchi_input_is_returned_unchanged() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_buchi();
        aut.prop_state_based_acc(true);
        aut.new_edge(0, 0, dict.mk_true(), marks([0])).unwrap();
        let same = degeneralize(&aut).unwrap();
        assert_eq!(same, aut);
        let same = degeneralize_tba(&aut).unwrap();
        assert_eq!(same, aut);
    }

    #[test]
    fn rejects_non_generalized_buchi() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_co_buchi();
        aut.new_edge(0, 0, dict.mk_true(), marks([0])).unwrap();
        assert!(matches!(
            degeneralize(&aut),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn two_set_cycle_needs_both_marks() {
        // 0 -a-> 1 with {0}, 1 -b-> 0 with {1}: the degeneralized
        // automaton still accepts (ab)^ω and nothing over a alone.
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let mut aut = Automaton::new(dict.clone());
        aut.register_ap("a").unwrap();
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_generalized_buchi(2);
        aut.new_edge(0, 1, dict.mk_var(a), marks([0])).unwrap();
        aut.new_edge(1, 0, dict.mk_var(a).not(), marks([1])).unwrap();

        let degen = degeneralize(&aut).unwrap();
        assert!(degen.acc().is_buchi());
        assert!(!scc::is_empty(&degen));
        // Degeneralization preserves the per-state branching, so the
        // result stays deterministic here.
        for s in 0..degen.num_states() {
            for e in degen.out(s) {
                assert!(e.label == dict.mk_var(a) || e.label == dict.mk_var(a).not());
            }
        }
    }

    #[test]
    fn self_loop_heuristic_shrinks_the_result() {
        let aut = tick_tock();
        let opts = DegenOptions {
            accepting_self_loop_heuristic: true,
            ..DegenOptions::default()
        };
        let degen = degeneralize_with(&aut, opts).unwrap();
        // Starting on the accepting level folds both levels into one
        // accepting state and its restart companion.
        assert!(degen.num_states() <= 2);
        assert!(!scc::is_empty(&degen));
    }
}
