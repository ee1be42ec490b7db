//! Rabin-like to Büchi conversion for state-based automata.
//!
//! Each SCC is checked for Büchi-typability: if no cycle of the SCC is
//! rejecting under every pair, its final states can simply be marked and
//! the structure kept. Other SCCs get one main copy plus one auxiliary
//! copy per Fin set firing in them; the auxiliary copy drops every edge
//! marked with that set, and the main copy jumps into it
//! nondeterministically on back edges.
//!
//! On nondeterministic input the typability test may miss some
//! Büchi-typable SCCs; those then go through the copy construction, which
//! keeps the result correct at the price of extra states.

use std::collections::BTreeSet;

use bit_set::BitSet;
use oma_core::{MarkSet, Trivalent};
use tracing::trace;

use crate::automaton::{Automaton, PropSelection};
use crate::error::Result;
use crate::graph::StateId;
use crate::ops::mask::mask_keep_accessible_states;
use crate::scc::{self, SccInfo};

/// Converts a state-based Rabin-like automaton to state-based Büchi.
///
/// Returns `None` when the input is not state-based, not Rabin-like, or
/// alternating; the caller is expected to fall back to the general Fin
/// elimination.
pub fn rabin_to_buchi_maybe(aut: &Automaton) -> Result<Option<Automaton>> {
    if !aut.is_state_based_acc().is_true() || aut.is_alternating() {
        return Ok(None);
    }
    if aut.acc().code().is_t() {
        return Ok(None);
    }
    let Some(pairs) = aut.acc().is_rabin_like() else {
        return Ok(None);
    };

    // Sort the pairs into the three shapes the construction handles:
    // Fin(n)&Inf(n+1) proper pairs, lone Inf singletons, lone Fin sets.
    let mut inf_pairs = MarkSet::EMPTY;
    let mut inf_alone = MarkSet::EMPTY;
    let mut fin_alone = MarkSet::EMPTY;
    for pair in pairs {
        if pair.inf.is_empty() {
            fin_alone |= pair.fin;
        } else if pair.fin.is_empty() {
            if pair.inf.count() != 1 {
                return Ok(None);
            }
            inf_alone |= pair.inf;
        } else {
            if pair.fin.count() != 1
                || pair.inf.count() != 1
                || pair.inf != (pair.fin << 1)
            {
                return Ok(None);
            }
            inf_pairs |= pair.inf;
        }
    }
    trace!(%inf_pairs, %inf_alone, %fin_alone, "detected Rabin-like pairs");
    ra_to_ba(aut, inf_pairs, inf_alone, fin_alone).map(Some)
}

// Whether the SCC given by `states` (visiting `sets`) contains no cycle
// that is rejecting under every pair; its certainly-final states are
// recorded on the way.
//
// A cycle accepts iff some pair (Fᵢ, Iᵢ) has Iᵢ visited but Fᵢ avoided.
fn is_scc_ba_type(
    aut: &Automaton,
    states: &[StateId],
    final_states: &mut [bool],
    inf_pairs: MarkSet,
    inf_alone: MarkSet,
    sets: MarkSet,
) -> Result<bool> {
    // Bit i of f/i below: pair with Inf set i whose Fin/Inf part is
    // visited by the SCC as a whole.
    let f = (sets << 1) & inf_pairs;
    let mut i = (sets & inf_pairs) - f;
    i |= inf_alone & sets;
    if i.is_empty() {
        // The SCC taken as one big cycle rejects; it is Büchi-type iff
        // no smaller cycle accepts either.
        let mut keep = BitSet::with_capacity(aut.num_states() as usize);
        for &s in states {
            keep.insert(s as usize);
        }
        return Ok(scc::is_empty_restricted(aut, &keep));
    }
    // States on a surviving Inf set are final; for the rest we must make
    // sure no rejecting cycle can be built from them alone.
    let mut unknown: BTreeSet<StateId> = BTreeSet::new();
    for &s in states {
        if !(aut.state_acc_sets(s)? & i).is_empty() {
            final_states[s as usize] = true;
        } else {
            unknown.insert(s);
        }
    }
    while let Some(&start) = unknown.iter().next() {
        let mut keep = BitSet::with_capacity(aut.num_states() as usize);
        for &s in &unknown {
            keep.insert(s as usize);
        }
        let masked = mask_keep_accessible_states(aut, &keep, start)?;
        let msi = SccInfo::new(&masked);
        for sub in 0..msi.scc_count() {
            for &s in msi.states_of(sub) {
                unknown.remove(&s);
            }
            if msi.is_rejecting_scc(sub) {
                continue;
            }
            if !is_scc_ba_type(
                aut,
                msi.states_of(sub),
                final_states,
                inf_pairs,
                MarkSet::EMPTY,
                msi.marks_of(sub),
            )? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn ra_to_ba(
    aut: &Automaton,
    inf_pairs: MarkSet,
    inf_alone: MarkSet,
    fin_alone: MarkSet,
) -> Result<Automaton> {
    debug_assert!(aut.is_state_based_acc().is_true());

    let si = SccInfo::new(aut);
    let scc_max = si.scc_count();
    let mut scc_ba_type = vec![false; scc_max as usize];
    let mut ba_final = vec![false; aut.num_states() as usize];

    for n in 0..scc_max {
        if si.is_rejecting_scc(n) {
            scc_ba_type[n as usize] = true;
            continue;
        }
        let sets = si.marks_of(n);
        let ba = if (sets & fin_alone) != fin_alone {
            // Some lone Fin set is avoided by the whole SCC, so every
            // cycle in it accepts.
            for &s in si.states_of(n) {
                ba_final[s as usize] = true;
            }
            true
        } else if !fin_alone.is_empty() {
            // All lone Fin sets fire here; those pairs never accept.
            false
        } else {
            is_scc_ba_type(aut, si.states_of(n), &mut ba_final, inf_pairs, inf_alone, sets)?
        };
        scc_ba_type[n as usize] = ba;
    }

    let nst = aut.num_states();
    let mut res = Automaton::new(aut.dict().clone());
    res.copy_ap_of(aut);
    res.prop_copy(
        aut,
        PropSelection { state_based: true, inherently_weak: false, deterministic: false, stutter_inv: true },
    );
    res.new_states(nst);
    res.set_buchi();
    res.set_init_state(aut.init_state())?;
    let mut deterministic = aut.is_deterministic();

    let mut state_map = vec![0u32; nst as usize];
    for n in 0..scc_max {
        let states = si.states_of(n).to_vec();

        if scc_ba_type[n as usize] {
            // Büchi-type: keep the structure, mark the final states.
            for &s in &states {
                let acc = ba_final[s as usize];
                for e in aut.out(s) {
                    res.new_acc_edge(s, e.dst, e.label.clone(), acc)?;
                }
            }
            continue;
        }

        deterministic = Trivalent::No;

        // The main copy only accepts for lone Inf sets and pairs whose
        // Fin set never fires in this SCC.
        let sccsets = si.marks_of(n);
        let f = (sccsets << 1) & inf_pairs;
        let i = (sccsets & (inf_pairs | inf_alone)) - f;
        for &s in &states {
            let acc = !(aut.state_acc_sets(s)? & i).is_empty();
            for e in aut.out(s) {
                res.new_acc_edge(s, e.dst, e.label.clone(), acc)?;
            }
        }

        // One auxiliary copy per Fin set firing here.
        let rem = sccsets & ((inf_pairs >> 1) | fin_alone);
        debug_assert!(!rem.is_empty());
        for r in rem.sets() {
            let base = res.new_states(states.len() as u32);
            for (off, &s) in states.iter().enumerate() {
                state_map[s as usize] = base + off as u32;
            }
            for &s in &states {
                let ns = state_map[s as usize];
                let acc = aut.state_acc_sets(s)?;
                // The copy omits every state (and edge) on the avoided set.
                if acc.has(r) {
                    continue;
                }
                let jacc = !(acc & inf_alone).is_empty();
                let cacc = fin_alone.has(r) || acc.has(r + 1);
                for e in aut.out(s) {
                    if si.scc_of(e.dst) != Some(n) {
                        continue;
                    }
                    let nd = state_map[e.dst as usize];
                    res.new_acc_edge(ns, nd, e.label.clone(), cacc)?;
                    // One nondeterministic jump per cycle suffices; back
                    // edges are a sufficient approximation.
                    if e.dst <= s {
                        res.new_acc_edge(s, nd, e.label.clone(), jacc)?;
                    }
                }
            }
        }
    }

    res.purge_dead_states();
    res.prop_deterministic(deterministic);
    trace!(states = res.num_states(), "converted Rabin-like acceptance");
    Ok(res)
}
