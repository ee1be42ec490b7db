//! Elimination of `Fin` acceptance.
//!
//! The general construction splits the acceptance condition, in
//! disjunctive normal form, by the `Fin` sets of each clause: the main
//! copy of the automaton keeps all behaviours, and one clone per clause
//! drops every edge that would visit the clause's `Fin` sets, with
//! nondeterministic jumps from the main copy into the clones on back
//! edges. Weak automata and Streett-/Rabin-like conditions take cheaper
//! dedicated routes.

use std::collections::BTreeMap;

use oma_core::{Acceptance, MarkSet};
use tracing::trace;

use crate::automaton::{Automaton, PropSelection};
use crate::error::{Error, Result};
use crate::graph::StateId;
use crate::ops::rabin::rabin_to_buchi_maybe;
use crate::ops::streett::streett_to_generalized_buchi_maybe;
use crate::scc::SccInfo;

/// Rewrites the acceptance condition and the edge marks so that no `Fin`
/// primitive remains, preserving the language. Fin-free input is returned
/// unchanged.
pub fn remove_fin(aut: &Automaton) -> Result<Automaton> {
    if !aut.acc().uses_fin_acceptance() {
        return Ok(Automaton::copy_of(aut, PropSelection::all()));
    }
    if aut.is_alternating() {
        return Err(Error::InvalidInput(
            "remove_fin() does not support alternating automata".into(),
        ));
    }
    if aut.is_weak().is_true() {
        return remove_fin_weak(aut);
    }
    if let Some(res) = streett_to_generalized_buchi_maybe(aut)? {
        return Ok(res);
    }
    if let Some(res) = rabin_to_buchi_maybe(aut)? {
        return Ok(res);
    }

    // The clause bookkeeping below assumes every declared set occurs on
    // some edge; clean up first when that fails.
    {
        let mut unused = aut.acc().all_sets();
        for (_, e) in aut.edges() {
            unused -= e.marks;
            if unused.is_empty() {
                break;
            }
        }
        if !unused.is_empty() {
            return remove_fin(&cleanup_acceptance(aut)?);
        }
    }

    let dnf = {
        let code = aut.acc().code();
        if code.is_dnf() { code.clone() } else { code.to_dnf() }
    };
    // An unsatisfiable condition normalizes to the canonical empty
    // automaton: one state without successors and `t` acceptance.
    if dnf.is_f() {
        let mut empty = Automaton::new(aut.dict().clone());
        empty.copy_ap_of(aut);
        empty.new_state();
        empty.set_init_state(0)?;
        empty.prop_state_based_acc(true);
        empty.prop_weak(true);
        empty.prop_stutter_invariant(true);
        return Ok(empty);
    }
    let split = split_dnf_by_fin(&dnf);
    debug_assert!(!split.is_empty());

    // Per clause: the Fin sets to avoid, the Inf sets to keep, and the
    // extra sets distinguishing overlapping clauses.
    let mut rem: Vec<MarkSet> = Vec::with_capacity(split.len());
    let mut code: Vec<Acceptance> = Vec::with_capacity(split.len());
    let mut keep: Vec<MarkSet> = Vec::with_capacity(split.len());
    let mut add: Vec<MarkSet> = vec![MarkSet::EMPTY; split.len()];
    let mut has_true_term = false;
    let mut allinf = MarkSet::EMPTY;
    let mut allfin = MarkSet::EMPTY;
    for (fin, inf_code) in split {
        rem.push(fin);
        allfin |= fin;
        let (inf, _) = inf_code.used_inf_fin_sets();
        if inf.is_empty() {
            has_true_term = true;
        }
        keep.push(inf);
        allinf |= inf;
        code.push(inf_code);
    }

    let mut acc = aut.acc().clone();
    let mut extra_sets = 0u32;

    // Clauses sharing Inf sets need separating marks so that satisfying
    // one clause cannot leak into another.
    let interference = {
        let mut sofar = MarkSet::EMPTY;
        let mut found = false;
        for k in &keep {
            if !(*k & sofar).is_empty() {
                found = true;
                break;
            }
            sofar |= *k;
        }
        found
    };
    if interference {
        trace!("acceptance clauses interfere");
        let mut exs = vec![0u32; acc.num_sets() as usize];
        for f in allfin.sets() {
            if allinf.has(f) {
                exs[f as usize] = acc.add_sets(1)?;
                extra_sets += 1;
            } else {
                exs[f as usize] = f;
            }
        }
        for i in 0..rem.len() {
            let mut m = MarkSet::EMPTY;
            for f in rem[i].sets() {
                m.set(exs[f as usize]);
            }
            add[i] = m;
            code[i] = code[i].clone().and(Acceptance::inf(m));
        }
    } else if has_true_term {
        trace!("acceptance has a pure-Fin clause");
        let one = acc.add_sets(1)?;
        extra_sets += 1;
        let m = MarkSet::singleton(one);
        let mut c = Acceptance::inf(m);
        for i in 0..code.len() {
            if !code[i].is_t() {
                continue;
            }
            add[i] = m;
            code[i] = code[i].clone().and(c);
            // Later true terms become unsatisfiable instead of sharing
            // the new set.
            c = Acceptance::Bottom;
        }
    }

    let mut new_code = Acceptance::Bottom;
    for c in &code {
        new_code = new_code.or(c.clone());
    }

    let nst = aut.num_states();
    let mut res = Automaton::new(aut.dict().clone());
    res.copy_ap_of(aut);
    res.prop_copy(
        aut,
        PropSelection { state_based: true, inherently_weak: false, deterministic: false, stutter_inv: true },
    );
    res.new_states(nst);
    res.set_acceptance(aut.num_sets() + extra_sets, new_code)?;
    res.set_init_state(aut.init_state())?;

    let sbacc = aut.is_state_based_acc().is_true();
    let si = SccInfo::new(aut);
    let nscc = si.scc_count();
    let mut state_map = vec![0u32; nst as usize];
    let cs = code.len();

    for n in 0..nscc {
        let m = si.marks_of(n);
        let states = si.states_of(n).to_vec();

        // What the main copy keeps and gains here.
        let mut main_sets = MarkSet::EMPTY;
        let mut main_add = MarkSet::EMPTY;
        let mut intersects_fin = false;
        for i in 0..cs {
            if (m & rem[i]).is_empty() {
                main_sets |= keep[i];
                main_add |= add[i];
            } else {
                intersects_fin = true;
            }
        }

        for &s in &states {
            for e in aut.out(s) {
                let mut a = MarkSet::EMPTY;
                if sbacc || si.scc_of(e.dst) == Some(n) {
                    a = (e.marks & main_sets) | main_add;
                }
                res.new_edge(s, e.dst, e.label.clone(), a)?;
            }
        }

        // Clones are only needed when a satisfiable clause has something
        // to avoid here.
        if !intersects_fin || si.is_rejecting_scc(n) {
            continue;
        }
        for i in 0..cs {
            if (m & rem[i]).is_empty() {
                continue;
            }
            let r = rem[i];
            let k = keep[i];
            let a = add[i];
            let base = res.new_states(states.len() as u32);
            for (off, &s) in states.iter().enumerate() {
                state_map[s as usize] = base + off as u32;
            }
            for &s in &states {
                let ns = state_map[s as usize];
                for e in aut.out(s) {
                    if !(e.marks & r).is_empty() || si.scc_of(e.dst) != Some(n) {
                        continue;
                    }
                    let nd = state_map[e.dst as usize];
                    res.new_edge(ns, nd, e.label.clone(), (e.marks & k) | a)?;
                    // One nondeterministic jump per cycle is enough;
                    // back edges are a sufficient approximation.
                    if e.dst <= s {
                        let mut ja = MarkSet::EMPTY;
                        if sbacc {
                            ja = (e.marks & main_sets) | main_add;
                        }
                        res.new_edge(s, nd, e.label.clone(), ja)?;
                    }
                }
            }
        }
    }

    // Without any Inf set in the input, every emitted mark is per state.
    if allinf.is_empty() {
        res.prop_state_based_acc(true);
    }
    res.purge_dead_states();
    let mut res = cleanup_acceptance(&res)?;
    res.merge_edges();
    trace!(states = res.num_states(), "eliminated Fin acceptance");
    Ok(res)
}

// Weak automata only need per-SCC repainting: every edge of an accepting
// non-trivial SCC becomes Büchi-accepting.
fn remove_fin_weak(aut: &Automaton) -> Result<Automaton> {
    let mut res = Automaton::copy_of(
        aut,
        PropSelection { state_based: true, inherently_weak: true, deterministic: true, stutter_inv: true },
    );
    let paint: Vec<(StateId, MarkSet)> = {
        let si = SccInfo::new(&res);
        let all = MarkSet::singleton(0);
        (0..res.num_states())
            .map(|s| {
                let acc = match si.scc_of(s) {
                    Some(c) if si.is_accepting_scc(c) && !si.is_trivial(c) => all,
                    _ => MarkSet::EMPTY,
                };
                (s, acc)
            })
            .collect()
    };
    res.set_buchi();
    res.prop_state_based_acc(true);
    let graph = res.graph_mut();
    for (s, acc) in paint {
        for id in graph.out_ids(s).collect::<Vec<_>>() {
            graph.edge_mut(id).marks = acc;
        }
    }
    Ok(res)
}

/// Removes acceptance sets that are unused by the condition or absent
/// from every edge, renumbering the rest densely. Runs to a fixpoint,
/// since treating an absent set as unsatisfiable can expose more unused
/// sets.
pub fn cleanup_acceptance(aut: &Automaton) -> Result<Automaton> {
    let mut res = Automaton::copy_of(aut, PropSelection::all());
    loop {
        let all = res.acc().all_sets();
        let used_in_cond = res.acc().code().used_sets();
        let mut used_on_edges = MarkSet::EMPTY;
        for (_, e) in res.edges() {
            used_on_edges |= e.marks;
        }
        used_on_edges &= all;
        let useless = (all - used_in_cond) | (all - used_on_edges);
        if useless.is_empty() {
            return Ok(res);
        }
        let code = res.acc().code().strip(useless, true);
        let num = res.num_sets() - useless.count();
        for e in res.graph_mut().edges_mut() {
            e.marks = e.marks.strip(useless);
        }
        res.set_acceptance(num, code)?;
    }
}

// Splits a DNF condition by the Fin sets of each clause, merging the Inf
// parts of clauses with identical Fin sets. A pure-Fin clause stands for
// one entry per member set, with the true Inf part.
fn split_dnf_by_fin(dnf: &Acceptance) -> BTreeMap<MarkSet, Acceptance> {
    let mut res: BTreeMap<MarkSet, Acceptance> = BTreeMap::new();
    let mut insert = |fin: MarkSet, inf: Acceptance| {
        res.entry(fin)
            .and_modify(|c| *c = std::mem::replace(c, Acceptance::Bottom).or(inf.clone()))
            .or_insert(inf);
    };
    let mut clause = |c: &Acceptance| match c {
        Acceptance::Fin(m) => {
            for s in m.sets() {
                insert(MarkSet::singleton(s), Acceptance::Top);
            }
        }
        Acceptance::Inf(m) => insert(MarkSet::EMPTY, Acceptance::inf(*m)),
        Acceptance::And(cs) => {
            let mut fin = MarkSet::EMPTY;
            let mut inf = MarkSet::EMPTY;
            for c in cs {
                match c {
                    Acceptance::Fin(m) => fin |= *m,
                    Acceptance::Inf(m) => inf |= *m,
                    _ => debug_assert!(false, "expected DNF"),
                }
            }
            insert(fin, Acceptance::inf(inf));
        }
        Acceptance::Top => insert(MarkSet::EMPTY, Acceptance::Top),
        _ => debug_assert!(false, "expected DNF"),
    };
    match dnf {
        Acceptance::Or(cs) => {
            for c in cs {
                clause(c);
            }
        }
        other => clause(other),
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use crate::scc;
    use oma_core::parse_acceptance;

    fn marks(sets: impl IntoIterator<Item = u32>) -> MarkSet {
        MarkSet::from_iter(sets)
    }

    #[test]
    fn fin_free_input_is_unchanged() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_buchi();
        aut.new_edge(0, 0, dict.mk_true(), marks([0])).unwrap();
        assert_eq!(remove_fin(&aut).unwrap(), aut);
    }

    #[test]
    fn rabin_one_becomes_fin_free() {
        // Two loops on one cycle: marks {1} (good) and {0,1} (bad);
        // acceptance Fin(0)&Inf(1). The good loop alone accepts.
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let mut aut = Automaton::new(dict.clone());
        aut.register_ap("a").unwrap();
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(2, parse_acceptance("Fin(0) & Inf(1)").unwrap())
            .unwrap();
        aut.new_edge(0, 0, dict.mk_var(a), marks([1])).unwrap();
        aut.new_edge(0, 0, dict.mk_var(a).not(), marks([0, 1])).unwrap();

        let out = remove_fin(&aut).unwrap();
        assert!(!out.acc().uses_fin_acceptance());
        assert!(!scc::is_empty(&out));
    }

    #[test]
    fn unsatisfiable_clause_empties_the_language() {
        // The only loop visits the Fin set, so nothing is accepted.
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(2, parse_acceptance("Fin(0) & Inf(1)").unwrap())
            .unwrap();
        aut.new_edge(0, 0, dict.mk_true(), marks([0, 1])).unwrap();
        let out = remove_fin(&aut).unwrap();
        assert!(!out.acc().uses_fin_acceptance());
        assert!(scc::is_empty(&out));
    }

    #[test]
    fn unsatisfiable_condition_becomes_the_canonical_empty_automaton() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(1, parse_acceptance("Fin(0) & Inf(0)").unwrap())
            .unwrap();
        aut.new_edge(0, 0, dict.mk_true(), marks([0])).unwrap();
        let out = remove_fin(&aut).unwrap();
        assert_eq!(out.num_states(), 1);
        assert_eq!(out.num_edges(), 0);
        assert!(out.acc().code().is_t());
        assert!(scc::is_empty(&out));
    }

    #[test]
    fn weak_shortcut_repaints_sccs() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_co_buchi();
        aut.prop_weak(true);
        // SCC {0} avoids the Fin set, SCC {1} hits it.
        aut.new_edge(0, 0, dict.mk_true(), MarkSet::EMPTY).unwrap();
        aut.new_edge(0, 1, dict.mk_true(), MarkSet::EMPTY).unwrap();
        aut.new_edge(1, 1, dict.mk_true(), marks([0])).unwrap();

        let out = remove_fin(&aut).unwrap();
        assert!(out.acc().is_buchi());
        assert!(out.is_state_based_acc().is_true());
        assert!(out.state_is_accepting(0).unwrap());
        assert!(!out.state_is_accepting(1).unwrap());
    }

    #[test]
    fn cleanup_drops_unused_sets() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        // Set 1 never occurs on an edge: Inf(1)&Inf(2) cannot hold, so
        // the whole disjunct disappears and set 0 remains alone.
        aut.set_acceptance(3, parse_acceptance("Inf(0) | (Inf(1) & Inf(2))").unwrap())
            .unwrap();
        aut.new_edge(0, 0, dict.mk_true(), marks([0, 2])).unwrap();
        let out = cleanup_acceptance(&aut).unwrap();
        assert_eq!(out.num_sets(), 1);
        assert!(out.acc().is_buchi());
        assert_eq!(out.edges().next().unwrap().1.marks, marks([0]));
    }

    #[test]
    fn interfering_clauses_get_separating_sets() {
        // Fin(0)&Inf(2) | Fin(1)&Inf(2): both clauses keep Inf(2).
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(
            3,
            parse_acceptance("(Fin(0)&Inf(2)) | (Fin(1)&Inf(2))").unwrap(),
        )
        .unwrap();
        aut.new_edge(0, 1, dict.mk_true(), marks([0, 2])).unwrap();
        aut.new_edge(1, 0, dict.mk_true(), marks([1, 2])).unwrap();
        aut.new_edge(1, 1, dict.mk_true(), marks([1, 2])).unwrap();

        // Cycle 0↔1 visits both Fin sets; cycle 1→1 avoids set 0 while
        // visiting set 2, satisfying the first clause. The language is
        // nonempty and must stay so without Fin sets.
        let out = remove_fin(&aut).unwrap();
        assert!(!out.acc().uses_fin_acceptance());
        assert!(!scc::is_empty(&out));
    }

    #[test]
    fn generalized_co_buchi_has_true_term() {
        // Fin(0)|Fin(1): pure-Fin clauses, the "true term" path.
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(2, parse_acceptance("Fin(0) | Fin(1)").unwrap())
            .unwrap();
        aut.new_edge(0, 1, dict.mk_true(), marks([0])).unwrap();
        aut.new_edge(1, 0, dict.mk_true(), marks([1])).unwrap();
        aut.new_edge(1, 1, dict.mk_true(), marks([1])).unwrap();

        // The loop 1→1 avoids set 0, so the language is nonempty.
        let out = remove_fin(&aut).unwrap();
        assert!(!out.acc().uses_fin_acceptance());
        assert!(!scc::is_empty(&out));

        // With both sets on every cycle, it is empty.
        let mut aut2 = Automaton::new(dict.clone());
        aut2.new_state();
        aut2.set_init_state(0).unwrap();
        aut2.set_acceptance(2, parse_acceptance("Fin(0) | Fin(1)").unwrap())
            .unwrap();
        aut2.new_edge(0, 0, dict.mk_true(), marks([0, 1])).unwrap();
        let out = remove_fin(&aut2).unwrap();
        assert!(scc::is_empty(&out));
    }
}
