//! Conversion of Streett-like acceptance to generalized Büchi.
//!
//! The dedicated construction tracks, per state, the set of `Inf` sets
//! still owed because their paired `Fin` set has been visited: edges
//! update this pending set, a generalized-Büchi mark is emitted for every
//! pair whose obligation is currently discharged, and nondeterministic
//! resets into the pending-tracking copy happen on back edges only. With
//! `n` pairs the construction multiplies the state count by at most
//! `2ⁿ + 1`.

use std::collections::VecDeque;

use indexmap::IndexMap;
use oma_core::{Acceptance, MarkSet};
use tracing::trace;

use crate::automaton::{Automaton, PropSelection};
use crate::config;
use crate::error::{Error, Result};
use crate::graph::StateId;
use crate::ops::remove_fin::{cleanup_acceptance, remove_fin};
use crate::scc::SccInfo;

/// Converts a Streett-like automaton to generalized Büchi.
///
/// Fails with [`Error::PreconditionViolation`] when the acceptance is not
/// Streett-like. Generalized-Büchi input is returned unchanged.
pub fn streett_to_generalized_buchi(aut: &Automaton) -> Result<Automaton> {
    if aut.acc().is_generalized_buchi() {
        return Ok(Automaton::copy_of(aut, PropSelection::all()));
    }
    let Some(pairs) = aut.acc().is_streett_like() else {
        return Err(Error::PreconditionViolation(
            "streett_to_generalized_buchi() requires Streett-like acceptance",
        ));
    };
    if aut.is_alternating() {
        return Err(Error::InvalidInput(
            "streett_to_generalized_buchi() does not support alternating automata".into(),
        ));
    }

    let (inf, fin) = aut.acc().code().used_inf_fin_sets();
    let p = inf.count();
    if p == 0 {
        // Pure-Fin pairs carry no obligation to track; the generic
        // Fin elimination handles them.
        return remove_fin(aut);
    }
    // Everything that is not an Inf set disappears from the output.
    let to_strip = aut.acc().all_sets() - inf;

    let num_sets = aut.num_sets() as usize;
    let mut fin_to_infpairs = vec![MarkSet::EMPTY; num_sets];
    let mut inf_to_finpairs = vec![MarkSet::EMPTY; num_sets];
    let mut inf_alone = MarkSet::EMPTY;
    for pair in &pairs {
        if pair.fin.is_empty() {
            inf_alone |= pair.inf;
        } else {
            for mark in pair.fin.sets() {
                fin_to_infpairs[mark as usize] |= pair.inf;
            }
        }
        for mark in pair.inf.sets() {
            inf_to_finpairs[mark as usize] |= pair.fin;
        }
    }

    let si = SccInfo::new(aut);

    // Per SCC: the Fin sets whose paired Inf cannot be satisfied here,
    // the Inf sets whose paired Fin never fires here, and whether any
    // Fin/Inf set occurs at all.
    let nscc = si.scc_count();
    let mut sccfi = Vec::with_capacity(nscc as usize);
    for s in 0..nscc {
        let acc = si.marks_of(s);
        let acc_fin = acc & fin;
        let acc_inf = acc & inf;
        let mut fin_wo_inf = MarkSet::EMPTY;
        for mark in acc_fin.sets() {
            let partners = fin_to_infpairs[mark as usize];
            if partners.is_empty() || !(partners - acc_inf).is_empty() {
                fin_wo_inf.set(mark);
            }
        }
        let mut inf_wo_fin = MarkSet::EMPTY;
        for mark in acc_inf.sets() {
            let partners = inf_to_finpairs[mark as usize];
            if partners.is_empty() || !(partners - acc_fin).is_empty() {
                inf_wo_fin.set(mark);
            }
        }
        sccfi.push((fin_wo_inf, inf_wo_fin, acc_fin.is_empty(), acc_inf.is_empty()));
    }

    let mut out = Automaton::new(aut.dict().clone());
    out.copy_ap_of(aut);
    out.prop_copy(
        aut,
        PropSelection { state_based: false, inherently_weak: false, deterministic: false, stutter_inv: true },
    );
    out.set_generalized_buchi(p);

    // States of the original copy carry no pending set.
    type PendState = (StateId, Option<MarkSet>);
    let mut bs2num: IndexMap<PendState, u32> = IndexMap::new();
    let mut todo: VecDeque<PendState> = VecDeque::new();

    let start: PendState = (aut.init_state(), None);
    bs2num.insert(start, out.new_state());
    out.set_init_state(0)?;
    todo.push_back(start);

    let sbacc = aut.is_state_based_acc().is_true();

    let intern = |out: &mut Automaton,
                      todo: &mut VecDeque<PendState>,
                      bs2num: &mut IndexMap<PendState, u32>,
                      d: PendState| {
        match bs2num.get(&d) {
            Some(&n) => n,
            None => {
                let n = out.new_state();
                bs2num.insert(d, n);
                todo.push_back(d);
                n
            }
        }
    };

    while let Some(s) = todo.pop_front() {
        let src = bs2num[&s];
        let scc_src = si.scc_of(s.0).expect("reachable state");
        let maybe_acc_scc = !si.is_rejecting_scc(scc_src);
        let (scc_fin_wo_inf, scc_inf_wo_fin, no_fin, _no_inf) = sccfi[scc_src as usize];

        'edges: for e in aut.out(s.0) {
            let mut pend = s.1;
            let mut acc = MarkSet::EMPTY;
            let maybe_acc =
                maybe_acc_scc && Some(scc_src) == si.scc_of(e.dst);

            if let Some(p) = pend {
                let mut p = p;
                if !maybe_acc {
                    continue;
                }
                // No point entering a place we could never leave clean.
                if !(e.marks & scc_fin_wo_inf).is_empty() {
                    continue;
                }
                // Every fired Fin set makes its paired Inf sets pending;
                // Inf sets seen right away are discharged again.
                for mark in (e.marks & fin).sets() {
                    p |= fin_to_infpairs[mark as usize];
                }
                p -= e.marks & inf;

                // Emit one generalized-Büchi mark per non-pending pair;
                // stripping shifts them to the output numbering.
                acc = (inf - p).strip(to_strip);

                if sbacc {
                    let a = aut.state_acc_sets(e.dst)?;
                    if !(a & scc_fin_wo_inf).is_empty() {
                        continue;
                    }
                    for mark in (a & fin).sets() {
                        p |= fin_to_infpairs[mark as usize];
                    }
                    p -= a & inf;
                }
                p |= inf_alone;
                pend = Some(p);
            } else if no_fin && maybe_acc {
                // Without any Fin set in the SCC, the original copy can
                // emit marks directly; Inf sets whose Fin partner never
                // fires here count as seen.
                acc = (e.marks | (inf - scc_inf_wo_fin)).strip(to_strip);
            }

            let d = (e.dst, pend);
            let dest = intern(&mut out, &mut todo, &mut bs2num, d);
            out.new_edge(src, dest, e.label.clone(), acc)?;

            // Reset nondeterministically into the pending-tracking copy,
            // once per cycle; back edges are a sufficient approximation.
            if s.1.is_none() && e.src >= e.dst && maybe_acc && !no_fin {
                let mut stpend = MarkSet::EMPTY;
                if sbacc {
                    let a = aut.state_acc_sets(e.dst)?;
                    if !(a & scc_fin_wo_inf).is_empty() {
                        continue 'edges;
                    }
                    for mark in (a & fin).sets() {
                        stpend |= fin_to_infpairs[mark as usize];
                    }
                    stpend -= a & inf;
                }
                let d = (e.dst, Some(stpend | inf_alone));
                let dest = intern(&mut out, &mut todo, &mut bs2num, d);
                out.new_edge(src, dest, e.label.clone(), MarkSet::EMPTY)?;
            }
        }
    }
    trace!(states = out.num_states(), pairs = pairs.len(), "converted Streett-like acceptance");
    Ok(out)
}

/// Runs [`streett_to_generalized_buchi`] only when the acceptance is
/// Streett-like with at least `OMA_STREETT_CONV_MIN` pairs (and at least
/// one `Inf` set); returns `None` otherwise.
pub fn streett_to_generalized_buchi_maybe(aut: &Automaton) -> Result<Option<Automaton>> {
    let min = config::streett_conv_min();
    let Some(pairs) = aut.acc().is_streett_like() else {
        return Ok(None);
    };
    let (inf, _) = aut.acc().code().used_inf_fin_sets();
    if min == 0 || (pairs.len() as u32) < min || inf.is_empty() {
        return Ok(None);
    }
    streett_to_generalized_buchi(aut).map(Some)
}

/// Converts any acceptance condition to generalized Büchi, preserving the
/// language.
pub fn to_generalized_buchi(aut: &Automaton) -> Result<Automaton> {
    if let Some(res) = streett_to_generalized_buchi_maybe(aut)? {
        return Ok(res);
    }

    let mut res = remove_fin(&cleanup_acceptance(aut)?)?;
    if res.acc().is_generalized_buchi() {
        return Ok(res);
    }

    let cnf = res.acc().code().to_cnf();

    // A lucky CNF may already be a plain conjunction of Inf sets.
    if cnf.is_t() || matches!(cnf, Acceptance::Inf(_)) {
        res.set_acceptance(res.num_sets(), cnf)?;
        return cleanup_acceptance(&res);
    }

    // The unsatisfiable condition becomes the canonical empty automaton:
    // one state, no successor, `t` acceptance.
    if cnf.is_f() {
        let mut empty = Automaton::new(aut.dict().clone());
        empty.copy_ap_of(aut);
        empty.new_state();
        empty.set_init_state(0)?;
        empty.prop_state_based_acc(true);
        empty.prop_weak(true);
        empty.prop_stutter_invariant(true);
        return Ok(empty);
    }

    let terms = cnf_terms(&cnf);
    let nterms = terms.len() as u32;
    debug_assert!(nterms > 0);
    res.set_generalized_buchi(nterms);
    for e in res.graph_mut().edges_mut() {
        let cur = e.marks;
        let mut new = MarkSet::EMPTY;
        for (i, term) in terms.iter().enumerate() {
            if !(cur & *term).is_empty() {
                new.set(i as u32);
            }
        }
        e.marks = new;
    }
    Ok(res)
}

// The clauses of a Fin-free CNF, each as the union of its Inf marks.
fn cnf_terms(cnf: &Acceptance) -> Vec<MarkSet> {
    fn term(c: &Acceptance) -> MarkSet {
        match c {
            Acceptance::Inf(m) => *m,
            Acceptance::Or(cs) => cs.iter().fold(MarkSet::EMPTY, |acc, c| match c {
                Acceptance::Inf(m) => acc | *m,
                _ => acc,
            }),
            _ => MarkSet::EMPTY,
        }
    }
    match cnf {
        Acceptance::And(cs) => cs.iter().map(term).collect(),
        other => vec![term(other)],
    }
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

    // The one-pair Streett automaton: s0 -a{0}-> s1, s1 -b{1}-> s0 with
    // acceptance Fin(0)|Inf(1); its language is (ab)^ω.
    fn one_pair() -> Automaton {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let mut aut = Automaton::new(dict.clone());
        aut.register_ap("a").unwrap();
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(2, parse_acceptance("Fin(0) | Inf(1)").unwrap())
            .unwrap();
        aut.new_edge(0, 1, dict.mk_var(a), marks([0])).unwrap();
        aut.new_edge(1, 0, dict.mk_var(a).not(), marks([1])).unwrap();
        aut
    }

    #[test]
    fn one_pair_streett_to_gba() {
        let aut = one_pair();
        let out = streett_to_generalized_buchi(&aut).unwrap();
        assert!(out.acc().is_generalized_buchi());
        assert_eq!(out.num_sets(), 1);
        assert!(out.num_states() <= 4);
        assert!(!scc::is_empty(&out));
    }

    #[test]
    fn gba_input_is_unchanged() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_generalized_buchi(2);
        aut.new_edge(0, 0, dict.mk_true(), marks([0, 1])).unwrap();
        let out = streett_to_generalized_buchi(&aut).unwrap();
        assert_eq!(out, aut);
    }

    #[test]
    fn non_streett_input_is_rejected() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        // Rabin 2 is not Streett-like.
        aut.set_acceptance(
            4,
            parse_acceptance("(Fin(0)&Inf(1)) | (Fin(2)&Inf(3))").unwrap(),
        )
        .unwrap();
        aut.new_edge(0, 0, dict.mk_true(), marks([1])).unwrap();
        assert!(matches!(
            streett_to_generalized_buchi(&aut),
            Err(Error::PreconditionViolation(_))
        ));
    }

    #[test]
    fn maybe_respects_the_pair_threshold() {
        // One pair is below the default threshold of three.
        let aut = one_pair();
        assert!(streett_to_generalized_buchi_maybe(&aut).unwrap().is_none());
    }

    #[test]
    fn to_generalized_buchi_handles_streett_like() {
        let aut = one_pair();
        let out = to_generalized_buchi(&aut).unwrap();
        assert!(out.acc().is_generalized_buchi());
        assert!(!scc::is_empty(&out));
    }

    #[test]
    fn to_generalized_buchi_of_unsatisfiable_acceptance() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(1, parse_acceptance("Fin(0) & Inf(0)").unwrap())
            .unwrap();
        aut.new_edge(0, 0, dict.mk_true(), marks([0])).unwrap();
        let out = to_generalized_buchi(&aut).unwrap();
        assert!(out.acc().is_generalized_buchi());
        assert!(scc::is_empty(&out));
    }

    #[test]
    fn language_is_preserved_on_two_pairs() {
        // Two Streett pairs over marks on a two-state cycle; the cycle
        // satisfies both pairs, so the conversion must stay nonempty.
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(
            4,
            parse_acceptance("(Fin(0)|Inf(1)) & (Fin(2)|Inf(3))").unwrap(),
        )
        .unwrap();
        aut.new_edge(0, 1, dict.mk_true(), marks([0, 1])).unwrap();
        aut.new_edge(1, 0, dict.mk_true(), marks([3])).unwrap();
        let out = streett_to_generalized_buchi(&aut).unwrap();
        assert!(out.acc().is_generalized_buchi());
        assert!(!scc::is_empty(&out));

        // Making pair 0 unsatisfiable (0 fires, 1 never) empties it.
        let mut aut2 = Automaton::new(dict.clone());
        aut2.new_states(2);
        aut2.set_init_state(0).unwrap();
        aut2.set_acceptance(
            4,
            parse_acceptance("(Fin(0)|Inf(1)) & (Fin(2)|Inf(3))").unwrap(),
        )
        .unwrap();
        aut2.new_edge(0, 1, dict.mk_true(), marks([0])).unwrap();
        aut2.new_edge(1, 0, dict.mk_true(), marks([0, 3])).unwrap();
        let out = streett_to_generalized_buchi(&aut2).unwrap();
        assert!(scc::is_empty(&out));
    }
}
