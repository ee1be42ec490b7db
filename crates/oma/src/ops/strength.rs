//! Strength classification (terminal / weak / inherently weak) and
//! decomposition of an automaton by the strength of its accepting SCCs.

use oma_core::MarkSet;
use tracing::trace;

use crate::automaton::{Automaton, PropSelection};
use crate::error::{Error, Result};
use crate::ops::mask::transform_accessible;
use crate::scc::{self, SccInfo};

/// Whether every state of `scc` can read every letter without leaving the
/// SCC (the disjunction of its internal out-labels is the true function).
pub fn is_complete_scc(si: &SccInfo<'_>, scc: u32) -> bool {
    let aut = si.aut();
    si.states_of(scc).iter().all(|&s| {
        let mut cover = aut.dict().mk_false();
        for e in aut.out(s) {
            if aut.univ_dests(e.dst).all(|d| si.scc_of(d) == Some(scc)) {
                cover = cover.or(&e.label);
            }
        }
        cover.is_true()
    })
}

/// Whether `scc` contains a cycle that does not satisfy the acceptance
/// condition.
pub fn scc_has_rejecting_cycle(si: &SccInfo<'_>, scc: u32) -> bool {
    let aut = si.aut();
    let mut keep = bit_set::BitSet::with_capacity(aut.num_states() as usize);
    for &s in si.states_of(scc) {
        keep.insert(s as usize);
    }
    scc::has_cycle_satisfying(aut, Some(&keep), &aut.acc().code().complement())
}

/// Whether all cycles of `scc` agree on their verdict (all accepting or
/// all rejecting).
pub fn is_inherently_weak_scc(si: &SccInfo<'_>, scc: u32) -> bool {
    // Rejecting SCCs (trivial ones included) are inherently weak by
    // definition.
    si.is_rejecting_scc(scc) || !scc_has_rejecting_cycle(si, scc)
}

struct Strength {
    weak: bool,
    inherently_weak: bool,
    terminal: bool,
}

// The shared walk underneath the is_*_automaton predicates: weakness is
// per-SCC mark uniformity, inherent weakness tolerates non-uniform SCCs
// without rejecting cycles, and terminality additionally needs accepting
// SCCs to be complete and not to leak accepting edges into rejecting
// ones.
fn classify(aut: &Automaton, si: &SccInfo<'_>) -> Strength {
    let mut weak = true;
    let mut inherently_weak = true;
    let mut terminal = true;
    for i in 0..si.scc_count() {
        if si.is_trivial(i) {
            continue;
        }
        let mut uniform = true;
        let mut first: Option<MarkSet> = None;
        for &src in si.states_of(i) {
            for e in aut.out(src) {
                // For universal edges the first destination decides; the
                // members share the edge marks anyway.
                let d = aut.univ_dests(e.dst).next().expect("nonempty destination");
                if si.scc_of(d) != Some(i) {
                    continue;
                }
                match first {
                    None => first = Some(e.marks),
                    Some(m) if m != e.marks => {
                        uniform = false;
                    }
                    _ => {}
                }
            }
        }
        if !uniform {
            weak = false;
            if si.is_accepting_scc(i) && scc_has_rejecting_cycle(si, i) {
                inherently_weak = false;
            }
        }
        if si.is_accepting_scc(i) && !is_complete_scc(si, i) {
            terminal = false;
        }
    }
    // A terminal automaton accepts every extension of a finished prefix:
    // no accepting edge may enter a rejecting SCC.
    if terminal {
        'scan: for (_, e) in aut.edges() {
            for d in aut.univ_dests(e.dst) {
                if aut.acc().accepting(e.marks)
                    && si.scc_of(d).is_some_and(|c| si.is_rejecting_scc(c))
                {
                    terminal = false;
                    break 'scan;
                }
            }
        }
    }
    Strength { weak, inherently_weak, terminal }
}

/// Whether all transitions inside each SCC carry the same marks.
pub fn is_weak_automaton(aut: &Automaton) -> bool {
    if aut.is_weak().is_known() {
        return aut.is_weak().is_true();
    }
    let si = SccInfo::new(aut);
    classify(aut, &si).weak
}

/// Whether accepting and rejecting cycles never share an SCC.
pub fn is_inherently_weak_automaton(aut: &Automaton) -> Result<bool> {
    if aut.is_inherently_weak().is_known() {
        return Ok(aut.is_inherently_weak().is_true());
    }
    let mut si = SccInfo::new(aut);
    if aut.is_existential() {
        si.determine_unknown_acceptance()?;
    }
    Ok(classify(aut, &si).inherently_weak)
}

/// Whether the automaton is weak, its accepting SCCs are complete, and no
/// accepting edge leads into a rejecting SCC.
pub fn is_terminal_automaton(aut: &Automaton) -> bool {
    if aut.is_terminal().is_known() {
        return aut.is_terminal().is_true();
    }
    let si = SccInfo::new(aut);
    let s = classify(aut, &si);
    s.weak && s.terminal
}

/// Whether no rejecting cycle is reachable at all.
pub fn is_safety_automaton(aut: &Automaton) -> bool {
    if aut.acc().code().is_t() {
        return true;
    }
    let si = SccInfo::new(aut);
    (0..si.scc_count()).all(|c| si.is_trivial(c) || !si.is_rejecting_scc(c))
}

/// Computes the strength flags once and records them on the automaton.
pub fn check_strength(aut: &mut Automaton) -> Result<()> {
    let s = {
        let mut si = SccInfo::new(aut);
        if aut.is_existential() {
            si.determine_unknown_acceptance()?;
        }
        classify(aut, &si)
    };
    aut.prop_weak(s.weak);
    aut.prop_inherently_weak(s.inherently_weak);
    aut.prop_terminal(s.weak && s.terminal);
    Ok(())
}

/// Which strength classes [`decompose_strength`] keeps accepting.
#[derive(Clone, Copy, Debug, Default)]
pub struct KeepStrength {
    pub terminal: bool,
    pub weak: bool,
    pub strong: bool,
}

const IGNORE: u8 = 0;
const TERMINAL: u8 = 1;
const WEAK_STRICT: u8 = 2;
const WEAK: u8 = TERMINAL | WEAK_STRICT;
const STRONG: u8 = 4;
// SCCs that only lead to the kept ones.
const NEEDED: u8 = 8;

/// Extracts the sub-automaton whose accepting SCCs are restricted to the
/// requested strength classes. SCCs merely leading to kept ones stay as
/// passage-ways with unsatisfiable acceptance. Returns `None` when no SCC
/// of a requested class exists.
pub fn decompose_strength(aut: &Automaton, keep: KeepStrength) -> Result<Option<Automaton>> {
    if !(keep.terminal || keep.weak || keep.strong) {
        return Err(Error::InvalidInput(
            "decompose_strength() needs at least one strength class".into(),
        ));
    }
    let mut keep = keep;

    let unsat = aut.acc().unsat_mark();
    let all_accepting = unsat.is_none();
    // Marks for SCCs that are only traversed.
    let uacc = unsat.unwrap_or(MarkSet::EMPTY);

    // With an always-satisfiable condition the automaton counts as weak
    // as a whole and there is no strong part to extract.
    if all_accepting {
        keep.strong = false;
        if !keep.terminal && !keep.weak {
            return Ok(None);
        }
    }

    let mut si = SccInfo::new(aut);
    if aut.is_existential() {
        si.determine_unknown_acceptance()?;
    }

    let n = si.scc_count();
    let mut want = vec![IGNORE; n as usize];
    let mut nonempty = false;
    let mut strong_seen = false;

    // Components are numbered in reverse topological order, so the
    // Needed bit can be propagated in one ascending sweep.
    for i in 0..n {
        if si.is_accepting_scc(i) {
            if all_accepting || is_inherently_weak_scc(&si, i) {
                if keep.terminal || keep.weak {
                    want[i as usize] = if keep.terminal && keep.weak {
                        WEAK
                    } else if is_complete_scc(&si, i) {
                        if keep.terminal { TERMINAL } else { IGNORE }
                    } else if keep.weak {
                        WEAK_STRICT
                    } else {
                        IGNORE
                    };
                }
            } else {
                want[i as usize] = if keep.strong { STRONG } else { IGNORE };
                strong_seen = true;
            }
            nonempty |= want[i as usize] != IGNORE;
        }
        for &j in si.succ(i) {
            if want[j as usize] != IGNORE {
                want[i as usize] |= NEEDED;
                break;
            }
        }
    }

    if !nonempty {
        return Ok(None);
    }

    let mut res = Automaton::new(aut.dict().clone());
    res.copy_ap_of(aut);
    res.prop_copy(
        aut,
        PropSelection { state_based: true, inherently_weak: false, deterministic: false, stutter_inv: true },
    );
    let wacc;
    if keep.strong {
        res.copy_acceptance_of(aut);
        wacc = MarkSet::EMPTY;
    } else {
        wacc = res.set_buchi();
    }

    let dead = aut.dict().mk_false();
    transform_accessible(aut, &mut res, |src, cond, marks, dst| {
        let dst_want = want[si.scc_of(dst).expect("reachable") as usize];
        if dst_want == IGNORE {
            *cond = dead.clone();
            return;
        }
        if want[si.scc_of(src).expect("reachable") as usize] == NEEDED {
            *marks = uacc;
            return;
        }
        if keep.strong {
            return;
        }
        *marks = wacc;
    })?;

    if keep.strong {
        res.prop_weak(!strong_seen);
    } else {
        res.prop_weak(true);
        if keep.terminal && !keep.weak {
            res.prop_terminal(true);
        }
    }
    trace!(states = res.num_states(), "decomposed by strength");
    Ok(Some(res))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;

    fn marks(sets: impl IntoIterator<Item = u32>) -> MarkSet {
        MarkSet::from_iter(sets)
    }

    // A strong SCC at state 0 (both accepting and rejecting cycles) with
    // an exit into a terminal SCC at state 1.
    fn mixed() -> Automaton {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let mut aut = Automaton::new(dict.clone());
        aut.register_ap("a").unwrap();
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_buchi();
        let va = dict.mk_var(a);
        aut.new_edge(0, 0, va.clone(), marks([0])).unwrap();
        aut.new_edge(0, 0, va.not(), MarkSet::EMPTY).unwrap();
        aut.new_edge(0, 1, dict.mk_var(a), MarkSet::EMPTY).unwrap();
        aut.new_edge(1, 1, dict.mk_true(), marks([0])).unwrap();
        aut
    }

    #[test]
    fn classification_predicates() {
        let aut = mixed();
        assert!(!is_weak_automaton(&aut));
        assert!(!is_inherently_weak_automaton(&aut).unwrap());
        assert!(!is_terminal_automaton(&aut));
        // Every non-trivial SCC of mixed() can accept, so it still
        // qualifies as safety.
        assert!(is_safety_automaton(&aut));

        // A reachable non-trivial rejecting SCC breaks the safety
        // classification.
        let dict = Dictionary::new();
        let mut unsafe_aut = Automaton::new(dict.clone());
        unsafe_aut.new_state();
        unsafe_aut.set_init_state(0).unwrap();
        unsafe_aut.set_buchi();
        unsafe_aut.new_edge(0, 0, dict.mk_true(), MarkSet::EMPTY).unwrap();
        assert!(!is_safety_automaton(&unsafe_aut));

        // A one-state always-accepting automaton is terminal.
        let dict = Dictionary::new();
        let mut term = Automaton::new(dict.clone());
        term.new_state();
        term.set_init_state(0).unwrap();
        term.set_buchi();
        term.new_edge(0, 0, dict.mk_true(), marks([0])).unwrap();
        assert!(is_weak_automaton(&term));
        assert!(is_terminal_automaton(&term));
        assert!(is_safety_automaton(&term));
    }

    #[test]
    fn check_strength_records_flags() {
        let mut aut = mixed();
        check_strength(&mut aut).unwrap();
        assert!(aut.is_weak().is_false());
        assert!(aut.is_inherently_weak().is_false());
        assert!(aut.is_terminal().is_false());
    }

    #[test]
    fn scc_level_predicates() {
        let aut = mixed();
        let si = SccInfo::new(&aut);
        let strong = si.scc_of(0).unwrap();
        let weak = si.scc_of(1).unwrap();
        assert!(scc_has_rejecting_cycle(&si, strong));
        assert!(!scc_has_rejecting_cycle(&si, weak));
        assert!(is_inherently_weak_scc(&si, weak));
        assert!(!is_inherently_weak_scc(&si, strong));
        assert!(is_complete_scc(&si, weak));
        // State 0 cannot read !a and stay in its SCC forever after the
        // exit... it can, via the !a loop; completeness holds there too.
        assert!(is_complete_scc(&si, strong));
    }

    #[test]
    fn decompose_splits_terminal_and_strong() {
        let aut = mixed();

        let term = decompose_strength(&aut, KeepStrength { terminal: true, ..Default::default() })
            .unwrap()
            .unwrap();
        assert!(term.is_weak().is_true());
        assert!(term.is_terminal().is_true());
        assert!(!scc::is_empty(&term));

        let strong = decompose_strength(&aut, KeepStrength { strong: true, ..Default::default() })
            .unwrap()
            .unwrap();
        assert!(!scc::is_empty(&strong));
        // The terminal SCC is cut away entirely.
        let si = SccInfo::new(&strong);
        assert!(
            si.scc_of(1).is_none()
                || si.states_of(si.scc_of(1).unwrap()).iter().all(|&s| strong.out(s).count() == 0)
        );
    }

    #[test]
    fn decompose_without_matching_class_is_none() {
        // An always-accepting automaton has no strong part.
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_generalized_buchi(0);
        aut.new_edge(0, 0, dict.mk_true(), MarkSet::EMPTY).unwrap();
        assert!(
            decompose_strength(&aut, KeepStrength { strong: true, ..Default::default() })
                .unwrap()
                .is_none()
        );
        assert!(decompose_strength(&aut, KeepStrength::default()).is_err());
    }
}
