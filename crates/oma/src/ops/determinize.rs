//! Determinization of (generalized) Büchi automata into deterministic
//! min-odd parity automata, via a Safra-like brace construction.
//!
//! A constructed state maps every input state it tracks to an ordered
//! list of *braces*, a monotone nesting recording which accepting
//! episodes are still open. Accepting input transitions open a fresh
//! innermost brace; a brace whose members all disappear emits *red*
//! (`2·b`), a brace all of whose members went through another accepting
//! step emits *green* (`2·b+1`) and swallows everything nested inside it.
//! The transition color is the smallest emitted value, and the output
//! accepts iff the least color seen infinitely often is odd.

use std::collections::{BTreeMap, VecDeque};

use biodivine_lib_bdd::Bdd;
use indexmap::IndexSet;
use oma_core::{Condition, MarkSet, marks::MAX_SETS};
use tracing::trace;

use crate::automaton::{Automaton, PropSelection};
use crate::config;
use crate::error::{Error, Result};
use crate::graph::StateId;
use crate::ops::degeneralize::degeneralize_tba;
use crate::scc::SccInfo;

/// Tuning knobs of the determinization.
#[derive(Clone, Copy, Debug)]
pub struct DeterminizeOptions {
    /// Seed braces only when entering accepting SCCs and drop them in
    /// rejecting ones.
    pub use_scc: bool,
    /// On stutter-invariant input, iterate each letter until the
    /// structure cycles and canonicalize to the smallest structure of the
    /// cycle.
    pub use_stutter: bool,
}

impl Default for DeterminizeOptions {
    fn default() -> Self {
        DeterminizeOptions { use_scc: true, use_stutter: true }
    }
}

/// Determinizes a (generalized) Büchi automaton into a deterministic
/// parity automaton with min-odd acceptance and the same language.
///
/// Input that is already flagged deterministic is returned unchanged.
pub fn determinize(aut: &Automaton) -> Result<Automaton> {
    determinize_with(aut, DeterminizeOptions::default())
}

/// See [`determinize`].
pub fn determinize_with(aut: &Automaton, opts: DeterminizeOptions) -> Result<Automaton> {
    if aut.is_deterministic().is_true() {
        return Ok(Automaton::copy_of(aut, PropSelection::all()));
    }
    if !aut.acc().is_generalized_buchi() {
        return Err(Error::InvalidInput(
            "determinize() requires (generalized) Büchi input".into(),
        ));
    }
    let tba = degeneralize_tba(aut)?;
    let si = SccInfo::new(&tba);
    let dict = tba.dict().clone();

    // The letters: all minterms, over the joint label support, realized
    // by some edge.
    let support = {
        let mut vars = Vec::new();
        for (_, e) in tba.edges() {
            vars.extend(dict.support(&e.label));
        }
        vars.sort();
        vars.dedup();
        vars
    };
    let mut letters: IndexSet<Bdd> = IndexSet::new();
    for (_, e) in tba.edges() {
        let mut all = e.label.clone();
        while let Some(one) = dict.pick_cube(&all, &support) {
            all = all.and_not(&one);
            letters.insert(one);
        }
    }

    let use_stutter = opts.use_stutter
        && tba.is_stutter_invariant().is_true()
        && config::stutter_check_algo() != 0;

    let mut res = Automaton::new(dict.clone());
    res.copy_ap_of(&tba);
    res.prop_copy(
        &tba,
        PropSelection { state_based: false, inherently_weak: false, deterministic: false, stutter_inv: true },
    );

    let init_state = tba.init_state();
    let start_accepting = !opts.use_scc
        || si
            .scc_of(init_state)
            .is_some_and(|c| si.is_accepting_scc(c));
    let init = SafraState::initial(init_state, start_accepting);

    let mut seen: BTreeMap<SafraState, u32> = BTreeMap::new();
    let mut todo: VecDeque<SafraState> = VecDeque::new();
    res.new_state();
    res.set_init_state(0)?;
    seen.insert(init.clone(), 0);
    todo.push_back(init);

    // Number of acceptance sets the emitted colors require.
    let mut sets = 0u32;

    while let Some(curr) = todo.pop_front() {
        let src = seen[&curr];
        for letter in &letters {
            let (succ, color) = if use_stutter {
                curr.compute_succ_stutter(&tba, letter, &si, opts.use_scc)
            } else {
                curr.compute_succ(&tba, letter, &si, opts.use_scc)
            };
            // An empty structure means the input cannot extend this
            // prefix at all; completion is somebody else's job.
            if succ.nodes.is_empty() {
                continue;
            }
            let dst = match seen.get(&succ) {
                Some(&n) => n,
                None => {
                    let n = res.new_state();
                    seen.insert(succ.clone(), n);
                    todo.push_back(succ.clone());
                    n
                }
            };
            let marks = match color {
                Some(c) => {
                    if c as usize >= MAX_SETS {
                        return Err(Error::CapacityExceeded(format!(
                            "determinization needs more than {MAX_SETS} colors"
                        )));
                    }
                    // Only the odd (green) colors matter for the size of
                    // the parity condition.
                    if c % 2 == 1 {
                        sets = sets.max(c + 1);
                    }
                    MarkSet::singleton(c)
                }
                None => MarkSet::EMPTY,
            };
            res.new_edge(src, dst, letter.clone(), marks)?;
        }
    }

    // Colors at or above the highest useful green cannot decide a cycle.
    let mask = MarkSet::all_below(sets);
    for e in res.graph_mut().edges_mut() {
        e.marks &= mask;
    }
    let parity = Condition::parity(false, true, sets);
    res.set_acceptance(sets, parity.code().clone())?;
    res.prop_deterministic(true);
    res.prop_state_based_acc(false);
    debug_assert!(deterministic_by_construction(&res));
    trace!(states = res.num_states(), colors = sets, "determinized automaton");
    Ok(res)
}

// Each (state, letter) pair produced exactly one edge.
fn deterministic_by_construction(aut: &Automaton) -> bool {
    (0..aut.num_states()).all(|s| {
        let mut joint = aut.dict().mk_false();
        for e in aut.out(s) {
            if !joint.and(&e.label).is_false() {
                return false;
            }
            joint = joint.or(&e.label);
        }
        true
    })
}

type Braces = Vec<u32>;

/// One state of the output automaton: tracked input states with their
/// brace nesting, plus per-brace bookkeeping.
#[derive(Clone, Debug)]
struct SafraState {
    nodes: BTreeMap<StateId, Braces>,
    /// Number of tracked states inside each brace.
    nb_braces: Vec<usize>,
    /// Whether the brace may still emit green this step.
    is_green: Vec<bool>,
}

impl PartialEq for SafraState {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}
impl Eq for SafraState {}
impl PartialOrd for SafraState {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for SafraState {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.nodes.cmp(&other.nodes)
    }
}

// True iff `lhs` is a smaller nesting pattern than `rhs`; on equal
// prefixes the deeper pattern wins.
fn nesting_cmp(lhs: &Braces, rhs: &Braces) -> bool {
    let m = lhs.len().min(rhs.len());
    for i in 0..m {
        if lhs[i] != rhs[i] {
            return lhs[i] < rhs[i];
        }
    }
    lhs.len() > rhs.len()
}

impl SafraState {
    fn initial(state: StateId, accepting: bool) -> Self {
        let mut nodes = BTreeMap::new();
        if accepting {
            nodes.insert(state, vec![0]);
            SafraState { nodes, nb_braces: vec![1], is_green: vec![true] }
        } else {
            nodes.insert(state, vec![]);
            SafraState { nodes, nb_braces: vec![], is_green: vec![] }
        }
    }

    fn empty(num_braces: usize) -> Self {
        SafraState {
            nodes: BTreeMap::new(),
            nb_braces: vec![0; num_braces],
            is_green: vec![true; num_braces],
        }
    }

    /// The deterministic successor on `letter`, together with the color
    /// the step emits.
    fn compute_succ(
        &self,
        aut: &Automaton,
        letter: &Bdd,
        si: &SccInfo<'_>,
        use_scc: bool,
    ) -> (SafraState, Option<u32>) {
        let mut ss = SafraState::empty(self.nb_braces.len());
        for (&state, braces) in &self.nodes {
            for e in aut.out(state) {
                if !letter.imp(&e.label).is_true() {
                    continue;
                }
                let accepting = !e.marks.is_empty();
                if use_scc && si.scc_of(state) != si.scc_of(e.dst) {
                    if si.scc_of(e.dst).is_some_and(|c| si.is_accepting_scc(c)) {
                        // Entering an accepting SCC seeds a fresh brace.
                        ss.update_succ(&[], e.dst, true);
                    } else {
                        // Braces cannot pay off in a rejecting SCC.
                        ss.update_succ(&[], e.dst, false);
                    }
                } else {
                    ss.update_succ(braces, e.dst, accepting);
                }
                debug_assert_eq!(ss.nb_braces.len(), ss.is_green.len());
            }
        }
        ss.ungreenify_last_brace();
        let color = ss.finalize_construction();
        (ss, color)
    }

    /// On stutter-invariant input, repeat the letter until the structure
    /// cycles; the result is the smallest structure of the cycle and the
    /// smallest color seen along it.
    fn compute_succ_stutter(
        &self,
        aut: &Automaton,
        letter: &Bdd,
        si: &SccInfo<'_>,
        use_scc: bool,
    ) -> (SafraState, Option<u32>) {
        let mut visited: Vec<SafraState> = Vec::new();
        let mut colors: Vec<Option<u32>> = Vec::new();
        let mut ss = self.clone();
        let loop_start = loop {
            visited.push(ss.clone());
            let (next, color) = ss.compute_succ(aut, letter, si, use_scc);
            ss = next;
            colors.push(color);
            if let Some(pos) = visited.iter().position(|x| *x == ss) {
                break pos;
            }
        };
        let min_state = visited[loop_start..]
            .iter()
            .min()
            .expect("cycle is nonempty")
            .clone();
        let min_color = colors.into_iter().flatten().min();
        (min_state, min_color)
    }

    // Adds `dst` with the given brace nesting to the structure, opening a
    // fresh innermost brace on accepting steps. When `dst` is already
    // tracked only the smaller nesting survives.
    fn update_succ(&mut self, braces: &[u32], dst: StateId, accepting: bool) {
        let mut copy = braces.to_vec();
        if accepting {
            copy.push(self.nb_braces.len() as u32);
            // Membership is counted below; a fresh brace cannot emit
            // green in the step that opens it.
            self.nb_braces.push(0);
            self.is_green.push(false);
        }
        match self.nodes.entry(dst) {
            std::collections::btree_map::Entry::Vacant(v) => {
                v.insert(copy.clone());
            }
            std::collections::btree_map::Entry::Occupied(mut o) => {
                if nesting_cmp(&copy, o.get()) {
                    for &b in o.get() {
                        self.nb_braces[b as usize] -= 1;
                    }
                    o.insert(copy.clone());
                } else {
                    // The tracked pattern is already smaller; a brace
                    // speculatively opened above stays empty and will
                    // emit red.
                    return;
                }
            }
        }
        for &b in &copy {
            self.nb_braces[b as usize] += 1;
        }
    }

    // The innermost brace of every node surrounds no other brace, so it
    // cannot emit green this step.
    fn ungreenify_last_brace(&mut self) {
        for braces in self.nodes.values() {
            if let Some(&last) = braces.last() {
                self.is_green[last as usize] = false;
            }
        }
    }

    // Emits the step color, drops the content of green braces and
    // renumbers the remaining braces densely. Red = 2·b for an emptied
    // brace, green = 2·b+1 for a fully-accepting one.
    fn finalize_construction(&mut self) -> Option<u32> {
        let mut red = u32::MAX;
        let mut green = u32::MAX;
        let mut rem_succ_of: Vec<u32> = Vec::new();
        debug_assert_eq!(self.nb_braces.len(), self.is_green.len());
        for i in 0..self.nb_braces.len() {
            if self.nb_braces[i] == 0 {
                self.is_green[i] = false;
                red = red.min(2 * i as u32);
            } else if self.is_green[i] {
                green = green.min(2 * i as u32 + 1);
                rem_succ_of.push(i as u32);
            }
        }

        // Green braces swallow everything nested inside them.
        for braces in self.nodes.values_mut() {
            if let Some(idx) = braces.iter().position(|b| rem_succ_of.contains(b)) {
                for &inner in &braces[idx + 1..] {
                    self.nb_braces[inner as usize] -= 1;
                }
                braces.truncate(idx + 1);
            }
        }

        // Compact the brace numbering.
        let mut decr_by = vec![0u32; self.nb_braces.len()];
        let mut decr = 0u32;
        for i in 0..self.nb_braces.len() {
            self.nb_braces[i - decr as usize] = self.nb_braces[i];
            if self.nb_braces[i] == 0 {
                decr += 1;
            }
            decr_by[i] = decr;
        }
        let new_len = self.nb_braces.len() - decr as usize;
        self.nb_braces.truncate(new_len);
        self.is_green.truncate(new_len);
        for braces in self.nodes.values_mut() {
            for b in braces.iter_mut() {
                *b -= decr_by[*b as usize];
            }
        }

        match red.min(green) {
            u32::MAX => None,
            c => Some(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use crate::scc;

    fn marks(sets: impl IntoIterator<Item = u32>) -> MarkSet {
        MarkSet::from_iter(sets)
    }

    // The nondeterministic Büchi automaton for "infinitely many b":
    // s0 loops on a, loops accepting on b, and may wrongly guess b stops
    // by jumping to the a-only state s1.
    fn inf_b() -> Automaton {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let mut aut = Automaton::new(dict.clone());
        aut.register_ap("a").unwrap();
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_buchi();
        let va = dict.mk_var(a);
        let vb = va.not();
        aut.new_edge(0, 0, va.clone(), MarkSet::EMPTY).unwrap();
        aut.new_edge(0, 0, vb.clone(), marks([0])).unwrap();
        aut.new_edge(0, 1, vb.clone(), MarkSet::EMPTY).unwrap();
        aut.new_edge(1, 1, va.clone(), MarkSet::EMPTY).unwrap();
        aut
    }

    // Follows the unique edge of `aut` at `state` whose label contains
    // `letter`.
    fn step(aut: &Automaton, state: u32, letter: &Bdd) -> (u32, MarkSet) {
        let mut hit = None;
        for e in aut.out(state) {
            if letter.imp(&e.label).is_true() {
                assert!(hit.is_none(), "nondeterministic output");
                hit = Some((e.dst, e.marks));
            }
        }
        hit.expect("deterministic automata are complete on realizable letters")
    }

    #[test_log::test]
    fn small_nondeterministic_buchi() {
        let aut = inf_b();
        let out =
            determinize_with(&aut, DeterminizeOptions { use_scc: false, use_stutter: true })
                .unwrap();

        assert_eq!(out.num_states(), 3);
        assert!(out.is_deterministic().is_true());
        assert!(out.acc().is_parity(false).is_some());
        assert!(!scc::is_empty(&out));

        let dict = out.dict().clone();
        let a = dict.var_of("a").unwrap();
        let va = dict.mk_var(a);
        let vb = va.not();

        // a^ω stays on an unmarked cycle: rejected.
        let (s1, m1) = step(&out, out.init_state(), &va);
        let (s2, m2) = step(&out, s1, &va);
        assert_eq!(s1, s2);
        assert!(!out.acc().accepting(m1 | m2));

        // b^ω reaches a cycle whose smallest recurring color is odd:
        // accepted.
        let (t1, _) = step(&out, out.init_state(), &vb);
        let (t2, n2) = step(&out, t1, &vb);
        let (t3, n3) = step(&out, t2, &vb);
        assert_eq!(t1, t3);
        assert!(out.acc().accepting(n2 | n3));
    }

    #[test]
    fn scc_optimization_gives_equivalent_or_smaller_output() {
        let aut = inf_b();
        let out = determinize(&aut).unwrap();
        assert!(out.num_states() <= 3);
        assert!(out.is_deterministic().is_true());
        assert!(!scc::is_empty(&out));

        let dict = out.dict().clone();
        let va = dict.mk_var(dict.var_of("a").unwrap());
        let vb = va.not();
        let (s1, m1) = step(&out, out.init_state(), &va);
        let (_, m2) = step(&out, s1, &va);
        assert!(!out.acc().accepting(m1 | m2));
        let (t1, _) = step(&out, out.init_state(), &vb);
        let (t2, n2) = step(&out, t1, &vb);
        let (t3, n3) = step(&out, t2, &vb);
        assert_eq!(t1, t3);
        assert!(out.acc().accepting(n2 | n3));
    }

    #[test]
    fn deterministic_input_is_returned_unchanged() {
        let aut = inf_b();
        let once = determinize(&aut).unwrap();
        let twice = determinize(&once).unwrap();
        assert_eq!(once, twice);
        assert!(twice.num_states() <= once.num_states());
    }

    #[test]
    fn generalized_buchi_is_degeneralized_first() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_generalized_buchi(2);
        aut.new_edge(0, 0, dict.mk_true(), marks([0, 1])).unwrap();
        let out = determinize(&aut).unwrap();
        assert!(out.is_deterministic().is_true());
        assert!(out.acc().is_parity(false).is_some());
        assert!(!scc::is_empty(&out));
    }

    #[test]
    fn non_buchi_input_is_rejected() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_co_buchi();
        aut.new_edge(0, 0, dict.mk_true(), marks([0])).unwrap();
        assert!(matches!(determinize(&aut), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn stutter_invariant_flag_changes_nothing_semantically() {
        let mut aut = inf_b();
        aut.prop_stutter_invariant(true);
        let out = determinize(&aut).unwrap();
        assert!(out.is_deterministic().is_true());
        assert!(!scc::is_empty(&out));
        let dict = out.dict().clone();
        let va = dict.mk_var(dict.var_of("a").unwrap());
        let vb = va.not();
        let (t1, _) = step(&out, out.init_state(), &vb);
        let (t2, n2) = step(&out, t1, &vb);
        let (t3, n3) = step(&out, t2, &vb);
        assert_eq!(t1, t3);
        assert!(out.acc().accepting(n2 | n3));
        let (s1, m1) = step(&out, out.init_state(), &va);
        let (_, m2) = step(&out, s1, &va);
        assert!(!out.acc().accepting(m1 | m2));
    }
}
