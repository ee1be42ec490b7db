//! Strongly-connected-component analysis with acceptance bookkeeping.
//!
//! [`SccInfo`] decomposes the reachable part of an automaton, classifies
//! every component as trivial / accepting / rejecting / useful and records
//! the acceptance marks seen inside each component. Components are
//! numbered in reverse topological order: every successor of a component
//! has a strictly smaller number, and the component of the initial state
//! comes last.
//!
//! On alternating automata the decomposition treats every universal
//! destination as an ordinary successor; membership information stays
//! meaningful but the acceptance classification does not.

use bit_set::BitSet;
use indexmap::IndexSet;
use oma_core::{Acceptance, MarkSet};
use tracing::trace;

use crate::automaton::Automaton;
use crate::error::{Error, Result};
use crate::graph::StateId;

/// Data recorded for one strongly connected component.
#[derive(Clone, Debug)]
pub struct SccNode {
    states: Vec<StateId>,
    succ: Vec<u32>,
    marks: MarkSet,
    trivial: bool,
    accepting: bool,
    rejecting: bool,
    useful: bool,
}

impl SccNode {
    /// The states of the component, in the order the decomposition
    /// collected them.
    pub fn states(&self) -> &[StateId] {
        &self.states
    }

    /// Successor components, unique and in discovery order.
    pub fn succ(&self) -> &[u32] {
        &self.succ
    }

    /// Union of the acceptance marks on the component's internal edges.
    pub fn marks(&self) -> MarkSet {
        self.marks
    }

    /// A single state with no self-loop.
    pub fn is_trivial(&self) -> bool {
        self.trivial
    }

    /// Certainly contains an accepting cycle. Both this and
    /// [`Self::is_rejecting`] may be false until
    /// [`SccInfo::determine_unknown_acceptance`] has refined components
    /// that mix `Fin` and `Inf` sets.
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Certainly contains no accepting cycle.
    pub fn is_rejecting(&self) -> bool {
        self.rejecting
    }

    /// Lies on a path to some non-rejecting component.
    pub fn is_useful(&self) -> bool {
        self.useful
    }
}

/// The SCC map of one automaton.
pub struct SccInfo<'a> {
    aut: &'a Automaton,
    sccof: Vec<u32>,
    nodes: Vec<SccNode>,
}

// The DFS stack entry: one state, the id of its next unexplored edge and
// the not-yet-visited destinations of the edge currently being expanded
// (more than one only for universal edges).
struct StackItem {
    src: StateId,
    next_edge: u32,
    batch: Vec<StateId>,
    batch_pos: usize,
    batch_marks: MarkSet,
}

struct Root {
    index: i64,
    /// Marks on the edge that entered this root.
    in_acc: MarkSet,
    /// Union of marks seen inside the (partial) component.
    acc: MarkSet,
    trivial: bool,
    accepting: bool,
}

impl<'a> SccInfo<'a> {
    /// Decomposes the reachable part of `aut`.
    pub fn new(aut: &'a Automaton) -> Self {
        let n = aut.num_states() as usize;
        let mut sccof = vec![u32::MAX; n];
        let mut nodes: Vec<SccNode> = Vec::new();
        if n == 0 {
            return SccInfo { aut, sccof, nodes };
        }

        // h[s]: 0 unvisited, < 0 DFS number of a live state, > 0 one plus
        // the component of a finished state.
        let mut h = vec![0i64; n];
        let mut num: i64 = 0;
        let mut live: Vec<StateId> = Vec::new();
        let mut roots: Vec<Root> = Vec::new();
        let mut todo: Vec<StackItem> = Vec::new();

        let init = aut.init_state();
        num -= 1;
        h[init as usize] = num;
        roots.push(Root {
            index: num,
            in_acc: MarkSet::EMPTY,
            acc: MarkSet::EMPTY,
            trivial: true,
            accepting: false,
        });
        todo.push(StackItem {
            src: init,
            next_edge: aut.graph().first_out(init),
            batch: Vec::new(),
            batch_pos: 0,
            batch_marks: MarkSet::EMPTY,
        });
        live.push(init);

        while let Some(top) = todo.last_mut() {
            // Fetch the next successor of the state on top of the stack.
            let (dest, acc, src) = if top.batch_pos < top.batch.len() {
                let d = top.batch[top.batch_pos];
                top.batch_pos += 1;
                (d, top.batch_marks, top.src)
            } else if top.next_edge != 0 {
                let id = top.next_edge;
                let e = aut.graph().edge(id);
                top.next_edge = aut.graph().next_out(id);
                top.batch = aut.graph().univ_dests(e.dst).collect();
                top.batch_pos = 0;
                top.batch_marks = e.marks;
                continue;
            } else {
                // All successors explored: backtrack, possibly popping a
                // maximal component.
                let curr = top.src;
                todo.pop();
                let root = roots.last().expect("root stack is never empty");
                if root.index != h[curr as usize] {
                    continue;
                }
                let root = roots.pop().unwrap();
                let scc = nodes.len() as u32;
                let pos = live
                    .iter()
                    .rposition(|&s| s == curr)
                    .expect("current state is live");
                let states: Vec<StateId> = live.drain(pos..).collect();
                for &s in &states {
                    sccof[s as usize] = scc;
                    h[s as usize] = scc as i64 + 1;
                }
                let mut succ: IndexSet<u32> = IndexSet::new();
                for &s in &states {
                    for e in aut.out(s) {
                        for d in aut.univ_dests(e.dst) {
                            let ds = sccof[d as usize];
                            debug_assert_ne!(ds, u32::MAX);
                            if ds != scc {
                                succ.insert(ds);
                            }
                        }
                    }
                }
                let accepting = !root.trivial && root.accepting;
                let mut rejecting =
                    root.trivial || !aut.acc().inf_satisfiable(root.acc);
                // A single state whose self-loops all carry the same mark
                // cannot hide an accepting cycle we have not seen already.
                if !accepting && !rejecting && states.len() == 1 {
                    let mut selfacc: Option<MarkSet> = None;
                    rejecting = true;
                    'scan: for e in aut.out(states[0]) {
                        for d in aut.univ_dests(e.dst) {
                            if d == states[0] {
                                match selfacc {
                                    None => selfacc = Some(e.marks),
                                    Some(m) if m != e.marks => {
                                        rejecting = false;
                                        break 'scan;
                                    }
                                    _ => {}
                                }
                            }
                        }
                    }
                }
                nodes.push(SccNode {
                    states,
                    succ: succ.into_iter().collect(),
                    marks: root.acc,
                    trivial: root.trivial,
                    accepting,
                    rejecting,
                    useful: false,
                });
                continue;
            };

            let spi = h[dest as usize];
            if spi == 0 {
                // A fresh state: number it and explore it.
                num -= 1;
                h[dest as usize] = num;
                roots.push(Root {
                    index: num,
                    in_acc: acc,
                    acc: MarkSet::EMPTY,
                    trivial: true,
                    accepting: false,
                });
                todo.push(StackItem {
                    src: dest,
                    next_edge: aut.graph().first_out(dest),
                    batch: Vec::new(),
                    batch_pos: 0,
                    batch_marks: MarkSet::EMPTY,
                });
                live.push(dest);
                continue;
            }
            if spi > 0 {
                // Leads into an already-finished component.
                continue;
            }
            // A live state: merge every root on the path back to it.
            let threshold = spi;
            let mut acc = acc;
            let mut is_accepting = false;
            if dest == src {
                is_accepting = aut.acc().accepting(acc);
            }
            while threshold > roots.last().expect("live root exists").index {
                let r = roots.pop().unwrap();
                acc |= r.acc | r.in_acc;
                is_accepting |= r.accepting;
            }
            let root = roots.last_mut().unwrap();
            root.acc |= acc;
            root.accepting |= is_accepting || aut.acc().accepting(root.acc);
            root.trivial = false;
        }

        let mut info = SccInfo { aut, sccof, nodes };
        info.determine_usefulness();
        trace!(sccs = info.scc_count(), "decomposed automaton");
        info
    }

    pub fn aut(&self) -> &'a Automaton {
        self.aut
    }

    pub fn scc_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    /// The component of `s`, or `None` when `s` is unreachable.
    pub fn scc_of(&self, s: StateId) -> Option<u32> {
        let c = self.sccof[s as usize];
        (c != u32::MAX).then_some(c)
    }

    pub fn reachable_state(&self, s: StateId) -> bool {
        self.sccof[s as usize] != u32::MAX
    }

    pub fn node(&self, scc: u32) -> &SccNode {
        &self.nodes[scc as usize]
    }

    /// Iterates over all components, in reverse topological order.
    pub fn nodes(&self) -> impl Iterator<Item = &SccNode> {
        self.nodes.iter()
    }

    pub fn states_of(&self, scc: u32) -> &[StateId] {
        self.node(scc).states()
    }

    pub fn one_state_of(&self, scc: u32) -> StateId {
        self.node(scc).states[0]
    }

    /// The component of the initial state, always the last one.
    pub fn initial(&self) -> u32 {
        debug_assert_eq!(
            Some(self.scc_count() - 1),
            self.scc_of(self.aut.init_state())
        );
        self.scc_count() - 1
    }

    pub fn succ(&self, scc: u32) -> &[u32] {
        self.node(scc).succ()
    }

    pub fn is_trivial(&self, scc: u32) -> bool {
        self.node(scc).is_trivial()
    }

    pub fn marks_of(&self, scc: u32) -> MarkSet {
        self.node(scc).marks()
    }

    /// The distinct mark combinations on internal edges of `scc`.
    pub fn used_marks_of(&self, scc: u32) -> Vec<MarkSet> {
        let mut seen = IndexSet::new();
        for &s in self.states_of(scc) {
            for e in self.aut.out(s) {
                if self
                    .aut
                    .univ_dests(e.dst)
                    .all(|d| self.sccof[d as usize] == scc)
                {
                    seen.insert(e.marks);
                }
            }
        }
        seen.into_iter().collect()
    }

    pub fn is_accepting_scc(&self, scc: u32) -> bool {
        self.node(scc).is_accepting()
    }

    pub fn is_rejecting_scc(&self, scc: u32) -> bool {
        self.node(scc).is_rejecting()
    }

    pub fn is_useful_scc(&self, scc: u32) -> bool {
        self.node(scc).is_useful()
    }

    pub fn is_useful_state(&self, s: StateId) -> bool {
        self.scc_of(s).is_some_and(|c| self.is_useful_scc(c))
    }

    /// The conjunction of the label supports inside `scc`.
    pub fn scc_ap_support(&self, scc: u32) -> biodivine_lib_bdd::Bdd {
        let dict = self.aut.dict();
        let mut vars: Vec<_> = Vec::new();
        for &s in self.states_of(scc) {
            for e in self.aut.out(s) {
                vars.extend(dict.support(&e.label));
            }
        }
        vars.sort();
        vars.dedup();
        dict.cube(vars)
    }

    /// Settles components for which the mark bookkeeping could not decide
    /// acceptance (possible when the condition mixes `Fin` and `Inf`), by
    /// running an emptiness check on each undecided component.
    pub fn determine_unknown_acceptance(&mut self) -> Result<()> {
        if self.aut.is_alternating() {
            return Err(Error::PreconditionViolation(
                "determine_unknown_acceptance() does not support alternating automata",
            ));
        }
        let mut changed = false;
        for i in 0..self.nodes.len() {
            if self.nodes[i].accepting || self.nodes[i].rejecting {
                continue;
            }
            let mut keep = BitSet::with_capacity(self.aut.num_states() as usize);
            for &s in &self.nodes[i].states {
                keep.insert(s as usize);
            }
            if has_cycle_satisfying(self.aut, Some(&keep), self.aut.acc().code()) {
                self.nodes[i].accepting = true;
            } else {
                self.nodes[i].rejecting = true;
            }
            changed = true;
        }
        if changed {
            self.determine_usefulness();
        }
        Ok(())
    }

    /// Recomputes the useful bit: a component is useful iff it is
    /// non-rejecting or reaches a useful component.
    fn determine_usefulness(&mut self) {
        // Successors have smaller numbers, so one ascending sweep settles
        // everything.
        for i in 0..self.nodes.len() {
            let useful = !self.nodes[i].rejecting
                || self.nodes[i]
                    .succ
                    .iter()
                    .any(|&j| self.nodes[j as usize].useful);
            self.nodes[i].useful = useful;
        }
    }
}

/// Whether the (optionally state-restricted) automaton contains a cycle
/// whose visited marks satisfy `code`.
///
/// The check runs per clause of the disjunctive normal form: a cycle for
/// clause `(F, I)` exists iff, after discarding the edges marked by `F`,
/// some strongly connected subgraph with at least one internal edge visits
/// every set of `I` — within one component, cycles through any chosen
/// edge set can always be combined into one.
pub(crate) fn has_cycle_satisfying(
    aut: &Automaton,
    keep: Option<&BitSet>,
    code: &Acceptance,
) -> bool {
    let dnf = code.to_dnf();
    dnf.dnf_clauses()
        .into_iter()
        .any(|(fin, inf)| clause_has_cycle(aut, keep, fin, inf))
}

/// Emptiness of the automaton: `true` iff no reachable cycle satisfies
/// the acceptance condition. This is the baseline check the refinement
/// passes rely on; dedicated emptiness-check drivers sit on top of the
/// same contract.
pub fn is_empty(aut: &Automaton) -> bool {
    !has_cycle_satisfying(aut, None, aut.acc().code())
}

/// Emptiness of the sub-automaton restricted to the states in `keep`.
pub(crate) fn is_empty_restricted(aut: &Automaton, keep: &BitSet) -> bool {
    !has_cycle_satisfying(aut, Some(keep), aut.acc().code())
}

fn clause_has_cycle(aut: &Automaton, keep: Option<&BitSet>, fin: MarkSet, inf: MarkSet) -> bool {
    let n = aut.num_states() as usize;
    let kept = |s: StateId| keep.is_none_or(|k| k.contains(s as usize));

    // Adjacency of the Fin-filtered subgraph, universal members flattened.
    let mut succs: Vec<Vec<StateId>> = vec![Vec::new(); n];
    let mut edges: Vec<(StateId, StateId, MarkSet)> = Vec::new();
    for (_, e) in aut.edges() {
        if !kept(e.src) || !(e.marks & fin).is_empty() {
            continue;
        }
        for d in aut.univ_dests(e.dst) {
            if kept(d) {
                succs[e.src as usize].push(d);
                edges.push((e.src, d, e.marks));
            }
        }
    }

    // Iterative Tarjan over the filtered subgraph.
    let mut index = vec![0u32; n];
    let mut low = vec![0u32; n];
    let mut comp = vec![u32::MAX; n];
    let mut on_stack = BitSet::with_capacity(n);
    let mut stack: Vec<StateId> = Vec::new();
    let mut next = 1u32;
    let mut ncomp = 0u32;
    let mut frames: Vec<(StateId, usize)> = Vec::new();

    for root in 0..n as u32 {
        if !kept(root) || index[root as usize] != 0 {
            continue;
        }
        index[root as usize] = next;
        low[root as usize] = next;
        next += 1;
        stack.push(root);
        on_stack.insert(root as usize);
        frames.push((root, 0));
        while let Some(frame) = frames.last_mut() {
            let (v, i) = *frame;
            if i < succs[v as usize].len() {
                frame.1 += 1;
                let w = succs[v as usize][i];
                if index[w as usize] == 0 {
                    index[w as usize] = next;
                    low[w as usize] = next;
                    next += 1;
                    stack.push(w);
                    on_stack.insert(w as usize);
                    frames.push((w, 0));
                } else if on_stack.contains(w as usize) {
                    low[v as usize] = low[v as usize].min(index[w as usize]);
                }
                continue;
            }
            frames.pop();
            if let Some(parent) = frames.last() {
                let p = parent.0 as usize;
                low[p] = low[p].min(low[v as usize]);
            }
            if low[v as usize] == index[v as usize] {
                loop {
                    let w = stack.pop().expect("component member");
                    on_stack.remove(w as usize);
                    comp[w as usize] = ncomp;
                    if w == v {
                        break;
                    }
                }
                ncomp += 1;
            }
        }
    }

    // Union the marks of internal edges per component.
    let mut marks = vec![MarkSet::EMPTY; ncomp as usize];
    let mut has_edge = vec![false; ncomp as usize];
    for (src, dst, m) in edges {
        let c = comp[src as usize];
        if c == comp[dst as usize] {
            marks[c as usize] |= m;
            has_edge[c as usize] = true;
        }
    }
    (0..ncomp as usize).any(|c| has_edge[c] && inf.subset_of(marks[c]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Dictionary;
    use oma_core::parse_acceptance;

    fn marks(sets: impl IntoIterator<Item = u32>) -> MarkSet {
        MarkSet::from_iter(sets)
    }

    // The three-state chain of the classification scenario: a trivial
    // component, an accepting loop and a rejecting loop.
    fn chain() -> Automaton {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(3);
        aut.set_init_state(0).unwrap();
        aut.set_buchi();
        aut.new_edge(0, 1, dict.mk_true(), marks([0])).unwrap();
        aut.new_edge(1, 1, dict.mk_true(), marks([0])).unwrap();
        aut.new_edge(1, 2, dict.mk_true(), MarkSet::EMPTY).unwrap();
        aut.new_edge(2, 2, dict.mk_true(), MarkSet::EMPTY).unwrap();
        aut
    }

    #[test_log::test]
    fn classification_and_usefulness() {
        let aut = chain();
        let si = SccInfo::new(&aut);
        assert_eq!(si.scc_count(), 3);

        let c0 = si.scc_of(0).unwrap();
        let c1 = si.scc_of(1).unwrap();
        let c2 = si.scc_of(2).unwrap();
        // Reverse topological numbering.
        assert_eq!(c0, si.initial());
        assert!(c0 > c1 && c1 > c2);

        assert!(si.is_trivial(c0));
        assert!(si.is_rejecting_scc(c0));
        assert!(si.is_accepting_scc(c1));
        assert!(si.is_rejecting_scc(c2));
        assert_eq!(si.marks_of(c1), marks([0]));

        // {s2} is rejecting with no useful successor.
        assert!(si.is_useful_scc(c0));
        assert!(si.is_useful_scc(c1));
        assert!(!si.is_useful_scc(c2));
        assert!(si.is_useful_state(0) && !si.is_useful_state(2));
    }

    #[test]
    fn partition_covers_reachable_states() {
        let aut = chain();
        let si = SccInfo::new(&aut);
        let mut seen = vec![0u32; aut.num_states() as usize];
        for scc in 0..si.scc_count() {
            for &s in si.states_of(scc) {
                seen[s as usize] += 1;
            }
        }
        assert!(seen.iter().all(|&c| c == 1));
        // Edges respect the topological order.
        for (_, e) in aut.edges() {
            let cs = si.scc_of(e.src).unwrap();
            for d in aut.univ_dests(e.dst) {
                let cd = si.scc_of(d).unwrap();
                assert!(cs == cd || cs > cd);
            }
        }
    }

    #[test]
    fn unreachable_states_have_no_component() {
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.new_edge(0, 0, dict.mk_true(), MarkSet::EMPTY).unwrap();
        aut.new_edge(1, 0, dict.mk_true(), MarkSet::EMPTY).unwrap();
        let si = SccInfo::new(&aut);
        assert_eq!(si.scc_count(), 1);
        assert!(si.scc_of(1).is_none());
        assert!(!si.reachable_state(1));
    }

    #[test]
    fn fin_mix_needs_refinement() {
        // The component {1,2} sees marks {0} (on a self-loop found first)
        // and {1}; its mark union {0,1} does not satisfy Fin(0)&Inf(1),
        // yet the inner cycle 1→2→1 does. Only the refinement notices.
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(3);
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(2, parse_acceptance("Fin(0) & Inf(1)").unwrap())
            .unwrap();
        aut.new_edge(0, 1, dict.mk_true(), MarkSet::EMPTY).unwrap();
        aut.new_edge(1, 1, dict.mk_true(), marks([0])).unwrap();
        aut.new_edge(1, 2, dict.mk_true(), marks([1])).unwrap();
        aut.new_edge(2, 1, dict.mk_true(), MarkSet::EMPTY).unwrap();

        let mut si = SccInfo::new(&aut);
        let c = si.scc_of(1).unwrap();
        assert!(!si.is_accepting_scc(c) && !si.is_rejecting_scc(c));
        si.determine_unknown_acceptance().unwrap();
        assert!(si.is_accepting_scc(c));

        // The dual automaton where every cycle must visit the Fin set.
        let mut aut = Automaton::new(dict.clone());
        aut.new_states(2);
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(2, parse_acceptance("Fin(0) & Inf(1)").unwrap())
            .unwrap();
        aut.new_edge(0, 1, dict.mk_true(), marks([0])).unwrap();
        aut.new_edge(1, 0, dict.mk_true(), marks([1])).unwrap();
        let mut si = SccInfo::new(&aut);
        let c = si.scc_of(0).unwrap();
        assert!(!si.is_accepting_scc(c) && !si.is_rejecting_scc(c));
        si.determine_unknown_acceptance().unwrap();
        assert!(si.is_rejecting_scc(c));
    }

    #[test]
    fn single_state_refinement() {
        // One state with two self-loops carrying the same marks under a
        // mixed condition: certainly rejecting without an emptiness check.
        let dict = Dictionary::new();
        let mut aut = Automaton::new(dict.clone());
        aut.new_state();
        aut.set_init_state(0).unwrap();
        aut.set_acceptance(2, parse_acceptance("Fin(0) & Inf(1)").unwrap())
            .unwrap();
        aut.new_edge(0, 0, dict.mk_true(), marks([0, 1])).unwrap();
        aut.new_edge(0, 0, dict.mk_true(), marks([0, 1])).unwrap();
        let si = SccInfo::new(&aut);
        assert!(si.is_rejecting_scc(0));
    }

    #[test]
    fn emptiness_on_restrictions() {
        let aut = chain();
        // Restricted to the rejecting tail, the automaton is empty.
        let mut keep = BitSet::new();
        keep.insert(2);
        assert!(is_empty_restricted(&aut, &keep));
        let mut keep = BitSet::new();
        keep.insert(1);
        assert!(!is_empty_restricted(&aut, &keep));
        assert!(!is_empty(&aut));
    }
}
