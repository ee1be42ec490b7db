//! The automaton object: a [`Graph`] together with its acceptance
//! condition, the atomic propositions it registered, an initial state,
//! three-valued property flags and a typed named-property registry.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use biodivine_lib_bdd::{Bdd, BddVariable};
use oma_core::{Acceptance, Condition, MarkSet, Trivalent};
use tracing::trace;

use crate::dict::Dictionary;
use crate::error::{Error, Result};
use crate::graph::{Edge, EdgeId, Graph, Out, StateId, UnivDests, is_univ_dest};

/// The three-valued property flags of an automaton.
///
/// Setting one flag may propagate to others: terminal implies weak implies
/// inherently weak, not inherently weak implies neither weak nor terminal,
/// deterministic implies unambiguous and not unambiguous implies not
/// deterministic.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PropertyFlags {
    pub state_based_acc: Trivalent,
    pub inherently_weak: Trivalent,
    pub weak: Trivalent,
    pub terminal: Trivalent,
    pub deterministic: Trivalent,
    pub unambiguous: Trivalent,
    pub stutter_invariant: Trivalent,
}

/// Selects which property groups [`Automaton::prop_copy`] transfers; the
/// groups left out are reset to unknown.
#[derive(Clone, Copy, Debug)]
pub struct PropSelection {
    pub state_based: bool,
    pub inherently_weak: bool,
    pub deterministic: bool,
    pub stutter_inv: bool,
}

impl PropSelection {
    /// Copy every property; only for algorithms that do not modify the
    /// automaton at all.
    pub fn all() -> Self {
        PropSelection {
            state_based: true,
            inherently_weak: true,
            deterministic: true,
            stutter_inv: true,
        }
    }

    pub fn none() -> Self {
        PropSelection {
            state_based: false,
            inherently_weak: false,
            deterministic: false,
            stutter_inv: false,
        }
    }
}

/// A transition-based ω-automaton with symbolic edge labels.
pub struct Automaton {
    graph: Graph,
    dict: Rc<Dictionary>,
    acc: Condition,
    init: StateId,
    aps: Vec<String>,
    props: PropertyFlags,
    named: HashMap<String, Box<dyn Any>>,
}

impl Automaton {
    /// Creates an empty automaton over the given dictionary, with `t`
    /// acceptance and no states.
    pub fn new(dict: Rc<Dictionary>) -> Self {
        Automaton {
            graph: Graph::new(),
            dict,
            acc: Condition::default(),
            init: 0,
            aps: Vec::new(),
            props: PropertyFlags::default(),
            named: HashMap::new(),
        }
    }

    /// Copies graph, acceptance, propositions and the selected property
    /// groups of `other`. Named properties are not copied.
    pub fn copy_of(other: &Automaton, selection: PropSelection) -> Self {
        let mut res = Automaton {
            graph: other.graph.clone(),
            dict: other.dict.clone(),
            acc: other.acc.clone(),
            init: other.init,
            aps: other.aps.clone(),
            props: PropertyFlags::default(),
            named: HashMap::new(),
        };
        res.prop_copy(other, selection);
        res
    }

    pub fn dict(&self) -> &Rc<Dictionary> {
        &self.dict
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub(crate) fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    // ----- atomic propositions -------------------------------------------

    /// Registers a proposition for this automaton (and in the shared
    /// dictionary) and returns its variable. Idempotent per name.
    pub fn register_ap(&mut self, name: &str) -> Result<BddVariable> {
        let var = self.dict.register_ap(name)?;
        if !self.aps.iter().any(|a| a == name) {
            self.aps.push(name.to_string());
        }
        Ok(var)
    }

    /// The propositions registered by this automaton, in registration order.
    pub fn ap(&self) -> &[String] {
        &self.aps
    }

    /// Registers every proposition of `other`.
    pub fn copy_ap_of(&mut self, other: &Automaton) {
        for name in other.aps.clone() {
            let _ = self.register_ap(&name);
        }
    }

    /// The conjunction of all registered proposition variables.
    pub fn ap_cube(&self) -> Bdd {
        self.dict
            .cube(self.aps.iter().filter_map(|n| self.dict.var_of(n)))
    }

    /// Drops registered propositions that no edge label depends on.
    pub fn remove_unused_ap(&mut self) {
        if self.aps.is_empty() {
            return;
        }
        let mut used: HashSet<BddVariable> = HashSet::new();
        for (_, e) in self.graph.edges() {
            used.extend(e.label.support_set());
        }
        let dict = self.dict.clone();
        self.aps
            .retain(|name| dict.var_of(name).is_some_and(|v| used.contains(&v)));
    }

    // ----- acceptance -----------------------------------------------------

    pub fn acc(&self) -> &Condition {
        &self.acc
    }

    pub fn num_sets(&self) -> u32 {
        self.acc.num_sets()
    }

    /// Sets the number of acceptance sets and the formula atomically.
    ///
    /// Zero sets implies state-based acceptance, so that flag is raised.
    pub fn set_acceptance(&mut self, num: u32, code: Acceptance) -> Result<()> {
        self.acc = Condition::new(num, code)?;
        if num == 0 {
            self.prop_state_based_acc(Trivalent::Yes);
        }
        Ok(())
    }

    /// Declares Büchi acceptance and returns the accepting mark `{0}`.
    pub fn set_buchi(&mut self) -> MarkSet {
        self.acc = Condition::buchi();
        MarkSet::singleton(0)
    }

    /// Declares co-Büchi acceptance and returns the rejecting mark `{0}`.
    pub fn set_co_buchi(&mut self) -> MarkSet {
        self.acc = Condition::co_buchi();
        MarkSet::singleton(0)
    }

    /// Declares generalized Büchi acceptance over `n` sets.
    pub fn set_generalized_buchi(&mut self, n: u32) {
        self.acc = Condition::generalized_buchi(n);
        if n == 0 {
            self.prop_state_based_acc(Trivalent::Yes);
        }
    }

    /// Copies the acceptance condition of `other`.
    pub fn copy_acceptance_of(&mut self, other: &Automaton) {
        self.acc = other.acc.clone();
        if self.acc.num_sets() == 0 {
            self.prop_state_based_acc(Trivalent::Yes);
        }
    }

    // ----- states and edges ----------------------------------------------

    pub fn num_states(&self) -> u32 {
        self.graph.num_states()
    }

    pub fn num_edges(&self) -> u32 {
        self.graph.num_edges()
    }

    pub fn new_state(&mut self) -> StateId {
        self.graph.new_state()
    }

    pub fn new_states(&mut self, n: u32) -> StateId {
        self.graph.new_states(n)
    }

    /// The designated initial state.
    pub fn init_state(&self) -> StateId {
        self.init
    }

    /// Fails with [`Error::InvalidInput`] when `s` does not exist.
    pub fn set_init_state(&mut self, s: StateId) -> Result<()> {
        if s >= self.graph.num_states() {
            return Err(Error::InvalidInput(format!(
                "set_init_state({s}) called with nonexisting state"
            )));
        }
        self.init = s;
        Ok(())
    }

    pub fn new_edge(&mut self, src: StateId, dst: StateId, label: Bdd, marks: MarkSet) -> Result<EdgeId> {
        let n = self.graph.num_states();
        if src >= n {
            return Err(Error::OutOfRange { index: src, limit: n });
        }
        if !is_univ_dest(dst) && dst >= n {
            return Err(Error::OutOfRange { index: dst, limit: n });
        }
        Ok(self.graph.new_edge(src, dst, label, marks))
    }

    /// Adds an edge marked with all acceptance sets (when `accepting`) or
    /// none.
    pub fn new_acc_edge(&mut self, src: StateId, dst: StateId, label: Bdd, accepting: bool) -> Result<EdgeId> {
        let marks = if accepting { self.acc.all_sets() } else { MarkSet::EMPTY };
        self.new_edge(src, dst, label, marks)
    }

    /// Adds an edge reaching all of `dsts` simultaneously; a single
    /// destination degenerates to an ordinary edge.
    pub fn new_univ_edge(&mut self, src: StateId, dsts: &[StateId], label: Bdd, marks: MarkSet) -> Result<EdgeId> {
        let n = self.graph.num_states();
        if src >= n {
            return Err(Error::OutOfRange { index: src, limit: n });
        }
        if dsts.is_empty() {
            return Err(Error::InvalidInput(
                "universal edges need at least one destination".into(),
            ));
        }
        if let Some(&bad) = dsts.iter().find(|&&d| d >= n) {
            return Err(Error::OutOfRange { index: bad, limit: n });
        }
        Ok(self.graph.new_univ_edge(src, dsts, label, marks))
    }

    pub fn out(&self, src: StateId) -> Out<'_> {
        self.graph.out(src)
    }

    pub fn edges(&self) -> impl Iterator<Item = (EdgeId, &Edge)> {
        self.graph.edges()
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        self.graph.edge(id)
    }

    pub fn univ_dests(&self, dst: u32) -> UnivDests<'_> {
        self.graph.univ_dests(dst)
    }

    /// Whether some edge has a universal destination.
    pub fn is_alternating(&self) -> bool {
        self.graph.is_alternating()
    }

    /// Whether the automaton has only existential branching.
    pub fn is_existential(&self) -> bool {
        !self.is_alternating()
    }

    // ----- state-based acceptance accessors ------------------------------

    /// The acceptance sets of state `s` under state-based acceptance: the
    /// marks of its first edge (all edges of `s` are marked alike).
    pub fn state_acc_sets(&self, s: StateId) -> Result<MarkSet> {
        if !self.props.state_based_acc.is_true() {
            return Err(Error::PreconditionViolation(
                "state_acc_sets() requires state-based acceptance",
            ));
        }
        Ok(self.out(s).next().map(|e| e.marks).unwrap_or(MarkSet::EMPTY))
    }

    /// Whether state `s` is accepting under state-based acceptance.
    pub fn state_is_accepting(&self, s: StateId) -> Result<bool> {
        if !self.props.state_based_acc.is_true() {
            return Err(Error::PreconditionViolation(
                "state_is_accepting() requires state-based acceptance",
            ));
        }
        Ok(self
            .out(s)
            .next()
            .is_some_and(|e| self.acc.accepting(e.marks)))
    }

    // ----- property flags -------------------------------------------------

    pub fn prop_state_based_acc(&mut self, v: impl Into<Trivalent>) {
        self.props.state_based_acc = v.into();
    }

    pub fn is_state_based_acc(&self) -> Trivalent {
        self.props.state_based_acc
    }

    /// An SBA is a state-based automaton with plain Büchi acceptance.
    pub fn is_sba(&self) -> Trivalent {
        self.props.state_based_acc & Trivalent::from(self.acc.is_buchi())
    }

    pub fn prop_inherently_weak(&mut self, v: impl Into<Trivalent>) {
        let v = v.into();
        self.props.inherently_weak = v;
        if v.is_false() {
            self.props.terminal = Trivalent::No;
            self.props.weak = Trivalent::No;
        }
    }

    pub fn is_inherently_weak(&self) -> Trivalent {
        self.props.inherently_weak
    }

    pub fn prop_terminal(&mut self, v: impl Into<Trivalent>) {
        let v = v.into();
        self.props.terminal = v;
        if v.is_true() {
            self.props.weak = Trivalent::Yes;
            self.props.inherently_weak = Trivalent::Yes;
        }
    }

    pub fn is_terminal(&self) -> Trivalent {
        self.props.terminal
    }

    pub fn prop_weak(&mut self, v: impl Into<Trivalent>) {
        let v = v.into();
        self.props.weak = v;
        if v.is_true() {
            self.props.inherently_weak = Trivalent::Yes;
        }
        if v.is_false() {
            self.props.terminal = Trivalent::No;
        }
    }

    pub fn is_weak(&self) -> Trivalent {
        self.props.weak
    }

    pub fn prop_deterministic(&mut self, v: impl Into<Trivalent>) {
        let v = v.into();
        self.props.deterministic = v;
        if v.is_true() {
            self.props.unambiguous = Trivalent::Yes;
        }
    }

    pub fn is_deterministic(&self) -> Trivalent {
        self.props.deterministic
    }

    pub fn prop_unambiguous(&mut self, v: impl Into<Trivalent>) {
        let v = v.into();
        self.props.unambiguous = v;
        if v.is_false() {
            self.props.deterministic = Trivalent::No;
        }
    }

    pub fn is_unambiguous(&self) -> Trivalent {
        self.props.unambiguous
    }

    pub fn prop_stutter_invariant(&mut self, v: impl Into<Trivalent>) {
        self.props.stutter_invariant = v.into();
    }

    pub fn is_stutter_invariant(&self) -> Trivalent {
        self.props.stutter_invariant
    }

    /// Copies the selected property groups from `other` and resets the
    /// rest to unknown.
    pub fn prop_copy(&mut self, other: &Automaton, p: PropSelection) {
        self.props = PropertyFlags::default();
        if p.state_based {
            self.props.state_based_acc = other.props.state_based_acc;
        }
        if p.inherently_weak {
            self.props.terminal = other.props.terminal;
            self.props.weak = other.props.weak;
            self.props.inherently_weak = other.props.inherently_weak;
        }
        if p.deterministic {
            self.props.deterministic = other.props.deterministic;
            self.props.unambiguous = other.props.unambiguous;
        }
        if p.stutter_inv {
            self.props.stutter_invariant = other.props.stutter_invariant;
        }
    }

    /// Keeps the selected property groups and resets the rest to unknown.
    pub fn prop_keep(&mut self, p: PropSelection) {
        if !p.state_based {
            self.props.state_based_acc = Trivalent::Maybe;
        }
        if !p.inherently_weak {
            self.props.terminal = Trivalent::Maybe;
            self.props.weak = Trivalent::Maybe;
            self.props.inherently_weak = Trivalent::Maybe;
        }
        if !p.deterministic {
            self.props.deterministic = Trivalent::Maybe;
            self.props.unambiguous = Trivalent::Maybe;
        }
        if !p.stutter_inv {
            self.props.stutter_invariant = Trivalent::Maybe;
        }
    }

    // ----- named properties ----------------------------------------------

    /// Attaches an arbitrary typed value under `key`, replacing (and
    /// dropping) any previous value.
    pub fn set_named_prop<T: Any>(&mut self, key: &str, value: T) {
        self.named.insert(key.to_string(), Box::new(value));
    }

    /// The value stored under `key`, if it has the requested type.
    pub fn get_named_prop<T: Any>(&self, key: &str) -> Option<&T> {
        self.named.get(key)?.downcast_ref()
    }

    pub fn get_named_prop_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.named.get_mut(key)?.downcast_mut()
    }

    /// Removes (and drops) the value stored under `key`.
    pub fn unset_named_prop(&mut self, key: &str) {
        self.named.remove(key);
    }

    /// Drops every named property.
    pub fn release_named_properties(&mut self) {
        self.named.clear();
    }

    // ----- mutation passes ------------------------------------------------

    /// Merges mergeable edges.
    ///
    /// Edges with equal source, destination and marks are collapsed into
    /// one edge whose label is the disjunction. When the acceptance uses
    /// no `Fin` set, edges with equal source, destination and label are
    /// additionally collapsed by uniting their marks; with `Fin` present
    /// that union could change which cycles accept, so the pass is skipped.
    pub fn merge_edges(&mut self) {
        self.unset_named_prop("highlight-edges");
        self.graph.remove_dead_edges();
        self.graph.sort_edges_by(|a, b| {
            a.src
                .cmp(&b.src)
                .then(a.dst.cmp(&b.dst))
                .then(a.marks.cmp(&b.marks))
        });

        {
            let edges = self.graph.raw_edges_mut();
            let mut out = 0usize;
            for i in 1..edges.len() {
                if out > 0
                    && edges[i].src == edges[out].src
                    && edges[i].dst == edges[out].dst
                    && edges[i].marks == edges[out].marks
                {
                    edges[out].label = edges[out].label.or(&edges[i].label);
                } else {
                    out += 1;
                    edges.swap(out, i);
                }
            }
            edges.truncate(out + 1);
        }

        if !self.acc.uses_fin_acceptance() {
            let edges = self.graph.raw_edges_mut();
            let mut kept: Vec<Edge> = Vec::with_capacity(edges.len());
            kept.push(edges[0].clone());
            let mut run: Option<(u32, u32)> = None;
            let mut seen: HashMap<Bdd, usize> = HashMap::new();
            for e in edges.drain(1..) {
                let key = (e.src, e.dst);
                if run != Some(key) {
                    run = Some(key);
                    seen.clear();
                }
                match seen.entry(e.label.clone()) {
                    std::collections::hash_map::Entry::Occupied(o) => {
                        kept[*o.get()].marks |= e.marks;
                    }
                    std::collections::hash_map::Entry::Vacant(v) => {
                        v.insert(kept.len());
                        kept.push(e);
                    }
                }
            }
            *edges = kept;
        }

        self.graph.chain_edges();
        trace!(edges = self.graph.num_edges(), "merged edges");
    }

    /// Removes states unreachable from the initial state; surviving states
    /// are renumbered densely in BFS discovery order.
    pub fn purge_unreachable_states(&mut self) {
        let n = self.graph.num_states();
        if n == 0 {
            return;
        }
        let mut newst: Vec<Option<StateId>> = vec![None; n as usize];
        let mut queue = VecDeque::new();
        let mut next = 0u32;
        newst[self.init as usize] = Some(next);
        next += 1;
        queue.push_back(self.init);
        while let Some(s) = queue.pop_front() {
            for e in self.graph.out(s) {
                for d in self.graph.univ_dests(e.dst) {
                    if newst[d as usize].is_none() {
                        newst[d as usize] = Some(next);
                        next += 1;
                        queue.push_back(d);
                    }
                }
            }
        }
        if next == n {
            // Everything is reachable, but only in BFS order by luck; a
            // renumbering is still needed when ids moved.
            if newst
                .iter()
                .enumerate()
                .all(|(s, d)| *d == Some(s as u32))
            {
                return;
            }
        }
        self.init = newst[self.init as usize].expect("initial state survives");
        self.defrag_states(&newst, next);
        trace!(states = self.graph.num_states(), "purged unreachable states");
    }

    /// Removes dead states: states with no path to any non-trivial cycle.
    /// The initial state is always kept.
    pub fn purge_dead_states(&mut self) {
        let n = self.graph.num_states();
        if n == 0 {
            return;
        }
        let mut useful = vec![false; n as usize];
        let mut order: Vec<StateId> = Vec::with_capacity(n as usize);

        // Depth-first post-order of the reachable part.
        let mut todo: Vec<(StateId, EdgeId)> = Vec::new();
        useful[self.init as usize] = true;
        todo.push((self.init, self.graph.first_out(self.init)));
        while let Some(top) = todo.last_mut() {
            let (src, tid) = *top;
            if tid == 0 {
                todo.pop();
                order.push(src);
                continue;
            }
            top.1 = self.graph.next_out(tid);
            let dst = self.graph.edge(tid).dst;
            let members: Vec<StateId> = self.graph.univ_dests(dst).collect();
            for d in members {
                if !useful[d as usize] {
                    useful[d as usize] = true;
                    todo.push((d, self.graph.first_out(d)));
                }
            }
        }

        // In post-order, kill edges into useless states; a state whose
        // edges all die is itself useless.
        let dead_label = self.dict.mk_false();
        for &s in &order {
            let mut useless = true;
            for id in self.graph.out_ids(s).collect::<Vec<_>>() {
                let dst = self.graph.edge(id).dst;
                let alive = self
                    .graph
                    .univ_dests(dst)
                    .all(|d| useful[d as usize]);
                if alive {
                    useless = false;
                } else {
                    self.graph.edge_mut(id).label = dead_label.clone();
                }
            }
            if useless {
                useful[s as usize] = false;
            }
        }
        useful[self.init as usize] = true;

        let mut newst: Vec<Option<StateId>> = vec![None; n as usize];
        let mut next = 0u32;
        for s in 0..n {
            if useful[s as usize] {
                newst[s as usize] = Some(next);
                next += 1;
            }
        }
        if next == n {
            return;
        }
        self.init = newst[self.init as usize].expect("initial state is kept");
        self.defrag_states(&newst, next);
        trace!(states = self.graph.num_states(), "purged dead states");
    }

    /// The renumbering primitive underneath the purge passes: applies the
    /// permutation to the graph and to the conventional per-state named
    /// properties (`"state-names"`, `"highlight-states"`).
    pub fn defrag_states(&mut self, newst: &[Option<StateId>], used: u32) {
        if let Some(names) = self.get_named_prop_mut::<Vec<String>>("state-names") {
            let mut renamed = vec![String::new(); used as usize];
            for (s, name) in names.drain(..).enumerate() {
                if let Some(Some(d)) = newst.get(s) {
                    renamed[*d as usize] = name;
                }
            }
            *names = renamed;
        }
        if let Some(hl) = self.get_named_prop_mut::<HashMap<StateId, u32>>("highlight-states") {
            let moved: HashMap<StateId, u32> = hl
                .drain()
                .filter_map(|(s, color)| newst[s as usize].map(|d| (d, color)))
                .collect();
            *hl = moved;
        }
        self.graph.defrag_states(newst, used);
    }
}

impl PartialEq for Automaton {
    /// Structural equality of the materialized graphs: same states, same
    /// live edges in the same order, same acceptance and initial state.
    fn eq(&self, other: &Self) -> bool {
        self.graph.num_states() == other.graph.num_states()
            && self.init == other.init
            && self.acc == other.acc
            && self
                .graph
                .edges()
                .map(|(_, e)| (e.src, e.dst, &e.label, e.marks))
                .eq(other
                    .graph
                    .edges()
                    .map(|(_, e)| (e.src, e.dst, &e.label, e.marks)))
    }
}

impl std::fmt::Debug for Automaton {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Automaton: {} states, {} edges, init {}, acceptance {}",
            self.num_states(),
            self.num_edges(),
            self.init,
            self.acc,
        )?;
        for (_, e) in self.edges() {
            writeln!(f, "  {} -> {} {}", e.src, self.graph.format_dest(e.dst), e.marks)?;
        }
        Ok(())
    }
}
