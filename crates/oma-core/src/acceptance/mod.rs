//! The acceptance-condition algebra.
//!
//! An acceptance condition is a positive boolean combination of `Fin(M)` and
//! `Inf(M)` primitives evaluated against the set of marks a cycle visits:
//! `Inf(M)` holds iff every mark of `M` is visited, `Fin(M)` holds iff some
//! mark of `M` is avoided. [`Acceptance`] is the formula tree, [`Condition`]
//! pairs a formula with the number of declared acceptance sets.

use std::fmt::Display;

use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet};
use thiserror::Error;

use crate::marks::{MAX_SETS, MarkSet};

mod parse;
mod predicates;

pub use parse::{ParseError, parse_acceptance};
pub use predicates::RsPair;

/// Errors raised by the acceptance algebra.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccError {
    /// A mark index exceeds the declared number of acceptance sets.
    #[error("acceptance set {index} is out of range (only {num_sets} sets declared)")]
    OutOfRange { index: u32, num_sets: u32 },
    /// The number of acceptance sets would exceed the supported maximum.
    #[error("too many acceptance sets used ({requested} > {})", MAX_SETS)]
    CapacityExceeded { requested: u32 },
    /// An operation requiring Fin-free acceptance was called with Fin present.
    #[error("operation is not supported with Fin acceptance: {0}")]
    FinAcceptance(&'static str),
}

/// A tree-shaped acceptance formula.
///
/// Constructors canonicalize: `Inf(∅)` is [`Acceptance::Top`], `Fin(∅)` is
/// [`Acceptance::Bottom`], conjunction and disjunction flatten their own
/// operator, neighbouring `Inf` terms merge under `&` and neighbouring
/// `Fin` terms merge under `|` (the merged atom is kept last). Structural
/// equality therefore identifies formulas up to these rules.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Acceptance {
    /// The always-true condition, `t`.
    Top,
    /// The always-false condition, `f`.
    Bottom,
    /// All marks of the (non-empty) set are visited infinitely often.
    Inf(MarkSet),
    /// Some mark of the (non-empty) set is visited only finitely often.
    Fin(MarkSet),
    /// Conjunction of at least two sub-conditions, none of which is a
    /// constant or a conjunction, with at most one `Inf` atom (kept last).
    And(Vec<Acceptance>),
    /// Disjunction, dual to [`Acceptance::And`] with `Fin` in place of `Inf`.
    Or(Vec<Acceptance>),
}

impl Acceptance {
    /// The condition `t` satisfied by every cycle.
    pub const fn t() -> Self {
        Acceptance::Top
    }

    /// The condition `f` satisfied by no cycle.
    pub const fn f() -> Self {
        Acceptance::Bottom
    }

    /// Builds `Inf(m)`; `Inf(∅)` collapses to `t`.
    pub fn inf(m: MarkSet) -> Self {
        if m.is_empty() { Acceptance::Top } else { Acceptance::Inf(m) }
    }

    /// Builds `Fin(m)`; `Fin(∅)` collapses to `f`.
    pub fn fin(m: MarkSet) -> Self {
        if m.is_empty() { Acceptance::Bottom } else { Acceptance::Fin(m) }
    }

    /// Conjunction, with constant short-circuits and `Inf` merging.
    pub fn and(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Acceptance::Bottom, _) | (_, Acceptance::Bottom) => Acceptance::Bottom,
            (Acceptance::Top, x) | (x, Acceptance::Top) => x,
            (lhs, rhs) => {
                let mut children = Vec::new();
                let mut inf = MarkSet::EMPTY;
                for side in [lhs, rhs] {
                    match side {
                        Acceptance::And(cs) => {
                            for c in cs {
                                match c {
                                    Acceptance::Inf(m) => inf |= m,
                                    other => children.push(other),
                                }
                            }
                        }
                        Acceptance::Inf(m) => inf |= m,
                        other => children.push(other),
                    }
                }
                if !inf.is_empty() {
                    children.push(Acceptance::Inf(inf));
                }
                if children.len() == 1 {
                    children.pop().unwrap()
                } else {
                    Acceptance::And(children)
                }
            }
        }
    }

    /// Disjunction, with constant short-circuits and `Fin` merging.
    pub fn or(self, rhs: Self) -> Self {
        match (self, rhs) {
            (Acceptance::Top, _) | (_, Acceptance::Top) => Acceptance::Top,
            (Acceptance::Bottom, x) | (x, Acceptance::Bottom) => x,
            (lhs, rhs) => {
                let mut children = Vec::new();
                let mut fin = MarkSet::EMPTY;
                for side in [lhs, rhs] {
                    match side {
                        Acceptance::Or(cs) => {
                            for c in cs {
                                match c {
                                    Acceptance::Fin(m) => fin |= m,
                                    other => children.push(other),
                                }
                            }
                        }
                        Acceptance::Fin(m) => fin |= m,
                        other => children.push(other),
                    }
                }
                if !fin.is_empty() {
                    children.push(Acceptance::Fin(fin));
                }
                if children.len() == 1 {
                    children.pop().unwrap()
                } else {
                    Acceptance::Or(children)
                }
            }
        }
    }

    /// Returns `true` iff the formula is the constant `t`.
    pub fn is_t(&self) -> bool {
        matches!(self, Acceptance::Top)
    }

    /// Returns `true` iff the formula is the constant `f`.
    pub fn is_f(&self) -> bool {
        matches!(self, Acceptance::Bottom)
    }

    /// Evaluates the formula against the marks `v` visited by a cycle.
    pub fn accepting(&self, v: MarkSet) -> bool {
        match self {
            Acceptance::Top => true,
            Acceptance::Bottom => false,
            Acceptance::Inf(m) => m.subset_of(v),
            Acceptance::Fin(m) => !m.subset_of(v),
            Acceptance::And(cs) => cs.iter().all(|c| c.accepting(v)),
            Acceptance::Or(cs) => cs.iter().any(|c| c.accepting(v)),
        }
    }

    /// Evaluates with every `Fin` replaced by `t`.
    ///
    /// This is the test used to decide whether a set of marks seen in an
    /// SCC could possibly support an accepting cycle.
    pub fn inf_satisfiable(&self, v: MarkSet) -> bool {
        match self {
            Acceptance::Top | Acceptance::Fin(_) => true,
            Acceptance::Bottom => false,
            Acceptance::Inf(m) => m.subset_of(v),
            Acceptance::And(cs) => cs.iter().all(|c| c.inf_satisfiable(v)),
            Acceptance::Or(cs) => cs.iter().any(|c| c.inf_satisfiable(v)),
        }
    }

    /// The union of all mark sets referenced by the formula.
    pub fn used_sets(&self) -> MarkSet {
        match self {
            Acceptance::Top | Acceptance::Bottom => MarkSet::EMPTY,
            Acceptance::Inf(m) | Acceptance::Fin(m) => *m,
            Acceptance::And(cs) | Acceptance::Or(cs) => {
                cs.iter().fold(MarkSet::EMPTY, |acc, c| acc | c.used_sets())
            }
        }
    }

    /// The marks used under `Inf` and under `Fin`, separately.
    pub fn used_inf_fin_sets(&self) -> (MarkSet, MarkSet) {
        match self {
            Acceptance::Top | Acceptance::Bottom => (MarkSet::EMPTY, MarkSet::EMPTY),
            Acceptance::Inf(m) => (*m, MarkSet::EMPTY),
            Acceptance::Fin(m) => (MarkSet::EMPTY, *m),
            Acceptance::And(cs) | Acceptance::Or(cs) => {
                cs.iter().fold((MarkSet::EMPTY, MarkSet::EMPTY), |(i, f), c| {
                    let (ci, cf) = c.used_inf_fin_sets();
                    (i | ci, f | cf)
                })
            }
        }
    }

    /// Returns `true` iff some `Fin` primitive occurs in the formula.
    pub fn uses_fin(&self) -> bool {
        match self {
            Acceptance::Top | Acceptance::Inf(_) => false,
            // `f` counts as Fin-free: it is Fin(∅), which no algorithm needs
            // to eliminate.
            Acceptance::Bottom => false,
            Acceptance::Fin(_) => true,
            Acceptance::And(cs) | Acceptance::Or(cs) => cs.iter().any(Acceptance::uses_fin),
        }
    }

    /// Structural De Morgan complement: swaps `Fin`/`Inf` and `&`/`|`.
    pub fn complement(&self) -> Self {
        match self {
            Acceptance::Top => Acceptance::Bottom,
            Acceptance::Bottom => Acceptance::Top,
            Acceptance::Inf(m) => Acceptance::fin(*m),
            Acceptance::Fin(m) => Acceptance::inf(*m),
            Acceptance::And(cs) => cs
                .iter()
                .map(Acceptance::complement)
                .fold(Acceptance::Top, Acceptance::and),
            Acceptance::Or(cs) => cs
                .iter()
                .map(Acceptance::complement)
                .fold(Acceptance::Bottom, Acceptance::or),
        }
    }

    /// Removes the acceptance sets in `rem` and renumbers the remaining
    /// sets downward.
    ///
    /// With `missing` set, the removed sets are treated as absent from the
    /// automaton: `Inf` atoms intersecting `rem` become `f` and `Fin`
    /// atoms become `t`. Otherwise an atom simply loses the removed marks
    /// (so `Inf(rem)` becomes `t` and `Fin(rem)` becomes `f`).
    pub fn strip(&self, rem: MarkSet, missing: bool) -> Self {
        match self {
            Acceptance::Top => Acceptance::Top,
            Acceptance::Bottom => Acceptance::Bottom,
            Acceptance::Inf(m) => {
                if missing && !(*m & rem).is_empty() {
                    Acceptance::Bottom
                } else {
                    Acceptance::inf(m.strip(rem))
                }
            }
            Acceptance::Fin(m) => {
                if missing && !(*m & rem).is_empty() {
                    Acceptance::Top
                } else {
                    Acceptance::fin(m.strip(rem))
                }
            }
            Acceptance::And(cs) => cs
                .iter()
                .map(|c| c.strip(rem, missing))
                .fold(Acceptance::Top, Acceptance::and),
            Acceptance::Or(cs) => cs
                .iter()
                .map(|c| c.strip(rem, missing))
                .fold(Acceptance::Bottom, Acceptance::or),
        }
    }

    /// Renumbers every mark upward by `n` (for stacking two conditions
    /// side by side, as the product construction does).
    pub fn shift(&self, n: u32) -> Self {
        match self {
            Acceptance::Top => Acceptance::Top,
            Acceptance::Bottom => Acceptance::Bottom,
            Acceptance::Inf(m) => Acceptance::inf(*m << n),
            Acceptance::Fin(m) => Acceptance::fin(*m << n),
            Acceptance::And(cs) => cs
                .iter()
                .map(|c| c.shift(n))
                .fold(Acceptance::Top, Acceptance::and),
            Acceptance::Or(cs) => cs
                .iter()
                .map(|c| c.shift(n))
                .fold(Acceptance::Bottom, Acceptance::or),
        }
    }

    /// Recognizes formulas already in disjunctive normal form: a disjunction
    /// of conjunctions of `Fin` singletons and one `Inf` term.
    pub fn is_dnf(&self) -> bool {
        fn clause(c: &Acceptance) -> bool {
            match c {
                Acceptance::Inf(_) | Acceptance::Fin(_) => true,
                Acceptance::And(cs) => cs.iter().all(|c| match c {
                    Acceptance::Inf(_) => true,
                    Acceptance::Fin(m) => m.count() == 1,
                    _ => false,
                }),
                _ => false,
            }
        }
        match self {
            Acceptance::Top | Acceptance::Bottom => true,
            Acceptance::Or(cs) => cs.iter().all(clause),
            other => clause(other),
        }
    }

    /// Recognizes conjunctive normal form, the dual of [`Self::is_dnf`].
    pub fn is_cnf(&self) -> bool {
        fn clause(c: &Acceptance) -> bool {
            match c {
                Acceptance::Inf(_) | Acceptance::Fin(_) => true,
                Acceptance::Or(cs) => cs.iter().all(|c| match c {
                    Acceptance::Fin(_) => true,
                    Acceptance::Inf(m) => m.count() == 1,
                    _ => false,
                }),
                _ => false,
            }
        }
        match self {
            Acceptance::Top | Acceptance::Bottom => true,
            Acceptance::And(cs) => cs.iter().all(clause),
            other => clause(other),
        }
    }

    /// Normalizes to disjunctive normal form.
    ///
    /// One BDD variable is allocated per used acceptance set (in a private
    /// variable pool, unrelated to edge-label variables); the formula is
    /// evaluated into a BDD with `Inf(s)` read as the variable of `s` and
    /// `Fin(s)` as its negation, and the prime implicants are read back as
    /// clauses.
    pub fn to_dnf(&self) -> Self {
        if self.is_atomic() {
            return self.clone();
        }
        let env = BddEnv::new(self.used_sets());
        let res = env.to_bdd(self);
        if res.is_true() {
            return Acceptance::Top;
        }
        if res.is_false() {
            return Acceptance::Bottom;
        }
        let mut out = Acceptance::Bottom;
        for cube in res.to_optimized_dnf() {
            let (pos, neg) = env.split_cube(&cube);
            let mut clause = Acceptance::Top;
            for s in neg.sets() {
                clause = clause.and(Acceptance::fin(MarkSet::singleton(s)));
            }
            clause = clause.and(Acceptance::inf(pos));
            out = out.or(clause);
        }
        out
    }

    /// Normalizes to conjunctive normal form, by running the implicant
    /// enumeration of [`Self::to_dnf`] on the complement.
    pub fn to_cnf(&self) -> Self {
        if self.is_atomic() {
            return self.clone();
        }
        let env = BddEnv::new(self.used_sets());
        let res = env.to_bdd(self);
        if res.is_true() {
            return Acceptance::Top;
        }
        if res.is_false() {
            return Acceptance::Bottom;
        }
        let mut out = Acceptance::Top;
        for cube in res.not().to_optimized_dnf() {
            let (pos, neg) = env.split_cube(&cube);
            let mut clause = Acceptance::Bottom;
            for s in neg.sets() {
                clause = clause.or(Acceptance::inf(MarkSet::singleton(s)));
            }
            clause = clause.or(Acceptance::fin(pos));
            out = out.and(clause);
        }
        out
    }

    /// Returns a mark set for which the formula evaluates to false, or
    /// `None` if no such set exists (the formula is a tautology over its
    /// used sets).
    pub fn unsat_mark(&self) -> Option<MarkSet> {
        if self.is_t() {
            return None;
        }
        if self.is_f() {
            return Some(MarkSet::EMPTY);
        }
        let env = BddEnv::new(self.used_sets());
        let res = env.to_bdd(self);
        if res.is_true() {
            return None;
        }
        let witness = res.not().sat_witness().expect("negation is satisfiable");
        let mut m = MarkSet::EMPTY;
        for (slot, set) in env.sets.iter().enumerate() {
            if witness.value(BddVariable::from_index(slot)) {
                m.set(*set);
            }
        }
        Some(m)
    }

    /// Enumerates the minimal ways of extending the visited marks `v` so
    /// that the formula reaches the requested verdict.
    ///
    /// Each returned clause is a signed list of set indices: a value `s ≥ 0`
    /// means set `s` must additionally be visited, a value `x < 0` means
    /// set `-x-1` must be avoided.
    pub fn missing(&self, v: MarkSet, accepting: bool) -> Vec<Vec<i32>> {
        match self {
            Acceptance::Top => {
                return if accepting { vec![vec![]] } else { vec![] };
            }
            Acceptance::Bottom => {
                return if accepting { vec![] } else { vec![vec![]] };
            }
            _ => {}
        }
        let env = BddEnv::new(self.used_sets());
        let mut res = env.to_bdd(self);
        let known: Vec<(BddVariable, bool)> = env
            .sets
            .iter()
            .enumerate()
            .filter(|(_, set)| v.has(**set))
            .map(|(slot, _)| (BddVariable::from_index(slot), true))
            .collect();
        res = res.restrict(&known);
        if !accepting {
            res = res.not();
        }
        if res.is_false() {
            return vec![];
        }
        if res.is_true() {
            return vec![vec![]];
        }
        let mut out = Vec::new();
        for cube in res.to_optimized_dnf() {
            let (pos, neg) = env.split_cube(&cube);
            let mut clause = Vec::new();
            for s in pos.sets() {
                clause.push(s as i32);
            }
            for s in neg.sets() {
                clause.push(-(s as i32) - 1);
            }
            out.push(clause);
        }
        out
    }

    /// Splits a formula in disjunctive normal form into `(fin, inf)`
    /// clauses, where a clause accepts the cycles that avoid every set of
    /// `fin` and visit every set of `inf`.
    ///
    /// A bare `Fin` disjunct stands for a disjunction of sets and yields
    /// one clause per member. `t` yields the single unconstrained clause,
    /// `f` yields none. Callers normalize with [`Self::to_dnf`] first.
    pub fn dnf_clauses(&self) -> Vec<(MarkSet, MarkSet)> {
        fn clause(c: &Acceptance, out: &mut Vec<(MarkSet, MarkSet)>) {
            match c {
                Acceptance::Fin(m) => {
                    for s in m.sets() {
                        out.push((MarkSet::singleton(s), MarkSet::EMPTY));
                    }
                }
                Acceptance::Inf(m) => out.push((MarkSet::EMPTY, *m)),
                Acceptance::And(cs) => {
                    let mut fin = MarkSet::EMPTY;
                    let mut inf = MarkSet::EMPTY;
                    for c in cs {
                        match c {
                            Acceptance::Fin(m) => fin |= *m,
                            Acceptance::Inf(m) => inf |= *m,
                            _ => debug_assert!(false, "dnf_clauses needs DNF input"),
                        }
                    }
                    out.push((fin, inf));
                }
                _ => debug_assert!(false, "dnf_clauses needs DNF input"),
            }
        }
        let mut out = Vec::new();
        match self {
            Acceptance::Top => out.push((MarkSet::EMPTY, MarkSet::EMPTY)),
            Acceptance::Bottom => {}
            Acceptance::Or(cs) => {
                for c in cs {
                    clause(c, &mut out);
                }
            }
            other => clause(other, &mut out),
        }
        out
    }

    // A constant or a single atom; such formulas are their own normal form.
    fn is_atomic(&self) -> bool {
        matches!(
            self,
            Acceptance::Top | Acceptance::Bottom | Acceptance::Inf(_) | Acceptance::Fin(_)
        )
    }
}

/// The throwaway BDD pool backing normal-form computations: one variable
/// per used acceptance set, in ascending set order.
struct BddEnv {
    ctx: BddVariableSet,
    /// Slot index → acceptance-set index.
    sets: Vec<u32>,
    /// Acceptance-set index → slot, dense up to the highest used set.
    slot_of: Vec<Option<u16>>,
}

impl BddEnv {
    fn new(used: MarkSet) -> Self {
        let ctx = BddVariableSet::new_anonymous(used.count() as u16);
        let mut sets = Vec::with_capacity(used.count() as usize);
        let mut slot_of = vec![None; used.max_set() as usize];
        for (slot, set) in used.sets().enumerate() {
            sets.push(set);
            slot_of[set as usize] = Some(slot as u16);
        }
        BddEnv { ctx, sets, slot_of }
    }

    fn var(&self, set: u32) -> Bdd {
        let slot = self.slot_of[set as usize].expect("set is used");
        self.ctx.mk_var(BddVariable::from_index(slot as usize))
    }

    fn to_bdd(&self, code: &Acceptance) -> Bdd {
        match code {
            Acceptance::Top => self.ctx.mk_true(),
            Acceptance::Bottom => self.ctx.mk_false(),
            Acceptance::Inf(m) => m
                .sets()
                .fold(self.ctx.mk_true(), |acc, s| acc.and(&self.var(s))),
            Acceptance::Fin(m) => m
                .sets()
                .fold(self.ctx.mk_false(), |acc, s| acc.or(&self.var(s).not())),
            Acceptance::And(cs) => cs
                .iter()
                .fold(self.ctx.mk_true(), |acc, c| acc.and(&self.to_bdd(c))),
            Acceptance::Or(cs) => cs
                .iter()
                .fold(self.ctx.mk_false(), |acc, c| acc.or(&self.to_bdd(c))),
        }
    }

    /// Splits a partial valuation into the sets of positively and
    /// negatively assigned acceptance sets.
    fn split_cube(
        &self,
        cube: &biodivine_lib_bdd::BddPartialValuation,
    ) -> (MarkSet, MarkSet) {
        let mut pos = MarkSet::EMPTY;
        let mut neg = MarkSet::EMPTY;
        let mut values = cube.to_values();
        values.sort_by_key(|(var, _)| var.to_index());
        for (var, value) in values {
            let set = self.sets[var.to_index()];
            if value {
                pos.set(set);
            } else {
                neg.set(set);
            }
        }
        (pos, neg)
    }
}

/// A formula together with the number of declared acceptance sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Condition {
    num: u32,
    code: Acceptance,
    uses_fin: bool,
}

impl Default for Condition {
    /// The `t` condition over zero sets.
    fn default() -> Self {
        Condition { num: 0, code: Acceptance::Top, uses_fin: false }
    }
}

impl Condition {
    /// Creates a condition with `num` declared sets.
    ///
    /// Fails with [`AccError::OutOfRange`] if the formula references a set
    /// that is not declared, and with [`AccError::CapacityExceeded`] if
    /// `num` exceeds [`MAX_SETS`].
    pub fn new(num: u32, code: Acceptance) -> Result<Self, AccError> {
        if num as usize > MAX_SETS {
            return Err(AccError::CapacityExceeded { requested: num });
        }
        let max = code.used_sets().max_set();
        if max > num {
            return Err(AccError::OutOfRange { index: max - 1, num_sets: num });
        }
        let uses_fin = code.uses_fin();
        Ok(Condition { num, code, uses_fin })
    }

    /// Creates a condition whose universe is exactly the sets the formula
    /// references.
    pub fn from_code(code: Acceptance) -> Self {
        let num = code.used_sets().max_set();
        let uses_fin = code.uses_fin();
        Condition { num, code, uses_fin }
    }

    /// Büchi acceptance, `Inf(0)` over one set.
    pub fn buchi() -> Self {
        Condition::generalized_buchi(1)
    }

    /// Co-Büchi acceptance, `Fin(0)` over one set.
    pub fn co_buchi() -> Self {
        Condition::generalized_co_buchi(1)
    }

    /// Generalized Büchi acceptance over `n` sets, `Inf(0)&…&Inf(n-1)`.
    pub fn generalized_buchi(n: u32) -> Self {
        let all = MarkSet::all_below(n);
        Condition { num: n, code: Acceptance::inf(all), uses_fin: false }
    }

    /// Generalized co-Büchi acceptance over `n` sets, `Fin(0)|…|Fin(n-1)`.
    pub fn generalized_co_buchi(n: u32) -> Self {
        let all = MarkSet::all_below(n);
        let code = Acceptance::fin(all);
        let uses_fin = code.uses_fin();
        Condition { num: n, code, uses_fin }
    }

    /// Rabin acceptance with `n` pairs: `⋁ᵢ Fin(2i)&Inf(2i+1)`.
    pub fn rabin(n: u32) -> Self {
        let mut code = Acceptance::Bottom;
        for i in (0..n).rev() {
            let pair = Acceptance::fin(MarkSet::singleton(2 * i))
                .and(Acceptance::inf(MarkSet::singleton(2 * i + 1)));
            code = pair.or(code);
        }
        Condition { num: 2 * n, uses_fin: code.uses_fin(), code }
    }

    /// Streett acceptance with `n` pairs: `⋀ᵢ Fin(2i)|Inf(2i+1)`.
    pub fn streett(n: u32) -> Self {
        let mut code = Acceptance::Top;
        for i in (0..n).rev() {
            let pair = Acceptance::fin(MarkSet::singleton(2 * i))
                .or(Acceptance::inf(MarkSet::singleton(2 * i + 1)));
            code = pair.and(code);
        }
        Condition { num: 2 * n, uses_fin: code.uses_fin(), code }
    }

    /// Generalized Rabin acceptance; `inf_counts[i]` is the number of Inf
    /// sets paired with the `i`-th Fin set.
    pub fn generalized_rabin<I: IntoIterator<Item = u32>>(inf_counts: I) -> Self {
        let mut code = Acceptance::Bottom;
        let mut next = 0u32;
        for count in inf_counts {
            let fin = Acceptance::fin(MarkSet::singleton(next));
            next += 1;
            let mut infs = MarkSet::EMPTY;
            for _ in 0..count {
                infs.set(next);
                next += 1;
            }
            code = code.or(fin.and(Acceptance::inf(infs)));
        }
        Condition { num: next, uses_fin: code.uses_fin(), code }
    }

    /// The canonical parity condition over `n` priorities.
    ///
    /// `max` selects the max- rather than min-variant, `odd` makes odd
    /// priorities accepting.
    pub fn parity(max: bool, odd: bool, n: u32) -> Self {
        fn accepting(prio: u32, odd: bool) -> bool {
            (prio % 2 == 1) == odd
        }
        let code = if n == 0 {
            // With no priority at all, "min even"/"max odd" hold vacuously.
            if max == odd { Acceptance::Top } else { Acceptance::Bottom }
        } else {
            // Build inside out: the innermost term is the last priority
            // considered (n-1 for min, 0 for max).
            let order: Vec<u32> =
                if max { (0..n).collect() } else { (0..n).rev().collect() };
            let mut code = if accepting(order[0], odd) {
                Acceptance::inf(MarkSet::singleton(order[0]))
            } else {
                Acceptance::fin(MarkSet::singleton(order[0]))
            };
            for &p in &order[1..] {
                let atom = MarkSet::singleton(p);
                code = if accepting(p, odd) {
                    Acceptance::inf(atom).or(code)
                } else {
                    Acceptance::fin(atom).and(code)
                };
            }
            code
        };
        Condition { num: n, uses_fin: code.uses_fin(), code }
    }

    /// The number of declared acceptance sets.
    pub fn num_sets(&self) -> u32 {
        self.num
    }

    /// The acceptance formula.
    pub fn code(&self) -> &Acceptance {
        &self.code
    }

    /// Replaces the formula, keeping the declared universe.
    pub fn set_code(&mut self, code: Acceptance) -> Result<(), AccError> {
        let max = code.used_sets().max_set();
        if max > self.num {
            return Err(AccError::OutOfRange { index: max - 1, num_sets: self.num });
        }
        self.uses_fin = code.uses_fin();
        self.code = code;
        Ok(())
    }

    /// Declares `n` more acceptance sets and returns the index of the first.
    pub fn add_sets(&mut self, n: u32) -> Result<u32, AccError> {
        let first = self.num;
        let requested = self.num + n;
        if requested as usize > MAX_SETS {
            return Err(AccError::CapacityExceeded { requested });
        }
        self.num = requested;
        Ok(first)
    }

    /// The singleton mark for set `u`.
    pub fn mark(&self, u: u32) -> Result<MarkSet, AccError> {
        if u >= self.num {
            return Err(AccError::OutOfRange { index: u, num_sets: self.num });
        }
        Ok(MarkSet::singleton(u))
    }

    /// All declared sets as one mark set.
    pub fn all_sets(&self) -> MarkSet {
        MarkSet::all_below(self.num)
    }

    /// The complement of `m` within the declared universe.
    pub fn comp(&self, m: MarkSet) -> MarkSet {
        self.all_sets() ^ (m & self.all_sets())
    }

    /// Whether the formula uses Fin acceptance (cached).
    pub fn uses_fin_acceptance(&self) -> bool {
        self.uses_fin
    }

    /// Evaluates the formula against the visited marks `v`.
    pub fn accepting(&self, v: MarkSet) -> bool {
        self.code.accepting(v)
    }

    /// See [`Acceptance::inf_satisfiable`].
    pub fn inf_satisfiable(&self, v: MarkSet) -> bool {
        self.code.inf_satisfiable(v)
    }

    /// For Fin-free acceptance, the marks that witness acceptance of `v`
    /// (empty if `v` is not accepting).
    pub fn accepting_sets(&self, v: MarkSet) -> Result<MarkSet, AccError> {
        if self.uses_fin {
            return Err(AccError::FinAcceptance("accepting_sets"));
        }
        fn eval(code: &Acceptance, v: MarkSet) -> Option<MarkSet> {
            match code {
                Acceptance::Top => Some(MarkSet::EMPTY),
                Acceptance::Bottom => None,
                Acceptance::Inf(m) => m.subset_of(v).then_some(*m),
                Acceptance::Fin(_) => unreachable!("checked Fin-free"),
                Acceptance::And(cs) => {
                    let mut acc = MarkSet::EMPTY;
                    for c in cs {
                        acc |= eval(c, v)?;
                    }
                    Some(acc)
                }
                Acceptance::Or(cs) => cs.iter().find_map(|c| eval(c, v)),
            }
        }
        Ok(eval(&self.code, v).unwrap_or(MarkSet::EMPTY))
    }

    /// See [`Acceptance::unsat_mark`].
    pub fn unsat_mark(&self) -> Option<MarkSet> {
        self.code.unsat_mark()
    }

    /// `t` over zero sets.
    pub fn is_all(&self) -> bool {
        self.num == 0 && self.code.is_t()
    }

    /// `f` over zero sets.
    pub fn is_none(&self) -> bool {
        self.num == 0 && self.code.is_f()
    }
}

impl Display for Condition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.num, self.code)
    }
}
