//! Recognition of named acceptance classes (Büchi, Rabin, Streett, parity)
//! and extraction of Rabin-/Streett-like pairs.

use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet};

use super::{Acceptance, Condition};
use crate::marks::MarkSet;

/// One Rabin-or-Streett pair of acceptance sets.
///
/// Read as `Fin(fin) & Inf(inf)` in a Rabin-like disjunction and as
/// `Fin(fin) | Inf(inf)` in a Streett-like conjunction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RsPair {
    pub fin: MarkSet,
    pub inf: MarkSet,
}

impl RsPair {
    pub fn new(fin: MarkSet, inf: MarkSet) -> Self {
        RsPair { fin, inf }
    }
}

impl Condition {
    /// `Inf(0)` over exactly one set.
    pub fn is_buchi(&self) -> bool {
        self.num == 1 && self.is_generalized_buchi()
    }

    /// `Fin(0)` over exactly one set.
    pub fn is_co_buchi(&self) -> bool {
        self.num == 1 && self.is_generalized_co_buchi()
    }

    /// `Inf(0)&…&Inf(n-1)` over all `n` declared sets (with `t` over zero
    /// sets as the degenerate case).
    pub fn is_generalized_buchi(&self) -> bool {
        match &self.code {
            Acceptance::Top => self.num == 0,
            Acceptance::Inf(m) => *m == self.all_sets(),
            _ => false,
        }
    }

    /// `Fin(0)|…|Fin(n-1)` over all declared sets.
    pub fn is_generalized_co_buchi(&self) -> bool {
        match &self.code {
            Acceptance::Fin(m) => self.num > 0 && *m == self.all_sets(),
            _ => false,
        }
    }

    /// Returns the number of pairs if the condition is exactly the
    /// canonical Rabin condition over all declared sets.
    pub fn is_rabin(&self) -> Option<u32> {
        if self.num % 2 != 0 {
            return None;
        }
        let n = self.num / 2;
        (self.code == *Condition::rabin(n).code()).then_some(n)
    }

    /// Returns the number of pairs if the condition is exactly the
    /// canonical Streett condition over all declared sets.
    pub fn is_streett(&self) -> Option<u32> {
        if self.num % 2 != 0 {
            return None;
        }
        let n = self.num / 2;
        (self.code == *Condition::streett(n).code()).then_some(n)
    }

    /// Recognizes the canonical generalized-Rabin layout and returns the
    /// number of Inf sets of each pair.
    pub fn is_generalized_rabin(&self) -> Option<Vec<u32>> {
        let pairs = self.is_rabin_like()?;
        let mut counts = Vec::new();
        let mut next = 0u32;
        for pair in pairs {
            if pair.inf.is_empty() {
                // A pure-Fin clause stands for a run of zero-Inf pairs.
                for f in pair.fin.sets() {
                    if f != next {
                        return None;
                    }
                    next += 1;
                    counts.push(0);
                }
                continue;
            }
            if pair.fin != MarkSet::singleton(next) {
                return None;
            }
            next += 1;
            let mut count = 0;
            for i in pair.inf.sets() {
                if i != next {
                    return None;
                }
                next += 1;
                count += 1;
            }
            counts.push(count);
        }
        (next == self.num).then_some(counts)
    }

    /// Decomposes a Rabin-like condition (a disjunction of
    /// `Fin(F)&Inf(I)` clauses) into its pairs.
    ///
    /// `f` is not Rabin-like (a disjunction has no false clause), `t` is
    /// Rabin-like with zero pairs only when no set is declared.
    pub fn is_rabin_like(&self) -> Option<Vec<RsPair>> {
        fn clause(c: &Acceptance) -> Option<RsPair> {
            match c {
                Acceptance::Fin(m) => Some(RsPair::new(*m, MarkSet::EMPTY)),
                Acceptance::Inf(m) => Some(RsPair::new(MarkSet::EMPTY, *m)),
                Acceptance::And(cs) => {
                    let mut fin = None;
                    let mut inf = MarkSet::EMPTY;
                    for c in cs {
                        match c {
                            Acceptance::Fin(m) if fin.is_none() => fin = Some(*m),
                            // Two Fin conjuncts cannot form one pair.
                            Acceptance::Fin(_) => return None,
                            Acceptance::Inf(m) => inf = *m,
                            _ => return None,
                        }
                    }
                    Some(RsPair::new(fin.unwrap_or(MarkSet::EMPTY), inf))
                }
                _ => None,
            }
        }
        match &self.code {
            Acceptance::Top => (self.num == 0).then_some(vec![]),
            Acceptance::Bottom => None,
            Acceptance::Or(cs) => cs.iter().map(clause).collect(),
            other => clause(other).map(|p| vec![p]),
        }
    }

    /// Decomposes a Streett-like condition (a conjunction of
    /// `Fin(F)|Inf(I)` clauses) into its pairs.
    pub fn is_streett_like(&self) -> Option<Vec<RsPair>> {
        fn clause(c: &Acceptance) -> Option<RsPair> {
            match c {
                Acceptance::Fin(m) => Some(RsPair::new(*m, MarkSet::EMPTY)),
                Acceptance::Inf(m) => Some(RsPair::new(MarkSet::EMPTY, *m)),
                Acceptance::Or(cs) => {
                    let mut inf = None;
                    let mut fin = MarkSet::EMPTY;
                    for c in cs {
                        match c {
                            Acceptance::Inf(m) if inf.is_none() => inf = Some(*m),
                            Acceptance::Inf(_) => return None,
                            Acceptance::Fin(m) => fin = *m,
                            _ => return None,
                        }
                    }
                    Some(RsPair::new(fin, inf.unwrap_or(MarkSet::EMPTY)))
                }
                _ => None,
            }
        }
        match &self.code {
            Acceptance::Top => Some(vec![]),
            Acceptance::Bottom => None,
            Acceptance::And(cs) => cs.iter().map(clause).collect(),
            other => clause(other).map(|p| vec![p]),
        }
    }

    /// Recognizes parity acceptance; returns `(max, odd)` on success.
    ///
    /// With `equiv` unset only the canonical layout is accepted; with
    /// `equiv` set, any condition logically equivalent to some parity
    /// condition over the declared sets qualifies.
    pub fn is_parity(&self, equiv: bool) -> Option<(bool, bool)> {
        for max in [false, true] {
            for odd in [false, true] {
                if self.code == *Condition::parity(max, odd, self.num).code() {
                    return Some((max, odd));
                }
            }
        }
        if !equiv {
            return None;
        }
        let ctx = BddVariableSet::new_anonymous(self.num as u16);
        let mine = full_bdd(&ctx, &self.code);
        for max in [false, true] {
            for odd in [false, true] {
                let candidate = full_bdd(&ctx, Condition::parity(max, odd, self.num).code());
                if mine == candidate {
                    return Some((max, odd));
                }
            }
        }
        None
    }
}

// Evaluate a formula into a BDD with set i mapped to variable i, so that
// two conditions over the same universe can be compared for equivalence.
fn full_bdd(ctx: &BddVariableSet, code: &Acceptance) -> Bdd {
    let var = |s: u32| ctx.mk_var(BddVariable::from_index(s as usize));
    match code {
        Acceptance::Top => ctx.mk_true(),
        Acceptance::Bottom => ctx.mk_false(),
        Acceptance::Inf(m) => m.sets().fold(ctx.mk_true(), |acc, s| acc.and(&var(s))),
        Acceptance::Fin(m) => m.sets().fold(ctx.mk_false(), |acc, s| acc.or(&var(s).not())),
        Acceptance::And(cs) => cs
            .iter()
            .fold(ctx.mk_true(), |acc, c| acc.and(&full_bdd(ctx, c))),
        Acceptance::Or(cs) => cs
            .iter()
            .fold(ctx.mk_false(), |acc, c| acc.or(&full_bdd(ctx, c))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acceptance::parse_acceptance;

    fn cond(num: u32, s: &str) -> Condition {
        Condition::new(num, parse_acceptance(s).unwrap()).unwrap()
    }

    #[test]
    fn buchi_family() {
        assert!(Condition::buchi().is_buchi());
        assert!(!Condition::buchi().is_co_buchi());
        assert!(Condition::generalized_buchi(3).is_generalized_buchi());
        assert!(Condition::generalized_buchi(0).is_generalized_buchi());
        assert!(!cond(2, "Inf(0)").is_generalized_buchi());
        assert!(Condition::co_buchi().is_co_buchi());
        assert!(Condition::generalized_co_buchi(2).is_generalized_co_buchi());
    }

    #[test]
    fn rabin_streett_exact() {
        assert_eq!(Condition::rabin(2).is_rabin(), Some(2));
        assert_eq!(Condition::rabin(2).is_streett(), None);
        assert_eq!(Condition::streett(1).is_streett(), Some(1));
        // Rabin 1 and Streett 1 coincide only in their pair shape, not
        // their formula.
        assert_eq!(cond(2, "Fin(0) & Inf(1)").is_rabin(), Some(1));
        assert_eq!(cond(2, "Fin(0) | Inf(1)").is_streett(), Some(1));
    }

    #[test]
    fn pair_extraction() {
        let pairs = cond(4, "(Fin(0)&Inf(1)) | (Fin(2)&Inf(3))")
            .is_rabin_like()
            .unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0], RsPair::new(MarkSet::singleton(0), MarkSet::singleton(1)));

        let pairs = cond(3, "(Fin(0)|Inf(1)) & Inf(2)").is_streett_like().unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], RsPair::new(MarkSet::EMPTY, MarkSet::singleton(2)));

        // A bare Fin clause is a pair without Inf.
        let pairs = cond(2, "Fin(0) & Fin(1)").is_streett_like().unwrap();
        assert_eq!(pairs.len(), 2);
        assert!(cond(2, "Inf(0) | Inf(1)").is_streett_like().is_none());
    }

    #[test]
    fn generalized_rabin_counts() {
        let c = Condition::generalized_rabin([2, 1, 0]);
        assert_eq!(c.is_generalized_rabin(), Some(vec![2, 1, 0]));
        assert!(cond(2, "Fin(1) & Inf(0)").is_generalized_rabin().is_none());
    }

    #[test]
    fn parity_recognition() {
        let c = Condition::parity(false, true, 3);
        assert_eq!(c.is_parity(false), Some((false, true)));
        // Rabin 1 is equivalent to min-odd parity over two sets.
        let r = cond(2, "Fin(0) & Inf(1)");
        assert_eq!(r.is_parity(false), Some((false, true)));
        // Inf(0)&Inf(1) is no parity condition at all.
        assert_eq!(Condition::generalized_buchi(2).is_parity(true), None);
        // Büchi is min-even parity with one priority.
        assert_eq!(Condition::buchi().is_parity(false), Some((false, false)));
    }
}
