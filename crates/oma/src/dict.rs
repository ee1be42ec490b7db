//! The shared atomic-proposition dictionary.
//!
//! Every automaton of a family that is to be combined (product, language
//! comparisons) must use one [`Dictionary`], shared through an
//! [`Rc`]. The dictionary owns a fixed-capacity pool of BDD variables and
//! the bijection between proposition names and variables; edge labels are
//! plain [`Bdd`] values over that pool, whose canonical representation
//! makes structural equality coincide with semantic equality.
//!
//! Registration mutates the dictionary through interior mutability and is
//! not re-entrant; concurrent read-only use is only sound while nothing
//! registers (the engine is single-threaded, see the crate docs).

use std::cell::RefCell;
use std::rc::Rc;

use bimap::BiMap;
use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet};

use crate::error::{Error, Result};

/// Default number of BDD variables a dictionary can hand out.
pub const DEFAULT_CAPACITY: u16 = 64;

/// A shared pool of named BDD variables for edge labels.
pub struct Dictionary {
    ctx: BddVariableSet,
    inner: RefCell<Registry>,
}

#[derive(Default)]
struct Registry {
    names: BiMap<String, u16>,
    next: u16,
}

impl Dictionary {
    /// Creates a dictionary with the default variable capacity.
    pub fn new() -> Rc<Self> {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a dictionary able to hand out `capacity` variables.
    pub fn with_capacity(capacity: u16) -> Rc<Self> {
        Rc::new(Dictionary {
            ctx: BddVariableSet::new_anonymous(capacity),
            inner: RefCell::new(Registry::default()),
        })
    }

    /// The total number of variables this dictionary can hand out.
    pub fn capacity(&self) -> u16 {
        self.ctx.num_vars()
    }

    /// The number of propositions registered so far.
    pub fn num_registered(&self) -> u16 {
        self.inner.borrow().next
    }

    /// Registers a proposition name and returns its variable; registering
    /// an already-known name returns the existing variable.
    pub fn register_ap(&self, name: &str) -> Result<BddVariable> {
        let mut reg = self.inner.borrow_mut();
        if let Some(&idx) = reg.names.get_by_left(name) {
            return Ok(BddVariable::from_index(idx as usize));
        }
        if reg.next >= self.capacity() {
            return Err(Error::CapacityExceeded(format!(
                "dictionary holds at most {} propositions",
                self.capacity()
            )));
        }
        let idx = reg.next;
        reg.next += 1;
        reg.names.insert(name.to_string(), idx);
        Ok(BddVariable::from_index(idx as usize))
    }

    /// The variable registered for `name`, if any.
    pub fn var_of(&self, name: &str) -> Option<BddVariable> {
        self.inner
            .borrow()
            .names
            .get_by_left(name)
            .map(|&idx| BddVariable::from_index(idx as usize))
    }

    /// The name registered for `var`, if any.
    pub fn name_of(&self, var: BddVariable) -> Option<String> {
        self.inner
            .borrow()
            .names
            .get_by_right(&(var.to_index() as u16))
            .cloned()
    }

    /// The constant-true label.
    pub fn mk_true(&self) -> Bdd {
        self.ctx.mk_true()
    }

    /// The constant-false label.
    pub fn mk_false(&self) -> Bdd {
        self.ctx.mk_false()
    }

    /// The label holding exactly when `var` holds.
    pub fn mk_var(&self, var: BddVariable) -> Bdd {
        self.ctx.mk_var(var)
    }

    /// A positive or negative literal.
    pub fn mk_literal(&self, var: BddVariable, value: bool) -> Bdd {
        self.ctx.mk_literal(var, value)
    }

    /// The conjunction of the given variables.
    pub fn cube<I: IntoIterator<Item = BddVariable>>(&self, vars: I) -> Bdd {
        vars.into_iter()
            .fold(self.ctx.mk_true(), |acc, v| acc.and(&self.ctx.mk_var(v)))
    }

    /// The variables a label depends on, in ascending order.
    pub fn support(&self, label: &Bdd) -> Vec<BddVariable> {
        let mut vars: Vec<_> = label.support_set().into_iter().collect();
        vars.sort();
        vars
    }

    /// Picks one satisfying cube of `label`, written over exactly the
    /// variables `vars` (which must cover the label's support). Returns
    /// `None` for the unsatisfiable label.
    pub fn pick_cube(&self, label: &Bdd, vars: &[BddVariable]) -> Option<Bdd> {
        let witness = label.sat_witness()?;
        Some(vars.iter().fold(self.ctx.mk_true(), |acc, &v| {
            acc.and(&self.ctx.mk_literal(v, witness.value(v)))
        }))
    }

}

/// Two automata can only be combined when they share their dictionary.
pub fn same_dictionary(a: &Rc<Dictionary>, b: &Rc<Dictionary>) -> bool {
    Rc::ptr_eq(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_idempotent() {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let b = dict.register_ap("b").unwrap();
        assert_ne!(a, b);
        assert_eq!(dict.register_ap("a").unwrap(), a);
        assert_eq!(dict.num_registered(), 2);
        assert_eq!(dict.name_of(b).as_deref(), Some("b"));
        assert_eq!(dict.var_of("b"), Some(b));
        assert_eq!(dict.var_of("c"), None);
    }

    #[test]
    fn capacity_is_enforced() {
        let dict = Dictionary::with_capacity(2);
        dict.register_ap("a").unwrap();
        dict.register_ap("b").unwrap();
        assert!(matches!(
            dict.register_ap("c"),
            Err(Error::CapacityExceeded(_))
        ));
    }

    #[test]
    fn labels_are_canonical() {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let b = dict.register_ap("b").unwrap();
        let x = dict.mk_var(a).and(&dict.mk_var(b));
        let y = dict.mk_var(b).and(&dict.mk_var(a));
        // Same boolean function, same representation.
        assert_eq!(x, y);
        assert_eq!(dict.support(&x), vec![a, b]);
    }

    #[test]
    fn pick_cube_respects_support() {
        let dict = Dictionary::new();
        let a = dict.register_ap("a").unwrap();
        let b = dict.register_ap("b").unwrap();
        let label = dict.mk_var(a);
        let cube = dict.pick_cube(&label, &[a, b]).unwrap();
        assert!(cube.imp(&label).is_true());
        assert_eq!(dict.support(&cube), vec![a, b]);
        assert!(dict.pick_cube(&dict.mk_false(), &[a]).is_none());
    }
}
