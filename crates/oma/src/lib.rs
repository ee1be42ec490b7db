//! Transition-based ω-automata with symbolic edge labels.
//!
//! The crate provides the in-memory representation of ω-automata — a
//! contiguous labelled digraph with existential and universal branching,
//! an acceptance condition from [`oma_core`], a shared atomic-proposition
//! dictionary backed by BDDs — and the foundational algorithms on top of
//! it: SCC analysis, synchronous products, degeneralization, acceptance
//! transformations (Streett/Rabin to Büchi, general Fin elimination,
//! strength decomposition) and Safra-style determinization.
//!
//! Everything is single-threaded: automata sharing one [`Dictionary`]
//! must stay on one thread, and an automaton must not be mutated while
//! its edges are being iterated.
//!
//! # Example
//! ```
//! use oma::{Automaton, Dictionary};
//! use oma_core::MarkSet;
//!
//! // Build a Büchi automaton for "infinitely many a".
//! let dict = Dictionary::new();
//! let a = dict.register_ap("a").unwrap();
//! let mut aut = Automaton::new(dict.clone());
//! aut.register_ap("a").unwrap();
//! aut.new_state();
//! aut.set_init_state(0).unwrap();
//! aut.set_buchi();
//! aut.new_edge(0, 0, dict.mk_var(a), MarkSet::singleton(0)).unwrap();
//! aut.new_edge(0, 0, dict.mk_var(a).not(), MarkSet::EMPTY).unwrap();
//!
//! let det = oma::ops::determinize(&aut).unwrap();
//! assert!(det.is_deterministic().is_true());
//! ```

pub mod automaton;
pub mod config;
pub mod dict;
mod error;
pub mod graph;
pub mod ops;
pub mod sat;
pub mod scc;

pub use automaton::{Automaton, PropSelection, PropertyFlags};
pub use dict::Dictionary;
pub use error::{Error, Result};
pub use graph::{Edge, EdgeId, Graph, StateId};
pub use scc::{SccInfo, SccNode};

// Re-exported so downstream users need only one crate in scope.
pub use oma_core::{Acceptance, Condition, MarkSet, Trivalent, parse_acceptance};
