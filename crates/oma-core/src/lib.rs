//! Foundational value types for ω-automata: acceptance-set marks, the
//! acceptance-condition algebra with its normal forms and textual syntax,
//! and the three-valued logic used for automaton property flags.
//!
//! The companion crate `oma` builds the automaton representation and the
//! algorithms on top of these types.

pub mod acceptance;
pub mod marks;
pub mod trivalent;

pub use acceptance::{AccError, Acceptance, Condition, ParseError, RsPair, parse_acceptance};
pub use marks::{MAX_SETS, MarkSet};
pub use trivalent::Trivalent;
