//! The algorithms: everything here consumes automata and produces new
//! automata, never mutating its input.

mod degeneralize;
mod determinize;
mod mask;
mod product;
mod rabin;
mod remove_fin;
mod streett;
mod strength;

pub use degeneralize::{
    DegenOptions, LevelCache, degeneralize, degeneralize_tba, degeneralize_tba_with,
    degeneralize_with,
};
pub use determinize::{DeterminizeOptions, determinize, determinize_with};
pub use mask::{mask_keep_accessible_states, transform_accessible, transform_accessible_from};
pub use product::product;
pub use rabin::rabin_to_buchi_maybe;
pub use remove_fin::{cleanup_acceptance, remove_fin};
pub use streett::{
    streett_to_generalized_buchi, streett_to_generalized_buchi_maybe, to_generalized_buchi,
};
pub use strength::{
    KeepStrength, check_strength, decompose_strength, is_complete_scc,
    is_inherently_weak_automaton, is_inherently_weak_scc, is_safety_automaton,
    is_terminal_automaton, is_weak_automaton, scc_has_rejecting_cycle,
};
