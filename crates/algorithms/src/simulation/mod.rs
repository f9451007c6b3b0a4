//! Land-cover change models driving heat projections
//!
//! - **Markov**: independent per-pixel urban/non-urban transition
//! - **Cellular automaton**: iterative neighbourhood growth of urban cells

mod cellular_automaton;
mod markov;

pub use cellular_automaton::{CaOutcome, CaParams, CellularAutomaton};
pub use markov::{
    markov_transition, urban_count, urban_state_from_ndvi, MarkovParams, MarkovTransition,
    TransitionState, MASKED, NON_URBAN, URBAN,
};
