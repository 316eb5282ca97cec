//! Converts observed symbols into per-variable state masks — the evidence
//! vectors message passing consumes.

use crate::state_map::StateMap;
use dfg_error::{DfgError, DfgResult};
use std::sync::Arc;

/// A boolean vector over basic states: `true` at every basic state the
/// observed (possibly meta-) symbol is consistent with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateMask(Vec<bool>);

impl StateMask {
    pub fn all_true(state_count: usize) -> Self {
        Self(vec![true; state_count])
    }

    pub fn one_hot(state: usize, state_count: usize) -> Self {
        let mut bits = vec![false; state_count];
        bits[state] = true;
        Self(bits)
    }

    /// Fails if any of `basic_states` is out of range for `state_count` —
    /// a malformed `StateMap` would otherwise cause an out-of-bounds
    /// index here.
    fn from_degeneracy(state_count: usize, basic_states: &[usize]) -> DfgResult<Self> {
        let mut bits = vec![false; state_count];
        for &s in basic_states {
            if s >= state_count {
                return Err(DfgError::misshapen(format!(
                    "degeneracy entry {s} is out of range for a {state_count}-state alphabet"
                )));
            }
            bits[s] = true;
        }
        Ok(Self(bits))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, state: usize) -> bool {
        self.0[state]
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    /// `false` when evidence rules out every basic state — a caller error
    /// that inference reports as `ZeroEvidence`.
    pub fn is_consistent(&self) -> bool {
        self.0.iter().any(|&b| b)
    }
}

/// One precomputed mask per (meta-)state of a `StateMap`.
#[derive(Clone, Debug)]
pub struct StateMaskMap {
    state_count: usize,
    masks: Vec<Arc<StateMask>>,
    all_true: Arc<StateMask>,
}

impl StateMaskMap {
    /// Fails with `Misshapen` rather than panicking if `state_map`'s
    /// degeneracy table references an out-of-range basic state — this
    /// boundary doesn't trust `StateMap` to have already enforced that.
    pub fn new(state_map: &StateMap) -> DfgResult<Self> {
        let state_count = state_map.state_count();
        let mut masks = Vec::with_capacity(state_map.meta_state_count());
        for state in 0..state_map.meta_state_count() {
            let mask = StateMask::from_degeneracy(state_count, state_map.degeneracy_states(state))?;
            masks.push(Arc::new(mask));
        }
        Ok(Self {
            state_count,
            masks,
            all_true: Arc::new(StateMask::all_true(state_count)),
        })
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    /// The mask for a given (meta-)state, or `None` if `state` is out of
    /// range.
    pub fn mask_for_state(&self, state: usize) -> Option<Arc<StateMask>> {
        self.masks.get(state).cloned()
    }

    /// The "fully unobserved" sentinel mask: all-true.
    pub fn all_true(&self) -> Arc<StateMask> {
        self.all_true.clone()
    }
}

/// One `StateMaskMap` per variable in a `Dfg`, used to turn a batch of
/// observed symbols into the evidence array message passing expects.
#[derive(Clone, Debug)]
pub struct StateMaskMapSet {
    maps: Vec<StateMaskMap>,
}

impl StateMaskMapSet {
    pub fn new(maps: Vec<StateMaskMap>) -> Self {
        Self { maps }
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn get(&self, var: usize) -> &StateMaskMap {
        &self.maps[var]
    }

    /// Given observed `(state, variable_index)` pairs, return one mask per
    /// variable: the observation's precomputed mask where named, the
    /// all-true sentinel everywhere else.
    pub fn states_to_masks(&self, observed: &[(usize, usize)]) -> Vec<Arc<StateMask>> {
        let mut masks: Vec<Arc<StateMask>> =
            self.maps.iter().map(StateMaskMap::all_true).collect();
        for &(state, var) in observed {
            if let Some(mask) = self.maps[var].mask_for_state(state) {
                masks[var] = mask;
            }
        }
        masks
    }
}
