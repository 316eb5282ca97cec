//! A thin bundle tying a `Dfg`'s topology to the state maps and name
//! tables an external caller needs to translate names and symbols into
//! the indices the engine operates on. Carries no inference logic of its
//! own, the same "thin owner" shape as `radiate-pgm`'s `PgmCodec` (a
//! config plus a `NodeStore`, not the codec's actual encode/decode work).

use crate::dfg::Dfg;
use crate::state_map::StateMap;
use crate::state_mask::StateMaskMapSet;
use dfg_error::{DfgError, DfgResult};
use std::collections::HashMap;

/// `Dfg` plus everything needed to resolve variable/factor names and
/// observed symbols into the indices `Dfg` itself works with.
pub struct DfgInfo {
    dfg: Dfg,
    masks: StateMaskMapSet,
    variable_names: Vec<String>,
    variable_index: HashMap<String, usize>,
    factor_names: Vec<String>,
    factor_index: HashMap<String, usize>,
    state_maps: Vec<StateMap>,
    variable_state_map: Vec<usize>,
}

impl DfgInfo {
    /// `variable_state_map[v]` indexes into `state_maps`, giving the
    /// StateMap that defines variable `v`'s alphabet. `masks` must
    /// already be built (one `StateMaskMap` per variable, in the same
    /// order) from the same state maps.
    pub fn new(dfg: Dfg, masks: StateMaskMapSet, state_maps: Vec<StateMap>, variable_state_map: Vec<usize>) -> DfgResult<Self> {
        if masks.len() != dfg.num_variables() {
            return Err(DfgError::misshapen(format!(
                "{} state mask maps supplied, expected {} (one per variable)",
                masks.len(),
                dfg.num_variables()
            )));
        }
        if variable_state_map.len() != dfg.num_variables() {
            return Err(DfgError::misshapen(format!(
                "variable-to-state-map table has {} entries, expected {}",
                variable_state_map.len(),
                dfg.num_variables()
            )));
        }
        for &m in &variable_state_map {
            if m >= state_maps.len() {
                return Err(DfgError::misshapen(format!(
                    "variable references state map index {m}, out of range"
                )));
            }
        }

        let mut variable_names = Vec::with_capacity(dfg.num_variables());
        let mut variable_index = HashMap::with_capacity(dfg.num_variables());
        for v in 0..dfg.num_variables() {
            let name = dfg.variable_name(v).to_string();
            variable_index.insert(name.clone(), v);
            variable_names.push(name);
        }

        let mut factor_names = Vec::with_capacity(dfg.num_factors());
        let mut factor_index = HashMap::with_capacity(dfg.num_factors());
        for f in 0..dfg.num_factors() {
            let name = dfg.factor_name(f).to_string();
            factor_index.insert(name.clone(), f);
            factor_names.push(name);
        }

        Ok(Self {
            dfg,
            masks,
            variable_names,
            variable_index,
            factor_names,
            factor_index,
            state_maps,
            variable_state_map,
        })
    }

    pub fn dfg(&self) -> &Dfg {
        &self.dfg
    }

    pub fn masks(&self) -> &StateMaskMapSet {
        &self.masks
    }

    pub fn variable_index(&self, name: &str) -> DfgResult<usize> {
        self.variable_index
            .get(name)
            .copied()
            .ok_or_else(|| DfgError::misshapen(format!("no variable named \"{name}\"")))
    }

    pub fn factor_index(&self, name: &str) -> DfgResult<usize> {
        self.factor_index
            .get(name)
            .copied()
            .ok_or_else(|| DfgError::misshapen(format!("no factor named \"{name}\"")))
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn factor_names(&self) -> &[String] {
        &self.factor_names
    }

    pub fn state_map_for_variable(&self, v: usize) -> &StateMap {
        &self.state_maps[self.variable_state_map[v]]
    }

    /// Resolves `(variable_name, symbol)` observations into `(state,
    /// variable_index)` pairs suitable for `StateMaskMapSet::states_to_masks`,
    /// failing with `UnknownSymbol` (via `StateMap::state_of`) on the
    /// first symbol that doesn't resolve under its variable's alphabet.
    pub fn resolve_observations(&self, observed: &[(&str, &str)]) -> DfgResult<Vec<(usize, usize)>> {
        observed
            .iter()
            .map(|&(var_name, symbol)| {
                let v = self.variable_index(var_name)?;
                let state = self.state_map_for_variable(v).state_of(symbol)?;
                Ok((state, v))
            })
            .collect()
    }
}
