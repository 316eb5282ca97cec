//! The bipartite message-passing engine: sum-product, max-product, and
//! expectation accumulation over a discrete factor graph. The schedule
//! is the classic two-pass tree belief propagation algorithm, replacing
//! `radiate-pgm/src/factor/mod.rs`'s variable-elimination-to-joint
//! approach (which materializes the whole joint factor) with a
//! linear-in-tree-size algorithm.
//!
//! Messages are carried in natural-log space throughout, grounded on
//! `radiate-pgm/src/factor/discrete.rs`'s log-table `DiscreteFactor` and
//! its `logsumexp`; `Dfg` itself holds topology only (variables, factors,
//! adjacency, one BFS order from a chosen root) — potentials are supplied
//! per call as `&[FactorTable]`, so the same topology can be reused
//! concurrently against different potentials and evidence.

use crate::factor::FactorTable;
use crate::state_mask::StateMask;
use dfg_error::{DfgError, DfgResult};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Aggregate {
    Sum,
    Max,
}

#[derive(Clone, Debug)]
struct VariableNode {
    name: String,
    state_count: usize,
}

#[derive(Clone, Debug)]
struct FactorNode {
    name: String,
    /// length 1 (unary) or 2 (pairwise), in the order supplied at
    /// construction — this order also fixes how `FactorTable` axes are
    /// read.
    neighbors: Vec<usize>,
}

/// Topology of a discrete factor graph: variables, factors, and the
/// spanning tree rooted at the first variable. Immutable after
/// construction; every inference call takes potentials and evidence as
/// arguments and returns an owned result, so a `&Dfg` is safe to share
/// across concurrent calls.
#[derive(Clone, Debug)]
pub struct Dfg {
    variables: Vec<VariableNode>,
    factors: Vec<FactorNode>,
    var_factors: Vec<Vec<usize>>,
    /// combined adjacency in node-id space: variables are `0..num_variables`,
    /// factor `f` is node `num_variables + f`.
    adjacency: Vec<Vec<usize>>,
    root: usize,
    /// BFS order from `root`, root first.
    topo_order: Vec<usize>,
    parent: Vec<Option<usize>>,
}

/// The log-space messages produced by `Dfg::run_sum_product`, plus the
/// evidence masks they were computed against. Pass this to
/// `normalization_constant`/`variable_marginals`/`factor_marginals`.
pub struct SumProduct {
    messages: HashMap<(usize, usize), Vec<f64>>,
    masks: Vec<Arc<StateMask>>,
    log_z: f64,
}

/// The outcome of `Dfg::run_max_product`.
#[derive(Clone, Debug)]
pub struct MaxProduct {
    /// the MAP state of every variable, indexed by variable index.
    pub states: Vec<usize>,
    /// the unnormalized log-probability of `states`: the sum, over every
    /// factor, of the log-potential at the assignment it restricts to.
    pub log_prob: f64,
}

impl Dfg {
    /// `variables` gives each variable's name and state count, in index
    /// order. `factors` gives each factor's name and ordered neighbor
    /// variable indices (length 1 or 2); the order fixes how
    /// `FactorTable` rows/cols are read for that factor.
    pub fn new(variables: Vec<(String, usize)>, factors: Vec<(String, Vec<usize>)>) -> DfgResult<Self> {
        if variables.is_empty() {
            return Err(DfgError::graph_malformed("a factor graph needs at least one variable"));
        }
        let num_variables = variables.len();
        let variable_nodes: Vec<VariableNode> = variables
            .into_iter()
            .map(|(name, state_count)| VariableNode { name, state_count })
            .collect();

        let mut var_factors = vec![Vec::new(); num_variables];
        let mut factor_nodes = Vec::with_capacity(factors.len());
        for (fi, (name, neighbors)) in factors.into_iter().enumerate() {
            if neighbors.is_empty() || neighbors.len() > 2 {
                return Err(DfgError::misshapen(format!(
                    "factor \"{name}\" has {} neighbors, expected 1 or 2",
                    neighbors.len()
                )));
            }
            for &v in &neighbors {
                if v >= num_variables {
                    return Err(DfgError::graph_malformed(format!(
                        "factor \"{name}\" references variable index {v}, out of range"
                    )));
                }
                var_factors[v].push(fi);
            }
            factor_nodes.push(FactorNode { name, neighbors });
        }

        let num_factors = factor_nodes.len();
        let num_nodes = num_variables + num_factors;
        let mut adjacency = vec![Vec::new(); num_nodes];
        for v in 0..num_variables {
            for &f in &var_factors[v] {
                adjacency[v].push(num_variables + f);
            }
        }
        for (f, node) in factor_nodes.iter().enumerate() {
            for &v in &node.neighbors {
                adjacency[num_variables + f].push(v);
            }
        }

        for v in 0..num_variables {
            if var_factors[v].is_empty() && num_nodes > 1 {
                return Err(DfgError::graph_malformed(format!(
                    "variable \"{}\" is not referenced by any factor",
                    variable_nodes[v].name
                )));
            }
        }

        let root = 0usize;
        let mut parent: Vec<Option<usize>> = vec![None; num_nodes];
        let mut visited = vec![false; num_nodes];
        let mut topo_order = Vec::with_capacity(num_nodes);
        let mut queue = std::collections::VecDeque::new();
        visited[root] = true;
        queue.push_back(root);
        while let Some(u) = queue.pop_front() {
            topo_order.push(u);
            for &w in &adjacency[u] {
                if !visited[w] {
                    visited[w] = true;
                    parent[w] = Some(u);
                    queue.push_back(w);
                } else if parent[u] != Some(w) {
                    return Err(DfgError::graph_malformed(
                        "the factor graph contains a cycle; only trees are supported",
                    ));
                }
            }
        }
        if topo_order.len() != num_nodes {
            return Err(DfgError::graph_malformed(
                "the factor graph is disconnected; only a single connected tree is supported",
            ));
        }

        Ok(Self {
            variables: variable_nodes,
            factors: factor_nodes,
            var_factors,
            adjacency,
            root,
            topo_order,
            parent,
        })
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }

    pub fn variable_name(&self, v: usize) -> &str {
        &self.variables[v].name
    }

    pub fn variable_state_count(&self, v: usize) -> usize {
        self.variables[v].state_count
    }

    pub fn factor_name(&self, f: usize) -> &str {
        &self.factors[f].name
    }

    pub fn factor_neighbors(&self, f: usize) -> &[usize] {
        &self.factors[f].neighbors
    }

    fn is_variable(&self, node: usize) -> bool {
        node < self.variables.len()
    }

    /// Every factor's potential shape matches the cardinalities of its
    /// neighbors, every variable is referenced by at least one factor,
    /// and the graph is a single connected tree (already enforced at
    /// construction; re-checked here for callers that hold potentials
    /// separately and want a single pre-flight call).
    pub fn consistency_check(&self, potentials: &[FactorTable]) -> DfgResult<()> {
        self.check_shapes(potentials)
    }

    fn check_shapes(&self, potentials: &[FactorTable]) -> DfgResult<()> {
        if potentials.len() != self.factors.len() {
            return Err(DfgError::misshapen(format!(
                "{} potentials supplied, expected {}",
                potentials.len(),
                self.factors.len()
            )));
        }
        for (f, node) in self.factors.iter().enumerate() {
            let table = &potentials[f];
            let expected = match node.neighbors.as_slice() {
                [v] => (1usize, self.variables[*v].state_count),
                [u, v] => (self.variables[*u].state_count, self.variables[*v].state_count),
                _ => unreachable!("constructor rejects factors with other arities"),
            };
            if (table.rows, table.cols) != expected {
                return Err(DfgError::misshapen(format!(
                    "factor \"{}\" potential is {}x{}, expected {}x{}",
                    node.name, table.rows, table.cols, expected.0, expected.1
                )));
            }
        }
        Ok(())
    }

    fn check_masks(&self, masks: &[Arc<StateMask>]) -> DfgResult<()> {
        if masks.len() != self.variables.len() {
            return Err(DfgError::misshapen(format!(
                "{} evidence masks supplied, expected {}",
                masks.len(),
                self.variables.len()
            )));
        }
        for (v, mask) in masks.iter().enumerate() {
            if mask.len() != self.variables[v].state_count {
                return Err(DfgError::misshapen(format!(
                    "evidence mask for variable \"{}\" has {} entries, expected {}",
                    self.variables[v].name,
                    mask.len(),
                    self.variables[v].state_count
                )));
            }
        }
        Ok(())
    }

    /// The evidence at `v` combined with every incoming message except
    /// (if given) the one from `exclude`. With `exclude = None` this is
    /// the variable's full belief; with `exclude = Some(f)` it is the
    /// directed message `v -> f`.
    fn variable_belief(
        &self,
        v: usize,
        exclude: Option<usize>,
        masks: &[Arc<StateMask>],
        messages: &HashMap<(usize, usize), Vec<f64>>,
    ) -> Vec<f64> {
        let sc = self.variables[v].state_count;
        let mut out = vec![0.0f64; sc];
        for s in 0..sc {
            out[s] = if masks[v].get(s) { 0.0 } else { f64::NEG_INFINITY };
        }
        for &nb in &self.adjacency[v] {
            if Some(nb) == exclude {
                continue;
            }
            if let Some(incoming) = messages.get(&(nb, v)) {
                for s in 0..sc {
                    out[s] += incoming[s];
                }
            }
        }
        out
    }

    /// The directed message from `from` toward `target`. Factor-side
    /// calls must always pass `Some(target)`; variable-side calls may
    /// pass `None` to get the variable's full belief instead of a
    /// directed message (see `variable_belief`).
    fn compute_message(
        &self,
        from: usize,
        target: Option<usize>,
        masks: &[Arc<StateMask>],
        potentials: &[FactorTable],
        messages: &HashMap<(usize, usize), Vec<f64>>,
        agg: Aggregate,
    ) -> (Vec<f64>, Option<Vec<usize>>) {
        if self.is_variable(from) {
            (self.variable_belief(from, target, masks, messages), None)
        } else {
            let f = from - self.variables.len();
            let to = target.expect("a factor's message is always directed at a neighbor");
            let neighbors = &self.factors[f].neighbors;
            let table = &potentials[f];

            if neighbors.len() == 1 {
                let logs: Vec<f64> = (0..table.cols).map(|c| ln_safe(table.get(0, c))).collect();
                return (logs, None);
            }

            let other = if neighbors[0] == to { neighbors[1] } else { neighbors[0] };
            let incoming = messages
                .get(&(other, from))
                .cloned()
                .unwrap_or_else(|| vec![0.0; self.variables[other].state_count]);

            let to_card = self.variables[to].state_count;
            let mut out = vec![f64::NEG_INFINITY; to_card];
            let mut argmax = vec![0usize; to_card];
            for t in 0..to_card {
                let mut sum = f64::NEG_INFINITY;
                let mut best = f64::NEG_INFINITY;
                let mut best_idx = 0usize;
                for (s, &inc) in incoming.iter().enumerate() {
                    let val = ln_safe(pairwise_value(table, neighbors, to, t, s)) + inc;
                    match agg {
                        Aggregate::Sum => sum = log_add(sum, val),
                        Aggregate::Max => {
                            if val > best {
                                best = val;
                                best_idx = s;
                            }
                        }
                    }
                }
                match agg {
                    Aggregate::Sum => out[t] = sum,
                    Aggregate::Max => {
                        out[t] = best;
                        argmax[t] = best_idx;
                    }
                }
            }
            (out, if agg == Aggregate::Max { Some(argmax) } else { None })
        }
    }

    /// Two-pass tree message passing: inward from leaves to `root`, then
    /// outward from `root` to leaves. After both passes every edge
    /// carries a message in each direction.
    pub fn run_sum_product(
        &self,
        masks: &[Arc<StateMask>],
        potentials: &[FactorTable],
    ) -> DfgResult<SumProduct> {
        self.check_shapes(potentials)?;
        self.check_masks(masks)?;

        let mut messages: HashMap<(usize, usize), Vec<f64>> = HashMap::new();

        for &u in self.topo_order.iter().rev() {
            if let Some(p) = self.parent[u] {
                let (msg, _) = self.compute_message(u, Some(p), masks, potentials, &messages, Aggregate::Sum);
                messages.insert((u, p), msg);
            }
        }
        for &u in self.topo_order.iter() {
            for &c in &self.adjacency[u] {
                if self.parent[c] == Some(u) {
                    let (msg, _) =
                        self.compute_message(u, Some(c), masks, potentials, &messages, Aggregate::Sum);
                    messages.insert((u, c), msg);
                }
            }
        }

        let belief = self.variable_belief(self.root, None, masks, &messages);
        let log_z = logsumexp(&belief);

        Ok(SumProduct {
            messages,
            masks: masks.to_vec(),
            log_z,
        })
    }

    /// The log-partition function; identical regardless of which node it
    /// is evaluated at, so it is computed once, at `root`, in
    /// `run_sum_product`.
    pub fn log_normalization_constant(&self, run: &SumProduct) -> f64 {
        run.log_z
    }

    /// `Z`. Fails with `ZeroEvidence` if the evidence rules out every
    /// joint assignment, or `Underflow` if `Z` is nonzero but smaller
    /// than the smallest positive representable `f64`.
    pub fn normalization_constant(&self, run: &SumProduct) -> DfgResult<f64> {
        if run.log_z.is_infinite() && run.log_z.is_sign_negative() {
            let culprit = run
                .masks
                .iter()
                .position(|m| !m.is_consistent())
                .map(|v| self.variables[v].name.clone())
                .unwrap_or_else(|| self.variables[self.root].name.clone());
            tracing::warn!(variable = %culprit, "sum-product evidence is inconsistent with every state");
            return Err(DfgError::zero_evidence(culprit));
        }
        let z = run.log_z.exp();
        if z == 0.0 {
            tracing::warn!(log_z = run.log_z, "partition function underflowed f64");
            return Err(DfgError::Underflow { log_z: run.log_z });
        }
        Ok(z)
    }

    /// `p(v=s)` for every variable, as dense probability vectors indexed
    /// by variable, then state.
    pub fn variable_marginals(&self, run: &SumProduct) -> DfgResult<Vec<Vec<f64>>> {
        let z = self.normalization_constant(run)?;
        let log_z = z.ln();
        Ok((0..self.variables.len())
            .map(|v| {
                let belief = self.variable_belief(v, None, &run.masks, &run.messages);
                belief.into_iter().map(|lp| (lp - log_z).exp()).collect()
            })
            .collect())
    }

    /// `p(f=(s,...))` for every factor, renormalized by `Z`.
    pub fn factor_marginals(
        &self,
        run: &SumProduct,
        potentials: &[FactorTable],
    ) -> DfgResult<Vec<FactorTable>> {
        self.check_shapes(potentials)?;
        let z = self.normalization_constant(run)?;
        let log_z = z.ln();

        let mut out = Vec::with_capacity(self.factors.len());
        for (f, node) in self.factors.iter().enumerate() {
            let table = &potentials[f];
            let log_table = match node.neighbors.as_slice() {
                [v] => {
                    let msg = &run.messages[&(*v, self.variables.len() + f)];
                    (0..table.cols).map(|s| ln_safe(table.get(0, s)) + msg[s]).collect::<Vec<_>>()
                }
                [u, v] => {
                    let fnode = self.variables.len() + f;
                    let mu = &run.messages[&(*u, fnode)];
                    let mv = &run.messages[&(*v, fnode)];
                    let mut data = vec![0.0; table.rows * table.cols];
                    for r in 0..table.rows {
                        for c in 0..table.cols {
                            data[r * table.cols + c] = ln_safe(table.get(r, c)) + mu[r] + mv[c];
                        }
                    }
                    data
                }
                _ => unreachable!(),
            };
            let data = log_table.into_iter().map(|lp| (lp - log_z).exp()).collect();
            out.push(FactorTable {
                rows: table.rows,
                cols: table.cols,
                data,
            });
        }
        Ok(out)
    }

    /// Runs sum-product against `masks`, then adds each factor's
    /// marginal into the matching slot of `out`. `out` must already be
    /// sized to each factor's `rows * cols`.
    pub fn accumulate_counts(
        &self,
        masks: &[Arc<StateMask>],
        potentials: &[FactorTable],
        out: &mut [Vec<f64>],
    ) -> DfgResult<()> {
        if out.len() != self.factors.len() {
            return Err(DfgError::misshapen(format!(
                "accumulator has {} slots, expected {}",
                out.len(),
                self.factors.len()
            )));
        }
        let run = self.run_sum_product(masks, potentials)?;
        let marginals = self.factor_marginals(&run, potentials)?;
        for (slot, marginal) in out.iter_mut().zip(marginals) {
            if slot.len() != marginal.data.len() {
                return Err(DfgError::misshapen(format!(
                    "accumulator slot has {} entries, expected {}",
                    slot.len(),
                    marginal.data.len()
                )));
            }
            for (acc, v) in slot.iter_mut().zip(marginal.data) {
                *acc += v;
            }
        }
        Ok(())
    }

    /// Max-product (the MAP state): one inward pass
    /// recording, per pairwise factor, the argmax of its non-parent
    /// variable for every state of its parent, then a single top-down
    /// traceback from `root`'s own argmax.
    pub fn run_max_product(
        &self,
        masks: &[Arc<StateMask>],
        potentials: &[FactorTable],
    ) -> DfgResult<MaxProduct> {
        self.check_shapes(potentials)?;
        self.check_masks(masks)?;

        let mut messages: HashMap<(usize, usize), Vec<f64>> = HashMap::new();
        let mut argmax_tables: HashMap<usize, Vec<usize>> = HashMap::new();

        for &u in self.topo_order.iter().rev() {
            if let Some(p) = self.parent[u] {
                let (msg, amax) =
                    self.compute_message(u, Some(p), masks, potentials, &messages, Aggregate::Max);
                if !self.is_variable(u) {
                    if let Some(table) = amax {
                        argmax_tables.insert(u - self.variables.len(), table);
                    }
                }
                messages.insert((u, p), msg);
            }
        }

        let root_belief = self.variable_belief(self.root, None, masks, &messages);
        let (root_state, root_log_val) = argmax_index(&root_belief);
        if root_log_val.is_infinite() && root_log_val.is_sign_negative() {
            return Err(DfgError::zero_evidence(self.variables[self.root].name.clone()));
        }

        let mut states = vec![0usize; self.variables.len()];
        states[self.root] = root_state;

        for &u in self.topo_order.iter() {
            if !self.is_variable(u) {
                continue;
            }
            let v_state = states[u];
            for &f_node in &self.adjacency[u] {
                if self.parent[f_node] != Some(u) {
                    continue;
                }
                let f = f_node - self.variables.len();
                if self.factors[f].neighbors.len() != 2 {
                    continue;
                }
                let child = *self.factors[f]
                    .neighbors
                    .iter()
                    .find(|&&x| x != u)
                    .expect("pairwise factor has exactly one other neighbor");
                let table = &argmax_tables[&f];
                states[child] = table[v_state];
            }
        }

        let log_prob = self.assignment_log_prob(&states, potentials);
        Ok(MaxProduct { states, log_prob })
    }

    fn assignment_log_prob(&self, states: &[usize], potentials: &[FactorTable]) -> f64 {
        self.factors
            .iter()
            .enumerate()
            .map(|(f, node)| {
                let table = &potentials[f];
                let value = match node.neighbors.as_slice() {
                    [v] => table.get(0, states[*v]),
                    [u, v] => table.get(states[*u], states[*v]),
                    _ => unreachable!(),
                };
                ln_safe(value)
            })
            .sum()
    }
}

fn pairwise_value(table: &FactorTable, neighbors: &[usize], to_var: usize, to_state: usize, other_state: usize) -> f64 {
    if neighbors[0] == to_var {
        table.get(to_state, other_state)
    } else {
        table.get(other_state, to_state)
    }
}

fn ln_safe(v: f64) -> f64 {
    if v <= 0.0 { f64::NEG_INFINITY } else { v.ln() }
}

fn log_add(a: f64, b: f64) -> f64 {
    if a.is_infinite() && a.is_sign_negative() {
        return b;
    }
    if b.is_infinite() && b.is_sign_negative() {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}

pub(crate) fn logsumexp(values: &[f64]) -> f64 {
    values.iter().fold(f64::NEG_INFINITY, |acc, &v| log_add(acc, v))
}

fn argmax_index(values: &[f64]) -> (usize, f64) {
    let mut best_idx = 0usize;
    let mut best_val = f64::NEG_INFINITY;
    for (i, &v) in values.iter().enumerate() {
        if v > best_val {
            best_val = v;
            best_idx = i;
        }
    }
    (best_idx, best_val)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_mask::StateMask;

    fn chain() -> (Dfg, Vec<FactorTable>) {
        // V0 -- F01 -- V1 -- F12 -- V2, plus a unary prior on V0.
        let variables = vec![
            ("V0".to_string(), 2),
            ("V1".to_string(), 2),
            ("V2".to_string(), 2),
        ];
        let factors = vec![
            ("prior0".to_string(), vec![0]),
            ("f01".to_string(), vec![0, 1]),
            ("f12".to_string(), vec![1, 2]),
        ];
        let dfg = Dfg::new(variables, factors).unwrap();
        let potentials = vec![
            FactorTable { rows: 1, cols: 2, data: vec![0.5, 0.5] },
            FactorTable { rows: 2, cols: 2, data: vec![0.7, 0.3, 0.2, 0.8] },
            FactorTable { rows: 2, cols: 2, data: vec![0.9, 0.1, 0.4, 0.6] },
        ];
        (dfg, potentials)
    }

    fn all_true(dfg: &Dfg) -> Vec<Arc<StateMask>> {
        (0..dfg.num_variables())
            .map(|v| Arc::new(StateMask::all_true(dfg.variable_state_count(v))))
            .collect()
    }

    #[test]
    fn chain_sum_product_and_map_without_evidence() {
        let (dfg, potentials) = chain();
        let masks = all_true(&dfg);
        let run = dfg.run_sum_product(&masks, &potentials).unwrap();
        let z = dfg.normalization_constant(&run).unwrap();
        assert!((z - 1.0).abs() < 1e-9);

        // marginal(V2) = sum over V0,V1 of prior0[V0]*f01[V0,V1]*f12[V1,V2];
        // enumerating all 8 joint states gives V2=0 mass 0.625, V2=1 mass
        // 0.375 for these potentials.
        let marginals = dfg.variable_marginals(&run).unwrap();
        assert!((marginals[2][0] - 0.625).abs() < 1e-6);
        assert!((marginals[2][1] - 0.375).abs() < 1e-6);

        let map = dfg.run_max_product(&masks, &potentials).unwrap();
        assert_eq!(map.states, vec![0, 0, 0]);
        assert!((map.log_prob.exp() - 0.315).abs() < 1e-6);
    }

    #[test]
    fn chain_sum_product_with_pinned_evidence() {
        let (dfg, potentials) = chain();
        let mut masks = all_true(&dfg);
        masks[2] = Arc::new(StateMask::one_hot(1, 2));
        let run = dfg.run_sum_product(&masks, &potentials).unwrap();
        let z = dfg.normalization_constant(&run).unwrap();
        // matches the V2=1 mass from the unconditional joint above.
        assert!((z - 0.375).abs() < 1e-6);

        // P(V0=0 | V2=1) = (joint(0,0,1)+joint(0,1,1)) / Z = 0.125/0.375.
        let marginals = dfg.variable_marginals(&run).unwrap();
        assert!((marginals[0][0] - (1.0 / 3.0)).abs() < 1e-6);
        assert!((marginals[0][1] - (2.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn property_marginal_normalization() {
        let (dfg, potentials) = chain();
        let masks = all_true(&dfg);
        let run = dfg.run_sum_product(&masks, &potentials).unwrap();
        for row in dfg.variable_marginals(&run).unwrap() {
            let sum: f64 = row.iter().sum();
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn property_partition_consistency_across_nodes() {
        let (dfg, potentials) = chain();
        let masks = all_true(&dfg);
        let run = dfg.run_sum_product(&masks, &potentials).unwrap();
        let via_root = dfg.normalization_constant(&run).unwrap();

        // Recompute Z by aggregating at every other variable; must match
        // within tolerance regardless of which node it's read at.
        for v in 0..dfg.num_variables() {
            let belief = dfg.variable_belief(v, None, &run.masks, &run.messages);
            let z_v = logsumexp(&belief).exp();
            assert!((z_v - via_root).abs() < 1e-9, "mismatch at variable {v}");
        }
    }

    #[test]
    fn property_pinned_evidence_is_one_hot() {
        let (dfg, potentials) = chain();
        let mut masks = all_true(&dfg);
        masks[1] = Arc::new(StateMask::one_hot(0, 2));
        let run = dfg.run_sum_product(&masks, &potentials).unwrap();
        let marginals = dfg.variable_marginals(&run).unwrap();
        assert!((marginals[1][0] - 1.0).abs() < 1e-9);
        assert!(marginals[1][1].abs() < 1e-9);
    }

    #[test]
    fn property_map_probability_bounded_by_z() {
        let (dfg, potentials) = chain();
        let masks = all_true(&dfg);
        let run = dfg.run_sum_product(&masks, &potentials).unwrap();
        let z = dfg.normalization_constant(&run).unwrap();
        let map = dfg.run_max_product(&masks, &potentials).unwrap();
        assert!(map.log_prob.exp() <= z + 1e-9);
    }

    #[test]
    fn zero_evidence_detected_on_readout() {
        let (dfg, potentials) = chain();
        // f01's table is diagonal: V0=0 only ever co-occurs with V1=0, and
        // V0=1 only with V1=1. Pinning V0=0 and V1=1 is jointly impossible.
        let mut zero_potentials = potentials.clone();
        zero_potentials[1] = FactorTable { rows: 2, cols: 2, data: vec![1.0, 0.0, 0.0, 1.0] };
        let mut masks = all_true(&dfg);
        masks[0] = Arc::new(StateMask::one_hot(0, 2));
        masks[1] = Arc::new(StateMask::one_hot(1, 2));
        let run = dfg.run_sum_product(&masks, &zero_potentials).unwrap();
        let err = dfg.normalization_constant(&run).unwrap_err();
        assert_eq!(err.kind(), dfg_error::ErrorKind::ZeroEvidence);
    }

    #[test]
    fn misshapen_pairwise_factor_rejected_by_consistency_check() {
        let variables = vec![("bin".to_string(), 2), ("tern".to_string(), 3)];
        let factors = vec![("f".to_string(), vec![0, 1])];
        let dfg = Dfg::new(variables, factors).unwrap();
        let bad = vec![FactorTable { rows: 2, cols: 2, data: vec![0.25; 4] }];
        let err = dfg.consistency_check(&bad).unwrap_err();
        assert_eq!(err.kind(), dfg_error::ErrorKind::Misshapen);
    }

    #[test]
    fn cyclic_graph_rejected_at_construction() {
        // Two factors both connecting V0 and V1 creates a cycle.
        let variables = vec![("V0".to_string(), 2), ("V1".to_string(), 2)];
        let factors = vec![("f_a".to_string(), vec![0, 1]), ("f_b".to_string(), vec![0, 1])];
        let err = Dfg::new(variables, factors).unwrap_err();
        assert_eq!(err.kind(), dfg_error::ErrorKind::GraphMalformed);
    }

    #[test]
    fn disconnected_graph_rejected_at_construction() {
        let variables = vec![
            ("V0".to_string(), 2),
            ("V1".to_string(), 2),
            ("V2".to_string(), 2),
            ("V3".to_string(), 2),
        ];
        let factors = vec![("f01".to_string(), vec![0, 1]), ("f23".to_string(), vec![2, 3])];
        let err = Dfg::new(variables, factors).unwrap_err();
        assert_eq!(err.kind(), dfg_error::ErrorKind::GraphMalformed);
    }
}
