//! The EM-style outer loop: alternates running sum-product against every
//! data row to accumulate expectation counts, then re-estimating every
//! factor's potential from those counts. The iteration/convergence
//! bookkeeping and logging follow the shape of an engine config struct
//! with a `Default` impl and a per-iteration `tracing::info!` span.

use crate::dfg::Dfg;
use crate::factor::{FactorSet, FactorTable};
use crate::state_mask::StateMask;
use dfg_error::DfgResult;
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Stopping criteria for `run_em`.
#[derive(Copy, Clone, Debug)]
pub struct EmConfig {
    pub max_iterations: usize,
    pub log_likelihood_tolerance: f64,
}

impl Default for EmConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            log_likelihood_tolerance: 1e-6,
        }
    }
}

/// What `run_em` did: how many iterations it ran, the final total
/// log-likelihood, and whether it stopped because the likelihood
/// delta dropped below tolerance (`true`) or because it hit
/// `max_iterations` (`false`).
#[derive(Clone, Debug)]
pub struct EmOutcome {
    pub iterations: usize,
    pub log_likelihood: f64,
    pub converged: bool,
}

/// One row of evidence: a `StateMask` per variable, in variable-index
/// order, as produced by `StateMaskMapSet::states_to_masks`.
pub type DataRow = Vec<Arc<StateMask>>;

/// Runs EM against `dataset`, mutating `factors` in place. Each
/// iteration accumulates expectation counts across every row (in
/// parallel across rows, when the `rayon` feature is enabled) before
/// calling `optimize_all` once.
pub fn run_em(dfg: &Dfg, factors: &mut FactorSet, config: &EmConfig, dataset: &[DataRow]) -> DfgResult<EmOutcome> {
    let mut previous_log_likelihood = f64::NEG_INFINITY;
    let mut converged = false;
    let mut iterations = 0;
    let mut log_likelihood = 0.0;

    for iteration in 0..config.max_iterations {
        iterations = iteration + 1;
        let potentials = factors.potentials();

        let (accumulated, total_log_likelihood) = accumulate_dataset(dfg, &potentials, dataset)?;
        log_likelihood = total_log_likelihood;

        factors.clear_all();
        factors.submit_counts_vec(&accumulated)?;
        let all_succeeded = factors.optimize_all();

        let delta = log_likelihood - previous_log_likelihood;
        tracing::info!(
            iteration = iterations,
            log_likelihood,
            delta,
            all_succeeded,
            "completed EM iteration"
        );

        if delta.abs() < config.log_likelihood_tolerance {
            converged = true;
            break;
        }
        previous_log_likelihood = log_likelihood;
    }

    Ok(EmOutcome {
        iterations,
        log_likelihood,
        converged,
    })
}

fn accumulate_dataset(dfg: &Dfg, potentials: &[FactorTable], dataset: &[DataRow]) -> DfgResult<(Vec<Vec<f64>>, f64)> {
    let zero_counts: Vec<Vec<f64>> = potentials.iter().map(|t| vec![0.0; t.rows * t.cols]).collect();

    #[cfg(feature = "rayon")]
    {
        dataset
            .par_iter()
            .map(|masks| accumulate_row(dfg, potentials, masks, &zero_counts))
            .try_reduce(
                || (zero_counts.clone(), 0.0),
                |mut acc, (row_counts, row_ll)| {
                    merge_counts(&mut acc.0, &row_counts);
                    acc.1 += row_ll;
                    Ok(acc)
                },
            )
    }
    #[cfg(not(feature = "rayon"))]
    {
        let mut acc = (zero_counts.clone(), 0.0);
        for masks in dataset {
            let (row_counts, row_ll) = accumulate_row(dfg, potentials, masks, &zero_counts)?;
            merge_counts(&mut acc.0, &row_counts);
            acc.1 += row_ll;
        }
        Ok(acc)
    }
}

fn accumulate_row(
    dfg: &Dfg,
    potentials: &[FactorTable],
    masks: &[Arc<StateMask>],
    zero_counts: &[Vec<f64>],
) -> DfgResult<(Vec<Vec<f64>>, f64)> {
    let mut out = zero_counts.to_vec();
    dfg.accumulate_counts(masks, potentials, &mut out)?;
    let run = dfg.run_sum_product(masks, potentials)?;
    let z = dfg.normalization_constant(&run)?;
    Ok((out, z.ln()))
}

fn merge_counts(into: &mut [Vec<f64>], from: &[Vec<f64>]) {
    for (dst, src) in into.iter_mut().zip(from) {
        for (d, s) in dst.iter_mut().zip(src) {
            *d += s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factor::{Factor, FactorFamily};
    use crate::state_mask::StateMask;

    fn two_state_chain() -> (Dfg, FactorSet) {
        let dfg = Dfg::new(
            vec![("u".to_string(), 2), ("v".to_string(), 2)],
            vec![("uv".to_string(), vec![0, 1])],
        )
        .unwrap();
        let factor = Factor::new(
            "uv",
            FactorFamily::RowNorm,
            2,
            2,
            vec![0.5, 0.5, 0.5, 0.5],
            None,
        )
        .unwrap();
        (dfg, FactorSet::new(vec![factor]))
    }

    fn one_hot_row(u: usize, v: usize) -> DataRow {
        vec![
            Arc::new(StateMask::one_hot(u, 2)),
            Arc::new(StateMask::one_hot(v, 2)),
        ]
    }

    #[test]
    fn em_moves_potential_toward_observed_counts() {
        let (dfg, mut factors) = two_state_chain();
        // every observed row has u=0,v=0 or u=1,v=1 — a perfectly
        // correlated dataset the row-normalized factor should learn.
        let dataset = vec![
            one_hot_row(0, 0),
            one_hot_row(0, 0),
            one_hot_row(0, 0),
            one_hot_row(1, 1),
        ];
        let config = EmConfig { max_iterations: 5, log_likelihood_tolerance: 1e-9 };
        run_em(&dfg, &mut factors, &config, &dataset).unwrap();

        let p = factors.get(0).potential();
        assert!(p.get(0, 0) > 0.9);
        assert!(p.get(1, 1) > 0.9);
    }

    #[test]
    fn em_reports_iteration_count_and_convergence() {
        let (dfg, mut factors) = two_state_chain();
        let dataset = vec![one_hot_row(0, 0), one_hot_row(1, 1)];
        let config = EmConfig { max_iterations: 20, log_likelihood_tolerance: 1e-9 };
        let outcome = run_em(&dfg, &mut factors, &config, &dataset).unwrap();
        assert!(outcome.iterations >= 1);
        assert!(outcome.iterations <= 20);
    }
}
