#[cfg(test)]
mod random_tree_properties {
    use dfg_core::{Dfg, Factor, FactorFamily, FactorTable, OptimizeOutcome, StateMask};
    use dfg_core::random_provider;
    use std::sync::Arc;

    /// Builds a random binary-chain DFG of `depth` pairwise factors plus a
    /// unary prior on the first variable, all potentials strictly
    /// positive, and returns it with its potentials.
    fn random_chain(depth: usize) -> (Dfg, Vec<FactorTable>) {
        let cardinality = 2 + random_provider::index(3); // 2..=4 states per variable
        let variables: Vec<(String, usize)> = (0..=depth)
            .map(|i| (format!("v{i}"), cardinality))
            .collect();

        let mut factors = Vec::with_capacity(depth + 1);
        let mut potentials = Vec::with_capacity(depth + 1);

        factors.push(("prior".to_string(), vec![0]));
        potentials.push(random_unary_table(cardinality));

        for i in 0..depth {
            factors.push((format!("f{i}"), vec![i, i + 1]));
            potentials.push(random_pairwise_table(cardinality));
        }

        (Dfg::new(variables, factors).unwrap(), potentials)
    }

    fn random_unary_table(cardinality: usize) -> FactorTable {
        let data: Vec<f64> = (0..cardinality).map(|_| 0.1 + random_provider::range(0.0f64..1.0)).collect();
        FactorTable { rows: 1, cols: cardinality, data }
    }

    fn random_pairwise_table(cardinality: usize) -> FactorTable {
        let data: Vec<f64> = (0..cardinality * cardinality)
            .map(|_| 0.1 + random_provider::range(0.0f64..1.0))
            .collect();
        FactorTable { rows: cardinality, cols: cardinality, data }
    }

    #[test]
    fn marginal_normalization_holds_on_random_trees() {
        random_provider::set_seed(7);
        for _ in 0..50 {
            let depth = 1 + random_provider::index(6);
            let (dfg, potentials) = random_chain(depth);
            let masks: Vec<Arc<StateMask>> = (0..dfg.num_variables())
                .map(|v| Arc::new(StateMask::all_true(dfg.variable_state_count(v))))
                .collect();

            let run = dfg.run_sum_product(&masks, &potentials).unwrap();
            for row in dfg.variable_marginals(&run).unwrap() {
                let sum: f64 = row.iter().sum();
                assert!((sum - 1.0).abs() < 1e-6, "row sums to {sum}");
            }
        }
    }

    #[test]
    fn partition_function_agrees_at_every_node_on_random_trees() {
        random_provider::set_seed(11);
        for _ in 0..30 {
            let depth = 1 + random_provider::index(5);
            let (dfg, potentials) = random_chain(depth);
            let masks: Vec<Arc<StateMask>> = (0..dfg.num_variables())
                .map(|v| {
                    if random_provider::bool(0.3) {
                        let state = random_provider::index(dfg.variable_state_count(v));
                        Arc::new(StateMask::one_hot(state, dfg.variable_state_count(v)))
                    } else {
                        Arc::new(StateMask::all_true(dfg.variable_state_count(v)))
                    }
                })
                .collect();

            let run = dfg.run_sum_product(&masks, &potentials).unwrap();
            let z = match dfg.normalization_constant(&run) {
                Ok(z) => z,
                Err(_) => continue, // pinned evidence happened to be jointly impossible
            };
            let map = dfg.run_max_product(&masks, &potentials).unwrap();
            assert!(map.log_prob.exp() <= z + 1e-6);
        }
    }

    fn random_row_normalized_table(rows: usize, cols: usize) -> Vec<f64> {
        let mut data = vec![0.0; rows * cols];
        for r in 0..rows {
            let row: Vec<f64> = (0..cols).map(|_| 0.1 + random_provider::range(0.0f64..1.0)).collect();
            let sum: f64 = row.iter().sum();
            for (c, v) in row.into_iter().enumerate() {
                data[r * cols + c] = v / sum;
            }
        }
        data
    }

    #[test]
    fn factor_reestimation_is_a_fixed_point_at_scaled_counts() {
        random_provider::set_seed(13);
        for _ in 0..30 {
            let rows = 1 + random_provider::index(4);
            let cols = 2 + random_provider::index(4);
            let potential = random_row_normalized_table(rows, cols);
            let mut factor = Factor::new("f", FactorFamily::RowNorm, rows, cols, potential.clone(), None).unwrap();

            // counts proportional to the current potential by any positive
            // k must re-normalize back to exactly the same potential.
            let k = 0.1 + random_provider::range(0.0f64..9.9);
            let counts: Vec<f64> = potential.iter().map(|&v| v * k).collect();
            factor.submit_counts(&counts).unwrap();

            assert_eq!(factor.optimize(), OptimizeOutcome::Success);
            let reestimated = factor.potential();
            for (got, want) in reestimated.data.iter().zip(&potential) {
                assert!((got - want).abs() < 1e-9, "got {got}, want {want}");
            }
        }
    }
}
