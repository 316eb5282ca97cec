//! A factor's potential table plus the normalization family used to
//! re-estimate it from submitted expectation counts. One tagged-variant
//! record rather than a small class hierarchy per normalization kind —
//! `radiate-pgm/src/factor.rs`'s `Potential` enum makes the same move:
//! one record, an enum tag that picks behavior.

use dfg_error::{DfgError, DfgResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const NORMALIZATION_TOLERANCE: f64 = 1e-6;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum FactorFamily {
    /// sum over the whole table == 1
    GlobalNorm,
    /// every row sums to 1
    RowNorm,
    /// every column sums to 1
    ColumnNorm,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum OptimizeOutcome {
    /// No counts were submitted since the last `optimize`/`clear_counts`;
    /// the potential was left untouched.
    Unchanged,
    Success,
    /// A required normalizing group (the whole table, a row, or a column)
    /// summed to zero.
    Failure,
}

/// Row-major dense table: `rows == 1` for a unary factor, `cols` is the
/// other variable's cardinality for a pairwise one.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FactorTable {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl FactorTable {
    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.data[r * self.cols + c]
    }
}

#[derive(Clone, Debug)]
pub struct Factor {
    name: String,
    family: FactorFamily,
    rows: usize,
    cols: usize,
    potential: Vec<f64>,
    pseudocounts: Vec<f64>,
    counts: Vec<f64>,
    dirty: bool,
}

impl Factor {
    /// `potential` must already satisfy `family`'s normalization
    /// constraint within `NORMALIZATION_TOLERANCE`.
    pub fn new(
        name: impl Into<String>,
        family: FactorFamily,
        rows: usize,
        cols: usize,
        potential: Vec<f64>,
        pseudocounts: Option<Vec<f64>>,
    ) -> DfgResult<Self> {
        let name = name.into();
        let expected = rows * cols;
        if potential.len() != expected {
            return Err(DfgError::misshapen(format!(
                "factor \"{name}\" potential has {} entries, expected {rows}x{cols}={expected}",
                potential.len()
            )));
        }
        if potential.iter().any(|&v| v < 0.0 || !v.is_finite()) {
            return Err(DfgError::misshapen(format!(
                "factor \"{name}\" potential has a negative or non-finite entry"
            )));
        }
        let pseudocounts = match pseudocounts {
            Some(p) if p.len() == expected => p,
            Some(p) => {
                return Err(DfgError::misshapen(format!(
                    "factor \"{name}\" pseudocounts have {} entries, expected {expected}",
                    p.len()
                )));
            }
            None => vec![0.0; expected],
        };

        check_normalized(&name, family, rows, cols, &potential)?;

        Ok(Self {
            name,
            family,
            rows,
            cols,
            potential,
            pseudocounts,
            counts: vec![0.0; expected],
            dirty: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn family(&self) -> FactorFamily {
        self.family
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn potential(&self) -> FactorTable {
        FactorTable {
            rows: self.rows,
            cols: self.cols,
            data: self.potential.clone(),
        }
    }

    pub fn submit_counts(&mut self, counts: &[f64]) -> DfgResult<()> {
        if counts.len() != self.counts.len() {
            return Err(DfgError::misshapen(format!(
                "factor \"{}\" submitted counts have {} entries, expected {}",
                self.name,
                counts.len(),
                self.counts.len()
            )));
        }
        for (acc, &c) in self.counts.iter_mut().zip(counts) {
            *acc += c;
        }
        self.dirty = true;
        Ok(())
    }

    pub fn clear_counts(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0.0);
        self.dirty = false;
    }

    pub fn optimize(&mut self) -> OptimizeOutcome {
        if !self.dirty {
            return OptimizeOutcome::Unchanged;
        }
        let combined: Vec<f64> = self
            .counts
            .iter()
            .zip(&self.pseudocounts)
            .map(|(&c, &p)| c + p)
            .collect();

        match normalize(self.family, self.rows, self.cols, &combined) {
            Some(normalized) => {
                self.potential = normalized;
                self.dirty = false;
                OptimizeOutcome::Success
            }
            None => OptimizeOutcome::Failure,
        }
    }
}

fn group_sums(family: FactorFamily, rows: usize, cols: usize, data: &[f64]) -> Vec<f64> {
    match family {
        FactorFamily::GlobalNorm => vec![data.iter().sum()],
        FactorFamily::RowNorm => (0..rows)
            .map(|r| (0..cols).map(|c| data[r * cols + c]).sum())
            .collect(),
        FactorFamily::ColumnNorm => (0..cols)
            .map(|c| (0..rows).map(|r| data[r * cols + c]).sum())
            .collect(),
    }
}

fn normalize(family: FactorFamily, rows: usize, cols: usize, data: &[f64]) -> Option<Vec<f64>> {
    let sums = group_sums(family, rows, cols, data);
    if sums.iter().any(|&s| s <= 0.0) {
        return None;
    }
    let mut out = vec![0.0; data.len()];
    match family {
        FactorFamily::GlobalNorm => {
            let total = sums[0];
            for (o, &v) in out.iter_mut().zip(data) {
                *o = v / total;
            }
        }
        FactorFamily::RowNorm => {
            for r in 0..rows {
                for c in 0..cols {
                    out[r * cols + c] = data[r * cols + c] / sums[r];
                }
            }
        }
        FactorFamily::ColumnNorm => {
            for r in 0..rows {
                for c in 0..cols {
                    out[r * cols + c] = data[r * cols + c] / sums[c];
                }
            }
        }
    }
    Some(out)
}

fn check_normalized(
    name: &str,
    family: FactorFamily,
    rows: usize,
    cols: usize,
    data: &[f64],
) -> DfgResult<()> {
    let sums = group_sums(family, rows, cols, data);
    for s in sums {
        if (s - 1.0).abs() > NORMALIZATION_TOLERANCE {
            return Err(DfgError::misshapen(format!(
                "factor \"{name}\" potential does not satisfy its {family:?} normalization contract (group sums to {s})"
            )));
        }
    }
    Ok(())
}

/// A named, ordered collection of factors; the order is part of the
/// external contract, so factors are addressed by stable index
/// everywhere else in the crate.
#[derive(Clone, Debug, Default)]
pub struct FactorSet {
    factors: Vec<Factor>,
}

impl FactorSet {
    pub fn new(factors: Vec<Factor>) -> Self {
        Self { factors }
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn get(&self, index: usize) -> &Factor {
        &self.factors[index]
    }

    pub fn get_mut(&mut self, index: usize) -> &mut Factor {
        &mut self.factors[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Factor> {
        self.factors.iter()
    }

    pub fn potentials(&self) -> Vec<FactorTable> {
        self.factors.iter().map(Factor::potential).collect()
    }

    /// Serializes every factor's current potential table to JSON, in
    /// factor order, for persisting a learned model between runs.
    #[cfg(feature = "serde")]
    pub fn potentials_to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.potentials())
    }

    /// Loads potential tables produced by `potentials_to_json` and
    /// installs them onto the matching factors by position, without
    /// touching accumulated counts.
    #[cfg(feature = "serde")]
    pub fn load_potentials_json(&mut self, json: &str) -> DfgResult<()> {
        let tables: Vec<FactorTable> = serde_json::from_str(json)
            .map_err(|e| DfgError::misshapen(format!("invalid potential JSON: {e}")))?;
        if tables.len() != self.factors.len() {
            return Err(DfgError::misshapen(format!(
                "loaded {} potential tables, expected {}",
                tables.len(),
                self.factors.len()
            )));
        }
        for (factor, table) in self.factors.iter_mut().zip(tables) {
            if table.rows != factor.rows || table.cols != factor.cols {
                return Err(DfgError::misshapen(format!(
                    "loaded potential for factor \"{}\" is {}x{}, expected {}x{}",
                    factor.name, table.rows, table.cols, factor.rows, factor.cols
                )));
            }
            check_normalized(&factor.name, factor.family, factor.rows, factor.cols, &table.data)?;
            factor.potential = table.data;
        }
        Ok(())
    }

    pub fn submit_counts_vec(&mut self, counts: &[Vec<f64>]) -> DfgResult<()> {
        if counts.len() != self.factors.len() {
            return Err(DfgError::misshapen(format!(
                "submitted counts for {} factors, expected {}",
                counts.len(),
                self.factors.len()
            )));
        }
        for (factor, c) in self.factors.iter_mut().zip(counts) {
            factor.submit_counts(c)?;
        }
        Ok(())
    }

    pub fn clear_all(&mut self) {
        self.factors.iter_mut().for_each(Factor::clear_counts);
    }

    /// AND over every factor's outcome, treating `Unchanged` as success.
    pub fn optimize_all(&mut self) -> bool {
        let mut ok = true;
        for factor in self.factors.iter_mut() {
            let outcome = factor.optimize();
            tracing::debug!(factor = factor.name(), ?outcome, "re-estimated factor");
            if matches!(outcome, OptimizeOutcome::Failure) {
                ok = false;
            }
        }
        ok
    }
}
