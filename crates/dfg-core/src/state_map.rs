//! Bidirectional mapping between human-readable symbols and internal
//! integer states, including meta-symbols that denote a set of basic
//! states (degeneracy). The tensor-power constructor builds the n-fold
//! Cartesian product of an alphabet with itself, for multi-column
//! multi-state alphabets.

use dfg_error::{DfgError, DfgResult};
use std::collections::{BTreeMap, HashMap};

/// A multi-state map whose composite degeneracy table would need more
/// than this many entries fails fast rather than allocating it.
pub const MAX_ALPHABET_ENTRIES: usize = 100_000;

#[derive(Clone, Debug)]
pub struct StateMap {
    name: String,
    symbol_size: usize,
    /// symbols[state] for state in 0..meta_state_count; basic states come
    /// first, meta-states after.
    symbols: Vec<String>,
    symbol_to_state: HashMap<String, usize>,
    /// degeneracy[state] = sorted, deduplicated basic state indices the
    /// (possibly meta) state resolves to.
    degeneracy: Vec<Vec<usize>>,
    state_count: usize,
    meta_state_count: usize,
}

impl StateMap {
    /// Build from an ordered list of basic symbols plus an optional map
    /// from meta-symbol to the basic symbols it denotes.
    pub fn new(
        name: impl Into<String>,
        basic_symbols: Vec<String>,
        meta_symbols: BTreeMap<String, Vec<String>>,
    ) -> DfgResult<Self> {
        let name = name.into();
        if basic_symbols.is_empty() {
            return Err(DfgError::misshapen(format!(
                "state map \"{name}\" has an empty basic alphabet"
            )));
        }
        let symbol_size = basic_symbols[0].len();
        if symbol_size == 0 || basic_symbols.iter().any(|s| s.len() != symbol_size) {
            return Err(DfgError::misshapen(format!(
                "state map \"{name}\" requires uniform, non-empty symbol length"
            )));
        }

        let state_count = basic_symbols.len();
        let mut symbol_to_state = HashMap::with_capacity(state_count + meta_symbols.len());
        for (i, s) in basic_symbols.iter().enumerate() {
            if symbol_to_state.insert(s.clone(), i).is_some() {
                return Err(DfgError::misshapen(format!(
                    "state map \"{name}\" has duplicate basic symbol \"{s}\""
                )));
            }
        }

        let mut symbols = basic_symbols;
        let mut degeneracy: Vec<Vec<usize>> = (0..state_count).map(|i| vec![i]).collect();

        for (meta_symbol, members) in meta_symbols {
            if meta_symbol.len() != symbol_size {
                return Err(DfgError::misshapen(format!(
                    "meta-symbol \"{meta_symbol}\" in state map \"{name}\" has the wrong symbol length"
                )));
            }
            if members.is_empty() {
                return Err(DfgError::misshapen(format!(
                    "meta-symbol \"{meta_symbol}\" in state map \"{name}\" has an empty degeneracy vector"
                )));
            }
            let mut resolved = Vec::with_capacity(members.len());
            for m in &members {
                let &idx = symbol_to_state.get(m).ok_or_else(|| {
                    DfgError::misshapen(format!(
                        "meta-symbol \"{meta_symbol}\" in state map \"{name}\" names \"{m}\", which is not a basic symbol of the same map"
                    ))
                })?;
                // `idx` must be a *basic* state. Checking presence in
                // `symbol_to_state` alone isn't enough: meta-symbols are
                // inserted into that same map as they're processed, so an
                // earlier meta-symbol (by iteration order) would otherwise
                // look like a valid member here, letting meta-symbols be
                // defined in terms of each other.
                if idx >= state_count {
                    return Err(DfgError::misshapen(format!(
                        "meta-symbol \"{meta_symbol}\" in state map \"{name}\" names \"{m}\", which is itself a meta-symbol, not a basic symbol"
                    )));
                }
                resolved.push(idx);
            }
            resolved.sort_unstable();
            resolved.dedup();

            let state = symbols.len();
            if symbol_to_state.insert(meta_symbol.clone(), state).is_some() {
                return Err(DfgError::misshapen(format!(
                    "state map \"{name}\" has duplicate symbol \"{meta_symbol}\""
                )));
            }
            symbols.push(meta_symbol);
            degeneracy.push(resolved);
        }

        let meta_state_count = symbols.len();
        Ok(Self {
            name,
            symbol_size,
            symbols,
            symbol_to_state,
            degeneracy,
            state_count,
            meta_state_count,
        })
    }

    /// The n-fold Cartesian (tensor) power of `base`. A composite symbol
    /// is basic only if every one of its n positions is a basic symbol of
    /// `base`; otherwise it is a meta-symbol whose degeneracy vector is
    /// the Cartesian product of the per-position degeneracies.
    pub fn tensor_power(base: &StateMap, n: usize) -> DfgResult<Self> {
        if n == 0 {
            return Err(DfgError::misshapen("tensor power requires multiplicity >= 1"));
        }
        let radix = base.meta_state_count;
        let total = checked_pow(radix, n, MAX_ALPHABET_ENTRIES + 1).ok_or_else(|| {
            DfgError::AlphabetTooLarge {
                requested: usize::MAX,
                cap: MAX_ALPHABET_ENTRIES,
            }
        })?;
        if total > MAX_ALPHABET_ENTRIES {
            return Err(DfgError::AlphabetTooLarge {
                requested: total,
                cap: MAX_ALPHABET_ENTRIES,
            });
        }
        let basic_radix = base.state_count;

        // Enumerate basic tuples first (every position < basic_radix), so
        // their composite indices land in 0..state_count, then meta
        // tuples (at least one position >= basic_radix).
        let mut basic_tuples = Vec::new();
        let mut meta_tuples = Vec::new();
        for idx in 0..total {
            let digits = unrank(idx, radix, n);
            if digits.iter().all(|&d| d < basic_radix) {
                basic_tuples.push(digits);
            } else {
                meta_tuples.push(digits);
            }
        }

        let mut symbols = Vec::with_capacity(total);
        let mut symbol_to_state = HashMap::with_capacity(total);
        let mut degeneracy = Vec::with_capacity(total);

        for digits in &basic_tuples {
            let state = symbols.len();
            let symbol: String = digits.iter().map(|&d| base.symbols[d].as_str()).collect();
            symbol_to_state.insert(symbol.clone(), state);
            symbols.push(symbol);
            degeneracy.push(vec![state]);
        }
        let state_count = symbols.len();

        for digits in &meta_tuples {
            let symbol: String = digits.iter().map(|&d| base.symbols[d].as_str()).collect();
            let per_position: Vec<&[usize]> = digits
                .iter()
                .map(|&d| base.degeneracy[d].as_slice())
                .collect();
            let mut resolved = Vec::new();
            for combo in cartesian(&per_position) {
                resolved.push(rank(&combo, basic_radix));
            }
            resolved.sort_unstable();
            resolved.dedup();

            let state = symbols.len();
            symbol_to_state.insert(symbol.clone(), state);
            symbols.push(symbol);
            degeneracy.push(resolved);
        }

        Ok(Self {
            name: format!("{}^{}", base.name, n),
            symbol_size: base.symbol_size * n,
            symbols,
            symbol_to_state,
            degeneracy,
            state_count,
            meta_state_count: total,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn symbol_size(&self) -> usize {
        self.symbol_size
    }

    pub fn state_count(&self) -> usize {
        self.state_count
    }

    pub fn meta_state_count(&self) -> usize {
        self.meta_state_count
    }

    pub fn state_of(&self, symbol: &str) -> DfgResult<usize> {
        self.symbol_to_state
            .get(symbol)
            .copied()
            .ok_or_else(|| DfgError::unknown_symbol(symbol, &self.name))
    }

    pub fn symbol_of(&self, state: usize) -> DfgResult<&str> {
        self.symbols
            .get(state)
            .map(|s| s.as_str())
            .ok_or_else(|| DfgError::unknown_symbol(format!("<state {state}>"), &self.name))
    }

    /// The basic symbols a (possibly meta) symbol resolves to.
    pub fn degeneracy_of(&self, symbol: &str) -> DfgResult<Vec<&str>> {
        let state = self.state_of(symbol)?;
        Ok(self.degeneracy[state]
            .iter()
            .map(|&i| self.symbols[i].as_str())
            .collect())
    }

    /// The basic state indices a (possibly meta) state resolves to.
    pub fn degeneracy_states(&self, state: usize) -> &[usize] {
        &self.degeneracy[state]
    }
}

fn checked_pow(base: usize, exp: usize, cap: usize) -> Option<usize> {
    let mut acc: usize = 1;
    for _ in 0..exp {
        acc = acc.checked_mul(base)?;
        if acc > cap {
            return Some(acc); // still a real value, just over the cap; caller compares to MAX
        }
    }
    Some(acc)
}

fn unrank(mut idx: usize, radix: usize, n: usize) -> Vec<usize> {
    let mut digits = vec![0usize; n];
    for d in digits.iter_mut().rev() {
        *d = idx % radix;
        idx /= radix;
    }
    digits
}

fn rank(digits: &[usize], radix: usize) -> usize {
    digits.iter().fold(0usize, |acc, &d| acc * radix + d)
}

fn cartesian(slices: &[&[usize]]) -> Vec<Vec<usize>> {
    let mut out = vec![Vec::new()];
    for &s in slices {
        let mut next = Vec::with_capacity(out.len() * s.len());
        for prefix in &out {
            for &v in s {
                let mut p = prefix.clone();
                p.push(v);
                next.push(p);
            }
        }
        out = next;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dna() -> StateMap {
        let mut meta = BTreeMap::new();
        meta.insert(
            "N".to_string(),
            vec!["A".into(), "C".into(), "G".into(), "T".into()],
        );
        StateMap::new(
            "nucleotide",
            vec!["A".into(), "C".into(), "G".into(), "T".into()],
            meta,
        )
        .unwrap()
    }

    #[test]
    fn round_trip_symbol_state() {
        let m = dna();
        for s in ["A", "C", "G", "T"] {
            let state = m.state_of(s).unwrap();
            assert_eq!(m.symbol_of(state).unwrap(), s);
        }
    }

    #[test]
    fn meta_symbol_degeneracy() {
        let m = dna();
        let mut deg = m.degeneracy_of("N").unwrap();
        deg.sort_unstable();
        assert_eq!(deg, vec!["A", "C", "G", "T"]);
    }

    #[test]
    fn unknown_symbol_fails() {
        let m = dna();
        assert!(m.state_of("Z").is_err());
    }

    #[test]
    fn duplicate_basic_symbol_rejected() {
        let err = StateMap::new(
            "bad",
            vec!["A".into(), "A".into()],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), dfg_error::ErrorKind::Misshapen);
    }

    #[test]
    fn meta_symbol_referencing_meta_symbol_rejected() {
        let mut meta = BTreeMap::new();
        meta.insert("N".to_string(), vec!["A".into(), "C".into()]);
        meta.insert("M".to_string(), vec!["N".into()]);
        let err = StateMap::new(
            "bad",
            vec!["A".into(), "C".into()],
            meta,
        )
        .unwrap_err();
        assert_eq!(err.kind(), dfg_error::ErrorKind::Misshapen);
    }

    #[test]
    fn meta_symbol_referencing_earlier_meta_symbol_rejected() {
        // "N" sorts before "Z" in the BTreeMap's key order, so "N" is
        // already present in the symbol table by the time "Z" is
        // processed — this must still be rejected, not silently resolved
        // as if "N" were a basic symbol.
        let mut meta = BTreeMap::new();
        meta.insert("N".to_string(), vec!["A".into(), "C".into()]);
        meta.insert("Z".to_string(), vec!["N".into()]);
        let err = StateMap::new(
            "bad",
            vec!["A".into(), "C".into()],
            meta,
        )
        .unwrap_err();
        assert_eq!(err.kind(), dfg_error::ErrorKind::Misshapen);
    }

    #[test]
    fn tensor_power_basic_states_round_trip() {
        let base = dna();
        let sq = StateMap::tensor_power(&base, 2).unwrap();
        assert_eq!(sq.state_count(), 16);
        assert_eq!(sq.symbol_size(), 2);
        let state = sq.state_of("AC").unwrap();
        assert_eq!(sq.symbol_of(state).unwrap(), "AC");
        assert_eq!(sq.degeneracy_states(state), &[state]);
    }

    #[test]
    fn tensor_power_meta_state_is_product_of_degeneracies() {
        let base = dna();
        let sq = StateMap::tensor_power(&base, 2).unwrap();
        // "NA" denotes {A,C,G,T} x {A} = AA, CA, GA, TA
        let state = sq.state_of("NA").unwrap();
        let mut symbols: Vec<&str> = sq
            .degeneracy_states(state)
            .iter()
            .map(|&s| sq.symbol_of(s).unwrap())
            .collect();
        symbols.sort_unstable();
        assert_eq!(symbols, vec!["AA", "CA", "GA", "TA"]);
    }

    #[test]
    fn tensor_power_guards_against_huge_alphabets() {
        let mut basic = Vec::new();
        for i in 0..50u32 {
            basic.push(format!("{:02}", i));
        }
        let base = StateMap::new("big", basic, BTreeMap::new()).unwrap();
        let err = StateMap::tensor_power(&base, 4).unwrap_err(); // 50^4 = 6,250,000
        assert_eq!(err.kind(), dfg_error::ErrorKind::AlphabetTooLarge);
    }
}
