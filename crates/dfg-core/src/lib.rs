//! Discrete factor graph representation and exact inference: sum-product,
//! max-product, and EM-style potential re-estimation over bipartite
//! variable/factor trees.

pub mod dfg;
pub mod dfg_info;
pub mod factor;
pub mod learn;
pub mod state_map;
pub mod state_mask;

pub mod random_provider;

pub use dfg::{Dfg, MaxProduct, SumProduct};
pub use dfg_info::DfgInfo;
pub use factor::{Factor, FactorFamily, FactorSet, FactorTable, OptimizeOutcome};
pub use learn::{run_em, DataRow, EmConfig, EmOutcome};
pub use state_map::StateMap;
pub use state_mask::{StateMask, StateMaskMap, StateMaskMapSet};

pub use dfg_error::{DfgError, DfgResult, ErrorKind, ResultExt};
