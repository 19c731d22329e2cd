//! The pure decision rules of groove: tiers, quotas, join codes, vote tallies,
//! queue ordering, and skip thresholds. Nothing in here touches a store.

mod code;
mod config;
mod ledger;
mod quota;
mod skip;
mod state;
mod tier;
mod util;

pub use code::*;
pub use config::*;
pub use ledger::*;
pub use quota::*;
pub use skip::*;
pub use state::*;
pub use tier::*;
pub use util::*;

/// The type used for primary keys in the store.
pub type PrimaryKey = i32;
