//! Routing resolution
//!
//! Tables either decide directly (route or block) or are queried: the call
//! value is matched exactly, then by longest prefix, then against the
//! table's default entry. Records may jump to another table; jump chains
//! are bounded and fail closed.

mod distribution;
mod errors;
mod plan;
mod resolver;
mod trie;

pub use distribution::{hash_index, pick_weighted, weighted_index, CallAttributes, GatewaySelector};
pub use errors::{RoutingError, RoutingResult};
pub use plan::{plan_route, RoutePlan};
pub use resolver::{Decision, Resolution, Resolver, RoutingSnapshot, MAX_JUMPS};
pub use trie::PrefixTrie;
