//! Team balancing
//!
//! Enumerates the ways a full lobby can be split into two teams, scores each
//! split by predicted match quality, and picks among the best ones.

pub mod balancer;
pub mod partition;
pub mod scorer;

pub use balancer::Balancer;
pub use partition::{partition_count, PartitionEnumerator};
pub use scorer::BalanceScorer;
