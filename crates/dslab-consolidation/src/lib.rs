//! Dynamic VM consolidation planner.
//!
//! Given the current state of a cluster the planner detects overloaded hosts, selects VMs to evict from them,
//! finds new hosts for these VMs and tries to evacuate lightly loaded hosts so that they can be switched off.
//! The result of a planning pass is a [`MigrationPlan`](crate::core::migration::MigrationPlan), the cluster
//! state itself is restored before the pass returns.

pub mod core;
pub mod log;

pub use colored;
