//! Strategies finding new hosts for migrated VMs.

pub mod bin_packing;
pub mod energy;
pub mod greedy;
pub mod swarm;

use std::collections::BTreeSet;

use crate::core::cluster::Cluster;
use crate::core::common::Allocation;
use crate::core::config::PlannerConfig;
use crate::core::migration::MigrationDirective;
use crate::core::overload::{predict_over_utilized, OverloadDetector};

/// VM which should be moved from its current host.
#[derive(Clone, Debug, PartialEq)]
pub struct MigrationCandidate {
    pub source_host: u32,
    pub alloc: Allocation,
}

impl MigrationCandidate {
    pub fn new(source_host: u32, alloc: Allocation) -> Self {
        Self { source_host, alloc }
    }

    pub fn vm_id(&self) -> u32 {
        self.alloc.id
    }

    pub fn directive(&self, host_id: u32) -> MigrationDirective {
        MigrationDirective::new(self.alloc.id, self.source_host, host_id)
    }
}

/// Trait for implementation of VM placement strategies.
///
/// The strategy places candidates on hosts not present in `excluded` and returns the directives for the placed
/// VMs in placement order. Placements are real allocations: they stay on the hosts until the planner restores
/// the cluster state. Candidates which can't be placed are omitted from the result.
pub trait VmPlacementStrategy {
    fn place(
        &mut self,
        candidates: &[MigrationCandidate],
        excluded: &BTreeSet<u32>,
        cluster: &mut Cluster,
        detector: &dyn OverloadDetector,
    ) -> Vec<MigrationDirective>;
}

/// Parameters shared by placement strategies.
#[derive(Clone, Debug)]
pub struct PlacementSettings {
    /// Utilization a non-empty target host may not exceed after placement.
    pub threshold: f64,
    pub sort_hosts: bool,
    pub vm_sort_increasing: bool,
    pub best_fit_host: bool,
}

impl PlacementSettings {
    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            threshold: config.placement_threshold,
            sort_hosts: config.sort_hosts,
            vm_sort_increasing: config.vm_sort_increasing,
            best_fit_host: config.best_fit_host,
        }
    }
}

impl Default for PlacementSettings {
    fn default() -> Self {
        Self::from_config(&PlannerConfig::default())
    }
}

/// Returns IDs of non-excluded hosts, optionally sorted by CPU load in descending order.
/// Hosts with equal load keep ascending ID order.
pub fn candidate_hosts(cluster: &Cluster, excluded: &BTreeSet<u32>, sort_by_load: bool) -> Vec<u32> {
    let mut hosts: Vec<(u32, f64)> = cluster
        .hosts()
        .filter(|host| !excluded.contains(&host.id))
        .map(|host| (host.id, host.get_cpu_load()))
        .collect();
    if sort_by_load {
        hosts.sort_by(|a, b| b.1.total_cmp(&a.1));
    }
    hosts.into_iter().map(|(id, _)| id).collect()
}

/// Returns candidates ordered by requested CPU, ascending or descending. Equal requests keep the input order.
pub fn sort_candidates(candidates: &[MigrationCandidate], increasing: bool) -> Vec<MigrationCandidate> {
    let mut sorted = candidates.to_vec();
    if increasing {
        sorted.sort_by_key(|c| c.alloc.cpu_usage);
    } else {
        sorted.sort_by_key(|c| std::cmp::Reverse(c.alloc.cpu_usage));
    }
    sorted
}

/// Returns non-excluded hosts which can take every candidate: each one must fit into free resources and,
/// unless the host is empty, must not make it overloaded by the detector's own cutoff.
pub fn useful_hosts(
    candidates: &[MigrationCandidate],
    excluded: &BTreeSet<u32>,
    cluster: &mut Cluster,
    detector: &dyn OverloadDetector,
) -> Vec<u32> {
    let mut result = Vec::new();
    for host in cluster.hosts_mut() {
        if excluded.contains(&host.id) {
            continue;
        }
        let suitable = candidates.iter().all(|c| {
            host.is_suitable_for_vm(&c.alloc)
                && (host.is_switched_off() || !predict_over_utilized(host, &c.alloc, detector, None))
        });
        if suitable {
            result.push(host.id);
        }
    }
    result
}
