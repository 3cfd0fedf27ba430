//! Per-VM greedy placement.

use std::collections::BTreeSet;

use crate::core::clock::PlanningContext;
use crate::core::cluster::Cluster;
use crate::core::common::{Allocation, AllocationVerdict};
use crate::core::migration::MigrationDirective;
use crate::core::overload::{predict_over_utilized, predict_utilization_after_allocation, OverloadDetector};
use crate::core::placement::{
    candidate_hosts, sort_candidates, MigrationCandidate, PlacementSettings, VmPlacementStrategy,
};
use crate::{log_debug, log_trace, log_warn};

/// Places VMs one by one, largest first by default.
///
/// For each VM the host leading to the minimal increase of power consumption is used. With `best_fit_host`
/// the host with the maximal predicted utilization (below 1.0) is used instead.
pub struct GreedyPlacement {
    settings: PlacementSettings,
    ctx: PlanningContext,
}

impl GreedyPlacement {
    pub fn new(settings: PlacementSettings, ctx: PlanningContext) -> Self {
        Self { settings, ctx }
    }

    /// Returns the most appropriate host for the VM among `hosts` without placing the VM.
    pub fn find_host(
        &self,
        alloc: &Allocation,
        hosts: &[u32],
        cluster: &mut Cluster,
        detector: &dyn OverloadDetector,
    ) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut min_power_diff = f64::MAX;
        let mut max_prediction = 0.;

        for &host_id in hosts {
            let host = match cluster.host_mut(host_id) {
                Ok(host) => host,
                Err(_) => continue,
            };
            if !host.is_suitable_for_vm(alloc) {
                continue;
            }
            if !host.is_switched_off() && predict_over_utilized(host, alloc, detector, Some(self.settings.threshold)) {
                continue;
            }

            if self.settings.best_fit_host {
                let prediction = predict_utilization_after_allocation(host, alloc, detector);
                if prediction < 1. && prediction > max_prediction {
                    max_prediction = prediction;
                    result = Some(host_id);
                }
            } else {
                match (host.get_power_after_allocation(alloc), host.get_power()) {
                    (Ok(after), Ok(before)) => {
                        if after - before < min_power_diff {
                            min_power_diff = after - before;
                            result = Some(host_id);
                        }
                    }
                    (Err(e), _) | (_, Err(e)) => {
                        log_trace!(self.ctx, "host {} skipped for vm {}: {}", host_id, alloc.id, e);
                    }
                }
            }
        }
        result
    }
}

impl VmPlacementStrategy for GreedyPlacement {
    fn place(
        &mut self,
        candidates: &[MigrationCandidate],
        excluded: &BTreeSet<u32>,
        cluster: &mut Cluster,
        detector: &dyn OverloadDetector,
    ) -> Vec<MigrationDirective> {
        let mut directives = Vec::new();
        for candidate in sort_candidates(candidates, self.settings.vm_sort_increasing) {
            // host loads change after every placement
            let hosts = candidate_hosts(cluster, excluded, self.settings.sort_hosts);
            let host_id = match self.find_host(&candidate.alloc, &hosts, cluster, detector) {
                Some(host_id) => host_id,
                None => {
                    log_warn!(self.ctx, "no suitable host for vm {}", candidate.vm_id());
                    continue;
                }
            };
            let verdict = match cluster.host_mut(host_id) {
                Ok(host) => host.allocate(&candidate.alloc),
                Err(_) => AllocationVerdict::HostNotFound,
            };
            if verdict == AllocationVerdict::Success {
                log_debug!(self.ctx, "vm {} allocated to host {}", candidate.vm_id(), host_id);
                directives.push(candidate.directive(host_id));
            } else {
                log_warn!(self.ctx, "vm {} can't be allocated to host {}: {:?}", candidate.vm_id(), host_id, verdict);
            }
        }
        directives
    }
}
