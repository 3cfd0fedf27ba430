//! Bin-packing placement: hosts are filled one by one with the subset of VMs chosen by a knapsack solver.

use std::collections::BTreeSet;

use crate::core::clock::PlanningContext;
use crate::core::cluster::Cluster;
use crate::core::common::{Allocation, AllocationVerdict};
use crate::core::host::Host;
use crate::core::migration::MigrationDirective;
use crate::core::overload::OverloadDetector;
use crate::core::placement::{
    candidate_hosts, sort_candidates, MigrationCandidate, PlacementSettings, VmPlacementStrategy,
};
use crate::core::trial::TrialAllocation;
use crate::{log_debug, log_warn};

/// Converts utilization to whole percents. The small offset absorbs the rounding error of float division,
/// e.g. 0.29 * 100 = 28.999999999999996.
fn to_percent(utilization: f64) -> i64 {
    (utilization * 100. + 1e-9).floor() as i64
}

/// Solution of the knapsack problem for a single host.
///
/// The capacity is the free CPU share of the host in percents, the weight of a VM is its CPU request in percents
/// of the host capacity (rounded up). `value(i, w)` is the predicted utilization (in percents) of the host with
/// the best subset of the first `i` VMs fitting into weight `w`, `selection(i, w)` is that subset.
pub struct KnapsackTable {
    capacity: usize,
    weights: Vec<usize>,
    values: Vec<Vec<i64>>,
    selections: Vec<Vec<Vec<usize>>>,
}

impl KnapsackTable {
    /// Fills the table for the host and VMs. Returns `None` if the host has no free CPU.
    ///
    /// A subset is accepted only if it can be placed on the host, the predicted utilization stays below 100% and
    /// the host is not overloaded under `threshold`. All trial placements are removed before returning.
    pub fn solve(
        host: &mut Host,
        allocs: &[&Allocation],
        detector: &dyn OverloadDetector,
        threshold: f64,
    ) -> Option<Self> {
        let total_cpu = host.get_total_cpu() as u64;
        if total_cpu == 0 {
            return None;
        }
        let used = (host.get_allocated_cpu() * 100 / total_cpu) as i64;
        if used >= 100 {
            return None;
        }
        let capacity = (100 - used) as usize;
        let weights: Vec<usize> = allocs
            .iter()
            .map(|alloc| ((alloc.cpu_usage as u64 * 100 + total_cpu - 1) / total_cpu) as usize)
            .collect();

        let n = allocs.len();
        let mut values = vec![vec![0i64; capacity + 1]; n + 1];
        let mut selections = vec![vec![Vec::<usize>::new(); capacity + 1]; n + 1];

        for i in 1..=n {
            let weight = weights[i - 1];
            for w in 0..=capacity {
                values[i][w] = values[i - 1][w];
                selections[i][w] = selections[i - 1][w].clone();
                if weight > w {
                    continue;
                }
                let base = &selections[i - 1][w - weight];
                let mut subset: Vec<&Allocation> = base.iter().map(|&idx| allocs[idx]).collect();
                subset.push(allocs[i - 1]);
                let prediction = match TrialAllocation::acquire(host, &subset) {
                    Some(trial) => {
                        if detector.is_overloaded_with_threshold(&trial, threshold) {
                            continue;
                        }
                        to_percent(detector.predict_utilization(&trial))
                    }
                    None => continue,
                };
                if prediction < 100 && prediction > values[i - 1][w] {
                    values[i][w] = prediction;
                    let mut selection = base.clone();
                    selection.push(i - 1);
                    selections[i][w] = selection;
                }
            }
        }

        Some(Self {
            capacity,
            weights,
            values,
            selections,
        })
    }

    /// Free CPU share of the host in percents.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_count(&self) -> usize {
        self.weights.len()
    }

    pub fn weight(&self, item: usize) -> usize {
        self.weights[item]
    }

    pub fn value(&self, i: usize, w: usize) -> i64 {
        self.values[i][w]
    }

    /// Indices of the VMs selected among the first `i` VMs for weight `w`.
    pub fn selection(&self, i: usize, w: usize) -> &[usize] {
        &self.selections[i][w]
    }

    /// Total weight of the selected VMs.
    pub fn selection_weight(&self, i: usize, w: usize) -> usize {
        self.selections[i][w].iter().map(|&idx| self.weights[idx]).sum()
    }

    /// Indices of the VMs which should be placed on the host.
    pub fn best_selection(&self) -> &[usize] {
        self.selection(self.item_count(), self.capacity)
    }
}

/// Processes hosts in descending order of utilization and fills each one with the best subset of the remaining
/// VMs. VMs are considered in ascending order of requested CPU.
pub struct BinPackingPlacement {
    settings: PlacementSettings,
    ctx: PlanningContext,
}

impl BinPackingPlacement {
    pub fn new(settings: PlacementSettings, ctx: PlanningContext) -> Self {
        Self { settings, ctx }
    }
}

impl VmPlacementStrategy for BinPackingPlacement {
    fn place(
        &mut self,
        candidates: &[MigrationCandidate],
        excluded: &BTreeSet<u32>,
        cluster: &mut Cluster,
        detector: &dyn OverloadDetector,
    ) -> Vec<MigrationDirective> {
        let mut directives = Vec::new();
        let mut remaining = sort_candidates(candidates, true);

        for host_id in candidate_hosts(cluster, excluded, true) {
            if remaining.is_empty() {
                break;
            }
            let host = match cluster.host_mut(host_id) {
                Ok(host) => host,
                Err(_) => continue,
            };
            let allocs: Vec<&Allocation> = remaining.iter().map(|c| &c.alloc).collect();
            let selected: Vec<usize> = match KnapsackTable::solve(host, &allocs, detector, self.settings.threshold) {
                Some(table) => table.best_selection().to_vec(),
                None => continue,
            };

            let mut placed = BTreeSet::new();
            for idx in selected {
                let candidate = &remaining[idx];
                match host.allocate(&candidate.alloc) {
                    AllocationVerdict::Success => {
                        log_debug!(self.ctx, "vm {} allocated to host {}", candidate.vm_id(), host_id);
                        directives.push(candidate.directive(host_id));
                        placed.insert(idx);
                    }
                    verdict => {
                        log_warn!(
                            self.ctx,
                            "vm {} can't be allocated to host {}: {:?}",
                            candidate.vm_id(),
                            host_id,
                            verdict
                        );
                    }
                }
            }
            remaining = remaining
                .into_iter()
                .enumerate()
                .filter(|(idx, _)| !placed.contains(idx))
                .map(|(_, c)| c)
                .collect();
        }

        for candidate in &remaining {
            log_warn!(self.ctx, "no suitable host for vm {}", candidate.vm_id());
        }
        directives
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::overload::StaticThreshold;
    use crate::core::power_model::LinearPowerModel;

    fn alloc(id: u32, cpu_usage: u32) -> Allocation {
        Allocation {
            id,
            cpu_usage,
            memory_usage: 1,
            bandwidth_usage: 0,
        }
    }

    #[test]
    fn test_to_percent() {
        assert_eq!(to_percent(0.29), 29);
        assert_eq!(to_percent(0.9), 90);
        assert_eq!(to_percent(0.999), 99);
    }

    #[test]
    fn test_full_host_is_skipped() {
        let mut host = Host::new(0, "h", 100, 100, 100, Box::new(LinearPowerModel::new(1., 2.)));
        host.allocate(&alloc(0, 100));
        let detector = StaticThreshold::new(1.);
        assert!(KnapsackTable::solve(&mut host, &[&alloc(1, 10)], &detector, 1.).is_none());
    }

    #[test]
    fn test_weights_are_rounded_up() {
        let mut host = Host::new(0, "h", 300, 100, 100, Box::new(LinearPowerModel::new(1., 2.)));
        host.allocate(&alloc(0, 100));
        let detector = StaticThreshold::new(1.);
        let (a, b) = (alloc(1, 10), alloc(2, 31));
        let table = KnapsackTable::solve(&mut host, &[&a, &b], &detector, 1.).unwrap();
        assert_eq!(table.capacity(), 67);
        assert_eq!(table.weight(0), 4);
        assert_eq!(table.weight(1), 11);
        assert_eq!(host.vm_count(), 1);
    }
}
