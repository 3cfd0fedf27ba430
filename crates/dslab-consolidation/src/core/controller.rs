//! Migration controller running a planning pass.

use std::collections::BTreeSet;
use std::time::Instant;

use rand::RngCore;

use crate::core::clock::PlanningContext;
use crate::core::cluster::Cluster;
use crate::core::config::{PlacementKind, PlannerConfig};
use crate::core::error::Result;
use crate::core::history::{HistoryRecorder, UtilizationSample};
use crate::core::migration::{MigrationDirective, MigrationPlan};
use crate::core::overload::{overload_detector_resolver, OverloadDetector};
use crate::core::placement::bin_packing::BinPackingPlacement;
use crate::core::placement::greedy::GreedyPlacement;
use crate::core::placement::swarm::SwarmPlacement;
use crate::core::placement::{MigrationCandidate, PlacementSettings, VmPlacementStrategy};
use crate::core::snapshot::AllocationSnapshot;
use crate::core::vm_selection::{vm_selection_resolver, VmSelectionPolicy};
use crate::{log_debug, log_error, log_info};

/// Current step of the planning pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlannerPhase {
    Idle,
    OverloadDetection,
    VictimSelection,
    Placement,
    Consolidation,
    Restore,
}

/// Computes migration plans for a cluster.
///
/// A planning pass ([`MigrationController::optimize`]) finds overloaded hosts, evicts VMs from them until they
/// are no longer overloaded, finds new hosts for these VMs and then tries to evacuate the least loaded hosts
/// completely. All placements made during the pass are real allocations on the cluster hosts, so that
/// subsequent decisions see them. The allocation the cluster had before the pass is restored before it returns.
pub struct MigrationController {
    config: PlannerConfig,
    detector: Box<dyn OverloadDetector>,
    vm_selection: Box<dyn VmSelectionPolicy>,
    greedy: GreedyPlacement,
    bin_packing: BinPackingPlacement,
    swarm: SwarmPlacement,
    history: HistoryRecorder,
    phase: PlannerPhase,
    ctx: PlanningContext,
}

impl MigrationController {
    /// Creates controller with overload detector and VM selection policy resolved from the config.
    pub fn new(config: PlannerConfig, ctx: PlanningContext) -> Result<Self> {
        let detector = overload_detector_resolver(&config.overload_detector)?;
        let vm_selection = vm_selection_resolver(&config.vm_selection)?;
        Ok(Self::with_components(config, detector, vm_selection, ctx))
    }

    pub fn with_components(
        config: PlannerConfig,
        detector: Box<dyn OverloadDetector>,
        vm_selection: Box<dyn VmSelectionPolicy>,
        ctx: PlanningContext,
    ) -> Self {
        let settings = PlacementSettings::from_config(&config);
        Self {
            greedy: GreedyPlacement::new(settings.clone(), ctx.child("greedy")),
            bin_packing: BinPackingPlacement::new(settings, ctx.child("bin-packing")),
            swarm: SwarmPlacement::new(&config.swarm, &config.transmission, ctx.child("swarm")),
            config,
            detector,
            vm_selection,
            history: HistoryRecorder::new(),
            phase: PlannerPhase::Idle,
            ctx,
        }
    }

    /// Replaces the random generator of the swarm placement.
    pub fn set_swarm_rng(&mut self, rng: Box<dyn RngCore>) {
        self.swarm.set_rng(rng);
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn detector(&self) -> &dyn OverloadDetector {
        self.detector.as_ref()
    }

    pub fn history(&self) -> &HistoryRecorder {
        &self.history
    }

    pub fn phase(&self) -> PlannerPhase {
        self.phase
    }

    /// Runs a planning pass and returns the migration plan.
    ///
    /// The cluster is left in the state it had before the call. If this is not possible,
    /// [`Error::RestoreFailed`](crate::core::error::Error::RestoreFailed) is returned and the cluster state must
    /// be resynchronized by the caller.
    pub fn optimize(&mut self, cluster: &mut Cluster) -> Result<MigrationPlan> {
        let total_start = Instant::now();

        self.phase = PlannerPhase::OverloadDetection;
        let start = Instant::now();
        let overloaded = self.get_overloaded_hosts(cluster);
        let host_selection_time = start.elapsed().as_secs_f64();
        if !overloaded.is_empty() {
            log_info!(self.ctx, "overloaded hosts: {:?}", overloaded);
        }

        let snapshot = AllocationSnapshot::capture(cluster);

        self.phase = PlannerPhase::VictimSelection;
        let start = Instant::now();
        let candidates = self.get_vms_to_migrate(cluster, &overloaded);
        let vm_selection_time = start.elapsed().as_secs_f64();

        self.phase = PlannerPhase::Placement;
        let start = Instant::now();
        let excluded: BTreeSet<u32> = overloaded.iter().cloned().collect();
        let mut plan = MigrationPlan::new();
        plan.extend(self.place(&candidates, &excluded, cluster, self.config.swarm_threshold_overloaded));
        let vm_reallocation_time = start.elapsed().as_secs_f64();

        self.phase = PlannerPhase::Consolidation;
        let consolidation = self.get_migrations_from_underloaded_hosts(cluster, &overloaded, &plan);
        plan.extend(consolidation);

        self.phase = PlannerPhase::Restore;
        let restored = snapshot.restore(cluster);
        self.phase = PlannerPhase::Idle;
        if let Err(e) = restored {
            log_error!(self.ctx, "planner state corrupted, require full resync: {}", e);
            return Err(e);
        }

        self.history.add_execution_times(
            host_selection_time,
            vm_selection_time,
            vm_reallocation_time,
            total_start.elapsed().as_secs_f64(),
        );
        log_info!(self.ctx, "planned {} migrations", plan.len());
        Ok(plan)
    }

    /// Classifies all hosts and records their utilization.
    fn get_overloaded_hosts(&mut self, cluster: &Cluster) -> Vec<u32> {
        let mut result = Vec::new();
        for host in cluster.hosts() {
            self.history.add_history_entry(UtilizationSample {
                host_id: host.id,
                time: self.ctx.time(),
                cpu_utilization: host.get_cpu_load(),
                metric: self.detector.metric(host),
            });
            if self.detector.is_overloaded(host) {
                result.push(host.id);
            }
        }
        result
    }

    /// Evicts VMs from each overloaded host until it is no longer overloaded or there is nothing to evict.
    fn get_vms_to_migrate(&mut self, cluster: &mut Cluster, overloaded: &[u32]) -> Vec<MigrationCandidate> {
        let mut result = Vec::new();
        for &host_id in overloaded {
            while let Some(vm_id) = self.vm_selection.select_vm(host_id, cluster) {
                let host = match cluster.host_mut(host_id) {
                    Ok(host) => host,
                    Err(_) => break,
                };
                let alloc = match host.release(vm_id) {
                    Some(alloc) => alloc,
                    None => break,
                };
                log_debug!(self.ctx, "vm {} selected for migration from host {}", vm_id, host_id);
                result.push(MigrationCandidate::new(host_id, alloc));
                if !self.detector.is_overloaded(host) {
                    break;
                }
            }
        }
        result
    }

    fn choose_placement(
        &self,
        candidate_count: usize,
        available_hosts: usize,
        swarm_threshold: usize,
    ) -> PlacementKind {
        if candidate_count > swarm_threshold {
            return PlacementKind::Swarm;
        }
        if let Some(ratio) = self.config.bin_packing_ratio {
            if available_hosts > 0 && candidate_count as f64 / available_hosts as f64 >= ratio {
                return PlacementKind::BinPacking;
            }
        }
        self.config.placement
    }

    fn place(
        &mut self,
        candidates: &[MigrationCandidate],
        excluded: &BTreeSet<u32>,
        cluster: &mut Cluster,
        swarm_threshold: usize,
    ) -> Vec<MigrationDirective> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let available_hosts = cluster.hosts().filter(|host| !excluded.contains(&host.id)).count();
        let detector = self.detector.as_ref();
        match self.choose_placement(candidates.len(), available_hosts, swarm_threshold) {
            PlacementKind::Greedy => self.greedy.place(candidates, excluded, cluster, detector),
            PlacementKind::BinPacking => self.bin_packing.place(candidates, excluded, cluster, detector),
            PlacementKind::Swarm => self.swarm.place(candidates, excluded, cluster, detector),
        }
    }

    /// Returns the least loaded host which is not excluded, is neither empty nor full and has no migrations in
    /// progress.
    fn get_underloaded_host(&self, cluster: &Cluster, excluded: &BTreeSet<u32>) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut min_utilization = 1.;
        for host in cluster.hosts() {
            if excluded.contains(&host.id) {
                continue;
            }
            let utilization = host.get_cpu_load();
            if utilization > 0.
                && utilization < min_utilization
                && !cluster.are_all_vms_migrating_out_or_any_vm_migrating_in(host.id)
            {
                min_utilization = utilization;
                result = Some(host.id);
            }
        }
        result
    }

    /// Tries to evacuate underloaded hosts. A host is evacuated only if all its VMs can be placed elsewhere.
    fn get_migrations_from_underloaded_hosts(
        &mut self,
        cluster: &mut Cluster,
        overloaded: &[u32],
        plan: &MigrationPlan,
    ) -> Vec<MigrationDirective> {
        let switched_off: Vec<u32> = cluster
            .hosts()
            .filter(|host| host.is_switched_off())
            .map(|host| host.id)
            .collect();

        let mut excluded_for_selection: BTreeSet<u32> = overloaded.iter().cloned().collect();
        excluded_for_selection.extend(switched_off.iter().cloned());
        excluded_for_selection.extend(plan.target_hosts());

        let mut excluded_for_placement: BTreeSet<u32> = overloaded.iter().cloned().collect();
        excluded_for_placement.extend(switched_off.iter().cloned());

        let host_count = cluster.get_host_count();
        let mut result = Vec::new();
        while excluded_for_selection.len() < host_count {
            let host_id = match self.get_underloaded_host(cluster, &excluded_for_selection) {
                Some(host_id) => host_id,
                None => break,
            };
            log_debug!(self.ctx, "underloaded host: {}", host_id);
            excluded_for_selection.insert(host_id);
            excluded_for_placement.insert(host_id);

            let candidates: Vec<MigrationCandidate> = cluster
                .migratable_vms(host_id)
                .iter()
                .map(|vm| MigrationCandidate::new(host_id, vm.allocation()))
                .collect();
            if candidates.is_empty() {
                continue;
            }

            let directives = self.place(
                &candidates,
                &excluded_for_placement,
                cluster,
                self.config.swarm_threshold_underloaded,
            );
            if directives.len() < candidates.len() {
                log_debug!(
                    self.ctx,
                    "not all vms can be reallocated from host {}, reallocation cancelled",
                    host_id
                );
                for directive in &directives {
                    if let Ok(host) = cluster.host_mut(directive.host_id) {
                        host.release(directive.vm_id);
                    }
                }
                continue;
            }
            excluded_for_selection.extend(directives.iter().map(|d| d.host_id));
            result.extend(directives);
        }
        result
    }
}
