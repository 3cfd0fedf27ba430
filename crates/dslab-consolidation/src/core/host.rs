//! Physical host state.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use crate::core::common::{Allocation, AllocationVerdict};
use crate::core::error::Result;
use crate::core::power_model::CpuPowerModel;

/// Stores host properties (resource capacity) and state (available resources, current allocations).
///
/// CPU can be overcommitted by [`Host::allocate`], as with a CPU-oversubscribing VM scheduler: the host then
/// runs at CPU utilization above 1.0 which is exactly what makes it overloaded. Memory and bandwidth are never
/// overcommitted. [`Host::can_allocate`] checks all resources strictly.
#[derive(Clone)]
pub struct Host {
    pub id: u32,
    pub name: String,

    cpu_total: u32,
    memory_total: u64,
    bandwidth_total: u64,

    cpu_allocated: u64,
    memory_available: u64,
    bandwidth_available: u64,

    allocations: BTreeMap<u32, Allocation>,
    migrating_in: BTreeMap<u32, Allocation>,
    utilization_history: Vec<f64>,
    power_model: Box<dyn CpuPowerModel>,
}

impl Host {
    /// Creates empty host with specified capacity.
    pub fn new(
        id: u32,
        name: &str,
        cpu_total: u32,
        memory_total: u64,
        bandwidth_total: u64,
        power_model: Box<dyn CpuPowerModel>,
    ) -> Self {
        Self {
            id,
            name: name.to_string(),
            cpu_total,
            memory_total,
            bandwidth_total,
            cpu_allocated: 0,
            memory_available: memory_total,
            bandwidth_available: bandwidth_total,
            allocations: BTreeMap::new(),
            migrating_in: BTreeMap::new(),
            utilization_history: Vec::new(),
            power_model,
        }
    }

    /// Checks if the specified allocation currently fits into free host resources.
    pub fn can_allocate(&self, alloc: &Allocation) -> AllocationVerdict {
        if self.allocations.contains_key(&alloc.id) {
            return AllocationVerdict::AlreadyAllocated;
        }
        if self.get_available_cpu() < alloc.cpu_usage as u64 {
            return AllocationVerdict::NotEnoughCPU;
        }
        if self.memory_available < alloc.memory_usage {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.bandwidth_available < alloc.bandwidth_usage {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        AllocationVerdict::Success
    }

    /// Returns true if the host has enough free resources of every kind to run the VM.
    pub fn is_suitable_for_vm(&self, alloc: &Allocation) -> bool {
        self.can_allocate(alloc) == AllocationVerdict::Success
    }

    /// Places the VM on the host. CPU may be overcommitted, memory and bandwidth may not.
    pub fn allocate(&mut self, alloc: &Allocation) -> AllocationVerdict {
        if self.allocations.contains_key(&alloc.id) {
            return AllocationVerdict::AlreadyAllocated;
        }
        if self.memory_available < alloc.memory_usage {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.bandwidth_available < alloc.bandwidth_usage {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        self.cpu_allocated += alloc.cpu_usage as u64;
        self.memory_available -= alloc.memory_usage;
        self.bandwidth_available -= alloc.bandwidth_usage;
        self.allocations.insert(alloc.id, alloc.clone());
        AllocationVerdict::Success
    }

    /// Removes the VM from the host and returns its allocation, if the VM was placed here.
    pub fn release(&mut self, vm_id: u32) -> Option<Allocation> {
        let alloc = self.allocations.remove(&vm_id)?;
        self.cpu_allocated -= alloc.cpu_usage as u64;
        self.memory_available += alloc.memory_usage;
        self.bandwidth_available += alloc.bandwidth_usage;
        Some(alloc)
    }

    /// Removes all VMs from the host. VMs migrating in are remembered and can be restored with
    /// [`Host::reallocate_migrating_in_vms`].
    pub fn release_all(&mut self) {
        self.allocations.clear();
        self.cpu_allocated = 0;
        self.memory_available = self.memory_total;
        self.bandwidth_available = self.bandwidth_total;
    }

    /// Places again the VMs which are currently migrating to this host.
    pub fn reallocate_migrating_in_vms(&mut self) {
        let migrating_in: Vec<Allocation> = self.migrating_in.values().cloned().collect();
        for alloc in migrating_in {
            if !self.allocations.contains_key(&alloc.id) {
                self.cpu_allocated += alloc.cpu_usage as u64;
                self.memory_available = self.memory_available.saturating_sub(alloc.memory_usage);
                self.bandwidth_available = self.bandwidth_available.saturating_sub(alloc.bandwidth_usage);
                self.allocations.insert(alloc.id, alloc);
            }
        }
    }

    /// Places the VM on the host and marks it as migrating in.
    pub fn add_migrating_in_vm(&mut self, alloc: &Allocation) -> AllocationVerdict {
        let verdict = self.allocate(alloc);
        if verdict == AllocationVerdict::Success {
            self.migrating_in.insert(alloc.id, alloc.clone());
        }
        verdict
    }

    /// Called when incoming migration of the VM is finished, the VM stays on the host.
    pub fn remove_migrating_in_vm(&mut self, vm_id: u32) {
        self.migrating_in.remove(&vm_id);
    }

    /// Returns true if the VM is currently migrating to this host.
    pub fn is_migrating_in(&self, vm_id: u32) -> bool {
        self.migrating_in.contains_key(&vm_id)
    }

    /// Returns IDs of VMs currently migrating to this host.
    pub fn vms_migrating_in(&self) -> BTreeSet<u32> {
        self.migrating_in.keys().cloned().collect()
    }

    /// Returns IDs of all VMs placed on the host.
    pub fn vms(&self) -> BTreeSet<u32> {
        self.allocations.keys().cloned().collect()
    }

    pub fn has_vm(&self, vm_id: u32) -> bool {
        self.allocations.contains_key(&vm_id)
    }

    pub fn allocations(&self) -> impl Iterator<Item = &Allocation> {
        self.allocations.values()
    }

    pub fn vm_count(&self) -> usize {
        self.allocations.len()
    }

    /// Returns the total CPU capacity in MIPS.
    pub fn get_total_cpu(&self) -> u32 {
        self.cpu_total
    }

    pub fn get_total_memory(&self) -> u64 {
        self.memory_total
    }

    pub fn get_total_bandwidth(&self) -> u64 {
        self.bandwidth_total
    }

    /// Returns the amount of MIPS not requested by any VM (zero if CPU is overcommitted).
    pub fn get_available_cpu(&self) -> u64 {
        (self.cpu_total as u64).saturating_sub(self.cpu_allocated)
    }

    pub fn get_available_memory(&self) -> u64 {
        self.memory_available
    }

    pub fn get_available_bandwidth(&self) -> u64 {
        self.bandwidth_available
    }

    /// Returns MIPS requested by all VMs placed on the host.
    pub fn get_allocated_cpu(&self) -> u64 {
        self.cpu_allocated
    }

    /// Returns the ratio of requested to total MIPS. Exceeds 1.0 when CPU is overcommitted.
    pub fn get_cpu_load(&self) -> f64 {
        self.cpu_allocated as f64 / self.cpu_total as f64
    }

    /// Returns the CPU load the host would have if the VM was placed on it.
    pub fn get_cpu_load_after_allocation(&self, alloc: &Allocation) -> f64 {
        (self.cpu_allocated + alloc.cpu_usage as u64) as f64 / self.cpu_total as f64
    }

    /// Host without VMs is considered switched off.
    pub fn is_switched_off(&self) -> bool {
        self.cpu_allocated == 0
    }

    pub fn power_model(&self) -> &dyn CpuPowerModel {
        self.power_model.as_ref()
    }

    /// Returns the current power consumption in W.
    pub fn get_power(&self) -> Result<f64> {
        self.power_model.get_power(self.get_cpu_load())
    }

    /// Returns the power consumption the host would have if the VM was placed on it.
    pub fn get_power_after_allocation(&self, alloc: &Allocation) -> Result<f64> {
        self.power_model.get_power(self.get_cpu_load_after_allocation(alloc))
    }

    /// Appends a CPU utilization observation, fed by the runtime that executes the VMs.
    pub fn record_utilization(&mut self, utilization: f64) {
        self.utilization_history.push(utilization);
    }

    /// Returns CPU utilization observations, the oldest first.
    pub fn utilization_history(&self) -> &[f64] {
        &self.utilization_history
    }
}
