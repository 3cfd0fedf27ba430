//! Cluster state: hosts and the VMs placed on them.

use std::collections::BTreeMap;

use crate::core::common::AllocationVerdict;
use crate::core::error::{Error, Result};
use crate::core::host::Host;
use crate::core::migration::MigrationPlan;
use crate::core::power_model::CpuPowerModel;
use crate::core::vm::VirtualMachine;

/// Stores all hosts and VMs of the cluster.
///
/// This is the state the planner works on. The planner requires exclusive access to it for the duration of a
/// planning pass, which is expressed by taking `&mut Cluster`. Callers which need to plan concurrently with
/// other mutations should clone the cluster and plan on the copy.
#[derive(Clone, Default)]
pub struct Cluster {
    hosts: BTreeMap<u32, Host>,
    vms: BTreeMap<u32, VirtualMachine>,
    next_host_id: u32,
    next_vm_id: u32,
}

impl Cluster {
    /// Creates empty cluster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds new host and returns its ID.
    pub fn add_host(
        &mut self,
        name: &str,
        cpu_total: u32,
        memory_total: u64,
        bandwidth_total: u64,
        power_model: Box<dyn CpuPowerModel>,
    ) -> u32 {
        let id = self.next_host_id;
        self.next_host_id += 1;
        self.hosts.insert(
            id,
            Host::new(id, name, cpu_total, memory_total, bandwidth_total, power_model),
        );
        id
    }

    /// Creates new VM and places it on the specified host, returns VM ID.
    ///
    /// CPU of the host may be overcommitted (this is how overloaded hosts appear), other resources may not.
    pub fn spawn_vm(&mut self, cpu_usage: u32, memory_usage: u64, bandwidth_usage: u64, host_id: u32) -> Result<u32> {
        let id = self.next_vm_id;
        let vm = VirtualMachine::new(id, cpu_usage, memory_usage, bandwidth_usage);
        let host = self.hosts.get_mut(&host_id).ok_or(Error::HostNotFound(host_id))?;
        match host.allocate(&vm.allocation()) {
            AllocationVerdict::Success => {
                self.next_vm_id += 1;
                self.vms.insert(id, vm);
                Ok(id)
            }
            _ => Err(Error::AllocationFailed { vm_id: id, host_id }),
        }
    }

    /// Starts live migration of the VM: the VM is placed on the target host as migrating in
    /// while it keeps running on the source host.
    pub fn start_migration(&mut self, vm_id: u32, target_host: u32) -> Result<AllocationVerdict> {
        let vm = self.vms.get_mut(&vm_id).ok_or(Error::VmNotFound(vm_id))?;
        let host = self.hosts.get_mut(&target_host).ok_or(Error::HostNotFound(target_host))?;
        let verdict = host.add_migrating_in_vm(&vm.allocation());
        if verdict == AllocationVerdict::Success {
            vm.in_migration = true;
        }
        Ok(verdict)
    }

    /// Completes the migration: the VM is removed from all other hosts and stays on the target host.
    pub fn finish_migration(&mut self, vm_id: u32, target_host: u32) -> Result<()> {
        let vm = self.vms.get_mut(&vm_id).ok_or(Error::VmNotFound(vm_id))?;
        if !self.hosts.contains_key(&target_host) {
            return Err(Error::HostNotFound(target_host));
        }
        for (id, host) in self.hosts.iter_mut() {
            if *id == target_host {
                host.remove_migrating_in_vm(vm_id);
            } else {
                host.release(vm_id);
            }
        }
        vm.in_migration = false;
        Ok(())
    }

    /// Moves the VM to the target host at once, as an executor of the migration plan would eventually do.
    pub fn migrate_vm(&mut self, vm_id: u32, target_host: u32) -> Result<AllocationVerdict> {
        let verdict = self.start_migration(vm_id, target_host)?;
        if verdict == AllocationVerdict::Success {
            self.finish_migration(vm_id, target_host)?;
        }
        Ok(verdict)
    }

    /// Applies all migrations from the plan. Stops at the first migration which cannot be performed.
    pub fn apply_plan(&mut self, plan: &MigrationPlan) -> Result<()> {
        for directive in plan.iter() {
            match self.migrate_vm(directive.vm_id, directive.host_id)? {
                AllocationVerdict::Success => {}
                _ => {
                    return Err(Error::AllocationFailed {
                        vm_id: directive.vm_id,
                        host_id: directive.host_id,
                    })
                }
            }
        }
        Ok(())
    }

    pub fn host(&self, id: u32) -> Result<&Host> {
        self.hosts.get(&id).ok_or(Error::HostNotFound(id))
    }

    pub fn host_mut(&mut self, id: u32) -> Result<&mut Host> {
        self.hosts.get_mut(&id).ok_or(Error::HostNotFound(id))
    }

    /// Returns host with specified name.
    pub fn host_by_name(&self, name: &str) -> Option<&Host> {
        self.hosts.values().find(|host| host.name == name)
    }

    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.hosts.values()
    }

    pub fn hosts_mut(&mut self) -> impl Iterator<Item = &mut Host> {
        self.hosts.values_mut()
    }

    /// Returns IDs of all hosts in ascending order.
    pub fn get_hosts_list(&self) -> Vec<u32> {
        self.hosts.keys().cloned().collect()
    }

    pub fn get_host_count(&self) -> usize {
        self.hosts.len()
    }

    pub fn vm(&self, id: u32) -> Result<&VirtualMachine> {
        self.vms.get(&id).ok_or(Error::VmNotFound(id))
    }

    pub fn vm_mut(&mut self, id: u32) -> Result<&mut VirtualMachine> {
        self.vms.get_mut(&id).ok_or(Error::VmNotFound(id))
    }

    pub fn vms(&self) -> impl Iterator<Item = &VirtualMachine> {
        self.vms.values()
    }

    /// Returns the host running the VM. A VM migrating in is reported on its source host.
    pub fn vm_location(&self, vm_id: u32) -> Option<u32> {
        self.hosts
            .values()
            .find(|host| host.has_vm(vm_id) && !host.is_migrating_in(vm_id))
            .map(|host| host.id)
    }

    /// Returns VMs of the host which can be migrated, i.e. are not migrating right now.
    pub fn migratable_vms(&self, host_id: u32) -> Vec<&VirtualMachine> {
        match self.hosts.get(&host_id) {
            Some(host) => host
                .vms()
                .into_iter()
                .filter_map(|vm_id| self.vms.get(&vm_id))
                .filter(|vm| !vm.in_migration)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Returns true if every VM of the host is migrating out or some VM is migrating in.
    /// Such hosts are not considered for consolidation.
    pub fn are_all_vms_migrating_out_or_any_vm_migrating_in(&self, host_id: u32) -> bool {
        let host = match self.hosts.get(&host_id) {
            Some(host) => host,
            None => return true,
        };
        if !host.vms_migrating_in().is_empty() {
            return true;
        }
        host.vms()
            .iter()
            .all(|vm_id| self.vms.get(vm_id).map_or(true, |vm| vm.in_migration))
    }

    /// Returns host -> VM IDs mapping, used to compare cluster states.
    pub fn placement(&self) -> BTreeMap<u32, Vec<u32>> {
        self.hosts
            .values()
            .map(|host| (host.id, host.vms().into_iter().collect()))
            .collect()
    }
}
