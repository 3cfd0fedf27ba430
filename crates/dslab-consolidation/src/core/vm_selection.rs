//! Policies selecting VMs to migrate from overloaded hosts.

use rand::prelude::SliceRandom;
use rand::SeedableRng;
use rand_pcg::Pcg64;

use crate::core::cluster::Cluster;
use crate::core::config::{parse_config_value, parse_option, parse_options};
use crate::core::error::{Error, Result};

/// Trait for implementation of VM selection policies.
///
/// The policy is asked for one VM at a time. The planner evicts the returned VM from the host and asks again
/// while the host stays overloaded. VMs which are already migrating must not be returned.
pub trait VmSelectionPolicy {
    fn select_vm(&mut self, host_id: u32, cluster: &Cluster) -> Option<u32>;
}

pub fn vm_selection_resolver(config_str: &str) -> Result<Box<dyn VmSelectionPolicy>> {
    let (name, options) = parse_config_value(config_str);
    let options = parse_options(&options.unwrap_or_default());
    match name.as_str() {
        "MinimumMigrationTime" => Ok(Box::new(MinimumMigrationTime::new())),
        "MinimumUtilization" => Ok(Box::new(MinimumUtilization::new())),
        "RandomSelection" => Ok(Box::new(RandomSelection::new(parse_option(
            &options, "seed", config_str, 123,
        )?))),
        _ => Err(Error::UnknownComponent(config_str.to_string())),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Selects the VM with the least memory, which is the fastest one to migrate.
pub struct MinimumMigrationTime;

impl MinimumMigrationTime {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmSelectionPolicy for MinimumMigrationTime {
    fn select_vm(&mut self, host_id: u32, cluster: &Cluster) -> Option<u32> {
        let mut result: Option<u32> = None;
        let mut min_memory = u64::MAX;
        for vm in cluster.migratable_vms(host_id) {
            if vm.memory_usage < min_memory {
                min_memory = vm.memory_usage;
                result = Some(vm.id);
            }
        }
        result
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Selects the VM requesting the least CPU.
pub struct MinimumUtilization;

impl MinimumUtilization {
    pub fn new() -> Self {
        Self {}
    }
}

impl VmSelectionPolicy for MinimumUtilization {
    fn select_vm(&mut self, host_id: u32, cluster: &Cluster) -> Option<u32> {
        cluster
            .migratable_vms(host_id)
            .into_iter()
            .min_by_key(|vm| vm.cpu_usage)
            .map(|vm| vm.id)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Selects a random VM, reproducible for the same seed.
pub struct RandomSelection {
    rand: Pcg64,
}

impl RandomSelection {
    pub fn new(seed: u64) -> Self {
        Self {
            rand: Pcg64::seed_from_u64(seed),
        }
    }
}

impl VmSelectionPolicy for RandomSelection {
    fn select_vm(&mut self, host_id: u32, cluster: &Cluster) -> Option<u32> {
        cluster.migratable_vms(host_id).choose(&mut self.rand).map(|vm| vm.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::power_model::LinearPowerModel;

    fn cluster() -> (Cluster, u32) {
        let mut cluster = Cluster::new();
        let host = cluster.add_host("h", 1000, 1000, 1000, Box::new(LinearPowerModel::new(1., 2.)));
        cluster.spawn_vm(300, 200, 0, host).unwrap();
        cluster.spawn_vm(100, 400, 0, host).unwrap();
        cluster.spawn_vm(200, 200, 0, host).unwrap();
        (cluster, host)
    }

    #[test]
    fn test_minimum_migration_time() {
        let (cluster, host) = cluster();
        assert_eq!(MinimumMigrationTime::new().select_vm(host, &cluster), Some(0));
    }

    #[test]
    fn test_minimum_utilization() {
        let (cluster, host) = cluster();
        assert_eq!(MinimumUtilization::new().select_vm(host, &cluster), Some(1));
    }

    #[test]
    fn test_migrating_vm_is_not_selected() {
        let (mut cluster, host) = cluster();
        cluster.vm_mut(0).unwrap().in_migration = true;
        assert_eq!(MinimumMigrationTime::new().select_vm(host, &cluster), Some(2));
    }

    #[test]
    fn test_random_selection_is_reproducible() {
        let (cluster, host) = cluster();
        let mut a = vm_selection_resolver("RandomSelection[seed=7]").unwrap();
        let mut b = vm_selection_resolver("RandomSelection[seed=7]").unwrap();
        for _ in 0..10 {
            let vm = a.select_vm(host, &cluster);
            assert!(vm.is_some());
            assert_eq!(vm, b.select_vm(host, &cluster));
        }
        assert_eq!(RandomSelection::new(1).select_vm(5, &cluster), None);
    }
}
