//! Planner and cluster configuration.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::cluster::Cluster;
use crate::core::error::{Error, Result};
use crate::core::power_model::power_model_resolver;

/// Parses config value string, which consists of two parts - name and options.
/// Example: StaticThreshold[threshold=0.8] parts are name StaticThreshold and options string "threshold=0.8".
pub fn parse_config_value(config_str: &str) -> (String, Option<String>) {
    match config_str.split_once('[') {
        Some((l, r)) => (l.to_string(), Some(r.to_string().replace(']', ""))),
        None => (config_str.to_string(), None),
    }
}

/// Parses options string from config value, returns map with option names and values.
pub fn parse_options(options_str: &str) -> HashMap<String, String> {
    let mut options = HashMap::new();
    for option_str in options_str.split(',') {
        if let Some((name, value)) = option_str.split_once('=') {
            options.insert(name.trim().to_string(), value.trim().to_string());
        }
    }
    options
}

/// Returns the parsed value of the option or `default` if the option is absent.
pub fn parse_option<T: FromStr>(
    options: &HashMap<String, String>,
    name: &str,
    config_str: &str,
    default: T,
) -> Result<T> {
    match options.get(name) {
        Some(value) => value.parse::<T>().map_err(|_| Error::InvalidOption {
            name: name.to_string(),
            config: config_str.to_string(),
        }),
        None => Ok(default),
    }
}

/// Placement strategy used to find new hosts for migrated VMs.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, Clone, Copy)]
pub enum PlacementKind {
    /// Per-VM greedy placement (minimum power increase or best fit).
    Greedy,
    /// Per-host knapsack selection of VMs.
    BinPacking,
    /// Particle swarm search over all VM to host assignments.
    Swarm,
}

/// Particle swarm parameters.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SwarmConfig {
    /// Number of particles.
    pub particles: usize,
    /// Number of particles on each side of a particle in the ring neighborhood.
    pub neighborhood_radius: usize,
    pub inertia: f64,
    /// Weight of the particle's own best position.
    pub particle_increment: f64,
    /// Weight of the best position in the particle's neighborhood.
    pub neighborhood_increment: f64,
    /// Weight of the best position of the whole swarm.
    pub global_increment: f64,
    /// Absolute limit of a velocity component.
    pub max_velocity: f64,
    pub iterations: usize,
    /// Seed of the random generator.
    pub seed: u64,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            particles: 100,
            neighborhood_radius: 10,
            inertia: 0.95,
            particle_increment: 0.8,
            neighborhood_increment: 0.9,
            global_increment: 0.8,
            max_velocity: 0.1,
            iterations: 100,
            seed: 123,
        }
    }
}

/// Parameters of the network transmission energy model used by the swarm placement.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct TransmissionConfig {
    /// Lowest host bandwidth in bit/s.
    pub low_bandwidth: f64,
    /// Highest host bandwidth in bit/s.
    pub high_bandwidth: f64,
    /// NIC power at the lowest bandwidth.
    pub low_power: f64,
    /// NIC power at the highest bandwidth.
    pub high_power: f64,
}

impl Default for TransmissionConfig {
    fn default() -> Self {
        Self {
            low_bandwidth: 80_000_000.,
            high_bandwidth: 140_000_000.,
            low_power: 4000.,
            high_power: 6000.,
        }
    }
}

/// Holds raw planner config parsed from YAML file.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
struct RawPlannerConfig {
    pub overload_detector: Option<String>,
    pub vm_selection: Option<String>,
    pub placement: Option<PlacementKind>,
    pub placement_threshold: Option<f64>,
    pub vm_sort_increasing: Option<bool>,
    pub sort_hosts: Option<bool>,
    pub best_fit_host: Option<bool>,
    pub swarm_threshold_overloaded: Option<usize>,
    pub swarm_threshold_underloaded: Option<usize>,
    pub bin_packing_ratio: Option<f64>,
    pub swarm: Option<SwarmConfig>,
    pub transmission: Option<TransmissionConfig>,
}

/// Represents planner configuration.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct PlannerConfig {
    /// Overload detector, e.g. `StaticThreshold[threshold=0.9]`.
    pub overload_detector: String,
    /// VM selection policy, e.g. `MinimumMigrationTime`.
    pub vm_selection: String,
    /// Default placement strategy.
    pub placement: PlacementKind,
    /// Utilization threshold a target host should not exceed after placement.
    pub placement_threshold: f64,
    /// Place VMs in ascending order of requested CPU instead of descending.
    pub vm_sort_increasing: bool,
    /// Scan target hosts in descending order of CPU utilization.
    pub sort_hosts: bool,
    /// Greedy placement picks the host with maximal predicted utilization instead of minimal power increase.
    pub best_fit_host: bool,
    /// Use swarm placement for VMs from overloaded hosts if there are more of them than this value.
    pub swarm_threshold_overloaded: usize,
    /// Use swarm placement for VMs from underloaded hosts if there are more of them than this value.
    pub swarm_threshold_underloaded: usize,
    /// Use bin-packing placement if the number of VMs per available host reaches this value.
    pub bin_packing_ratio: Option<f64>,
    pub swarm: SwarmConfig,
    pub transmission: TransmissionConfig,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            overload_detector: "StaticThreshold[threshold=0.9]".to_string(),
            vm_selection: "MinimumMigrationTime".to_string(),
            placement: PlacementKind::Greedy,
            placement_threshold: 1.,
            vm_sort_increasing: false,
            sort_hosts: true,
            best_fit_host: false,
            swarm_threshold_overloaded: 1000,
            swarm_threshold_underloaded: 1000,
            bin_packing_ratio: None,
            swarm: SwarmConfig::default(),
            transmission: TransmissionConfig::default(),
        }
    }
}

impl PlannerConfig {
    /// Creates planner config by reading parameter values from YAML file
    /// (uses default values if some parameters are absent).
    pub fn from_file(file_name: &str) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(file_name)?)
    }

    /// Creates planner config from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: RawPlannerConfig = serde_yaml::from_str(yaml)?;
        let default = Self::default();
        Ok(Self {
            overload_detector: raw.overload_detector.unwrap_or(default.overload_detector),
            vm_selection: raw.vm_selection.unwrap_or(default.vm_selection),
            placement: raw.placement.unwrap_or(default.placement),
            placement_threshold: raw.placement_threshold.unwrap_or(default.placement_threshold),
            vm_sort_increasing: raw.vm_sort_increasing.unwrap_or(default.vm_sort_increasing),
            sort_hosts: raw.sort_hosts.unwrap_or(default.sort_hosts),
            best_fit_host: raw.best_fit_host.unwrap_or(default.best_fit_host),
            swarm_threshold_overloaded: raw
                .swarm_threshold_overloaded
                .unwrap_or(default.swarm_threshold_overloaded),
            swarm_threshold_underloaded: raw
                .swarm_threshold_underloaded
                .unwrap_or(default.swarm_threshold_underloaded),
            bin_packing_ratio: raw.bin_packing_ratio.or(default.bin_packing_ratio),
            swarm: raw.swarm.unwrap_or(default.swarm),
            transmission: raw.transmission.unwrap_or(default.transmission),
        })
    }
}

/// Holds configuration of a single physical host or a set of identical hosts.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct HostConfig {
    /// Host name.
    /// Should be set if count = 1.
    pub name: Option<String>,
    /// Host name prefix.
    /// Full name is produced by appending host instance number to the prefix.
    /// Should be set if count > 1.
    pub name_prefix: Option<String>,
    /// Host CPU capacity in MIPS.
    pub cpus: u32,
    /// Host memory capacity in MB.
    pub memory: u64,
    /// Host network bandwidth in bit/s.
    pub bandwidth: u64,
    /// Host power model, e.g. `Linear[min=86,max=117]`.
    pub power_model: String,
    /// Number of such hosts.
    pub count: Option<u32>,
}

/// Holds configuration of a single VM or a set of identical VMs placed on the same host.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct VmConfig {
    /// Name of the host running the VM(s).
    pub host: String,
    /// Requested CPU in MIPS.
    pub cpu: u32,
    /// Requested memory in MB.
    pub memory: u64,
    /// Requested network bandwidth.
    pub bandwidth: Option<u64>,
    /// Number of such VMs.
    pub count: Option<u32>,
}

/// Describes initial cluster state: hosts and VMs running on them.
#[derive(Debug, PartialEq, Serialize, Deserialize, Clone, Default)]
pub struct ClusterConfig {
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
    #[serde(default)]
    pub vms: Vec<VmConfig>,
}

impl ClusterConfig {
    pub fn from_file(file_name: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(&std::fs::read_to_string(file_name)?)?)
    }

    /// Creates the cluster described by the config.
    pub fn build(&self) -> Result<Cluster> {
        let mut cluster = Cluster::new();
        for host in &self.hosts {
            let count = host.count.unwrap_or(1);
            for i in 0..count {
                let name = match (&host.name, &host.name_prefix) {
                    (Some(name), _) if count == 1 => name.clone(),
                    (_, Some(prefix)) => format!("{}{}", prefix, i + 1),
                    _ => return Err(Error::InvalidOption {
                        name: "name".to_string(),
                        config: format!("{:?}", host),
                    }),
                };
                cluster.add_host(
                    &name,
                    host.cpus,
                    host.memory,
                    host.bandwidth,
                    power_model_resolver(&host.power_model)?,
                );
            }
        }
        for vm in &self.vms {
            let host_id = cluster
                .host_by_name(&vm.host)
                .map(|host| host.id)
                .ok_or_else(|| Error::UnknownComponent(vm.host.clone()))?;
            for _ in 0..vm.count.unwrap_or(1) {
                cluster.spawn_vm(vm.cpu, vm.memory, vm.bandwidth.unwrap_or(0), host_id)?;
            }
        }
        Ok(cluster)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_value() {
        let (name, options) = parse_config_value("StaticThreshold[threshold=0.8]");
        assert_eq!(name, "StaticThreshold");
        assert_eq!(options.as_deref(), Some("threshold=0.8"));
        assert_eq!(parse_config_value("Greedy"), ("Greedy".to_string(), None));
    }

    #[test]
    fn test_parse_options() {
        let options = parse_options("option1=0.8,option2=something");
        assert_eq!(options.get("option1").unwrap(), "0.8");
        assert_eq!(options.get("option2").unwrap(), "something");
        assert_eq!(options.get("option3"), None);
        assert_eq!(parse_option(&options, "option1", "", 0.).unwrap(), 0.8);
        assert_eq!(parse_option(&options, "option3", "", 5).unwrap(), 5);
        assert!(parse_option::<f64>(&options, "option2", "", 0.).is_err());
    }

    #[test]
    fn test_defaults_from_partial_yaml() {
        let config = PlannerConfig::from_yaml("placement: BinPacking\nswarm:\n  iterations: 5\n").unwrap();
        assert_eq!(config.placement, PlacementKind::BinPacking);
        assert_eq!(config.swarm.iterations, 5);
        assert_eq!(config.swarm.particles, 100);
        assert_eq!(config.placement_threshold, 1.);
        assert!(config.sort_hosts);
    }
}
