//! Energy cost of moving a VM to a host.

use crate::core::common::Allocation;
use crate::core::config::TransmissionConfig;
use crate::core::host::Host;

/// Network interface power grows linearly with bandwidth between the low and high reference points.
/// Transferring VM memory costs the power of both interfaces multiplied by the transfer time.
#[derive(Clone, Debug)]
pub struct TransmissionEnergyModel {
    low_bandwidth: f64,
    low_power: f64,
    ratio: f64,
}

impl TransmissionEnergyModel {
    pub fn new(config: &TransmissionConfig) -> Self {
        Self {
            low_bandwidth: config.low_bandwidth,
            low_power: config.low_power,
            ratio: (config.high_power - config.low_power) / (config.high_bandwidth - config.low_bandwidth),
        }
    }

    fn interface_power(&self, bandwidth: f64) -> f64 {
        self.low_power + (bandwidth - self.low_bandwidth) * self.ratio
    }

    /// Returns energy spent to transfer `memory` MB between hosts with the given bandwidths (in bit/s).
    pub fn transmission_energy(&self, source_bandwidth: f64, target_bandwidth: f64, memory: u64) -> f64 {
        let bits = memory as f64 * 8000.;
        bits / source_bandwidth * self.interface_power(source_bandwidth)
            + bits / target_bandwidth * self.interface_power(target_bandwidth)
    }
}

impl Default for TransmissionEnergyModel {
    fn default() -> Self {
        Self::new(&TransmissionConfig::default())
    }
}

/// Power of the host after placing the VM on it, or infinity if the resulting utilization is invalid.
pub fn processing_energy(host: &Host, alloc: &Allocation) -> f64 {
    host.get_power_after_allocation(alloc).unwrap_or(f64::INFINITY)
}

/// Total cost of moving the VM from `source` to `target`.
pub fn migration_energy(model: &TransmissionEnergyModel, source: &Host, target: &Host, alloc: &Allocation) -> f64 {
    model.transmission_energy(
        source.get_total_bandwidth() as f64,
        target.get_total_bandwidth() as f64,
        alloc.memory_usage,
    ) + processing_energy(target, alloc)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::core::power_model::LinearPowerModel;

    #[test]
    fn test_transmission_energy() {
        let model = TransmissionEnergyModel::default();
        // both interfaces at the low reference point: 2 * 8e6 / 8e7 * 4000
        assert_abs_diff_eq!(model.transmission_energy(8e7, 8e7, 1000), 800., epsilon = 1e-9);
        // high reference point: 8e6 / 1.4e8 * 6000
        assert_abs_diff_eq!(
            model.transmission_energy(8e7, 1.4e8, 1000),
            400. + 8e6 / 1.4e8 * 6000.,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_processing_energy_of_overloaded_host() {
        let host = Host::new(0, "h", 100, 100, 100, Box::new(LinearPowerModel::new(100., 200.)));
        let fits = Allocation {
            id: 0,
            cpu_usage: 50,
            memory_usage: 10,
            bandwidth_usage: 0,
        };
        let too_big = Allocation {
            id: 1,
            cpu_usage: 150,
            memory_usage: 10,
            bandwidth_usage: 0,
        };
        assert_abs_diff_eq!(processing_energy(&host, &fits), 150.);
        assert!(processing_energy(&host, &too_big).is_infinite());
    }
}
