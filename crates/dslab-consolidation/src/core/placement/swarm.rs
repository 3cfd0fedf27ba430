//! Particle swarm placement: searches for the assignment of all VMs to hosts minimizing the total energy.

use std::collections::BTreeSet;

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64;

use crate::core::clock::PlanningContext;
use crate::core::cluster::Cluster;
use crate::core::common::AllocationVerdict;
use crate::core::config::{SwarmConfig, TransmissionConfig};
use crate::core::migration::MigrationDirective;
use crate::core::overload::OverloadDetector;
use crate::core::placement::energy::{migration_energy, TransmissionEnergyModel};
use crate::core::placement::{useful_hosts, MigrationCandidate, VmPlacementStrategy};
use crate::{log_debug, log_info, log_warn};

struct Particle {
    position: Vec<f64>,
    velocity: Vec<f64>,
    best_position: Vec<f64>,
    best_fitness: f64,
}

/// Result of the swarm search.
#[derive(Clone, Debug, PartialEq)]
pub struct SwarmSolution {
    pub position: Vec<f64>,
    pub fitness: f64,
}

/// Minimizes `fitness` over `[min_position, max_position]^dimension` with a particle swarm.
///
/// Each particle is attracted to its own best position, to the best position among its ring neighbors
/// (`neighborhood_radius` particles on each side) and to the global best position.
pub fn minimize(
    config: &SwarmConfig,
    dimension: usize,
    min_position: f64,
    max_position: f64,
    rng: &mut dyn RngCore,
    mut fitness: impl FnMut(&[f64]) -> f64,
) -> SwarmSolution {
    let particle_count = config.particles.max(1);
    let mut particles: Vec<Particle> = (0..particle_count)
        .map(|_| {
            let position: Vec<f64> = (0..dimension)
                .map(|_| min_position + rng.gen::<f64>() * (max_position - min_position))
                .collect();
            let velocity: Vec<f64> = (0..dimension)
                .map(|_| (rng.gen::<f64>() * 2. - 1.) * config.max_velocity)
                .collect();
            let best_fitness = fitness(&position);
            Particle {
                best_position: position.clone(),
                position,
                velocity,
                best_fitness,
            }
        })
        .collect();

    let mut best = SwarmSolution {
        position: particles[0].best_position.clone(),
        fitness: particles[0].best_fitness,
    };
    for particle in &particles {
        if particle.best_fitness < best.fitness {
            best.position = particle.best_position.clone();
            best.fitness = particle.best_fitness;
        }
    }

    for _ in 0..config.iterations {
        let neighborhood_best: Vec<usize> = (0..particle_count)
            .map(|i| neighborhood_best(&particles, i, config.neighborhood_radius))
            .collect();
        let neighborhood_positions: Vec<Vec<f64>> = neighborhood_best
            .iter()
            .map(|&idx| particles[idx].best_position.clone())
            .collect();

        for (particle, neighbor_position) in particles.iter_mut().zip(neighborhood_positions.iter()) {
            for d in 0..dimension {
                let x = particle.position[d];
                let v = config.inertia * particle.velocity[d]
                    + rng.gen::<f64>() * config.particle_increment * (particle.best_position[d] - x)
                    + rng.gen::<f64>() * config.neighborhood_increment * (neighbor_position[d] - x)
                    + rng.gen::<f64>() * config.global_increment * (best.position[d] - x);
                let v = v.clamp(-config.max_velocity, config.max_velocity);
                particle.velocity[d] = v;
                particle.position[d] = (x + v).clamp(min_position, max_position);
            }
            let value = fitness(&particle.position);
            if value < particle.best_fitness {
                particle.best_fitness = value;
                particle.best_position = particle.position.clone();
            }
            if value < best.fitness {
                best.fitness = value;
                best.position = particle.position.clone();
            }
        }
    }
    best
}

fn neighborhood_best(particles: &[Particle], i: usize, radius: usize) -> usize {
    let n = particles.len();
    let radius = radius.min(n / 2);
    let mut result = i;
    for offset in 1..=radius {
        for idx in [(i + offset) % n, (i + n - offset) % n] {
            if particles[idx].best_fitness < particles[result].best_fitness {
                result = idx;
            }
        }
    }
    result
}

/// Maps a position component to the index of a host.
fn to_host_index(value: f64, host_count: usize) -> usize {
    (value.round().max(0.) as usize).min(host_count - 1)
}

/// Total energy of the assignment encoded by `position`.
/// Assignments requesting more CPU than a host has free are invalid and cost infinity.
fn assignment_energy(position: &[f64], cost: &[Vec<f64>], demand: &[u64], free_cpu: &[u64]) -> f64 {
    let mut requested = vec![0u64; free_cpu.len()];
    let mut energy = 0.;
    for (i, &value) in position.iter().enumerate() {
        let j = to_host_index(value, free_cpu.len());
        requested[j] += demand[i];
        if requested[j] > free_cpu[j] {
            return f64::INFINITY;
        }
        energy += cost[i][j];
    }
    energy
}

/// Places all candidates at once using the particle swarm.
///
/// Only hosts able to take every candidate are considered. The cost of putting a VM on a host is the energy to
/// transfer its memory plus the power of the host after placement of this VM alone. The energy of an assignment
/// is the sum of the costs of its VMs, provided that the VMs assigned to each host fit into its free CPU.
pub struct SwarmPlacement {
    config: SwarmConfig,
    transmission: TransmissionEnergyModel,
    rng: Box<dyn RngCore>,
    ctx: PlanningContext,
}

impl SwarmPlacement {
    pub fn new(config: &SwarmConfig, transmission: &TransmissionConfig, ctx: PlanningContext) -> Self {
        Self::with_rng(config, transmission, Box::new(Pcg64::seed_from_u64(config.seed)), ctx)
    }

    pub fn with_rng(
        config: &SwarmConfig,
        transmission: &TransmissionConfig,
        rng: Box<dyn RngCore>,
        ctx: PlanningContext,
    ) -> Self {
        Self {
            config: config.clone(),
            transmission: TransmissionEnergyModel::new(transmission),
            rng,
            ctx,
        }
    }

    pub fn set_rng(&mut self, rng: Box<dyn RngCore>) {
        self.rng = rng;
    }
}

impl VmPlacementStrategy for SwarmPlacement {
    fn place(
        &mut self,
        candidates: &[MigrationCandidate],
        excluded: &BTreeSet<u32>,
        cluster: &mut Cluster,
        detector: &dyn OverloadDetector,
    ) -> Vec<MigrationDirective> {
        if candidates.is_empty() {
            return Vec::new();
        }
        let hosts = useful_hosts(candidates, excluded, cluster, detector);
        if hosts.is_empty() {
            log_warn!(self.ctx, "no host can take all {} vms", candidates.len());
            return Vec::new();
        }

        // cost[i][j] - cost of placing candidate i on hosts[j]
        let mut cost = vec![vec![f64::INFINITY; hosts.len()]; candidates.len()];
        let mut free_cpu = vec![0u64; hosts.len()];
        for (j, &host_id) in hosts.iter().enumerate() {
            if let Ok(target) = cluster.host(host_id) {
                free_cpu[j] = target.get_available_cpu();
                for (i, candidate) in candidates.iter().enumerate() {
                    if let Ok(source) = cluster.host(candidate.source_host) {
                        cost[i][j] = migration_energy(&self.transmission, source, target, &candidate.alloc);
                    }
                }
            }
        }
        let demand: Vec<u64> = candidates.iter().map(|c| c.alloc.cpu_usage as u64).collect();

        let host_count = hosts.len();
        let solution = minimize(
            &self.config,
            candidates.len(),
            0.,
            (host_count - 1) as f64,
            self.rng.as_mut(),
            |position| assignment_energy(position, &cost, &demand, &free_cpu),
        );
        log_info!(self.ctx, "swarm search finished with total energy {:.3}", solution.fitness);

        let mut directives = Vec::new();
        for (candidate, &value) in candidates.iter().zip(solution.position.iter()) {
            let host_id = hosts[to_host_index(value, host_count)];
            let verdict = match cluster.host_mut(host_id) {
                Ok(host) => match host.can_allocate(&candidate.alloc) {
                    AllocationVerdict::Success => host.allocate(&candidate.alloc),
                    verdict => verdict,
                },
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimize_finds_minimum() {
        let config = SwarmConfig {
            max_velocity: 1.,
            ..SwarmConfig::default()
        };
        let mut rng = Pcg64::seed_from_u64(1);
        let solution = minimize(&config, 2, 0., 10., &mut rng, |x| {
            (x[0] - 3.).powi(2) + (x[1] - 7.).powi(2)
        });
        assert!(solution.fitness < 0.5);
        assert!(solution.position.iter().all(|x| (0. ..=10.).contains(x)));
    }

    #[test]
    fn test_assignment_energy() {
        let cost = vec![vec![1., 2.], vec![10., 20.]];
        assert_eq!(assignment_energy(&[0., 1.], &cost, &[5, 5], &[10, 10]), 21.);
        assert_eq!(assignment_energy(&[0.2, 0.4], &cost, &[5, 5], &[10, 10]), 11.);
        assert!(assignment_energy(&[0., 0.], &cost, &[5, 6], &[10, 10]).is_infinite());
    }

    #[test]
    fn test_to_host_index() {
        assert_eq!(to_host_index(0.4, 3), 0);
        assert_eq!(to_host_index(0.6, 3), 1);
        assert_eq!(to_host_index(2.7, 3), 2);
        assert_eq!(to_host_index(-1., 3), 0);
    }

    #[test]
    fn test_neighborhood_is_a_ring() {
        let particles: Vec<Particle> = [5., 4., 3., 2., 1.]
            .iter()
            .map(|&f| Particle {
                position: vec![],
                velocity: vec![],
                best_position: vec![],
                best_fitness: f,
            })
            .collect();
        // particle 0 sees particles 4 and 1
        assert_eq!(neighborhood_best(&particles, 0, 1), 4);
        assert_eq!(neighborhood_best(&particles, 2, 1), 3);
    }
}
