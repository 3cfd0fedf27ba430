//! Saving and restoring the VM to host mapping around a planning pass.

use crate::core::cluster::Cluster;
use crate::core::common::{Allocation, AllocationVerdict};
use crate::core::error::{Error, Result};

/// Host to VM mapping captured before a planning pass.
///
/// VMs migrating in are not part of the snapshot: they are tracked by their destination hosts and put back by
/// [`Host::reallocate_migrating_in_vms`](crate::core::host::Host::reallocate_migrating_in_vms).
#[derive(Clone, Debug, Default)]
pub struct AllocationSnapshot {
    entries: Vec<(u32, Allocation)>,
}

impl AllocationSnapshot {
    pub fn capture(cluster: &Cluster) -> Self {
        let mut entries = Vec::new();
        for host in cluster.hosts() {
            for alloc in host.allocations() {
                if !host.is_migrating_in(alloc.id) {
                    entries.push((host.id, alloc.clone()));
                }
            }
        }
        Self { entries }
    }

    /// Brings the cluster back to the captured mapping.
    ///
    /// Fails with [`Error::RestoreFailed`] if some VM can't be placed back. The cluster state is unspecified
    /// after such failure.
    pub fn restore(&self, cluster: &mut Cluster) -> Result<()> {
        for host in cluster.hosts_mut() {
            host.release_all();
            host.reallocate_migrating_in_vms();
        }
        for (host_id, alloc) in &self.entries {
            let host = cluster.host_mut(*host_id).map_err(|_| Error::RestoreFailed {
                vm_id: alloc.id,
                host_id: *host_id,
            })?;
            if host.allocate(alloc) != AllocationVerdict::Success {
                return Err(Error::RestoreFailed {
                    vm_id: alloc.id,
                    host_id: *host_id,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
