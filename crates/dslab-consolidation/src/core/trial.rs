//! Scoped trial allocation.

use std::ops::Deref;

use crate::core::common::{Allocation, AllocationVerdict};
use crate::core::host::Host;

/// Temporary placement of one or more VMs on a host, used to evaluate a predicate on the resulting host state.
///
/// The guard dereferences to the host in its trial state and releases the VMs it placed when dropped, so the
/// host returns to exactly the state it had before [`TrialAllocation::acquire`].
pub struct TrialAllocation<'a> {
    host: &'a mut Host,
    allocated: Vec<u32>,
}

impl<'a> TrialAllocation<'a> {
    /// Places all allocations on the host. If any of them can't be placed, the ones already placed are released
    /// and `None` is returned. A VM already running on the host counts as a failed placement.
    pub fn acquire(host: &'a mut Host, allocs: &[&Allocation]) -> Option<Self> {
        let mut trial = Self {
            host,
            allocated: Vec::with_capacity(allocs.len()),
        };
        for alloc in allocs {
            if trial.host.allocate(alloc) != AllocationVerdict::Success {
                return None;
            }
            trial.allocated.push(alloc.id);
        }
        Some(trial)
    }

    /// Shortcut for a trial placement of a single VM.
    pub fn single(host: &'a mut Host, alloc: &Allocation) -> Option<Self> {
        Self::acquire(host, &[alloc])
    }
}

impl Deref for TrialAllocation<'_> {
    type Target = Host;

    fn deref(&self) -> &Host {
        &*self.host
    }
}

impl Drop for TrialAllocation<'_> {
    fn drop(&mut self) {
        for vm_id in self.allocated.drain(..).rev() {
            self.host.release(vm_id);
        }
    }
}

/// Places the VM on the host, evaluates `f` on the trial state and removes the VM.
/// Returns `None` if the VM can't be placed.
pub fn with_trial_allocation<R>(host: &mut Host, alloc: &Allocation, f: impl FnOnce(&Host) -> R) -> Option<R> {
    TrialAllocation::single(host, alloc).map(|trial| f(&trial))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::power_model::LinearPowerModel;

    fn alloc(id: u32, cpu_usage: u32, memory_usage: u64) -> Allocation {
        Allocation {
            id,
            cpu_usage,
            memory_usage,
            bandwidth_usage: 0,
        }
    }

    #[test]
    fn test_trial_is_released() {
        let mut host = Host::new(0, "h", 100, 100, 100, Box::new(LinearPowerModel::new(1., 2.)));
        host.allocate(&alloc(0, 20, 20));
        {
            let trial = TrialAllocation::acquire(&mut host, &[&alloc(1, 30, 10), &alloc(2, 10, 10)]).unwrap();
            assert_eq!(trial.get_cpu_load(), 0.6);
            assert_eq!(trial.vm_count(), 3);
        }
        assert_eq!(host.get_cpu_load(), 0.2);
        assert_eq!(host.get_available_memory(), 80);
        assert_eq!(host.vm_count(), 1);
    }

    #[test]
    fn test_failed_trial_releases_partial_placement() {
        let mut host = Host::new(0, "h", 100, 100, 100, Box::new(LinearPowerModel::new(1., 2.)));
        assert!(TrialAllocation::acquire(&mut host, &[&alloc(1, 30, 60), &alloc(2, 10, 60)]).is_none());
        assert_eq!(host.vm_count(), 0);
        assert_eq!(host.get_available_memory(), 100);
    }

    #[test]
    fn test_existing_vm_is_not_released() {
        let mut host = Host::new(0, "h", 100, 100, 100, Box::new(LinearPowerModel::new(1., 2.)));
        host.allocate(&alloc(0, 20, 20));
        assert!(with_trial_allocation(&mut host, &alloc(0, 20, 20), |h| h.get_cpu_load()).is_none());
        assert!(host.has_vm(0));
    }
}
