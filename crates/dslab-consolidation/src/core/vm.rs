//! Representation of virtual machine.

use serde::Serialize;

use crate::core::common::Allocation;

/// Represents virtual machine (VM).
///
/// VM is characterized by its ID and requested resources: CPU in MIPS, memory in MB and network bandwidth.
/// The `in_migration` flag is set by the cluster runtime while the VM is being live-migrated.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct VirtualMachine {
    pub id: u32,
    pub cpu_usage: u32,
    pub memory_usage: u64,
    pub bandwidth_usage: u64,
    pub in_migration: bool,
}

impl VirtualMachine {
    /// Creates virtual machine with specified parameters.
    pub fn new(id: u32, cpu_usage: u32, memory_usage: u64, bandwidth_usage: u64) -> Self {
        Self {
            id,
            cpu_usage,
            memory_usage,
            bandwidth_usage,
            in_migration: false,
        }
    }

    /// Returns the resources which should be reserved on a host to run this VM.
    pub fn allocation(&self) -> Allocation {
        Allocation {
            id: self.id,
            cpu_usage: self.cpu_usage,
            memory_usage: self.memory_usage,
            bandwidth_usage: self.bandwidth_usage,
        }
    }
}
