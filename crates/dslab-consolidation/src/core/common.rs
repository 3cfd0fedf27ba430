use serde::Serialize;

/// Resources reserved for a single VM on a host.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Allocation {
    pub id: u32,
    pub cpu_usage: u32,
    pub memory_usage: u64,
    pub bandwidth_usage: u64,
}

#[derive(Debug, PartialEq)]
pub enum AllocationVerdict {
    NotEnoughCPU,
    NotEnoughMemory,
    NotEnoughBandwidth,
    AlreadyAllocated,
    Success,
    HostNotFound,
}
