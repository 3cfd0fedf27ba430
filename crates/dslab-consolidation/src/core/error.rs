//! Planner errors.

use thiserror::Error;

/// Errors produced by the planner and its collaborators.
///
/// Only [`Error::RestoreFailed`] is fatal for a planning pass: it means that the cluster state could not be
/// brought back to the pre-pass allocation and must be resynchronized by the caller. The other errors abort
/// the single operation that produced them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("utilization value must be between 0 and 1, got {0}")]
    InvalidUtilization(f64),
    #[error("couldn't restore vm {vm_id} on host {host_id}")]
    RestoreFailed { vm_id: u32, host_id: u32 },
    #[error("couldn't allocate vm {vm_id} on host {host_id}")]
    AllocationFailed { vm_id: u32, host_id: u32 },
    #[error("host {0} not found")]
    HostNotFound(u32),
    #[error("vm {0} not found")]
    VmNotFound(u32),
    #[error("can't resolve {0}")]
    UnknownComponent(String),
    #[error("invalid option {name} in {config}")]
    InvalidOption { name: String, config: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl Error {
    /// Returns true if the error leaves the cluster state in an unknown condition.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::RestoreFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
