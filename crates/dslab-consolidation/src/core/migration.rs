//! Migration plan produced by a planning pass.

use std::collections::BTreeSet;

use serde::Serialize;

/// Instruction to move the VM from its current host to another host.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct MigrationDirective {
    pub vm_id: u32,
    pub source_host: u32,
    /// Destination host.
    pub host_id: u32,
}

impl MigrationDirective {
    pub fn new(vm_id: u32, source_host: u32, host_id: u32) -> Self {
        Self {
            vm_id,
            source_host,
            host_id,
        }
    }
}

/// Ordered sequence of migrations: evictions from overloaded hosts go first,
/// then evacuations of underloaded hosts.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct MigrationPlan {
    directives: Vec<MigrationDirective>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, directive: MigrationDirective) {
        self.directives.push(directive);
    }

    pub fn extend(&mut self, directives: impl IntoIterator<Item = MigrationDirective>) {
        self.directives.extend(directives);
    }

    pub fn iter(&self) -> impl Iterator<Item = &MigrationDirective> {
        self.directives.iter()
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Returns IDs of hosts receiving at least one VM.
    pub fn target_hosts(&self) -> BTreeSet<u32> {
        self.directives.iter().map(|d| d.host_id).collect()
    }

    /// Returns the destination of the VM, if the plan moves it.
    pub fn destination(&self, vm_id: u32) -> Option<u32> {
        self.directives.iter().find(|d| d.vm_id == vm_id).map(|d| d.host_id)
    }

    pub fn into_inner(self) -> Vec<MigrationDirective> {
        self.directives
    }
}

impl IntoIterator for MigrationPlan {
    type Item = MigrationDirective;
    type IntoIter = std::vec::IntoIter<MigrationDirective>;

    fn into_iter(self) -> Self::IntoIter {
        self.directives.into_iter()
    }
}
