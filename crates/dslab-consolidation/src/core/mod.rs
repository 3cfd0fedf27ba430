//! Planner core: cluster state model, placement strategies and the migration controller.

pub mod clock;
pub mod cluster;
pub mod common;
pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod host;
pub mod migration;
pub mod overload;
pub mod placement;
pub mod power_model;
pub mod snapshot;
pub mod trial;
pub mod vm;
pub mod vm_selection;
