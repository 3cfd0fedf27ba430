//! Per-host utilization history and planner execution times.

use std::collections::BTreeMap;
use std::fs::File;

use serde::Serialize;

use crate::core::error::Result;

/// Single observation of a host made at the start of a planning pass.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct UtilizationSample {
    pub host_id: u32,
    pub time: f64,
    pub cpu_utilization: f64,
    /// Value the overload detector compared utilization with.
    pub metric: f64,
}

/// Wall-clock durations (in seconds) of the planning pass phases, one entry per pass.
#[derive(Clone, Debug, Default)]
pub struct ExecutionTimeHistory {
    pub host_selection: Vec<f64>,
    pub vm_selection: Vec<f64>,
    pub vm_reallocation: Vec<f64>,
    pub total: Vec<f64>,
}

/// Collects utilization samples and execution times. All series are append-only.
#[derive(Default)]
pub struct HistoryRecorder {
    samples: BTreeMap<u32, Vec<UtilizationSample>>,
    execution_times: ExecutionTimeHistory,
}

impl HistoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the sample to the series of its host.
    /// A sample with the same timestamp as an already recorded one is ignored.
    pub fn add_history_entry(&mut self, sample: UtilizationSample) {
        let series = self.samples.entry(sample.host_id).or_default();
        if series.iter().any(|s| s.time == sample.time) {
            return;
        }
        series.push(sample);
    }

    /// Returns `(time, utilization)` pairs of the host.
    pub fn utilization_history(&self, host_id: u32) -> Vec<(f64, f64)> {
        self.series(host_id).map(|s| (s.time, s.cpu_utilization)).collect()
    }

    /// Returns `(time, metric)` pairs of the host.
    pub fn metric_history(&self, host_id: u32) -> Vec<(f64, f64)> {
        self.series(host_id).map(|s| (s.time, s.metric)).collect()
    }

    /// Returns timestamps of the host samples.
    pub fn time_history(&self, host_id: u32) -> Vec<f64> {
        self.series(host_id).map(|s| s.time).collect()
    }

    fn series(&self, host_id: u32) -> impl Iterator<Item = &UtilizationSample> {
        self.samples.get(&host_id).into_iter().flatten()
    }

    pub fn execution_times(&self) -> &ExecutionTimeHistory {
        &self.execution_times
    }

    pub fn add_execution_times(&mut self, host_selection: f64, vm_selection: f64, vm_reallocation: f64, total: f64) {
        self.execution_times.host_selection.push(host_selection);
        self.execution_times.vm_selection.push(vm_selection);
        self.execution_times.vm_reallocation.push(vm_reallocation);
        self.execution_times.total.push(total);
    }

    /// Saves all utilization samples to CSV file.
    pub fn save_csv(&self, path: &str) -> Result<()> {
        let file = File::create(path)?;
        let mut wtr = csv::Writer::from_writer(file);
        for sample in self.samples.values().flatten() {
            wtr.serialize(sample)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
