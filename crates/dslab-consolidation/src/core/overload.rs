//! Host overload detection.

use crate::core::common::Allocation;
use crate::core::config::{parse_config_value, parse_option, parse_options};
use crate::core::error::{Error, Result};
use crate::core::host::Host;
use crate::core::trial::with_trial_allocation;

/// Classifies hosts as overloaded.
///
/// Two forms of the check are supported: [`is_overloaded`](OverloadDetector::is_overloaded) uses the
/// detector's own cutoff, while [`is_overloaded_with_threshold`](OverloadDetector::is_overloaded_with_threshold)
/// lets the caller supply it, which placement strategies use to apply their own sensitivity.
pub trait OverloadDetector {
    /// Checks the host against the detector's own cutoff.
    fn is_overloaded(&self, host: &Host) -> bool;

    /// Checks the host against an explicit utilization threshold.
    fn is_overloaded_with_threshold(&self, host: &Host, threshold: f64) -> bool {
        host.get_cpu_load() > threshold
    }

    /// Returns the expected CPU utilization of the host, used by best-fit placement.
    fn predict_utilization(&self, host: &Host) -> f64 {
        host.get_cpu_load()
    }

    /// Returns the value the detector compares the host utilization with, stored in the history.
    fn metric(&self, host: &Host) -> f64;
}

pub fn overload_detector_resolver(config_str: &str) -> Result<Box<dyn OverloadDetector>> {
    let (name, options) = parse_config_value(config_str);
    let options = parse_options(&options.unwrap_or_default());
    match name.as_str() {
        "StaticThreshold" => Ok(Box::new(StaticThreshold::new(parse_option(
            &options, "threshold", config_str, 0.9,
        )?))),
        "MedianAbsoluteDeviation" => Ok(Box::new(MedianAbsoluteDeviation::new(
            parse_option(&options, "safety", config_str, 2.5)?,
            parse_option(&options, "fallback", config_str, 0.9)?,
        ))),
        _ => Err(Error::UnknownComponent(config_str.to_string())),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Host is overloaded when its CPU utilization exceeds a fixed threshold.
#[derive(Clone)]
pub struct StaticThreshold {
    threshold: f64,
}

impl StaticThreshold {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl OverloadDetector for StaticThreshold {
    fn is_overloaded(&self, host: &Host) -> bool {
        host.get_cpu_load() > self.threshold
    }

    fn metric(&self, _host: &Host) -> f64 {
        self.threshold
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Adaptive threshold `1 - safety * MAD`, where MAD is the median absolute deviation of the recent host
/// utilization. Until enough observations are collected the fixed `fallback` threshold is used.
#[derive(Clone)]
pub struct MedianAbsoluteDeviation {
    safety: f64,
    fallback: f64,
    window: usize,
    min_history: usize,
}

impl MedianAbsoluteDeviation {
    pub fn new(safety: f64, fallback: f64) -> Self {
        Self {
            safety,
            fallback,
            window: 30,
            min_history: 12,
        }
    }

    fn threshold(&self, host: &Host) -> f64 {
        let history = host.utilization_history();
        if history.len() < self.min_history {
            return self.fallback;
        }
        let recent = &history[history.len().saturating_sub(self.window)..];
        let med = median(recent);
        let deviations: Vec<f64> = recent.iter().map(|u| (u - med).abs()).collect();
        1. - self.safety * median(&deviations)
    }
}

impl OverloadDetector for MedianAbsoluteDeviation {
    fn is_overloaded(&self, host: &Host) -> bool {
        host.get_cpu_load() > self.threshold(host)
    }

    fn metric(&self, host: &Host) -> f64 {
        self.threshold(host)
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.
    } else {
        sorted[mid]
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Checks whether the host would be overloaded after placing the VM on it.
///
/// The VM is placed on the host for the duration of the check only. If it can't be placed at all, the host
/// is reported as overloaded. With `threshold = None` the detector's own cutoff is used.
pub fn predict_over_utilized(
    host: &mut Host,
    alloc: &Allocation,
    detector: &dyn OverloadDetector,
    threshold: Option<f64>,
) -> bool {
    with_trial_allocation(host, alloc, |host| match threshold {
        Some(threshold) => detector.is_overloaded_with_threshold(host, threshold),
        None => detector.is_overloaded(host),
    })
    .unwrap_or(true)
}

/// Returns the predicted utilization of the host after placing the VM on it, or 1.0 if it can't be placed.
pub fn predict_utilization_after_allocation(
    host: &mut Host,
    alloc: &Allocation,
    detector: &dyn OverloadDetector,
) -> f64 {
    with_trial_allocation(host, alloc, |host| detector.predict_utilization(host)).unwrap_or(1.)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::power_model::LinearPowerModel;

    fn host_with_load(cpu_usage: u32) -> Host {
        let mut host = Host::new(0, "h", 100, 100, 100, Box::new(LinearPowerModel::new(1., 2.)));
        host.allocate(&Allocation {
            id: 0,
            cpu_usage,
            memory_usage: 0,
            bandwidth_usage: 0,
        });
        host
    }

    #[test]
    fn test_static_threshold() {
        let detector = StaticThreshold::new(0.8);
        assert!(!detector.is_overloaded(&host_with_load(80)));
        assert!(detector.is_overloaded(&host_with_load(81)));
        assert!(detector.is_overloaded_with_threshold(&host_with_load(80), 0.5));
        assert_eq!(detector.metric(&host_with_load(10)), 0.8);
    }

    #[test]
    fn test_mad_uses_fallback_without_history() {
        let detector = MedianAbsoluteDeviation::new(2.5, 0.7);
        assert!(detector.is_overloaded(&host_with_load(75)));
        assert_eq!(detector.metric(&host_with_load(75)), 0.7);
    }

    #[test]
    fn test_mad_adaptive_threshold() {
        let detector = MedianAbsoluteDeviation::new(2., 0.7);
        let mut host = host_with_load(75);
        for i in 0..12 {
            host.record_utilization(if i % 2 == 0 { 0.4 } else { 0.6 });
        }
        // median 0.5, absolute deviations are all 0.1
        approx::assert_abs_diff_eq!(detector.metric(&host), 0.8, epsilon = 1e-9);
        assert!(!detector.is_overloaded(&host));
    }

    #[test]
    fn test_resolver() {
        let detector = overload_detector_resolver("StaticThreshold[threshold=0.5]").unwrap();
        assert_eq!(detector.metric(&host_with_load(0)), 0.5);
        assert!(overload_detector_resolver("Unknown").is_err());
    }
}
