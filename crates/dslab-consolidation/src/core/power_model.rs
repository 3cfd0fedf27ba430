//! Host power consumption models.

use dyn_clone::{clone_trait_object, DynClone};

use crate::core::config::{parse_config_value, parse_option, parse_options};
use crate::core::error::{Error, Result};

/// A model for estimating the power consumption of a host based on its CPU utilization.
///
/// CPU utilization should be passed as a float in 0.0-1.0 range, other values produce
/// [`Error::InvalidUtilization`].
pub trait CpuPowerModel: DynClone {
    /// Returns host power consumption in W.
    fn get_power(&self, utilization: f64) -> Result<f64>;
}

clone_trait_object!(CpuPowerModel);

fn check_utilization(utilization: f64) -> Result<()> {
    if (0.0..=1.0).contains(&utilization) {
        Ok(())
    } else {
        Err(Error::InvalidUtilization(utilization))
    }
}

/// A power model based on linear interpolation between the minimum and maximum power consumption values.
#[derive(Clone)]
pub struct LinearPowerModel {
    min_power: f64,
    factor: f64,
}

impl LinearPowerModel {
    /// Creates a linear power model.
    ///
    /// * `min_power` - The minimum power consumption in Watts (at 0% utilization).
    /// * `max_power` - The maximum power consumption in Watts (at 100% utilization).
    pub fn new(min_power: f64, max_power: f64) -> Self {
        Self {
            min_power,
            factor: max_power - min_power,
        }
    }
}

impl CpuPowerModel for LinearPowerModel {
    fn get_power(&self, utilization: f64) -> Result<f64> {
        check_utilization(utilization)?;
        Ok(self.min_power + self.factor * utilization)
    }
}

/// Power model of the form `static_power + factor * (100 * utilization) ^ alpha`.
#[derive(Clone)]
pub struct NonLinearPowerModel {
    static_power: f64,
    factor: f64,
    alpha: f64,
}

impl NonLinearPowerModel {
    pub fn new(static_power: f64, factor: f64, alpha: f64) -> Self {
        Self {
            static_power,
            factor,
            alpha,
        }
    }
}

impl CpuPowerModel for NonLinearPowerModel {
    fn get_power(&self, utilization: f64) -> Result<f64> {
        check_utilization(utilization)?;
        Ok(self.static_power + self.factor * (utilization * 100.).powf(self.alpha))
    }
}

/// A power model based on measurements of actual power consumption at different utilization levels.
///
/// The model uses 11 measurements corresponding to power consumption in W at utilization levels from 0% to 100%
/// with step 10%, such as measurements reported by the [SPECpower benchmark](https://www.spec.org/power_ssj2008/results/).
///
/// The power consumption is computed using linear interpolation between the closest measurements.
#[derive(Clone)]
pub struct EmpiricalPowerModel {
    measurements: Vec<f64>,
}

impl EmpiricalPowerModel {
    /// Creates an empirical power model.
    ///
    /// * `measurements` - Power consumption measurements for utilization levels from 0% to 100% with 10% step.
    pub fn new(measurements: Vec<f64>) -> Self {
        assert_eq!(
            measurements.len(),
            11,
            "Incorrect measurements size for EmpiricalPowerModel, should be 11"
        );
        Self { measurements }
    }

    /// HP ProLiant ML110 G4 (Intel Xeon 3040).
    pub fn hp_proliant_ml110_g4() -> Self {
        Self::new(vec![86., 89.4, 92.6, 96., 99.5, 102., 106., 108., 112., 114., 117.])
    }

    /// HP ProLiant ML110 G5 (Intel Xeon 3075).
    pub fn hp_proliant_ml110_g5() -> Self {
        Self::new(vec![93.7, 97., 101., 105., 110., 116., 121., 125., 129., 133., 135.])
    }
}

impl CpuPowerModel for EmpiricalPowerModel {
    fn get_power(&self, utilization: f64) -> Result<f64> {
        check_utilization(utilization)?;
        let floor_idx = (utilization * 10.).floor() as usize;
        let ceil_idx = (utilization * 10.).ceil() as usize;
        let floor_power = self.measurements[floor_idx];
        if floor_idx == ceil_idx {
            return Ok(floor_power);
        }
        let ceil_power = self.measurements[ceil_idx];
        Ok(floor_power + (ceil_power - floor_power) * (utilization * 10. - floor_idx as f64))
    }
}

/// Creates power model from config string, e.g. `Linear[min=86,max=117]` or `HpProLiantMl110G5`.
pub fn power_model_resolver(config_str: &str) -> Result<Box<dyn CpuPowerModel>> {
    let (name, options) = parse_config_value(config_str);
    let options = parse_options(&options.unwrap_or_default());
    match name.as_str() {
        "Linear" => Ok(Box::new(LinearPowerModel::new(
            parse_option(&options, "min", config_str, 0.)?,
            parse_option(&options, "max", config_str, 1.)?,
        ))),
        "NonLinear" => Ok(Box::new(NonLinearPowerModel::new(
            parse_option(&options, "static", config_str, 0.)?,
            parse_option(&options, "factor", config_str, 1.)?,
            parse_option(&options, "alpha", config_str, 1.)?,
        ))),
        "HpProLiantMl110G4" => Ok(Box::new(EmpiricalPowerModel::hp_proliant_ml110_g4())),
        "HpProLiantMl110G5" => Ok(Box::new(EmpiricalPowerModel::hp_proliant_ml110_g5())),
        _ => Err(Error::UnknownComponent(config_str.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn test_linear_model() {
        let model = LinearPowerModel::new(0.4, 1.);
        assert_abs_diff_eq!(model.get_power(0.).unwrap(), 0.4);
        assert_abs_diff_eq!(model.get_power(0.1).unwrap(), 0.46);
        assert_abs_diff_eq!(model.get_power(0.5).unwrap(), 0.7);
        assert_abs_diff_eq!(model.get_power(1.).unwrap(), 1.);
    }

    #[test]
    fn test_non_linear_model() {
        let model = NonLinearPowerModel::new(100., 0.01, 2.);
        assert_abs_diff_eq!(model.get_power(0.).unwrap(), 100.);
        assert_abs_diff_eq!(model.get_power(0.5).unwrap(), 125.);
        assert_abs_diff_eq!(model.get_power(1.).unwrap(), 200.);
    }

    #[test]
    fn test_empirical_model() {
        let model = EmpiricalPowerModel::hp_proliant_ml110_g4();
        assert_abs_diff_eq!(model.get_power(0.).unwrap(), 86.);
        assert_abs_diff_eq!(model.get_power(0.05).unwrap(), 87.7, epsilon = 1e-9);
        assert_abs_diff_eq!(model.get_power(1.).unwrap(), 117.);
    }

    #[test]
    fn test_invalid_utilization() {
        let models: Vec<Box<dyn CpuPowerModel>> = vec![
            Box::new(LinearPowerModel::new(0.4, 1.)),
            Box::new(NonLinearPowerModel::new(100., 0.01, 2.)),
            Box::new(EmpiricalPowerModel::hp_proliant_ml110_g5()),
        ];
        for model in models {
            assert!(matches!(model.get_power(1.2), Err(Error::InvalidUtilization(_))));
            assert!(matches!(model.get_power(-0.1), Err(Error::InvalidUtilization(_))));
        }
    }

    #[test]
    fn test_resolver() {
        let model = power_model_resolver("Linear[min=100,max=200]").unwrap();
        assert_abs_diff_eq!(model.get_power(0.25).unwrap(), 125.);
        let model = power_model_resolver("HpProLiantMl110G5").unwrap();
        assert_abs_diff_eq!(model.get_power(1.).unwrap(), 135.);
        assert!(matches!(power_model_resolver("Cubic"), Err(Error::UnknownComponent(_))));
    }
}
