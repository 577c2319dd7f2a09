use log::warn;

use crate::calibration::{CalibrationProblem, Optimizer, ParamKind};
use crate::error::{ModelError, OptimError};
use crate::metric::Criterion;
use crate::model::WaterBalanceModel;
use crate::variable::Var;

/// An ordered collection of catchment models calibrated together.
///
/// The system virtualises the parameter index space over the qualifying
/// catchments, so the same optimizers that drive one engine drive the whole
/// set. The aggregate criterion is the mean of the per-catchment criteria,
/// with a penalty for a downstream flow below the upstream one when exactly
/// two catchments are optimized.
#[derive(Debug, Default)]
pub struct CatchmentSystem {
    catchments: Vec<WaterBalanceModel>,
    /// Indices of the catchments that qualified for optimization.
    optimized: Vec<usize>,
    params_per_catchment: usize,
    fixed_per_catchment: usize,
    /// The configured optimization method.
    pub optim: Optimizer,
}

impl CatchmentSystem {
    pub fn new() -> Self {
        CatchmentSystem::default()
    }

    pub fn add_catchment(&mut self, model: WaterBalanceModel) {
        self.catchments.push(model);
    }

    pub fn remove_catchment(&mut self, index: usize) -> Option<WaterBalanceModel> {
        if index < self.catchments.len() {
            self.optimized.clear();
            Some(self.catchments.remove(index))
        } else {
            None
        }
    }

    pub fn catchment(&self, index: usize) -> Option<&WaterBalanceModel> {
        self.catchments.get(index)
    }

    pub fn catchment_mut(&mut self, index: usize) -> Option<&mut WaterBalanceModel> {
        self.catchments.get_mut(index)
    }

    pub fn catchment_count(&self) -> usize {
        self.catchments.len()
    }

    /// How many catchments qualified during [`CatchmentSystem::prepare_optimization`].
    pub fn optimized_count(&self) -> usize {
        self.optimized.len()
    }

    /// Select the catchments taking part in the optimization.
    ///
    /// The first catchment with an area set is the reference; the others must
    /// match its model type, series length and first date. Catchments that do
    /// not qualify are skipped with a warning.
    pub fn prepare_optimization(&mut self) {
        self.optimized.clear();
        self.params_per_catchment = 0;
        self.fixed_per_catchment = 0;

        let mut reference: Option<usize> = None;
        for (index, model) in self.catchments.iter().enumerate() {
            if model.area() <= f64::EPSILON {
                warn!(
                    "Catchment {} will not be used for optimization because its area has not been set",
                    index + 1
                );
                continue;
            }
            match reference {
                None => {
                    reference = Some(index);
                    self.params_per_catchment = model.model_type().param_count();
                    self.fixed_per_catchment = model.model_type().fixed_param_count();
                    self.optimized.push(index);
                }
                Some(first) => {
                    let reference = &self.catchments[first];
                    if model.model_type() != reference.model_type()
                        || model.time_steps() != reference.time_steps()
                        || model.initial_date() != reference.initial_date()
                    {
                        warn!(
                            "Catchment {} has a different model type or data period and will not \
                             be used for optimization",
                            index + 1
                        );
                    } else {
                        self.optimized.push(index);
                    }
                }
            }
        }
    }

    /// Calibrate all qualifying catchments with the configured optimizer.
    pub fn optimize(&mut self) -> Result<(), OptimError> {
        if self.optimized.is_empty() {
            return Err(OptimError::NoCatchments);
        }
        let mut optim = std::mem::take(&mut self.optim);
        let result = optim.optimize(self);
        self.optim = optim;
        result
    }

    fn split_index(&self, index: usize) -> (usize, usize) {
        (index / self.params_per_catchment, index % self.params_per_catchment)
    }
}

impl CalibrationProblem for CatchmentSystem {
    fn param_count(&self) -> usize {
        self.params_per_catchment * self.optimized.len()
    }

    fn fixed_param_count(&self) -> usize {
        self.fixed_per_catchment * self.optimized.len()
    }

    fn param(&self, index: usize, kind: ParamKind) -> f64 {
        let (catchment, par) = self.split_index(index);
        self.catchments[self.optimized[catchment]].param(par, kind)
    }

    fn set_param(&mut self, index: usize, kind: ParamKind, value: f64) {
        let (catchment, par) = self.split_index(index);
        self.catchments[self.optimized[catchment]].set_param(par, kind, value);
    }

    fn param_name(&self, index: usize) -> &'static str {
        let (_, par) = self.split_index(index);
        self.catchments[self.optimized[0]].param_name(par)
    }

    fn check_inputs(&self, with_baseflow: bool) -> Result<(), ModelError> {
        for &index in &self.optimized {
            self.catchments[index].check_inputs(with_baseflow)?;
        }
        Ok(())
    }

    fn compute_sum_weights(&mut self) {
        for &index in &self.optimized.clone() {
            self.catchments[index].compute_sum_weights();
        }
    }

    fn run(&mut self, init_gs: f64) -> Result<(), ModelError> {
        for &index in &self.optimized.clone() {
            self.catchments[index].run(init_gs)?;
        }
        Ok(())
    }

    fn criterion(
        &self,
        crit: Criterion,
        weight_bf: f64,
        use_weights: bool,
    ) -> Result<f64, ModelError> {
        let mut total = 0.0;
        for &index in &self.optimized {
            total += self.catchments[index].calc_crit_runoff_baseflow(crit, weight_bf, use_weights)?;
        }
        // an upstream flow exceeding the downstream one is penalised
        let mut negative_flows = 0u32;
        if self.optimized.len() == 2 {
            let upstream = &self.catchments[self.optimized[0]];
            let downstream = &self.catchments[self.optimized[1]];
            for ts in 0..downstream.time_steps() {
                if downstream.flow_m3s(ts, Var::Rm) - upstream.flow_m3s(ts, Var::Rm) < 0.0 {
                    negative_flows += 1;
                }
            }
        }
        Ok((total + 0.1 * f64::from(negative_flows)) / self.optimized.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use float_cmp::{assert_approx_eq, F64Margin};

    use super::*;
    use crate::model::ModelType;

    const MARGINS: F64Margin = F64Margin { epsilon: 1e-9, ulps: 4 };

    fn daily_model(scale: f64, area: f64) -> WaterBalanceModel {
        let days = 120;
        let mut temperature: Vec<f64> = vec![-5.0; 30];
        temperature.extend(vec![10.0; 90]);
        let precipitation: Vec<f64> = (0..days).map(|d| scale * (3.0 + (d % 7) as f64)).collect();

        let mut model = WaterBalanceModel::new(ModelType::Daily);
        model
            .set_input_series(
                NaiveDate::from_ymd_opt(1995, 11, 1).unwrap(),
                &[
                    (Var::P, precipitation),
                    (Var::T, temperature),
                    (Var::Pet, vec![1.5; days]),
                ],
            )
            .unwrap();
        model.set_area(area);
        model.run(40.0).unwrap();
        // the modelled runoff doubles as the observation
        let runoff = model.series(Var::Rm);
        let mut columns = vec![(Var::R, runoff)];
        columns.push((Var::P, model.series(Var::P)));
        columns.push((Var::T, model.series(Var::T)));
        columns.push((Var::Pet, model.series(Var::Pet)));
        model
            .set_input_series(NaiveDate::from_ymd_opt(1995, 11, 1).unwrap(), &columns)
            .unwrap();
        model.set_area(area);
        model
    }

    #[test]
    fn test_prepare_skips_catchments_without_area() {
        let mut system = CatchmentSystem::new();
        system.add_catchment(daily_model(1.0, 10.0));
        system.add_catchment(daily_model(1.0, 0.0));
        system.add_catchment(daily_model(0.8, 5.0));
        system.prepare_optimization();
        assert_eq!(system.optimized_count(), 2);
        assert_eq!(system.param_count(), 12);
        assert_eq!(system.fixed_param_count(), 6);
    }

    #[test]
    fn test_prepare_skips_mismatched_model_type() {
        let mut monthly = WaterBalanceModel::new(ModelType::Monthly);
        monthly
            .set_input_series(
                NaiveDate::from_ymd_opt(1995, 11, 1).unwrap(),
                &[
                    (Var::P, vec![50.0; 12]),
                    (Var::T, vec![10.0; 12]),
                    (Var::Pet, vec![30.0; 12]),
                ],
            )
            .unwrap();
        monthly.set_area(3.0);

        let mut system = CatchmentSystem::new();
        system.add_catchment(daily_model(1.0, 10.0));
        system.add_catchment(monthly);
        system.prepare_optimization();
        assert_eq!(system.optimized_count(), 1);
    }

    #[test]
    fn test_virtual_parameter_index() {
        let mut system = CatchmentSystem::new();
        system.add_catchment(daily_model(1.0, 10.0));
        system.add_catchment(daily_model(0.8, 5.0));
        system.prepare_optimization();

        assert_eq!(system.param_name(0), "Spa");
        assert_eq!(system.param_name(6), "Spa");
        assert_eq!(system.param_name(11), "Grd");

        system.set_param(7, ParamKind::Curr, 0.42);
        assert_eq!(system.catchment(1).unwrap().params()[1].value, 0.42);
        assert_eq!(system.param(7, ParamKind::Curr), 0.42);
        // the first catchment is untouched
        assert_ne!(system.catchment(0).unwrap().params()[1].value, 0.42);
    }

    #[test]
    fn test_system_criterion_is_mean_plus_penalty() {
        let mut system = CatchmentSystem::new();
        system.add_catchment(daily_model(1.0, 10.0));
        system.add_catchment(daily_model(0.8, 10.0));
        system.prepare_optimization();
        system.run(40.0).unwrap();

        let first = system
            .catchment(0)
            .unwrap()
            .calc_crit_runoff_baseflow(Criterion::Mse, 0.0, false)
            .unwrap();
        let second = system
            .catchment(1)
            .unwrap()
            .calc_crit_runoff_baseflow(Criterion::Mse, 0.0, false)
            .unwrap();

        let mut negative_flows = 0;
        let upstream = system.catchment(0).unwrap();
        let downstream = system.catchment(1).unwrap();
        for ts in 0..downstream.time_steps() {
            if downstream.flow_m3s(ts, Var::Rm) < upstream.flow_m3s(ts, Var::Rm) {
                negative_flows += 1;
            }
        }
        // the smaller catchment received 20% less rain, so inversions exist
        assert!(negative_flows > 0);

        let combined = system.criterion(Criterion::Mse, 0.0, false).unwrap();
        let expected = (first + second + 0.1 * negative_flows as f64) / 2.0;
        assert_approx_eq!(f64, combined, expected, MARGINS);
    }

    #[test]
    fn test_optimize_without_catchments() {
        let mut system = CatchmentSystem::new();
        system.prepare_optimization();
        assert!(matches!(system.optimize(), Err(OptimError::NoCatchments)));
    }
}
