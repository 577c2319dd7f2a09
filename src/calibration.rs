use crate::de::{EnsembleRow, SceDeOptimizer};
use crate::error::{ModelError, OptimError};
use crate::gradient::GradientOptimizer;
use crate::metric::Criterion;

/// Which of the four values of a parameter is addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Init,
    Curr,
    Lower,
    Upper,
}

/// Something with parameters that can be run and scored.
///
/// Both the single-catchment engine and the catchment system implement this,
/// so either can be driven by the gradient or the SCE-DE optimizer. During an
/// `optimize` call the adapter is borrowed mutably and its `run` and parameter
/// setters are invoked many times.
pub trait CalibrationProblem {
    fn param_count(&self) -> usize;

    /// How many leading parameters the second gradient phase holds fixed.
    fn fixed_param_count(&self) -> usize;

    fn param(&self, index: usize, kind: ParamKind) -> f64;

    fn set_param(&mut self, index: usize, kind: ParamKind, value: f64);

    fn param_name(&self, index: usize) -> &'static str;

    /// Check that the observed series needed for scoring are available.
    fn check_inputs(&self, with_baseflow: bool) -> Result<(), ModelError>;

    /// Cache the sum of the per-step weights before a weighted optimization.
    fn compute_sum_weights(&mut self);

    fn run(&mut self, init_gs: f64) -> Result<(), ModelError>;

    /// The minimised criterion, blending runoff and baseflow by `weight_bf`.
    fn criterion(&self, crit: Criterion, weight_bf: f64, use_weights: bool)
        -> Result<f64, ModelError>;
}

/// Validate the settings shared by both optimizers.
pub(crate) fn check_general(weight_bf: f64, init_gs: f64) -> Result<(), OptimError> {
    if !(0.0..=1.0).contains(&weight_bf) {
        return Err(OptimError::WeightOutOfRange);
    }
    if init_gs < 0.0 {
        return Err(OptimError::NegativeInitialStorage);
    }
    Ok(())
}

/// Fetch the search bounds and make the adapter ready for scoring. Called once
/// on entry of either optimizer.
pub(crate) fn prepare<A: CalibrationProblem>(
    adapter: &mut A,
    use_weights: bool,
    weight_bf: f64,
) -> Result<(Vec<f64>, Vec<f64>), OptimError> {
    let par_count = adapter.param_count();
    if par_count == 0 {
        return Err(OptimError::NoParameters);
    }
    if use_weights {
        adapter.compute_sum_weights();
    }
    adapter.check_inputs(weight_bf > f64::EPSILON)?;

    let lower = (0..par_count).map(|p| adapter.param(p, ParamKind::Lower)).collect();
    let upper = (0..par_count).map(|p| adapter.param(p, ParamKind::Upper)).collect();
    Ok((lower, upper))
}

/// The configured optimization method of an engine or a catchment system.
#[derive(Debug, Clone)]
pub enum Optimizer {
    Gradient(GradientOptimizer),
    SceDe(SceDeOptimizer),
}

impl Default for Optimizer {
    fn default() -> Self {
        Optimizer::Gradient(GradientOptimizer::default())
    }
}

impl Optimizer {
    pub fn optimize<A: CalibrationProblem>(&mut self, adapter: &mut A) -> Result<(), OptimError> {
        match self {
            Optimizer::Gradient(optim) => optim.optimize(adapter),
            Optimizer::SceDe(optim) => optim.optimize(adapter),
        }
    }

    /// The criterion value of the last finished optimization, complemented
    /// for the efficiency criteria.
    pub fn criterion_value(&self) -> f64 {
        match self {
            Optimizer::Gradient(optim) => optim.criterion_value(),
            Optimizer::SceDe(optim) => optim.criterion_value(),
        }
    }

    /// The settings and the resulting criterion as name/value pairs.
    pub fn settings(&self) -> Vec<(&'static str, String)> {
        match self {
            Optimizer::Gradient(optim) => optim.settings(),
            Optimizer::SceDe(optim) => optim.settings(),
        }
    }

    /// Best model rows of the ensemble runs; `None` for the gradient method.
    pub fn ensemble_results(&self) -> Option<&[EnsembleRow]> {
        match self {
            Optimizer::Gradient(_) => None,
            Optimizer::SceDe(optim) => Some(optim.ensemble_results()),
        }
    }
}
