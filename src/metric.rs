use ndarray::ArrayView1;

use crate::error::ModelError;

/// An optimization criterion between an observed and a modelled series.
///
/// Every criterion is minimised. The Nash-Sutcliffe forms are evaluated as
/// residuals to 1 so that a perfect match scores 0; reported values are
/// complemented back with [`Criterion::report_value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Criterion {
    /// Mean squared error.
    Mse,
    /// Mean absolute error.
    Mae,
    /// Nash-Sutcliffe efficiency.
    Ns,
    /// Nash-Sutcliffe efficiency of the log-transformed series.
    LnNs,
    /// Mean absolute percentage error.
    Mape,
}

impl Criterion {
    pub const ALL: [Criterion; 5] = [
        Criterion::Mse,
        Criterion::Mae,
        Criterion::Ns,
        Criterion::LnNs,
        Criterion::Mape,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Criterion::Mse => "MSE",
            Criterion::Mae => "MAE",
            Criterion::Ns => "NS",
            Criterion::LnNs => "LNNS",
            Criterion::Mape => "MAPE",
        }
    }

    /// Whether the internally minimised value is the residual of an
    /// efficiency and must be complemented when reported.
    pub fn is_efficiency(self) -> bool {
        matches!(self, Criterion::Ns | Criterion::LnNs)
    }

    /// The value to report to the user for an internally minimised one.
    pub fn report_value(self, minimised: f64) -> f64 {
        if self.is_efficiency() {
            1.0 - minimised
        } else {
            minimised
        }
    }
}

/// Per-step weights and their precomputed sum.
pub(crate) struct Weights<'a> {
    pub wei: ArrayView1<'a, f64>,
    pub sum: f64,
}

/// Evaluate a criterion between two series, optionally weighting the steps.
///
/// A step with a zero weight is skipped entirely; other weights are
/// normalised by the mean weight so that uniform weights reproduce the
/// unweighted value.
pub(crate) fn evaluate(
    crit: Criterion,
    observed: ArrayView1<f64>,
    modelled: ArrayView1<f64>,
    weights: Option<Weights>,
) -> Result<f64, ModelError> {
    let time_steps = observed.len() as f64;

    let mean = match crit {
        Criterion::Ns => observed.sum() / time_steps,
        Criterion::LnNs => observed.iter().map(|o| o.ln()).sum::<f64>() / time_steps,
        _ => 0.0,
    };

    let mut ok = 0.0;
    let mut num = 0.0;
    let mut den = 0.0;
    for ts in 0..observed.len() {
        let weight = match &weights {
            Some(weights) => {
                let wei = weights.wei[ts];
                if wei.abs() < f64::EPSILON {
                    continue;
                }
                wei / (weights.sum / time_steps)
            }
            None => 1.0,
        };
        let (obs, sim) = (observed[ts], modelled[ts]);
        match crit {
            Criterion::Mse => ok += weight * (obs - sim).powi(2),
            Criterion::Mae => ok += weight * (obs - sim).abs(),
            Criterion::Mape => ok += weight * (obs - sim).abs() / obs,
            Criterion::Ns => {
                num += weight * (obs - sim).powi(2);
                den += (obs - mean).powi(2);
            }
            Criterion::LnNs => {
                num += weight * (obs.ln() - sim.ln()).powi(2);
                den += (obs.ln() - mean).powi(2);
            }
        }
    }

    let ok = match crit {
        Criterion::Mse | Criterion::Mae | Criterion::Mape => ok / time_steps,
        Criterion::Ns | Criterion::LnNs => num / den,
    };
    if !ok.is_finite() {
        return Err(ModelError::CriterionNotFinite);
    }
    Ok(ok)
}

#[cfg(test)]
mod tests {
    use float_cmp::{assert_approx_eq, F64Margin};
    use ndarray::arr1;

    use super::*;

    const MARGINS: F64Margin = F64Margin { epsilon: 0.0, ulps: 2 };

    #[test]
    fn test_perfect_match() {
        let series = arr1(&[1.0, 2.5, 4.0, 0.5]);
        for crit in Criterion::ALL {
            let value = evaluate(crit, series.view(), series.view(), None).unwrap();
            assert_eq!(value, 0.0);
            assert_eq!(crit.report_value(value), if crit.is_efficiency() { 1.0 } else { 0.0 });
        }
    }

    #[test]
    fn test_mse_and_mae() {
        let observed = arr1(&[1.0, 2.0, 3.0]);
        let modelled = arr1(&[2.0, 2.0, 1.0]);
        let mse = evaluate(Criterion::Mse, observed.view(), modelled.view(), None).unwrap();
        assert_approx_eq!(f64, mse, 5.0 / 3.0, MARGINS);
        let mae = evaluate(Criterion::Mae, observed.view(), modelled.view(), None).unwrap();
        assert_approx_eq!(f64, mae, 1.0, MARGINS);
    }

    #[test]
    fn test_ns_residual_form() {
        let observed = arr1(&[1.0, 2.0, 3.0, 4.0]);
        let modelled = arr1(&[1.5, 2.0, 2.5, 4.0]);
        let residual = evaluate(Criterion::Ns, observed.view(), modelled.view(), None).unwrap();
        // sum of squared errors 0.5, variance around the mean 5
        assert_approx_eq!(f64, residual, 0.1, MARGINS);
        assert_approx_eq!(f64, Criterion::Ns.report_value(residual), 0.9, MARGINS);
    }

    #[test]
    fn test_weights_skip_zero_steps() {
        let observed = arr1(&[1.0, 2.0, 3.0]);
        let modelled = arr1(&[2.0, 5.0, 2.0]);
        let wei = arr1(&[1.0, 0.0, 1.0]);
        let weights = Weights {
            wei: wei.view(),
            sum: wei.sum(),
        };
        let mse = evaluate(Criterion::Mse, observed.view(), modelled.view(), Some(weights)).unwrap();
        // the mis-modelled middle step has zero weight; the others get 3/2
        assert_approx_eq!(f64, mse, (1.5 + 1.5) / 3.0, MARGINS);
    }

    #[test]
    fn test_uniform_weights_match_unweighted() {
        let observed = arr1(&[1.0, 2.0, 3.0, 5.0]);
        let modelled = arr1(&[1.2, 1.8, 3.3, 4.5]);
        let wei = arr1(&[1.0, 1.0, 1.0, 1.0]);
        let weighted = evaluate(
            Criterion::Mse,
            observed.view(),
            modelled.view(),
            Some(Weights { wei: wei.view(), sum: 4.0 }),
        )
        .unwrap();
        let unweighted = evaluate(Criterion::Mse, observed.view(), modelled.view(), None).unwrap();
        assert_approx_eq!(f64, weighted, unweighted, MARGINS);
    }

    #[test]
    fn test_log_ns_with_zero_flow_fails() {
        let observed = arr1(&[1.0, 0.0, 3.0]);
        let modelled = arr1(&[1.0, 1.0, 3.0]);
        assert!(evaluate(Criterion::LnNs, observed.view(), modelled.view(), None).is_err());
    }

    #[test]
    fn test_mape_with_zero_observed_fails() {
        let observed = arr1(&[0.0, 2.0]);
        let modelled = arr1(&[1.0, 2.0]);
        assert!(evaluate(Criterion::Mape, observed.view(), modelled.view(), None).is_err());
    }
}
