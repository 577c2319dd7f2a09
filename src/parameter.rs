use crate::calibration::ParamKind;
use crate::model::ModelType;

/// A single model parameter with its current value, the value the
/// optimization starts from and the search bounds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Parameter {
    pub value: f64,
    pub initial: f64,
    pub lower: f64,
    pub upper: f64,
}

impl Parameter {
    pub fn get(&self, kind: ParamKind) -> f64 {
        match kind {
            ParamKind::Init => self.initial,
            ParamKind::Curr => self.value,
            ParamKind::Lower => self.lower,
            ParamKind::Upper => self.upper,
        }
    }

    pub fn set(&mut self, kind: ParamKind, value: f64) {
        match kind {
            ParamKind::Init => self.initial = value,
            ParamKind::Curr => self.value = value,
            ParamKind::Lower => self.lower = value,
            ParamKind::Upper => self.upper = value,
        }
    }
}

pub(crate) const PARAM_NAMES_DAILY: [&str; 6] = ["Spa", "Alf", "Dgm", "Soc", "Mec", "Grd"];
pub(crate) const PARAM_NAMES_MONTHLY: [&str; 8] =
    ["Spa", "Dgw", "Alf", "Dgm", "Soc", "Wic", "Mec", "Grd"];

// rows: initial values, lower limits, upper limits
const PARAM_INIT_DAILY: [[f64; 6]; 3] = [
    [20.0, 0.3, 5.0, 0.3, 0.05, 0.05],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [200.0, 1.0, 200.0, 1.0, 1.0, 0.5],
];
const PARAM_INIT_MONTHLY: [[f64; 8]; 3] = [
    [147.7, 13.8, 0.000779, 15.22, 0.699, 0.342, 0.799, 0.499],
    [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
    [200.0, 20.0, 0.003, 200.0, 1.0, 1.0, 1.0, 1.0],
];

/// Positions of the daily parameters within the parameter table.
pub(crate) mod daily {
    pub const SPA: usize = 0;
    pub const ALF: usize = 1;
    pub const DGM: usize = 2;
    pub const SOC: usize = 3;
    pub const MEC: usize = 4;
    pub const GRD: usize = 5;
}

/// Positions of the monthly parameters within the parameter table.
pub(crate) mod monthly {
    pub const SPA: usize = 0;
    pub const DGW: usize = 1;
    pub const ALF: usize = 2;
    pub const DGM: usize = 3;
    pub const SOC: usize = 4;
    pub const WIC: usize = 5;
    pub const MEC: usize = 6;
    pub const GRD: usize = 7;
}

/// The default parameter table for a model type, with the initial value also
/// set as the current one.
pub fn defaults(model_type: ModelType) -> Vec<Parameter> {
    let (inits, lowers, uppers): (&[f64], &[f64], &[f64]) = match model_type {
        ModelType::Daily => (&PARAM_INIT_DAILY[0], &PARAM_INIT_DAILY[1], &PARAM_INIT_DAILY[2]),
        ModelType::Monthly => (
            &PARAM_INIT_MONTHLY[0],
            &PARAM_INIT_MONTHLY[1],
            &PARAM_INIT_MONTHLY[2],
        ),
    };
    inits
        .iter()
        .zip(lowers)
        .zip(uppers)
        .map(|((&initial, &lower), &upper)| Parameter {
            value: initial,
            initial,
            lower,
            upper,
        })
        .collect()
}
