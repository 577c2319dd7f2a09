use std::ops::{Index, IndexMut};

use ndarray::{Array2, ArrayView1};

use crate::error::ModelError;
use crate::model::ModelType;

/// Sentinel for a missing value.
pub const NA: f64 = -999.0;
/// Anything below this is treated as missing when reporting.
pub(crate) const NA_LIMIT: f64 = -900.0;

/// A variable of the water balance, observed or modelled.
///
/// The slot at index 5 is the direct-runoff storage for daily models and the
/// interflow for monthly models; [`Var::I`] aliases it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Var {
    P,
    R,
    Rm,
    Bf,
    B,
    Ds,
    Dr,
    Pet,
    Et,
    Sw,
    Ss,
    Gs,
    Inf,
    Perc,
    Rc,
    T,
    H,
    Wei,
    Pod,
    Pov,
    Pvn,
    Vyp,
}

const VAR_NAMES_DAILY: [&str; 22] = [
    "P", "R", "RM", "BF", "B", "DS", "DR", "PET", "ET", "SW", "SS", "GS", "INF", "PERC", "RC",
    "T", "H", "WEI", "POD", "POV", "PVN", "VYP",
];
const VAR_NAMES_MONTHLY: [&str; 22] = [
    "P", "R", "RM", "BF", "B", "I", "DR", "PET", "ET", "SW", "SS", "GS", "INF", "PERC", "RC",
    "T", "H", "WEI", "POD", "POV", "PVN", "VYP",
];

impl Var {
    /// Monthly interflow, stored where daily models keep the direct-runoff
    /// storage.
    pub const I: Var = Var::Ds;

    /// Number of variables without the water-use block.
    pub const BASE_COUNT: usize = 18;
    /// Number of water-use variables.
    pub const WATER_USE_COUNT: usize = 4;

    pub(crate) const ALL: [Var; 22] = [
        Var::P,
        Var::R,
        Var::Rm,
        Var::Bf,
        Var::B,
        Var::Ds,
        Var::Dr,
        Var::Pet,
        Var::Et,
        Var::Sw,
        Var::Ss,
        Var::Gs,
        Var::Inf,
        Var::Perc,
        Var::Rc,
        Var::T,
        Var::H,
        Var::Wei,
        Var::Pod,
        Var::Pov,
        Var::Pvn,
        Var::Vyp,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub(crate) fn from_index(index: usize) -> Var {
        Var::ALL[index]
    }

    /// The display name; index 5 differs between daily and monthly models.
    pub fn name(self, model_type: ModelType) -> &'static str {
        match model_type {
            ModelType::Daily => VAR_NAMES_DAILY[self.index()],
            ModelType::Monthly => VAR_NAMES_MONTHLY[self.index()],
        }
    }

    /// Look a variable up by its display name.
    pub fn from_name(name: &str, model_type: ModelType, var_count: usize) -> Result<Var, ModelError> {
        Var::ALL[..var_count]
            .iter()
            .find(|v| v.name(model_type) == name)
            .copied()
            .ok_or_else(|| ModelError::UnknownVariable(name.to_string()))
    }

    pub fn is_water_use(self) -> bool {
        matches!(self, Var::Pod | Var::Pov | Var::Pvn | Var::Vyp)
    }
}

/// The time step by variable matrix of the model.
///
/// Freshly allocated cells hold [`NA`], except the weights which default to 1.
#[derive(Debug, Clone, PartialEq)]
pub struct VarMatrix {
    data: Array2<f64>,
}

impl VarMatrix {
    pub fn new(time_steps: usize, var_count: usize) -> Self {
        let mut data = Array2::from_elem((time_steps, var_count), NA);
        data.column_mut(Var::Wei.index()).fill(1.0);
        VarMatrix { data }
    }

    pub fn time_steps(&self) -> usize {
        self.data.nrows()
    }

    pub fn var_count(&self) -> usize {
        self.data.ncols()
    }

    pub fn column(&self, var: Var) -> ArrayView1<'_, f64> {
        self.data.column(var.index())
    }

    pub fn set_na(&mut self, var: Var) {
        self.data.column_mut(var.index()).fill(NA);
    }

    /// Whether any value of the variable is missing.
    pub fn has_na(&self, var: Var) -> bool {
        self.column(var).iter().any(|&v| v < NA_LIMIT)
    }

    pub fn is_na(&self, time_step: usize, var: Var) -> bool {
        self[(time_step, var)] < NA_LIMIT
    }

    pub fn sum(&self, var: Var) -> f64 {
        self.column(var).sum()
    }
}

impl Index<(usize, Var)> for VarMatrix {
    type Output = f64;

    fn index(&self, (time_step, var): (usize, Var)) -> &f64 {
        &self.data[[time_step, var.index()]]
    }
}

impl IndexMut<(usize, Var)> for VarMatrix {
    fn index_mut(&mut self, (time_step, var): (usize, Var)) -> &mut f64 {
        &mut self.data[[time_step, var.index()]]
    }
}
