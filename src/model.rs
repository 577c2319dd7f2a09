use chrono::NaiveDate;
use log::{debug, warn};

use crate::calendar::{Date, Step, DAYS_IN_MONTH, DAYS_IN_SHORTEST};
use crate::calibration::{CalibrationProblem, Optimizer, ParamKind};
use crate::de::{DeSettings, EnsembleRow, SceDeOptimizer};
use crate::error::{ModelError, OptimError};
use crate::gradient::GradientOptimizer;
use crate::metric::{self, Criterion, Weights};
use crate::outputs::MonthlyCharacteristics;
use crate::parameter::{self, daily, monthly, Parameter};
use crate::variable::{Var, VarMatrix};

/// Critical temperature of the monthly winter balance (°C).
const T_KRIT: f64 = -8.0;

/// The simulation time step of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    Daily,
    Monthly,
}

impl ModelType {
    pub fn param_count(self) -> usize {
        match self {
            ModelType::Daily => 6,
            ModelType::Monthly => 8,
        }
    }

    /// How many leading parameters stay fixed in the second gradient phase.
    pub fn fixed_param_count(self) -> usize {
        match self {
            ModelType::Daily => 3,
            ModelType::Monthly => 4,
        }
    }

    pub fn param_names(self) -> &'static [&'static str] {
        match self {
            ModelType::Daily => &parameter::PARAM_NAMES_DAILY,
            ModelType::Monthly => &parameter::PARAM_NAMES_MONTHLY,
        }
    }

    pub(crate) fn calendar_step(self) -> Step {
        match self {
            ModelType::Daily => Step::Day,
            ModelType::Monthly => Step::Month,
        }
    }
}

/// The seasonal mode selected for one time step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Season {
    Winter,
    Melt,
    Summer,
}

/// The reservoir levels at one instant, together with the season and the
/// position in the series. A snapshot is a plain value: it lives independently
/// of the model that produced it and can restart a run later.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateSnapshot {
    pub season: Season,
    pub date: Date,
    pub time_step: usize,
    /// Snow storage (mm).
    pub snow: f64,
    /// Soil water storage (mm).
    pub soil: f64,
    /// Groundwater storage (mm).
    pub groundwater: f64,
    /// Direct-runoff storage (mm), daily models only.
    pub direct: f64,
}

/// A lumped water-balance model of one catchment.
///
/// The model owns its parameter table, the time-step by variable matrix and
/// the calendar. The life cycle is: create, install the input series, run or
/// calibrate, read the outputs.
#[derive(Debug, Clone)]
pub struct WaterBalanceModel {
    model_type: ModelType,
    water_use: bool,
    area: f64,
    pub(crate) params: Vec<Parameter>,
    pub(crate) var: VarMatrix,
    pub(crate) var_is_input: Vec<bool>,
    pub(crate) calen: Vec<Date>,
    pub(crate) sum_weights: f64,
    /// The configured optimization method.
    pub optim: Optimizer,
    // monthly aggregation of a daily run, computed on demand
    pub(crate) var_mon: Option<VarMatrix>,
    pub(crate) calen_mon: Vec<Date>,
    pub(crate) chars: Option<MonthlyCharacteristics>,
    pub(crate) chars_fresh: bool,
    /// First time step of a complete hydrological year in the monthly series.
    pub(crate) init_m: usize,
    pub(crate) years: usize,
}

impl WaterBalanceModel {
    /// Create an empty model with the default parameter table of its type.
    pub fn new(model_type: ModelType) -> Self {
        WaterBalanceModel {
            model_type,
            water_use: false,
            area: 0.0,
            params: parameter::defaults(model_type),
            var: VarMatrix::new(0, Var::BASE_COUNT),
            var_is_input: vec![false; Var::BASE_COUNT],
            calen: vec![],
            sum_weights: 0.0,
            optim: Optimizer::default(),
            var_mon: None,
            calen_mon: vec![],
            chars: None,
            chars_fresh: false,
            init_m: 0,
            years: 0,
        }
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    pub fn time_steps(&self) -> usize {
        self.var.time_steps()
    }

    pub fn var_count(&self) -> usize {
        self.var.var_count()
    }

    /// Catchment area in km².
    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn set_area(&mut self, area: f64) {
        self.area = area;
    }

    pub fn water_use(&self) -> bool {
        self.water_use
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// The first date of the installed series.
    pub fn initial_date(&self) -> Option<Date> {
        self.calen.first().copied()
    }

    /// A copy of one variable column.
    pub fn series(&self, var: Var) -> Vec<f64> {
        self.var.column(var).to_vec()
    }

    pub fn is_input(&self, var: Var) -> bool {
        self.var_is_input[var.index()]
    }

    /// Flow of a variable converted from millimetres to m³/s.
    pub fn flow_m3s(&self, time_step: usize, var: Var) -> f64 {
        let mut flow = self.var[(time_step, var)] * self.area / 24.0 / 3.6;
        if self.model_type == ModelType::Monthly {
            flow /= 30.0;
        }
        flow
    }

    /// Allocate the variable matrix and the calendar for a series length.
    pub(crate) fn init_var(&mut self, time_steps: usize) {
        let var_count = if self.water_use {
            Var::BASE_COUNT + Var::WATER_USE_COUNT
        } else {
            Var::BASE_COUNT
        };
        self.var = VarMatrix::new(time_steps, var_count);
        self.var_is_input = vec![false; var_count];
        self.calen = vec![Date::default(); time_steps];
        self.var_mon = None;
        self.calen_mon.clear();
        self.chars = None;
        self.chars_fresh = false;
    }

    /// Fill the calendar from the initial date. For monthly models the day is
    /// held at the initial one and clamped down in shorter months.
    pub(crate) fn set_calendar(&mut self, initial: Date) {
        let mut date = initial;
        for entry in self.calen.iter_mut() {
            *entry = date;
            date.increase(self.model_type.calendar_step());
        }
        if self.model_type == ModelType::Monthly && initial.day > DAYS_IN_SHORTEST {
            for entry in self.calen.iter_mut() {
                let days = DAYS_IN_MONTH[entry.month as usize - 1];
                if entry.day > days {
                    entry.day = days;
                }
            }
        }
    }

    /// Install the input series, fixing the number of time steps.
    ///
    /// Column order does not matter; a water-use variable in the list switches
    /// the model to water-use mode. A duplicated variable keeps the last
    /// column and warns.
    pub fn set_input_series(
        &mut self,
        initial_date: NaiveDate,
        columns: &[(Var, Vec<f64>)],
    ) -> Result<(), ModelError> {
        let time_steps = match columns.first() {
            Some((_, values)) if !values.is_empty() => values.len(),
            _ => return Err(ModelError::EmptySeries),
        };
        if columns.iter().any(|(_, values)| values.len() != time_steps) {
            return Err(ModelError::MismatchedSeriesLength);
        }

        if columns.iter().any(|(var, _)| var.is_water_use()) {
            self.set_water_use(true);
        }
        self.init_var(time_steps);
        self.set_calendar(Date::from(initial_date));

        for (position, (var, values)) in columns.iter().enumerate() {
            if columns[position + 1..].iter().any(|(other, _)| other == var) {
                warn!(
                    "Variable {} is set for more columns, only the last one will be used",
                    var.name(self.model_type)
                );
            }
            for (ts, value) in values.iter().enumerate() {
                self.var[(ts, *var)] = *value;
            }
            self.var_is_input[var.index()] = true;
        }
        Ok(())
    }

    /// Toggle the water-use variable block, reallocating the matrix while
    /// preserving the values of the overlapping variables.
    pub fn set_water_use(&mut self, water_use: bool) {
        if self.water_use == water_use {
            return;
        }
        self.water_use = water_use;
        let time_steps = self.var.time_steps();
        let old_var = std::mem::replace(&mut self.var, VarMatrix::new(0, Var::BASE_COUNT));
        let old_flags = std::mem::take(&mut self.var_is_input);
        let calendar = std::mem::take(&mut self.calen);

        self.init_var(time_steps);
        self.calen = calendar;
        let kept = old_var.var_count().min(self.var.var_count());
        for v in 0..kept {
            self.var_is_input[v] = old_flags[v];
        }
        for ts in 0..time_steps {
            for v in 0..kept {
                let var = Var::from_index(v);
                self.var[(ts, var)] = old_var[(ts, var)];
            }
        }
    }

    /// Switch between the daily and the monthly model. The series and all
    /// derived results are discarded; the parameter table is re-initialized.
    pub fn change_type(&mut self) {
        self.model_type = match self.model_type {
            ModelType::Daily => ModelType::Monthly,
            ModelType::Monthly => ModelType::Daily,
        };
        self.params = parameter::defaults(self.model_type);
        self.init_var(0);
    }

    /// Set parameter values by name. Unknown names warn and are skipped.
    pub fn set_params(&mut self, values: &[(&str, f64)], kind: ParamKind) {
        let names = self.model_type.param_names();
        for (name, value) in values {
            match names.iter().position(|n| n == name) {
                Some(position) => self.params[position].set(kind, *value),
                None => warn!("Parameter '{name}' does not exist in this model"),
            }
        }
    }

    /// Run the model over the whole series.
    pub fn run(&mut self, init_gs: f64) -> Result<(), ModelError> {
        self.run_span(init_gs, None, None)?;
        Ok(())
    }

    /// Run the model and capture the reservoir state at the given date.
    pub fn get_state(&mut self, init_gs: f64, date: NaiveDate) -> Result<StateSnapshot, ModelError> {
        let date = Date::from(date);
        match (self.calen.first(), self.calen.last()) {
            (Some(first), Some(last)) if date >= *first && date <= *last => {}
            _ => return Err(ModelError::DateOutsideSeries(date.to_string())),
        }
        let time_step = self
            .calen
            .iter()
            .position(|d| *d == date)
            .ok_or_else(|| ModelError::DateNotInSeries(date.to_string()))?;

        self.run_span(init_gs, None, Some(time_step))?
            .ok_or_else(|| ModelError::DateNotInSeries(date.to_string()))
    }

    /// Resume a run from a captured state; the series is recomputed from the
    /// time step after the snapshot.
    pub fn run_from_state(&mut self, state: &StateSnapshot) -> Result<(), ModelError> {
        // the state at the last time step cannot start anything
        match (self.calen.first(), self.calen.len().checked_sub(2).map(|i| &self.calen[i])) {
            (Some(first), Some(last_usable)) if state.date >= *first && state.date <= *last_usable => {}
            _ => return Err(ModelError::DateOutsideSeries(state.date.to_string())),
        }
        let time_step = self.calen[..self.calen.len() - 1]
            .iter()
            .position(|d| *d == state.date)
            .ok_or_else(|| ModelError::DateNotInSeries(state.date.to_string()))?;

        self.run_span(0.0, Some((time_step, state)), None)?;
        Ok(())
    }

    fn run_span(
        &mut self,
        init_gs: f64,
        resume: Option<(usize, &StateSnapshot)>,
        capture_at: Option<usize>,
    ) -> Result<Option<StateSnapshot>, ModelError> {
        if self.var.time_steps() == 0 {
            return Err(ModelError::VariablesNotInitialized);
        }
        if !(self.is_input(Var::P) && self.is_input(Var::T) && self.is_input(Var::Pet)) {
            return Err(ModelError::MissingRunInputs);
        }
        if self.water_use
            && !(self.is_input(Var::Pod)
                && self.is_input(Var::Pov)
                && self.is_input(Var::Pvn)
                && self.is_input(Var::Vyp))
        {
            return Err(ModelError::MissingWaterUseInputs);
        }
        self.chars_fresh = false;

        let is_daily = self.model_type == ModelType::Daily;
        let ts_begin = resume.map(|(ts, _)| ts + 1).unwrap_or(0);
        let mut season = Season::Summer;
        let mut captured = None;

        for ts in ts_begin..self.var.time_steps() {
            let (prev_season, prev_snow, prev_soil, prev_gs, prev_ds) = if ts == ts_begin {
                match resume {
                    Some((_, state)) => {
                        (state.season, state.snow, state.soil, state.groundwater, state.direct)
                    }
                    None => (Season::Summer, 0.0, self.params[daily::SPA].value, init_gs, 0.0),
                }
            } else {
                let prev_ds = if is_daily { self.var[(ts - 1, Var::Ds)] } else { 0.0 };
                (
                    season,
                    self.var[(ts - 1, Var::Ss)],
                    self.var[(ts - 1, Var::Sw)],
                    self.var[(ts - 1, Var::Gs)],
                    prev_ds,
                )
            };

            season = if self.var[(ts, Var::T)] >= 0.0 {
                if prev_season == Season::Winter || (prev_season == Season::Melt && prev_snow > 0.0)
                {
                    Season::Melt
                } else {
                    Season::Summer
                }
            } else {
                Season::Winter
            };
            debug!("Step #{ts}: {} mode {season:?}", self.calen[ts]);

            match (self.model_type, season) {
                (ModelType::Daily, Season::Winter) => {
                    self.winter_daily(ts, prev_snow);
                    self.winter_balance(ts, prev_soil);
                }
                (ModelType::Daily, Season::Melt) => {
                    self.melt_daily(ts, prev_snow);
                    self.winter_balance(ts, prev_soil);
                }
                (ModelType::Daily, Season::Summer) => self.summer_balance(ts, prev_soil),
                (ModelType::Monthly, Season::Winter) => {
                    self.winter_monthly(ts, prev_snow);
                    self.winter_balance(ts, prev_soil);
                }
                (ModelType::Monthly, Season::Melt) => {
                    self.melt_monthly(ts, prev_snow);
                    self.winter_balance(ts, prev_soil);
                }
                (ModelType::Monthly, Season::Summer) => self.summer_balance(ts, prev_soil),
            }
            match self.model_type {
                ModelType::Daily => self.divide_daily(ts, season, prev_ds, prev_gs),
                ModelType::Monthly => self.divide_monthly(ts, season, prev_gs),
            }

            if capture_at == Some(ts) {
                captured = Some(StateSnapshot {
                    season,
                    date: self.calen[ts],
                    time_step: ts,
                    snow: self.var[(ts, Var::Ss)],
                    soil: self.var[(ts, Var::Sw)],
                    groundwater: self.var[(ts, Var::Gs)],
                    direct: if is_daily { self.var[(ts, Var::Ds)] } else { 0.0 },
                });
            }
        }
        Ok(captured)
    }

    /// Daily winter: precipitation accumulates as snow, no infiltration.
    fn winter_daily(&mut self, ts: usize, prev_snow: f64) {
        self.var[(ts, Var::Inf)] = 0.0;
        let snow = prev_snow + self.var[(ts, Var::P)] - self.var[(ts, Var::Pet)];
        if snow < 0.0 {
            self.var[(ts, Var::Ss)] = 0.0;
            self.var[(ts, Var::Et)] = prev_snow + self.var[(ts, Var::P)];
        } else {
            self.var[(ts, Var::Ss)] = snow;
            self.var[(ts, Var::Et)] = self.var[(ts, Var::Pet)];
        }
    }

    /// Monthly winter: above the critical temperature part of the pack is
    /// released as liquid water.
    fn winter_monthly(&mut self, ts: usize, prev_snow: f64) {
        self.var[(ts, Var::Dr)] = 0.0;
        self.var[(ts, Var::Et)] = self.var[(ts, Var::Pet)];

        if self.var[(ts, Var::T)] > T_KRIT {
            let potential = (self.var[(ts, Var::T)] - T_KRIT) * self.params[monthly::DGW].value;
            let actual = prev_snow + self.var[(ts, Var::P)] - self.var[(ts, Var::Pet)];
            if actual > potential {
                self.var[(ts, Var::Inf)] = potential;
                self.var[(ts, Var::Ss)] = actual - potential;
            } else {
                self.var[(ts, Var::Ss)] = 0.0;
                if actual > 0.0 {
                    self.var[(ts, Var::Inf)] = actual;
                } else {
                    self.var[(ts, Var::Inf)] = 0.0;
                    self.var[(ts, Var::Et)] = self.var[(ts, Var::P)] + prev_snow;
                }
            }
        } else {
            self.var[(ts, Var::Ss)] = prev_snow + self.var[(ts, Var::P)] - self.var[(ts, Var::Pet)];
            self.var[(ts, Var::Inf)] = 0.0;
        }
    }

    /// Daily melting: the degree-day melt competes with the available pack.
    fn melt_daily(&mut self, ts: usize, prev_snow: f64) {
        let potential = self.var[(ts, Var::T)] * self.params[daily::DGM].value;
        let melt = if potential >= prev_snow {
            self.var[(ts, Var::Ss)] = 0.0;
            prev_snow
        } else {
            self.var[(ts, Var::Ss)] = prev_snow - potential;
            potential
        };

        if self.var[(ts, Var::P)] > self.var[(ts, Var::Pet)] {
            self.var[(ts, Var::Inf)] = melt + self.var[(ts, Var::P)] - self.var[(ts, Var::Pet)];
            self.var[(ts, Var::Et)] = self.var[(ts, Var::Pet)];
        } else {
            // all melted snow infiltrates, the whole precipitation evaporates
            self.var[(ts, Var::Inf)] = melt;
            self.var[(ts, Var::Et)] = self.var[(ts, Var::P)];
        }
    }

    /// Monthly melting.
    fn melt_monthly(&mut self, ts: usize, prev_snow: f64) {
        self.var[(ts, Var::Dr)] = 0.0;
        self.var[(ts, Var::Et)] = self.var[(ts, Var::Pet)];

        let potential =
            self.var[(ts, Var::T)] * self.params[monthly::DGM].value + self.var[(ts, Var::P)];
        let actual = prev_snow + self.var[(ts, Var::P)] - self.var[(ts, Var::Pet)];
        if actual >= potential {
            self.var[(ts, Var::Inf)] = potential;
            self.var[(ts, Var::Ss)] = actual - potential;
        } else {
            self.var[(ts, Var::Ss)] = 0.0;
            if actual > 0.0 {
                self.var[(ts, Var::Inf)] = actual;
            } else {
                self.var[(ts, Var::Inf)] = 0.0;
                self.var[(ts, Var::Et)] = self.var[(ts, Var::P)] + prev_snow;
            }
        }
    }

    /// Soil balance after the winter and melt branches: infiltration fills
    /// the soil, the excess percolates.
    fn winter_balance(&mut self, ts: usize, prev_soil: f64) {
        let capacity = self.params[daily::SPA].value;
        let soil = prev_soil + self.var[(ts, Var::Inf)];
        if soil >= capacity {
            self.var[(ts, Var::Perc)] = soil - capacity;
            self.var[(ts, Var::Sw)] = capacity;
        } else {
            self.var[(ts, Var::Sw)] = soil;
            self.var[(ts, Var::Perc)] = 0.0;
        }
    }

    /// Summer surface and soil balance. When the infiltration cannot cover
    /// the evaporation demand the soil is depleted exponentially.
    fn summer_balance(&mut self, ts: usize, prev_soil: f64) {
        let capacity = self.params[daily::SPA].value;
        self.var[(ts, Var::Ss)] = 0.0;

        match self.model_type {
            ModelType::Daily => self.var[(ts, Var::Dr)] = 0.0,
            ModelType::Monthly => {
                let direct = self.params[monthly::ALF].value
                    * self.var[(ts, Var::P)].powi(2)
                    * prev_soil
                    / capacity;
                self.var[(ts, Var::Dr)] = direct.min(self.var[(ts, Var::P)]);
            }
        }
        self.var[(ts, Var::Inf)] = self.var[(ts, Var::P)] - self.var[(ts, Var::Dr)];

        if self.var[(ts, Var::Inf)] < self.var[(ts, Var::Pet)] {
            let soil = prev_soil
                * ((self.var[(ts, Var::Inf)] - self.var[(ts, Var::Pet)]) / capacity).exp();
            self.var[(ts, Var::Sw)] = soil;
            self.var[(ts, Var::Et)] = self.var[(ts, Var::Inf)] + prev_soil - soil;
            self.var[(ts, Var::Perc)] = 0.0;
        } else {
            self.var[(ts, Var::Et)] = self.var[(ts, Var::Pet)];
            let soil = prev_soil + self.var[(ts, Var::Inf)] - self.var[(ts, Var::Et)];
            if soil > capacity {
                self.var[(ts, Var::Perc)] = soil - capacity;
                self.var[(ts, Var::Sw)] = capacity;
            } else {
                self.var[(ts, Var::Sw)] = soil;
                self.var[(ts, Var::Perc)] = 0.0;
            }
        }
    }

    /// Daily runoff divider: percolation is split between the direct-runoff
    /// storage and the groundwater, which releases the baseflow.
    fn divide_daily(&mut self, ts: usize, season: Season, prev_ds: f64, prev_gs: f64) {
        let perc = self.var[(ts, Var::Perc)];
        let to_direct = match season {
            Season::Melt => (self.params[daily::MEC].value * perc.powi(2)).min(perc),
            Season::Summer => (self.params[daily::SOC].value * perc.powi(2)).min(perc),
            Season::Winter => 0.0,
        };
        self.var[(ts, Var::Rc)] = (perc - to_direct).max(0.0);

        self.var[(ts, Var::Bf)] = self.params[daily::GRD].value * prev_gs;
        self.var[(ts, Var::Gs)] = self.var[(ts, Var::Rc)] + prev_gs - self.var[(ts, Var::Bf)];
        self.var[(ts, Var::Ds)] = to_direct + (1.0 - self.params[daily::ALF].value) * prev_ds;
        self.var[(ts, Var::Dr)] = self.params[daily::ALF].value * self.var[(ts, Var::Ds)];
        self.var[(ts, Var::Rm)] = self.var[(ts, Var::Bf)] + self.var[(ts, Var::Dr)];

        self.include_water_use(ts);
    }

    /// Monthly runoff divider with a season-dependent interflow coefficient.
    fn divide_monthly(&mut self, ts: usize, season: Season, prev_gs: f64) {
        let coefficient = match season {
            Season::Melt => self.params[monthly::MEC].value,
            Season::Winter => self.params[monthly::WIC].value,
            Season::Summer => self.params[monthly::SOC].value,
        };
        let perc = self.var[(ts, Var::Perc)];
        self.var[(ts, Var::Rc)] = perc * (1.0 - coefficient);
        self.var[(ts, Var::Bf)] = self.params[monthly::GRD].value * prev_gs;
        self.var[(ts, Var::Gs)] = self.var[(ts, Var::Rc)] + prev_gs - self.var[(ts, Var::Bf)];
        self.var[(ts, Var::I)] = coefficient * perc;
        self.var[(ts, Var::Rm)] =
            self.var[(ts, Var::Bf)] + self.var[(ts, Var::I)] + self.var[(ts, Var::Dr)];

        self.include_water_use(ts);
    }

    /// Withdrawals and releases, floored so that no storage goes negative.
    fn include_water_use(&mut self, ts: usize) {
        if !self.water_use {
            return;
        }
        let withdrawal = self.var[(ts, Var::Pod)];
        self.var[(ts, Var::Gs)] -= withdrawal;
        let net_surface_use =
            self.var[(ts, Var::Pov)] - self.var[(ts, Var::Pvn)] + self.var[(ts, Var::Vyp)];
        self.var[(ts, Var::Rm)] -= net_surface_use;
        if self.var[(ts, Var::Gs)] < 0.0 {
            self.var[(ts, Var::Gs)] = 0.0;
        }
        if self.var[(ts, Var::Rm)] < 0.0 {
            self.var[(ts, Var::Rm)] = 0.0;
        }
    }

    /// A criterion between an observed and a modelled variable.
    pub fn calc_crit(
        &self,
        crit: Criterion,
        var_obs: Var,
        var_mod: Var,
        use_weights: bool,
    ) -> Result<f64, ModelError> {
        let weights = use_weights.then(|| Weights {
            wei: self.var.column(Var::Wei),
            sum: self.sum_weights,
        });
        metric::evaluate(crit, self.var.column(var_obs), self.var.column(var_mod), weights)
    }

    /// The runoff criterion, blended with the baseflow one when requested.
    pub(crate) fn calc_crit_runoff_baseflow(
        &self,
        crit: Criterion,
        weight_bf: f64,
        use_weights: bool,
    ) -> Result<f64, ModelError> {
        let mut ok = self.calc_crit(crit, Var::R, Var::Rm, use_weights)?;
        if weight_bf > f64::EPSILON {
            ok = (1.0 - weight_bf) * ok
                + weight_bf * self.calc_crit(crit, Var::B, Var::Bf, use_weights)?;
        }
        Ok(ok)
    }

    pub(crate) fn check_inputs_for_optim(&self, with_baseflow: bool) -> Result<(), ModelError> {
        if !self.is_input(Var::R) {
            return Err(ModelError::MissingObservedRunoff);
        }
        if with_baseflow && !self.is_input(Var::B) {
            return Err(ModelError::MissingObservedBaseflow);
        }
        Ok(())
    }

    /// Configure the two-phase gradient optimization.
    pub fn set_optim_gradient(
        &mut self,
        crit: [Criterion; 2],
        weight_bf: f64,
        use_weights: bool,
        max_iter: u32,
        init_gs: f64,
    ) -> Result<(), OptimError> {
        self.optim = Optimizer::Gradient(GradientOptimizer::new(
            crit, weight_bf, use_weights, max_iter, init_gs,
        )?);
        Ok(())
    }

    /// Configure the SCE-DE optimization.
    pub fn set_optim_de(&mut self, settings: DeSettings) -> Result<(), OptimError> {
        self.optim = Optimizer::SceDe(SceDeOptimizer::new(settings)?);
        Ok(())
    }

    /// Calibrate the parameters with the configured optimizer. A failed
    /// optimization leaves the parameters as last probed.
    pub fn optimize(&mut self) -> Result<(), OptimError> {
        let mut optim = std::mem::take(&mut self.optim);
        let result = optim.optimize(self);
        self.optim = optim;
        result
    }

    /// The settings and resulting criterion of the configured optimizer.
    pub fn optim_info(&self) -> Vec<(&'static str, String)> {
        self.optim.settings()
    }

    /// Best model rows of the SCE-DE ensemble runs.
    pub fn ensemble_results(&self) -> Option<&[EnsembleRow]> {
        self.optim.ensemble_results()
    }
}

impl CalibrationProblem for WaterBalanceModel {
    fn param_count(&self) -> usize {
        self.params.len()
    }

    fn fixed_param_count(&self) -> usize {
        self.model_type.fixed_param_count()
    }

    fn param(&self, index: usize, kind: ParamKind) -> f64 {
        self.params[index].get(kind)
    }

    fn set_param(&mut self, index: usize, kind: ParamKind, value: f64) {
        self.params[index].set(kind, value);
    }

    fn param_name(&self, index: usize) -> &'static str {
        self.model_type.param_names()[index]
    }

    fn check_inputs(&self, with_baseflow: bool) -> Result<(), ModelError> {
        self.check_inputs_for_optim(with_baseflow)
    }

    fn compute_sum_weights(&mut self) {
        self.sum_weights = self.var.sum(Var::Wei);
    }

    fn run(&mut self, init_gs: f64) -> Result<(), ModelError> {
        WaterBalanceModel::run(self, init_gs)
    }

    fn criterion(
        &self,
        crit: Criterion,
        weight_bf: f64,
        use_weights: bool,
    ) -> Result<f64, ModelError> {
        self.calc_crit_runoff_baseflow(crit, weight_bf, use_weights)
    }
}
