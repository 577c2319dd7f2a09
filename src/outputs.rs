use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::warn;
use ndarray::Array2;

use crate::calendar::{Date, Step};
use crate::calibration::{CalibrationProblem, Optimizer, ParamKind};
use crate::error::{ModelError, OutputError};
use crate::metric::Criterion;
use crate::model::{ModelType, WaterBalanceModel};
use crate::variable::{Var, VarMatrix};

/// What the payload of an output file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// The full series in the model's own time step.
    Series,
    /// The daily series; fails for a monthly model.
    SeriesDaily,
    /// The monthly series, aggregated from the days for a daily model.
    SeriesMonthly,
    /// Min/mean/max of each variable per month of the hydrological year.
    Characteristics,
}

/// Min, mean and max of every variable for the 12 months of the hydrological
/// year, computed over complete years only.
#[derive(Debug, Clone)]
pub struct MonthlyCharacteristics {
    pub min: Array2<f64>,
    pub mean: Array2<f64>,
    pub max: Array2<f64>,
}

/// First and last month of the hydrological year (November to October).
const BEGIN_HYDROL_YEAR: u32 = 11;
const END_HYDROL_YEAR: u32 = 10;
const MONTHS_IN_YEAR: usize = 12;

/// Variables that are averaged instead of summed when a month is aggregated.
fn is_averaged(var: Var) -> bool {
    matches!(var, Var::T | Var::H | Var::Sw | Var::Ss | Var::Gs | Var::Ds)
}

/// Find the first complete hydrological year in a monthly calendar and count
/// the complete years after it.
pub(crate) fn years_count(calendar: &[Date]) -> (usize, usize) {
    let first = calendar.iter().position(|d| d.month == BEGIN_HYDROL_YEAR);
    let Some(init_m) = first else {
        return (0, 0);
    };
    let Some(last_m) = calendar.iter().rposition(|d| d.month == END_HYDROL_YEAR) else {
        return (init_m, 0);
    };
    if last_m < init_m {
        return (init_m, 0);
    }
    (init_m, (last_m - init_m + 1) / MONTHS_IN_YEAR)
}

impl WaterBalanceModel {
    /// Aggregate the daily series into complete months. A partial month at
    /// either end of the series is trimmed off.
    pub(crate) fn monthly_series(&mut self) -> Result<(), ModelError> {
        self.var_mon = None;
        self.calen_mon.clear();
        if self.time_steps() == 0 {
            return Err(ModelError::VariablesNotInitialized);
        }

        let init_date = self.calen[0];
        let last_date = self.calen[self.time_steps() - 1];
        let mut months = (last_date.year as i64 - init_date.year as i64 - 1) * 12
            + last_date.month as i64
            + (13 - init_date.month as i64);

        let mut eff_init = init_date;
        if init_date.day != 1 {
            months -= 1;
            eff_init.increase(Step::Month);
            eff_init.day = 1;
        }
        if months <= 0 || last_date < eff_init {
            return Err(ModelError::SeriesTooShort);
        }
        let ts_init = self
            .calen
            .iter()
            .position(|d| *d == eff_init)
            .ok_or(ModelError::SeriesTooShort)?;

        let mut next = last_date;
        next.increase(Step::Day);
        let mut eff_last = last_date;
        if next.day != 1 {
            months -= 1;
            eff_last.day = 1;
            eff_last.decrease(Step::Day);
        }
        if months <= 0 || eff_last < eff_init {
            return Err(ModelError::SeriesTooShort);
        }
        let ts_last = self
            .calen
            .iter()
            .rposition(|d| *d == eff_last)
            .ok_or(ModelError::SeriesTooShort)?;

        let months = months as usize;
        let mut var_mon = VarMatrix::new(months, self.var_count());
        let mut calen_mon = vec![Date::default(); months];
        for v in 0..self.var_count() {
            let var = Var::from_index(v);
            let mut ts = ts_init;
            for m in 0..months {
                let month = self.calen[ts].month;
                let mut sum = 0.0;
                while ts <= ts_last && self.calen[ts].month == month {
                    sum += self.var[(ts, var)];
                    ts += 1;
                }
                let month_end = self.calen[ts - 1];
                calen_mon[m] = Date { day: 1, ..month_end };
                var_mon[(m, var)] = if is_averaged(var) {
                    sum / month_end.day as f64
                } else {
                    sum
                };
            }
        }
        self.var_mon = Some(var_mon);
        self.calen_mon = calen_mon;
        Ok(())
    }

    /// Min/mean/max per month of the hydrological year, over the complete
    /// years found by [`years_count`]. With no complete year everything is
    /// zero and a warning is emitted.
    fn monthly_chars(&mut self) -> Result<(), ModelError> {
        let var_count = self.var_count();
        let mut min = Array2::from_elem((MONTHS_IN_YEAR, var_count), 999999.0);
        let mut mean = Array2::zeros((MONTHS_IN_YEAR, var_count));
        let mut max = Array2::from_elem((MONTHS_IN_YEAR, var_count), -999999.0);

        {
            let series = match self.model_type() {
                ModelType::Daily => self.var_mon.as_ref().ok_or(ModelError::SeriesTooShort)?,
                ModelType::Monthly => &self.var,
            };
            for v in 0..var_count {
                let var = Var::from_index(v);
                for year in 0..self.years {
                    for m in 0..MONTHS_IN_YEAR {
                        let value = series[(self.init_m + year * MONTHS_IN_YEAR + m, var)];
                        if value < min[[m, v]] {
                            min[[m, v]] = value;
                        }
                        if value > max[[m, v]] {
                            max[[m, v]] = value;
                        }
                        mean[[m, v]] += value;
                    }
                }
            }
        }
        if self.years == 0 {
            min.fill(0.0);
            mean.fill(0.0);
            max.fill(0.0);
            warn!("Too short time-series to calculate monthly chars (set to 0)");
        } else {
            mean /= self.years as f64;
        }
        self.chars = Some(MonthlyCharacteristics { min, mean, max });
        Ok(())
    }

    /// Compute the monthly characteristics unless they are up to date.
    pub fn compute_characteristics(&mut self) -> Result<(), ModelError> {
        if self.chars_fresh {
            return Ok(());
        }
        match self.model_type() {
            ModelType::Daily => {
                self.monthly_series()?;
                let (init_m, years) = years_count(&self.calen_mon);
                self.init_m = init_m;
                self.years = years;
            }
            ModelType::Monthly => {
                let (init_m, years) = years_count(&self.calen);
                self.init_m = init_m;
                self.years = years;
            }
        }
        self.monthly_chars()?;
        self.chars_fresh = true;
        Ok(())
    }

    pub fn characteristics(&self) -> Option<&MonthlyCharacteristics> {
        self.chars.as_ref()
    }

    /// The monthly aggregation of a daily run, if computed.
    pub fn monthly_values(&self) -> Option<&VarMatrix> {
        self.var_mon.as_ref()
    }

    /// Write the results: the initial date, the parameters, the criterion
    /// value and the requested payload. Missing values print as `NA`.
    pub fn write_file<P: AsRef<Path>>(&mut self, path: P, kind: OutputKind) -> Result<(), OutputError> {
        if self.time_steps() == 0 {
            return Err(OutputError::NoData);
        }
        let path = path.as_ref();
        let mut out = File::create(path)
            .map_err(|_| OutputError::CannotWrite(path.display().to_string()))?;

        write!(out, "Initial\n{}\n", self.calen[0])?;
        let names = self.model_type().param_names();
        for (name, param) in names.iter().zip(self.params()) {
            write!(out, "\n{}\t{}", name, param.value)?;
        }
        write!(out, "\n\nOK\t{}", self.optim.criterion_value())?;

        match kind {
            OutputKind::Series => self.write_series(&mut out, false)?,
            OutputKind::SeriesDaily => {
                if self.model_type() != ModelType::Daily {
                    return Err(OutputError::DailySeriesForMonthly);
                }
                self.write_series(&mut out, false)?;
            }
            OutputKind::SeriesMonthly => {
                if self.model_type() == ModelType::Daily {
                    self.monthly_series()?;
                    self.write_series(&mut out, true)?;
                } else {
                    self.write_series(&mut out, false)?;
                }
            }
            OutputKind::Characteristics => {
                self.compute_characteristics()?;
                self.write_chars(&mut out)?;
            }
        }
        Ok(())
    }

    /// Tab-separated payload with a variable-name header row.
    fn write_series(&self, out: &mut File, use_monthly: bool) -> Result<(), OutputError> {
        let series = if use_monthly {
            self.var_mon.as_ref().ok_or(ModelError::SeriesTooShort)?
        } else {
            &self.var
        };
        write!(out, "\n\n")?;

        let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_writer(&mut *out);
        let header: Vec<&str> = (0..series.var_count())
            .map(|v| Var::from_index(v).name(self.model_type()))
            .collect();
        wtr.write_record(&header)?;
        for ts in 0..series.time_steps() {
            let record: Vec<String> = (0..series.var_count())
                .map(|v| {
                    let var = Var::from_index(v);
                    if series.is_na(ts, var) {
                        "NA".to_string()
                    } else {
                        format!("{}", series[(ts, var)])
                    }
                })
                .collect();
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// One block per variable: the 12 months in hydrological-year order with
    /// their min, mean and max.
    fn write_chars(&self, out: &mut File) -> Result<(), OutputError> {
        let chars = self.chars.as_ref().ok_or(ModelError::SeriesTooShort)?;
        write!(out, "\n\n")?;
        for v in 0..self.var_count() {
            let var = Var::from_index(v);
            writeln!(out, "{}", var.name(self.model_type()))?;
            for m in 0..MONTHS_IN_YEAR {
                let label = if m < 2 { m + 11 } else { m - 1 };
                if self.var.has_na(var) {
                    writeln!(out, "{label}\tNA\tNA\tNA")?;
                } else {
                    writeln!(
                        out,
                        "{}\t{}\t{}\t{}",
                        label,
                        chars.min[[m, v]],
                        chars.mean[[m, v]],
                        chars.max[[m, v]]
                    )?;
                }
            }
            writeln!(out)?;
        }
        Ok(())
    }

    /// Write the optimization report: the parameter set and criterion of a
    /// gradient run, or the whole ensemble table of an SCE-DE run with all
    /// criteria re-evaluated at each ensemble optimum.
    pub fn write_optim_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), OutputError> {
        let optim = std::mem::take(&mut self.optim);
        let result = self.write_optim_report(&optim, path.as_ref());
        self.optim = optim;
        result
    }

    fn write_optim_report(&mut self, optim: &Optimizer, path: &Path) -> Result<(), OutputError> {
        let mut out = File::create(path)
            .map_err(|_| OutputError::CannotWrite(path.display().to_string()))?;
        let names = self.model_type().param_names();

        match optim {
            Optimizer::Gradient(_) => {
                for name in names {
                    write!(out, "{name}\t")?;
                }
                writeln!(out, "OK")?;
                for param in self.params() {
                    write!(out, "{}\t", param.value)?;
                }
                writeln!(out, "{}", optim.criterion_value())?;
            }
            Optimizer::SceDe(de) => {
                let config = de.config().clone();
                write!(out, "ensemble\t")?;
                for name in names {
                    write!(out, "{name}\t")?;
                }
                write!(out, "OK\t")?;
                for crit in Criterion::ALL {
                    write!(out, "{}\t", crit.name())?;
                }
                writeln!(out, "iter")?;

                for (ens, row) in de.ensemble_results().iter().enumerate() {
                    write!(out, "{}\t", ens + 1)?;
                    for (p, value) in row.params.iter().enumerate() {
                        write!(out, "{value}\t")?;
                        self.set_param(p, ParamKind::Curr, *value);
                    }
                    write!(out, "{}\t", row.criterion)?;

                    self.run(config.init_gs)?;
                    for crit in Criterion::ALL {
                        let value = self.calc_crit_runoff_baseflow(
                            crit,
                            config.weight_bf,
                            config.use_weights,
                        )?;
                        write!(out, "{}\t", crit.report_value(value))?;
                    }
                    writeln!(out, "{}", row.model_evals)?;
                }
            }
        }
        Ok(())
    }
}
