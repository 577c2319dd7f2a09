use std::f64::consts::PI;

use crate::calendar::Step;
use crate::error::ModelError;
use crate::model::{ModelType, WaterBalanceModel};
use crate::variable::Var;

/// Solar constant (MJ m⁻² min⁻¹).
const GSC: f64 = 0.0820;

impl WaterBalanceModel {
    /// Estimate the potential evapotranspiration from the air temperature and
    /// the latitude, via the extraterrestrial radiation of each day of year.
    ///
    /// Daily models get one estimate per day; monthly models get the sum over
    /// the days of the month. Negative daily estimates contribute nothing.
    /// The PET column is filled and flagged as an input.
    pub fn estimate_pet_from_latitude(&mut self, latitude: f64) -> Result<(), ModelError> {
        if self.time_steps() == 0 {
            return Err(ModelError::VariablesNotInitialized);
        }
        if !self.is_input(Var::T) {
            return Err(ModelError::MissingTemperature);
        }

        let rad_lat = latitude.to_radians();
        for ts in 0..self.time_steps() {
            let (begin_doy, end_doy) = match self.model_type() {
                ModelType::Daily => {
                    let doy = self.calen[ts].day_of_year();
                    (doy, doy)
                }
                ModelType::Monthly => {
                    let mut begin = self.calen[ts];
                    begin.day = 1;
                    let mut end = self.calen[ts];
                    end.increase(Step::Month);
                    end.day = 1;
                    end.decrease(Step::Day);
                    (begin.day_of_year(), end.day_of_year())
                }
            };
            let days_in_year = if self.calen[ts].is_leap() { 366.0 } else { 365.0 };

            self.var[(ts, Var::Pet)] = 0.0;
            for doy in begin_doy..=end_doy {
                let angle = doy as f64 * 2.0 * PI / days_in_year;
                let dr = 1.0 + 0.033 * angle.cos();
                let declination = 0.409 * (angle - 1.39).sin();
                let sunset = (-rad_lat.tan() * declination.tan()).acos();
                let radiation = (24.0 * 60.0) / PI
                    * GSC
                    * dr
                    * (sunset * rad_lat.sin() * declination.sin()
                        + rad_lat.cos() * declination.cos() * sunset.sin());

                let pet = 0.408 * radiation * (self.var[(ts, Var::T)] + 5.0) / 100.0;
                if pet > 0.0 {
                    self.var[(ts, Var::Pet)] += pet;
                }
            }
        }
        self.var_is_input[Var::Pet.index()] = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn test_pet_requires_temperature() {
        let mut model = WaterBalanceModel::new(ModelType::Daily);
        assert!(matches!(
            model.estimate_pet_from_latitude(50.0),
            Err(ModelError::VariablesNotInitialized)
        ));
        model
            .set_input_series(
                NaiveDate::from_ymd_opt(2001, 6, 1).unwrap(),
                &[(Var::P, vec![0.0; 10])],
            )
            .unwrap();
        assert!(matches!(
            model.estimate_pet_from_latitude(50.0),
            Err(ModelError::MissingTemperature)
        ));
    }

    #[test]
    fn test_daily_summer_pet_is_positive() {
        let mut model = WaterBalanceModel::new(ModelType::Daily);
        model
            .set_input_series(
                NaiveDate::from_ymd_opt(2001, 6, 1).unwrap(),
                &[(Var::P, vec![0.0; 30]), (Var::T, vec![20.0; 30])],
            )
            .unwrap();
        model.estimate_pet_from_latitude(50.0).unwrap();

        assert!(model.is_input(Var::Pet));
        for value in model.series(Var::Pet) {
            assert!(value > 0.0);
        }
    }

    #[test]
    fn test_monthly_pet_sums_the_days() {
        let mut monthly = WaterBalanceModel::new(ModelType::Monthly);
        monthly
            .set_input_series(
                NaiveDate::from_ymd_opt(2001, 6, 1).unwrap(),
                &[(Var::P, vec![0.0; 1]), (Var::T, vec![20.0; 1])],
            )
            .unwrap();
        monthly.estimate_pet_from_latitude(50.0).unwrap();

        let mut daily = WaterBalanceModel::new(ModelType::Daily);
        daily
            .set_input_series(
                NaiveDate::from_ymd_opt(2001, 6, 1).unwrap(),
                &[(Var::P, vec![0.0; 30]), (Var::T, vec![20.0; 30])],
            )
            .unwrap();
        daily.estimate_pet_from_latitude(50.0).unwrap();

        let daily_total: f64 = daily.series(Var::Pet).iter().sum();
        let monthly_total = monthly.series(Var::Pet)[0];
        assert!((daily_total - monthly_total).abs() < 1e-9);
    }
}
