//! A lumped conceptual water-balance model running at a daily or monthly
//! time step, with the calibration machinery to fit its parameters to an
//! observed runoff series.
//!
//! The [`model::WaterBalanceModel`] decomposes the water budget of a
//! catchment into snowpack, soil moisture, groundwater and direct runoff
//! through a seasonal state machine driven by precipitation, air temperature
//! and potential evapotranspiration. Parameters are calibrated with either a
//! two-phase coordinate descent ([`gradient::GradientOptimizer`]) or a
//! shuffled-complex-evolution driver with a differential-evolution inner loop
//! ([`de::SceDeOptimizer`]); both drive anything implementing
//! [`calibration::CalibrationProblem`], including the multi-catchment
//! [`system::CatchmentSystem`].

pub mod calendar;
pub mod calibration;
pub mod de;
pub mod error;
pub mod gradient;
pub mod inputs;
pub mod metric;
pub mod model;
pub mod outputs;
pub mod parameter;
pub mod pet;
pub mod system;
pub mod variable;
