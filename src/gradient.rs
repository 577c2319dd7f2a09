use log::debug;

use crate::calibration::{self, CalibrationProblem, ParamKind};
use crate::error::OptimError;
use crate::metric::Criterion;

const BISECTION_LIMIT: u32 = 30;
const STEP_SHRINK: f64 = 0.8;
const INITIAL_RELATIVE_STEP: f64 = 0.1;
const EPS: f64 = f64::EPSILON;

/// Two-phase coordinate-descent optimizer with step bisection.
///
/// The first phase varies all parameters under `crit[0]`; the second freezes
/// the leading [`CalibrationProblem::fixed_param_count`] parameters at their
/// phase-one optima and re-optimizes the rest under `crit[1]`.
#[derive(Debug, Clone)]
pub struct GradientOptimizer {
    pub crit: [Criterion; 2],
    pub max_iter: u32,
    pub weight_bf: f64,
    pub use_weights: bool,
    pub init_gs: f64,
    ok: f64,
}

impl Default for GradientOptimizer {
    fn default() -> Self {
        GradientOptimizer {
            crit: [Criterion::Mse, Criterion::Mape],
            max_iter: 500,
            weight_bf: 0.0,
            use_weights: false,
            init_gs: 50.0,
            ok: 0.0,
        }
    }
}

impl GradientOptimizer {
    pub fn new(
        crit: [Criterion; 2],
        weight_bf: f64,
        use_weights: bool,
        max_iter: u32,
        init_gs: f64,
    ) -> Result<Self, OptimError> {
        calibration::check_general(weight_bf, init_gs)?;
        Ok(GradientOptimizer {
            crit,
            max_iter,
            weight_bf,
            use_weights,
            init_gs,
            ok: 0.0,
        })
    }

    /// The criterion value reached by the last optimization, complemented for
    /// the efficiency criteria.
    pub fn criterion_value(&self) -> f64 {
        self.ok
    }

    pub fn settings(&self) -> Vec<(&'static str, String)> {
        vec![
            ("crit_value", format!("{}", self.ok)),
            ("weight_BF", format!("{}", self.weight_bf)),
            ("use_weights", format!("{}", self.use_weights)),
            ("init_GS", format!("{}", self.init_gs)),
            ("crit_part1", self.crit[0].name().to_string()),
            ("crit_part2", self.crit[1].name().to_string()),
            ("max_iter", format!("{}", self.max_iter)),
        ]
    }

    pub fn optimize<A: CalibrationProblem>(&mut self, adapter: &mut A) -> Result<(), OptimError> {
        let (lower, upper) = calibration::prepare(adapter, self.use_weights, self.weight_bf)?;
        let par_count = lower.len();
        let fix_count = adapter.fixed_param_count();
        let mut fixed_values = vec![0.0; fix_count];

        for phase in 0..2usize {
            let is_fix = phase == 1;
            for p in 0..par_count {
                let initial = adapter.param(p, ParamKind::Init);
                adapter.set_param(p, ParamKind::Curr, initial);
            }
            let start_point = (0..par_count).map(|p| adapter.param(p, ParamKind::Curr)).collect();
            let mut search = Search::new(start_point, is_fix, fix_count, self.max_iter);

            loop {
                if is_fix {
                    for p in 0..fix_count {
                        adapter.set_param(p, ParamKind::Curr, fixed_values[p]);
                    }
                }
                adapter.run(self.init_gs)?;
                self.ok = adapter.criterion(self.crit[phase], self.weight_bf, self.use_weights)?;

                if search.finished() {
                    if !is_fix {
                        for (p, fixed) in fixed_values.iter_mut().enumerate() {
                            *fixed = adapter.param(p, ParamKind::Curr);
                        }
                    }
                    break;
                }
                search.advance(self.ok, &lower, &upper, adapter)?;
                for p in 0..par_count {
                    adapter.set_param(p, ParamKind::Curr, search.point[p]);
                }
            }
            debug!(
                "Finished phase {} after {} iterations and {} bisections, criterion {}",
                phase + 1,
                search.iter,
                search.bisec,
                self.ok
            );
            if self.crit[phase].is_efficiency() {
                self.ok = 1.0 - self.ok;
            }
        }
        Ok(())
    }
}

/// The working state of one descent phase.
struct Search {
    /// The probed parameter vector.
    point: Vec<f64>,
    relative_step: Vec<f64>,
    step: Vec<f64>,
    previous: Vec<f64>,
    scratch: Vec<f64>,
    close_low: Vec<bool>,
    close_upp: Vec<bool>,
    moved_down: Vec<bool>,
    descend: Vec<bool>,
    no_gain_rounds: i32,
    prev_probe: u32,
    par: usize,
    round_saved: bool,
    ys: f64,
    yx: f64,
    yy: f64,
    iter: u32,
    bisec: u32,
    start: bool,
    end: bool,
    is_fix: bool,
    fix_count: usize,
    max_iter: u32,
}

impl Search {
    fn new(point: Vec<f64>, is_fix: bool, fix_count: usize, max_iter: u32) -> Self {
        let n = point.len();
        Search {
            point,
            relative_step: vec![INITIAL_RELATIVE_STEP; n],
            step: vec![0.0; n],
            previous: vec![0.0; n],
            scratch: vec![0.0; n],
            close_low: vec![false; n],
            close_upp: vec![false; n],
            moved_down: vec![false; n],
            descend: vec![false; n],
            no_gain_rounds: 0,
            prev_probe: 0,
            par: 0,
            round_saved: false,
            ys: 0.0,
            yx: 0.0,
            yy: 0.0,
            iter: 0,
            bisec: 0,
            start: true,
            end: false,
            is_fix,
            fix_count,
            max_iter,
        }
    }

    fn finished(&self) -> bool {
        !self.start && self.end
    }

    /// Consume one criterion evaluation and move `point` to the next probe,
    /// or flag the end of the phase.
    fn advance<A: CalibrationProblem>(
        &mut self,
        ok: f64,
        lower: &[f64],
        upper: &[f64],
        adapter: &A,
    ) -> Result<(), OptimError> {
        let n = self.point.len();
        if self.start {
            self.bisec = 0;
            for p in 0..n {
                self.descend[p] = false;
                self.previous[p] = self.point[p];
                self.scratch[p] = self.point[p];
                self.close_low[p] = false;
                self.close_upp[p] = false;

                self.step[p] = (self.relative_step[p] * self.point[p]).abs();
                let check_low = self.point[p] - 1.01 * self.step[p];
                if check_low < lower[p] + lower[p] * EPS {
                    return Err(OptimError::TooCloseToLowerBound(
                        adapter.param_name(p).to_string(),
                    ));
                }
                let check_upp = self.point[p] + 1.01 * self.step[p];
                if check_upp > upper[p] - upper[p] * EPS {
                    return Err(OptimError::TooCloseToUpperBound(
                        adapter.param_name(p).to_string(),
                    ));
                }
            }
            self.no_gain_rounds = 0;
            if self.is_fix {
                self.par = self.fix_count;
                self.iter = self.fix_count as u32;
            } else {
                self.par = 0;
                self.iter = 0;
            }
            self.yx = ok;
            self.yy = self.yx;
            self.prev_probe = 0;
            self.start = false;
            self.round_saved = false;
        }
        self.ys = ok;
        self.iter += 1;

        if self.iter > self.max_iter {
            self.end = true;
            return Ok(());
        }
        loop {
            if self.next_probe(lower, upper) {
                return Ok(());
            }
            self.no_gain_rounds += 1;
            if self.no_gain_rounds > 1 && self.bisec >= BISECTION_LIMIT {
                self.end = true;
                return Ok(());
            }
            if self.no_gain_rounds > 1 || self.round_saved {
                self.round_saved = false;
                for p in 0..n {
                    self.relative_step[p] *= STEP_SHRINK;
                    self.step[p] *= STEP_SHRINK;
                }
                self.bisec += 1;
            } else {
                self.point.copy_from_slice(&self.previous);
            }
        }
    }

    /// Shift one parameter to the next probing position. Returns false when a
    /// full round over the parameters ended without improvement.
    fn next_probe(&mut self, lower: &[f64], upper: &[f64]) -> bool {
        let n = self.point.len();
        if self.prev_probe > 0 {
            if self.ys < self.yx - self.yx * EPS {
                self.yx = self.ys;
                self.prev_probe = 0;
                self.par += 1;
            }
        } else {
            self.prev_probe = 0;
            if self.ys < self.yy - self.yy * EPS {
                self.round_saved = true;
                self.yx = self.ys;
                self.yy = self.ys;
            }
        }

        while self.par < n {
            let p = self.par;
            let descend = self.descend[p];
            if self.prev_probe == 0 {
                if descend {
                    self.point[p] -= self.step[p];
                    self.moved_down[p] = true;
                } else {
                    self.point[p] += self.step[p];
                    self.moved_down[p] = false;
                }
                let blocked = if descend { self.close_low[p] } else { self.close_upp[p] };
                if !blocked {
                    self.prev_probe = 1;
                    return true;
                }
            }
            if self.prev_probe != 2 {
                // the first direction failed or is blocked, try the opposite
                if descend {
                    self.point[p] += 2.0 * self.step[p];
                    self.moved_down[p] = false;
                } else {
                    self.point[p] -= 2.0 * self.step[p];
                    self.moved_down[p] = true;
                }
                let blocked = if descend { self.close_upp[p] } else { self.close_low[p] };
                if !blocked {
                    self.prev_probe = 2;
                    return true;
                }
            }
            // both directions exhausted, restore and move on
            if descend {
                self.point[p] -= self.step[p];
                self.moved_down[p] = true;
            } else {
                self.point[p] += self.step[p];
                self.moved_down[p] = false;
            }
            self.prev_probe = 0;
            self.par += 1;
        }
        // skipped fixed parameters still count into the iteration budget
        if self.is_fix {
            self.par = self.fix_count;
            self.iter += self.fix_count as u32;
        } else {
            self.par = 0;
        }

        if self.yy > self.yx - self.yx * EPS && self.yy < self.yx + self.yx * EPS {
            false
        } else {
            self.yy = self.yx;
            self.extrapolate(lower, upper);
            true
        }
    }

    /// After an improving round, take one extrapolated step in the accepted
    /// direction, clamping at the bounds, and refresh the bound flags.
    fn extrapolate(&mut self, lower: &[f64], upper: &[f64]) {
        let n = self.point.len();
        for p in 0..n {
            self.step[p] = (self.relative_step[p] * self.point[p]).abs();
        }
        self.no_gain_rounds = 0;
        self.round_saved = false;
        for p in 0..n {
            self.descend[p] = self.moved_down[p];
            self.scratch[p] = self.point[p];
            self.point[p] = 2.0 * self.point[p] - self.previous[p];
            self.previous[p] = self.scratch[p];

            let check_low = self.point[p] - 1.01 * self.step[p];
            if check_low > lower[p] + lower[p] * EPS {
                self.close_low[p] = false;
            } else {
                self.close_low[p] = true;
                self.point[p] = self.previous[p];
            }
            let check_upp = self.point[p] + 1.01 * self.step[p];
            if check_upp < upper[p] - upper[p] * EPS {
                self.close_upp[p] = false;
            } else {
                self.close_upp[p] = true;
                self.point[p] = self.previous[p];
            }
        }
    }
}
