use log::{debug, info};
use ordered_float::OrderedFloat;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::calibration::{self, CalibrationProblem, ParamKind};
use crate::error::OptimError;
use crate::metric::Criterion;

/// The differential-evolution mutation variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeType {
    BestOneBin,
    BestTwoBin,
    RandTwoBin,
}

impl DeType {
    /// How many distinct donors one mutation draws from the complex.
    fn donor_count(self) -> usize {
        match self {
            DeType::BestOneBin => 2,
            DeType::BestTwoBin => 4,
            DeType::RandTwoBin => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeType::BestOneBin => "best_one_bin",
            DeType::BestTwoBin => "best_two_bin",
            DeType::RandTwoBin => "rand_two_bin",
        }
    }
}

/// Settings of the shuffled-complex-evolution run with a differential
/// evolution inner loop.
#[derive(Debug, Clone)]
pub struct DeSettings {
    pub crit: Criterion,
    pub de_type: DeType,
    /// Number of complexes the population is dealt into.
    pub n_comp: usize,
    /// Number of members in one complex.
    pub comp_size: usize,
    /// Crossover probability.
    pub cross: f64,
    pub mutat_f: f64,
    pub mutat_k: f64,
    pub max_shuffles: usize,
    /// Generations evolved within a complex between two shuffles.
    pub n_gen_comp: usize,
    /// Number of independent optimization runs.
    pub ens_count: usize,
    /// A positive seed makes the whole trajectory reproducible; zero or a
    /// negative value draws the generator state from the host.
    pub seed: i64,
    pub weight_bf: f64,
    pub use_weights: bool,
    pub init_gs: f64,
}

/// The best model found by one ensemble run.
#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleRow {
    pub params: Vec<f64>,
    /// Criterion value, complemented for the efficiency criteria.
    pub criterion: f64,
    pub model_evals: u32,
}

#[derive(Debug, Clone)]
struct Member {
    params: Vec<f64>,
    fitness: f64,
}

/// Shuffled complex evolution driven by differential evolution.
#[derive(Debug, Clone)]
pub struct SceDeOptimizer {
    settings: DeSettings,
    reject_outside: bool,
    ensemble: Vec<EnsembleRow>,
    ok: f64,
}

impl SceDeOptimizer {
    pub fn new(settings: DeSettings) -> Result<Self, OptimError> {
        calibration::check_general(settings.weight_bf, settings.init_gs)?;
        Ok(SceDeOptimizer {
            settings,
            reject_outside: true,
            ensemble: vec![],
            ok: 0.0,
        })
    }

    pub fn criterion_value(&self) -> f64 {
        self.ok
    }

    pub fn ensemble_results(&self) -> &[EnsembleRow] {
        &self.ensemble
    }

    pub fn config(&self) -> &DeSettings {
        &self.settings
    }

    pub fn settings(&self) -> Vec<(&'static str, String)> {
        let s = &self.settings;
        vec![
            ("crit_value", format!("{}", self.ok)),
            ("weight_BF", format!("{}", s.weight_bf)),
            ("use_weights", format!("{}", s.use_weights)),
            ("init_GS", format!("{}", s.init_gs)),
            ("crit", s.crit.name().to_string()),
            ("DE_type", s.de_type.name().to_string()),
            ("n_comp", format!("{}", s.n_comp)),
            ("comp_size", format!("{}", s.comp_size)),
            ("cross", format!("{}", s.cross)),
            ("mutat_f", format!("{}", s.mutat_f)),
            ("mutat_k", format!("{}", s.mutat_k)),
            ("maxn_shuffles", format!("{}", s.max_shuffles)),
            ("n_gen_comp", format!("{}", s.n_gen_comp)),
            ("ens_count", format!("{}", s.ens_count)),
            ("seed", format!("{}", s.seed)),
        ]
    }

    pub fn optimize<A: CalibrationProblem>(&mut self, adapter: &mut A) -> Result<(), OptimError> {
        let (lower, upper) = calibration::prepare(adapter, self.settings.use_weights, self.settings.weight_bf)?;
        if self.settings.n_comp == 0 {
            return Err(OptimError::NoComplexes);
        }
        if self.settings.comp_size == 0 {
            return Err(OptimError::EmptyComplex);
        }
        if self.settings.ens_count == 0 {
            return Err(OptimError::NoEnsembles);
        }
        let popul_size = self.settings.n_comp * self.settings.comp_size;

        let mut rng = if self.settings.seed > 0 {
            StdRng::seed_from_u64(self.settings.seed as u64)
        } else {
            StdRng::from_entropy()
        };

        self.ensemble.clear();
        for ens in 0..self.settings.ens_count {
            let mut model_evals = 0u32;
            let mut population =
                self.initial_population(adapter, &lower, &upper, popul_size, &mut rng, &mut model_evals)?;

            let mut best = best_member(&population);
            for _ in 0..self.settings.max_shuffles {
                population.sort_by_key(|member| OrderedFloat(member.fitness));
                best = population[0].clone();

                let mut complexes = deal_complexes(&population, self.settings.n_comp);
                for complex in complexes.iter_mut() {
                    self.evolve_complex(
                        adapter,
                        complex,
                        &mut best,
                        &lower,
                        &upper,
                        &mut rng,
                        &mut model_evals,
                    )?;
                }
                population = complexes.into_iter().flatten().collect();
            }
            info!(
                "Ensemble {}: criterion {} after {} model evaluations",
                ens + 1,
                self.settings.crit.report_value(best.fitness),
                model_evals
            );
            self.ensemble.push(EnsembleRow {
                criterion: self.settings.crit.report_value(best.fitness),
                params: best.params,
                model_evals,
            });
        }

        // the last ensemble optimum becomes the model's parameter set
        let last = &self.ensemble[self.ensemble.len() - 1];
        for (p, value) in last.params.iter().enumerate() {
            adapter.set_param(p, ParamKind::Curr, *value);
        }
        adapter.run(self.settings.init_gs)?;
        let ok = adapter.criterion(self.settings.crit, self.settings.weight_bf, self.settings.use_weights)?;
        self.ok = self.settings.crit.report_value(ok);
        Ok(())
    }

    /// Stratified Latin-hypercube start: each parameter range is split into
    /// `popul_size` equal strata, visited once in a random permutation, with a
    /// fresh uniform offset inside each stratum.
    fn initial_population<A: CalibrationProblem>(
        &self,
        adapter: &mut A,
        lower: &[f64],
        upper: &[f64],
        popul_size: usize,
        rng: &mut StdRng,
        model_evals: &mut u32,
    ) -> Result<Vec<Member>, OptimError> {
        let par_count = lower.len();
        let mut points = vec![vec![0.0; par_count]; popul_size];
        let mut strata: Vec<usize> = (1..=popul_size).collect();
        for p in 0..par_count {
            strata.shuffle(rng);
            for (k, point) in points.iter_mut().enumerate() {
                let offset: f64 = rng.gen();
                point[p] = lower[p]
                    + (upper[p] - lower[p]) * (strata[k] as f64 - offset) / popul_size as f64;
            }
        }

        let mut population = Vec::with_capacity(popul_size);
        for params in points {
            for (p, value) in params.iter().enumerate() {
                adapter.set_param(p, ParamKind::Curr, *value);
            }
            adapter.run(self.settings.init_gs)?;
            *model_evals += 1;
            let fitness = adapter.criterion(
                self.settings.crit,
                self.settings.weight_bf,
                self.settings.use_weights,
            )?;
            population.push(Member { params, fitness });
        }
        debug!("Initialized a population of {} members", popul_size);
        Ok(population)
    }

    /// Run `n_gen_comp` differential-evolution generations over one complex.
    fn evolve_complex<A: CalibrationProblem>(
        &self,
        adapter: &mut A,
        complex: &mut [Member],
        best: &mut Member,
        lower: &[f64],
        upper: &[f64],
        rng: &mut StdRng,
        model_evals: &mut u32,
    ) -> Result<(), OptimError> {
        let comp_size = complex.len();
        let par_count = lower.len();
        let mut donors = vec![0usize; self.settings.de_type.donor_count()];

        for _ in 0..self.settings.n_gen_comp {
            for j in 0..comp_size {
                draw_distinct(rng, &mut donors, comp_size, j)?;
                let forced_par = rng.gen_range(0..par_count);

                let mut trial = vec![0.0; par_count];
                for p in 0..par_count {
                    if rng.gen::<f64>() < self.settings.cross || p == forced_par {
                        let d = |i: usize| complex[donors[i]].params[p];
                        let value = match self.settings.de_type {
                            DeType::BestOneBin => {
                                best.params[p] + self.settings.mutat_f * (d(0) - d(1))
                            }
                            DeType::BestTwoBin => {
                                best.params[p]
                                    + self.settings.mutat_k * (d(0) - d(3))
                                    + self.settings.mutat_f * (d(1) - d(2))
                            }
                            DeType::RandTwoBin => {
                                d(0) + self.settings.mutat_k * (d(4) - d(3))
                                    + self.settings.mutat_f * (d(1) - d(2))
                            }
                        };
                        let outside = value < lower[p] || value > upper[p];
                        trial[p] = if self.reject_outside && outside {
                            complex[j].params[p]
                        } else {
                            value
                        };
                    } else {
                        trial[p] = complex[j].params[p];
                    }
                    adapter.set_param(p, ParamKind::Curr, trial[p]);
                }
                adapter.run(self.settings.init_gs)?;
                *model_evals += 1;
                let fitness = adapter.criterion(
                    self.settings.crit,
                    self.settings.weight_bf,
                    self.settings.use_weights,
                )?;
                if fitness < complex[j].fitness {
                    complex[j] = Member { params: trial, fitness };
                    if fitness < best.fitness {
                        *best = complex[j].clone();
                    }
                }
            }
        }
        Ok(())
    }
}

fn best_member(population: &[Member]) -> Member {
    population
        .iter()
        .min_by_key(|member| OrderedFloat(member.fitness))
        .cloned()
        .unwrap_or(Member { params: vec![], fitness: f64::INFINITY })
}

/// Deal the fitness-sorted population into complexes by stride: row `i` goes
/// to complex `i % n_comp`.
fn deal_complexes(population: &[Member], n_comp: usize) -> Vec<Vec<Member>> {
    let mut complexes = vec![Vec::with_capacity(population.len() / n_comp); n_comp];
    for (i, member) in population.iter().enumerate() {
        complexes[i % n_comp].push(member.clone());
    }
    complexes
}

/// Fill `out` with distinct indices below `upper_limit`, excluding
/// `forbidden`.
fn draw_distinct(
    rng: &mut StdRng,
    out: &mut [usize],
    upper_limit: usize,
    forbidden: usize,
) -> Result<(), OptimError> {
    if out.len() + 1 >= upper_limit {
        return Err(OptimError::ComplexTooSmall(out.len()));
    }
    for r in 0..out.len() {
        loop {
            let candidate = rng.gen_range(0..upper_limit);
            if candidate != forbidden && !out[..r].contains(&candidate) {
                out[r] = candidate;
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_donor_counts() {
        assert_eq!(DeType::BestOneBin.donor_count(), 2);
        assert_eq!(DeType::BestTwoBin.donor_count(), 4);
        assert_eq!(DeType::RandTwoBin.donor_count(), 5);
    }

    #[test]
    fn test_draw_distinct_excludes_forbidden() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut donors = [0usize; 4];
        for forbidden in 0..8 {
            draw_distinct(&mut rng, &mut donors, 8, forbidden).unwrap();
            assert!(!donors.contains(&forbidden));
            let mut unique = donors.to_vec();
            unique.sort_unstable();
            unique.dedup();
            assert_eq!(unique.len(), donors.len());
        }
    }

    #[test]
    fn test_draw_distinct_rejects_small_complex() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut donors = [0usize; 5];
        assert!(draw_distinct(&mut rng, &mut donors, 5, 0).is_err());
    }

    #[test]
    fn test_deal_complexes_by_stride() {
        let population: Vec<Member> = (0..6)
            .map(|i| Member { params: vec![i as f64], fitness: i as f64 })
            .collect();
        let complexes = deal_complexes(&population, 2);
        assert_eq!(complexes.len(), 2);
        let rows: Vec<f64> = complexes[0].iter().map(|m| m.fitness).collect();
        assert_eq!(rows, vec![0.0, 2.0, 4.0]);
        let rows: Vec<f64> = complexes[1].iter().map(|m| m.fitness).collect();
        assert_eq!(rows, vec![1.0, 3.0, 5.0]);
    }

    mod calibration_runs {
        use chrono::NaiveDate;

        use super::super::*;
        use crate::model::{ModelType, WaterBalanceModel};
        use crate::variable::Var;

        /// A monthly model whose observed runoff was generated by itself.
        fn synthetic_monthly_model() -> WaterBalanceModel {
            let months = 48;
            let precipitation: Vec<f64> = (0..months).map(|m| 40.0 + (m % 12) as f64 * 5.0).collect();
            let temperature: Vec<f64> = (0..months)
                .map(|m| 12.0 - 14.0 * ((m % 12) as f64 * std::f64::consts::PI / 6.0).cos())
                .collect();
            let pet: Vec<f64> = (0..months).map(|m| 20.0 + (m % 12) as f64 * 2.0).collect();

            let start = NaiveDate::from_ymd_opt(1980, 11, 1).unwrap();
            let mut model = WaterBalanceModel::new(ModelType::Monthly);
            model
                .set_input_series(
                    start,
                    &[
                        (Var::P, precipitation.clone()),
                        (Var::T, temperature.clone()),
                        (Var::Pet, pet.clone()),
                    ],
                )
                .unwrap();
            model.run(50.0).unwrap();
            let runoff = model.series(Var::Rm);

            model
                .set_input_series(
                    start,
                    &[
                        (Var::P, precipitation),
                        (Var::T, temperature),
                        (Var::Pet, pet),
                        (Var::R, runoff),
                    ],
                )
                .unwrap();
            model
        }

        fn settings(seed: i64) -> DeSettings {
            DeSettings {
                crit: Criterion::Mse,
                de_type: DeType::BestOneBin,
                n_comp: 2,
                comp_size: 8,
                cross: 0.9,
                mutat_f: 0.8,
                mutat_k: 0.5,
                max_shuffles: 4,
                n_gen_comp: 2,
                ens_count: 2,
                seed,
                weight_bf: 0.0,
                use_weights: false,
                init_gs: 50.0,
            }
        }

        #[test]
        fn test_seeded_runs_are_reproducible() {
            let mut first = synthetic_monthly_model();
            first.set_optim_de(settings(42)).unwrap();
            first.optimize().unwrap();

            let mut second = synthetic_monthly_model();
            second.set_optim_de(settings(42)).unwrap();
            second.optimize().unwrap();

            assert_eq!(first.ensemble_results().unwrap(), second.ensemble_results().unwrap());
            for (a, b) in first.params().iter().zip(second.params()) {
                assert_eq!(a.value, b.value);
            }
        }

        #[test]
        fn test_ensemble_shape_and_final_parameters() {
            let mut model = synthetic_monthly_model();
            model.set_optim_de(settings(7)).unwrap();
            model.optimize().unwrap();

            let rows = model.ensemble_results().unwrap().to_vec();
            assert_eq!(rows.len(), 2);
            for row in &rows {
                assert_eq!(row.params.len(), 8);
                assert!(row.criterion.is_finite());
                assert!(row.criterion >= 0.0);
                assert!(row.model_evals > 0);
            }
            // the last ensemble optimum was copied into the model
            let last = &rows[rows.len() - 1];
            for (param, value) in model.params().iter().zip(&last.params) {
                assert_eq!(param.value, *value);
            }
            assert!(model.optim.criterion_value().is_finite());
        }

        #[test]
        fn test_zero_complexes_is_rejected() {
            let mut model = synthetic_monthly_model();
            let mut config = settings(1);
            config.n_comp = 0;
            model.set_optim_de(config).unwrap();
            assert!(matches!(model.optimize(), Err(OptimError::NoComplexes)));
        }

        #[test]
        fn test_complex_too_small_for_donors() {
            let mut model = synthetic_monthly_model();
            let mut config = settings(1);
            config.de_type = DeType::RandTwoBin;
            config.comp_size = 5;
            model.set_optim_de(config).unwrap();
            assert!(matches!(model.optimize(), Err(OptimError::ComplexTooSmall(5))));
        }

        #[test]
        fn test_ns_report_is_bounded_by_one() {
            let mut model = synthetic_monthly_model();
            let mut config = settings(3);
            config.crit = Criterion::Ns;
            model.set_optim_de(config).unwrap();
            model.optimize().unwrap();
            for row in model.ensemble_results().unwrap() {
                assert!(row.criterion <= 1.0 + 1e-12);
            }
        }
    }
}
