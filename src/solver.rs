// Pressure history reconstruction, one root find per production step

use crate::aquifer::{AquiferModel, AquiferState};
use crate::error::{MbalError, MbalResult};
use crate::material_balance::{MaterialBalance, MaterialBalanceParameters, WaterFvf};
use crate::production::ProductionStep;
use crate::pvt::PvtProvider;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Iteration cap of each root finder attempt.
    pub max_iterations: usize,
    /// Accepted |residual| as a fraction of N * Boi.
    pub tolerance: f64,
    /// Relative offset of the second secant point and of the first bracket.
    pub bracket_step: f64,
    /// Number of bracket doublings tried before giving up.
    pub bracket_expansions: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        SolverSettings {
            max_iterations: 100,
            tolerance: 1e-9,
            bracket_step: 0.05,
            bracket_expansions: 30,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> MbalResult<()> {
        if self.max_iterations == 0 {
            return Err(MbalError::Configuration(
                "solver max_iterations must be greater than zero".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(MbalError::Configuration(format!(
                "solver tolerance must be greater than zero, got {}",
                self.tolerance
            )));
        }
        if !(self.bracket_step > 0.0 && self.bracket_step < 1.0) {
            return Err(MbalError::Configuration(format!(
                "solver bracket_step must be in (0, 1), got {}",
                self.bracket_step
            )));
        }
        Ok(())
    }
}

/// Committed state between two production steps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SolverState {
    pub pressure: f64,
    pub aquifer: Option<AquiferState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PressurePoint {
    /// Days since the start of the history
    pub time: f64,
    pub pressure: f64,
    pub cumulative_influx: f64,
}

/// Reconstructed pressures of one tank, starting with the initial pressure at
/// time zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PressureHistory {
    pub points: Vec<PressurePoint>,
}

impl PressureHistory {
    pub fn times(&self) -> Array1<f64> {
        self.points.iter().map(|p| p.time).collect()
    }

    pub fn pressures(&self) -> Array1<f64> {
        self.points.iter().map(|p| p.pressure).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Normalised residual of one step, with the bookkeeping the root finders need
/// to report a failure.
struct StepResidual<'a> {
    evaluate: &'a dyn Fn(f64) -> MbalResult<f64>,
    scale: f64,
    evaluations: Cell<usize>,
    best: Cell<(f64, f64)>,
    failure: RefCell<Option<MbalError>>,
}

impl<'a> StepResidual<'a> {
    fn new(evaluate: &'a dyn Fn(f64) -> MbalResult<f64>, scale: f64) -> Self {
        StepResidual {
            evaluate,
            scale,
            evaluations: Cell::new(0),
            best: Cell::new((f64::NAN, f64::INFINITY)),
            failure: RefCell::new(None),
        }
    }

    fn eval(&self, pressure: f64) -> anyhow::Result<f64> {
        if !pressure.is_finite() {
            anyhow::bail!("trial pressure {pressure} is not finite");
        }
        self.evaluations.set(self.evaluations.get() + 1);
        match (self.evaluate)(pressure) {
            Ok(r) => {
                let r = r / self.scale;
                if r.abs() < self.best.get().1 {
                    self.best.set((pressure, r.abs()));
                }
                Ok(r)
            }
            Err(err) => {
                let message = err.to_string();
                self.failure.borrow_mut().get_or_insert(err);
                Err(anyhow::anyhow!(message))
            }
        }
    }

    fn take_failure(&self) -> MbalResult<()> {
        match self.failure.borrow_mut().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// `pressure` if it is physical and its residual is within `tolerance`.
    fn accept(&self, pressure: f64, tolerance: f64) -> MbalResult<Option<f64>> {
        if !(pressure.is_finite() && pressure >= 0.0) {
            return Ok(None);
        }
        let r = self.eval(pressure);
        self.take_failure()?;
        Ok(r.ok().filter(|r| r.abs() <= tolerance).map(|_| pressure))
    }
}

mod roots {
    use super::{SolverSettings, StepResidual};
    use anyhow::Result;
    use peroxide::fuga::*;

    struct Attempt<'r, 'a> {
        residual: &'r StepResidual<'a>,
        guess: (f64, f64),
    }

    impl RootFindingProblem<1, 1, (f64, f64)> for Attempt<'_, '_> {
        fn function(&self, x: [f64; 1]) -> Result<[f64; 1]> {
            Ok([self.residual.eval(x[0])?])
        }
        fn initial_guess(&self) -> (f64, f64) {
            self.guess
        }
    }

    pub(super) fn secant(
        residual: &StepResidual<'_>,
        guess: (f64, f64),
        settings: &SolverSettings,
    ) -> Option<f64> {
        let finder = SecantMethod {
            max_iter: settings.max_iterations,
            tol: settings.tolerance,
        };
        finder.find(&Attempt { residual, guess }).ok().map(|x| x[0])
    }

    pub(super) fn bisection(
        residual: &StepResidual<'_>,
        bracket: (f64, f64),
        settings: &SolverSettings,
    ) -> Option<f64> {
        let finder = BisectionMethod {
            max_iter: settings.max_iterations,
            tol: settings.tolerance,
        };
        finder
            .find(&Attempt {
                residual,
                guess: bracket,
            })
            .ok()
            .map(|x| x[0])
    }
}

/// Solves the material balance for reservoir pressure step by step.
pub struct PressureSolver<'a, P: PvtProvider + ?Sized> {
    balance: MaterialBalance<'a, P>,
    aquifer: Option<&'a dyn AquiferModel>,
    settings: &'a SolverSettings,
}

impl<'a, P: PvtProvider + ?Sized> PressureSolver<'a, P> {
    pub fn new(
        params: &'a MaterialBalanceParameters,
        pvt: &'a P,
        water_fvf: WaterFvf,
        aquifer: Option<&'a dyn AquiferModel>,
        settings: &'a SolverSettings,
    ) -> MbalResult<Self> {
        params.validate()?;
        settings.validate()?;
        if let Some(model) = aquifer {
            if model.initial_pressure() != params.initial_pressure {
                log::warn!(
                    "aquifer initial pressure {} differs from reservoir initial pressure {}",
                    model.initial_pressure(),
                    params.initial_pressure
                );
            }
        }
        Ok(PressureSolver {
            balance: MaterialBalance::new(params, pvt, water_fvf),
            aquifer,
            settings,
        })
    }

    pub fn initial_state(&self) -> SolverState {
        SolverState {
            pressure: self.balance.params().initial_pressure,
            aquifer: self.aquifer.map(|model| model.initial_state(0.0)),
        }
    }

    fn bracket(&self, residual: &StepResidual<'_>, seed: f64) -> MbalResult<Option<(f64, f64)>> {
        let mut width = seed * self.settings.bracket_step;
        for _ in 0..self.settings.bracket_expansions {
            let (lo, hi) = ((seed - width).max(0.0), seed + width);
            let (r_lo, r_hi) = (residual.eval(lo), residual.eval(hi));
            residual.take_failure()?;
            if let (Ok(r_lo), Ok(r_hi)) = (r_lo, r_hi) {
                if r_lo * r_hi <= 0.0 {
                    return Ok(Some((lo, hi)));
                }
            }
            width *= 2.0;
        }
        Ok(None)
    }

    /// Finds the pressure of production step `index` from the committed `state`
    /// and returns the next committed state.
    ///
    /// The previous pressure is tried first, then a secant search seeded from it,
    /// then bisection inside an expanding bracket.
    ///
    /// # Errors
    /// `RootFindingFailure` when no pressure brings the normalised residual within
    /// tolerance; any PVT error raised while evaluating the residual.
    pub fn solve_step(
        &self,
        index: usize,
        state: &SolverState,
        step: &ProductionStep,
    ) -> MbalResult<SolverState> {
        let influx = |p: f64| match (self.aquifer, &state.aquifer) {
            (Some(model), Some(aq)) => model.trial_influx(aq, p, step.elapsed_days),
            _ => 0.0,
        };
        let evaluate = |p: f64| {
            self.balance
                .residual(p, step.cumulative_oil, step.cumulative_water, influx)
        };
        let residual = StepResidual::new(&evaluate, self.balance.scale());
        let tol = self.settings.tolerance;
        let seed = state.pressure;

        let mut pressure = residual.accept(seed, tol)?;
        if pressure.is_none() {
            let guess = (seed, seed * (1.0 - self.settings.bracket_step));
            let root = roots::secant(&residual, guess, self.settings);
            residual.take_failure()?;
            pressure = match root {
                Some(root) => residual.accept(root, tol)?,
                None => None,
            };
        }
        if pressure.is_none() {
            log::warn!("step={index} secant search failed from {seed} psi, bracketing");
            if let Some(bracket) = self.bracket(&residual, seed)? {
                let root = roots::bisection(&residual, bracket, self.settings);
                residual.take_failure()?;
                pressure = match root {
                    Some(root) => residual.accept(root, tol)?,
                    None => None,
                };
            }
        }

        let pressure = pressure.ok_or_else(|| {
            let (_, best) = residual.best.get();
            MbalError::RootFindingFailure {
                step: index,
                residual_at_best: best * residual.scale,
                iterations: residual.evaluations.get(),
            }
        })?;

        let aquifer = match (self.aquifer, &state.aquifer) {
            (Some(model), Some(aq)) => Some(model.advance(aq, pressure, step.elapsed_days)),
            _ => None,
        };
        log::debug!(
            "step={index} time={} pressure={pressure} influx={} evaluations={}",
            step.elapsed_days,
            aquifer.map_or(0.0, |a| a.cumulative_influx),
            residual.evaluations.get()
        );
        Ok(SolverState { pressure, aquifer })
    }

    /// Folds the production steps into a pressure history. The first point is
    /// the initial pressure at time zero; a failed step aborts the series.
    pub fn reconstruct(&self, steps: &[ProductionStep]) -> MbalResult<PressureHistory> {
        let initial = self.initial_state();
        let origin = PressurePoint {
            time: 0.0,
            pressure: initial.pressure,
            cumulative_influx: 0.0,
        };
        let (_, points) = steps.iter().enumerate().try_fold(
            (initial, vec![origin]),
            |(state, mut points), (index, step)| {
                let next = self.solve_step(index, &state, step)?;
                points.push(PressurePoint {
                    time: step.elapsed_days,
                    pressure: next.pressure,
                    cumulative_influx: next.aquifer.map_or(0.0, |a| a.cumulative_influx),
                });
                Ok::<_, MbalError>((next, points))
            },
        )?;
        Ok(PressureHistory { points })
    }
}
