// Independent tanks reconstructed on a bounded worker pool

use crate::aquifer::AquiferConfig;
use crate::error::{MbalError, MbalResult};
use crate::material_balance::{MaterialBalanceParameters, WaterFvf};
use crate::production::{tank_production_steps, ProductionRecord, ProductionStep};
use crate::pvt::PvtProvider;
use crate::solver::{PressureHistory, PressureSolver, SolverSettings};
use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TankScenario {
    pub name: String,
    pub parameters: MaterialBalanceParameters,
    #[serde(default)]
    pub aquifer: AquiferConfig,
    #[serde(default)]
    pub water_fvf: WaterFvf,
    pub steps: Vec<ProductionStep>,
}

impl TankScenario {
    /// Tank whose steps are the summed production of its entities, in days since
    /// `start`.
    pub fn from_records(
        name: impl Into<String>,
        parameters: MaterialBalanceParameters,
        aquifer: AquiferConfig,
        records: &[ProductionRecord],
        start: NaiveDateTime,
    ) -> MbalResult<Self> {
        Ok(TankScenario {
            name: name.into(),
            parameters,
            aquifer,
            water_fvf: WaterFvf::default(),
            steps: tank_production_steps(records, start)?,
        })
    }

    pub fn reconstruct<P: PvtProvider + ?Sized>(
        &self,
        pvt: &P,
        settings: &SolverSettings,
    ) -> MbalResult<PressureHistory> {
        let aquifer = self.aquifer.build(self.parameters.initial_pressure)?;
        let solver = PressureSolver::new(
            &self.parameters,
            pvt,
            self.water_fvf,
            aquifer.as_deref(),
            settings,
        )?;
        let history = solver.reconstruct(&self.steps)?;
        log::info!(
            "tank={} steps={} final_pressure={}",
            self.name,
            self.steps.len(),
            history.points.last().map_or(f64::NAN, |p| p.pressure)
        );
        Ok(history)
    }
}

#[derive(Debug)]
pub struct TankResult {
    pub name: String,
    pub history: MbalResult<PressureHistory>,
}

/// Reconstructs every tank on a pool of `workers` threads. Results keep the
/// order of `tanks`; a failed tank only carries its own error.
///
/// # Errors
/// `Configuration` when `workers` is zero or the pool cannot be built.
pub fn reconstruct_tanks<P: PvtProvider + ?Sized>(
    tanks: &[TankScenario],
    pvt: &P,
    settings: &SolverSettings,
    workers: usize,
) -> MbalResult<Vec<TankResult>> {
    if workers == 0 {
        return Err(MbalError::Configuration(
            "worker count must be greater than zero".to_string(),
        ));
    }
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| MbalError::Configuration(format!("cannot build worker pool: {e}")))?;

    let results: Vec<TankResult> = pool.install(|| {
        tanks
            .par_iter()
            .map(|tank| {
                let history = tank.reconstruct(pvt, settings);
                if let Err(err) = &history {
                    log::warn!("tank={} failed: {err}", tank.name);
                }
                TankResult {
                    name: tank.name.clone(),
                    history,
                }
            })
            .collect()
    });
    Ok(results)
}
