// Scenario configuration loaded from TOML

use crate::aquifer::{AquiferConfig, ProductivityCase};
use crate::averaging::{BucketAnchor, BucketWidth};
use crate::error::{MbalError, MbalResult};
use crate::material_balance::{MaterialBalanceParameters, WaterFvf};
use crate::production::ProductionStep;
use crate::pvt::{PvtProperty, PvtProvider, PvtRecord, PvtTable};
use crate::solver::SolverSettings;
use crate::tank::TankScenario;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

fn default_workers() -> usize {
    1
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AveragingConfig {
    #[serde(default)]
    pub width: BucketWidth,
    #[serde(default)]
    pub anchor: BucketAnchor,
}

/// Initial conditions of a tank. Missing FVFs and solution GOR are read from the
/// PVT table at the initial pressure.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialConditions {
    pub initial_pressure: f64,
    #[serde(default)]
    pub initial_oil_fvf: Option<f64>,
    #[serde(default)]
    pub initial_gas_fvf: Option<f64>,
    #[serde(default)]
    pub initial_solution_gor: Option<f64>,
    pub water_saturation: f64,
    pub water_compressibility: f64,
    pub formation_compressibility: f64,
    pub oil_in_place: f64,
}

impl InitialConditions {
    pub fn resolve<P: PvtProvider + ?Sized>(
        &self,
        pvt: &P,
    ) -> MbalResult<MaterialBalanceParameters> {
        let pi = self.initial_pressure;
        let or_pvt = |given: Option<f64>, property| match given {
            Some(value) => Ok(value),
            None => pvt.evaluate(property, pi),
        };
        Ok(MaterialBalanceParameters {
            initial_pressure: pi,
            initial_oil_fvf: or_pvt(self.initial_oil_fvf, PvtProperty::OilFvf)?,
            initial_gas_fvf: or_pvt(self.initial_gas_fvf, PvtProperty::GasFvf)?,
            initial_solution_gor: or_pvt(self.initial_solution_gor, PvtProperty::SolutionGor)?,
            water_saturation: self.water_saturation,
            water_compressibility: self.water_compressibility,
            formation_compressibility: self.formation_compressibility,
            oil_in_place: self.oil_in_place,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TankConfig {
    pub name: String,
    pub initial: InitialConditions,
    #[serde(default)]
    pub aquifer: AquiferConfig,
    #[serde(default)]
    pub water_fvf: WaterFvf,
}

impl TankConfig {
    pub fn scenario<P: PvtProvider + ?Sized>(
        &self,
        pvt: &P,
        steps: Vec<ProductionStep>,
    ) -> MbalResult<TankScenario> {
        Ok(TankScenario {
            name: self.name.clone(),
            parameters: self.initial.resolve(pvt)?,
            aquifer: self.aquifer.clone(),
            water_fvf: self.water_fvf,
            steps,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub averaging: AveragingConfig,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub pvt: Vec<PvtRecord>,
    #[serde(default)]
    pub tanks: Vec<TankConfig>,
}

impl ScenarioConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str) -> MbalResult<Self> {
        let config: ScenarioConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> MbalResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::info!(
            "loaded {} with {} tanks and {} PVT rows",
            path.display(),
            config.tanks.len(),
            config.pvt.len()
        );
        Ok(config)
    }

    pub fn pvt_table(&self) -> MbalResult<PvtTable> {
        PvtTable::new(self.pvt.clone())
    }

    pub fn tank(&self, name: &str) -> Option<&TankConfig> {
        self.tanks.iter().find(|t| t.name == name)
    }

    /// Reports every problem found, one per line.
    pub fn validate(&self) -> MbalResult<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.workers == 0 {
            errors.push("workers must be greater than zero".to_string());
        }
        if let Err(e) = self.averaging.width.validate() {
            errors.push(format!("averaging: {e}"));
        }
        if let Err(e) = self.solver.validate() {
            errors.push(format!("solver: {e}"));
        }

        let mut names = HashSet::new();
        for tank in &self.tanks {
            if !names.insert(tank.name.as_str()) {
                errors.push(format!("tank '{}' is defined more than once", tank.name));
            }
            let initial = &tank.initial;
            if !(initial.initial_pressure.is_finite() && initial.initial_pressure > 0.0) {
                errors.push(format!(
                    "tank '{}': initial pressure must be greater than zero",
                    tank.name
                ));
            }
            if !(0.0..1.0).contains(&initial.water_saturation) {
                errors.push(format!(
                    "tank '{}': water saturation {} is outside [0, 1)",
                    tank.name, initial.water_saturation
                ));
            }
            if let AquiferConfig::Fetkovich(aq) = &tank.aquifer {
                if let Err(e) =
                    ProductivityCase::select(aq.boundary_type, aq.flow_type, aq.width, aq.length)
                {
                    errors.push(format!("tank '{}': {e}", tank.name));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MbalError::Configuration(errors.join("\n")))
        }
    }
}
