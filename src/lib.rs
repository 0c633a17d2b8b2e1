// library

pub mod aquifer;
pub mod averaging;
pub mod config;
pub mod error;
pub mod material_balance;
pub mod production;
pub mod pvt;
pub mod solver;
pub mod tank;
pub mod withdrawal;

#[cfg(feature = "python")]
mod python;

pub use aquifer::{
    carter_tracy_influx, fetkovich_influx, schilthuis_influx, AquiferConfig, AquiferModel,
    AquiferState, BoundaryType, FlowType,
};
pub use averaging::{volumetric_average, AveragedPressure, BucketAnchor, BucketWidth, TaggedSample};
pub use config::ScenarioConfig;
pub use error::{MbalError, MbalResult};
pub use material_balance::{MaterialBalanceParameters, WaterFvf};
pub use production::{PressureSample, ProductionRecord, ProductionStep};
pub use pvt::{PvtProperty, PvtProvider, PvtRecord, PvtTable};
pub use solver::{PressureHistory, PressureSolver, SolverSettings};
pub use tank::{reconstruct_tanks, TankScenario};
pub use withdrawal::{underground_withdrawal, PropertyValue, WithdrawalFluids};
