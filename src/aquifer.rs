use crate::error::{ensure_finite, MbalError, MbalResult};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::str::FromStr;

/// Barrels per cubic foot denominator used for pore volumes.
const CUBIC_FEET_PER_BARREL: f64 = 5.615;

/// Dimensionless time above which the Carter-Tracy functions switch from the
/// rational approximation to the logarithmic asymptote.
pub const TD_ASYMPTOTIC: f64 = 100.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryType {
    #[default]
    NoFlow,
    ConstantPressure,
    Infinite,
}

impl FromStr for BoundaryType {
    type Err = MbalError;

    fn from_str(input: &str) -> Result<BoundaryType, Self::Err> {
        match input {
            "no_flow" => Ok(BoundaryType::NoFlow),
            "constant_pressure" => Ok(BoundaryType::ConstantPressure),
            "infinite" => Ok(BoundaryType::Infinite),
            _ => Err(MbalError::Configuration(format!(
                "'{input}' is not a boundary type; options are no_flow, constant_pressure, infinite"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    #[default]
    Radial,
    Linear,
}

impl FromStr for FlowType {
    type Err = MbalError;

    fn from_str(input: &str) -> Result<FlowType, Self::Err> {
        match input {
            "radial" => Ok(FlowType::Radial),
            "linear" => Ok(FlowType::Linear),
            _ => Err(MbalError::Configuration(format!(
                "'{input}' is not a flow type; options are radial, linear"
            ))),
        }
    }
}

/// Boundary and flow combination that fixes the aquifer productivity index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProductivityCase {
    NoFlowRadial,
    ConstantPressureRadial,
    InfiniteRadial,
    NoFlowLinear { width: f64, length: f64 },
    ConstantPressureLinear { width: f64, length: f64 },
}

impl ProductivityCase {
    pub fn select(
        boundary: BoundaryType,
        flow: FlowType,
        width: Option<f64>,
        length: Option<f64>,
    ) -> MbalResult<Self> {
        let linear_dims = || match (width, length) {
            (Some(width), Some(length)) if width > 0.0 && length > 0.0 => Ok((width, length)),
            (Some(_), Some(_)) => Err(MbalError::Configuration(
                "linear aquifer width and length must be greater than zero".to_string(),
            )),
            _ => Err(MbalError::Configuration(
                "When using linear flow, width and length are required arguments".to_string(),
            )),
        };
        match (boundary, flow) {
            (BoundaryType::NoFlow, FlowType::Radial) => Ok(ProductivityCase::NoFlowRadial),
            (BoundaryType::ConstantPressure, FlowType::Radial) => {
                Ok(ProductivityCase::ConstantPressureRadial)
            }
            (BoundaryType::Infinite, FlowType::Radial) => Ok(ProductivityCase::InfiniteRadial),
            (BoundaryType::NoFlow, FlowType::Linear) => {
                let (width, length) = linear_dims()?;
                Ok(ProductivityCase::NoFlowLinear { width, length })
            }
            (BoundaryType::ConstantPressure, FlowType::Linear) => {
                let (width, length) = linear_dims()?;
                Ok(ProductivityCase::ConstantPressureLinear { width, length })
            }
            (BoundaryType::Infinite, FlowType::Linear) => Err(MbalError::Configuration(
                "infinite boundary is only available for radial flow".to_string(),
            )),
        }
    }
}

/// Fetkovich aquifer description, field units.
///
/// # Fields
/// * aq_radius: radius of the aquifer, ft
/// * res_radius: radius of the reservoir, ft
/// * aq_thickness: thickness of the aquifer, ft
/// * aq_porosity: porosity of the aquifer
/// * total_compressibility: aquifer total compressibility, 1/psi
/// * encroachment_angle: degrees
/// * permeability: aquifer permeability, md
/// * water_viscosity: cp
/// * width, length: linear aquifer dimensions in ft, required for linear flow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FetkovichParams {
    pub aq_radius: f64,
    pub res_radius: f64,
    pub aq_thickness: f64,
    pub aq_porosity: f64,
    pub total_compressibility: f64,
    pub encroachment_angle: f64,
    pub permeability: f64,
    pub water_viscosity: f64,
    #[serde(default)]
    pub boundary_type: BoundaryType,
    #[serde(default)]
    pub flow_type: FlowType,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub length: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CarterTracyParams {
    pub aq_porosity: f64,
    pub total_compressibility: f64,
    pub res_radius: f64,
    pub aq_thickness: f64,
    pub encroachment_angle: f64,
    pub permeability: f64,
    pub water_viscosity: f64,
    /// Replaces the geometric water influx constant, bbl/psi, when fitted elsewhere.
    #[serde(default)]
    pub influx_constant: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SchilthuisParams {
    pub permeability: f64,
    pub aq_thickness: f64,
    pub water_viscosity: f64,
    pub aq_radius: f64,
    pub res_radius: f64,
}

/// Committed aquifer state after the last accepted reservoir pressure.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AquiferState {
    pub cumulative_influx: f64,
    pub last_pressure: f64,
    pub last_time: f64,
    pub start_time: f64,
    /// Average aquifer pressure; only depleted by the Fetkovich model.
    pub aquifer_pressure: f64,
}

/// A stateful water influx model stepped through time.
///
/// `advance` is pure: it returns the state that would follow from the reservoir
/// being at `pressure` at `time`, leaving the committed state untouched. The
/// pressure solver calls it with trial pressures and keeps only the state of the
/// accepted one.
pub trait AquiferModel: Send + Sync {
    fn initial_pressure(&self) -> f64;

    fn advance(&self, state: &AquiferState, pressure: f64, time: f64) -> AquiferState;

    fn initial_state(&self, start_time: f64) -> AquiferState {
        AquiferState {
            cumulative_influx: 0.0,
            last_pressure: self.initial_pressure(),
            last_time: start_time,
            start_time,
            aquifer_pressure: self.initial_pressure(),
        }
    }

    fn trial_influx(&self, state: &AquiferState, pressure: f64, time: f64) -> f64 {
        self.advance(state, pressure, time).cumulative_influx
    }
}

fn ensure_positive(name: &str, value: f64) -> MbalResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(MbalError::Configuration(format!(
            "{name} must be greater than zero, got {value}"
        )))
    }
}

pub fn productivity_index(case: ProductivityCase, params: &FetkovichParams) -> f64 {
    let f = params.encroachment_angle / 360.0;
    let k = params.permeability;
    let h = params.aq_thickness;
    let mu = params.water_viscosity;
    let rd = params.aq_radius / params.res_radius;
    match case {
        ProductivityCase::NoFlowRadial => (0.00708 * k * h * f) / (mu * (rd.ln() - 0.75)),
        ProductivityCase::ConstantPressureRadial => (0.00708 * k * h * f) / (mu * rd.ln()),
        ProductivityCase::InfiniteRadial => {
            let a = ((0.0142 * k * 365.0) / (f * mu * params.total_compressibility)).sqrt();
            (0.00708 * k * h * f) / (mu * (a / params.res_radius).ln())
        }
        ProductivityCase::NoFlowLinear { width, length } => {
            (0.003381 * k * width * h) / (mu * length)
        }
        ProductivityCase::ConstantPressureLinear { width, length } => {
            (0.001127 * k * width * h) / (mu * length)
        }
    }
}

/// Fetkovich pseudo-steady-state aquifer.
#[derive(Clone, Debug, PartialEq)]
pub struct Fetkovich {
    initial_pressure: f64,
    initial_water: f64,
    max_influx: f64,
    productivity_index: f64,
}

impl Fetkovich {
    pub fn new(params: &FetkovichParams, initial_pressure: f64) -> MbalResult<Self> {
        let case = ProductivityCase::select(
            params.boundary_type,
            params.flow_type,
            params.width,
            params.length,
        )?;
        ensure_positive("aquifer radius", params.aq_radius)?;
        ensure_positive("reservoir radius", params.res_radius)?;
        ensure_positive("aquifer thickness", params.aq_thickness)?;
        ensure_positive("aquifer porosity", params.aq_porosity)?;
        ensure_positive("total compressibility", params.total_compressibility)?;
        ensure_positive("encroachment angle", params.encroachment_angle)?;
        ensure_positive("permeability", params.permeability)?;
        ensure_positive("water viscosity", params.water_viscosity)?;
        if !(initial_pressure.is_finite() && initial_pressure > 0.0) {
            return Err(MbalError::NonPositivePressure {
                index: 0,
                value: initial_pressure,
            });
        }

        let initial_water = (PI / CUBIC_FEET_PER_BARREL)
            * (params.aq_radius.powi(2) - params.res_radius.powi(2))
            * params.aq_thickness
            * params.aq_porosity;
        let f = params.encroachment_angle / 360.0;
        let max_influx = params.total_compressibility * initial_water * initial_pressure * f;
        ensure_positive("maximum encroachable water", max_influx)?;

        let j = productivity_index(case, params);
        if !(j.is_finite() && j > 0.0) {
            return Err(MbalError::Configuration(format!(
                "aquifer geometry gives a non-physical productivity index {j} for {case:?}"
            )));
        }

        Ok(Fetkovich {
            initial_pressure,
            initial_water,
            max_influx,
            productivity_index: j,
        })
    }

    /// Initial water in the aquifer, bbl.
    pub fn initial_water(&self) -> f64 {
        self.initial_water
    }

    /// Maximum encroachable water, bbl.
    pub fn max_influx(&self) -> f64 {
        self.max_influx
    }

    /// Aquifer productivity index, bbl/day/psi.
    pub fn productivity_index(&self) -> f64 {
        self.productivity_index
    }
}

impl AquiferModel for Fetkovich {
    fn initial_pressure(&self) -> f64 {
        self.initial_pressure
    }

    fn advance(&self, state: &AquiferState, pressure: f64, time: f64) -> AquiferState {
        let pi = self.initial_pressure;
        let wei = self.max_influx;
        let dt = time - state.last_time;
        let pr_avg = (state.last_pressure + pressure) / 2.0;
        let delta_we = (wei / pi)
            * (1.0 - f64::exp(-self.productivity_index * pi * dt / wei))
            * (state.aquifer_pressure - pr_avg);
        let cumulative_influx = state.cumulative_influx + delta_we;
        AquiferState {
            cumulative_influx,
            last_pressure: pressure,
            last_time: time,
            start_time: state.start_time,
            aquifer_pressure: pi * (1.0 - cumulative_influx / wei),
        }
    }
}

/// Carter-Tracy approximation of the van Everdingen-Hurst infinite aquifer.
#[derive(Clone, Debug, PartialEq)]
pub struct CarterTracy {
    initial_pressure: f64,
    influx_constant: f64,
    time_constant: f64,
}

impl CarterTracy {
    pub fn new(params: &CarterTracyParams, initial_pressure: f64) -> MbalResult<Self> {
        ensure_positive("aquifer porosity", params.aq_porosity)?;
        ensure_positive("total compressibility", params.total_compressibility)?;
        ensure_positive("reservoir radius", params.res_radius)?;
        ensure_positive("aquifer thickness", params.aq_thickness)?;
        ensure_positive("encroachment angle", params.encroachment_angle)?;
        ensure_positive("permeability", params.permeability)?;
        ensure_positive("water viscosity", params.water_viscosity)?;
        if !(initial_pressure.is_finite() && initial_pressure > 0.0) {
            return Err(MbalError::NonPositivePressure {
                index: 0,
                value: initial_pressure,
            });
        }

        let f = params.encroachment_angle / 360.0;
        let re2 = params.res_radius.powi(2);
        let influx_constant = match params.influx_constant {
            Some(b) => {
                ensure_positive("water influx constant", b)?;
                b
            }
            None => {
                1.119
                    * params.aq_porosity
                    * params.total_compressibility
                    * re2
                    * params.aq_thickness
                    * f
            }
        };
        let time_constant = 0.006328 * params.permeability
            / (params.aq_porosity * params.water_viscosity * params.total_compressibility * re2);

        Ok(CarterTracy {
            initial_pressure,
            influx_constant,
            time_constant,
        })
    }

    /// Water influx constant b, bbl/psi.
    pub fn influx_constant(&self) -> f64 {
        self.influx_constant
    }

    /// Dimensionless time for `elapsed` days since the start of the history.
    pub fn dimensionless_time(&self, elapsed: f64) -> f64 {
        if elapsed > 0.0 {
            elapsed * self.time_constant
        } else {
            0.0
        }
    }
}

/// Dimensionless pressure of the infinite-acting radial aquifer.
pub fn dimensionless_pressure(td: f64) -> f64 {
    if td > TD_ASYMPTOTIC {
        0.5 * (td.ln() + 0.80907)
    } else {
        let sq = td.sqrt();
        (370.529 * sq + 137.582 * td + 5.69549 * td.powf(1.5))
            / (328.834 + 265.488 * sq + 45.2157 * td + td.powf(1.5))
    }
}

/// Derivative of [`dimensionless_pressure`] with respect to dimensionless time.
pub fn dimensionless_pressure_derivative(td: f64) -> f64 {
    if td > TD_ASYMPTOTIC {
        1.0 / (2.0 * td)
    } else {
        let e = 716.441 + 46.7984 * td.sqrt() + 270.038 * td + 71.0098 * td.powf(1.5);
        let d = 1296.86 * td.sqrt()
            + 1204.73 * td
            + 618.618 * td.powf(1.5)
            + 538.072 * td.powi(2)
            + 142.41 * td.powf(2.5);
        e / d
    }
}

impl AquiferModel for CarterTracy {
    fn initial_pressure(&self) -> f64 {
        self.initial_pressure
    }

    fn advance(&self, state: &AquiferState, pressure: f64, time: f64) -> AquiferState {
        let td_prev = self.dimensionless_time(state.last_time - state.start_time);
        let td = self.dimensionless_time(time - state.start_time);
        let mut next = AquiferState {
            last_pressure: pressure,
            last_time: time,
            ..*state
        };
        if td <= td_prev {
            return next;
        }
        let pd = dimensionless_pressure(td);
        let pd_deriv = dimensionless_pressure_derivative(td);
        let pressure_drop = self.initial_pressure - pressure;
        let we = state.cumulative_influx;
        next.cumulative_influx = we
            + (td - td_prev) * ((self.influx_constant * pressure_drop - we * pd_deriv)
                / (pd - td_prev * pd_deriv));
        next
    }
}

/// Schilthuis steady-state aquifer.
#[derive(Clone, Debug, PartialEq)]
pub struct Schilthuis {
    initial_pressure: f64,
    influx_constant: f64,
}

impl Schilthuis {
    pub fn new(params: &SchilthuisParams, initial_pressure: f64) -> MbalResult<Self> {
        ensure_positive("permeability", params.permeability)?;
        ensure_positive("aquifer thickness", params.aq_thickness)?;
        ensure_positive("water viscosity", params.water_viscosity)?;
        ensure_positive("aquifer radius", params.aq_radius)?;
        ensure_positive("reservoir radius", params.res_radius)?;
        if params.aq_radius <= params.res_radius {
            return Err(MbalError::Configuration(
                "aquifer radius must exceed reservoir radius".to_string(),
            ));
        }
        if !(initial_pressure.is_finite() && initial_pressure > 0.0) {
            return Err(MbalError::NonPositivePressure {
                index: 0,
                value: initial_pressure,
            });
        }
        let influx_constant = 0.00708 * params.permeability * params.aq_thickness
            / (params.water_viscosity * (params.aq_radius / params.res_radius).ln());
        Ok(Schilthuis {
            initial_pressure,
            influx_constant,
        })
    }

    /// Steady-state influx constant C, bbl/day/psi.
    pub fn influx_constant(&self) -> f64 {
        self.influx_constant
    }

    /// Influx rate at reservoir pressure `pressure`, bbl/day.
    pub fn rate(&self, pressure: f64) -> f64 {
        self.influx_constant * (self.initial_pressure - pressure)
    }
}

impl AquiferModel for Schilthuis {
    fn initial_pressure(&self) -> f64 {
        self.initial_pressure
    }

    fn advance(&self, state: &AquiferState, pressure: f64, time: f64) -> AquiferState {
        let dt = time - state.last_time;
        let pr_avg = (state.last_pressure + pressure) / 2.0;
        AquiferState {
            cumulative_influx: state.cumulative_influx + self.rate(pr_avg) * dt,
            last_pressure: pressure,
            last_time: time,
            ..*state
        }
    }
}

/// Aquifer attached to a tank, selected by `model` in configuration files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum AquiferConfig {
    #[default]
    None,
    Fetkovich(FetkovichParams),
    CarterTracy(CarterTracyParams),
    Schilthuis(SchilthuisParams),
}

impl AquiferConfig {
    /// Builds the stepwise model at the tank's initial pressure.
    pub fn build(&self, initial_pressure: f64) -> MbalResult<Option<Box<dyn AquiferModel>>> {
        let model: Box<dyn AquiferModel> = match self {
            AquiferConfig::None => return Ok(None),
            AquiferConfig::Fetkovich(p) => Box::new(Fetkovich::new(p, initial_pressure)?),
            AquiferConfig::CarterTracy(p) => Box::new(CarterTracy::new(p, initial_pressure)?),
            AquiferConfig::Schilthuis(p) => Box::new(Schilthuis::new(p, initial_pressure)?),
        };
        Ok(Some(model))
    }
}

fn validate_series(pressures: ArrayView1<'_, f64>, times: ArrayView1<'_, f64>) -> MbalResult<()> {
    ensure_finite("pressure", pressures)?;
    ensure_finite("time", times)?;
    if pressures.len() != times.len() {
        return Err(MbalError::DimensionMismatch {
            what: "pressure and time arrays",
            expected: pressures.len(),
            actual: times.len(),
        });
    }
    if let Some((index, &value)) = pressures.iter().enumerate().find(|(_, &p)| p <= 0.0) {
        return Err(MbalError::NonPositivePressure { index, value });
    }
    if let Some(i) = pressures.windows(2).into_iter().position(|w| w[1] > w[0]) {
        log::warn!(
            "pressure rises from {} to {} at index {}; influx will reverse",
            pressures[i],
            pressures[i + 1],
            i + 1
        );
    }
    Ok(())
}

fn step_through(
    model: &dyn AquiferModel,
    pressures: ArrayView1<'_, f64>,
    times: ArrayView1<'_, f64>,
) -> Array1<f64> {
    let mut state = model.initial_state(times[0]);
    pressures
        .iter()
        .zip(times.iter())
        .map(|(&p, &t)| {
            state = model.advance(&state, p, t);
            state.cumulative_influx
        })
        .collect()
}

/// Cumulative influx of `model` for a pressure history, starting from the first
/// entry with zero influx.
pub fn cumulative_influx(
    model: &dyn AquiferModel,
    pressures: ArrayView1<'_, f64>,
    times: ArrayView1<'_, f64>,
) -> MbalResult<Array1<f64>> {
    validate_series(pressures, times)?;
    Ok(step_through(model, pressures, times))
}

/// Fetkovich cumulative water influx, bbl, for pressures (psi) at elapsed times
/// (days). The first pressure is the initial aquifer pressure.
pub fn fetkovich_influx(
    params: &FetkovichParams,
    pressures: ArrayView1<'_, f64>,
    times: ArrayView1<'_, f64>,
) -> MbalResult<Array1<f64>> {
    validate_series(pressures, times)?;
    let model = Fetkovich::new(params, pressures[0])?;
    let influx = step_through(&model, pressures, times);
    if let Some(last) = influx.last() {
        if *last > model.max_influx() {
            log::warn!(
                "cumulative influx {last} exceeds the maximum encroachable water {}",
                model.max_influx()
            );
        }
    }
    Ok(influx)
}

/// Carter-Tracy cumulative water influx, bbl, for pressures (psi) at elapsed times
/// (days).
pub fn carter_tracy_influx(
    params: &CarterTracyParams,
    pressures: ArrayView1<'_, f64>,
    times: ArrayView1<'_, f64>,
) -> MbalResult<Array1<f64>> {
    validate_series(pressures, times)?;
    let model = CarterTracy::new(params, pressures[0])?;
    Ok(step_through(&model, pressures, times))
}

/// Schilthuis steady-state cumulative water influx, bbl.
pub fn schilthuis_influx(
    params: &SchilthuisParams,
    pressures: ArrayView1<'_, f64>,
    times: ArrayView1<'_, f64>,
) -> MbalResult<Array1<f64>> {
    validate_series(pressures, times)?;
    let model = Schilthuis::new(params, pressures[0])?;
    Ok(step_through(&model, pressures, times))
}
