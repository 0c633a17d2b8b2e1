// PVT property evaluation by table interpolation

use crate::error::{ensure_finite, MbalError, MbalResult};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PvtProperty {
    OilFvf,
    GasFvf,
    SolutionGor,
    WaterFvf,
}

impl FromStr for PvtProperty {
    type Err = MbalError;

    fn from_str(input: &str) -> Result<PvtProperty, Self::Err> {
        match input {
            "oil_fvf" => Ok(PvtProperty::OilFvf),
            "gas_fvf" => Ok(PvtProperty::GasFvf),
            "solution_gor" => Ok(PvtProperty::SolutionGor),
            "water_fvf" => Ok(PvtProperty::WaterFvf),
            _ => Err(MbalError::Configuration(format!(
                "'{input}' is not a known PVT property"
            ))),
        }
    }
}

/// Pressure to fluid property evaluator.
///
/// Implementations must be pure: the same property and pressure always give the
/// same value. Providers are shared read-only between tanks solved in parallel.
pub trait PvtProvider: Sync {
    fn evaluate(&self, property: PvtProperty, pressure: f64) -> MbalResult<f64>;
}

impl<F> PvtProvider for F
where
    F: Fn(PvtProperty, f64) -> MbalResult<f64> + Sync,
{
    fn evaluate(&self, property: PvtProperty, pressure: f64) -> MbalResult<f64> {
        self(property, pressure)
    }
}

/// One row of a fluid property table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PvtRecord {
    pub pressure: f64,
    pub oil_fvf: f64,
    pub gas_fvf: f64,
    pub solution_gor: f64,
    #[serde(default)]
    pub water_fvf: Option<f64>,
}

impl PvtRecord {
    pub fn new(pressure: f64, oil_fvf: f64, gas_fvf: f64, solution_gor: f64) -> Self {
        PvtRecord {
            pressure,
            oil_fvf,
            gas_fvf,
            solution_gor,
            water_fvf: None,
        }
    }

    pub fn with_water_fvf(mut self, water_fvf: f64) -> Self {
        self.water_fvf = Some(water_fvf);
        self
    }
}

/// Fluid property table sorted by pressure.
///
/// Values inside the pressure range are linearly interpolated; values outside are
/// linearly extrapolated from the two nearest rows without clamping.
#[derive(Clone, Debug)]
pub struct PvtTable {
    pressure: Array1<f64>,
    oil_fvf: Array1<f64>,
    gas_fvf: Array1<f64>,
    solution_gor: Array1<f64>,
    water_fvf: Option<Array1<f64>>,
}

impl PvtTable {
    pub fn new(mut records: Vec<PvtRecord>) -> MbalResult<Self> {
        if records.len() < 2 {
            return Err(MbalError::Configuration(format!(
                "PVT table needs at least 2 pressure points, got {}",
                records.len()
            )));
        }
        records.sort_by(|a, b| a.pressure.total_cmp(&b.pressure));

        let column = |f: fn(&PvtRecord) -> f64| records.iter().map(f).collect::<Array1<f64>>();
        let pressure = column(|r| r.pressure);
        let oil_fvf = column(|r| r.oil_fvf);
        let gas_fvf = column(|r| r.gas_fvf);
        let solution_gor = column(|r| r.solution_gor);

        ensure_finite("PVT pressure", pressure.view())?;
        ensure_finite("PVT oil_fvf", oil_fvf.view())?;
        ensure_finite("PVT gas_fvf", gas_fvf.view())?;
        ensure_finite("PVT solution_gor", solution_gor.view())?;

        if let Some(dup) = pressure.windows(2).into_iter().position(|w| w[0] == w[1]) {
            return Err(MbalError::Configuration(format!(
                "PVT table has duplicate pressure {}",
                pressure[dup]
            )));
        }

        let with_water = records.iter().filter(|r| r.water_fvf.is_some()).count();
        let water_fvf = if with_water == 0 {
            None
        } else if with_water == records.len() {
            let column: Array1<f64> = records.iter().filter_map(|r| r.water_fvf).collect();
            ensure_finite("PVT water_fvf", column.view())?;
            Some(column)
        } else {
            return Err(MbalError::Configuration(
                "PVT water_fvf column must be given for every row or for none".to_string(),
            ));
        };

        Ok(PvtTable {
            pressure,
            oil_fvf,
            gas_fvf,
            solution_gor,
            water_fvf,
        })
    }

    pub fn len(&self) -> usize {
        self.pressure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pressure.is_empty()
    }

    /// Lowest and highest tabulated pressure.
    pub fn pressure_range(&self) -> (f64, f64) {
        (self.pressure[0], self.pressure[self.pressure.len() - 1])
    }

    pub fn has_water_fvf(&self) -> bool {
        self.water_fvf.is_some()
    }

    fn column(&self, property: PvtProperty) -> MbalResult<ArrayView1<'_, f64>> {
        match property {
            PvtProperty::OilFvf => Ok(self.oil_fvf.view()),
            PvtProperty::GasFvf => Ok(self.gas_fvf.view()),
            PvtProperty::SolutionGor => Ok(self.solution_gor.view()),
            PvtProperty::WaterFvf => self.water_fvf.as_ref().map(|c| c.view()).ok_or_else(|| {
                MbalError::Configuration("PVT table has no water_fvf column".to_string())
            }),
        }
    }
}

impl PvtProvider for PvtTable {
    fn evaluate(&self, property: PvtProperty, pressure: f64) -> MbalResult<f64> {
        if !pressure.is_finite() {
            return Err(MbalError::InputType(format!(
                "cannot evaluate {property:?} at pressure {pressure}"
            )));
        }
        let values = self.column(property)?;
        interpolate_extrapolate(self.pressure.view(), values, pressure)
    }
}

/// Piecewise linear interpolation over sorted `xs`, extending the first and last
/// segments past the table ends.
///
/// # Errors
/// `InputType` with fewer than two points, `DimensionMismatch` when `ys` does
/// not match `xs`.
pub fn interpolate_extrapolate(
    xs: ArrayView1<'_, f64>,
    ys: ArrayView1<'_, f64>,
    x: f64,
) -> MbalResult<f64> {
    let n = xs.len();
    if n < 2 {
        return Err(MbalError::InputType(format!(
            "interpolation needs at least two points, got {n}"
        )));
    }
    if ys.len() != n {
        return Err(MbalError::DimensionMismatch {
            what: "interpolated values",
            expected: n,
            actual: ys.len(),
        });
    }
    let upper = xs
        .iter()
        .position(|&xi| xi > x)
        .unwrap_or(n)
        .clamp(1, n - 1);
    let (x0, x1) = (xs[upper - 1], xs[upper]);
    let (y0, y1) = (ys[upper - 1], ys[upper]);
    Ok(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
}
