// Material balance terms, residual and Havlena-Odeh diagnostics

use crate::error::{ensure_finite, MbalError, MbalResult};
use crate::pvt::{PvtProperty, PvtProvider};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// Residual returned for a negative trial pressure, keeping the root finder out of
/// the non-physical domain without evaluating PVT there.
pub const NEGATIVE_PRESSURE_PENALTY: f64 = 1e10;

/// Initial reservoir and rock/fluid constants of one tank, field units.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaterialBalanceParameters {
    /// Initial reservoir pressure, psi
    pub initial_pressure: f64,
    /// Boi, rb/stb
    pub initial_oil_fvf: f64,
    /// Bgi, rb/scf
    pub initial_gas_fvf: f64,
    /// Rsi, scf/stb
    pub initial_solution_gor: f64,
    /// Connate water saturation, fraction
    pub water_saturation: f64,
    /// cw, 1/psi
    pub water_compressibility: f64,
    /// cf, 1/psi
    pub formation_compressibility: f64,
    /// Original oil in place N, stb
    pub oil_in_place: f64,
}

impl MaterialBalanceParameters {
    pub fn validate(&self) -> MbalResult<()> {
        if !(self.initial_pressure.is_finite() && self.initial_pressure > 0.0) {
            return Err(MbalError::NonPositivePressure {
                index: 0,
                value: self.initial_pressure,
            });
        }
        if !(0.0..1.0).contains(&self.water_saturation) {
            return Err(MbalError::Configuration(format!(
                "water saturation must be in [0, 1), got {}",
                self.water_saturation
            )));
        }
        for (name, value) in [
            ("initial oil FVF", self.initial_oil_fvf),
            ("initial gas FVF", self.initial_gas_fvf),
            ("oil in place", self.oil_in_place),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(MbalError::Configuration(format!(
                    "{name} must be greater than zero, got {value}"
                )));
            }
        }
        for (name, value) in [
            ("initial solution GOR", self.initial_solution_gor),
            ("water compressibility", self.water_compressibility),
            ("formation compressibility", self.formation_compressibility),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(MbalError::Configuration(format!(
                    "{name} must not be negative, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Connate water and formation expansion Efw at `pressure`, rb/stb.
    pub fn fw_expansion(&self, pressure: f64) -> f64 {
        let sw = self.water_saturation;
        self.initial_oil_fvf
            * ((self.water_compressibility * sw + self.formation_compressibility) / (1.0 - sw))
            * (self.initial_pressure - pressure)
    }
}

/// Water FVF used by the residual: a constant or the PVT water column.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaterFvf {
    Constant(f64),
    FromPvt,
}

impl Default for WaterFvf {
    fn default() -> Self {
        WaterFvf::Constant(1.0)
    }
}

impl WaterFvf {
    pub fn at<P: PvtProvider + ?Sized>(&self, pvt: &P, pressure: f64) -> MbalResult<f64> {
        match *self {
            WaterFvf::Constant(bw) => Ok(bw),
            WaterFvf::FromPvt => pvt.evaluate(PvtProperty::WaterFvf, pressure),
        }
    }
}

/// The undersaturated-oil material balance of one tank.
pub struct MaterialBalance<'a, P: PvtProvider + ?Sized> {
    params: &'a MaterialBalanceParameters,
    pvt: &'a P,
    water_fvf: WaterFvf,
}

impl<'a, P: PvtProvider + ?Sized> MaterialBalance<'a, P> {
    pub fn new(params: &'a MaterialBalanceParameters, pvt: &'a P, water_fvf: WaterFvf) -> Self {
        MaterialBalance {
            params,
            pvt,
            water_fvf,
        }
    }

    pub fn params(&self) -> &MaterialBalanceParameters {
        self.params
    }

    /// Material balance residual at a trial pressure.
    ///
    /// $$\begin{equation}
    /// r(p) = N (E_o + E_{fw}) + W_e(p) B_w - (N_p B_o + W_p B_w)
    /// \end{equation}$$
    ///
    /// # Arguments
    /// * pressure: trial reservoir pressure, psi
    /// * oil_cum: cumulative oil, stb
    /// * water_cum: cumulative water, stb
    /// * influx: cumulative water influx at the trial pressure, bbl
    ///
    /// Negative pressures return [`NEGATIVE_PRESSURE_PENALTY`] without calling
    /// `influx` or the PVT provider.
    pub fn residual<F>(
        &self,
        pressure: f64,
        oil_cum: f64,
        water_cum: f64,
        influx: F,
    ) -> MbalResult<f64>
    where
        F: FnOnce(f64) -> f64,
    {
        if pressure < 0.0 {
            return Ok(NEGATIVE_PRESSURE_PENALTY);
        }
        let bo = self.pvt.evaluate(PvtProperty::OilFvf, pressure)?;
        let bw = self.water_fvf.at(self.pvt, pressure)?;
        let eo = bo - self.params.initial_oil_fvf;
        let efw = self.params.fw_expansion(pressure);
        let withdrawal = oil_cum * bo + water_cum * bw;
        Ok(self.params.oil_in_place * (eo + efw) + influx(pressure) * bw - withdrawal)
    }

    /// Withdrawal scale used to normalise residuals: the oil in place times Boi.
    pub fn scale(&self) -> f64 {
        self.params.oil_in_place * self.params.initial_oil_fvf
    }
}

/// Per-row Havlena-Odeh terms.
#[derive(Clone, Debug, PartialEq)]
pub struct HavlenaOdehTerms {
    pub withdrawal: Array1<f64>,
    pub oil_expansion: Array1<f64>,
    pub gas_cap_expansion: Array1<f64>,
    pub fw_expansion: Array1<f64>,
}

/// Expansion terms at each averaged pressure, with PVT evaluated at that pressure.
///
/// * Eo = Bo + (Rsi - Rs) Bg - Boi
/// * Eg = Boi (Bg / Bgi - 1)
/// * Efw = Boi ((cw Sw + cf) / (1 - Sw)) (Pi - p)
pub fn havlena_odeh_terms<P: PvtProvider + ?Sized>(
    params: &MaterialBalanceParameters,
    pvt: &P,
    pressures: ArrayView1<'_, f64>,
    withdrawal: ArrayView1<'_, f64>,
) -> MbalResult<HavlenaOdehTerms> {
    ensure_finite("pressure", pressures)?;
    ensure_finite("underground withdrawal", withdrawal)?;
    if pressures.len() != withdrawal.len() {
        return Err(MbalError::DimensionMismatch {
            what: "pressure and withdrawal arrays",
            expected: pressures.len(),
            actual: withdrawal.len(),
        });
    }

    let rows = pressures.len();
    let mut oil_expansion = Array1::zeros(rows);
    let mut gas_cap_expansion = Array1::zeros(rows);
    for (i, &p) in pressures.iter().enumerate() {
        let bo = pvt.evaluate(PvtProperty::OilFvf, p)?;
        let bg = pvt.evaluate(PvtProperty::GasFvf, p)?;
        let rs = pvt.evaluate(PvtProperty::SolutionGor, p)?;
        let total_fvf = bo + (params.initial_solution_gor - rs) * bg;
        oil_expansion[i] = total_fvf - params.initial_oil_fvf;
        gas_cap_expansion[i] = params.initial_oil_fvf * (bg / params.initial_gas_fvf - 1.0);
    }
    let fw_expansion = pressures.mapv(|p| params.fw_expansion(p));

    Ok(HavlenaOdehTerms {
        withdrawal: withdrawal.to_owned(),
        oil_expansion,
        gas_cap_expansion,
        fw_expansion,
    })
}

/// Campbell ordinate F / (Eo + Efw), plotted against cumulative oil. A flat trend
/// indicates a volumetric reservoir; a rising one indicates water drive.
pub fn campbell(terms: &HavlenaOdehTerms) -> Array1<f64> {
    Zip::from(&terms.withdrawal)
        .and(&terms.oil_expansion)
        .and(&terms.fw_expansion)
        .map_collect(|&f, &eo, &efw| f / (eo + efw))
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LineFit {
    /// Original oil in place N, stb
    pub intercept: f64,
    /// m N, stb
    pub slope: f64,
    pub r_squared: f64,
    pub points: usize,
}

/// Least-squares line through F/Eo against Eg/Eo. Rows with zero oil expansion
/// (the initial state) are skipped.
///
/// # Errors
/// `Configuration` when fewer than two usable rows remain or all abscissas are
/// equal.
pub fn havlena_odeh_fit(terms: &HavlenaOdehTerms) -> MbalResult<LineFit> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = Zip::from(&terms.withdrawal)
        .and(&terms.oil_expansion)
        .and(&terms.gas_cap_expansion)
        .fold(Vec::new(), |mut acc, &f, &eo, &eg| {
            if eo != 0.0 {
                acc.push((eg / eo, f / eo));
            }
            acc
        })
        .into_iter()
        .filter(|(x, y)| x.is_finite() && y.is_finite())
        .unzip();
    let n = xs.len();
    if n < 2 {
        return Err(MbalError::Configuration(format!(
            "Havlena-Odeh fit needs at least 2 rows with oil expansion, got {n}"
        )));
    }

    let xs = Array1::from(xs);
    let ys = Array1::from(ys);
    let (x_mean, y_mean) = (xs.sum() / n as f64, ys.sum() / n as f64);
    let dx = &xs - x_mean;
    let dy = &ys - y_mean;
    let sxx = dx.dot(&dx);
    let sxy = dx.dot(&dy);
    let syy = dy.dot(&dy);
    if sxx == 0.0 {
        return Err(MbalError::Configuration(
            "Havlena-Odeh fit is undefined when every Eg/Eo is equal".to_string(),
        ));
    }
    let slope = sxy / sxx;
    let r_squared = if syy == 0.0 { 1.0 } else { sxy * sxy / (sxx * syy) };
    Ok(LineFit {
        intercept: y_mean - slope * x_mean,
        slope,
        r_squared,
        points: n,
    })
}
