// Underground withdrawal from cumulative production

use crate::error::{ensure_finite, MbalError, MbalResult};
use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};

/// A material-balance input that is either one value for every period or one
/// value per period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Fixed(f64),
    Series(Vec<f64>),
}

impl PropertyValue {
    /// Expands the value into a per-row array of length `rows`.
    pub fn resolve(&self, what: &'static str, rows: usize) -> MbalResult<Array1<f64>> {
        let resolved = match self {
            PropertyValue::Fixed(value) => Array1::from_elem(rows, *value),
            PropertyValue::Series(values) => {
                if values.len() != rows {
                    return Err(MbalError::DimensionMismatch {
                        what,
                        expected: rows,
                        actual: values.len(),
                    });
                }
                Array1::from(values.clone())
            }
        };
        ensure_finite(what, resolved.view())?;
        Ok(resolved)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Fixed(value)
    }
}

impl From<Vec<f64>> for PropertyValue {
    fn from(values: Vec<f64>) -> Self {
        PropertyValue::Series(values)
    }
}

/// Fluid properties applied to each production period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalFluids {
    pub oil_fvf: PropertyValue,
    pub water_fvf: PropertyValue,
    pub gas_fvf: PropertyValue,
    pub solution_gor: PropertyValue,
    pub water_gas_ratio: PropertyValue,
}

/// Period volumes from a cumulative series. The first period has no prior
/// period, so its volume is its own cumulative value.
pub fn incremental(cumulative: ArrayView1<'_, f64>) -> Array1<f64> {
    let mut volumes = cumulative.to_owned();
    for i in (1..cumulative.len()).rev() {
        volumes[i] = cumulative[i] - cumulative[i - 1];
    }
    volumes
}

/// Cumulative underground withdrawal in reservoir barrels.
///
/// Per period:
///
/// $$\begin{equation}
/// \Delta F = \Delta N_p B_o + \Delta W_p B_w
///     + \left(\Delta G_p - \Delta N_p R_s - \Delta W_p R_{sw}\right) B_g
/// \end{equation}$$
///
/// # Arguments
/// * oil_cum: cumulative oil production, stb
/// * water_cum: cumulative water production, stb
/// * gas_cum: cumulative gas production, scf
/// * fluids: FVFs (rb/stb, rb/scf) and solution ratios (scf/stb), fixed or per period
///
/// # Errors
/// `PhysicalInconsistency` when a period's free gas term is negative; the value is
/// never clamped.
pub fn underground_withdrawal(
    oil_cum: ArrayView1<'_, f64>,
    water_cum: ArrayView1<'_, f64>,
    gas_cum: ArrayView1<'_, f64>,
    fluids: &WithdrawalFluids,
) -> MbalResult<Array1<f64>> {
    let rows = oil_cum.len();
    let lengths = [
        ("water cumulative", water_cum.len()),
        ("gas cumulative", gas_cum.len()),
    ];
    for (what, len) in lengths {
        if len != rows {
            return Err(MbalError::DimensionMismatch {
                what,
                expected: rows,
                actual: len,
            });
        }
    }
    ensure_finite("oil cumulative", oil_cum)?;
    ensure_finite("water cumulative", water_cum)?;
    ensure_finite("gas cumulative", gas_cum)?;

    let oil_fvf = fluids.oil_fvf.resolve("oil_fvf", rows)?;
    let water_fvf = fluids.water_fvf.resolve("water_fvf", rows)?;
    let gas_fvf = fluids.gas_fvf.resolve("gas_fvf", rows)?;
    let rs = fluids.solution_gor.resolve("solution_gor", rows)?;
    let rsw = fluids.water_gas_ratio.resolve("water_gas_ratio", rows)?;

    let oil_vol = incremental(oil_cum);
    let water_vol = incremental(water_cum);
    let gas_vol = incremental(gas_cum);

    let free_gas = Zip::from(&gas_vol)
        .and(&oil_vol)
        .and(&water_vol)
        .and(&rs)
        .and(&rsw)
        .map_collect(|&gp, &np, &wp, &rs, &rsw| gp - np * rs - wp * rsw)
        * &gas_fvf;

    if let Some((period, &value)) = free_gas.iter().enumerate().find(|(_, &g)| g < 0.0) {
        return Err(MbalError::PhysicalInconsistency { period, value });
    }

    let mut total = 0.0;
    let withdrawal = Zip::from(&oil_vol)
        .and(&oil_fvf)
        .and(&water_vol)
        .and(&water_fvf)
        .and(&free_gas)
        .map_collect(|&np, &bo, &wp, &bw, &gas| np * bo + wp * bw + gas)
        .mapv_into(|increment| {
            total += increment;
            total
        });
    Ok(withdrawal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn fluids(oil_fvf: PropertyValue, rs: f64) -> WithdrawalFluids {
        WithdrawalFluids {
            oil_fvf,
            water_fvf: 1.0.into(),
            gas_fvf: 0.001.into(),
            solution_gor: rs.into(),
            water_gas_ratio: 0.0.into(),
        }
    }

    #[test]
    fn incremental_keeps_first_value() {
        let vol = incremental(array![10.0, 25.0, 45.0].view());
        assert_eq!(vol, array![10.0, 15.0, 20.0]);
    }

    #[test]
    fn constant_properties() {
        let uw = underground_withdrawal(
            array![1000.0, 2000.0, 3000.0].view(),
            array![100.0, 200.0, 300.0].view(),
            array![100000.0, 200000.0, 300000.0].view(),
            &fluids(1.2.into(), 100.0),
        )
        .unwrap();
        for (got, want) in uw.iter().zip([1300.0, 2600.0, 3900.0]) {
            assert_relative_eq!(*got, want, max_relative = 1e-12);
        }
    }

    #[test]
    fn per_period_oil_fvf() {
        let uw = underground_withdrawal(
            array![1000.0, 2000.0, 3000.0].view(),
            array![100.0, 200.0, 300.0].view(),
            array![100000.0, 200000.0, 300000.0].view(),
            &fluids(vec![1.2, 1.3, 1.4].into(), 100.0),
        )
        .unwrap();
        for (got, want) in uw.iter().zip([1300.0, 2700.0, 4200.0]) {
            assert_relative_eq!(*got, want, max_relative = 1e-12);
        }
    }

    #[test]
    fn free_gas_uses_each_period_gas_fvf() {
        let fluids = WithdrawalFluids {
            oil_fvf: 1.2.into(),
            water_fvf: 1.0.into(),
            gas_fvf: vec![0.001, 0.002].into(),
            solution_gor: 100.0.into(),
            water_gas_ratio: 0.0.into(),
        };
        let uw = underground_withdrawal(
            array![1000.0, 2000.0].view(),
            array![0.0, 0.0].view(),
            array![150000.0, 300000.0].view(),
            &fluids,
        )
        .unwrap();
        assert_relative_eq!(uw[0], 1250.0, max_relative = 1e-12);
        assert_relative_eq!(uw[1], 2550.0, max_relative = 1e-12);
    }

    #[test]
    fn views_of_different_arrays_are_accepted() {
        let oil = array![1000.0, 2000.0, 3000.0];
        let columns = array![[100.0, 100000.0], [200.0, 200000.0], [300.0, 300000.0]];
        let uw = underground_withdrawal(
            oil.view(),
            columns.column(0),
            columns.column(1),
            &fluids(1.2.into(), 100.0),
        )
        .unwrap();
        assert_relative_eq!(uw[2], 3900.0, max_relative = 1e-12);
    }

    #[test]
    fn negative_free_gas_is_rejected() {
        let err = underground_withdrawal(
            array![1000.0, 2000.0, 3000.0].view(),
            array![100.0, 200.0, 300.0].view(),
            array![100000.0, 200000.0, 300000.0].view(),
            &fluids(1.2.into(), 120.0),
        )
        .unwrap_err();
        assert!(matches!(err, MbalError::PhysicalInconsistency { period: 0, .. }));
    }

    #[test]
    fn series_length_must_match_periods() {
        let err = underground_withdrawal(
            array![1000.0, 2000.0].view(),
            array![100.0, 200.0].view(),
            array![100000.0, 200000.0].view(),
            &fluids(vec![1.2, 1.3, 1.4].into(), 100.0),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            MbalError::DimensionMismatch { expected: 2, actual: 3, .. }
        ));
    }

    #[test]
    fn same_inputs_same_outputs() {
        let run = || {
            underground_withdrawal(
                array![500.0, 1500.0, 1600.0].view(),
                array![0.0, 50.0, 400.0].view(),
                array![60000.0, 180000.0, 200000.0].view(),
                &fluids(vec![1.25, 1.24, 1.22].into(), 110.0),
            )
            .unwrap()
        };
        assert_eq!(run(), run());
    }
}
