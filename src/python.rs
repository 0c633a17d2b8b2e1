// python bindings

use crate::aquifer::{self, CarterTracyParams, FetkovichParams};
use crate::error::MbalError;
use crate::withdrawal::{self, WithdrawalFluids};
use numpy::{IntoPyArray, PyArray1, PyReadonlyArray1};
use pyo3::{exceptions::PyValueError, pymodule, types::PyModule, PyErr, PyResult, Python};

impl From<MbalError> for PyErr {
    fn from(err: MbalError) -> PyErr {
        PyValueError::new_err(err.to_string())
    }
}

#[pymodule]
fn pytank(_py: Python, m: &PyModule) -> PyResult<()> {
    #[pyfn(m)]
    #[pyo3(name = "fetkovich_influx")]
    #[allow(clippy::too_many_arguments)]
    fn fetkovich_influx_py<'py>(
        py: Python<'py>,
        pressure: PyReadonlyArray1<f64>,
        time: PyReadonlyArray1<f64>,
        aq_radius: f64,
        res_radius: f64,
        aq_thickness: f64,
        aq_porosity: f64,
        total_compressibility: f64,
        encroachment_angle: f64,
        permeability: f64,
        water_viscosity: f64,
        boundary_type: &str,
        flow_type: &str,
        width: Option<f64>,
        length: Option<f64>,
    ) -> PyResult<&'py PyArray1<f64>> {
        let params = FetkovichParams {
            aq_radius,
            res_radius,
            aq_thickness,
            aq_porosity,
            total_compressibility,
            encroachment_angle,
            permeability,
            water_viscosity,
            boundary_type: boundary_type.parse()?,
            flow_type: flow_type.parse()?,
            width,
            length,
        };
        let we = aquifer::fetkovich_influx(&params, pressure.as_array(), time.as_array())?;
        Ok(we.into_pyarray(py))
    }

    #[pyfn(m)]
    #[pyo3(name = "carter_tracy_influx")]
    #[allow(clippy::too_many_arguments)]
    fn carter_tracy_influx_py<'py>(
        py: Python<'py>,
        pressure: PyReadonlyArray1<f64>,
        time: PyReadonlyArray1<f64>,
        aq_porosity: f64,
        total_compressibility: f64,
        res_radius: f64,
        aq_thickness: f64,
        encroachment_angle: f64,
        permeability: f64,
        water_viscosity: f64,
        influx_constant: Option<f64>,
    ) -> PyResult<&'py PyArray1<f64>> {
        let params = CarterTracyParams {
            aq_porosity,
            total_compressibility,
            res_radius,
            aq_thickness,
            encroachment_angle,
            permeability,
            water_viscosity,
            influx_constant,
        };
        let we = aquifer::carter_tracy_influx(&params, pressure.as_array(), time.as_array())?;
        Ok(we.into_pyarray(py))
    }

    #[pyfn(m)]
    #[pyo3(name = "underground_withdrawal")]
    #[allow(clippy::too_many_arguments)]
    fn underground_withdrawal_py<'py>(
        py: Python<'py>,
        oil_cum: PyReadonlyArray1<f64>,
        water_cum: PyReadonlyArray1<f64>,
        gas_cum: PyReadonlyArray1<f64>,
        oil_fvf: PyReadonlyArray1<f64>,
        water_fvf: f64,
        gas_fvf: PyReadonlyArray1<f64>,
        gas_oil_rs: PyReadonlyArray1<f64>,
        gas_water_rs: f64,
    ) -> PyResult<&'py PyArray1<f64>> {
        let fluids = WithdrawalFluids {
            oil_fvf: oil_fvf.as_array().to_vec().into(),
            water_fvf: water_fvf.into(),
            gas_fvf: gas_fvf.as_array().to_vec().into(),
            solution_gor: gas_oil_rs.as_array().to_vec().into(),
            water_gas_ratio: gas_water_rs.into(),
        };
        let uw = withdrawal::underground_withdrawal(
            oil_cum.as_array(),
            water_cum.as_array(),
            gas_cum.as_array(),
            &fluids,
        )?;
        Ok(uw.into_pyarray(py))
    }

    Ok(())
}
