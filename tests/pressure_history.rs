use approx::assert_abs_diff_eq;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use ndarray::Array1;
use pytank::aquifer::{fetkovich_influx, AquiferConfig, BoundaryType, FetkovichParams, FlowType};
use pytank::{
    reconstruct_tanks, MaterialBalanceParameters, MbalError, PressureSolver, ProductionRecord,
    ProductionStep, PvtProperty, PvtProvider, PvtRecord, PvtTable, SolverSettings, TankScenario,
    WaterFvf,
};

const INITIAL_PRESSURE: f64 = 2740.0;
const OIL_IN_PLACE: f64 = 1e8;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn pvt() -> PvtTable {
    PvtTable::new(vec![
        PvtRecord::new(1500.0, 1.380, 0.0020, 650.0),
        PvtRecord::new(3000.0, 1.300, 0.0009, 650.0),
    ])
    .unwrap()
}

fn parameters(pvt: &PvtTable) -> MaterialBalanceParameters {
    MaterialBalanceParameters {
        initial_pressure: INITIAL_PRESSURE,
        initial_oil_fvf: pvt.evaluate(PvtProperty::OilFvf, INITIAL_PRESSURE).unwrap(),
        initial_gas_fvf: pvt.evaluate(PvtProperty::GasFvf, INITIAL_PRESSURE).unwrap(),
        initial_solution_gor: pvt.evaluate(PvtProperty::SolutionGor, INITIAL_PRESSURE).unwrap(),
        water_saturation: 0.25,
        water_compressibility: 3.6e-6,
        formation_compressibility: 4.9e-6,
        oil_in_place: OIL_IN_PLACE,
    }
}

fn aquifer() -> FetkovichParams {
    FetkovichParams {
        aq_radius: 46000.0,
        res_radius: 9200.0,
        aq_thickness: 100.0,
        aq_porosity: 0.25,
        total_compressibility: 7e-6,
        encroachment_angle: 140.0,
        permeability: 200.0,
        water_viscosity: 0.55,
        boundary_type: BoundaryType::NoFlow,
        flow_type: FlowType::Radial,
        width: None,
        length: None,
    }
}

/// Oil production that balances the material balance exactly at `pressures`.
fn balanced_steps(
    params: &MaterialBalanceParameters,
    pvt: &PvtTable,
    times: &[f64],
    pressures: &[f64],
    influx: &[f64],
) -> Vec<ProductionStep> {
    times
        .iter()
        .zip(pressures)
        .zip(influx)
        .map(|((&t, &p), &we)| {
            let bo = pvt.evaluate(PvtProperty::OilFvf, p).unwrap();
            let expansion = bo - params.initial_oil_fvf + params.fw_expansion(p);
            ProductionStep {
                elapsed_days: t,
                cumulative_oil: (params.oil_in_place * expansion + we) / bo,
                cumulative_water: 0.0,
                cumulative_gas: 0.0,
            }
        })
        .collect()
}

#[test]
fn flat_scenario_recovers_initial_pressure() {
    init_logger();
    let pvt = pvt();
    let params = parameters(&pvt);
    let settings = SolverSettings::default();
    let model = AquiferConfig::Fetkovich(aquifer())
        .build(INITIAL_PRESSURE)
        .unwrap();
    let solver =
        PressureSolver::new(&params, &pvt, WaterFvf::Constant(1.0), model.as_deref(), &settings)
            .unwrap();
    let steps: Vec<ProductionStep> = (1..=6)
        .map(|i| ProductionStep {
            elapsed_days: 30.0 * i as f64,
            cumulative_oil: 0.0,
            cumulative_water: 0.0,
            cumulative_gas: 0.0,
        })
        .collect();

    let history = solver.reconstruct(&steps).unwrap();
    assert_eq!(history.len(), 7);
    for point in &history.points {
        assert_eq!(point.pressure, INITIAL_PRESSURE);
        assert_eq!(point.cumulative_influx, 0.0);
    }
}

#[test]
fn decline_with_fetkovich_aquifer_is_recovered() {
    init_logger();
    let pvt = pvt();
    let params = parameters(&pvt);
    let settings = SolverSettings::default();

    let times = [365.0, 730.0, 1095.0, 1460.0];
    let pressures = [2500.0, 2290.0, 2109.0, 1949.0];
    let all_p: Array1<f64> = std::iter::once(INITIAL_PRESSURE).chain(pressures).collect();
    let all_t: Array1<f64> = std::iter::once(0.0).chain(times).collect();
    let we = fetkovich_influx(&aquifer(), all_p.view(), all_t.view()).unwrap();
    let steps = balanced_steps(&params, &pvt, &times, &pressures, &we.to_vec()[1..]);

    let model = AquiferConfig::Fetkovich(aquifer())
        .build(INITIAL_PRESSURE)
        .unwrap();
    let solver =
        PressureSolver::new(&params, &pvt, WaterFvf::Constant(1.0), model.as_deref(), &settings)
            .unwrap();
    let history = solver.reconstruct(&steps).unwrap();

    assert_eq!(history.times().to_vec(), all_t.to_vec());
    for (point, (&p, &w)) in history.points.iter().zip(all_p.iter().zip(we.iter())) {
        assert_abs_diff_eq!(point.pressure, p, epsilon = 1e-3);
        assert_abs_diff_eq!(point.cumulative_influx, w, epsilon = 1.0);
    }
}

#[test]
fn unreachable_production_aborts_the_series() {
    init_logger();
    // incompressible oil and rock: no pressure can supply any production
    let incompressible = |_: PvtProperty, _: f64| -> pytank::MbalResult<f64> { Ok(1.3) };
    let params = MaterialBalanceParameters {
        initial_oil_fvf: 1.3,
        water_compressibility: 0.0,
        formation_compressibility: 0.0,
        ..parameters(&pvt())
    };
    let settings = SolverSettings {
        bracket_expansions: 3,
        ..SolverSettings::default()
    };
    let solver =
        PressureSolver::new(&params, &incompressible, WaterFvf::Constant(1.0), None, &settings)
            .unwrap();
    let steps = [
        ProductionStep {
            elapsed_days: 30.0,
            cumulative_oil: 0.0,
            cumulative_water: 0.0,
            cumulative_gas: 0.0,
        },
        ProductionStep {
            elapsed_days: 60.0,
            cumulative_oil: 1000.0,
            cumulative_water: 0.0,
            cumulative_gas: 0.0,
        },
    ];
    let err = solver.reconstruct(&steps).unwrap_err();
    assert!(
        matches!(err, MbalError::RootFindingFailure { step: 1, .. }),
        "{err}"
    );
}

fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

#[test]
fn tanks_from_records_run_in_parallel() {
    init_logger();
    let pvt = pvt();
    let params = parameters(&pvt);
    let start = date(1990, 1, 1);

    let target = 2600.0;
    let bo = pvt.evaluate(PvtProperty::OilFvf, target).unwrap();
    let oil =
        params.oil_in_place * (bo - params.initial_oil_fvf + params.fw_expansion(target)) / bo;
    let records = vec![
        ProductionRecord {
            entity_id: "w1".to_string(),
            timestamp: start + Duration::days(365),
            cumulative_oil: oil * 0.25,
            cumulative_water: 0.0,
            cumulative_gas: 0.0,
        },
        ProductionRecord {
            entity_id: "w2".to_string(),
            timestamp: start + Duration::days(365),
            cumulative_oil: oil * 0.75,
            cumulative_water: 0.0,
            cumulative_gas: 0.0,
        },
    ];

    let tanks: Vec<TankScenario> = ["north", "south", "east"]
        .iter()
        .map(|name| {
            TankScenario::from_records(*name, params.clone(), AquiferConfig::None, &records, start)
                .unwrap()
        })
        .collect();
    let results = reconstruct_tanks(&tanks, &pvt, &SolverSettings::default(), 3).unwrap();

    assert_eq!(results.len(), 3);
    for result in results {
        let history = result.history.unwrap();
        assert_eq!(history.len(), 2);
        assert_abs_diff_eq!(history.points[1].time, 365.0);
        assert_abs_diff_eq!(history.points[1].pressure, target, epsilon = 1e-3);
    }
}
