use approx::assert_relative_eq;
use chrono::{NaiveDate, NaiveDateTime};
use pytank::production::tag_samples;
use pytank::{
    volumetric_average, BucketAnchor, BucketWidth, MbalError, PressureSample, ProductionRecord,
    PvtRecord, PvtTable, ScenarioConfig,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(y, m, d)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
}

fn record(entity: &str, at: NaiveDateTime, oil: f64) -> ProductionRecord {
    ProductionRecord {
        entity_id: entity.to_string(),
        timestamp: at,
        cumulative_oil: oil,
        cumulative_water: 0.0,
        cumulative_gas: oil * 100.0,
    }
}

fn sample(entity: &str, at: NaiveDateTime, pressure: f64) -> PressureSample {
    PressureSample {
        entity_id: entity.to_string(),
        timestamp: at,
        measured_pressure: pressure,
        test_type: "BU".to_string(),
    }
}

fn pvt() -> PvtTable {
    PvtTable::new(vec![
        PvtRecord::new(1000.0, 1.2, 0.001, 100.0),
        PvtRecord::new(4000.0, 1.2, 0.001, 100.0),
    ])
    .unwrap()
}

#[test]
fn samples_are_weighted_by_withdrawal_since_last_test() {
    let _ = env_logger::builder().is_test(true).try_init();
    let production = vec![
        record("w1", date(2000, 1, 1), 0.0),
        record("w1", date(2000, 7, 1), 1000.0),
        record("w2", date(2000, 1, 1), 0.0),
        record("w2", date(2000, 7, 1), 3000.0),
    ];
    let samples = vec![
        sample("w1", date(2000, 1, 1), 3000.0),
        sample("w2", date(2000, 1, 1), 3000.0),
        sample("w1", date(2000, 7, 1), 2800.0),
        sample("w2", date(2000, 7, 1), 2600.0),
        sample("w2", date(2000, 8, 1), f64::NAN),
    ];

    let tagged = tag_samples(&samples, &production, &pvt(), 1.0, 0.0).unwrap();
    assert_eq!(tagged.len(), 4);

    let averaged =
        volumetric_average(&tagged, BucketWidth::Months(6), BucketAnchor::Begin).unwrap();
    assert_eq!(averaged.len(), 2);
    assert_eq!(averaged[0].timestamp, date(2000, 1, 1));
    // no withdrawal at the first tests: plain mean
    assert_relative_eq!(averaged[0].pressure.unwrap(), 3000.0);

    // withdrawal 1200 rb over -200 psi for w1, 3600 rb over -400 psi for w2
    let (w1, w2) = (1200.0 / -200.0, 3600.0 / -400.0);
    let expected = (2800.0 * w1 + 2600.0 * w2) / (w1 + w2);
    assert_eq!(averaged[1].timestamp, date(2000, 7, 1));
    assert_relative_eq!(averaged[1].pressure.unwrap(), expected, max_relative = 1e-12);
}

#[test]
fn production_that_goes_backwards_is_an_ordering_violation() {
    let production = vec![
        record("w1", date(2000, 1, 1), 500.0),
        record("w1", date(2000, 3, 1), 200.0),
    ];
    let samples = vec![
        sample("w1", date(2000, 1, 1), 3000.0),
        sample("w1", date(2000, 3, 1), 2900.0),
    ];
    let tagged = tag_samples(&samples, &production, &pvt(), 1.0, 0.0).unwrap();
    assert_relative_eq!(tagged[0].withdrawal, 600.0, max_relative = 1e-12);
    assert_relative_eq!(tagged[1].withdrawal, 240.0, max_relative = 1e-12);
    let err = volumetric_average(&tagged, BucketWidth::Months(1), BucketAnchor::End).unwrap_err();
    assert!(matches!(err, MbalError::OrderingViolation { index: 1, .. }));
}

#[test]
fn scenario_file_drives_the_averaging_settings() {
    let path = std::env::temp_dir().join(format!("pytank-scenario-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
[averaging]
width = { days = 14 }
anchor = "end"
"#,
    )
    .unwrap();
    let config = ScenarioConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.workers, 1);
    assert_eq!(config.averaging.width, BucketWidth::Days(14));
    assert_eq!(config.averaging.anchor, BucketAnchor::End);
    assert!(config.tanks.is_empty());
}
