// Production and pressure records, and the joins between them

use crate::averaging::TaggedSample;
use crate::error::{MbalError, MbalResult};
use crate::pvt::{PvtProperty, PvtProvider};
use crate::withdrawal::{underground_withdrawal, PropertyValue, WithdrawalFluids};
use chrono::NaiveDateTime;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionRecord {
    pub entity_id: String,
    pub timestamp: NaiveDateTime,
    pub cumulative_oil: f64,
    pub cumulative_water: f64,
    pub cumulative_gas: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PressureSample {
    pub entity_id: String,
    pub timestamp: NaiveDateTime,
    pub measured_pressure: f64,
    #[serde(default)]
    pub test_type: String,
}

/// Cumulative volumes of a tank at one point in time, `elapsed_days` after the
/// start of the history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductionStep {
    pub elapsed_days: f64,
    pub cumulative_oil: f64,
    pub cumulative_water: f64,
    pub cumulative_gas: f64,
}

fn days_between(start: NaiveDateTime, end: NaiveDateTime) -> f64 {
    (end - start).num_seconds() as f64 / 86_400.0
}

fn group_by_entity<'a, T, K>(items: &'a [T], key: K) -> BTreeMap<&'a str, Vec<&'a T>>
where
    K: Fn(&'a T) -> &'a str,
{
    let mut groups: BTreeMap<&str, Vec<&T>> = BTreeMap::new();
    for item in items {
        groups.entry(key(item)).or_default().push(item);
    }
    groups
}

/// Cumulative oil, water and gas of one entity at `at`, linearly interpolated in
/// time. Zero before the first record, held at the last record afterwards.
pub fn cumulative_at(records: &[&ProductionRecord], at: NaiveDateTime) -> (f64, f64, f64) {
    let upper = records.partition_point(|r| r.timestamp <= at);
    if upper == 0 {
        return (0.0, 0.0, 0.0);
    }
    let r0 = records[upper - 1];
    if upper == records.len() {
        return (r0.cumulative_oil, r0.cumulative_water, r0.cumulative_gas);
    }
    let r1 = records[upper];
    // r0.timestamp <= at < r1.timestamp, so the span is never zero
    let w = days_between(r0.timestamp, at) / days_between(r0.timestamp, r1.timestamp);
    let lerp = |a: f64, b: f64| a + (b - a) * w;
    (
        lerp(r0.cumulative_oil, r1.cumulative_oil),
        lerp(r0.cumulative_water, r1.cumulative_water),
        lerp(r0.cumulative_gas, r1.cumulative_gas),
    )
}

/// Attaches a cumulative underground withdrawal to every pressure sample.
///
/// For each entity, cumulative production is interpolated at the sample dates and
/// converted to reservoir volumes with the PVT properties evaluated at the measured
/// pressure. Samples with a non-finite pressure are dropped.
///
/// # Arguments
/// * samples: measured pressures of any number of entities
/// * production: cumulative production of the same entities
/// * pvt: oil FVF, gas FVF and solution GOR provider
/// * water_fvf: water FVF, rb/stb
/// * water_gas_ratio: solution gas-water ratio, scf/stb
pub fn tag_samples<P: PvtProvider + ?Sized>(
    samples: &[PressureSample],
    production: &[ProductionRecord],
    pvt: &P,
    water_fvf: f64,
    water_gas_ratio: f64,
) -> MbalResult<Vec<TaggedSample>> {
    let mut production_by_entity = group_by_entity(production, |r| r.entity_id.as_str());
    for records in production_by_entity.values_mut() {
        records.sort_by_key(|r| r.timestamp);
    }

    let valid: Vec<PressureSample> = samples
        .iter()
        .filter(|s| {
            let keep = s.measured_pressure.is_finite();
            if !keep {
                log::debug!(
                    "entity={} dropping sample at {} without pressure",
                    s.entity_id,
                    s.timestamp
                );
            }
            keep
        })
        .cloned()
        .collect();

    let mut tagged = Vec::with_capacity(valid.len());
    for (entity, mut entity_samples) in group_by_entity(&valid, |s| s.entity_id.as_str()) {
        entity_samples.sort_by_key(|s| s.timestamp);
        let records = production_by_entity.remove(entity).unwrap_or_default();

        let rows = entity_samples.len();
        let mut oil = Array1::zeros(rows);
        let mut water = Array1::zeros(rows);
        let mut gas = Array1::zeros(rows);
        let mut oil_fvf = Vec::with_capacity(rows);
        let mut gas_fvf = Vec::with_capacity(rows);
        let mut rs = Vec::with_capacity(rows);
        for (i, sample) in entity_samples.iter().enumerate() {
            let (np, wp, gp) = cumulative_at(&records, sample.timestamp);
            oil[i] = np;
            water[i] = wp;
            gas[i] = gp;
            oil_fvf.push(pvt.evaluate(PvtProperty::OilFvf, sample.measured_pressure)?);
            gas_fvf.push(pvt.evaluate(PvtProperty::GasFvf, sample.measured_pressure)?);
            rs.push(pvt.evaluate(PvtProperty::SolutionGor, sample.measured_pressure)?);
        }

        let fluids = WithdrawalFluids {
            oil_fvf: PropertyValue::Series(oil_fvf),
            water_fvf: PropertyValue::Fixed(water_fvf),
            gas_fvf: PropertyValue::Series(gas_fvf),
            solution_gor: PropertyValue::Series(rs),
            water_gas_ratio: PropertyValue::Fixed(water_gas_ratio),
        };
        let withdrawal = underground_withdrawal(oil.view(), water.view(), gas.view(), &fluids)?;

        tagged.extend(entity_samples.iter().zip(withdrawal.iter()).map(|(s, &uw)| {
            TaggedSample {
                entity_id: s.entity_id.clone(),
                timestamp: s.timestamp,
                pressure: s.measured_pressure,
                withdrawal: uw,
                test_type: s.test_type.clone(),
            }
        }));
    }
    tagged.sort_by_key(|s| s.timestamp);
    Ok(tagged)
}

/// Sums the cumulative production of all entities of a tank at every reported
/// date. An entity without a record at a date contributes its last known
/// cumulative.
///
/// Dates before `start` are rejected.
pub fn tank_production_steps(
    records: &[ProductionRecord],
    start: NaiveDateTime,
) -> MbalResult<Vec<ProductionStep>> {
    let mut by_date: BTreeMap<NaiveDateTime, Vec<&ProductionRecord>> = BTreeMap::new();
    for record in records {
        if record.timestamp < start {
            return Err(MbalError::Configuration(format!(
                "production of '{}' at {} precedes the history start {}",
                record.entity_id, record.timestamp, start
            )));
        }
        by_date.entry(record.timestamp).or_default().push(record);
    }

    let mut latest: BTreeMap<&str, (f64, f64, f64)> = BTreeMap::new();
    let steps = by_date
        .into_iter()
        .map(|(date, day_records)| {
            for r in day_records {
                latest.insert(
                    r.entity_id.as_str(),
                    (r.cumulative_oil, r.cumulative_water, r.cumulative_gas),
                );
            }
            let (oil, water, gas) = latest
                .values()
                .fold((0.0, 0.0, 0.0), |acc, v| (acc.0 + v.0, acc.1 + v.1, acc.2 + v.2));
            ProductionStep {
                elapsed_days: days_between(start, date),
                cumulative_oil: oil,
                cumulative_water: water,
                cumulative_gas: gas,
            }
        })
        .collect();
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvt::{PvtRecord, PvtTable};
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn record(entity: &str, at: NaiveDateTime, oil: f64, water: f64, gas: f64) -> ProductionRecord {
        ProductionRecord {
            entity_id: entity.to_string(),
            timestamp: at,
            cumulative_oil: oil,
            cumulative_water: water,
            cumulative_gas: gas,
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

    #[test]
    fn cumulative_interpolates_in_time() {
        let records = vec![
            record("w1", date(2000, 1, 1), 0.0, 0.0, 0.0),
            record("w1", date(2000, 1, 11), 1000.0, 100.0, 50000.0),
        ];
        let refs: Vec<&ProductionRecord> = records.iter().collect();
        let (oil, water, gas) = cumulative_at(&refs, date(2000, 1, 6));
        assert_relative_eq!(oil, 500.0);
        assert_relative_eq!(water, 50.0);
        assert_relative_eq!(gas, 25000.0);
        assert_eq!(cumulative_at(&refs, date(1999, 12, 1)), (0.0, 0.0, 0.0));
        assert_eq!(cumulative_at(&refs, date(2001, 1, 1)), (1000.0, 100.0, 50000.0));
    }

    #[test]
    fn samples_get_withdrawal_per_entity() {
        let pvt = PvtTable::new(vec![
            PvtRecord::new(1000.0, 1.2, 0.001, 100.0),
            PvtRecord::new(3000.0, 1.2, 0.001, 100.0),
        ])
        .unwrap();
        let production = vec![
            record("w1", date(2000, 1, 1), 1000.0, 100.0, 100000.0),
            record("w1", date(2000, 2, 1), 2000.0, 200.0, 200000.0),
            record("w2", date(2000, 1, 1), 500.0, 0.0, 50000.0),
        ];
        let samples = vec![
            sample("w1", date(2000, 2, 1), 2400.0),
            sample("w1", date(2000, 1, 1), 2500.0),
            sample("w2", date(2000, 1, 1), 2450.0),
            sample("w2", date(2000, 3, 1), f64::NAN),
        ];

        let tagged = tag_samples(&samples, &production, &pvt, 1.0, 0.0).unwrap();
        assert_eq!(tagged.len(), 3);
        let w1: Vec<f64> = tagged
            .iter()
            .filter(|s| s.entity_id == "w1")
            .map(|s| s.withdrawal)
            .collect();
        assert_relative_eq!(w1[0], 1300.0, max_relative = 1e-12);
        assert_relative_eq!(w1[1], 2600.0, max_relative = 1e-12);
        let w2 = tagged.iter().find(|s| s.entity_id == "w2").unwrap();
        assert_relative_eq!(w2.withdrawal, 600.0, max_relative = 1e-12);
    }

    #[test]
    fn tank_steps_carry_last_known_cumulative() {
        let start = date(2000, 1, 1);
        let records = vec![
            record("w1", date(2000, 1, 31), 100.0, 10.0, 1000.0),
            record("w2", date(2000, 1, 31), 50.0, 0.0, 500.0),
            record("w1", date(2000, 3, 1), 200.0, 20.0, 2000.0),
        ];
        let steps = tank_production_steps(&records, start).unwrap();
        assert_eq!(steps.len(), 2);
        assert_relative_eq!(steps[0].elapsed_days, 30.0);
        assert_relative_eq!(steps[0].cumulative_oil, 150.0);
        assert_relative_eq!(steps[1].elapsed_days, 60.0);
        assert_relative_eq!(steps[1].cumulative_oil, 250.0);
        assert_relative_eq!(steps[1].cumulative_gas, 2500.0);
    }

    #[test]
    fn production_before_start_is_rejected() {
        let records = vec![record("w1", date(1999, 12, 1), 1.0, 0.0, 0.0)];
        assert!(tank_production_steps(&records, date(2000, 1, 1)).is_err());
    }
}
