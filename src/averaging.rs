// Volumetric pressure averaging over time buckets

use crate::error::{MbalError, MbalResult};
use chrono::{Datelike, Duration, Months, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// A measured pressure with the cumulative underground withdrawal of its entity at
/// the time of the measurement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaggedSample {
    pub entity_id: String,
    pub timestamp: NaiveDateTime,
    pub pressure: f64,
    pub withdrawal: f64,
    #[serde(default)]
    pub test_type: String,
}

/// Where the reported timestamp sits inside its bucket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketAnchor {
    #[default]
    Begin,
    Middle,
    End,
}

impl FromStr for BucketAnchor {
    type Err = MbalError;

    fn from_str(input: &str) -> Result<BucketAnchor, Self::Err> {
        match input {
            "begin" => Ok(BucketAnchor::Begin),
            "middle" => Ok(BucketAnchor::Middle),
            "end" => Ok(BucketAnchor::End),
            _ => Err(MbalError::Configuration(format!(
                "{input} is not an accepted bucket anchor. Use any of [begin, middle, end] instead"
            ))),
        }
    }
}

/// Bucket duration. Month buckets start on the first day of the month of the
/// earliest sample; day buckets start at midnight of the earliest sample.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketWidth {
    Days(u32),
    Months(u32),
}

impl Default for BucketWidth {
    fn default() -> Self {
        BucketWidth::Months(1)
    }
}

impl BucketWidth {
    pub fn validate(&self) -> MbalResult<()> {
        match self {
            BucketWidth::Days(0) | BucketWidth::Months(0) => Err(MbalError::Configuration(
                "bucket width must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    fn origin(&self, first: NaiveDateTime) -> MbalResult<NaiveDateTime> {
        let day = match self {
            BucketWidth::Days(_) => Some(first.date()),
            BucketWidth::Months(_) => first.date().with_day(1),
        };
        day.and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(|| MbalError::Configuration(format!("no bucket origin for {first}")))
    }

    fn next(&self, start: NaiveDateTime) -> MbalResult<NaiveDateTime> {
        let next = match *self {
            BucketWidth::Days(n) => start.checked_add_signed(Duration::days(i64::from(n))),
            BucketWidth::Months(n) => start.checked_add_months(Months::new(n)),
        };
        next.ok_or_else(|| {
            MbalError::Configuration(format!("bucket after {start} is out of range"))
        })
    }
}

/// Average pressure of one bucket. `pressure` is `None` when the bucket holds no
/// sample.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AveragedPressure {
    pub timestamp: NaiveDateTime,
    pub pressure: Option<f64>,
}

struct Delta {
    withdrawal: f64,
    pressure: f64,
}

/// Checks that every entity's withdrawal never decreases in time. `samples` must
/// already be sorted by timestamp.
pub fn check_withdrawal_order(samples: &[TaggedSample]) -> MbalResult<()> {
    let mut last: HashMap<&str, f64> = HashMap::new();
    for (index, sample) in samples.iter().enumerate() {
        if let Some(previous) = last.insert(sample.entity_id.as_str(), sample.withdrawal) {
            if sample.withdrawal < previous {
                return Err(MbalError::OrderingViolation {
                    entity: sample.entity_id.clone(),
                    index,
                });
            }
        }
    }
    Ok(())
}

fn entity_deltas(samples: &[TaggedSample]) -> Vec<Delta> {
    let mut last: HashMap<&str, (f64, f64)> = HashMap::new();
    samples
        .iter()
        .map(|s| {
            let (uw0, p0) = last
                .insert(s.entity_id.as_str(), (s.withdrawal, s.pressure))
                .unwrap_or((0.0, 0.0));
            Delta {
                withdrawal: s.withdrawal - uw0,
                pressure: s.pressure - p0,
            }
        })
        .collect()
}

fn bucket_average(samples: &[TaggedSample], deltas: &[Delta]) -> Option<f64> {
    let mut weighted = 0.0;
    let mut weights = 0.0;
    let mut dynamic = 0usize;
    let mut plain = 0.0;
    let mut statics = 0usize;
    for (sample, delta) in samples.iter().zip(deltas) {
        if delta.withdrawal.abs() > 0.0 && delta.pressure.abs() > 0.0 {
            let weight = delta.withdrawal / delta.pressure;
            weighted += sample.pressure * weight;
            weights += weight;
            dynamic += 1;
        } else {
            plain += sample.pressure;
            statics += 1;
        }
    }
    let mut dynamic_avg = (dynamic > 0).then(|| weighted / weights);
    if dynamic_avg.is_some_and(|avg| !avg.is_finite()) {
        log::warn!("dynamic weights sum to {weights}, using static samples only");
        dynamic_avg = None;
    }
    let static_avg = (statics > 0).then(|| plain / statics as f64);
    match (dynamic_avg, static_avg) {
        (Some(a), Some(b)) => Some((a + b) / 2.0),
        (a, b) => a.or(b),
    }
}

/// Volumetric average pressure per time bucket.
///
/// Within a bucket, samples whose withdrawal and pressure both changed since the
/// entity's previous sample are averaged as
///
/// $$\begin{equation}
/// \bar p = \frac{\sum p \, \Delta F / \Delta p}{\sum \Delta F / \Delta p}
/// \end{equation}$$
///
/// and the remaining samples are averaged plainly. The bucket value is the mean of
/// the two partial averages that exist. Samples with a non-finite pressure are
/// dropped and non-finite withdrawals count as zero.
///
/// # Errors
/// `OrderingViolation` if any entity's withdrawal decreases with time.
pub fn volumetric_average(
    samples: &[TaggedSample],
    width: BucketWidth,
    anchor: BucketAnchor,
) -> MbalResult<Vec<AveragedPressure>> {
    width.validate()?;

    let mut samples: Vec<TaggedSample> = samples
        .iter()
        .filter(|s| s.pressure.is_finite())
        .cloned()
        .map(|mut s| {
            if !s.withdrawal.is_finite() {
                s.withdrawal = 0.0;
            }
            s
        })
        .collect();
    samples.sort_by_key(|s| s.timestamp);
    check_withdrawal_order(&samples)?;

    let (first, last) = match (samples.first(), samples.last()) {
        (Some(first), Some(last)) => (first.timestamp, last.timestamp),
        _ => return Ok(Vec::new()),
    };
    let deltas = entity_deltas(&samples);

    let mut result = Vec::new();
    let mut start = width.origin(first)?;
    let mut lo = 0usize;
    while start <= last {
        let next = width.next(start)?;
        let hi = lo + samples[lo..].partition_point(|s| s.timestamp < next);
        let pressure = bucket_average(&samples[lo..hi], &deltas[lo..hi]);
        let timestamp = match anchor {
            BucketAnchor::Begin => start,
            BucketAnchor::Middle => start + (next - start) / 2,
            BucketAnchor::End => next,
        };
        log::debug!(
            "bucket={start} samples={} pressure={pressure:?}",
            hi - lo
        );
        result.push(AveragedPressure {
            timestamp,
            pressure,
        });
        lo = hi;
        start = next;
    }
    Ok(result)
}
