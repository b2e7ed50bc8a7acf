use chrono::{DateTime, TimeZone, Utc};
use std::fmt;

/// The three values collected from the gateway each cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    ElectricityConsumed,
    ElectricityProduced,
    GasConsumedCumulative,
}

impl Field {
    pub const ALL: [Field; 3] = [
        Field::ElectricityConsumed,
        Field::ElectricityProduced,
        Field::GasConsumedCumulative,
    ];

    /// Field key used in the written point.
    pub fn as_str(&self) -> &'static str {
        match self {
            Field::ElectricityConsumed => "electricityConsumed",
            Field::ElectricityProduced => "electricityProduced",
            Field::GasConsumedCumulative => "gasConsumedCumulative",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Reading {
    pub electricity_consumed: f64,
    pub electricity_produced: f64,
    pub gas_consumed_cumulative: f64,
    pub timestamp: DateTime<Utc>,
}

impl Reading {
    pub fn value(&self, field: Field) -> f64 {
        match field {
            Field::ElectricityConsumed => self.electricity_consumed,
            Field::ElectricityProduced => self.electricity_produced,
            Field::GasConsumedCumulative => self.gas_consumed_cumulative,
        }
    }

    pub fn fields(&self) -> [(&'static str, f64); 3] {
        Field::ALL.map(|field| (field.as_str(), self.value(field)))
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// Drops sub-millisecond precision; points are written with `precision=ms`.
pub fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ts.timestamp_millis())
        .single()
        .unwrap_or(ts)
}
