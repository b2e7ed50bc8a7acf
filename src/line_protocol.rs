//! InfluxDB line protocol encoding for float-only points.
//!
//! ```text
//! measurement field1=val1,field2=val2 timestamp_ms
//! ```

use crate::reading::Reading;

#[derive(Clone, Debug, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub fields: Vec<(String, f64)>,
    pub timestamp_ms: i64,
}

impl Point {
    pub fn from_reading(measurement: &str, reading: &Reading) -> Self {
        Self {
            measurement: measurement.to_string(),
            fields: reading
                .fields()
                .iter()
                .map(|(key, value)| (key.to_string(), *value))
                .collect(),
            timestamp_ms: reading.timestamp_millis(),
        }
    }

    /// Encodes the point as a single line. Floats are written with Rust's shortest
    /// round-trip formatting, which InfluxDB reads back as the same float.
    pub fn to_line(&self) -> String {
        let mut line = escape_measurement(&self.measurement);
        line.push(' ');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push_str(&escape_key(key));
            line.push('=');
            line.push_str(&value.to_string());
        }
        line.push(' ');
        line.push_str(&self.timestamp_ms.to_string());
        line
    }
}

fn escape_measurement(s: &str) -> String {
    s.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_key(s: &str) -> String {
    s.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}
