//! Pulls the meter readings out of the gateway's `/core/modules` XML document.
//!
//! The gateway nests every meter as
//! `<electricity_point_meter><measurement directionality="consumed">..</measurement></electricity_point_meter>`
//! somewhere below `<modules>`; only the meter element name, the `measurement` child
//! and its `directionality` attribute are significant here.

use crate::error::ExtractError;
use crate::reading::{truncate_to_millis, Field, Reading};
use chrono::{DateTime, Utc};
use roxmltree::{Document, Node};

const MEASUREMENT_TAG: &str = "measurement";
const DIRECTIONALITY_ATTR: &str = "directionality";

/// Element name + attribute predicate locating one reading.
#[derive(Clone, Copy, Debug)]
struct MeasurementQuery {
    meter: &'static str,
    directionality: &'static str,
}

impl MeasurementQuery {
    fn for_field(field: Field) -> Self {
        match field {
            Field::ElectricityConsumed => Self {
                meter: "electricity_point_meter",
                directionality: "consumed",
            },
            Field::ElectricityProduced => Self {
                meter: "electricity_point_meter",
                directionality: "produced",
            },
            Field::GasConsumedCumulative => Self {
                meter: "gas_cumulative_meter",
                directionality: "consumed",
            },
        }
    }

    /// First matching `measurement` in document order.
    fn find<'a, 'input>(&self, doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
        doc.descendants()
            .filter(|node| node.is_element() && node.tag_name().name() == self.meter)
            .flat_map(|meter| meter.children())
            .find(|node| {
                node.is_element()
                    && node.tag_name().name() == MEASUREMENT_TAG
                    && node.attribute(DIRECTIONALITY_ATTR) == Some(self.directionality)
            })
    }
}

/// Extracts a reading stamped with the current wall-clock time.
pub fn extract(bytes: &[u8]) -> Result<Reading, ExtractError> {
    extract_at(bytes, Utc::now())
}

pub fn extract_at(bytes: &[u8], timestamp: DateTime<Utc>) -> Result<Reading, ExtractError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| ExtractError::MalformedDocument(format!("body is not UTF-8: {err}")))?;
    let doc =
        Document::parse(text).map_err(|err| ExtractError::MalformedDocument(err.to_string()))?;

    let electricity_consumed = read_field(&doc, Field::ElectricityConsumed)?;
    let electricity_produced = read_field(&doc, Field::ElectricityProduced)?;
    let gas_consumed_cumulative = read_field(&doc, Field::GasConsumedCumulative)?;

    Ok(Reading {
        electricity_consumed,
        electricity_produced,
        gas_consumed_cumulative,
        timestamp: truncate_to_millis(timestamp),
    })
}

fn read_field(doc: &Document, field: Field) -> Result<f64, ExtractError> {
    let node = MeasurementQuery::for_field(field)
        .find(doc)
        .ok_or(ExtractError::MissingField { field })?;
    let raw = text_content(&node);
    parse_number(raw.trim()).ok_or(ExtractError::InvalidNumber { field, raw })
}

fn text_content(node: &Node) -> String {
    node.descendants()
        .filter(|child| child.is_text())
        .filter_map(|child| child.text())
        .collect()
}

// inf/NaN cannot be stored as a point field.
fn parse_number(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}
