use crate::reading::Field;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("gateway request to {url} timed out")]
    Timeout {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("gateway request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum ExtractError {
    #[error("malformed gateway document: {0}")]
    MalformedDocument(String),
    #[error("gateway document has no value for {field}")]
    MissingField { field: Field },
    #[error("gateway value for {field} is not a number: {raw:?}")]
    InvalidNumber { field: Field, raw: String },
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("influx write failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("influx rejected write ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
}

/// Everything that can end a collection cycle early.
///
/// The first three variants are expected, cycle-local failures. `Defect` marks a
/// broken invariant inside the collector itself and stops the schedule.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Write(#[from] WriteError),
    #[error("collector defect: {0}")]
    Defect(String),
}

impl CycleError {
    pub fn stage(&self) -> &'static str {
        match self {
            CycleError::Fetch(_) => "fetch",
            CycleError::Extract(_) => "extract",
            CycleError::Write(_) => "write",
            CycleError::Defect(_) => "collector",
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, CycleError::Defect(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_defects_are_fatal() {
        let extract = CycleError::from(ExtractError::MissingField {
            field: Field::GasConsumedCumulative,
        });
        assert_eq!(extract.stage(), "extract");
        assert!(!extract.is_fatal());

        let defect = CycleError::Defect("tick panicked".to_string());
        assert_eq!(defect.stage(), "collector");
        assert!(defect.is_fatal());
    }

    #[test]
    fn extract_errors_name_the_field() {
        let err = ExtractError::InvalidNumber {
            field: Field::ElectricityProduced,
            raw: "n/a".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "gateway value for electricityProduced is not a number: \"n/a\""
        );
    }
}
