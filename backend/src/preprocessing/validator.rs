//! Sample validation.
//!
//! Checks parsed rows against the declared column schema and partitions them
//! into valid [`Sample`]s and rejected rows with human-readable reasons. Dirty
//! data never aborts validation; only a failing row stream does.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::{CalculatorParameters, Sample, SampleId, SampleInput};
use crate::models::time::parse_timestamp;
use crate::parsing::{ParseError, RawRecord};

/// Maximum number of row errors reported back to a client.
pub const MAX_REPORTED_ERRORS: usize = 10;

/// A rejected row together with every reason it failed.
#[derive(Debug, Clone, Serialize)]
pub struct InvalidSample {
    pub raw: RawRecord,
    pub reasons: Vec<String>,
}

/// Partition of one input batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub valid_samples: Vec<Sample>,
    pub invalid_samples: Vec<InvalidSample>,
}

impl ValidationOutcome {
    pub fn valid_count(&self) -> usize {
        self.valid_samples.len()
    }

    pub fn invalid_count(&self) -> usize {
        self.invalid_samples.len()
    }

    /// Number of input rows seen. Always `valid_count + invalid_count`.
    pub fn total_rows(&self) -> usize {
        self.valid_count() + self.invalid_count()
    }

    /// First `limit` row errors, flattened in row order.
    pub fn error_messages(&self, limit: usize) -> Vec<String> {
        self.invalid_samples
            .iter()
            .flat_map(|invalid| invalid.reasons.iter().cloned())
            .take(limit)
            .collect()
    }
}

/// Validates rows against a fixed metal schema.
#[derive(Debug, Clone)]
pub struct SampleValidator {
    metals: Vec<String>,
}

impl SampleValidator {
    pub fn new(parameters: &CalculatorParameters) -> Self {
        Self {
            metals: parameters.metals.clone(),
        }
    }

    pub fn metals(&self) -> &[String] {
        &self.metals
    }

    /// Consume a row stream and partition it.
    ///
    /// A stream error (undecodable input) aborts the whole batch.
    pub fn validate<I>(&self, records: I) -> Result<ValidationOutcome, ParseError>
    where
        I: IntoIterator<Item = Result<RawRecord, ParseError>>,
    {
        let ingested_at = Utc::now();
        let mut outcome = ValidationOutcome::default();

        for record in records {
            let record = record?;
            match self.validate_record(&record, ingested_at) {
                Ok(sample) => outcome.valid_samples.push(sample),
                Err(reasons) => outcome.invalid_samples.push(InvalidSample {
                    raw: record,
                    reasons,
                }),
            }
        }

        tracing::debug!(
            valid = outcome.valid_count(),
            invalid = outcome.invalid_count(),
            "Validated sample batch"
        );
        Ok(outcome)
    }

    /// Validate a single row; `ingested_at` stands in for a missing date.
    pub fn validate_record(
        &self,
        record: &RawRecord,
        ingested_at: DateTime<Utc>,
    ) -> Result<Sample, Vec<String>> {
        let row = record.row;
        let mut reasons = Vec::new();

        let latitude = coordinate(record, "latitude", 90.0, row, &mut reasons);
        let longitude = coordinate(record, "longitude", 180.0, row, &mut reasons);

        let date = match record.non_empty("date") {
            None => Some(ingested_at),
            Some(raw) => {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    reasons.push(format!("Row {}: unparseable date '{}'", row, raw));
                }
                parsed
            }
        };

        let mut metal_concentrations = BTreeMap::new();
        for metal in &self.metals {
            let value = match record.non_empty(metal) {
                None => Some(0.0),
                Some(raw) => concentration(raw).map_err(|why| {
                    reasons.push(format!("Row {}: {} for {} ('{}')", row, why, metal, raw));
                }).ok(),
            };
            if let Some(value) = value {
                metal_concentrations.insert(metal.clone(), value);
            }
        }

        match (latitude, longitude, date) {
            (Some(latitude), Some(longitude), Some(date)) if reasons.is_empty() => Ok(Sample {
                id: SampleId::new(),
                latitude,
                longitude,
                date,
                metal_concentrations,
            }),
            _ => Err(reasons),
        }
    }

    /// Validate a single JSON sample.
    ///
    /// Declared metals default to `0.0`; extra keys are treated as additional
    /// metals and must be numeric too.
    pub fn validate_input(
        &self,
        input: SampleInput,
        ingested_at: DateTime<Utc>,
    ) -> Result<Sample, Vec<String>> {
        let mut reasons = Vec::new();

        let latitude = input_coordinate(input.latitude, "latitude", 90.0, &mut reasons);
        let longitude = input_coordinate(input.longitude, "longitude", 180.0, &mut reasons);

        let date = match input.date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            None => Some(ingested_at),
            Some(raw) => {
                let parsed = parse_timestamp(raw);
                if parsed.is_none() {
                    reasons.push(format!("unparseable date '{}'", raw));
                }
                parsed
            }
        };

        let mut metal_concentrations: BTreeMap<String, f64> =
            self.metals.iter().map(|m| (m.clone(), 0.0)).collect();
        for (metal, value) in input.metals {
            let parsed = match &value {
                serde_json::Value::Null => Ok(0.0),
                serde_json::Value::Number(n) => n
                    .as_f64()
                    .ok_or("non-numeric value")
                    .and_then(non_negative),
                serde_json::Value::String(s) if s.trim().is_empty() => Ok(0.0),
                serde_json::Value::String(s) => concentration(s.trim()),
                _ => Err("non-numeric value"),
            };
            match parsed {
                Ok(v) => {
                    metal_concentrations.insert(metal, v);
                }
                Err(why) => reasons.push(format!("{} for {} ({})", why, metal, value)),
            }
        }

        match (latitude, longitude, date) {
            (Some(latitude), Some(longitude), Some(date)) if reasons.is_empty() => Ok(Sample {
                id: input.id.unwrap_or_default(),
                latitude,
                longitude,
                date,
                metal_concentrations,
            }),
            _ => Err(reasons),
        }
    }
}

fn coordinate(
    record: &RawRecord,
    name: &str,
    limit: f64,
    row: usize,
    reasons: &mut Vec<String>,
) -> Option<f64> {
    let parsed = record
        .non_empty(name)
        .and_then(|raw| raw.parse::<f64>().ok())
        .filter(|v| v.is_finite());
    match parsed {
        None => {
            reasons.push(format!("Row {}: missing or non-numeric coordinate ({})", row, name));
            None
        }
        Some(v) if v.abs() > limit => {
            reasons.push(format!("Row {}: {} out of range ({})", row, name, v));
            None
        }
        Some(v) => Some(v),
    }
}

fn input_coordinate(
    value: Option<f64>,
    name: &str,
    limit: f64,
    reasons: &mut Vec<String>,
) -> Option<f64> {
    match value.filter(|v| v.is_finite()) {
        None => {
            reasons.push(format!("missing or non-numeric coordinate ({})", name));
            None
        }
        Some(v) if v.abs() > limit => {
            reasons.push(format!("{} out of range ({})", name, v));
            None
        }
        Some(v) => Some(v),
    }
}

fn concentration(raw: &str) -> Result<f64, &'static str> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or("non-numeric value")
        .and_then(non_negative)
}

fn non_negative(value: f64) -> Result<f64, &'static str> {
    if value < 0.0 {
        Err("negative concentration")
    } else {
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::{parse_rows, TextEncoding};

    fn validator() -> SampleValidator {
        SampleValidator::new(&CalculatorParameters::for_metals(["lead", "arsenic"]))
    }

    fn run(csv: &str) -> ValidationOutcome {
        let rows = parse_rows(csv.as_bytes(), TextEncoding::Utf8).unwrap();
        validator().validate(rows).unwrap()
    }

    #[test]
    fn test_missing_latitude_row() {
        let outcome = run(
            "latitude,longitude,date,lead,arsenic\n\
             12.9,77.5,2024-01-01,0.5,0.1\n\
             13.0,77.6,2024-01-02,0.7,0.2\n\
             ,77.7,2024-01-03,0.9,0.3\n",
        );
        assert_eq!(outcome.total_rows(), 3);
        assert_eq!(outcome.valid_count(), 2);
        assert_eq!(outcome.invalid_count(), 1);
        let errors = outcome.error_messages(MAX_REPORTED_ERRORS);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("latitude"));
        assert!(errors[0].starts_with("Row 3"));
    }

    #[test]
    fn test_blank_metal_defaults_to_zero() {
        let outcome = run("latitude,longitude,lead,arsenic\n1,2,,0.4\n");
        let sample = &outcome.valid_samples[0];
        assert_eq!(sample.concentration("lead"), Some(0.0));
        assert_eq!(sample.concentration("arsenic"), Some(0.4));
    }

    #[test]
    fn test_missing_metal_column_defaults_to_zero() {
        let outcome = run("latitude,longitude,lead\n1,2,0.3\n");
        assert_eq!(outcome.valid_samples[0].concentration("arsenic"), Some(0.0));
    }

    #[test]
    fn test_non_numeric_metal_is_invalid() {
        let outcome = run("latitude,longitude,lead\n1,2,abc\n");
        assert_eq!(outcome.invalid_count(), 1);
        assert!(outcome.invalid_samples[0].reasons[0].contains("lead"));
        assert_eq!(outcome.invalid_samples[0].raw.get("lead"), Some("abc"));
    }

    #[test]
    fn test_negative_metal_is_invalid() {
        let outcome = run("latitude,longitude,lead\n1,2,-0.5\n");
        assert!(outcome.invalid_samples[0].reasons[0].contains("negative"));
    }

    #[test]
    fn test_nan_coordinate_is_invalid() {
        let outcome = run("latitude,longitude\nNaN,2\n");
        assert_eq!(outcome.invalid_count(), 1);
    }

    #[test]
    fn test_out_of_range_coordinate() {
        let outcome = run("latitude,longitude\n91,2\n1,-181\n");
        assert_eq!(outcome.invalid_count(), 2);
        assert!(outcome.invalid_samples[0].reasons[0].contains("latitude"));
        assert!(outcome.invalid_samples[1].reasons[0].contains("longitude"));
    }

    #[test]
    fn test_missing_date_defaults_to_ingestion_time() {
        let before = Utc::now();
        let outcome = run("latitude,longitude\n1,2\n");
        assert!(outcome.valid_samples[0].date >= before);
    }

    #[test]
    fn test_bad_date_is_invalid() {
        let outcome = run("latitude,longitude,date\n1,2,31/12/2024\n");
        assert!(outcome.invalid_samples[0].reasons[0].contains("date"));
    }

    #[test]
    fn test_multiple_reasons_collected() {
        let outcome = run("latitude,longitude,lead,arsenic\nx,,bad,-1\n");
        assert_eq!(outcome.invalid_samples[0].reasons.len(), 4);
    }

    #[test]
    fn test_error_messages_capped() {
        let mut csv = String::from("latitude,longitude\n");
        for _ in 0..25 {
            csv.push_str(",\n");
        }
        let outcome = run(&csv);
        assert_eq!(outcome.invalid_count(), 25);
        assert_eq!(outcome.error_messages(MAX_REPORTED_ERRORS).len(), MAX_REPORTED_ERRORS);
    }

    #[test]
    fn test_stream_error_aborts() {
        let rows = parse_rows(b"latitude,longitude\n1,2\n\xFF,2\n", TextEncoding::Utf8).unwrap();
        assert!(validator().validate(rows).is_err());
    }

    #[test]
    fn test_validate_input_defaults_and_extras() {
        let input: SampleInput = serde_json::from_str(
            r#"{"latitude": 1.0, "longitude": 2.0, "lead": 3.5, "zinc": "1.25"}"#,
        )
        .unwrap();
        let sample = validator().validate_input(input, Utc::now()).unwrap();
        assert_eq!(sample.concentration("lead"), Some(3.5));
        assert_eq!(sample.concentration("arsenic"), Some(0.0));
        assert_eq!(sample.concentration("zinc"), Some(1.25));
    }

    #[test]
    fn test_validate_input_rejects_missing_coordinates() {
        let input: SampleInput = serde_json::from_str(r#"{"lead": true}"#).unwrap();
        let reasons = validator().validate_input(input, Utc::now()).unwrap_err();
        assert_eq!(reasons.len(), 3);
        assert!(reasons.iter().any(|r| r.contains("latitude")));
        assert!(reasons.iter().any(|r| r.contains("lead")));
    }
}
