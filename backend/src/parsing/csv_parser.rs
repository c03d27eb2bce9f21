//! Streaming CSV row parser.
//!
//! Turns a byte source into a lazy sequence of [`RawRecord`]s, one per data
//! line, keyed by the header row. The parser never judges row contents; the
//! only failure is input that cannot be decoded as text.

use serde::ser::{Serialize, SerializeMap, Serializer};
use std::io::Read;
use std::str::FromStr;

/// Errors raised while decoding the upload stream.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Unsupported text encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),
}

/// Declared text encoding of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
}

impl FromStr for TextEncoding {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "utf-8" | "utf8" => Ok(TextEncoding::Utf8),
            other => Err(ParseError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// One data line as header/value pairs, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    /// 1-based data row number (the header is row 0).
    pub row: usize,
    pub fields: Vec<(String, String)>,
}

impl RawRecord {
    /// Value of column `name`, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Like [`RawRecord::get`] but treats an empty cell as absent.
    pub fn non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }
}

impl Serialize for RawRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (header, value) in &self.fields {
            map.serialize_entry(header, value)?;
        }
        map.end()
    }
}

/// Lazy, single-pass iterator over the data rows of a CSV source.
///
/// Stops after the first decoding error.
pub struct RecordStream<R: Read> {
    headers: Vec<String>,
    records: csv::StringRecordsIntoIter<R>,
    row: usize,
    done: bool,
}

impl<R: Read> RecordStream<R> {
    /// Read the header row from `reader` and prepare to stream data rows.
    pub fn from_reader(reader: R) -> Result<Self, ParseError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = reader
            .headers()
            .map_err(malformed)?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
            .collect();

        if headers.iter().all(|h| h.is_empty()) {
            return Err(ParseError::MalformedInput(
                "CSV input is empty or has no header row".to_string(),
            ));
        }

        Ok(Self {
            headers,
            records: reader.into_records(),
            row: 0,
            done: false,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Result<RawRecord, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.records.next()? {
            Ok(record) => {
                self.row += 1;
                // Short rows simply lack the trailing columns; extra cells are dropped.
                let fields = self
                    .headers
                    .iter()
                    .zip(record.iter())
                    .map(|(header, value)| (header.clone(), value.to_string()))
                    .collect();
                Some(Ok(RawRecord {
                    row: self.row,
                    fields,
                }))
            }
            Err(err) => {
                self.done = true;
                Some(Err(malformed(err)))
            }
        }
    }
}

fn malformed(err: csv::Error) -> ParseError {
    let line = err.position().map(|p| p.line());
    match line {
        Some(line) => ParseError::MalformedInput(format!("line {}: {}", line, err)),
        None => ParseError::MalformedInput(err.to_string()),
    }
}

/// Stream the rows of a CSV byte source as it is read.
///
/// A leading byte order mark is dropped from the first header.
pub fn parse_reader<R: Read>(
    reader: R,
    encoding: TextEncoding,
) -> Result<RecordStream<R>, ParseError> {
    match encoding {
        TextEncoding::Utf8 => RecordStream::from_reader(reader),
    }
}

/// Stream the rows of an in-memory CSV upload.
pub fn parse_rows(
    bytes: &[u8],
    encoding: TextEncoding,
) -> Result<RecordStream<&[u8]>, ParseError> {
    match encoding {
        TextEncoding::Utf8 => {
            let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
            RecordStream::from_reader(bytes)
        }
    }
}
