//! Row parsing for CSV uploads.

pub mod csv_parser;

pub use csv_parser::{parse_reader, parse_rows, ParseError, RawRecord, RecordStream, TextEncoding};
