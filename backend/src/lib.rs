//! # HMPI Backend
//!
//! Water-quality scoring service built around the Heavy Metal Pollution
//! Index (HMPI).
//!
//! Uploaded CSV files of metal concentration measurements go through a
//! streaming pipeline (parse, validate, score, persist). Scored samples are
//! queried, aggregated and assembled into downloadable reports. The backend
//! exposes a REST API via Axum.
//!
//! ## Features
//!
//! - **Row Parsing**: Lazy, single-pass CSV record stream
//! - **Validation**: Per-row checks with collected, human-readable reasons
//! - **Scoring**: Mock or remote index calculator chosen at startup, cancellable
//! - **Aggregation**: Category counts, averages, histogram and per-metal stats
//! - **Reports**: Lifecycle-managed PDF/CSV artifacts, templates and schedules
//! - **HTTP API**: RESTful endpoints scoped to the calling owner
//!
//! ## Architecture
//!
//! - [`api`]: Identifier newtypes and re-exported domain types
//! - [`models`]: Samples, predictions, analysis runs and report records
//! - [`parsing`]: CSV row parser
//! - [`preprocessing`]: Sample validator
//! - [`scoring`]: Index calculator and its strategies
//! - [`services`]: Pipeline, queries, aggregation and report lifecycle
//! - [`db`]: Repository pattern and persistence layer
//! - [`config`]: TOML configuration with environment overrides
//! - [`http`]: Axum-based HTTP server and request handlers

// Allow large error types - RepositoryError contains rich context for debugging
#![allow(clippy::result_large_err)]

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod parsing;
pub mod preprocessing;
pub mod scoring;
pub mod services;

#[cfg(feature = "http-server")]
pub mod http;
