#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use hmpi_backend::api::{OwnerId, ParameterSet, PredictionResult, Sample, SampleId};
use hmpi_backend::db::{FullRepository, LocalRepository};
use hmpi_backend::scoring::IndexCalculator;
use hmpi_backend::services::UploadPipeline;

pub fn owner() -> OwnerId {
    OwnerId::new("alice")
}

/// Complete parameter set over `metals` with empty limit tables.
pub fn params(metals: &[&str]) -> ParameterSet {
    ParameterSet {
        metals: Some(metals.iter().map(|m| m.to_string()).collect()),
        standards: Some(BTreeMap::new()),
        backgrounds: Some(BTreeMap::new()),
        presence_limits: Some(BTreeMap::new()),
    }
}

/// Fresh in-memory repository plus a mock-scored pipeline over it.
pub fn mock_pipeline() -> (Arc<LocalRepository>, UploadPipeline) {
    let repo = Arc::new(LocalRepository::new());
    let pipeline = UploadPipeline::new(
        repo.clone() as Arc<dyn FullRepository>,
        IndexCalculator::mock(),
        2,
    );
    (repo, pipeline)
}

/// A sample on 2024-01-`day` with the given lead concentration.
pub fn sample(day: u32, latitude: f64, lead: f64) -> Sample {
    Sample {
        id: SampleId::new(),
        latitude,
        longitude: 0.0,
        date: Utc.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
        metal_concentrations: BTreeMap::from([("lead".to_string(), lead)]),
    }
}

/// A prediction scored directly from `score`.
pub fn prediction(day: u32, latitude: f64, score: f64) -> PredictionResult {
    PredictionResult::from_sample(&sample(day, latitude, score), score, None)
}

/// Bind a throwaway HTTP server on a free local port and return its base URL.
#[cfg(feature = "http-server")]
pub async fn spawn_server(app: axum::Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Run `f` with process environment variables set (`Some`) or cleared (`None`).
///
/// Holds a global lock for the duration and restores previous values on drop,
/// including on panic.
pub fn with_env<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
where
    F: FnOnce() -> R,
{
    let _lock = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    let _restore = EnvRestore::apply(vars);
    f()
}

struct EnvRestore(Vec<(String, Option<String>)>);

impl EnvRestore {
    fn apply(vars: &[(&str, Option<&str>)]) -> Self {
        let previous = vars
            .iter()
            .map(|(key, _)| (key.to_string(), std::env::var(key).ok()))
            .collect();
        for (key, value) in vars {
            match value {
                Some(value) => std::env::set_var(key, value),
                None => std::env::remove_var(key),
            }
        }
        EnvRestore(previous)
    }
}

impl Drop for EnvRestore {
    fn drop(&mut self) {
        for (key, value) in self.0.drain(..).rev() {
            match value {
                Some(value) => std::env::set_var(&key, value),
                None => std::env::remove_var(&key),
            }
        }
    }
}
