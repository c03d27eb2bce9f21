//! Aggregator: pure reductions over scored samples.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::api::{PredictionResult, RiskCategory};

/// Fixed histogram edges. Bins are `[low, high)`; scores at or above the last
/// edge are left out of the histogram.
pub const HISTOGRAM_EDGES: [f64; 8] = [0.0, 25.0, 50.0, 75.0, 100.0, 150.0, 200.0, 300.0];

/// Count and share of one risk category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryShare {
    pub category: RiskCategory,
    pub count: usize,
    pub percentage: f64,
}

/// One histogram bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    /// Label such as `"25-50"`.
    pub range: String,
    pub low: f64,
    pub high: f64,
    pub count: usize,
    /// Share of all predictions, including those beyond the last edge.
    pub percentage: f64,
}

/// Concentration statistics for one metal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetalStats {
    pub metal: String,
    /// Number of predictions that declare the metal.
    pub samples: usize,
    pub average: f64,
    pub min: f64,
    pub max: f64,
}

/// Earliest and latest sample date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObservedRange {
    pub earliest: DateTime<Utc>,
    pub latest: DateTime<Utc>,
}

/// Mean score of the samples collected on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeriesPoint {
    pub date: NaiveDate,
    pub average_hmpi: f64,
    pub count: usize,
}

/// Summary statistics for a collection of predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSummary {
    pub total: usize,
    #[serde(rename = "averageHMPI")]
    pub average_hmpi: f64,
    /// Always one entry per category, in `safe, caution, unsafe` order.
    pub categories: Vec<CategoryShare>,
    pub histogram: Vec<HistogramBin>,
    /// Sorted by metal name.
    pub metals: Vec<MetalStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_range: Option<ObservedRange>,
}

impl AggregateSummary {
    pub fn count(&self, category: RiskCategory) -> usize {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.count)
            .unwrap_or(0)
    }

    pub fn percentage(&self, category: RiskCategory) -> f64 {
        self.categories
            .iter()
            .find(|c| c.category == category)
            .map(|c| c.percentage)
            .unwrap_or(0.0)
    }
}

/// Sum that does not depend on input order.
fn stable_sum(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    values.iter().sum()
}

fn mean(values: &mut [f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    stable_sum(values) / values.len() as f64
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Histogram bin counts for `scores` over [`HISTOGRAM_EDGES`].
pub fn histogram(scores: &[f64]) -> Vec<HistogramBin> {
    let total = scores.len();
    HISTOGRAM_EDGES
        .windows(2)
        .map(|edge| {
            let (low, high) = (edge[0], edge[1]);
            let count = scores.iter().filter(|s| **s >= low && **s < high).count();
            HistogramBin {
                range: format!("{}-{}", low, high),
                low,
                high,
                count,
                percentage: percentage(count, total),
            }
        })
        .collect()
}

/// Per-metal statistics over the predictions that declare each metal.
pub fn metal_stats(predictions: &[PredictionResult]) -> Vec<MetalStats> {
    let mut by_metal: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for prediction in predictions {
        for (metal, value) in &prediction.metal_concentrations {
            if value.is_finite() {
                by_metal.entry(metal.as_str()).or_default().push(*value);
            }
        }
    }

    by_metal
        .into_iter()
        .map(|(metal, mut values)| {
            let average = mean(&mut values);
            // `mean` sorted the values.
            MetalStats {
                metal: metal.to_string(),
                samples: values.len(),
                average,
                min: values.first().copied().unwrap_or(0.0),
                max: values.last().copied().unwrap_or(0.0),
            }
        })
        .collect()
}

/// Daily mean scores, oldest day first.
pub fn time_series(predictions: &[PredictionResult]) -> Vec<TimeSeriesPoint> {
    let mut by_day: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
    for prediction in predictions {
        by_day
            .entry(prediction.date.date_naive())
            .or_default()
            .push(prediction.hmpi_score);
    }
    by_day
        .into_iter()
        .map(|(date, mut scores)| TimeSeriesPoint {
            date,
            count: scores.len(),
            average_hmpi: mean(&mut scores),
        })
        .collect()
}

/// Reduce `predictions` to summary statistics.
///
/// Order-independent, and total: an empty input yields zero counts and a
/// zero average.
pub fn aggregate(predictions: &[PredictionResult]) -> AggregateSummary {
    let total = predictions.len();
    let mut scores: Vec<f64> = predictions.iter().map(|p| p.hmpi_score).collect();
    let average_hmpi = mean(&mut scores);

    let categories = RiskCategory::ALL
        .iter()
        .map(|category| {
            let count = predictions
                .iter()
                .filter(|p| p.risk_category == *category)
                .count();
            CategoryShare {
                category: *category,
                count,
                percentage: percentage(count, total),
            }
        })
        .collect();

    let observed_range = predictions
        .iter()
        .map(|p| p.date)
        .min()
        .zip(predictions.iter().map(|p| p.date).max())
        .map(|(earliest, latest)| ObservedRange { earliest, latest });

    AggregateSummary {
        total,
        average_hmpi,
        categories,
        histogram: histogram(&scores),
        metals: metal_stats(predictions),
        observed_range,
    }
}
