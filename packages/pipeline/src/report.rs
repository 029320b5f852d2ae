//! Summary of a scenario run.

use std::collections::BTreeMap;

use env_insights_aqi::{AqiBand, AqiClassifier, BAND_COUNT};
use env_insights_pollution_models::{CellId, Pollutant};
use env_insights_spatial::Grid;
use serde::Serialize;

use crate::InsightsError;

/// One cell singled out by a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSummary {
    /// Cell identifier.
    pub grid_id: CellId,
    /// Centroid longitude.
    pub longitude: Option<f64>,
    /// Centroid latitude.
    pub latitude: Option<f64>,
    /// Predicted concentration.
    pub concentration: f64,
    /// Index value of the concentration.
    pub aqi: u8,
}

/// Number of cells in one index value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandCount {
    /// Index value, 1-10.
    pub aqi: u8,
    /// Level label.
    pub level: &'static str,
    /// Number of cells.
    pub cells: usize,
}

/// Aggregate view of a scenario prediction.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    /// Pollutant predicted.
    pub pollutant: Pollutant,
    /// Quantile predicted.
    pub quantile: String,
    /// Time bucket key.
    pub time_bucket: String,
    /// Number of cells predicted.
    pub cells: usize,
    /// Mean predicted concentration without the scenario.
    pub baseline_mean_concentration: Option<f64>,
    /// Mean predicted concentration under the scenario.
    pub mean_concentration: Option<f64>,
    /// Index value of the scenario mean.
    pub mean_aqi: Option<u8>,
    /// Level label of the scenario mean.
    pub mean_level: Option<String>,
    /// Relative change of the mean, in percent.
    pub mean_change_percent: Option<f64>,
    /// Cell with the lowest predicted concentration.
    pub least_polluted: Option<CellSummary>,
    /// Cell with the highest predicted concentration.
    pub most_polluted: Option<CellSummary>,
    /// Cell counts per index value, 1 through 10.
    pub aqi_histogram: Vec<BandCount>,
    /// Requested changes that matched a feature.
    pub applied_changes: BTreeMap<String, f64>,
    /// Requested features that are not model inputs.
    pub ignored_changes: Vec<String>,
}

/// Inputs of [`ScenarioReport::build`] that describe the request.
pub(crate) struct ReportRequest<'a> {
    pub pollutant: Pollutant,
    pub quantile: String,
    pub time_bucket: String,
    pub applied_changes: BTreeMap<String, f64>,
    pub ignored_changes: Vec<String>,
    pub classifier: &'a AqiClassifier,
    pub grid: &'a Grid,
}

impl ScenarioReport {
    pub(crate) fn build(
        request: ReportRequest<'_>,
        cell_ids: &[CellId],
        baseline: &[f64],
        scenario: &[f64],
        aqi: &[i64],
    ) -> Result<Self, InsightsError> {
        let mean_concentration = mean(scenario);
        let baseline_mean_concentration = mean(baseline);

        let mean_band = mean_concentration
            .map(|m| request.classifier.band(request.pollutant, m))
            .transpose()?;

        let mean_change_percent = match (baseline_mean_concentration, mean_concentration) {
            (Some(base), Some(new)) if base != 0.0 => Some((new - base) / base * 100.0),
            _ => None,
        };

        let summarize = |i: usize| {
            let centroid = request.grid.centroid_wgs84(&cell_ids[i]);
            CellSummary {
                grid_id: cell_ids[i].clone(),
                longitude: centroid.map(|p| p.x()),
                latitude: centroid.map(|p| p.y()),
                concentration: scenario[i],
                aqi: u8::try_from(aqi[i]).unwrap_or(0),
            }
        };

        Ok(Self {
            pollutant: request.pollutant,
            quantile: request.quantile,
            time_bucket: request.time_bucket,
            cells: scenario.len(),
            baseline_mean_concentration,
            mean_concentration,
            mean_aqi: mean_band.map(AqiBand::index),
            mean_level: mean_band.map(|b| b.level().to_string()),
            mean_change_percent,
            least_polluted: extreme(scenario, |a, b| a < b).map(&summarize),
            most_polluted: extreme(scenario, |a, b| a > b).map(&summarize),
            aqi_histogram: histogram(aqi),
            applied_changes: request.applied_changes,
            ignored_changes: request.ignored_changes,
        })
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Index of the first value for which `better` holds against every other.
fn extreme(values: &[f64], better: impl Fn(f64, f64) -> bool) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, value) in values.iter().enumerate() {
        match best {
            Some(b) if !better(*value, values[b]) => {}
            _ => best = Some(i),
        }
    }
    best
}

fn histogram(aqi: &[i64]) -> Vec<BandCount> {
    (1..=BAND_COUNT)
        .filter_map(AqiBand::from_index)
        .map(|band| BandCount {
            aqi: band.index(),
            level: band.level().into(),
            cells: aqi
                .iter()
                .filter(|a| **a == i64::from(band.index()))
                .count(),
        })
        .collect()
}
