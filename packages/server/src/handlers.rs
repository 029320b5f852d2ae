//! HTTP handler functions for the environmental insights API.
//!
//! Pipeline work is synchronous, so every handler that touches the store
//! or a model runs it on the blocking thread pool via [`web::block`].

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, web};
use env_insights_features::Scenario;
use env_insights_pipeline::{ErrorKind, InsightsError};
use env_insights_pollution_models::{Pollutant, Quantile, TimeBucket};
use env_insights_server_models::{
    ApiError, ApiHealth, DEFAULT_FEATURE, DEFAULT_POLLUTANT, LayerQueryParams, ScenarioBody,
    ScenarioQueryParams, ScenarioResponse, TablesResponse,
};
use serde::Serialize;

use crate::AppState;

/// `GET /`
pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body("Environmental Insights backend")
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
        grid_cells: state.insights.grid().len(),
        feature_schema_version: state.insights.schema().version(),
    })
}

/// `GET|POST /air-pollution-concentrations`
///
/// Stored predictions for one pollutant and time bucket, with AQI columns,
/// as a `GeoJSON` `FeatureCollection`.
pub async fn concentrations(
    state: web::Data<AppState>,
    params: web::Query<LayerQueryParams>,
) -> HttpResponse {
    let (pollutant, quantile, bucket) = match parse_layer(&params) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let insights = state.insights.clone();
    let result = web::block(move || {
        insights.baseline_concentrations(pollutant, &quantile, &bucket)
    })
    .await;

    match flatten(result) {
        Ok(payload) => geojson_response(payload.geojson),
        Err(e) => error_response(&e),
    }
}

/// `GET|POST /feature-vector`
///
/// One stored feature column for a time bucket as a `GeoJSON`
/// `FeatureCollection`.
pub async fn feature_vector(
    state: web::Data<AppState>,
    params: web::Query<LayerQueryParams>,
) -> HttpResponse {
    let feature = params
        .data_type
        .clone()
        .unwrap_or_else(|| DEFAULT_FEATURE.to_string());
    let bucket = match TimeBucket::parse(params.month(), params.day(), params.hour()) {
        Ok(bucket) => bucket,
        Err(e) => return error_response(&e.into()),
    };

    let insights = state.insights.clone();
    let result = web::block(move || insights.baseline_feature(&feature, &bucket)).await;

    match flatten(result) {
        Ok(payload) => geojson_response(payload.geojson),
        Err(e) => error_response(&e),
    }
}

/// `GET|POST /predict`
///
/// Predicts concentrations under a scenario. Changes come from the JSON
/// body if one is sent, otherwise from the `changes` query parameter. A
/// body that does not decode is rejected rather than ignored.
pub async fn predict(
    state: web::Data<AppState>,
    params: web::Query<ScenarioQueryParams>,
    body: web::Bytes,
) -> HttpResponse {
    let request = match parse_body(&body)
        .and_then(|body| ScenarioRequest::parse(&params, body))
    {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let insights = state.insights.clone();
    let result = web::block(move || {
        insights.scenario_concentrations(
            request.pollutant,
            &request.quantile,
            &request.bucket,
            &request.scenario,
        )
    })
    .await;

    match flatten(result) {
        Ok(payload) => HttpResponse::Ok().json(ScenarioResponse {
            updated_geojson: payload.geojson,
        }),
        Err(e) => error_response(&e),
    }
}

/// `GET /report`
///
/// Summary statistics for a scenario: mean concentration and band, the
/// least and most polluted cells, and a histogram of AQI values.
pub async fn report(
    state: web::Data<AppState>,
    params: web::Query<ScenarioQueryParams>,
) -> HttpResponse {
    let request = match ScenarioRequest::parse(&params, None) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    let insights = state.insights.clone();
    let result = web::block(move || {
        insights.scenario_report(
            request.pollutant,
            &request.quantile,
            &request.bucket,
            &request.scenario,
        )
    })
    .await;

    json_or_error(flatten(result))
}

/// `GET /geojson-data`
///
/// The grid alone, in WGS84, with each cell's `"Grid ID"`.
pub async fn grid(state: web::Data<AppState>) -> HttpResponse {
    let insights = state.insights.clone();
    let result = web::block(move || insights.grid_geojson()).await;

    match flatten(result) {
        Ok(payload) => geojson_response(payload.geojson),
        Err(e) => error_response(&e),
    }
}

/// `GET /num-tables`
///
/// Number and names of the store's tables.
pub async fn num_tables(state: web::Data<AppState>) -> HttpResponse {
    let insights = state.insights.clone();
    let result = web::block(move || insights.list_tables()).await;

    json_or_error(flatten(result).map(|table_names| TablesResponse {
        num_tables: table_names.len(),
        table_names,
    }))
}

/// Validated parameters of a scenario request.
struct ScenarioRequest {
    pollutant: Pollutant,
    quantile: Quantile,
    bucket: TimeBucket,
    scenario: Scenario,
}

impl ScenarioRequest {
    fn parse(
        params: &ScenarioQueryParams,
        body: Option<ScenarioBody>,
    ) -> Result<Self, InsightsError> {
        let scenario = match body {
            Some(body) => body
                .changes
                .into_iter()
                .fold(Scenario::new(), |s, (name, pct)| s.with_change(name, pct)),
            None => Scenario::parse_changes(params.changes.as_deref().unwrap_or_default())?,
        };

        Ok(Self {
            pollutant: Pollutant::parse(params.air_pollutant())?,
            quantile: parse_quantile(params.quantile.as_deref())?,
            bucket: TimeBucket::parse(params.month(), params.day(), params.hour())?,
            scenario,
        })
    }
}

/// Decodes an optional JSON [`ScenarioBody`]. An empty or whitespace-only
/// body means the changes come from the query string.
fn parse_body(body: &[u8]) -> Result<Option<ScenarioBody>, InsightsError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| InsightsError::InvalidBody {
            message: e.to_string(),
        })
}

fn parse_layer(
    params: &LayerQueryParams,
) -> Result<(Pollutant, Quantile, TimeBucket), InsightsError> {
    let pollutant = Pollutant::parse(params.data_type.as_deref().unwrap_or(DEFAULT_POLLUTANT))?;
    let quantile = parse_quantile(params.quantile.as_deref())?;
    let bucket = TimeBucket::parse(params.month(), params.day(), params.hour())?;
    Ok((pollutant, quantile, bucket))
}

fn parse_quantile(value: Option<&str>) -> Result<Quantile, InsightsError> {
    value
        .map_or_else(|| Ok(Quantile::mean()), str::parse::<Quantile>)
        .map_err(Into::into)
}

/// Collapses a blocking-pool failure into an internal error.
fn flatten<T>(
    result: Result<Result<T, InsightsError>, actix_web::error::BlockingError>,
) -> Result<T, InsightsError> {
    result.unwrap_or_else(|e| {
        Err(InsightsError::Internal {
            message: format!("blocking task failed: {e}"),
        })
    })
}

fn geojson_response(geojson: String) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("application/json")
        .body(geojson)
}

fn json_or_error<T: Serialize>(result: Result<T, InsightsError>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => error_response(&e),
    }
}

/// HTTP status for an error kind.
const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::TableNotFound | ErrorKind::PollutantUnsupported | ErrorKind::InvalidRequest => {
            StatusCode::BAD_REQUEST
        }
        ErrorKind::ModelNotFound => StatusCode::NOT_FOUND,
        ErrorKind::FeatureVectorInvalid | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn error_response(e: &InsightsError) -> HttpResponse {
    let kind = e.kind();
    let status = status_for(kind);

    if e.is_client_error() {
        log::warn!("Rejected request ({kind}): {e}");
    } else {
        log::error!("Request failed ({kind}): {e}");
    }

    HttpResponse::build(status).json(ApiError {
        error: e.to_string(),
        kind: kind.to_string(),
    })
}
