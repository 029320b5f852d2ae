#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the environmental insights application.
//!
//! Serves baseline pollution and feature layers, scenario predictions and
//! scenario reports for the map front-end. All state is loaded once at
//! startup: the `DuckDB` store, the grid geometry, the feature schema and
//! the AQI breakpoint tables. Model artifacts are loaded on first use.

pub mod config;
mod handlers;

use std::sync::Arc;

use actix_cors::Cors;
use actix_files::Files;
use actix_web::{App, HttpServer, middleware, web};
use env_insights_aqi::AqiClassifier;
use env_insights_database::{GridTableSource, Store, StoreError};
use env_insights_features::FeatureSchema;
use env_insights_model::ModelRegistry;
use env_insights_pipeline::{Insights, Settings};
use env_insights_spatial::{GeoJsonFileSource, GeometrySource, SpatialError};

use crate::config::{ConfigError, GridSource, ServerConfig};

/// Shared application state.
pub struct AppState {
    /// The prediction pipeline and everything it reads.
    pub insights: Arc<Insights>,
}

/// Errors that prevent the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The store could not be opened or its grid read.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The grid file could not be read.
    #[error(transparent)]
    Spatial(#[from] SpatialError),
}

/// Opens the store, loads the grid and assembles the pipeline.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the grid cannot be
/// loaded from the configured source.
pub fn build_insights(config: &ServerConfig) -> Result<Insights, StartupError> {
    log::info!(
        "Opening DuckDB store {} ({} connections)...",
        config.database_path.display(),
        config.db_pool_size
    );
    let store = Store::open(&config.database_path, config.db_pool_size)?;

    let crs = config.grid_crs()?;
    let grid = match config.grid_source() {
        GridSource::Store => GridTableSource::new(&store, crs).load()?,
        GridSource::File(path) => GeoJsonFileSource::new(path, crs).load()?,
    };

    let settings = Settings {
        range_policy: config.range_policy,
        precision: config.precision(),
    };
    log::info!(
        "Preparing {} grid cells (range policy {}, models from {})...",
        grid.len(),
        settings.range_policy,
        config.models_dir.display()
    );

    Ok(Insights::new(
        store,
        &grid,
        ModelRegistry::new(&config.models_dir),
        AqiClassifier::uk_daqi(),
        FeatureSchema::v1(),
        config.dataset_scope()?,
        settings,
    ))
}

/// Registers every API route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/health", web::get().to(handlers::health))
        .service(
            web::resource("/air-pollution-concentrations")
                .route(web::get().to(handlers::concentrations))
                .route(web::post().to(handlers::concentrations)),
        )
        .service(
            web::resource("/feature-vector")
                .route(web::get().to(handlers::feature_vector))
                .route(web::post().to(handlers::feature_vector)),
        )
        .service(
            web::resource("/predict")
                .route(web::get().to(handlers::predict))
                .route(web::post().to(handlers::predict)),
        )
        .route("/geojson-data", web::get().to(handlers::grid))
        .route("/report", web::get().to(handlers::report))
        .route("/num-tables", web::get().to(handlers::num_tables));
}

/// Starts the environmental insights API server.
///
/// Reads [`ServerConfig`] from the environment, builds the pipeline and
/// runs the Actix-Web HTTP server. The caller provides the async runtime
/// (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if startup fails, or if the HTTP
/// server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ServerConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {e}");
        std::io::Error::other(e.to_string())
    })?;

    let insights = build_insights(&config).map_err(|e| {
        log::error!("Failed to start: {e}");
        std::io::Error::other(e.to_string())
    })?;

    let state = web::Data::new(AppState {
        insights: Arc::new(insights),
    });
    let static_dir = config.static_dir.clone();

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();
        let static_dir = static_dir.clone();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
            .configure(move |cfg| match static_dir {
                // Serve frontend static files (production)
                Some(dir) => {
                    cfg.service(Files::new("/", dir).index_file("index.html"));
                }
                None => {
                    cfg.route("/", web::get().to(handlers::index));
                }
            })
    })
    .bind((config.bind_addr.as_str(), config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use env_insights_database::DuckDbPool;
    use env_insights_pollution_models::DatasetScope;
    use env_insights_server_models::{ApiError, ApiHealth, ScenarioResponse, TablesResponse};
    use env_insights_spatial::{Crs, parse_grid_collection};
    use std::path::PathBuf;

    const GRID: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": { "Grid ID": 1 },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 50], [0.01, 50], [0.01, 50.01], [0, 50.01], [0, 50]]]
                }
            },
            {
                "type": "Feature",
                "properties": { "Grid ID": 2 },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0.01, 50], [0.02, 50], [0.02, 50.01], [0.01, 50.01], [0.01, 50]]]
                }
            }
        ]
    }"#;

    fn store() -> Store {
        let conn = duckdb::Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE "feature_vector_Month_1_Day_Friday_Hour_8" (
                "Grid ID" BIGINT, "Bicycle Score" DOUBLE, "Urban" DOUBLE
            );
            INSERT INTO "feature_vector_Month_1_Day_Friday_Hour_8" VALUES
                (1, 10.0, 1.0), (2, 20.0, 1.0);

            CREATE TABLE "air_pollution_concentration_Month_1_Day_Friday_Hour_8" (
                "Grid ID" BIGINT, "no2 Prediction mean" DOUBLE
            );
            INSERT INTO "air_pollution_concentration_Month_1_Day_Friday_Hour_8" VALUES
                (1, 10.0), (2, 150.0);
            "#,
        )
        .unwrap();
        Store::from_pool(DuckDbPool::from_connection(conn, 2).unwrap())
    }

    fn models_dir(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "env_insights_server_{name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&root);
        let dir = root.join("all").join("mean");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("no2.json"),
            r#"{
                "pollutant": "no2",
                "quantile": "mean",
                "schemaVersion": 1,
                "featureNames": ["Bicycle Score", "Urban"],
                "model": { "type": "linear", "intercept": 0.0, "coefficients": [5.0, 20.0] }
            }"#,
        )
        .unwrap();
        root
    }

    fn state(name: &str) -> (web::Data<AppState>, PathBuf) {
        let grid = parse_grid_collection(GRID, Crs::Wgs84).unwrap();
        let root = models_dir(name);
        let insights = Insights::new(
            store(),
            &grid,
            ModelRegistry::new(&root),
            AqiClassifier::uk_daqi(),
            FeatureSchema::new(1, vec!["Bicycle Score".to_string(), "Urban".to_string()])
                .unwrap(),
            DatasetScope::default(),
            Settings::default(),
        );
        let state = web::Data::new(AppState {
            insights: Arc::new(insights),
        });
        (state, root)
    }

    #[actix_web::test]
    async fn health_reports_grid() {
        let (state, root) = state("health");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: ApiHealth = test::call_and_read_body_json(&app, req).await;
        assert!(body.healthy);
        assert_eq!(body.grid_cells, 2);
        assert_eq!(body.feature_schema_version, 1);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[actix_web::test]
    async fn concentrations_use_client_defaults() {
        let (state, root) = state("concentrations");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/air-pollution-concentrations?dataType=no2&month=1&day=Friday&hour=08:00")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"][1]["properties"]["no2 AQI"], 3);

        // month, day and hour default to 1, Friday and 8
        let req = test::TestRequest::post()
            .uri("/air-pollution-concentrations")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[actix_web::test]
    async fn feature_vector_serves_one_column() {
        let (state, root) = state("feature");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/feature-vector?dataType=Bicycle%20Score&month=1&day=Friday&hour=8")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["features"][0]["properties"]["Bicycle Score"], 10.0);

        let req = test::TestRequest::get()
            .uri("/feature-vector?dataType=Nope")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[actix_web::test]
    async fn predict_applies_changes() {
        let (state, root) = state("predict");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/predict?changes=Bicycle%20Score:-10&air_pollutant=no2&month=1&day=Friday&hour=8")
            .to_request();
        let body: ScenarioResponse = test::call_and_read_body_json(&app, req).await;
        let geojson: serde_json::Value = serde_json::from_str(&body.updated_geojson).unwrap();
        // 5 * 9 + 20 * 1
        assert_eq!(
            geojson["features"][0]["properties"]["no2 Prediction mean"],
            65.0
        );

        let req = test::TestRequest::post()
            .uri("/predict?air_pollutant=no2")
            .set_json(serde_json::json!({ "changes": { "Bicycle Score": 100.0 } }))
            .to_request();
        let body: ScenarioResponse = test::call_and_read_body_json(&app, req).await;
        let geojson: serde_json::Value = serde_json::from_str(&body.updated_geojson).unwrap();
        // 5 * 20 + 20 * 1
        assert_eq!(
            geojson["features"][0]["properties"]["no2 Prediction mean"],
            120.0
        );

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[actix_web::test]
    async fn predict_rejects_undecodable_body() {
        let (state, root) = state("bad_body");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::post()
            .uri("/predict?air_pollutant=no2")
            .set_json(serde_json::json!({ "changes": { "Bicycle Score": "ten" } }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.kind, "InvalidRequest");
        assert!(body.error.contains("invalid request body"), "{}", body.error);

        let req = test::TestRequest::post()
            .uri("/predict?air_pollutant=no2")
            .insert_header(("content-type", "application/json"))
            .set_payload("{ not json")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[actix_web::test]
    async fn grid_is_served_without_results() {
        let (state, root) = state("grid");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get().uri("/geojson-data").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"].as_array().unwrap().len(), 2);
        assert_eq!(body["features"][0]["properties"]["Grid ID"], 1);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[actix_web::test]
    async fn errors_carry_kind_and_status() {
        let (state, root) = state("errors");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/predict?air_pollutant=o3")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.kind, "ModelNotFound");
        assert!(body.error.contains("o3"));

        let req = test::TestRequest::get()
            .uri("/predict?air_pollutant=no2&month=3&day=Monday&hour=0")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.kind, "TableNotFound");
        assert!(body.error.contains("Month_3_Day_Monday_Hour_0"));

        let req = test::TestRequest::get()
            .uri("/air-pollution-concentrations?dataType=nox")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.kind, "PollutantUnsupported");

        let req = test::TestRequest::get()
            .uri("/predict?changes=Bicycle%20Score")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ApiError = test::read_body_json(resp).await;
        assert_eq!(body.kind, "InvalidRequest");

        let req = test::TestRequest::get()
            .uri("/predict?month=13")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        std::fs::remove_dir_all(&root).unwrap();
    }

    #[actix_web::test]
    async fn report_and_tables() {
        let (state, root) = state("report");
        let app =
            test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = test::TestRequest::get()
            .uri("/report?changes=Bicycle%20Score:100&air_pollutant=no2")
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["cells"], 2);
        // Baseline 70 and 120; doubled bicycle score gives 120 and 220.
        assert_eq!(body["baselineMeanConcentration"], 95.0);
        assert_eq!(body["meanConcentration"], 170.0);
        assert_eq!(body["mostPolluted"]["gridId"], "2");

        let req = test::TestRequest::get().uri("/num-tables").to_request();
        let body: TablesResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.num_tables, 2);
        assert_eq!(body.table_names.len(), 2);

        std::fs::remove_dir_all(&root).unwrap();
    }
}
