//! API server: HTTP router and the Prometheus exporter.

use crate::rest::{self, AppState};
use crate::sequence_rest;
use crate::swagger::ApiDoc;
use axum::routing::{get, post, put};
use axum::Router;
use outreach_core::config::AppConfig;
use outreach_sequences::SequenceEngine;
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Builds the full application router over the given state.
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        // Definitions
        .route(
            "/sequences",
            get(sequence_rest::list_sequences).post(sequence_rest::create_sequence),
        )
        .route(
            "/sequences/:id",
            get(sequence_rest::get_sequence)
                .put(sequence_rest::update_sequence)
                .delete(sequence_rest::delete_sequence),
        )
        .route("/sequences/:id/steps", post(sequence_rest::add_step))
        .route(
            "/sequences/:id/steps/:step_id",
            put(sequence_rest::update_step).delete(sequence_rest::delete_step),
        )
        .route("/sequences/:id/assign", post(sequence_rest::assign_prospects))
        .route("/sequences/:id/assignments", get(sequence_rest::list_assignments))
        .route("/sequences/:id/stats", get(sequence_rest::sequence_stats))
        // Assignments
        .route("/assignments/:assignment_id", get(sequence_rest::get_assignment))
        .route(
            "/assignments/:assignment_id/advance",
            post(sequence_rest::advance_assignment),
        )
        .route(
            "/assignments/:assignment_id/pause",
            post(sequence_rest::pause_assignment),
        )
        .route(
            "/assignments/:assignment_id/resume",
            post(sequence_rest::resume_assignment),
        )
        .route(
            "/assignments/:assignment_id/stop",
            post(sequence_rest::stop_assignment),
        )
        // Executor and CRM callbacks
        .route(
            "/activities/:activity_id/outcome",
            post(sequence_rest::report_outcome),
        )
        .route("/prospects/:prospect_id", put(sequence_rest::upsert_prospect))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .with_state(state);

    api.merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Main API server.
pub struct ApiServer {
    config: AppConfig,
    engine: SequenceEngine,
}

impl ApiServer {
    pub fn new(config: AppConfig, engine: SequenceEngine) -> Self {
        Self { config, engine }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let state = AppState::new(self.engine.clone(), self.config.node_id.clone());
        let app = build_router(state);

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);

        info!(addr = %addr, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }

    /// Start the Prometheus exporter on a separate port. Must be called from
    /// within the tokio runtime.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.metrics.port);
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
