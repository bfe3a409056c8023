//! HTTP layer exposing normalization, report parsing and merging.

pub mod routes;
pub mod types;

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{config::Settings, data, nlp::ReportParser};

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub parser: Arc<ReportParser>,
}

impl AppState {
    pub fn from_settings(settings: Settings) -> Result<Self> {
        let dictionary = data::load_dictionary(&settings)?;
        let parser = ReportParser::from_settings(&settings, dictionary)?;
        Ok(Self {
            settings,
            parser: Arc::new(parser),
        })
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/normalize", post(routes::normalize_terms))
        .route("/parse-report", post(routes::parse_report))
        .route("/merge", post(routes::merge))
        .route("/terms", get(routes::list_terms).post(routes::extend_terms))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(settings: Settings, host: String, port: u16) -> Result<()> {
    let state = AppState::from_settings(settings)?;
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid bind address {host}:{port}"))?;
    info!(%addr, "serving labnorm API");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("labnorm API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
