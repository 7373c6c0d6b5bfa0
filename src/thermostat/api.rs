//! HTTP API for zone temperatures

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use super::{Thermostat, Zone, format_temperature};
use crate::Result;

/// Message-only response body
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Temperature reading
#[derive(Debug, Serialize, Deserialize)]
pub struct TemperatureResponse {
    pub zone: Zone,
    pub temperature: String,
}

/// Body for setting a zone's temperature
#[derive(Debug, Serialize, Deserialize)]
pub struct TemperatureRequest {
    pub zone: Zone,
    pub temp: i32,
}

/// Error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn not_found() -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            detail: "Zone not found".to_string(),
        }),
    )
}

async fn home() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "Welcome to the Temperature Control API".to_string(),
    })
}

async fn get_temperature(
    State(thermostat): State<Arc<Thermostat>>,
    Path(zone): Path<String>,
) -> std::result::Result<Json<TemperatureResponse>, ApiError> {
    let zone: Zone = zone.parse().map_err(|_| not_found())?;
    let temperature = thermostat.get(zone).await.ok_or_else(not_found)?;

    Ok(Json(TemperatureResponse {
        zone,
        temperature: format_temperature(temperature),
    }))
}

async fn set_temperature(
    State(thermostat): State<Arc<Thermostat>>,
    Json(request): Json<TemperatureRequest>,
) -> Json<MessageResponse> {
    thermostat.set(request.zone, request.temp).await;

    Json(MessageResponse {
        message: format!(
            "The temperature in the {} is now {}",
            request.zone,
            format_temperature(request.temp)
        ),
    })
}

/// Build the temperature API router
pub fn router(thermostat: Arc<Thermostat>) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/temperature/{zone}", get(get_temperature))
        .route("/temperature", post(set_temperature))
        .with_state(thermostat)
}

/// Serve the API until the process is interrupted
///
/// # Errors
///
/// Returns error if the port cannot be bound
pub async fn serve(thermostat: Arc<Thermostat>, port: u16) -> Result<()> {
    let app = router(thermostat).layer(TraceLayer::new_for_http());
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!(%addr, "temperature API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    Ok(())
}
