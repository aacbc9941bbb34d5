//! Status request handlers

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use brick_core::store::{BrickFilter, Pagination};

use crate::server::state::ServerState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "bricks-conductor".to_string(),
        version: state.version.clone(),
    })
}

/// Status response: brick counts per lifecycle state
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub uptime_secs: u64,
    pub bricks_total: usize,
    pub bricks: BTreeMap<String, usize>,
}

/// Status handler
pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, StatusCode> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0;

    let mut page = Pagination {
        limit: Some(100),
        marker: None,
    };
    loop {
        let result = state
            .store
            .list_bricks(&BrickFilter::default(), &page)
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

        for brick in &result.items {
            total += 1;
            *counts.entry(brick.status.to_string()).or_insert(0) += 1;
        }

        match result.next_marker {
            Some(marker) => page.marker = Some(marker),
            None => break,
        }
    }

    Ok(Json(StatusResponse {
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        bricks_total: total,
        bricks: counts,
    }))
}
