//! `/api/sessions/:id/monitor*` — Monitoring Probe's HTTP surface (spec
//! §4.G / §6). Every reading is taken from the remote host over the
//! session's own SSH connection, never the broker's.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::{BrokerError, BrokerResult};
use crate::monitor::{LoginRecord, ProcessInfo, ResourceSnapshot};
use crate::AppState;

pub async fn snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> BrokerResult<Json<ResourceSnapshot>> {
    let session = state
        .registry
        .get(&id)
        .await
        .ok_or(BrokerError::SessionNotFound)?;
    Ok(Json(state.monitor.snapshot(&session).await))
}

#[derive(Serialize)]
pub struct TopProcessesResponse {
    processes: Vec<ProcessInfo>,
}

pub async fn top_processes(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> BrokerResult<Json<TopProcessesResponse>> {
    let session = state
        .registry
        .get(&id)
        .await
        .ok_or(BrokerError::SessionNotFound)?;
    Ok(Json(TopProcessesResponse {
        processes: state.monitor.top_processes(&session).await,
    }))
}

#[derive(Serialize)]
pub struct LoginHistoryResponse {
    history: Vec<LoginRecord>,
}

pub async fn login_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> BrokerResult<Json<LoginHistoryResponse>> {
    let session = state
        .registry
        .get(&id)
        .await
        .ok_or(BrokerError::SessionNotFound)?;
    Ok(Json(LoginHistoryResponse {
        history: state.monitor.login_history(&session).await,
    }))
}
