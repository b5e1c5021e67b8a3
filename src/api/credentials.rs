//! `/api/credentials/*` — Credential Vault CRUD (spec §4.A / §6). Secrets
//! never appear in a `list`/`exists` response body; only `get_one`
//! returns the full record, matching spec §8 scenario 2's "saved equals
//! retrieved" requirement.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};
use crate::vault::{AuthType, CredentialRecord, CredentialSummary};
use crate::AppState;

#[derive(Serialize)]
pub struct CredentialListResponse {
    credentials: Vec<CredentialSummary>,
}

pub async fn list(State(state): State<AppState>) -> Json<CredentialListResponse> {
    Json(CredentialListResponse {
        credentials: state.vault.list(),
    })
}

#[derive(Deserialize)]
pub struct CreateCredentialRequest {
    id: String,
    host: String,
    port: u16,
    username: String,
    auth_type: AuthType,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    private_key: Option<String>,
    #[serde(default)]
    passphrase: Option<String>,
}

#[derive(Serialize)]
pub struct CreateCredentialResponse {
    success: bool,
    id: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateCredentialRequest>,
) -> BrokerResult<(StatusCode, Json<CreateCredentialResponse>)> {
    let record = CredentialRecord {
        id: req.id.clone(),
        host: req.host,
        port: req.port,
        username: req.username,
        auth_type: req.auth_type,
        password: req.password,
        private_key: req.private_key,
        passphrase: req.passphrase,
    };
    state.vault.save(&req.id, &record)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateCredentialResponse {
            success: true,
            id: req.id,
        }),
    ))
}

pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> BrokerResult<Json<CredentialRecord>> {
    state
        .vault
        .get(&id)
        .map(Json)
        .ok_or(BrokerError::CredentialNotFound)
}

#[derive(Serialize)]
pub struct ExistsResponse {
    exists: bool,
}

pub async fn exists(State(state): State<AppState>, Path(id): Path<String>) -> Json<ExistsResponse> {
    Json(ExistsResponse {
        exists: state.vault.has(&id),
    })
}

pub async fn remove(State(state): State<AppState>, Path(id): Path<String>) -> BrokerResult<StatusCode> {
    if state.vault.delete(&id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Ok(StatusCode::NOT_FOUND)
    }
}
