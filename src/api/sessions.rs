//! `/api/sessions/*` — Session Registry CRUD (spec §4.C / §6). A caller
//! either supplies credentials inline or references a stored credential
//! id; either way the secret is handed to [`crate::session::SshSession::connect`]
//! and never stored by this layer.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};
use crate::registry::SessionSummary;
use crate::session::{AuthConfig, ConnectRequest, SessionId};
use crate::vault::AuthType;
use crate::AppState;

#[derive(Deserialize)]
#[serde(untagged)]
pub enum CreateSessionRequest {
    StoredCredential {
        credential_id: String,
    },
    Inline {
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
    },
}

#[derive(Serialize)]
pub struct CreateSessionResponse {
    #[serde(rename = "sessionId")]
    session_id: SessionId,
    status: String,
}

pub async fn create(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> BrokerResult<(StatusCode, Json<CreateSessionResponse>)> {
    let connect_req = match req {
        CreateSessionRequest::StoredCredential { credential_id } => {
            let record = state
                .vault
                .get(&credential_id)
                .ok_or(BrokerError::CredentialNotFound)?;
            ConnectRequest {
                host: record.host,
                port: record.port,
                username: record.username,
                auth: to_auth_config(record.auth_type, record.password, record.private_key, record.passphrase)?,
            }
        }
        CreateSessionRequest::Inline {
            host,
            port,
            username,
            auth_type,
            password,
            private_key,
            passphrase,
        } => ConnectRequest {
            host,
            port,
            username,
            auth: to_auth_config(auth_type, password, private_key, passphrase)?,
        },
    };

    let session = state.registry.connect(connect_req).await;
    let status = session.meta.lock().unwrap().status.as_str().to_string();
    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id.clone(),
            status,
        }),
    ))
}

fn to_auth_config(
    auth_type: AuthType,
    password: Option<String>,
    private_key: Option<String>,
    passphrase: Option<String>,
) -> BrokerResult<AuthConfig> {
    match auth_type {
        AuthType::Password => password
            .map(AuthConfig::Password)
            .ok_or_else(|| BrokerError::InvalidRequest("password auth requires a password".into())),
        AuthType::Key => private_key
            .map(|private_key| AuthConfig::Key {
                private_key,
                passphrase,
            })
            .ok_or_else(|| BrokerError::InvalidRequest("key auth requires a private key".into())),
    }
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.active_sessions().await)
}

#[derive(Serialize)]
pub struct StatusResponse {
    #[serde(rename = "sessionId")]
    session_id: SessionId,
    status: String,
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> BrokerResult<Json<StatusResponse>> {
    let status = state
        .registry
        .status(&id)
        .await
        .ok_or(BrokerError::SessionNotFound)?;
    Ok(Json(StatusResponse {
        session_id: id,
        status: status.as_str().to_string(),
    }))
}

/// `DELETE /api/sessions/:id` — idempotent teardown; 404 if the session
/// was never there to remove.
pub async fn remove(State(state): State<AppState>, Path(id): Path<SessionId>) -> StatusCode {
    if state.registry.disconnect(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Serialize)]
pub struct DisconnectBeaconResponse {
    success: bool,
}

/// `POST /api/sessions/:id/disconnect` — beacon-style teardown fired by
/// `navigator.sendBeacon` on tab unload. Always 200 (spec §7 Propagation
/// policy): a beacon fired after the session already disappeared is not
/// an error, just a no-op.
pub async fn disconnect_beacon(
    State(state): State<AppState>,
    Path(id): Path<SessionId>,
) -> Json<DisconnectBeaconResponse> {
    state.registry.disconnect(&id).await;
    Json(DisconnectBeaconResponse { success: true })
}
