//! `/api/sessions/:id/files/*` — SFTP Router's HTTP surface (spec §4.E /
//! §6). `:id` is a session id; every path query is forwarded to that
//! session's SFTP subsystem verbatim.

use axum::body::Bytes;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{BrokerError, BrokerResult};
use crate::session::{EntryKind, SftpEntry};
use crate::sftp::SftpRouter;
use crate::AppState;

#[derive(Deserialize)]
pub struct PathQuery {
    path: String,
}

#[derive(Serialize)]
pub struct ListResponse {
    path: String,
    files: Vec<SftpEntry>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
) -> BrokerResult<Json<ListResponse>> {
    let files = SftpRouter::new(&state.registry).list(&id, &q.path).await?;
    Ok(Json(ListResponse { path: q.path, files }))
}

#[derive(Serialize)]
pub struct ExistsResponse {
    path: String,
    exists: bool,
}

pub async fn exists(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
) -> BrokerResult<Json<ExistsResponse>> {
    let exists = SftpRouter::new(&state.registry).exists(&id, &q.path).await?;
    Ok(Json(ExistsResponse { path: q.path, exists }))
}

#[derive(Serialize)]
pub struct ReadResponse {
    path: String,
    content: String,
    size: usize,
}

pub async fn read_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
) -> BrokerResult<Json<ReadResponse>> {
    let bytes = SftpRouter::new(&state.registry).read(&id, &q.path).await?;
    let size = bytes.len();
    let content = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, bytes);
    Ok(Json(ReadResponse {
        path: q.path,
        content,
        size,
    }))
}

#[derive(Deserialize)]
pub struct WriteRequest {
    path: String,
    /// Base64-encoded file content.
    content: String,
}

#[derive(Serialize)]
pub struct WriteResponse {
    path: String,
    success: bool,
}

pub async fn write_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<WriteRequest>,
) -> BrokerResult<Json<WriteResponse>> {
    let bytes = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &req.content)
        .map_err(|e| BrokerError::InvalidRequest(e.to_string()))?;
    SftpRouter::new(&state.registry)
        .write(&id, &req.path, bytes)
        .await?;
    Ok(Json(WriteResponse {
        path: req.path,
        success: true,
    }))
}

#[derive(Deserialize)]
pub struct CreateEntryRequest {
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
}

#[derive(Serialize)]
pub struct CreateEntryResponse {
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
}

pub async fn create_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<CreateEntryRequest>,
) -> BrokerResult<(StatusCode, Json<CreateEntryResponse>)> {
    let router = SftpRouter::new(&state.registry);
    match req.kind {
        EntryKind::Directory => router.create_directory(&id, &req.path).await?,
        _ => router.create_file(&id, &req.path).await?,
    }
    Ok((
        StatusCode::CREATED,
        Json(CreateEntryResponse {
            path: req.path,
            kind: req.kind,
        }),
    ))
}

#[derive(Deserialize)]
pub struct RenameRequest {
    path: String,
    #[serde(rename = "newPath")]
    new_path: String,
}

#[derive(Serialize)]
pub struct RenameResponse {
    #[serde(rename = "oldPath")]
    old_path: String,
    #[serde(rename = "newPath")]
    new_path: String,
}

pub async fn rename(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RenameRequest>,
) -> BrokerResult<Json<RenameResponse>> {
    SftpRouter::new(&state.registry)
        .rename(&id, &req.path, &req.new_path)
        .await?;
    Ok(Json(RenameResponse {
        old_path: req.path,
        new_path: req.new_path,
    }))
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    path: String,
    #[serde(rename = "type")]
    kind: EntryKind,
}

pub async fn delete_entry(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<DeleteQuery>,
) -> BrokerResult<StatusCode> {
    let router = SftpRouter::new(&state.registry);
    match q.kind {
        EntryKind::Directory => router.delete_directory(&id, &q.path).await?,
        _ => router.delete_file(&id, &q.path).await?,
    }
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
pub struct UploadResponse {
    path: String,
    size: usize,
    success: bool,
}

/// Multipart upload. The field's body is fully buffered before the
/// write, trading memory for simplicity — fine at the file sizes this
/// gateway expects to see over a browser upload.
pub async fn upload(
    State(state): State<AppState>,
    Path(id): Path<String>,
    mut multipart: Multipart,
) -> BrokerResult<(StatusCode, Json<UploadResponse>)> {
    let mut path: Option<String> = None;
    let mut data: Option<Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| BrokerError::InvalidRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "path" => {
                path = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| BrokerError::InvalidRequest(e.to_string()))?,
                );
            }
            "file" => {
                data = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| BrokerError::InvalidRequest(e.to_string()))?,
                );
            }
            _ => {}
        }
    }

    let path = path.ok_or_else(|| BrokerError::InvalidRequest("missing path field".into()))?;
    let data = data.ok_or_else(|| BrokerError::InvalidRequest("missing file field".into()))?;
    let size = data.len();

    SftpRouter::new(&state.registry)
        .write(&id, &path, data.to_vec())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            path,
            size,
            success: true,
        }),
    ))
}

pub async fn download(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<PathQuery>,
) -> BrokerResult<impl IntoResponse> {
    let bytes = SftpRouter::new(&state.registry).read(&id, &q.path).await?;
    let filename = q
        .path
        .rsplit('/')
        .next()
        .unwrap_or("download")
        .to_string();
    Ok((
        [(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{filename}\""),
        )],
        bytes,
    ))
}
