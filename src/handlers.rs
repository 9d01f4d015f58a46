//! Axum Handlers for the REST API
//!
//! File transfer, document printing, and the VNC connection list. Uses
//! `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tracing::error;

use crate::{
    models::{
        ErrorResponse, FileActionResponse, FileInfo, FileListResponse, MessageResponse,
        PrintRequest, VncConnection,
    },
    print::PrintError,
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            ApiError::NotFound(error) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { error })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let error = "An internal server error occurred.".to_string();
                (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error }))
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

// Not a `From` impl: the blanket conversion above already covers
// `PrintError`, this picks a better status for the user's own mistakes.
fn print_error_to_api(err: PrintError) -> ApiError {
    match err {
        PrintError::UnsupportedType(_) => ApiError::BadRequest(err.to_string()),
        other => ApiError::InternalServerError(other.into()),
    }
}

/// Rejects names that would escape the uploads directory.
fn sanitize_filename(name: &str) -> Result<&str, ApiError> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(ApiError::BadRequest(format!("invalid filename: {}", name)));
    }
    Ok(name)
}

/// Resolves a request filename against the uploads directory, requiring the
/// file to exist.
async fn existing_upload(state: &AppState, filename: &str) -> Result<PathBuf, ApiError> {
    let filename = sanitize_filename(filename)?;
    let path = state.config.upload_dir.join(filename);
    if !fs::try_exists(&path).await? {
        return Err(ApiError::NotFound(format!("File not found: {}", filename)));
    }
    Ok(path)
}

/// Upload a file into the uploads directory.
#[utoipa::path(
    post,
    path = "/files",
    responses(
        (status = 200, description = "File uploaded successfully", body = FileActionResponse),
        (status = 400, description = "No file in the request", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    fs::create_dir_all(&state.config.upload_dir).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| ApiError::BadRequest("uploaded file has no name".to_string()))?;
        sanitize_filename(&filename)?;

        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.to_string()))?;
        fs::write(state.config.upload_dir.join(&filename), &data).await?;

        return Ok(Json(FileActionResponse {
            message: "File uploaded successfully".to_string(),
            filename,
        }));
    }

    Err(ApiError::BadRequest("No file uploaded".to_string()))
}

/// Download a previously uploaded file.
#[utoipa::path(
    get,
    path = "/files/{filename}",
    responses(
        (status = 200, description = "File contents"),
        (status = 404, description = "File not found", body = ErrorResponse)
    ),
    params(("filename" = String, Path, description = "Name of the uploaded file"))
)]
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = existing_upload(&state, &filename).await?;
    let data = fs::read(&path).await?;
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/octet-stream".to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    ))
}

/// List the uploaded files.
#[utoipa::path(
    get,
    path = "/files",
    responses(
        (status = 200, description = "List of uploaded files", body = FileListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FileListResponse>, ApiError> {
    fs::create_dir_all(&state.config.upload_dir).await?;

    let mut files = Vec::new();
    let mut entries = fs::read_dir(&state.config.upload_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        files.push(FileInfo {
            filename: entry.file_name().to_string_lossy().into_owned(),
            size: metadata.len(),
            upload_time: chrono::DateTime::<chrono::Local>::from(modified)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        });
    }

    Ok(Json(FileListResponse { files }))
}

/// Delete an uploaded file.
#[utoipa::path(
    delete,
    path = "/files/{filename}",
    responses(
        (status = 200, description = "File deleted successfully", body = FileActionResponse),
        (status = 404, description = "File not found", body = ErrorResponse)
    ),
    params(("filename" = String, Path, description = "Name of the uploaded file"))
)]
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let path = existing_upload(&state, &filename).await?;
    fs::remove_file(&path).await?;
    Ok(Json(FileActionResponse {
        message: "File deleted successfully".to_string(),
        filename,
    }))
}

/// Print an uploaded document on the default printer.
#[utoipa::path(
    post,
    path = "/print",
    request_body = PrintRequest,
    responses(
        (status = 200, description = "Print job submitted", body = MessageResponse),
        (status = 400, description = "Unsupported file type or bad request", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Printing failed", body = ErrorResponse)
    )
)]
pub async fn print_file(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PrintRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.filename.is_empty() {
        return Err(ApiError::BadRequest("filename must not be empty".to_string()));
    }
    let path = existing_upload(&state, &payload.filename).await?;
    state
        .printer
        .print_file(&path)
        .await
        .map_err(print_error_to_api)?;
    Ok(Json(MessageResponse {
        message: "Print job submitted".to_string(),
    }))
}

/// Open an uploaded document in its viewer, without printing.
#[utoipa::path(
    post,
    path = "/preopen",
    request_body = PrintRequest,
    responses(
        (status = 200, description = "Document opened", body = MessageResponse),
        (status = 400, description = "Unsupported file type or bad request", body = ErrorResponse),
        (status = 404, description = "File not found", body = ErrorResponse),
        (status = 500, description = "Opening failed", body = ErrorResponse)
    )
)]
pub async fn preopen_file(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PrintRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if payload.filename.is_empty() {
        return Err(ApiError::BadRequest("filename must not be empty".to_string()));
    }
    let path = existing_upload(&state, &payload.filename).await?;
    state
        .printer
        .open_file(&path)
        .await
        .map_err(print_error_to_api)?;
    Ok(Json(MessageResponse {
        message: "Document opened".to_string(),
    }))
}

/// List the saved VNC connections.
#[utoipa::path(
    get,
    path = "/api/vnc/connections",
    responses(
        (status = 200, description = "Saved connections", body = [VncConnection]),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_connections(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VncConnection>>, ApiError> {
    Ok(Json(state.store.list().await?))
}

/// Save a new VNC connection.
#[utoipa::path(
    post,
    path = "/api/vnc/connections",
    request_body = VncConnection,
    responses(
        (status = 200, description = "Connection saved", body = VncConnection),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn add_connection(
    State(state): State<Arc<AppState>>,
    Json(connection): Json<VncConnection>,
) -> Result<Json<VncConnection>, ApiError> {
    Ok(Json(state.store.add(connection).await?))
}

/// Update the saved VNC connection at the given index.
#[utoipa::path(
    put,
    path = "/api/vnc/connections/{index}",
    request_body = VncConnection,
    responses(
        (status = 200, description = "Connection updated", body = VncConnection),
        (status = 400, description = "Invalid connection index", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(("index" = usize, Path, description = "Position in the connection list"))
)]
pub async fn update_connection(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
    Json(connection): Json<VncConnection>,
) -> Result<Json<VncConnection>, ApiError> {
    state
        .store
        .update(index, connection)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid connection index: {}", index)))
}

/// Delete the saved VNC connection at the given index.
#[utoipa::path(
    delete,
    path = "/api/vnc/connections/{index}",
    responses(
        (status = 200, description = "Connection deleted", body = MessageResponse),
        (status = 400, description = "Invalid connection index", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(("index" = usize, Path, description = "Position in the connection list"))
)]
pub async fn delete_connection(
    State(state): State<Arc<AppState>>,
    Path(index): Path<usize>,
) -> Result<Json<MessageResponse>, ApiError> {
    if !state.store.delete(index).await? {
        return Err(ApiError::BadRequest(format!(
            "invalid connection index: {}",
            index
        )));
    }
    Ok(Json(MessageResponse {
        message: "Connection deleted".to_string(),
    }))
}
