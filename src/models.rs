//! API Models
//!
//! Request and response types for the REST surface, deriving `serde` for
//! the wire format and `utoipa::ToSchema` for the OpenAPI document.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One entry of the persisted VNC connection list.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct VncConnection {
    #[schema(example = "Lab workstation")]
    pub name: String,
    /// Target in `host:port` form, as accepted by the websockify endpoint.
    #[schema(example = "10.0.0.5:5901")]
    pub url: String,
    /// Optional VNC password; omitted from responses when not set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Metadata for one uploaded file.
#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct FileInfo {
    pub filename: String,
    pub size: u64,
    #[schema(example = "2026-08-07 14:02:11")]
    pub upload_time: String,
}

#[derive(Serialize, ToSchema)]
pub struct FileListResponse {
    pub files: Vec<FileInfo>,
}

#[derive(Deserialize, ToSchema)]
pub struct PrintRequest {
    #[schema(example = "report.pdf")]
    pub filename: String,
}

/// Success envelope for operations acting on a single file.
#[derive(Serialize, ToSchema)]
pub struct FileActionResponse {
    pub message: String,
    pub filename: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}
