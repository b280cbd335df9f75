//! Plain HTTP endpoints: transfers, token inspection and health

use std::io;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::multipart::Field;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::io::StreamReader;

use bastion_core::remote_path::{authorize_download, staging_path};
use bastion_core::{CredentialBundle, TokenError};

use super::params::ConnectParams;
use crate::state::GatewayState;
use crate::transfer::{start_download, upload_stream, TransferResult};

/// `POST /upload`: multipart form with credential fields followed by `file`.
///
/// The file part is streamed to the remote host as it arrives; fields after
/// it are ignored.
pub async fn upload_handler(
    State(state): State<Arc<GatewayState>>,
    mut multipart: Multipart,
) -> Json<TransferResult> {
    let mut params = ConnectParams::default();
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return Json(TransferResult::failure("Failed to read file: missing file field")),
            Err(e) => return Json(TransferResult::failure(format!("Failed to read file: {}", e))),
        };
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            return Json(upload_field(&state, &params, field).await);
        }
        if matches!(name.as_str(), "host" | "user" | "password" | "privatekey" | "access") {
            match field.text().await {
                Ok(value) => {
                    params.set(&name, value);
                }
                Err(e) => {
                    return Json(TransferResult::failure(format!(
                        "Failed to read {}: {}",
                        name, e
                    )))
                }
            }
        }
    }
}

async fn upload_field(
    state: &GatewayState,
    params: &ConnectParams,
    field: Field<'_>,
) -> TransferResult {
    let filename = field.file_name().unwrap_or_default().to_string();
    if let Err(e) = staging_path(&filename) {
        return TransferResult::failure(e.to_string());
    }
    let credentials = match params.resolve(state.tokens.as_ref()) {
        Ok(credentials) => credentials,
        Err(e) => return TransferResult::failure(e.to_string()),
    };
    let connection = match state.connector.connect(&credentials).await {
        Ok(connection) => connection,
        Err(e) => return TransferResult::failure(format!("Failed to connect: {}", e)),
    };

    let reader = StreamReader::new(field.map_err(io::Error::other));
    tokio::pin!(reader);
    let result = upload_stream(
        connection.as_ref(),
        &filename,
        &mut reader,
        &state.transfer_limits(),
    )
    .await;
    connection.close().await;
    TransferResult::from(result)
}

/// Query for `GET /download`
#[derive(Debug, Default, Deserialize)]
pub struct DownloadQuery {
    pub path: Option<String>,
    #[serde(flatten)]
    pub connect: ConnectParams,
}

/// `GET /download`: stream a remote file as an attachment
pub async fn download_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<DownloadQuery>,
) -> Response {
    let path = query.path.as_deref().unwrap_or_default();
    if path.is_empty() || query.connect.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing required parameters").into_response();
    }

    // Checked before anything touches the network.
    if let Err(e) = authorize_download(path) {
        tracing::warn!("Refusing download of {}", path);
        return (StatusCode::FORBIDDEN, e.to_string()).into_response();
    }

    let credentials = match query.connect.resolve(state.tokens.as_ref()) {
        Ok(credentials) => credentials,
        Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    };
    let connection = match state.connector.connect(&credentials).await {
        Ok(connection) => connection,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Download failed: {}", e),
            )
                .into_response()
        }
    };

    let download = match start_download(connection.clone(), path, &state.transfer_limits()).await {
        Ok(download) => download.close_connection_on_finish(),
        Err(e) => {
            connection.close().await;
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Download failed: {}", e),
            )
                .into_response();
        }
    };

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download.file_name()
    );
    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(download.into_stream()),
    )
        .into_response()
}

/// Query for `GET /api/access`
#[derive(Debug, Deserialize)]
pub struct AccessQuery {
    pub access: String,
}

/// What a token grants, without any secret material
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSummary {
    pub user: String,
    pub host: String,
    pub has_private_key: bool,
}

impl From<&CredentialBundle> for AccessSummary {
    fn from(credentials: &CredentialBundle) -> Self {
        Self {
            user: credentials.user.clone(),
            host: credentials.host.clone(),
            has_private_key: credentials.private_key.is_some(),
        }
    }
}

/// `GET /api/access?access=<token>`
pub async fn access_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<AccessQuery>,
) -> Response {
    let decoded = state
        .tokens
        .as_ref()
        .ok_or(TokenError)
        .and_then(|codec| codec.decode(&query.access));
    match decoded {
        Ok(credentials) => Json(AccessSummary::from(&credentials)).into_response(),
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

/// `GET /healthz`
pub async fn health_handler(State(state): State<Arc<GatewayState>>) -> Json<serde_json::Value> {
    let active = state.sessions.list();
    Json(json!({ "status": "ok", "sessions": active.len(), "active": active }))
}
