use {
    axum::{
        extract::{Multipart, Query, State, multipart::Field},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Json, Response},
    },
    serde::Serialize,
    serde_json::json,
    tracing::{error, warn},
};

use {
    clinic_common::absolute_url,
    clinic_media::{StoredUpload, UploadError, UploadStore},
};

use crate::{
    auth::{authorize, extract_token},
    server::{AppState, TokenQuery},
};

/// Multipart field carrying the file.
pub const FILE_FIELD: &str = "arquivo";

/// Body of a successful upload. `url` is absolute when a public base URL is
/// configured; `path` is always the server-relative path.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    ok: bool,
    url: String,
    path: String,
    mime: String,
    nome_arquivo: String,
    tamanho: u64,
}

impl UploadResponse {
    fn new(stored: StoredUpload, public_base_url: Option<&str>) -> Self {
        Self {
            ok: true,
            url: public_base_url.map_or_else(
                || stored.url.clone(),
                |base| absolute_url(base, &stored.url),
            ),
            path: stored.url,
            mime: stored.mime,
            nome_arquivo: stored.original_name,
            tamanho: stored.size,
        }
    }
}

fn reject(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

fn upload_error_response(err: &UploadError) -> Response {
    let status = match err {
        UploadError::MimeNotAllowed(_) => StatusCode::BAD_REQUEST,
        UploadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    reject(status, err.to_string())
}

/// Read a file field chunk by chunk, stopping as soon as it exceeds the limit.
async fn read_limited(field: &mut Field<'_>, uploads: &UploadStore) -> Result<Vec<u8>, Response> {
    let mut bytes = Vec::new();
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                bytes.extend_from_slice(&chunk);
                if let Err(e) = uploads.check_size(bytes.len() as u64) {
                    return Err(upload_error_response(&e));
                }
            },
            Ok(None) => return Ok(bytes),
            Err(e) => return Err(reject(e.status(), e.body_text())),
        }
    }
}

/// `POST /api/upload`: store one attachment and return where it is served.
pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let token = extract_token(&headers, query.token.as_deref());
    let auth = authorize(&state.gateway.auth, token.as_deref());
    if !auth.ok {
        warn!(reason = auth.reason, "upload rejected");
        return reject(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    loop {
        let mut field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => return reject(StatusCode::BAD_REQUEST, "no file uploaded"),
            Err(e) => return reject(e.status(), e.body_text()),
        };
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let original_name = field.file_name().unwrap_or("arquivo").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        if let Err(e) = state.uploads.check_mime(&content_type) {
            warn!(mime = %content_type, "upload rejected");
            return upload_error_response(&e);
        }

        let bytes = match read_limited(&mut field, &state.uploads).await {
            Ok(bytes) => bytes,
            Err(resp) => return resp,
        };

        return match state
            .uploads
            .save(&original_name, &content_type, &bytes)
            .await
        {
            Ok(stored) => {
                Json(UploadResponse::new(stored, state.public_base_url.as_deref())).into_response()
            },
            Err(e) => {
                if matches!(e, UploadError::Io(_)) {
                    error!(error = %e, "failed to store upload");
                }
                upload_error_response(&e)
            },
        };
    }
}
