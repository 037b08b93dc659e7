use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
    Extension,
};
use serde_json::json;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::middleware::auth::CallerIdentity;
use crate::models::media_object::MediaObject;
use crate::services::access_service::AccessDecision;
use crate::services::media_service::NewMediaObject;
use crate::utils::range::{parse_byte_range, ByteRange};
use crate::AppState;

const SECURE_ID_LEN: usize = 32;

#[axum::debug_handler]
pub async fn serve_media(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(secure_id): Path<String>,
    headers: HeaderMap,
) -> crate::error::Result<Response> {
    let media = state.media_service.get_by_secure_id(&secure_id).await?;

    let decision = state
        .media_service
        .authorize(&media, identity.0.as_ref())
        .await?;
    let reason = match decision {
        AccessDecision::Granted(reason) => reason,
        AccessDecision::Denied(denied) => {
            tracing::warn!(
                secure_id = %secure_id,
                reason = denied.as_str(),
                "media access denied"
            );
            return Ok((
                denied.status(),
                Json(json!({
                    "error": "access_denied",
                    "reason": denied.as_str(),
                })),
            )
                .into_response());
        }
    };

    tracing::debug!(secure_id = %secure_id, reason = reason.as_str(), "media access granted");

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if media.is_video() {
        if let Some(raw) = range_header {
            return stream_range(&state, &media, &raw).await;
        }
    }
    stream_full(&state, &media).await
}

async fn stream_full(state: &AppState, media: &MediaObject) -> crate::error::Result<Response> {
    let (file, len) = state.storage.open_full(&media.storage_key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    set_common_headers(headers, media);
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&len.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    Ok(response)
}

async fn stream_range(
    state: &AppState,
    media: &MediaObject,
    raw: &str,
) -> crate::error::Result<Response> {
    // Byte count comes from the filesystem so a stale metadata row cannot
    // produce a short or overlong Content-Range.
    let (_, size) = state.storage.open_full(&media.storage_key).await?;

    match parse_byte_range(raw, size) {
        ByteRange::Satisfiable { start, end } => {
            let reader = state.storage.open_range(&media.storage_key, start, end).await?;
            let body = Body::from_stream(ReaderStream::new(reader));

            let mut response = Response::new(body);
            *response.status_mut() = StatusCode::PARTIAL_CONTENT;
            let headers = response.headers_mut();
            set_common_headers(headers, media);
            headers.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, size))
                    .map_err(|e| crate::error::Error::Internal(e.to_string()))?,
            );
            headers.insert(
                header::CONTENT_LENGTH,
                HeaderValue::from_str(&(end - start + 1).to_string())
                    .unwrap_or_else(|_| HeaderValue::from_static("0")),
            );
            Ok(response)
        }
        ByteRange::Unsatisfiable => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::RANGE_NOT_SATISFIABLE;
            response.headers_mut().insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes */{}", size))
                    .map_err(|e| crate::error::Error::Internal(e.to_string()))?,
            );
            Ok(response)
        }
        ByteRange::NotARange => stream_full(state, media).await,
    }
}

fn set_common_headers(headers: &mut HeaderMap, media: &MediaObject) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&media.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    let cache = if media.is_image() {
        "public, max-age=31536000, immutable"
    } else {
        "private, max-age=300"
    };
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(cache));
}

#[axum::debug_handler]
pub async fn upload_media(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    mut multipart: axum::extract::Multipart,
) -> crate::error::Result<Response> {
    let user = identity.require()?.clone();
    if !user.is_admin() && !user.is_instructor() {
        return Err(crate::error::Error::Forbidden("not_authorized".to_string()));
    }

    let mut course_id: Option<Uuid> = None;
    let mut category = "media".to_string();
    let mut is_public = false;
    let mut stored: Option<(String, String, String, i64)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(crate::error::Error::Multipart)?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "course_id" => {
                let raw = field.text().await.map_err(crate::error::Error::Multipart)?;
                let parsed = Uuid::parse_str(raw.trim()).map_err(|_| {
                    crate::error::Error::BadRequest("invalid course_id".to_string())
                })?;
                course_id = Some(parsed);
            }
            "category" => {
                let raw = field.text().await.map_err(crate::error::Error::Multipart)?;
                let trimmed = raw.trim();
                if !trimmed.is_empty() {
                    category = trimmed.to_string();
                }
            }
            "is_public" => {
                let raw = field.text().await.map_err(crate::error::Error::Multipart)?;
                is_public = raw.trim() == "true";
            }
            "file" => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let storage_key = format!("{}/{}", category, Uuid::new_v4());

                let stream = futures::StreamExt::map(field, |chunk| {
                    chunk.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))
                });
                let size_bytes = state.storage.store_stream(&storage_key, stream).await?;
                stored = Some((file_name, content_type, storage_key, size_bytes));
            }
            _ => {}
        }
    }

    let Some((file_name, content_type, storage_key, size_bytes)) = stored else {
        return Err(crate::error::Error::BadRequest(
            "missing file field".to_string(),
        ));
    };

    let media = state
        .media_service
        .create(NewMediaObject {
            secure_id: crate::utils::token::generate_secure_id(SECURE_ID_LEN),
            storage_key,
            file_name,
            size_bytes,
            content_type,
            category,
            uploaded_by: user.id,
            course_id,
            is_public,
        })
        .await?;

    tracing::info!(media_id = %media.id, secure_id = %media.secure_id, "media uploaded");

    let resp = crate::dto::media_dto::MediaUploadResponse {
        id: media.id,
        secure_id: media.secure_id,
        file_name: media.file_name,
        size_bytes: media.size_bytes,
        content_type: media.content_type,
        category: media.category,
        is_public: media.is_public,
    };
    Ok((StatusCode::CREATED, Json(resp)).into_response())
}

#[axum::debug_handler]
pub async fn delete_media(
    State(state): State<AppState>,
    Extension(identity): Extension<CallerIdentity>,
    Path(secure_id): Path<String>,
) -> crate::error::Result<Response> {
    let user = identity.require()?;
    let media = state.media_service.get_by_secure_id(&secure_id).await?;

    state
        .media_service
        .delete(&media, user, &state.storage)
        .await?;

    let _ = state
        .audit_service
        .log(
            Some(user.id),
            "delete_media",
            "media_object",
            media.id,
            Some(json!({"secure_id": media.secure_id, "storage_key": media.storage_key})),
        )
        .await;

    Ok(Json(crate::dto::media_dto::DeleteMediaResponse { success: true }).into_response())
}
