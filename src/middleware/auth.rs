use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::user::User;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

/// Authenticated caller, resolved once per request and passed to handlers
/// through request extensions.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: Uuid,
    pub role: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin")
    }

    pub fn is_instructor(&self) -> bool {
        self.role.eq_ignore_ascii_case("instructor")
    }
}

/// `None` means the request is anonymous. Routes that require a caller
/// convert that to 401 themselves; the media gate treats anonymous as a
/// legal tier.
#[derive(Debug, Clone, Default)]
pub struct CallerIdentity(pub Option<AuthUser>);

impl CallerIdentity {
    pub fn require(&self) -> crate::error::Result<&AuthUser> {
        self.0
            .as_ref()
            .ok_or_else(|| crate::error::Error::Unauthorized("authentication_required".to_string()))
    }
}

/// Resolve the caller identity for the request. A missing Authorization
/// header yields an anonymous identity; a present-but-invalid token is a
/// hard 401 rather than a silent downgrade to anonymous.
pub async fn resolve_identity(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(auth_header) = req.headers().get(axum::http::header::AUTHORIZATION) else {
        req.extensions_mut().insert(CallerIdentity(None));
        return next.run(req).await;
    };
    let Ok(auth_str) = auth_header.to_str() else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"bad_authorization"})),
        )
            .into_response();
    };
    let Some(token) = auth_str.strip_prefix("Bearer ") else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"unsupported_scheme"})),
        )
            .into_response();
    };

    let config = crate::config::get_config();
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let claims = match decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &validation,
    ) {
        Ok(data) => data.claims,
        Err(_) => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error":"invalid_token"})),
            )
                .into_response()
        }
    };

    let Ok(user_id) = Uuid::parse_str(&claims.sub) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"invalid_token"})),
        )
            .into_response();
    };

    // The role claim is advisory only; the user row is authoritative.
    let user: Option<User> = match sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await
    {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = ?e, "identity lookup failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error":"identity_lookup_failed"})),
            )
                .into_response();
        }
    };

    let Some(user) = user else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"error":"unknown_account"})),
        )
            .into_response();
    };
    if !user.is_active {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error":"account_inactive"})),
        )
            .into_response();
    }

    req.extensions_mut().insert(CallerIdentity(Some(AuthUser {
        id: user.id,
        role: user.role,
    })));
    next.run(req).await
}
