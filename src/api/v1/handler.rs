use super::cookie::*;
use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::server::HttpOptions;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::header::SET_COOKIE;
use warp::hyper::body::Bytes;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub tokens: TokenPair,
}

pub async fn login(
    body: LoginRequest,
    auth_service: Arc<dyn AuthService>,
    options: HttpOptions,
    scope: CallScope,
) -> Result<impl warp::Reply, warp::Rejection> {
    let login_input = LoginInput {
        email: body.email,
        password: body.password,
    };
    let login_result = auth_service
        .login(login_input, &scope)
        .await
        .map_err(ApiErrorCode::from_session_error)
        .map_err(reject::custom)?;

    let cookie = refresh_cookie(
        &login_result.tokens.refresh_token,
        options.refresh_ttl,
        options.secure_cookie,
    );
    let login_response = LoginResponse {
        user_id: login_result.user_id,
        tokens: login_result.tokens,
    };

    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(login_response)),
        SET_COOKIE,
        cookie,
    ))
}

/// Body accepted where a refresh token is expected. Browsers send the cookie
/// instead and may leave the body empty.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshTokenBody {
    pub refresh_token: Option<RefreshToken>,
}

fn parse_token_body(body: &Bytes) -> Result<RefreshTokenBody, warp::Rejection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(RefreshTokenBody::default());
    }
    serde_json::from_slice(body).map_err(|_| reject::custom(ApiErrorCode::BadRequest))
}

/// An explicit body token wins over the cookie.
fn presented_token(
    body: &Bytes,
    cookie: Option<String>,
) -> Result<Option<RefreshToken>, warp::Rejection> {
    let body = parse_token_body(body)?;
    Ok(body.refresh_token.or(cookie.map(RefreshToken)))
}

pub fn bearer(authorization: Option<&str>) -> Option<&str> {
    authorization?.strip_prefix("Bearer ").map(str::trim)
}

pub async fn refresh(
    cookie: Option<String>,
    authorization: Option<String>,
    body: Bytes,
    auth_service: Arc<dyn AuthService>,
    options: HttpOptions,
    scope: CallScope,
) -> Result<impl warp::Reply, warp::Rejection> {
    let refresh_token = presented_token(&body, cookie)?
        .ok_or_else(|| reject::custom(ApiErrorCode::InvalidToken))?;

    let refresh_input = RefreshInput {
        refresh_token,
        access_hint: bearer(authorization.as_deref()).map(str::to_string),
    };
    let tokens = auth_service
        .refresh(refresh_input, &scope)
        .await
        .map_err(ApiErrorCode::from_session_error)
        .map_err(reject::custom)?;

    let cookie = refresh_cookie(&tokens.refresh_token, options.refresh_ttl, options.secure_cookie);
    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(tokens)),
        SET_COOKIE,
        cookie,
    ))
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse;

pub async fn logout(
    cookie: Option<String>,
    body: Bytes,
    auth_service: Arc<dyn AuthService>,
    options: HttpOptions,
    scope: CallScope,
) -> Result<impl warp::Reply, warp::Rejection> {
    if let Some(refresh_token) = presented_token(&body, cookie)? {
        auth_service
            .logout(&refresh_token, &scope)
            .await
            .map_err(ApiErrorCode::from)
            .map_err(reject::custom)?;
    }

    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(LogoutResponse)),
        SET_COOKIE,
        cleared_refresh_cookie(options.secure_cookie),
    ))
}

#[derive(Debug, Serialize)]
pub struct LogoutAllResponse {
    pub revoked: usize,
}

pub async fn logout_all(
    user_id: UserId,
    auth_service: Arc<dyn AuthService>,
    options: HttpOptions,
    scope: CallScope,
) -> Result<impl warp::Reply, warp::Rejection> {
    let revoked = auth_service
        .logout_all(user_id, &scope)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::with_header(
        warp::reply::json(&ApiResponse::ok(LogoutAllResponse { revoked })),
        SET_COOKIE,
        cleared_refresh_cookie(options.secure_cookie),
    ))
}

/// A session as shown to its owner. The refresh token itself is never echoed
/// back; sessions are addressed by fingerprint.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    pub current: bool,
}

pub async fn list_sessions(
    user_id: UserId,
    cookie: Option<String>,
    auth_service: Arc<dyn AuthService>,
    scope: CallScope,
) -> Result<impl warp::Reply, warp::Rejection> {
    let current = cookie.map(RefreshToken);
    let sessions = auth_service
        .list_sessions(user_id, &scope)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let views: Vec<SessionView> = sessions
        .into_iter()
        .map(|entry| SessionView {
            id: entry.token.fingerprint(),
            expires_at: entry.expires_at,
            current: current.as_ref() == Some(&entry.token),
        })
        .collect();

    Ok(warp::reply::json(&ApiResponse::ok(views)))
}

#[derive(Debug, Deserialize)]
pub struct RevokeSessionRequest {
    pub id: String,
}

#[derive(Debug, Serialize)]
pub struct RevokeSessionResponse {
    pub revoked: bool,
}

pub async fn revoke_session(
    user_id: UserId,
    body: RevokeSessionRequest,
    auth_service: Arc<dyn AuthService>,
    scope: CallScope,
) -> Result<impl warp::Reply, warp::Rejection> {
    let sessions = auth_service
        .list_sessions(user_id, &scope)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    let entry = sessions
        .into_iter()
        .find(|entry| entry.token.fingerprint() == body.id)
        .ok_or_else(|| reject::custom(ApiErrorCode::SessionNotFound))?;

    let revoked = auth_service
        .revoke_session(user_id, &entry.token, &scope)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(RevokeSessionResponse { revoked })))
}
