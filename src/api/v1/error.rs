use crate::api::v1::handler::ApiResponse;
use crate::application_port::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use warp::http::StatusCode;
use warp::{Rejection, reject};

pub async fn recover_error(err: Rejection) -> Result<impl warp::Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::PayloadTooLarge>().is_some()
        || err.find::<warp::reject::LengthRequired>().is_some()
        || err.find::<warp::reject::UnsupportedMediaType>().is_some()
    {
        ApiErrorCode::BadRequest
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else {
        error!("Unhandled rejection: {:?}", err);
        ApiErrorCode::InternalError
    };

    let status = code.status();
    let json = warp::reply::json(&ApiResponse::<()>::err(code.clone(), code.to_string()));
    Ok(warp::reply::with_status(json, status))
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Token is not valid")]
    InvalidToken,
    #[error("Access token has expired")]
    TokenExpired,
    #[error("Session not found")]
    SessionNotFound,
    #[error("Malformed request")]
    BadRequest,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Service temporarily unavailable")]
    ServiceUnavailable,
    #[error("Internal error")]
    InternalError,
}

impl ApiErrorCode {
    pub fn internal<E: std::fmt::Display>(error: E) -> ApiErrorCode {
        warn!("Internal error: {}", error);
        ApiErrorCode::InternalError
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiErrorCode::InvalidCredentials
            | ApiErrorCode::InvalidToken
            | ApiErrorCode::TokenExpired => StatusCode::UNAUTHORIZED,
            ApiErrorCode::SessionNotFound | ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Login and refresh never tell the client which check failed.
    pub fn from_session_error(error: AuthError) -> ApiErrorCode {
        match ApiErrorCode::from(error) {
            ApiErrorCode::TokenExpired => ApiErrorCode::InvalidToken,
            other => other,
        }
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<AuthError> for ApiErrorCode {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::InvalidCredentials => ApiErrorCode::InvalidCredentials,
            AuthError::TokenInvalid | AuthError::TokenReused => ApiErrorCode::InvalidToken,
            AuthError::TokenExpired => ApiErrorCode::TokenExpired,
            AuthError::StoreUnavailable(e) => {
                warn!("Token store unavailable: {}", e);
                ApiErrorCode::ServiceUnavailable
            }
            AuthError::KeyLoad(e) => ApiErrorCode::internal(e),
            AuthError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}
