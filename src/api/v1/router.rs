use super::cookie::REFRESH_COOKIE;
use super::error::*;
use super::handler;
use crate::application_port::*;
use crate::domain_model::UserId;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, reject};

const MAX_BODY_BYTES: u64 = 16 * 1024;
const AUTHORIZATION: &str = "authorization";

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with_options(server.clone()))
        .and(with_scope(server.clone()))
        .and_then(handler::login);

    let refresh = warp::path!("auth" / "refresh")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .and(warp::header::optional::<String>(AUTHORIZATION))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with(server.auth_service.clone()))
        .and(with_options(server.clone()))
        .and(with_scope(server.clone()))
        .and_then(handler::refresh);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with(server.auth_service.clone()))
        .and(with_options(server.clone()))
        .and(with_scope(server.clone()))
        .and_then(handler::logout);

    let logout_all = warp::path!("auth" / "logout_all")
        .and(warp::post())
        .and(with_verification(server.auth_service.clone()))
        .and(with(server.auth_service.clone()))
        .and(with_options(server.clone()))
        .and(with_scope(server.clone()))
        .and_then(handler::logout_all);

    let list_sessions = warp::path!("auth" / "sessions")
        .and(warp::get())
        .and(with_verification(server.auth_service.clone()))
        .and(warp::cookie::optional::<String>(REFRESH_COOKIE))
        .and(with(server.auth_service.clone()))
        .and(with_scope(server.clone()))
        .and_then(handler::list_sessions);

    let revoke_session = warp::path!("auth" / "sessions" / "revoke")
        .and(warp::post())
        .and(with_verification(server.auth_service.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.auth_service.clone()))
        .and(with_scope(server.clone()))
        .and_then(handler::revoke_session);

    login
        .or(refresh)
        .or(logout)
        .or(logout_all)
        .or(list_sessions)
        .or(revoke_session)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_options(
    server: Arc<Server>,
) -> impl Filter<Extract = (HttpOptions,), Error = Infallible> + Clone {
    warp::any().map(move || server.http_options.clone())
}

/// A fresh deadline for every request.
fn with_scope(
    server: Arc<Server>,
) -> impl Filter<Extract = (CallScope,), Error = Infallible> + Clone {
    warp::any().map(move || server.call_scope())
}

fn with_verification(
    auth_service: Arc<dyn AuthService>,
) -> impl Filter<Extract = (UserId,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(AUTHORIZATION).and_then(
        move |authorization: Option<String>| {
            let auth_service = auth_service.clone();
            async move {
                let token = handler::bearer(authorization.as_deref())
                    .ok_or_else(|| reject::custom(ApiErrorCode::InvalidToken))?;
                let claims = auth_service
                    .verify_access_token(token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                let user_id = claims
                    .user_id()
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok::<UserId, warp::Rejection>(user_id)
            }
        },
    )
}
