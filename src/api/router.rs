use super::error::*;
use super::handler;
use crate::application_port::*;
use crate::domain_model::AuthenticatedUser;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let cookie_policy = Arc::new(server.cookie_policy.clone());

    let exchange = warp::path!("auth" / "exchange")
        .and(warp::post())
        .and(warp::body::content_length_limit(16 * 1024))
        .and(warp::body::json())
        .and(with(server.session_service.clone()))
        .and(with(cookie_policy.clone()))
        .and_then(handler::exchange);

    let refresh = warp::path!("auth" / "refresh")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(super::REFRESH_COOKIE))
        .and(with(server.session_service.clone()))
        .and(with(cookie_policy.clone()))
        .and_then(handler::refresh);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(warp::cookie::optional::<String>(super::REFRESH_COOKIE))
        .and(with(server.session_service.clone()))
        .and(with(cookie_policy))
        .and_then(handler::logout);

    let profile = warp::path!("profile")
        .and(warp::get())
        .and(with_identity(server.credential_signer.clone()))
        .and_then(handler::profile);

    exchange.or(refresh).or(logout).or(profile)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// Bearer-token guard. Every failure, including a missing header, is a uniform 401.
fn with_identity(
    signer: Arc<dyn CredentialSigner>,
) -> impl Filter<Extract = (AuthenticatedUser,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(http::header::AUTHORIZATION.as_str()).and_then(
        move |header: Option<String>| {
            let signer = signer.clone();
            async move {
                let token = header
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| reject::custom(ApiErrorCode::Unauthorized))?;
                let claims = signer
                    .verify(token)
                    .map_err(SessionError::from)
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok::<_, warp::Rejection>(AuthenticatedUser::from(claims))
            }
        },
    )
}
