use super::cookies::*;
use super::error::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::server::CookiePolicy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::http::header::SET_COOKIE;
use warp::reply::Response;
use warp::{Reply, reject};

#[derive(Debug, Deserialize)]
pub struct ExchangeRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: AccessToken,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: UserId,
    pub message: String,
}

fn with_cookie(reply: impl Reply, set_cookie: String) -> Response {
    warp::reply::with_header(reply, SET_COOKIE, set_cookie).into_response()
}

fn issued(session: IssuedSession, policy: &CookiePolicy) -> Response {
    let cookie = refresh_cookie(session.refresh.token.as_str(), policy);
    let body = TokenResponse {
        access_token: session.access_token,
    };
    with_cookie(warp::reply::json(&body), cookie)
}

fn refresh_token_from(cookie: Option<String>) -> Option<RefreshTokenValue> {
    cookie
        .filter(|value| !value.is_empty())
        .map(RefreshTokenValue)
}

pub async fn exchange(
    body: ExchangeRequest,
    session_service: Arc<dyn SessionService>,
    policy: Arc<CookiePolicy>,
) -> Result<Response, warp::Rejection> {
    if body.id_token.is_empty() {
        return Err(reject::custom(ApiErrorCode::InvalidRequest));
    }

    let session = session_service
        .exchange(&body.id_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(issued(session, &policy))
}

pub async fn refresh(
    cookie: Option<String>,
    session_service: Arc<dyn SessionService>,
    policy: Arc<CookiePolicy>,
) -> Result<Response, warp::Rejection> {
    let token = refresh_token_from(cookie).ok_or(reject::custom(ApiErrorCode::InvalidRequest))?;

    match session_service.refresh(&token).await {
        Ok(session) => Ok(issued(session, &policy)),
        // the presented token is dead either way, so drop it client-side too
        Err(e @ (SessionError::Unauthorized(_) | SessionError::RotationAborted(_))) => Ok(
            with_cookie(ApiErrorCode::from(e).into_response(), clear_refresh_cookie(&policy)),
        ),
        Err(e) => Err(reject::custom(ApiErrorCode::from(e))),
    }
}

pub async fn logout(
    cookie: Option<String>,
    session_service: Arc<dyn SessionService>,
    policy: Arc<CookiePolicy>,
) -> Result<Response, warp::Rejection> {
    if let Some(token) = refresh_token_from(cookie) {
        session_service.logout(&token).await;
    }
    Ok(with_cookie(
        "Logged out successfully",
        clear_refresh_cookie(&policy),
    ))
}

pub async fn profile(user: AuthenticatedUser) -> Result<impl Reply, warp::Rejection> {
    Ok(warp::reply::json(&ProfileResponse {
        user_id: user.user_id,
        message: "Protected profile data".to_string(),
    }))
}
