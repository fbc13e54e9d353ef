use crate::application_port::*;
use crate::logger::*;
use serde::Serialize;
use std::convert::Infallible;
use thiserror::Error;
use warp::http::StatusCode;
use warp::{Reply, reject};

pub async fn recover_error(err: warp::Rejection) -> Result<impl Reply, Infallible> {
    let code = if let Some(code) = err.find::<ApiErrorCode>() {
        code.clone()
    } else if err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<reject::UnsupportedMediaType>().is_some()
        || err.find::<reject::LengthRequired>().is_some()
        || err.find::<reject::PayloadTooLarge>().is_some()
    {
        ApiErrorCode::InvalidRequest
    } else if err.is_not_found() {
        ApiErrorCode::NotFound
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        ApiErrorCode::MethodNotAllowed
    } else {
        ApiErrorCode::internal(format!("unhandled rejection: {:?}", err))
    };
    Ok(code.into_response())
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: ApiErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Error, Serialize)]
pub enum ApiErrorCode {
    #[error("Invalid request")]
    InvalidRequest,
    #[error("Invalid identity token")]
    InvalidAssertion,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not found")]
    NotFound,
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Service unavailable")]
    Unavailable,
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
            ApiErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ApiErrorCode::InvalidAssertion | ApiErrorCode::Unauthorized => {
                StatusCode::UNAUTHORIZED
            }
            ApiErrorCode::NotFound => StatusCode::NOT_FOUND,
            ApiErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiErrorCode::Unavailable | ApiErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn into_response(self) -> warp::reply::Response {
        let status = self.status();
        let body = ApiError {
            message: self.to_string(),
            code: self,
        };
        warp::reply::with_status(warp::reply::json(&body), status).into_response()
    }
}

impl reject::Reject for ApiErrorCode {}

impl From<SessionError> for ApiErrorCode {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::InvalidAssertion => ApiErrorCode::InvalidAssertion,
            SessionError::Unauthorized(reason) => {
                // the reason stays server-side
                debug!(%reason, "credential rejected");
                ApiErrorCode::Unauthorized
            }
            SessionError::Unavailable(e) => {
                warn!("Dependency unavailable: {}", e);
                ApiErrorCode::Unavailable
            }
            SessionError::RotationAborted(e) => ApiErrorCode::internal(e),
            SessionError::InternalError(e) => ApiErrorCode::internal(e),
        }
    }
}
