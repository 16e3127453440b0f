use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::db;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not_found")]
    NotFound(String),

    #[error("validation")]
    Validation(String),

    #[error("conflict")]
    Conflict(String),

    // auth
    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    DB(db::Error),

    #[error("unexpected")]
    Unexpected(String),
}

impl From<db::Error> for Error {
    fn from(error: db::Error) -> Self {
        match error {
            db::Error::NotFound(msg) => Self::NotFound(msg),
            db::Error::Conflict(msg) => Self::Conflict(msg),
            error => Self::DB(error),
        }
    }
}

/// crate::Error <--> tokio_rusqlite::Error
/// ```rust
/// impl From<tokio_rusqlite::Error> for Error { }
/// impl From<Error> for tokio_rusqlite::Error { }
/// ```
pub mod db_mappers {
    use super::*;
    use crate::db::tokio_rusqlite;

    impl From<tokio_rusqlite::Error> for Error {
        fn from(error: tokio_rusqlite::Error) -> Self {
            match error {
                tokio_rusqlite::Error::Other(err) => {
                    if err.is::<Error>() {
                        return *err.downcast::<Error>().unwrap();
                    }
                    Error::from(db::Error::from(tokio_rusqlite::Error::Other(err)))
                }
                _ => Error::from(db::Error::from(error)),
            }
        }
    }

    impl From<Error> for tokio_rusqlite::Error {
        fn from(error: Error) -> Self {
            tokio_rusqlite::Error::Other(error.into())
        }
    }
}

// Response

#[derive(Debug, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ErrorResponse {
    Validation { message: String },
    NotFound { message: String },
    Conflict { message: String },
    Unauthorized { message: String },
    Unexpected { message: String },
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        match error {
            Error::Validation(message) => Self::Validation {
                message: message.clone(),
            },
            Error::NotFound(message) => Self::NotFound {
                message: message.clone(),
            },
            Error::Conflict(message) => Self::Conflict {
                message: message.clone(),
            },
            Error::Unauthorized => Self::Unauthorized {
                message: "Unauthorized".into(),
            },
            _ => Self::Unexpected {
                message: "Unexpected error".into(),
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let error = Arc::new(self);

        let mut res = axum::Json(ErrorResponse::from(error.as_ref())).into_response();
        res.extensions_mut().insert(error);

        *res.status_mut() = status;
        res
    }
}

pub async fn on_error(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let error = response.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    if let Some(error) = error {
        tracing::error!("{:?}", error);
    }

    response
}
