use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Shared error type used across all cache-server crates.
///
/// Variants correspond 1:1 to the error kinds named in the design: `NotFound`,
/// `AlreadyExists`, `InUse`, `Unauthorized`, `BadRequest`, `IOFailure`,
/// `DBFailure`.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("in use: {0}")]
    InUse(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("DB: {0}")]
    Db(String),

    #[error("config: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps error kinds to HTTP status codes per the management/substituter
/// endpoints' propagation policy: NotFound/BadRequest -> 400, Unauthorized ->
/// 401, IO/DB failures -> 500.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::BAD_REQUEST,
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::AlreadyExists(_) | Error::InUse(_) => StatusCode::BAD_REQUEST,
            Error::Io(_) | Error::Db(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
