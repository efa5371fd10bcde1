use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use crumb_core::{CoreError, StorageError, StoreError};
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    fn status_and_message(self) -> (StatusCode, String) {
        match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => match into_core(err) {
                Ok(core) => AppError::from_core(core).status_and_message(),
                Err(err) => {
                    tracing::error!("Internal Server Error: {:#}", err);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
                }
            },
        }
    }

    fn from_core(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(msg) | CoreError::InvalidOperation(msg) => {
                AppError::ValidationError(msg)
            }
            CoreError::NotFound(msg) => AppError::NotFoundError(msg),
            CoreError::Conflict(msg) => AppError::ConflictError(msg),
            CoreError::Unauthorized(msg) => AppError::AuthenticationError(msg),
            CoreError::Unavailable(msg) => AppError::InternalServerError(msg),
        }
    }
}

/// Recover the domain error behind `?`-converted service and adapter failures.
fn into_core(err: anyhow::Error) -> Result<CoreError, anyhow::Error> {
    let err = match err.downcast::<CoreError>() {
        Ok(core) => return Ok(core),
        Err(err) => err,
    };
    let err = match err.downcast::<StoreError>() {
        Ok(store) => return Ok(store.into()),
        Err(err) => err,
    };
    let err = match err.downcast::<StorageError>() {
        Ok(storage) => return Ok(storage.into()),
        Err(err) => err,
    };
    if err.is::<JsonRejection>() {
        return Ok(CoreError::InvalidInput("invalid request body".to_string()));
    }
    if let Some(rejection) = err.downcast_ref::<QueryRejection>() {
        return Ok(CoreError::InvalidInput(rejection.body_text()));
    }
    Err(err)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = self.status_and_message();

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::Anyhow(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: CoreError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn test_core_errors_map_to_status_codes() {
        assert_eq!(status_of(CoreError::InvalidInput("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::InvalidOperation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(CoreError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_of(CoreError::Conflict("x".into())), StatusCode::CONFLICT);
        assert_eq!(status_of(CoreError::Unauthorized("x".into())), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(CoreError::Unavailable("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_errors_are_recovered() {
        let err = AppError::from(StoreError::UniqueViolation("users_username_key".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_unknown_errors_are_internal() {
        let err = AppError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
