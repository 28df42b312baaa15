// Error handling for the HTTP layer
// Maps KeywardError and LockError onto status codes and `{message, name, type}` bodies

use std::fmt::{Display, Formatter};

use actix_web::{HttpResponse, http::StatusCode};
use keyward_common::{ErrorBody, ErrorType, KeywardError};
use keyward_core::LockError;

// Local wrapper so actix-web's ResponseError can be implemented for it
#[derive(Debug)]
pub struct AppError {
    inner: anyhow::Error,
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(value: anyhow::Error) -> Self {
        AppError { inner: value }
    }
}

impl From<KeywardError> for AppError {
    fn from(value: KeywardError) -> Self {
        AppError {
            inner: anyhow::Error::new(value),
        }
    }
}

impl From<LockError> for AppError {
    fn from(value: LockError) -> Self {
        AppError::from(KeywardError::from(value))
    }
}

impl AppError {
    /// Shorthand for a 400 with the given message
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::from(KeywardError::IllegalArgument(message.into()))
    }

    pub fn downcast_ref<E: std::error::Error + Send + Sync + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    fn body(&self) -> ErrorBody {
        match self.downcast_ref::<KeywardError>() {
            Some(e) => ErrorBody::from(e),
            None => ErrorBody::new(self.inner.to_string(), ErrorType::Internal),
        }
    }
}

impl actix_web::error::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.downcast_ref::<KeywardError>()
            .and_then(|e| StatusCode::from_u16(e.status()).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.inner, "Request failed");
        }
        HttpResponse::build(status).json(self.body())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::ResponseError;
    use actix_web::body::to_bytes;

    async fn body_json(err: AppError) -> serde_json::Value {
        let resp = err.error_response();
        let bytes = to_bytes(resp.into_body()).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[actix_web::test]
    async fn test_bad_request_body() {
        let err = AppError::bad_request("key `uid` is required");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);

        let body = body_json(err).await;
        assert_eq!(body["message"], "key `uid` is required");
        assert_eq!(body["name"], "HandleError");
        assert_eq!(body["type"], "BAD_REQUEST");
    }

    #[actix_web::test]
    async fn test_lock_error_mapping() {
        let err = AppError::from(LockError::Conflict);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(body_json(err).await["type"], "CONFLICT");

        let err = AppError::from(LockError::StoreUnavailable("refused".to_string()));
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body_json(err).await["type"], "STORE_UNAVAILABLE");
    }

    #[actix_web::test]
    async fn test_unknown_error_is_internal() {
        let err = AppError::from(anyhow::anyhow!("boom"));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(err).await["type"], "INTERNAL");
    }
}
