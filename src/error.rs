//! Error handler for mihu.

use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

pub type Result<T> = std::result::Result<T, ServerError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("error parsing form data")]
    ParsingForm(BoxError),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("{0}")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(&'static str),

    #[error("{0}")]
    Unauthorized(&'static str),

    #[error("{0}")]
    Forbidden(&'static str),

    #[error("{0}")]
    Precondition(&'static str),

    #[error("invalid code, check your inbox and try again")]
    InvalidCode,

    #[error("code has expired, please request a new one")]
    ExpiredCode,

    #[error("{service} request failed")]
    Dependency {
        service: &'static str,
        source: BoxError,
    },

    #[error("internal server error, {details}")]
    Internal {
        details: String,
        source: Option<BoxError>,
    },
}

impl ServerError {
    /// Wrap a failure coming from an outbound service.
    pub fn dependency(
        service: &'static str,
        err: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ServerError::Dependency {
            service,
            source: Box::new(err),
        }
    }

    /// Reject a request with a single field error.
    pub fn invalid_field(field: &'static str, message: &'static str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, ValidationError::new(field).with_message(message.into()));
        ServerError::Validation(errors)
    }
}

impl From<jsonwebtoken::errors::Error> for ServerError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        ServerError::Internal {
            details: "json web token handling failed".into(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(err: serde_json::Error) -> Self {
        ServerError::Internal {
            details: "serialization failed".into(),
            source: Some(Box::new(err)),
        }
    }
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(
        self,
    ) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue.to_string(),
            })
        })
        .collect()
}

fn is_unique_violation(err: &SQLxError) -> bool {
    err.as_database_error()
        .is_some_and(|err| err.is_unique_violation())
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .title("There were validation errors with your request.")
            .details(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => {
                response.errors(validation_errors)
            },

            ServerError::ParsingForm(err) => response
                .title("Server error during data parsing.")
                .details(&err.to_string()),

            ServerError::Axum(rejection) => response
                .title("Malformed request body.")
                .details(&rejection.body_text())
                .status(rejection.status()),

            ServerError::Sql(err) if is_unique_violation(err) => response
                .title("Resource already exists.")
                .details("This value is already used by another record.")
                .status(StatusCode::CONFLICT),

            ServerError::Sql(SQLxError::RowNotFound) => response
                .title("Resource not found.")
                .details("Requested record does not exist.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "database request failed");

                ResponseError::default()
                    .title("Storage is unavailable.")
                    .status(StatusCode::BAD_GATEWAY)
            },

            ServerError::NotFound(_) => response
                .title("Resource not found.")
                .status(StatusCode::NOT_FOUND),

            ServerError::Conflict(_) => response
                .title("Request conflicts with current state.")
                .status(StatusCode::CONFLICT),

            ServerError::Unauthorized(_) => response
                .title("Unauthorized access.")
                .status(StatusCode::UNAUTHORIZED),

            ServerError::Forbidden(_) => response
                .title("You are not allowed to do this.")
                .status(StatusCode::FORBIDDEN),

            ServerError::Precondition(_) => {
                response.title("Request cannot be processed yet.")
            },

            ServerError::InvalidCode | ServerError::ExpiredCode => {
                response.title("One-time code rejected.")
            },

            ServerError::Dependency { service, source } => {
                tracing::error!(%service, error = %source, "dependency failed");

                ResponseError::default()
                    .title("Upstream service failure.")
                    .details(&self.to_string())
                    .status(StatusCode::BAD_GATEWAY)
            },

            ServerError::Internal { details, source } => {
                tracing::error!(error = ?source, %details, "server returned 500 status");

                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
