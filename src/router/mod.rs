//! HTTP routes.
pub mod auth;
pub mod comments;
pub mod follows;
pub mod header;
pub mod likes;
pub mod password;
pub mod posts;
pub mod status;
pub mod two_factor;

use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::{Result, ServerError};
use crate::media::Upload;
use crate::user::User;

/// JSON body checked with [`validator`] before reaching the handler.
#[derive(Debug, Clone, Copy, Default)]
pub struct Valid<T>(pub T);

impl<T, S> FromRequest<S> for Valid<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request(req: Request, state: &S) -> Result<Self> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        value.validate()?;
        Ok(Valid(value))
    }
}

/// Success body shared by every route.
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl Envelope<()> {
    /// Envelope without data.
    pub fn text(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
            data: None,
        })
    }
}

impl<T> Envelope<T> {
    pub fn with(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            message: message.into(),
            data: Some(data),
        })
    }
}

/// Parsed multipart form: text fields and at most one file.
#[derive(Debug, Default)]
pub struct Form {
    pub fields: HashMap<String, String>,
    pub file: Option<Upload>,
}

impl Form {
    /// Read every part of `multipart`. The part named `file_field` is kept as
    /// a file, an empty one is ignored.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self> {
        let mut form = Form::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ServerError::ParsingForm(Box::new(err)))?
        {
            let name = field.name().unwrap_or_default().to_owned();

            if name == file_field {
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;

                if !bytes.is_empty() {
                    form.file = Some(Upload {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            } else {
                let value = field
                    .text()
                    .await
                    .map_err(|err| ServerError::ParsingForm(Box::new(err)))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }
}

/// Reject accounts whose primary email is not verified yet.
pub fn ensure_verified(user: &User, message: &'static str) -> Result<()> {
    if user.email_verified {
        Ok(())
    } else {
        Err(ServerError::Precondition(message))
    }
}

/// Require an image upload for `field`.
pub fn image(file: Option<Upload>, field: &'static str) -> Result<Upload> {
    let file = file.ok_or_else(|| {
        ServerError::invalid_field(field, "An image is required.")
    })?;

    match file.content_type.as_deref() {
        Some(content_type) if content_type.starts_with("image/") => Ok(file),
        _ => Err(ServerError::invalid_field(field, "File must be an image.")),
    }
}
