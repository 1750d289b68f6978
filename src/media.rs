//! Upload user media to Cloudinary.

use std::io::Write;

use async_trait::async_trait;
use axum::body::Bytes;
use cloudinary::upload::result::UploadResult;
use cloudinary::upload::{Source::Path, Upload as CloudinaryUpload, UploadOptions};
use sha1::{Digest, Sha1};
use tempfile::NamedTempFile;

use crate::config::Media;
use crate::error::{Result, ServerError};
use crate::ports::MediaStore;

/// Maximum accepted upload size: 5 MiB.
pub const MAX_UPLOAD_SIZE: usize = 5 * 1024 * 1024;
const SERVICE: &str = "cloudinary";

/// A file received from a multipart form.
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// Cloudinary answered with an error document.
#[derive(Debug, thiserror::Error)]
#[error("upload rejected: {0}")]
struct Rejected(String);

/// Public ID of a file: SHA-1 of its content, inside `folder` when set.
/// Uploading the same bytes twice lands on the same asset.
fn public_id(bytes: &[u8], folder: Option<&str>) -> String {
    let hash = hex::encode(Sha1::digest(bytes));

    match folder {
        Some(folder) => format!("{}/{hash}", folder.trim_end_matches('/')),
        None => hash,
    }
}

/// Cloudinary image storage.
pub struct Cloudinary {
    upload: CloudinaryUpload,
    folder: Option<String>,
}

impl Cloudinary {
    /// Create a new [`Cloudinary`] client.
    pub fn new(config: &Media) -> Result<Self> {
        let Some(api_secret) = config.api_secret.clone() else {
            return Err(ServerError::Internal {
                details: "missing `CLOUDINARY_API_SECRET` environment variable"
                    .into(),
                source: None,
            });
        };

        Ok(Self {
            upload: CloudinaryUpload::new(
                config.api_key.clone(),
                config.cloud_name.clone(),
                api_secret,
            ),
            folder: config.folder.clone(),
        })
    }
}

#[async_trait]
impl MediaStore for Cloudinary {
    async fn upload(&self, file: Upload) -> Result<String> {
        let options = UploadOptions::new()
            .set_public_id(public_id(&file.bytes, self.folder.as_deref()));

        // the client only reads from a path.
        let mut temp_file = NamedTempFile::new()
            .map_err(|err| ServerError::dependency(SERVICE, err))?;
        temp_file
            .write_all(&file.bytes)
            .map_err(|err| ServerError::dependency(SERVICE, err))?;

        let result = self
            .upload
            .image(Path(temp_file.path().to_path_buf()), &options)
            .await
            .map_err(|err| ServerError::Dependency {
                service: SERVICE,
                source: err.into(),
            })?;

        let url = match result {
            UploadResult::Response(response) => response.secure_url,
            UploadResult::ResponseWithImageMetadata(response) => {
                response.secure_url
            },
            UploadResult::Error(err) => {
                return Err(ServerError::dependency(
                    SERVICE,
                    Rejected(format!("{err:?}")),
                ));
            },
        };

        tracing::debug!(%url, file = %file.file_name, "media uploaded");

        Ok(url)
    }
}

/// Used when no `media` entry is configured, every upload fails.
#[derive(Clone, Copy, Debug, Default)]
pub struct Unconfigured;

#[derive(Debug, thiserror::Error)]
#[error("no media storage configured")]
struct NotConfigured;

#[async_trait]
impl MediaStore for Unconfigured {
    async fn upload(&self, _file: Upload) -> Result<String> {
        Err(ServerError::dependency("media", NotConfigured))
    }
}
