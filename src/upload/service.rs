use crate::auth::random_hex;
use crate::config::UploadConfig;
use crate::db::{NewUpload, Storage, UploadRow};
use crate::error::TollgateError;
use crate::upload::filename::sanitize_filename;
use crate::upload::imaging::{
    ImageLimits, extension, format_for_mime, process_image, sniff_format,
};
use std::path::Path;
use tracing::{info, warn};

/// Validates an uploaded image, writes it and its thumbnail, and records it.
#[derive(Clone)]
pub struct UploadService {
    cfg: UploadConfig,
    storage: Storage,
}

impl UploadService {
    pub fn new(cfg: UploadConfig, storage: Storage) -> Self {
        Self { cfg, storage }
    }

    pub fn max_bytes(&self) -> usize {
        self.cfg.max_bytes
    }

    fn limits(&self) -> ImageLimits {
        ImageLimits {
            max_pixels: self.cfg.max_pixels,
            thumb_max_width: self.cfg.thumb_max_width,
            thumb_max_height: self.cfg.thumb_max_height,
        }
    }

    /// Every check here runs before anything touches the filesystem.
    pub async fn store(
        &self,
        user_id: Option<i64>,
        original_name: Option<&str>,
        declared_mime: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<UploadRow, TollgateError> {
        if bytes.is_empty() {
            return Err(TollgateError::BadRequest("empty upload".to_string()));
        }
        if bytes.len() > self.cfg.max_bytes {
            return Err(TollgateError::PayloadTooLarge {
                limit: self.cfg.max_bytes,
            });
        }

        let declared = declared_mime
            .and_then(format_for_mime)
            .ok_or_else(|| {
                TollgateError::UnsupportedMediaType(
                    declared_mime.unwrap_or("missing content type").to_string(),
                )
            })?;
        let sniffed = sniff_format(&bytes)?;
        if sniffed != declared {
            return Err(TollgateError::UnsupportedMediaType(format!(
                "content is {} but was declared as {}",
                sniffed.to_mime_type(),
                declared.to_mime_type()
            )));
        }

        let original_name = original_name
            .and_then(sanitize_filename)
            .unwrap_or_else(|| format!("upload.{}", extension(sniffed)));

        let limits = self.limits();
        let processed =
            tokio::task::spawn_blocking(move || process_image(&bytes, sniffed, limits))
                .await
                .map_err(|e| TollgateError::UnexpectedError(format!("image task failed: {e}")))??;

        let stem = random_hex(16);
        let stored_name = format!("{stem}.{}", extension(processed.format));
        let thumb_name = format!("{stem}.{}", extension(processed.thumb_format));

        tokio::fs::create_dir_all(&self.cfg.dir).await?;
        tokio::fs::create_dir_all(&self.cfg.thumb_dir).await?;

        let stored_path = self.cfg.dir.join(&stored_name);
        let thumb_path = self.cfg.thumb_dir.join(&thumb_name);
        tokio::fs::write(&stored_path, &processed.original).await?;
        if let Err(e) = tokio::fs::write(&thumb_path, &processed.thumb).await {
            remove_quietly(&stored_path).await;
            return Err(e.into());
        }

        let row = self
            .storage
            .insert_upload(NewUpload {
                user_id,
                original_name,
                stored_name,
                thumb_name,
                mime: processed.format.to_mime_type().to_string(),
                width: processed.width,
                height: processed.height,
                bytes: processed.original.len(),
            })
            .await;

        match row {
            Ok(row) => {
                info!(
                    upload_id = row.id,
                    width = row.width,
                    height = row.height,
                    bytes = row.bytes,
                    "stored image upload"
                );
                Ok(row)
            }
            Err(e) => {
                remove_quietly(&stored_path).await;
                remove_quietly(&thumb_path).await;
                Err(e)
            }
        }
    }

    pub async fn list(&self, user_id: i64) -> Result<Vec<UploadRow>, TollgateError> {
        self.storage.list_uploads(user_id).await
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "failed to clean up partial upload");
    }
}
