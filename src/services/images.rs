//! Photo uploads and thumbnails.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use image::ImageFormat;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult, FieldError};
use crate::models::{Image, ImageAnalysisStatus, InspectionStatus};
use crate::repository::DbContext;
use crate::storage::{image_key, Storage};
use crate::utils::{extension_for, format_size, sniff_image_type};

const THUMBNAIL_SIZE: u32 = 480;

/// How long presigned photo URLs stay valid.
pub const IMAGE_URL_TTL: Duration = Duration::from_secs(60 * 60);

/// One uploaded file as received from the form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    /// Client-declared type; only used to reject obvious non-images early.
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrls {
    pub thumbnail: String,
    pub original: String,
}

#[derive(Clone)]
pub struct ImageService {
    ctx: DbContext,
    storage: Arc<dyn Storage>,
    max_bytes: usize,
}

/// Downscale to a JPEG thumbnail.
fn make_thumbnail(bytes: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(bytes)?;
    let thumb = img.thumbnail(THUMBNAIL_SIZE, THUMBNAIL_SIZE).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    thumb.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

fn invalid_file(message: &str) -> AppError {
    AppError::validation(vec![FieldError::new("file", message)])
}

impl ImageService {
    pub fn new(ctx: DbContext, storage: Arc<dyn Storage>, max_bytes: usize) -> Self {
        Self {
            ctx,
            storage,
            max_bytes,
        }
    }

    pub async fn list(&self, user_id: &str, inspection_id: &str) -> AppResult<Vec<Image>> {
        Ok(self
            .ctx
            .images()
            .list_for_inspection(inspection_id, user_id)
            .await?)
    }

    pub async fn upload(&self, user_id: &str, inspection_id: &str, upload: Upload) -> AppResult<Image> {
        let inspection = self
            .ctx
            .inspections()
            .get(inspection_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Inspection"))?;
        if !inspection.status.can_add_photos() {
            return Err(AppError::invalid(format!(
                "Photos cannot be added while the inspection is {}",
                inspection.status.label().to_lowercase()
            )));
        }

        if upload.bytes.len() > self.max_bytes {
            return Err(AppError::TooLarge(format!(
                "{} is larger than the {} limit",
                upload.filename,
                format_size(self.max_bytes as u64)
            )));
        }
        if upload.bytes.is_empty() {
            return Err(invalid_file("The uploaded file is empty"));
        }
        if let Some(ref declared) = upload.content_type {
            if !declared.is_empty() && !declared.starts_with("image/") && declared != "application/octet-stream" {
                return Err(invalid_file("Upload a JPEG, PNG, GIF or WebP image"));
            }
        }
        let content_type =
            sniff_image_type(&upload.bytes).ok_or_else(|| invalid_file("Upload a JPEG, PNG, GIF or WebP image"))?;

        // A matching header is not enough; the photo must decode.
        let bytes = upload.bytes;
        let (bytes, thumbnail) = tokio::task::spawn_blocking(move || {
            let thumb = make_thumbnail(&bytes);
            (bytes, thumb)
        })
        .await
        .map_err(AppError::internal)?;
        let thumbnail = thumbnail.map_err(|e| {
            debug!("rejecting undecodable upload: {}", e);
            invalid_file("The file is not a readable image")
        })?;

        let id = uuid::Uuid::new_v4().to_string();
        let original_key = image_key(user_id, inspection_id, &id, "original", extension_for(content_type));
        self.storage.put(&original_key, &bytes, content_type).await?;
        let thumbnail_key = image_key(user_id, inspection_id, &id, "thumb", "jpg");
        self.storage.put(&thumbnail_key, &thumbnail, "image/jpeg").await?;
        let size_bytes = bytes.len() as i64;

        let filename = match upload.filename.trim() {
            "" => format!("photo.{}", extension_for(content_type)),
            name => name.chars().take(255).collect(),
        };
        let stamp = Utc::now();
        let image = Image {
            id,
            user_id: user_id.to_string(),
            inspection_id: inspection_id.to_string(),
            original_key,
            thumbnail_key: Some(thumbnail_key),
            filename,
            content_type: content_type.to_string(),
            size_bytes,
            analysis_status: ImageAnalysisStatus::Pending,
            created_at: stamp,
            updated_at: stamp,
        };
        self.ctx.images().create(&image).await?;
        info!(image_id = %image.id, inspection_id, size_bytes, "photo uploaded");
        Ok(image)
    }

    pub async fn get(&self, user_id: &str, id: &str) -> AppResult<Image> {
        self.ctx
            .images()
            .get(id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Image"))
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<Image> {
        let image = self.get(user_id, id).await?;
        let inspection = self
            .ctx
            .inspections()
            .get(&image.inspection_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Inspection"))?;
        if inspection.status == InspectionStatus::Analyzing {
            return Err(AppError::Conflict(
                "Photos cannot be removed while analysis is running".to_string(),
            ));
        }

        self.ctx.images().delete(id, user_id).await?;
        for key in std::iter::once(&image.original_key).chain(image.thumbnail_key.as_ref()) {
            if let Err(e) = self.storage.delete(key).await {
                warn!(key = %key, "failed to delete stored photo: {}", e);
            }
        }
        debug!(image_id = id, "photo deleted");
        Ok(image)
    }

    /// Presigned URLs for showing a photo.
    pub fn urls(&self, image: &Image) -> AppResult<ImageUrls> {
        Ok(ImageUrls {
            thumbnail: self.storage.url(image.display_key(), IMAGE_URL_TTL)?,
            original: self.storage.url(&image.original_key, IMAGE_URL_TTL)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{setup, setup_with};
    use super::*;
    use crate::models::{Inspection, NewInspection};
    use crate::repository::test_support::create_user;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 80, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    async fn draft(env: &super::super::test_support::TestEnv, user_id: &str) -> Inspection {
        env.services
            .inspections
            .create(
                user_id,
                NewInspection {
                    title: "Framing".into(),
                    inspection_date: "2024-06-01".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
    }

    fn upload(bytes: Vec<u8>) -> Upload {
        Upload {
            filename: "deck.png".into(),
            content_type: Some("image/png".into()),
            bytes,
        }
    }

    #[tokio::test]
    async fn test_upload_stores_original_and_thumbnail() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = draft(&env, &user.id).await;

        let image = env
            .services
            .images
            .upload(&user.id, &insp.id, upload(png(1200, 800)))
            .await
            .unwrap();
        assert_eq!(image.content_type, "image/png");
        assert_eq!(image.analysis_status, ImageAnalysisStatus::Pending);
        assert!(image.original_key.ends_with("_original.png"));

        let (thumb, _) = env.storage.get(image.thumbnail_key.as_deref().unwrap()).await.unwrap();
        let decoded = image::load_from_memory(&thumb).unwrap();
        assert!(decoded.width() <= THUMBNAIL_SIZE && decoded.height() <= THUMBNAIL_SIZE);

        let urls = env.services.images.urls(&image).unwrap();
        assert!(urls.thumbnail.starts_with("/files/"));
        assert!(urls.original.contains("sig="));
    }

    #[tokio::test]
    async fn test_upload_rejects_non_images() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = draft(&env, &user.id).await;

        let err = env
            .services
            .images
            .upload(
                &user.id,
                &insp.id,
                Upload {
                    filename: "notes.txt".into(),
                    content_type: Some("text/plain".into()),
                    bytes: b"hello".to_vec(),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");

        // Declared as an image but the bytes are not.
        let err = env
            .services
            .images
            .upload(&user.id, &insp.id, upload(b"GIF? no".to_vec()))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");

        // A valid GIF header over a body that does not decode.
        let mut fake_gif = b"GIF89a\x10\x00\x10\x00".to_vec();
        fake_gif.extend_from_slice(&[0xAB; 64]);
        assert_eq!(sniff_image_type(&fake_gif), Some("image/gif"));
        let err = env
            .services
            .images
            .upload(&user.id, &insp.id, upload(fake_gif))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");
        assert_eq!(err.fields()[0].field, "file");

        assert!(env.services.images.list(&user.id, &insp.id).await.unwrap().is_empty());
        assert!(!env.storage.root().join("users").exists());
    }

    #[tokio::test]
    async fn test_upload_over_limit_is_too_large() {
        let env = setup_with(|s| s.max_upload_bytes = 32).await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = draft(&env, &user.id).await;
        let err = env
            .services
            .images
            .upload(&user.id, &insp.id, upload(png(64, 64)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ETOOLARGE");
    }

    #[tokio::test]
    async fn test_upload_refused_when_status_forbids_photos() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = draft(&env, &user.id).await;
        env.ctx
            .inspections()
            .set_status(&insp.id, &user.id, InspectionStatus::Completed)
            .await
            .unwrap();
        let err = env
            .services
            .images
            .upload(&user.id, &insp.id, upload(png(4, 4)))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");
    }

    #[tokio::test]
    async fn test_delete_removes_objects() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = draft(&env, &user.id).await;
        let image = env
            .services
            .images
            .upload(&user.id, &insp.id, upload(png(16, 16)))
            .await
            .unwrap();

        env.services.images.delete(&user.id, &image.id).await.unwrap();
        assert!(env.storage.get(&image.original_key).await.is_err());
        assert_eq!(
            env.services.images.get(&user.id, &image.id).await.unwrap_err().code(),
            "ENOTFOUND"
        );
    }
}
