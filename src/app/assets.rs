use anyhow::{anyhow, Result};
use bytes::Bytes;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::sync::Arc;
use uuid::Uuid;

use crate::app::error::{FieldErrorCode, LinkError, ValidationErrors};
use crate::domain::link::{LinkKind, RevisionPair};
use crate::infra::media::MediaStore;

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageLimits {
    pub max_bytes: usize,
    pub max_width: u32,
    pub max_height: u32,
    pub thumbnail_width: u32,
    pub thumbnail_height: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: 2 * 1024 * 1024,
            max_width: 320,
            max_height: 240,
            thumbnail_width: 160,
            thumbnail_height: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredImage {
    pub path: String,
    pub thumbnail_path: String,
}

struct Encoded {
    image: Vec<u8>,
    thumbnail: Result<Vec<u8>>,
}

/// `images/x/abc.png` -> `images/x/abc_thumbnail.png`
pub fn thumbnail_path(path: &str) -> String {
    let file_start = path.rfind('/').map(|index| index + 1).unwrap_or(0);
    match path[file_start..].rfind('.') {
        Some(dot) => {
            let split = file_start + dot;
            format!("{}_thumbnail{}", &path[..split], &path[split..])
        }
        None => format!("{}_thumbnail", path),
    }
}

pub fn is_thumbnail_path(path: &str) -> bool {
    let stem = path.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(path);
    stem.ends_with("_thumbnail")
}

fn format_for_content_type(content_type: &str) -> Option<(ImageFormat, &'static str)> {
    match content_type {
        "image/jpeg" | "image/jpg" => Some((ImageFormat::Jpeg, "jpg")),
        "image/png" => Some((ImageFormat::Png, "png")),
        "image/webp" => Some((ImageFormat::WebP, "webp")),
        _ => None,
    }
}

fn format_for_path(path: &str) -> Option<(ImageFormat, &'static str)> {
    match path.rsplit_once('.').map(|(_, ext)| ext) {
        Some("jpg") | Some("jpeg") => Some((ImageFormat::Jpeg, "image/jpeg")),
        Some("png") => Some((ImageFormat::Png, "image/png")),
        Some("webp") => Some((ImageFormat::WebP, "image/webp")),
        _ => None,
    }
}

/// Shrinks to fit inside `width` x `height`, keeping the aspect ratio.
/// Smaller images are returned untouched.
fn fit_within(image: DynamicImage, width: u32, height: u32) -> DynamicImage {
    if image.width() <= width && image.height() <= height {
        image
    } else {
        image.resize(width, height, FilterType::Triangle)
    }
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        ImageFormat::WebP => DynamicImage::ImageRgba8(image.to_rgba8()),
        _ => image.clone(),
    };
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, format)
        .map_err(|err| anyhow!("failed to encode image: {}", err))?;
    Ok(buffer.into_inner())
}

fn process(data: Bytes, format: ImageFormat, limits: ImageLimits) -> Result<Encoded, String> {
    let decoded = image::load_from_memory_with_format(&data, format)
        .map_err(|err| err.to_string())?;
    let resized = fit_within(decoded, limits.max_width, limits.max_height);
    let image = encode(&resized, format).map_err(|err| err.to_string())?;
    let thumbnail = encode(
        &fit_within(resized, limits.thumbnail_width, limits.thumbnail_height),
        format,
    );
    Ok(Encoded { image, thumbnail })
}

/// Owns image files for link records: validates and stores uploads, and
/// removes files once no record points at them.
#[derive(Clone)]
pub struct AssetManager {
    media: Arc<dyn MediaStore>,
    limits: ImageLimits,
}

impl AssetManager {
    pub fn new(media: Arc<dyn MediaStore>, limits: ImageLimits) -> Self {
        Self { media, limits }
    }

    pub fn public_url(&self, path: &str) -> String {
        self.media.public_url(path)
    }

    /// Checks type and size without decoding.
    pub fn check_upload(&self, upload: &ImageUpload) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if format_for_content_type(&upload.content_type).is_none() {
            errors.add(
                IMAGE_FIELD,
                FieldErrorCode::UnsupportedImageType,
                "Only JPEG, PNG and WebP images are accepted.",
            );
        }
        if upload.bytes.len() > self.limits.max_bytes {
            errors.add(
                IMAGE_FIELD,
                FieldErrorCode::ImageTooLarge,
                format!("Images may be at most {} bytes.", self.limits.max_bytes),
            );
        }
        if upload.bytes.is_empty() {
            errors.add(IMAGE_FIELD, FieldErrorCode::InvalidImage, "The image is empty.");
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Decodes, downsizes and stores the upload, then derives its thumbnail.
    /// Nothing is written when the original cannot be stored; a missing
    /// thumbnail is left for the repair worker.
    pub async fn attach_image(
        &self,
        kind: LinkKind,
        upload: &ImageUpload,
    ) -> Result<StoredImage, LinkError> {
        self.check_upload(upload).map_err(LinkError::Validation)?;
        let (format, extension) = format_for_content_type(&upload.content_type).ok_or_else(|| {
            LinkError::field(
                IMAGE_FIELD,
                FieldErrorCode::UnsupportedImageType,
                "Only JPEG, PNG and WebP images are accepted.",
            )
        })?;

        let data = upload.bytes.clone();
        let limits = self.limits;
        let encoded = tokio::task::spawn_blocking(move || process(data, format, limits))
            .await
            .map_err(|err| LinkError::Internal(anyhow!("image task failed: {}", err)))?
            .map_err(|reason| {
                tracing::debug!(reason = %reason, "rejected image upload");
                LinkError::field(
                    IMAGE_FIELD,
                    FieldErrorCode::InvalidImage,
                    "Upload a valid image.",
                )
            })?;

        let path = format!("images/{}/{}.{}", kind.table(), Uuid::new_v4(), extension);
        let thumbnail = thumbnail_path(&path);

        self.media
            .put(&path, &upload.content_type, Bytes::from(encoded.image))
            .await
            .map_err(LinkError::Asset)?;

        let thumbnail_written = match encoded.thumbnail {
            Ok(bytes) => self
                .media
                .put(&thumbnail, &upload.content_type, Bytes::from(bytes))
                .await,
            Err(err) => Err(err),
        };
        if let Err(err) = thumbnail_written {
            tracing::warn!(error = ?err, path = %path, "failed to write thumbnail");
        }

        Ok(StoredImage {
            path,
            thumbnail_path: thumbnail,
        })
    }

    /// Recreates the thumbnail of `path` from the stored original. Returns
    /// false when the thumbnail already exists or the original is gone.
    pub async fn regenerate_thumbnail(&self, path: &str) -> Result<bool> {
        let thumbnail = thumbnail_path(path);
        if self.media.exists(&thumbnail).await? {
            return Ok(false);
        }
        let (format, content_type) =
            format_for_path(path).ok_or_else(|| anyhow!("unknown image extension: {}", path))?;
        let Some(data) = self.media.get(path).await? else {
            return Ok(false);
        };

        let limits = self.limits;
        let bytes = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let decoded = image::load_from_memory_with_format(&data, format)?;
            encode(
                &fit_within(decoded, limits.thumbnail_width, limits.thumbnail_height),
                format,
            )
        })
        .await??;

        self.media
            .put(&thumbnail, content_type, Bytes::from(bytes))
            .await?;
        Ok(true)
    }

    /// Deletes each distinct image and its thumbnail. Missing files are
    /// expected and only logged.
    pub async fn remove_files<I>(&self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        let distinct: BTreeSet<String> = paths.into_iter().filter(|p| !p.is_empty()).collect();
        for path in distinct {
            let thumbnail = thumbnail_path(&path);
            for target in [path.as_str(), thumbnail.as_str()] {
                match self.media.delete(target).await {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!(path = %target, "image already gone"),
                    Err(err) => tracing::warn!(error = ?err, path = %target, "failed to delete image"),
                }
            }
        }
    }

    /// Removes every file of a root/child pair.
    pub async fn remove_assets(&self, pair: &RevisionPair) {
        let mut paths = vec![pair.root.image_path.clone()];
        if let Some(child) = &pair.child {
            paths.push(child.image_path.clone());
        }
        self.remove_files(paths).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::media::LocalMediaStore;
    use image::{Rgb, RgbImage};

    fn png(width: u32, height: u32) -> Bytes {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([10, 120, 200])));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    fn manager(root: &std::path::Path) -> (AssetManager, Arc<LocalMediaStore>) {
        let media = Arc::new(LocalMediaStore::new(root, "/media"));
        (AssetManager::new(media.clone(), ImageLimits::default()), media)
    }

    #[test]
    fn thumbnail_paths() {
        assert_eq!(
            thumbnail_path("images/websites/abc.png"),
            "images/websites/abc_thumbnail.png"
        );
        assert_eq!(thumbnail_path("images/a.b/abc"), "images/a.b/abc_thumbnail");
        assert!(is_thumbnail_path("images/websites/abc_thumbnail.png"));
        assert!(!is_thumbnail_path("images/websites/abc.png"));
    }

    #[tokio::test]
    async fn stores_downscaled_image_and_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let (assets, media) = manager(dir.path());
        let upload = ImageUpload {
            bytes: png(640, 480),
            content_type: "image/png".into(),
        };

        let stored = assets.attach_image(LinkKind::Channel, &upload).await.unwrap();
        assert!(stored.path.starts_with("images/channels/"));
        assert!(stored.path.ends_with(".png"));

        let original = media.get(&stored.path).await.unwrap().unwrap();
        let original = image::load_from_memory(&original).unwrap();
        assert_eq!((original.width(), original.height()), (320, 240));

        let thumbnail = media.get(&stored.thumbnail_path).await.unwrap().unwrap();
        let thumbnail = image::load_from_memory(&thumbnail).unwrap();
        assert_eq!((thumbnail.width(), thumbnail.height()), (160, 120));
    }

    #[tokio::test]
    async fn small_images_are_not_upscaled() {
        let dir = tempfile::tempdir().unwrap();
        let (assets, media) = manager(dir.path());
        let upload = ImageUpload {
            bytes: png(40, 30),
            content_type: "image/png".into(),
        };
        let stored = assets.attach_image(LinkKind::Website, &upload).await.unwrap();
        let original = image::load_from_memory(&media.get(&stored.path).await.unwrap().unwrap()).unwrap();
        assert_eq!((original.width(), original.height()), (40, 30));
    }

    #[tokio::test]
    async fn rejects_bad_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let (assets, _) = manager(dir.path());

        let gif = ImageUpload {
            bytes: Bytes::from_static(b"GIF89a"),
            content_type: "image/gif".into(),
        };
        let err = assets.attach_image(LinkKind::Website, &gif).await.unwrap_err();
        assert!(err
            .validation_errors()
            .unwrap()
            .has("image", FieldErrorCode::UnsupportedImageType));

        let garbage = ImageUpload {
            bytes: Bytes::from_static(b"definitely not a png"),
            content_type: "image/png".into(),
        };
        let err = assets.attach_image(LinkKind::Website, &garbage).await.unwrap_err();
        assert!(err
            .validation_errors()
            .unwrap()
            .has("image", FieldErrorCode::InvalidImage));
    }

    #[tokio::test]
    async fn rejects_oversized_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let media = Arc::new(LocalMediaStore::new(dir.path(), "/media"));
        let assets = AssetManager::new(
            media,
            ImageLimits {
                max_bytes: 16,
                ..ImageLimits::default()
            },
        );
        let upload = ImageUpload {
            bytes: png(10, 10),
            content_type: "image/png".into(),
        };
        let err = assets.attach_image(LinkKind::Website, &upload).await.unwrap_err();
        assert!(err
            .validation_errors()
            .unwrap()
            .has("image", FieldErrorCode::ImageTooLarge));
    }

    #[tokio::test]
    async fn regenerates_missing_thumbnail() {
        let dir = tempfile::tempdir().unwrap();
        let (assets, media) = manager(dir.path());
        let upload = ImageUpload {
            bytes: png(320, 240),
            content_type: "image/png".into(),
        };
        let stored = assets.attach_image(LinkKind::Instagram, &upload).await.unwrap();

        assert!(!assets.regenerate_thumbnail(&stored.path).await.unwrap());
        media.delete(&stored.thumbnail_path).await.unwrap();
        assert!(assets.regenerate_thumbnail(&stored.path).await.unwrap());
        assert!(media.exists(&stored.thumbnail_path).await.unwrap());
    }

    #[tokio::test]
    async fn removal_tolerates_shared_and_missing_paths() {
        let dir = tempfile::tempdir().unwrap();
        let (assets, media) = manager(dir.path());
        let upload = ImageUpload {
            bytes: png(20, 20),
            content_type: "image/png".into(),
        };
        let stored = assets.attach_image(LinkKind::Group, &upload).await.unwrap();

        assets
            .remove_files(vec![
                stored.path.clone(),
                stored.path.clone(),
                "images/groups/missing.png".to_string(),
            ])
            .await;
        assert!(!media.exists(&stored.path).await.unwrap());
        assert!(!media.exists(&stored.thumbnail_path).await.unwrap());
    }
}
