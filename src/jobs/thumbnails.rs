use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::app::assets::{is_thumbnail_path, AssetManager};
use crate::infra::store::LinkStore;

const ERROR_BACKOFF_MS: u64 = 5000;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub scanned: usize,
    pub regenerated: usize,
    pub failed: usize,
}

/// Periodically recreates thumbnails whose write failed at upload time.
pub async fn run(store: Arc<dyn LinkStore>, assets: AssetManager, interval: Duration) -> Result<()> {
    info!(interval_seconds = interval.as_secs(), "thumbnail repair worker started");
    loop {
        match scan_once(store.as_ref(), &assets).await {
            Ok(outcome) => {
                if outcome.regenerated > 0 || outcome.failed > 0 {
                    info!(
                        scanned = outcome.scanned,
                        regenerated = outcome.regenerated,
                        failed = outcome.failed,
                        "thumbnail scan finished"
                    );
                }
                tokio::time::sleep(interval).await;
            }
            Err(err) => {
                warn!(error = ?err, "thumbnail scan failed, backing off");
                tokio::time::sleep(Duration::from_millis(ERROR_BACKOFF_MS)).await;
            }
        }
    }
}

pub async fn scan_once(store: &dyn LinkStore, assets: &AssetManager) -> Result<ScanOutcome> {
    let mut outcome = ScanOutcome::default();
    for path in store.list_image_paths().await? {
        if is_thumbnail_path(&path) {
            continue;
        }
        outcome.scanned += 1;
        match assets.regenerate_thumbnail(&path).await {
            Ok(true) => outcome.regenerated += 1,
            Ok(false) => {}
            Err(err) => {
                error!(error = ?err, path = %path, "failed to regenerate thumbnail");
                outcome.failed += 1;
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::assets::{thumbnail_path, ImageLimits, ImageUpload};
    use crate::app::links::{LinkInput, LinkService};
    use crate::domain::link::{Application, LinkKind};
    use crate::domain::requester::Requester;
    use crate::infra::media::{LocalMediaStore, MediaStore};
    use crate::infra::memory::MemoryStore;
    use bytes::Bytes;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;
    use uuid::Uuid;

    fn png() -> Bytes {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([200, 40, 40])));
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, ImageFormat::Png).unwrap();
        Bytes::from(buffer.into_inner())
    }

    #[tokio::test]
    async fn missing_thumbnails_are_regenerated_once() {
        let dir = tempfile::tempdir().unwrap();
        let media = Arc::new(LocalMediaStore::new(dir.path(), "/media"));
        let store: Arc<dyn LinkStore> = Arc::new(MemoryStore::new());
        let assets = AssetManager::new(media.clone(), ImageLimits::default());

        let link = LinkService::new(store.clone(), assets.clone())
            .create_link(
                LinkKind::Channel,
                &Requester::author(Uuid::new_v4()),
                LinkInput {
                    title: Some("Repair".into()),
                    application: Some(Application::Telegram),
                    channel_id: Some("repairchannel".into()),
                    image: Some(ImageUpload {
                        bytes: png(),
                        content_type: "image/png".into(),
                    }),
                    ..LinkInput::default()
                },
            )
            .await
            .unwrap();

        let thumbnail = thumbnail_path(&link.image_path);
        assert!(media.delete(&thumbnail).await.unwrap());

        let outcome = scan_once(store.as_ref(), &assets).await.unwrap();
        assert_eq!(
            outcome,
            ScanOutcome {
                scanned: 1,
                regenerated: 1,
                failed: 0
            }
        );
        assert!(media.exists(&thumbnail).await.unwrap());

        let outcome = scan_once(store.as_ref(), &assets).await.unwrap();
        assert_eq!(outcome.regenerated, 0);
    }
}
