pub mod app;
pub mod config;
pub mod domain;
pub mod http;
pub mod infra;
pub mod jobs;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::app::assets::{AssetManager, ImageLimits};
use crate::config::{AppConfig, MediaBackend, StoreBackend};
use crate::infra::media::{LocalMediaStore, MediaStore};
use crate::infra::{db::Db, memory::MemoryStore, pg_store::PgStore, storage::ObjectStorage, store::LinkStore};

/// Files served straight from disk when the local media backend is used.
#[derive(Clone, Debug)]
pub struct LocalMedia {
    pub url_prefix: String,
    pub root: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LinkStore>,
    pub assets: AssetManager,
    pub local_media: Option<LocalMedia>,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub upload_max_bytes: usize,
    pub page_size: u32,
}

impl AppState {
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let store: Arc<dyn LinkStore> = match config.store_backend {
            StoreBackend::Postgres => {
                let db = Db::connect(config).await?;
                if config.run_migrations {
                    db.migrate().await?;
                }
                Arc::new(PgStore::new(db))
            }
            StoreBackend::Memory => Arc::new(MemoryStore::new()),
        };

        let (media, local_media): (Arc<dyn MediaStore>, Option<LocalMedia>) =
            match config.media_backend {
                MediaBackend::Local => (
                    Arc::new(LocalMediaStore::new(&config.media_root, &config.media_url_prefix)),
                    Some(LocalMedia {
                        url_prefix: config.media_url_prefix.clone(),
                        root: PathBuf::from(&config.media_root),
                    }),
                ),
                MediaBackend::S3 => (Arc::new(ObjectStorage::new(config).await?), None),
            };

        let limits = ImageLimits {
            max_bytes: config.upload_max_bytes,
            max_width: config.image_max_width,
            max_height: config.image_max_height,
            thumbnail_width: config.thumbnail_max_width,
            thumbnail_height: config.thumbnail_max_height,
        };

        Ok(Self {
            store,
            assets: AssetManager::new(media, limits),
            local_media,
            admin_token: config.admin_token.clone(),
            paseto_access_key: config.paseto_access_key,
            access_ttl_minutes: config.access_ttl_minutes,
            upload_max_bytes: config.upload_max_bytes,
            page_size: config.page_size,
        })
    }
}
