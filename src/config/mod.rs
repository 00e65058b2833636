use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::net::SocketAddr;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaBackend {
    Local,
    S3,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub http_addr: String,
    pub app_mode: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_connect_timeout_seconds: u64,
    pub db_idle_timeout_seconds: u64,
    pub db_max_lifetime_seconds: u64,
    pub run_migrations: bool,
    pub media_backend: MediaBackend,
    pub media_root: String,
    pub media_url_prefix: String,
    pub s3_endpoint: Option<String>,
    pub s3_region: String,
    pub s3_bucket: Option<String>,
    pub s3_public_url: Option<String>,
    pub admin_token: Option<String>,
    pub paseto_access_key: [u8; 32],
    pub access_ttl_minutes: u64,
    pub upload_max_bytes: usize,
    pub image_max_width: u32,
    pub image_max_height: u32,
    pub thumbnail_max_width: u32,
    pub thumbnail_max_height: u32,
    pub page_size: u32,
    pub thumbnail_scan_interval_seconds: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let http_addr = env_or("HTTP_ADDR", "0.0.0.0:8080");
        let _parsed_http_addr = SocketAddr::from_str(&http_addr)
            .map_err(|err| anyhow!("invalid HTTP_ADDR: {}", err))?;
        let app_mode = env_or("APP_MODE", "api");

        let store_backend = match env_or("STORE_BACKEND", "postgres").as_str() {
            "postgres" => StoreBackend::Postgres,
            "memory" => StoreBackend::Memory,
            other => return Err(anyhow!("invalid STORE_BACKEND: {}", other)),
        };
        let database_url = match store_backend {
            StoreBackend::Postgres => Some(env_or_err("DATABASE_URL")?),
            StoreBackend::Memory => std::env::var("DATABASE_URL").ok(),
        };

        let media_backend = match env_or("MEDIA_BACKEND", "local").as_str() {
            "local" => MediaBackend::Local,
            "s3" => MediaBackend::S3,
            other => return Err(anyhow!("invalid MEDIA_BACKEND: {}", other)),
        };
        let (s3_endpoint, s3_bucket) = match media_backend {
            MediaBackend::S3 => (Some(env_or_err("S3_ENDPOINT")?), Some(env_or_err("S3_BUCKET")?)),
            MediaBackend::Local => (
                std::env::var("S3_ENDPOINT").ok(),
                std::env::var("S3_BUCKET").ok(),
            ),
        };

        Ok(Self {
            http_addr,
            app_mode,
            store_backend,
            database_url,
            db_max_connections: env_or_parse("DB_MAX_CONNECTIONS", "25")?,
            db_connect_timeout_seconds: env_or_parse("DB_CONNECT_TIMEOUT_SECONDS", "5")?,
            db_idle_timeout_seconds: env_or_parse("DB_IDLE_TIMEOUT_SECONDS", "300")?,
            db_max_lifetime_seconds: env_or_parse("DB_MAX_LIFETIME_SECONDS", "1800")?,
            run_migrations: env_or_parse("RUN_MIGRATIONS", "true")?,
            media_backend,
            media_root: env_or("MEDIA_ROOT", "./media"),
            media_url_prefix: env_or("MEDIA_URL_PREFIX", "/media"),
            s3_endpoint,
            s3_region: env_or("S3_REGION", "us-east-1"),
            s3_bucket,
            s3_public_url: std::env::var("S3_PUBLIC_URL").ok(),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            paseto_access_key: env_key_32("PASETO_ACCESS_KEY")?,
            access_ttl_minutes: env_or_parse("ACCESS_TTL_MINUTES", "15")?,
            upload_max_bytes: env_or_parse("UPLOAD_MAX_BYTES", "2097152")?,
            image_max_width: env_or_parse("IMAGE_MAX_WIDTH", "320")?,
            image_max_height: env_or_parse("IMAGE_MAX_HEIGHT", "240")?,
            thumbnail_max_width: env_or_parse("THUMBNAIL_MAX_WIDTH", "160")?,
            thumbnail_max_height: env_or_parse("THUMBNAIL_MAX_HEIGHT", "120")?,
            page_size: env_or_parse("PAGE_SIZE", "20")?,
            thumbnail_scan_interval_seconds: env_or_parse("THUMBNAIL_SCAN_INTERVAL_SECONDS", "300")?,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_or_err(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("missing required env var: {}", key))
}

fn env_or_parse<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    <T as FromStr>::Err: std::fmt::Display,
{
    let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
    value
        .parse::<T>()
        .map_err(|err| anyhow!("invalid {}: {}", key, err))
}

fn env_key_32(key: &str) -> Result<[u8; 32]> {
    let value = env_or_err(key)?;
    let decoded = STANDARD
        .decode(value.as_bytes())
        .map_err(|err| anyhow!("invalid {}: {}", key, err))?;
    if decoded.len() != 32 {
        return Err(anyhow!("invalid {}: expected 32 bytes", key));
    }
    let mut key_bytes = [0u8; 32];
    key_bytes.copy_from_slice(&decoded);
    Ok(key_bytes)
}
