use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

/// Where image files live. Paths are relative, `/`-separated keys such as
/// `images/channels/<uuid>.png`.
#[async_trait]
pub trait MediaStore: Send + Sync {
    async fn put(&self, path: &str, content_type: &str, bytes: Bytes) -> Result<()>;

    async fn get(&self, path: &str) -> Result<Option<Bytes>>;

    async fn exists(&self, path: &str) -> Result<bool>;

    /// `Ok(false)` when there was nothing to delete.
    async fn delete(&self, path: &str) -> Result<bool>;

    fn public_url(&self, path: &str) -> String;
}

#[derive(Clone)]
pub struct LocalMediaStore {
    root: PathBuf,
    url_prefix: String,
}

impl LocalMediaStore {
    pub fn new(root: impl Into<PathBuf>, url_prefix: &str) -> Self {
        Self {
            root: root.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(anyhow!("invalid media path: {}", path));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl MediaStore for LocalMediaStore {
    async fn put(&self, path: &str, _content_type: &str, bytes: Bytes) -> Result<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Bytes>> {
        match tokio::fs::read(self.resolve(path)?).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)?).await?)
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.resolve(path)?).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/{}", self.url_prefix, path)
    }
}
