//! Baseline storage: accepted-reference screenshots keyed by test name and
//! environment signature.
//!
//! Layout on disk is `{root}/{testName}/{envSignature}.png`. `save` only
//! creates; overwriting an existing baseline requires the explicit `accept`
//! operation so drift is always deliberate. Writes go through a per-key
//! async lock and land via temp-file + rename, so concurrent cases never
//! observe a torn file.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::RgbaImage;
use tokio::sync::Mutex;

use crate::env::EnvSignature;
use crate::error::{HarnessError, Result};

#[derive(Debug, Clone)]
pub struct Baseline {
    pub name: String,
    pub env: EnvSignature,
    pub image: RgbaImage,
}

#[derive(Debug)]
pub struct BaselineStore {
    root: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl BaselineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic path for a baseline key.
    pub fn path_for(&self, name: &str, env: &EnvSignature) -> PathBuf {
        self.root.join(sanitize_name(name)).join(format!("{env}.png"))
    }

    pub async fn load(&self, name: &str, env: &EnvSignature) -> Result<Baseline> {
        let path = self.path_for(name, env);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HarnessError::BaselineMissing {
                    name: name.to_string(),
                    env: env.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };
        let image = image::load_from_memory(&bytes)?.to_rgba8();
        Ok(Baseline {
            name: name.to_string(),
            env: env.clone(),
            image,
        })
    }

    /// Records a new baseline. Refuses to replace an existing one; that is
    /// what [`BaselineStore::accept`] is for.
    pub async fn save(&self, name: &str, env: &EnvSignature, image: &RgbaImage) -> Result<PathBuf> {
        let path = self.path_for(name, env);
        let _guard = self.key_lock(name, env).await;
        if tokio::fs::try_exists(&path).await? {
            return Err(HarnessError::internal(format!(
                "Baseline '{}' for '{}' already exists; use accept to replace it",
                name, env
            )));
        }
        self.write_image(&path, image).await?;
        Ok(path)
    }

    /// Explicitly replaces (or creates) a baseline with the given image.
    pub async fn accept(
        &self,
        name: &str,
        env: &EnvSignature,
        image: &RgbaImage,
    ) -> Result<PathBuf> {
        let path = self.path_for(name, env);
        let _guard = self.key_lock(name, env).await;
        self.write_image(&path, image).await?;
        Ok(path)
    }

    async fn key_lock(&self, name: &str, env: &EnvSignature) -> tokio::sync::OwnedMutexGuard<()> {
        let key = format!("{}/{}", sanitize_name(name), env);
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(key).or_default().clone()
        };
        lock.lock_owned().await
    }

    async fn write_image(&self, path: &Path, image: &RgbaImage) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut encoded = Vec::new();
        image.write_to(
            &mut Cursor::new(&mut encoded),
            image::ImageOutputFormat::Png,
        )?;
        // Rename within the same directory keeps the swap atomic.
        let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
        tokio::fs::write(&tmp, &encoded).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}
