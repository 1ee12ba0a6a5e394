use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    types::Credential,
};

/// Reads and writes the persisted credential file.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TokenStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<Credential> {
        match async_fs::metadata(&self.path).await {
            Ok(meta) if meta.is_dir() => {
                return Err(Error::TokenPathIsDirectory(self.path.clone()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::TokenNotFound(self.path.clone()));
            }
            Err(e) => return Err(Error::Io(e)),
        }

        let content = async_fs::read_to_string(&self.path).await?;
        serde_json::from_str(&content).map_err(|e| Error::TokenParse {
            path: self.path.clone(),
            source: e,
        })
    }

    /// Replaces the file content with `credential`, readable by the owner only.
    pub async fn save(&self, credential: &Credential) -> Result<()> {
        if let Ok(meta) = async_fs::metadata(&self.path).await {
            if meta.is_dir() {
                return Err(Error::TokenPathIsDirectory(self.path.clone()));
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            async_fs::create_dir_all(parent).await?;
        }

        let json = serde_json::to_string_pretty(credential)?;

        #[cfg(unix)]
        {
            use async_fs::unix::OpenOptionsExt;
            use std::os::unix::fs::PermissionsExt;

            // create with 0600 so the secret is never world-readable, then
            // tighten files that already existed with a wider mode
            async_fs::OpenOptions::new()
                .write(true)
                .create(true)
                .mode(0o600)
                .open(&self.path)
                .await?;
            async_fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        async_fs::write(&self.path, json).await?;
        Ok(())
    }

    /// Saves only when `credential` differs in access token or expiry from
    /// what is on disk. Returns whether a write happened.
    pub async fn save_if_changed(&self, credential: &Credential) -> Result<bool> {
        let unchanged = match self.load().await {
            Ok(current) => current.same_material(credential),
            Err(_) => false,
        };

        if unchanged {
            return Ok(false);
        }

        self.save(credential).await?;
        Ok(true)
    }
}
