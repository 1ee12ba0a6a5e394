//! Configuration management for the Drive uploader.
//!
//! Run options come from command-line flags and are collected into [`Config`].
//! Endpoint overrides are read from environment variables, optionally loaded
//! from a `.env` file in the local data directory. Token and client secret
//! locations are never discovered implicitly: they are always the explicit
//! flag values.

use std::{
    env,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    types::{ClientIdentity, ClientSecretFile},
    utils::DatePattern,
};

pub const DEFAULT_TOKEN_PATH: &str = ".out/token.json";
pub const DEFAULT_MATCH_PATTERN: &str = "yyyy-MM-dd";
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

const DEFAULT_API_URL: &str = "https://www.googleapis.com/drive/v3";
const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/drive";

/// Everything one run of the tool needs to know.
#[derive(Debug, Clone)]
pub struct Config {
    pub client_secret: Option<PathBuf>,
    pub root_folder_id: Option<String>,
    pub file_name: Option<String>,
    pub folder_name: Option<String>,
    pub token_path: PathBuf,
    pub smart_organize: bool,
    pub workdir: Option<PathBuf>,
    pub delete_on_success: bool,
    pub delete_on_done: bool,

    /// Generate token only, skip upload and cleanup.
    pub token_gen: bool,

    pub cleanup: bool,
    pub keep: usize,
    pub match_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            client_secret: None,
            root_folder_id: None,
            file_name: None,
            folder_name: None,
            token_path: PathBuf::from(DEFAULT_TOKEN_PATH),
            smart_organize: false,
            workdir: None,
            delete_on_success: false,
            delete_on_done: false,
            token_gen: false,
            cleanup: false,
            keep: 1,
            match_pattern: DEFAULT_MATCH_PATTERN.to_string(),
        }
    }
}

impl Config {
    /// Checks flag combinations before any remote work starts.
    pub fn validate(&self, files: &[PathBuf]) -> Result<()> {
        if self.token_gen {
            if self.client_secret.is_none() {
                return Err(Error::Config(
                    "--token-gen requires --client-secret".to_string(),
                ));
            }
            return Ok(());
        }

        if self.root_folder_id.as_deref().is_none_or(str::is_empty) {
            return Err(Error::Config("--root-folder-id is required".to_string()));
        }

        if files.is_empty() && self.workdir.is_none() && !self.cleanup {
            return Err(Error::Config(
                "at least one file or --workdir is required (unless using --cleanup mode)"
                    .to_string(),
            ));
        }

        if self.cleanup {
            if self.keep < 1 {
                return Err(Error::Config("--keep must be at least 1".to_string()));
            }
            if self.match_pattern.is_empty() {
                return Err(Error::Config(
                    "--match pattern is required for cleanup mode".to_string(),
                ));
            }
            DatePattern::new(&self.match_pattern)?;
        }

        Ok(())
    }

    pub fn root_folder_id(&self) -> &str {
        self.root_folder_id.as_deref().unwrap_or_default()
    }
}

/// Loads `.env` from the local data directory when one exists.
pub async fn load_env() -> Result<()> {
    let mut path = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("gdrive-uploader/.env");

    if async_fs::metadata(&path).await.is_ok() {
        dotenv::from_path(&path)
            .map_err(|e| Error::Config(format!("cannot load {}: {}", path.display(), e)))?;
    }

    Ok(())
}

/// Reads Google's `client_secret.json` (either the `installed` or `web` form).
pub async fn load_client_identity(path: &Path) -> Result<ClientIdentity> {
    let content = async_fs::read_to_string(path)
        .await
        .map_err(|e| Error::ClientSecretRead {
            path: path.to_path_buf(),
            source: e,
        })?;

    parse_client_identity(path, &content)
}

pub fn parse_client_identity(path: &Path, content: &str) -> Result<ClientIdentity> {
    let file: ClientSecretFile =
        serde_json::from_str(content).map_err(|e| Error::ClientSecretParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let Some(entry) = file.installed.or(file.web) else {
        return Err(Error::ClientSecretParse {
            path: path.to_path_buf(),
            reason: "missing \"installed\" or \"web\" section".to_string(),
        });
    };

    if entry.client_id.is_empty() || entry.client_secret.is_empty() {
        return Err(Error::ClientSecretParse {
            path: path.to_path_buf(),
            reason: "client_id and client_secret must not be empty".to_string(),
        });
    }

    let mut identity = ClientIdentity::new(entry.client_id, entry.client_secret);
    if let Some(auth_uri) = entry.auth_uri {
        identity.auth_uri = auth_uri;
    }
    if let Some(token_uri) = entry.token_uri {
        identity.token_uri = token_uri;
    }
    if let Some(redirect_uri) = entry.redirect_uris.into_iter().next() {
        identity.redirect_uri = redirect_uri;
    }

    Ok(identity)
}

pub fn drive_api_url() -> String {
    env::var("GDRIVE_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string())
}

pub fn drive_upload_url() -> String {
    env::var("GDRIVE_UPLOAD_URL").unwrap_or_else(|_| DEFAULT_UPLOAD_URL.to_string())
}

pub fn oauth_auth_url() -> String {
    env::var("GDRIVE_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string())
}

pub fn oauth_token_url() -> String {
    env::var("GDRIVE_TOKEN_URL").unwrap_or_else(|_| DEFAULT_TOKEN_URL.to_string())
}

/// Space separated, like the `scope` parameter itself.
pub fn oauth_scopes() -> Vec<String> {
    env::var("GDRIVE_SCOPE")
        .unwrap_or_else(|_| DEFAULT_SCOPE.to_string())
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload_config() -> Config {
        Config {
            root_folder_id: Some("folder123".to_string()),
            client_secret: Some(PathBuf::from("client-secret.json")),
            ..Config::default()
        }
    }

    #[test]
    fn test_validate_upload_config() {
        let files = vec![PathBuf::from("file.txt")];
        assert!(upload_config().validate(&files).is_ok());

        let with_workdir = Config {
            workdir: Some(PathBuf::from("/tmp")),
            ..upload_config()
        };
        assert!(with_workdir.validate(&[]).is_ok());
    }

    #[test]
    fn test_validate_requires_root_folder() {
        let config = Config {
            root_folder_id: None,
            ..upload_config()
        };
        assert!(config.validate(&[PathBuf::from("file.txt")]).is_err());
    }

    #[test]
    fn test_validate_requires_input_files() {
        assert!(upload_config().validate(&[]).is_err());
    }

    #[test]
    fn test_validate_cleanup() {
        let config = Config {
            cleanup: true,
            keep: 5,
            ..upload_config()
        };
        assert!(config.validate(&[]).is_ok());

        let zero_keep = Config { keep: 0, ..config.clone() };
        assert!(zero_keep.validate(&[]).is_err());

        let no_tokens = Config {
            match_pattern: "backup".to_string(),
            ..config
        };
        assert!(matches!(
            no_tokens.validate(&[]),
            Err(Error::InvalidDatePattern(_))
        ));
    }

    #[test]
    fn test_validate_token_gen() {
        let config = Config {
            token_gen: true,
            client_secret: Some(PathBuf::from("client-secret.json")),
            ..Config::default()
        };
        assert!(config.validate(&[]).is_ok());

        let missing_secret = Config {
            client_secret: None,
            ..config
        };
        assert!(missing_secret.validate(&[]).is_err());
    }

    #[test]
    fn test_parse_client_identity_installed() {
        let content = r#"{
            "installed": {
                "client_id": "id.apps.googleusercontent.com",
                "client_secret": "shh",
                "auth_uri": "https://auth.example/auth",
                "token_uri": "https://auth.example/token",
                "redirect_uris": ["http://localhost"]
            }
        }"#;

        let identity = parse_client_identity(Path::new("client.json"), content).unwrap();
        assert_eq!(identity.client_id, "id.apps.googleusercontent.com");
        assert_eq!(identity.client_secret, "shh");
        assert_eq!(identity.token_uri, "https://auth.example/token");
        assert_eq!(identity.redirect_uri, "http://localhost");
    }

    #[test]
    fn test_parse_client_identity_rejects_unknown_shape() {
        let result = parse_client_identity(Path::new("client.json"), r#"{"other": {}}"#);
        assert!(matches!(result, Err(Error::ClientSecretParse { .. })));
    }
}
