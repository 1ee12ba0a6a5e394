use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tabled::Tabled;

use crate::config;

/// How long before its expiry a credential is already treated as expired.
pub const EXPIRY_LEEWAY_SECS: i64 = 10;

/// OAuth2 credential as persisted in the token file.
///
/// The legacy shape (no `client_id`/`client_secret`) and the enhanced shape
/// share field names, so both decode into this one struct; the legacy shape
/// simply leaves the embedded identity empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(
        default,
        deserialize_with = "deserialize_expiry",
        skip_serializing_if = "Option::is_none"
    )]
    pub expiry: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

// Tokens written by other OAuth2 clients use `0001-01-01T00:00:00Z` for "no expiry".
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry: Option<DateTime<Utc>> = Option::deserialize(deserializer)?;
    Ok(expiry.filter(|e| e.year() > 1))
}

impl Credential {
    pub fn new(
        access_token: String,
        token_type: String,
        refresh_token: String,
        expiry: Option<DateTime<Utc>>,
    ) -> Self {
        Credential {
            access_token,
            token_type,
            refresh_token,
            expiry,
            client_id: None,
            client_secret: None,
        }
    }

    /// A credential is valid while it has an access token and is not within
    /// [`EXPIRY_LEEWAY_SECS`] of its expiry. No expiry means it never expires.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.access_token.is_empty() {
            return false;
        }

        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_LEEWAY_SECS) < expiry,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// The embedded client id and secret, when both are present and non-empty.
    pub fn embedded_identity(&self) -> Option<(&str, &str)> {
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some((id, secret)),
            _ => None,
        }
    }

    /// Refreshable without an external client secret document.
    pub fn is_self_sufficient(&self) -> bool {
        self.embedded_identity().is_some()
    }

    pub fn with_identity(mut self, identity: &ClientIdentity) -> Self {
        self.client_id = Some(identity.client_id.clone());
        self.client_secret = Some(identity.client_secret.clone());
        self
    }

    /// Same access token and the exact same expiry instant.
    pub fn same_material(&self, other: &Credential) -> bool {
        self.access_token == other.access_token && self.expiry == other.expiry
    }
}

/// OAuth2 client registration used to authorize and refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientIdentity {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl ClientIdentity {
    /// Identity with the configured default endpoints, used for credentials
    /// that carry their own client id and secret.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        ClientIdentity {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            auth_uri: config::oauth_auth_url(),
            token_uri: config::oauth_token_url(),
            redirect_uri: config::DEFAULT_REDIRECT_URI.to_string(),
            scopes: config::oauth_scopes(),
        }
    }

    pub fn from_credential(credential: &Credential) -> Option<Self> {
        credential
            .embedded_identity()
            .map(|(id, secret)| ClientIdentity::new(id, secret))
    }
}

/// Google's downloadable `client_secret.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecretFile {
    pub installed: Option<ClientSecretEntry>,
    pub web: Option<ClientSecretEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecretEntry {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub auth_uri: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

/// One interactive authorization attempt.
#[derive(Debug, Clone)]
pub struct AuthorizationSession {
    pub state: String,
    pub code_verifier: String,
    pub redirect_uri: String,
    pub auth_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFolder {
    pub id: String,
    pub name: String,
}

impl DriveFolder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        DriveFolder {
            id: id.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListResponse {
    #[serde(default)]
    pub files: Vec<DriveFolder>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreatedFile {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub size: Option<String>,
}

impl UploadedFile {
    pub fn size_bytes(&self) -> u64 {
        self.size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

/// A child folder whose name parsed as a date under the retention pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatedFolder {
    pub folder: DriveFolder,
    pub date: NaiveDate,
}

/// One parent's direct children, split by whether their name is a date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionGroup {
    pub dated: Vec<DatedFolder>,
    pub other: Vec<DriveFolder>,
}

/// Placement information extracted from a backup filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupMetadata {
    pub service: String,
    pub date: String,
}

#[derive(Tabled)]
pub struct DeletedFolderRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Moved to trash")]
    pub path: String,
}
