use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use gdrive_uploader::error::{Error, Result};
use gdrive_uploader::management::{
    AuthManager, Authorizer, BrowserLauncher, CodePrompt, TokenEndpoint, TokenSource, TokenState,
    TokenStore,
};
use gdrive_uploader::types::{AuthorizationSession, ClientIdentity, Credential};
use reqwest::Url;
use tempfile::TempDir;
use tokio::net::TcpListener;

const CLIENT_SECRET: &str = r#"{
  "installed": {
    "client_id": "doc-id.apps.googleusercontent.com",
    "client_secret": "doc-secret",
    "redirect_uris": ["http://localhost"]
  }
}"#;

#[derive(Default)]
struct FakeEndpoint {
    refresh_fails: bool,
    // issued credentials are already expired, forcing another refresh
    issue_expired: bool,
    exchanges: Mutex<Vec<(String, String)>>,
    refreshes: AtomicUsize,
}

impl FakeEndpoint {
    fn exchanges(&self) -> Vec<(String, String)> {
        self.exchanges.lock().unwrap().clone()
    }

    fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenEndpoint for FakeEndpoint {
    async fn exchange_code(
        &self,
        _identity: &ClientIdentity,
        session: &AuthorizationSession,
        code: &str,
    ) -> Result<Credential> {
        self.exchanges
            .lock()
            .unwrap()
            .push((code.to_string(), session.redirect_uri.clone()));

        let expiry = if self.issue_expired {
            Utc::now() - chrono::Duration::minutes(1)
        } else {
            Utc::now() + chrono::Duration::hours(1)
        };
        Ok(Credential::new(
            format!("access-{}", code),
            "Bearer".to_string(),
            "refresh-new".to_string(),
            Some(expiry),
        ))
    }

    async fn refresh(
        &self,
        _identity: &ClientIdentity,
        credential: &Credential,
    ) -> Result<Credential> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.refresh_fails {
            return Err(Error::RefreshFailed("invalid_grant".to_string()));
        }
        Ok(Credential::new(
            format!("refreshed-{}", n),
            "Bearer".to_string(),
            credential.refresh_token.clone(),
            Some(Utc::now() + chrono::Duration::hours(1)),
        ))
    }
}

#[derive(Default)]
struct FakePrompt {
    calls: AtomicUsize,
}

#[async_trait]
impl CodePrompt for FakePrompt {
    async fn read_code(&self, _auth_url: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok("manual-code".to_string())
    }
}

// Never completes the browser flow
#[derive(Default)]
struct IdleBrowser {
    opened: AtomicUsize,
}

impl BrowserLauncher for IdleBrowser {
    fn open(&self, _url: &str) -> Result<()> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Plays the user's browser: follows the consent URL straight to the redirect
struct RedirectingBrowser;

impl BrowserLauncher for RedirectingBrowser {
    fn open(&self, url: &str) -> Result<()> {
        let url = Url::parse(url).unwrap();
        let param = |key: &str| {
            url.query_pairs()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.into_owned())
                .unwrap()
        };
        let callback = format!(
            "{}?code=browser-code&state={}",
            param("redirect_uri"),
            param("state")
        );

        tokio::spawn(async move {
            reqwest::get(callback).await.unwrap();
        });
        Ok(())
    }
}

fn identity() -> ClientIdentity {
    ClientIdentity::new("doc-id.apps.googleusercontent.com", "doc-secret")
}

fn authorizer(
    endpoint: &Arc<FakeEndpoint>,
    prompt: &Arc<FakePrompt>,
    browser: Arc<dyn BrowserLauncher>,
) -> Authorizer {
    Authorizer::new(endpoint.clone())
        .with_prompt(prompt.clone())
        .with_browser(browser)
        .with_ports(0..=0)
        .with_timeout(Duration::from_millis(200))
}

fn write_client_secret(dir: &Path) -> PathBuf {
    let path = dir.join("client_secret.json");
    std::fs::write(&path, CLIENT_SECRET).unwrap();
    path
}

fn credential(expires_in: chrono::Duration) -> Credential {
    Credential::new(
        "stored-access".to_string(),
        "Bearer".to_string(),
        "stored-refresh".to_string(),
        Some(Utc::now() + expires_in),
    )
}

#[tokio::test]
async fn test_timeout_invokes_manual_fallback_once() {
    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());
    let browser = Arc::new(IdleBrowser::default());

    let credential = authorizer(&endpoint, &prompt, browser.clone())
        .authorize(&identity())
        .await
        .unwrap();

    assert_eq!(credential.access_token, "access-manual-code");
    assert_eq!(browser.opened.load(Ordering::SeqCst), 1);
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        endpoint.exchanges(),
        vec![("manual-code".to_string(), "http://localhost".to_string())]
    );
}

#[tokio::test]
async fn test_port_exhaustion_falls_back_to_manual() {
    let busy = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = busy.local_addr().unwrap().port();

    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());
    let browser = Arc::new(IdleBrowser::default());

    let credential = authorizer(&endpoint, &prompt, browser.clone())
        .with_ports(port..=port)
        .authorize(&identity())
        .await
        .unwrap();

    assert_eq!(credential.access_token, "access-manual-code");
    assert_eq!(browser.opened.load(Ordering::SeqCst), 0);
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_browser_callback_completes_authorization() {
    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());

    let credential = authorizer(&endpoint, &prompt, Arc::new(RedirectingBrowser))
        .with_timeout(Duration::from_secs(10))
        .authorize(&identity())
        .await
        .unwrap();

    assert_eq!(credential.access_token, "access-browser-code");
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);

    let exchanges = endpoint.exchanges();
    assert_eq!(exchanges.len(), 1);
    assert!(exchanges[0].1.starts_with("http://127.0.0.1:"));
    assert!(exchanges[0].1.ends_with("/callback"));
}

#[tokio::test]
async fn test_missing_token_without_client_secret_is_fatal() {
    let dir = TempDir::new().unwrap();
    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());

    let mut manager = AuthManager::new(
        TokenStore::new(dir.path().join("token.json")),
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    );

    let result = manager.authenticate().await;

    assert!(matches!(result, Err(Error::MissingCredentials { .. })));
    assert_eq!(manager.state(), TokenState::Failed);
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_token_authorizes_and_saves_self_sufficient_token() {
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("out/token.json");
    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());

    let mut manager = AuthManager::new(
        TokenStore::new(&token_path),
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    )
    .with_client_secret(Some(write_client_secret(dir.path())));

    let source = manager.authenticate().await.unwrap();
    assert_eq!(manager.state(), TokenState::Ready);
    assert_eq!(source.credential().access_token, "access-manual-code");

    let saved = TokenStore::new(&token_path).load().await.unwrap();
    assert_eq!(saved.access_token, "access-manual-code");
    assert_eq!(
        saved.embedded_identity(),
        Some(("doc-id.apps.googleusercontent.com", "doc-secret"))
    );
}

#[tokio::test]
async fn test_valid_self_sufficient_token_is_used_directly() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    store
        .save(&credential(chrono::Duration::hours(1)).with_identity(&identity()))
        .await
        .unwrap();

    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());
    let mut manager = AuthManager::new(
        store,
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    );

    let mut source = manager.authenticate().await.unwrap();

    assert_eq!(manager.state(), TokenState::Ready);
    assert_eq!(source.access_token().await.unwrap(), "stored-access");
    assert_eq!(
        source.identity().map(|i| i.client_id.as_str()),
        Some("doc-id.apps.googleusercontent.com")
    );
    assert_eq!(endpoint.refreshes(), 0);
    assert!(endpoint.exchanges().is_empty());
}

#[tokio::test]
async fn test_valid_dependent_token_without_identity_is_optimistic() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    store
        .save(&credential(chrono::Duration::hours(1)))
        .await
        .unwrap();

    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());
    let mut manager = AuthManager::new(
        store,
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    );

    let mut source = manager.authenticate().await.unwrap();

    assert_eq!(manager.state(), TokenState::Ready);
    assert!(source.identity().is_none());
    assert_eq!(source.access_token().await.unwrap(), "stored-access");
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted() {
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("token.json");
    let store = TokenStore::new(&token_path);
    store
        .save(&credential(-chrono::Duration::hours(1)).with_identity(&identity()))
        .await
        .unwrap();

    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());
    let mut manager = AuthManager::new(
        store.clone(),
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    );

    let mut source = manager.authenticate().await.unwrap();

    assert_eq!(endpoint.refreshes(), 1);
    assert_eq!(source.access_token().await.unwrap(), "refreshed-1");

    let saved = store.load().await.unwrap();
    assert_eq!(saved.access_token, "refreshed-1");
    assert_eq!(saved.refresh_token, "stored-refresh");
    assert!(saved.is_self_sufficient());
}

#[tokio::test]
async fn test_expired_dependent_token_without_identity_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    store
        .save(&credential(-chrono::Duration::hours(1)))
        .await
        .unwrap();

    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());
    let mut manager = AuthManager::new(
        store,
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    );

    let result = manager.authenticate().await;

    assert!(matches!(result, Err(Error::MissingCredentials { .. })));
    assert_eq!(manager.state(), TokenState::Failed);
    assert_eq!(endpoint.refreshes(), 0);
}

#[tokio::test]
async fn test_refresh_failure_reauthorizes() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));
    store
        .save(&credential(-chrono::Duration::hours(1)).with_identity(&identity()))
        .await
        .unwrap();

    let endpoint = Arc::new(FakeEndpoint {
        refresh_fails: true,
        ..FakeEndpoint::default()
    });
    let prompt = Arc::new(FakePrompt::default());
    let mut manager = AuthManager::new(
        store.clone(),
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    );

    let source = manager.authenticate().await.unwrap();

    assert_eq!(manager.state(), TokenState::Ready);
    assert_eq!(endpoint.refreshes(), 1);
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
    assert_eq!(source.credential().access_token, "access-manual-code");
    assert_eq!(store.load().await.unwrap().access_token, "access-manual-code");
}

#[tokio::test]
async fn test_second_consecutive_refresh_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let store = TokenStore::new(dir.path().join("token.json"));

    let endpoint = Arc::new(FakeEndpoint {
        refresh_fails: true,
        issue_expired: true,
        ..FakeEndpoint::default()
    });
    let prompt = Arc::new(FakePrompt::default());

    let mut source = TokenSource::new(
        credential(-chrono::Duration::hours(1)),
        Some(identity()),
        store,
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    );

    // first failure: re-authorized, but the new credential is already stale
    assert_eq!(source.access_token().await.unwrap(), "access-manual-code");

    let result = source.access_token().await;
    assert!(matches!(result, Err(Error::RefreshFailed(_))));
    assert_eq!(endpoint.refreshes(), 2);
    assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_gen_persists_with_document_identity() {
    let dir = TempDir::new().unwrap();
    let token_path = dir.path().join("token.json");
    let store = TokenStore::new(&token_path);
    store
        .save(&credential(chrono::Duration::hours(1)))
        .await
        .unwrap();

    let endpoint = Arc::new(FakeEndpoint::default());
    let prompt = Arc::new(FakePrompt::default());
    let mut manager = AuthManager::new(
        store.clone(),
        authorizer(&endpoint, &prompt, Arc::new(IdleBrowser::default())),
    )
    .with_client_secret(Some(write_client_secret(dir.path())))
    .with_token_generation(true);

    manager.authenticate().await.unwrap();

    let saved = store.load().await.unwrap();
    assert_eq!(saved.access_token, "stored-access");
    assert_eq!(
        saved.embedded_identity(),
        Some(("doc-id.apps.googleusercontent.com", "doc-secret"))
    );
    assert!(endpoint.exchanges().is_empty());
}
