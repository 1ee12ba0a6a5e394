use std::{ops::RangeInclusive, path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::Url;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::{
    config::{self, Config},
    drive::auth::authorization_session,
    error::{Error, Result},
    info,
    management::TokenStore,
    server::{self, CallbackServer},
    success,
    types::{AuthorizationSession, ClientIdentity, Credential},
    warning,
};

/// How long the browser flow waits for the redirect before falling back.
pub const AUTHORIZATION_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// OAuth2 token endpoint operations.
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    async fn exchange_code(
        &self,
        identity: &ClientIdentity,
        session: &AuthorizationSession,
        code: &str,
    ) -> Result<Credential>;

    async fn refresh(&self, identity: &ClientIdentity, credential: &Credential)
    -> Result<Credential>;
}

/// Source of an authorization code typed in by the operator.
#[async_trait]
pub trait CodePrompt: Send + Sync {
    async fn read_code(&self, auth_url: &str) -> Result<String>;
}

pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<()>;
}

pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> Result<()> {
        webbrowser::open(url).map_err(Error::Io)
    }
}

/// Reads the code from stdin. A pasted redirect URL is accepted as well.
pub struct StdinPrompt;

#[async_trait]
impl CodePrompt for StdinPrompt {
    async fn read_code(&self, auth_url: &str) -> Result<String> {
        info!(
            "Go to the following link in your browser then type the authorization code:\n{}",
            auth_url
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        match lines.next_line().await {
            Ok(Some(line)) => extract_code(&line)
                .ok_or_else(|| Error::ManualInput("no authorization code entered".to_string())),
            Ok(None) => Err(Error::ManualInput("input closed".to_string())),
            Err(e) => Err(Error::ManualInput(e.to_string())),
        }
    }
}

/// The code from operator input: either the bare code or the full redirect URL.
pub fn extract_code(input: &str) -> Option<String> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if let Ok(url) = Url::parse(input) {
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, code)| code.into_owned())
            .filter(|code| !code.is_empty());
    }

    Some(input.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    Invalid,
    ValidSelfSufficient,
    ValidDependent,
    Authorizing,
    Ready,
    Failed,
}

enum BrowserOutcome {
    Code {
        session: AuthorizationSession,
        code: String,
    },
    Fallback(Error),
}

/// Runs interactive authorization: local callback first, manual code entry
/// when the callback path cannot complete.
#[derive(Clone)]
pub struct Authorizer {
    endpoint: Arc<dyn TokenEndpoint>,
    prompt: Arc<dyn CodePrompt>,
    browser: Arc<dyn BrowserLauncher>,
    ports: RangeInclusive<u16>,
    timeout: Duration,
}

impl Authorizer {
    pub fn new(endpoint: Arc<dyn TokenEndpoint>) -> Self {
        Authorizer {
            endpoint,
            prompt: Arc::new(StdinPrompt),
            browser: Arc::new(SystemBrowser),
            ports: server::CALLBACK_PORTS,
            timeout: AUTHORIZATION_TIMEOUT,
        }
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn CodePrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_ports(mut self, ports: RangeInclusive<u16>) -> Self {
        self.ports = ports;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &Arc<dyn TokenEndpoint> {
        &self.endpoint
    }

    pub async fn authorize(&self, identity: &ClientIdentity) -> Result<Credential> {
        match self.browser_flow(identity).await? {
            BrowserOutcome::Code { session, code } => {
                success!("Authorization code received!");
                self.endpoint.exchange_code(identity, &session, &code).await
            }
            BrowserOutcome::Fallback(reason) => {
                warning!("{}", reason);
                info!("Falling back to manual authorization flow...");
                self.manual_flow(identity).await
            }
        }
    }

    async fn browser_flow(&self, identity: &ClientIdentity) -> Result<BrowserOutcome> {
        let (listener, port) = match server::bind_available_port(self.ports.clone()).await {
            Ok(bound) => bound,
            Err(e) => return Ok(BrowserOutcome::Fallback(e)),
        };

        let session = authorization_session(identity, &server::callback_redirect_uri(port))?;
        let mut callback = match CallbackServer::serve(listener, Some(session.state.clone())) {
            Ok(callback) => callback,
            Err(e) => return Ok(BrowserOutcome::Fallback(e)),
        };

        info!("Opening browser for authorization...");
        info!(
            "If the browser doesn't open, visit this URL:\n{}",
            session.auth_url
        );
        if let Err(e) = self.browser.open(&session.auth_url) {
            warning!(
                "Could not open browser automatically: {}\nPlease open the URL manually in your browser.",
                e
            );
        }

        let waited = callback.wait_for_code(self.timeout).await;
        callback.shutdown().await;

        Ok(match waited {
            Ok(code) => BrowserOutcome::Code { session, code },
            Err(e) => BrowserOutcome::Fallback(e),
        })
    }

    async fn manual_flow(&self, identity: &ClientIdentity) -> Result<Credential> {
        let session = authorization_session(identity, &identity.redirect_uri)?;
        let code = self.prompt.read_code(&session.auth_url).await?;
        self.endpoint.exchange_code(identity, &session, &code).await
    }
}

/// Hands out access tokens, refreshing and persisting the credential before
/// it expires.
///
/// A failed refresh triggers one interactive re-authorization; a refresh
/// failing again before any refresh has succeeded is returned as an error.
pub struct TokenSource {
    credential: Credential,
    identity: Option<ClientIdentity>,
    store: TokenStore,
    authorizer: Authorizer,
    failed_refreshes: u32,
}

impl TokenSource {
    pub fn new(
        credential: Credential,
        identity: Option<ClientIdentity>,
        store: TokenStore,
        authorizer: Authorizer,
    ) -> Self {
        TokenSource {
            credential,
            identity,
            store,
            authorizer,
            failed_refreshes: 0,
        }
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn identity(&self) -> Option<&ClientIdentity> {
        self.identity.as_ref()
    }

    pub async fn access_token(&mut self) -> Result<String> {
        if !self.credential.is_valid() {
            self.renew().await?;
        }

        Ok(self.credential.access_token.clone())
    }

    /// Writes the credential, with the client identity merged in when known.
    pub async fn persist(&mut self) -> Result<()> {
        if let Some(identity) = &self.identity {
            self.credential = self.credential.clone().with_identity(identity);
        }

        info!("Saving credential file to: {}", self.store.path().display());
        self.store.save(&self.credential).await
    }

    async fn renew(&mut self) -> Result<()> {
        let Some(identity) = self.identity.clone() else {
            return Err(Error::MissingCredentials {
                path: self.store.path().to_path_buf(),
                reason: "token expired and no client identity is available to refresh it"
                    .to_string(),
            });
        };

        match self
            .authorizer
            .endpoint()
            .refresh(&identity, &self.credential)
            .await
        {
            Ok(refreshed) => {
                self.failed_refreshes = 0;
                self.credential = refreshed.with_identity(&identity);

                match self.store.save_if_changed(&self.credential).await {
                    Ok(true) => info!("Token refreshed, saved to {}", self.store.path().display()),
                    Ok(false) => {}
                    Err(e) => warning!("Unable to cache refreshed token: {}", e),
                }
                Ok(())
            }
            Err(e) if self.failed_refreshes == 0 => {
                self.failed_refreshes += 1;
                warning!(
                    "Failed to refresh token: {}. Requesting new authorization...",
                    e
                );

                self.credential = self
                    .authorizer
                    .authorize(&identity)
                    .await?
                    .with_identity(&identity);
                self.persist().await
            }
            Err(e) => Err(e),
        }
    }
}

/// Drives a run from "maybe a token file" to a usable [`TokenSource`].
pub struct AuthManager {
    store: TokenStore,
    client_secret: Option<PathBuf>,
    token_gen: bool,
    authorizer: Authorizer,
    state: TokenState,
}

impl AuthManager {
    pub fn new(store: TokenStore, authorizer: Authorizer) -> Self {
        AuthManager {
            store,
            client_secret: None,
            token_gen: false,
            authorizer,
            state: TokenState::NoToken,
        }
    }

    pub fn from_config(config: &Config, authorizer: Authorizer) -> Self {
        AuthManager::new(TokenStore::new(&config.token_path), authorizer)
            .with_client_secret(config.client_secret.clone())
            .with_token_generation(config.token_gen)
    }

    pub fn with_client_secret(mut self, client_secret: Option<PathBuf>) -> Self {
        self.client_secret = client_secret;
        self
    }

    pub fn with_token_generation(mut self, token_gen: bool) -> Self {
        self.token_gen = token_gen;
        self
    }

    pub fn state(&self) -> TokenState {
        self.state
    }

    pub async fn authenticate(&mut self) -> Result<TokenSource> {
        let result = self.resolve().await;
        self.state = match result {
            Ok(_) => TokenState::Ready,
            Err(_) => TokenState::Failed,
        };
        result
    }

    async fn resolve(&mut self) -> Result<TokenSource> {
        self.state = TokenState::NoToken;

        let credential = match self.store.load().await {
            Ok(credential) => credential,
            Err(e) if self.token_gen => {
                info!("No usable token at {} ({})", self.store.path().display(), e);
                return self.authorize_new().await;
            }
            Err(e) => {
                if self.client_secret.is_none() {
                    return Err(Error::MissingCredentials {
                        path: self.store.path().to_path_buf(),
                        reason: e.to_string(),
                    });
                }
                info!(
                    "No token found at {} ({}), starting authorization flow...",
                    self.store.path().display(),
                    e
                );
                return self.authorize_new().await;
            }
        };

        let valid = credential.is_valid();
        self.state = match (valid, credential.is_self_sufficient()) {
            (false, _) => TokenState::Invalid,
            (true, true) => TokenState::ValidSelfSufficient,
            (true, false) => TokenState::ValidDependent,
        };

        let identity = match ClientIdentity::from_credential(&credential) {
            Some(embedded) if !self.token_gen => Some(embedded),
            _ => match self.external_identity().await {
                Ok(identity) => identity,
                Err(e) if valid && !self.token_gen => {
                    warning!("{}\nContinuing with the stored token", e);
                    None
                }
                Err(e) => return Err(e),
            },
        };

        if identity.is_none() && (!valid || self.token_gen) {
            return Err(Error::MissingCredentials {
                path: self.store.path().to_path_buf(),
                reason: "stored token cannot be refreshed without a client identity".to_string(),
            });
        }

        let mut source = TokenSource::new(
            credential,
            identity,
            self.store.clone(),
            self.authorizer.clone(),
        );

        // refresh now rather than on the first remote call
        source.access_token().await?;

        if self.token_gen {
            source.persist().await?;
        }

        Ok(source)
    }

    async fn authorize_new(&mut self) -> Result<TokenSource> {
        let identity = self
            .external_identity()
            .await?
            .ok_or_else(|| Error::MissingCredentials {
                path: self.store.path().to_path_buf(),
                reason: "a client secret file is needed to authorize".to_string(),
            })?;

        self.state = TokenState::Authorizing;
        let credential = self.authorizer.authorize(&identity).await?;

        let mut source = TokenSource::new(
            credential,
            Some(identity),
            self.store.clone(),
            self.authorizer.clone(),
        );
        source.persist().await?;
        Ok(source)
    }

    async fn external_identity(&self) -> Result<Option<ClientIdentity>> {
        match &self.client_secret {
            Some(path) => config::load_client_identity(path).await.map(Some),
            None => Ok(None),
        }
    }
}
