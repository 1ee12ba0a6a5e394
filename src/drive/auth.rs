use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::{Client, Url};

use crate::{
    error::{Error, Result},
    management::TokenEndpoint,
    types::{
        AuthorizationSession, ClientIdentity, Credential, TokenErrorResponse, TokenResponse,
    },
    utils,
};

/// Builds a fresh authorization session: random state, PKCE verifier and
/// the consent URL advertising `redirect_uri`.
pub fn authorization_session(
    identity: &ClientIdentity,
    redirect_uri: &str,
) -> Result<AuthorizationSession> {
    let state = utils::generate_state_token();
    let code_verifier = utils::generate_code_verifier();
    let code_challenge = utils::generate_code_challenge(&code_verifier);
    let scope = identity.scopes.join(" ");

    let url = Url::parse_with_params(
        &identity.auth_uri,
        &[
            ("client_id", identity.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", scope.as_str()),
            ("state", state.as_str()),
            ("access_type", "offline"),
            ("code_challenge", code_challenge.as_str()),
            ("code_challenge_method", "S256"),
        ],
    )
    .map_err(|e| {
        Error::Config(format!(
            "invalid authorization endpoint '{}': {}",
            identity.auth_uri, e
        ))
    })?;

    Ok(AuthorizationSession {
        state,
        code_verifier,
        redirect_uri: redirect_uri.to_string(),
        auth_url: url.to_string(),
    })
}

/// Talks to the OAuth2 token endpoint named by the client identity.
#[derive(Debug, Clone, Default)]
pub struct OAuthClient {
    http: Client,
}

impl OAuthClient {
    pub fn new() -> Self {
        OAuthClient {
            http: Client::new(),
        }
    }

    async fn request_token(
        &self,
        token_uri: &str,
        form: &[(&str, &str)],
    ) -> std::result::Result<TokenResponse, String> {
        let response = self
            .http
            .post(token_uri)
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        let body = response.text().await.map_err(|e| e.to_string())?;

        if !status.is_success() {
            let reason = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{}: {}", error, description),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => format!("status {}: {}", status, body),
            };
            return Err(reason);
        }

        serde_json::from_str(&body).map_err(|e| format!("invalid token response: {}", e))
    }
}

fn credential_from_response(response: TokenResponse, previous_refresh: &str) -> Credential {
    let expiry = response
        .expires_in
        .filter(|secs| *secs > 0)
        .map(|secs| Utc::now() + Duration::seconds(secs));

    Credential::new(
        response.access_token,
        response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        response
            .refresh_token
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| previous_refresh.to_string()),
        expiry,
    )
}

#[async_trait]
impl TokenEndpoint for OAuthClient {
    async fn exchange_code(
        &self,
        identity: &ClientIdentity,
        session: &AuthorizationSession,
        code: &str,
    ) -> Result<Credential> {
        let response = self
            .request_token(
                &identity.token_uri,
                &[
                    ("grant_type", "authorization_code"),
                    ("client_id", identity.client_id.as_str()),
                    ("client_secret", identity.client_secret.as_str()),
                    ("code", code),
                    ("code_verifier", session.code_verifier.as_str()),
                    ("redirect_uri", session.redirect_uri.as_str()),
                ],
            )
            .await
            .map_err(Error::TokenExchange)?;

        Ok(credential_from_response(response, ""))
    }

    async fn refresh(
        &self,
        identity: &ClientIdentity,
        credential: &Credential,
    ) -> Result<Credential> {
        if credential.refresh_token.is_empty() {
            return Err(Error::RefreshFailed(
                "credential has no refresh token".to_string(),
            ));
        }

        let response = self
            .request_token(
                &identity.token_uri,
                &[
                    ("grant_type", "refresh_token"),
                    ("client_id", identity.client_id.as_str()),
                    ("client_secret", identity.client_secret.as_str()),
                    ("refresh_token", credential.refresh_token.as_str()),
                ],
            )
            .await
            .map_err(Error::RefreshFailed)?;

        Ok(credential_from_response(response, credential.refresh_token.as_str()))
    }
}
