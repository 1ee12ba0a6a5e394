use std::sync::Arc;

use crate::{
    config::Config,
    drive::auth::OAuthClient,
    error::Result,
    management::{AuthManager, Authorizer, TokenSource},
};

/// Loads, refreshes or interactively obtains the credential for this run.
pub async fn authenticate(config: &Config) -> Result<TokenSource> {
    let authorizer = Authorizer::new(Arc::new(OAuthClient::new()));
    let mut manager = AuthManager::from_config(config, authorizer);
    manager.authenticate().await
}
