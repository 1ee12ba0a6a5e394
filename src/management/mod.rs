mod auth;
mod retention;
mod token;

pub use auth::AUTHORIZATION_TIMEOUT;
pub use auth::AuthManager;
pub use auth::Authorizer;
pub use auth::BrowserLauncher;
pub use auth::CodePrompt;
pub use auth::StdinPrompt;
pub use auth::SystemBrowser;
pub use auth::TokenEndpoint;
pub use auth::TokenSource;
pub use auth::TokenState;
pub use auth::extract_code;
pub use retention::FolderTree;
pub use retention::RetentionEngine;
pub use retention::partition_children;
pub use retention::select_expired;
pub use token::TokenStore;
