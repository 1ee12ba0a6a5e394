//! # API Module
//!
//! HTTP endpoints served by the short-lived local callback server during the
//! browser authorization flow.
//!
//! ## Endpoints
//!
//! - [`callback`] - Receives the OAuth2 redirect from the provider, extracts
//!   the authorization code and hands it to the waiting authorizer over a
//!   one-shot channel. Requests without a code, with a provider `error`
//!   parameter, or with a mismatching `state` are reported on the separate
//!   error channel and answered with `400 Bad Request`.
//!
//! The shared [`CallbackState`] is injected as an axum `Extension` and owns
//! the sending halves of both channels; each can fire at most once.

mod callback;

pub use callback::{CallbackState, SUCCESS_PAGE, callback};
