use std::{collections::HashMap, sync::Arc};

use axum::{
    Extension,
    extract::Query,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tokio::sync::{Mutex, oneshot};

use crate::error::Error;

pub const SUCCESS_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Successful</title>
    <style>
        body { font-family: Arial, sans-serif; text-align: center; padding: 50px; }
        .success { color: #4CAF50; font-size: 24px; margin-bottom: 20px; }
        .message { color: #666; font-size: 16px; }
    </style>
</head>
<body>
    <div class="success">Authorization Successful!</div>
    <div class="message">You can close this window and return to the terminal.</div>
</body>
</html>
"#;

#[derive(Clone)]
pub struct CallbackState {
    expected_state: Option<String>,
    code_tx: Arc<Mutex<Option<oneshot::Sender<String>>>>,
    error_tx: Arc<Mutex<Option<oneshot::Sender<Error>>>>,
}

impl CallbackState {
    pub fn new(
        expected_state: Option<String>,
        code_tx: oneshot::Sender<String>,
        error_tx: oneshot::Sender<Error>,
    ) -> Self {
        CallbackState {
            expected_state,
            code_tx: Arc::new(Mutex::new(Some(code_tx))),
            error_tx: Arc::new(Mutex::new(Some(error_tx))),
        }
    }

    /// Signals `error` unless an error was already delivered.
    pub async fn report_error(&self, error: Error) {
        if let Some(tx) = self.error_tx.lock().await.take() {
            let _ = tx.send(error);
        }
    }

    async fn deliver_code(&self, code: String) -> bool {
        match self.code_tx.lock().await.take() {
            Some(tx) => tx.send(code).is_ok(),
            None => false,
        }
    }
}

pub async fn callback(
    Query(params): Query<HashMap<String, String>>,
    Extension(shared_state): Extension<CallbackState>,
) -> Response {
    if let Some(reason) = params.get("error") {
        shared_state
            .report_error(Error::AuthorizationDenied(reason.clone()))
            .await;
        return (StatusCode::BAD_REQUEST, "Authorization was denied").into_response();
    }

    let Some(code) = params.get("code").filter(|c| !c.is_empty()) else {
        shared_state
            .report_error(Error::AuthorizationDenied(
                "no authorization code in callback".to_string(),
            ))
            .await;
        return (StatusCode::BAD_REQUEST, "No authorization code received").into_response();
    };

    if let Some(expected) = &shared_state.expected_state {
        if params.get("state") != Some(expected) {
            shared_state
                .report_error(Error::AuthorizationDenied(
                    "state parameter mismatch".to_string(),
                ))
                .await;
            return (StatusCode::BAD_REQUEST, "Invalid state parameter").into_response();
        }
    }

    if shared_state.deliver_code(code.clone()).await {
        Html(SUCCESS_PAGE).into_response()
    } else {
        (StatusCode::CONFLICT, "Authorization code already received").into_response()
    }
}
