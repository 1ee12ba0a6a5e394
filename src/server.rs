use std::{ops::RangeInclusive, time::Duration};

use axum::{Extension, Router, routing::get};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};

use crate::{
    api::{self, CallbackState},
    error::{Error, Result},
    warning,
};

/// Ports probed, in order, for the local callback listener.
pub const CALLBACK_PORTS: RangeInclusive<u16> = 54321..=54329;

/// Upper bound for a graceful listener shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Binds the first free loopback port in `ports`. Port 0 asks the OS for any
/// free port; the returned port is the one actually bound.
pub async fn bind_available_port(ports: RangeInclusive<u16>) -> Result<(TcpListener, u16)> {
    for port in ports.clone() {
        if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)).await {
            let bound = listener.local_addr()?.port();
            return Ok((listener, bound));
        }
    }

    Err(Error::NoPortAvailable {
        start: *ports.start(),
        end: *ports.end(),
    })
}

pub fn callback_redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{}/callback", port)
}

/// Races the callback code against the callback error and a deadline.
pub async fn wait_for_code(
    code_rx: oneshot::Receiver<String>,
    error_rx: oneshot::Receiver<Error>,
    timeout: Duration,
) -> Result<String> {
    tokio::select! {
        code = code_rx => {
            code.map_err(|_| Error::CallbackServer("callback channel closed".to_string()))
        }
        error = error_rx => {
            Err(error.unwrap_or_else(|_| Error::CallbackServer("callback channel closed".to_string())))
        }
        _ = tokio::time::sleep(timeout) => Err(Error::AuthorizationTimeout(timeout)),
    }
}

/// Single-route listener capturing one authorization code.
///
/// Dropping the server signals shutdown and aborts the serving task, so the
/// port is released on every exit path; [`CallbackServer::shutdown`] does the
/// same gracefully within [`SHUTDOWN_TIMEOUT`].
pub struct CallbackServer {
    port: u16,
    code_rx: Option<oneshot::Receiver<String>>,
    error_rx: Option<oneshot::Receiver<Error>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CallbackServer {
    /// Serves `/callback` on an already bound listener.
    pub fn serve(listener: TcpListener, expected_state: Option<String>) -> Result<Self> {
        let port = listener.local_addr()?.port();

        let (code_tx, code_rx) = oneshot::channel();
        let (error_tx, error_rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = CallbackState::new(expected_state, code_tx, error_tx);
        let app = Router::new().route(
            "/callback",
            get(api::callback).layer(Extension(state.clone())),
        );

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;

            if let Err(e) = served {
                state.report_error(Error::CallbackServer(e.to_string())).await;
            }
        });

        Ok(CallbackServer {
            port,
            code_rx: Some(code_rx),
            error_rx: Some(error_rx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    /// Binds the first free port in `ports` and serves on it.
    pub async fn start(ports: RangeInclusive<u16>, expected_state: Option<String>) -> Result<Self> {
        let (listener, _) = bind_available_port(ports).await?;
        Self::serve(listener, expected_state)
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        callback_redirect_uri(self.port)
    }

    /// Waits for the callback. Can only be awaited once per server.
    pub async fn wait_for_code(&mut self, timeout: Duration) -> Result<String> {
        match (self.code_rx.take(), self.error_rx.take()) {
            (Some(code_rx), Some(error_rx)) => wait_for_code(code_rx, error_rx, timeout).await,
            _ => Err(Error::CallbackServer(
                "callback result already consumed".to_string(),
            )),
        }
    }

    /// Stops the listener; a shutdown exceeding the timeout is only a warning.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warning!(
                    "Callback server did not stop within {}s, aborting it",
                    SHUTDOWN_TIMEOUT.as_secs()
                );
                handle.abort();
            }
        }
    }
}

impl Drop for CallbackServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
