//! Webhook listener
//!
//! Small axum server running as a background task. `POST /webhook` receives
//! the export-completion callback and signals the [`NotificationChannel`];
//! `POST /shutdown` stops the server gracefully.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::error::{MovementsError, Result};
use crate::notify::NotificationChannel;

#[derive(Clone)]
struct ListenerState {
    channel: Arc<NotificationChannel>,
    shutdown: Arc<Notify>,
}

/// Handle to a running webhook listener.
pub struct WebhookListener {
    addr: SocketAddr,
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl WebhookListener {
    /// Bind `bind` and serve in a background task.
    ///
    /// Failing to bind is a startup failure for the whole run.
    pub async fn start(bind: &str, channel: Arc<NotificationChannel>) -> Result<Self> {
        let listener = TcpListener::bind(bind).await.map_err(|e| {
            MovementsError::Config(format!("failed to bind webhook listener on {}: {}", bind, e))
        })?;
        let addr = listener
            .local_addr()
            .context("Failed to determine webhook listener address")?;

        let shutdown = Arc::new(Notify::new());
        let state = ListenerState {
            channel,
            shutdown: shutdown.clone(),
        };

        let app = Router::new()
            .route("/webhook", post(handle_webhook))
            .route("/shutdown", post(handle_shutdown))
            .with_state(state);

        let stop = shutdown.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(async move { stop.notified().await })
                .await
            {
                error!("Webhook listener error: {}", err);
            }
            info!("Webhook listener stopped");
        });

        info!("Webhook listener running on http://{}", addr);
        Ok(Self {
            addr,
            shutdown,
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop the listener from inside the process.
    pub fn stop(&self) {
        self.shutdown.notify_one();
    }

    /// Wait for the server task to finish (after `/shutdown` or `stop`).
    pub async fn join(mut self) -> Result<()> {
        if let Some(handle) = self.handle.take() {
            handle.await.context("Webhook listener task failed")?;
        }
        Ok(())
    }
}

impl Drop for WebhookListener {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }
}

async fn handle_webhook(State(state): State<ListenerState>, body: Bytes) -> StatusCode {
    debug!("Completion callback received ({} bytes)", body.len());
    state.channel.signal();
    StatusCode::OK
}

async fn handle_shutdown(State(state): State<ListenerState>) -> StatusCode {
    info!("Shutdown requested through the webhook listener");
    state.shutdown.notify_one();
    StatusCode::OK
}

/// Ask a listener to shut down through its HTTP endpoint.
///
/// Anything but 200 is a failure; the caller logs it and moves on.
pub async fn request_shutdown(base_url: &str) -> Result<()> {
    let url = format!("{}/shutdown", base_url.trim_end_matches('/'));
    let response = reqwest::Client::new()
        .post(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach listener at {}", url))?;

    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().await.unwrap_or_default();
        warn!("Listener shutdown failed: {} {}", status, body);
        return Err(anyhow::anyhow!("listener shutdown returned {}: {}", status, body));
    }

    info!("Webhook listener shut down");
    Ok(())
}
