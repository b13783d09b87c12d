//! Bridge to the externally hosted Telegram login widget.
//!
//! The login surface itself (OAuth page, embedded webview, popup) lives
//! outside the SDK. Host applications forward its completion payloads through
//! a [`LoginBridge`]; [`EventLoginWidget`] turns the next delivered payload
//! into a validated [`LoginPayload`], with a fixed timeout as the backstop.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::broadcast;

use crate::error::{AuthError, Result};
use crate::payload::LoginPayload;

const EVENT_BUFFER: usize = 16;
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(300);

static GLOBAL_BRIDGE: OnceLock<LoginBridge> = OnceLock::new();

/// Channel through which the host delivers raw widget completion payloads.
///
/// One process-wide bridge is registered lazily on first use; constructing
/// additional bridges (e.g. one per embedded webview) is supported and keeps
/// their event streams separate.
#[derive(Debug, Clone)]
pub struct LoginBridge {
    tx: broadcast::Sender<serde_json::Value>,
}

impl Default for LoginBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl LoginBridge {
    /// A bridge with its own private event stream.
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_BUFFER);
        Self { tx }
    }

    /// The process-wide bridge. Initialized exactly once; later calls return
    /// the same instance.
    pub fn global() -> &'static LoginBridge {
        GLOBAL_BRIDGE.get_or_init(LoginBridge::new)
    }

    /// Push a raw widget payload to all current listeners.
    ///
    /// Returns `false` when nobody is listening (the payload is dropped).
    pub fn deliver(&self, payload: serde_json::Value) -> bool {
        self.tx.send(payload).is_ok()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<serde_json::Value> {
        self.tx.subscribe()
    }
}

/// Deliver a widget payload through the process-wide bridge.
pub fn deliver_login_event(payload: serde_json::Value) -> bool {
    LoginBridge::global().deliver(payload)
}

/// The seam between auth flows and the external login surface.
#[async_trait]
pub trait LoginWidget: Send + Sync {
    /// Ask the host to show the login surface.
    fn present(&self) -> Result<()>;

    /// Wait for the next widget completion payload and validate it.
    async fn authenticate(&self) -> Result<LoginPayload>;
}

/// [`LoginWidget`] backed by a [`LoginBridge`].
///
/// `authenticate` subscribes once per call and settles on the first payload
/// received: valid data resolves, invalid or stale data rejects, and the
/// timeout (default 5 minutes) rejects with [`AuthError::WidgetTimeout`]. The
/// subscription is dropped on settle either way.
pub struct EventLoginWidget {
    bridge: LoginBridge,
    timeout: Duration,
    max_age: chrono::Duration,
    presenter: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl EventLoginWidget {
    pub fn new() -> Self {
        Self {
            bridge: LoginBridge::global().clone(),
            timeout: DEFAULT_AUTH_TIMEOUT,
            max_age: chrono::Duration::hours(24),
            presenter: None,
        }
    }

    /// Listen on a specific bridge instead of the process-wide one.
    pub fn with_bridge(mut self, bridge: LoginBridge) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the payload staleness window (default 24 h).
    pub fn with_max_payload_age(mut self, max_age: chrono::Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Install the host callback invoked by [`LoginWidget::present`].
    pub fn with_presenter(mut self, presenter: Arc<dyn Fn() + Send + Sync>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    fn validate(&self, raw: &serde_json::Value) -> Result<LoginPayload> {
        let payload = match LoginPayload::parse(raw) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::warn!(error = %err, "suspicious widget payload: missing required fields");
                return Err(err);
            }
        };
        let now = Utc::now();
        if !payload.is_fresh(now, self.max_age) {
            let age_secs = payload.age(now).num_seconds();
            tracing::warn!(age_secs, "suspicious widget payload: stale auth_date");
            return Err(AuthError::StalePayload { age_secs });
        }
        Ok(payload)
    }
}

impl Default for EventLoginWidget {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoginWidget for EventLoginWidget {
    fn present(&self) -> Result<()> {
        match &self.presenter {
            Some(presenter) => {
                presenter();
                Ok(())
            }
            None => Err(AuthError::WidgetUnavailable(
                "no presenter configured for this widget".into(),
            )),
        }
    }

    async fn authenticate(&self) -> Result<LoginPayload> {
        let mut rx = self.bridge.subscribe();
        let received = tokio::time::timeout(self.timeout, async {
            loop {
                match rx.recv().await {
                    Ok(value) => return Some(value),
                    // Dropped events are not a settle condition; keep waiting.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .await;

        match received {
            Ok(Some(value)) => self.validate(&value),
            Ok(None) => Err(AuthError::WidgetUnavailable(
                "login event bridge closed".into(),
            )),
            Err(_) => Err(AuthError::WidgetTimeout {
                waited_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}
