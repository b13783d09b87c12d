use uuid::Uuid;

use crate::token::{AuthUser, TokenPair};
use crate::two_factor::{TwoFactorKind, TwoFactorMethod};

/// Per-attempt options for starting a Telegram sign-in.
#[derive(Debug, Clone, Default)]
pub struct SignInOptions {
    /// Bot username the widget authenticates against.
    pub bot_name: String,
    /// Where Telegram redirects after the user confirms.
    pub redirect_url: Option<String>,
    /// Origin advertised to the OAuth page.
    pub origin: Option<String>,
    /// Scopes requested from the user (e.g. `write`).
    pub request_access: Vec<String>,
    /// Link an existing account instead of signing in.
    pub binding: bool,
}

impl SignInOptions {
    pub fn new(bot_name: impl Into<String>) -> Self {
        Self {
            bot_name: bot_name.into(),
            ..Self::default()
        }
    }

    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = Some(url.into());
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_request_access(mut self, scopes: impl IntoIterator<Item = String>) -> Self {
        self.request_access = scopes.into_iter().collect();
        self
    }

    pub fn binding(mut self, binding: bool) -> Self {
        self.binding = binding;
        self
    }
}

/// One Telegram sign-in attempt.
///
/// Produced by [`TelegramAuthService::init_sign_in`](crate::service::TelegramAuthService::init_sign_in).
/// `auth_url` is always present (constructed client-side); the backend-issued
/// fields are `None` when the init call failed and the attempt is running in
/// degraded redirect-only mode.
#[derive(Debug, Clone)]
pub struct SignInSession {
    /// Client-generated id correlating log records for this attempt.
    pub correlation_id: Uuid,
    /// OAuth redirect URL for the login page.
    pub auth_url: String,
    /// Backend-issued session id; required to poll for confirmation.
    pub session_id: Option<String>,
    /// Short confirmation code the user can compare out-of-band.
    pub code: Option<String>,
    /// QR image data for scanning from another device.
    pub qr: Option<String>,
    /// Deep link opening the bot chat directly.
    pub link_to_bot: Option<String>,
    /// Link-account mode rather than sign-in.
    pub binding: bool,
}

/// One confirmation attempt against the backend.
#[derive(Debug, Clone)]
pub struct ConfirmRequest {
    /// Backend-issued session id being confirmed.
    pub session_id: String,
    /// Link-account mode rather than sign-in.
    pub binding: bool,
    /// Two-factor method selection, present only on the hand-off path.
    pub two_factor: Option<TwoFactorKind>,
}

impl ConfirmRequest {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            binding: false,
            two_factor: None,
        }
    }

    pub fn binding(mut self, binding: bool) -> Self {
        self.binding = binding;
        self
    }

    pub fn with_two_factor(mut self, kind: TwoFactorKind) -> Self {
        self.two_factor = Some(kind);
        self
    }
}

/// Outcome of a single confirmation attempt against the backend.
#[derive(Debug, Clone)]
pub enum ConfirmPoll {
    /// Not confirmed yet; keep polling.
    Pending,
    /// The user confirmed; tokens are ready.
    Authorized { tokens: TokenPair, user: AuthUser },
    /// Confirmed, but a second factor is required to finish.
    TwoFactorRequired { methods: Vec<TwoFactorMethod> },
    /// The cancellation token fired before the request settled.
    Aborted,
}

/// Terminal result of a direct (non-polling) authentication path.
#[derive(Debug, Clone)]
pub enum AuthOutcome {
    /// Authenticated; tokens are ready.
    Granted { tokens: TokenPair, user: AuthUser },
    /// A second factor is required to finish.
    TwoFactorRequired { methods: Vec<TwoFactorMethod> },
    /// The attempt was rejected.
    Denied { reason: String },
}

impl AuthOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    pub(crate) fn denied(reason: impl Into<String>) -> Self {
        Self::Denied {
            reason: reason.into(),
        }
    }
}
