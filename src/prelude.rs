//! Convenience re-exports for common use.

pub use crate::config::{Endpoints, FlowOptions, RetryLimit};
pub use crate::error::{AuthError, Result};
pub use crate::orchestrator::{FlowPhase, FlowSnapshot, SignInOrchestrator, TwoFactorHandoff};
pub use crate::payload::LoginPayload;
pub use crate::service::TelegramAuthService;
pub use crate::session::{AuthOutcome, ConfirmPoll, ConfirmRequest, SignInOptions, SignInSession};
pub use crate::state::{AuthState, AuthStateHandle};
pub use crate::token::{AuthUser, TokenPair};
pub use crate::token_store::{FileTokenStore, StoredCredentials, TokenStore, TokenStoreConfig};
pub use crate::two_factor::{TwoFactorKind, TwoFactorMethod, TwoFactorService};
pub use crate::widget::{deliver_login_event, EventLoginWidget, LoginBridge, LoginWidget};
