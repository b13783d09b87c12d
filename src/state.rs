//! Shared authentication state.
//!
//! A single mutable cell written by the sign-in orchestrator and observed by
//! host UI components. Backed by a `watch` channel: every write publishes a
//! whole replacement value, so subscribers always observe a consistent
//! snapshot and can `.changed().await` for transitions.

use tokio::sync::watch;

use crate::token::{AuthUser, TokenPair};

/// Snapshot of the application's authentication state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthState {
    pub authenticated: bool,
    pub user: Option<AuthUser>,
    pub tokens: Option<TokenPair>,
}

/// Cloneable handle to the shared authentication state cell.
#[derive(Debug, Clone)]
pub struct AuthStateHandle {
    tx: watch::Sender<AuthState>,
}

impl Default for AuthStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthStateHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AuthState::default());
        Self { tx }
    }

    /// Current state snapshot.
    pub fn snapshot(&self) -> AuthState {
        self.tx.borrow().clone()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.tx.subscribe()
    }

    /// Mark the session authenticated. Publishes a fresh snapshot.
    pub fn set_authenticated(&self, user: AuthUser, tokens: TokenPair) {
        let _ = self.tx.send(AuthState {
            authenticated: true,
            user: Some(user),
            tokens: Some(tokens),
        });
    }

    /// Clear authentication (sign-out or aborted session).
    pub fn clear(&self) {
        let _ = self.tx.send(AuthState::default());
    }
}
