//! End-to-end Telegram sign-in flow control.
//!
//! [`SignInOrchestrator`] owns one sign-in attempt at a time: it initializes
//! the session, drives the bounded confirmation polling loop, handles the
//! abort protocol, hands off to the two-factor sub-flow when the backend asks
//! for a second factor, and publishes terminal state to the shared
//! [`AuthStateHandle`]. All public methods are `&self`; interior mutability
//! plus `watch` channels let multiple tasks share one handle.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::config::{FlowOptions, RetryLimit};
use crate::error::{AuthError, Result};
use crate::service::TelegramAuthService;
use crate::session::{AuthOutcome, ConfirmPoll, ConfirmRequest, SignInOptions, SignInSession};
use crate::state::AuthStateHandle;
use crate::token::{AuthUser, TokenPair};
use crate::token_store::{StoredCredentials, TokenStore};
use crate::two_factor::{TwoFactorKind, TwoFactorMethod};
use crate::widget::LoginBridge;

/// Phases of one sign-in flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPhase {
    /// No attempt started.
    Idle,
    /// Init request in flight.
    Initializing,
    /// Session ready; waiting for the user to open the redirect.
    AwaitingRedirect,
    /// Confirmation polling active.
    Polling,
    /// Backend requires a second factor; hand-off exposed.
    TwoFactorPending,
    /// Terminal: authenticated.
    Succeeded,
    /// Terminal: retries exhausted or fatal error.
    Failed,
    /// Terminal: cancelled by the caller.
    Aborted,
}

impl FlowPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Aborted)
    }
}

/// Point-in-time snapshot of flow observable state.
///
/// Subscribe to changes via [`SignInOrchestrator::watch`].
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSnapshot {
    pub phase: FlowPhase,
    pub auth_url: Option<String>,
    pub session_id: Option<String>,
    pub code: Option<String>,
    pub qr: Option<String>,
    pub link_to_bot: Option<String>,
    pub last_error: Option<String>,
    pub two_factor_methods: Vec<TwoFactorMethod>,
}

impl FlowSnapshot {
    fn idle() -> Self {
        Self {
            phase: FlowPhase::Idle,
            auth_url: None,
            session_id: None,
            code: None,
            qr: None,
            link_to_bot: None,
            last_error: None,
            two_factor_methods: Vec::new(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == FlowPhase::Initializing
    }

    pub fn is_polling(&self) -> bool {
        self.phase == FlowPhase::Polling
    }

    pub fn is_success(&self) -> bool {
        self.phase == FlowPhase::Succeeded
    }
}

struct FlowInner {
    service: Arc<TelegramAuthService>,
    auth_state: AuthStateHandle,
    token_store: std::sync::Mutex<Option<(Arc<dyn TokenStore>, String)>>,
    options: FlowOptions,
    root: CancellationToken,
    phase: Mutex<FlowPhase>,
    session: Mutex<Option<SignInSession>>,
    cancel: Mutex<CancellationToken>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    last_error: Mutex<Option<String>>,
    two_factor: Mutex<Vec<TwoFactorMethod>>,
    snapshot_tx: watch::Sender<FlowSnapshot>,
}

impl FlowInner {
    async fn snapshot(&self) -> FlowSnapshot {
        let session = self.session.lock().await;
        FlowSnapshot {
            phase: *self.phase.lock().await,
            auth_url: session.as_ref().map(|s| s.auth_url.clone()),
            session_id: session.as_ref().and_then(|s| s.session_id.clone()),
            code: session.as_ref().and_then(|s| s.code.clone()),
            qr: session.as_ref().and_then(|s| s.qr.clone()),
            link_to_bot: session.as_ref().and_then(|s| s.link_to_bot.clone()),
            last_error: self.last_error.lock().await.clone(),
            two_factor_methods: self.two_factor.lock().await.clone(),
        }
    }

    async fn broadcast(&self) {
        let snapshot = self.snapshot().await;
        let _ = self.snapshot_tx.send(snapshot);
    }

    async fn set_phase(&self, phase: FlowPhase) {
        *self.phase.lock().await = phase;
        self.broadcast().await;
    }

    async fn record_error(&self, err: &AuthError) {
        *self.last_error.lock().await = Some(err.to_string());
        self.broadcast().await;
    }

    /// Cancel the live token and install a fresh one, so in-flight requests
    /// lose their claim on flow state and later calls are not pre-cancelled.
    async fn replace_cancel_token(&self) -> CancellationToken {
        let mut cancel = self.cancel.lock().await;
        cancel.cancel();
        *cancel = self.root.child_token();
        cancel.clone()
    }

    async fn current_token(&self) -> CancellationToken {
        self.cancel.lock().await.clone()
    }

    /// Terminal success. Writes the shared auth state exactly once per
    /// session; a second call is a no-op.
    async fn finalize_success(&self, tokens: TokenPair, user: AuthUser) -> bool {
        {
            let mut phase = self.phase.lock().await;
            if *phase == FlowPhase::Succeeded {
                return false;
            }
            *phase = FlowPhase::Succeeded;
        }
        self.auth_state.set_authenticated(user.clone(), tokens.clone());
        let persist = self
            .token_store
            .lock()
            .ok()
            .and_then(|guard| guard.clone());
        if let Some((store, profile)) = persist {
            let credentials = StoredCredentials {
                tokens,
                user: Some(user),
            };
            if let Err(err) = store.save(&profile, &credentials) {
                tracing::warn!(error = %err, "failed to persist credentials");
            }
        }
        self.two_factor.lock().await.clear();
        // The session is closed; stop any in-flight confirmation interest.
        self.replace_cancel_token().await;
        self.broadcast().await;
        true
    }

    async fn enter_two_factor(&self, methods: Vec<TwoFactorMethod>) {
        *self.two_factor.lock().await = methods;
        self.set_phase(FlowPhase::TwoFactorPending).await;
    }

    async fn enter_failed(&self, err: &AuthError) {
        *self.last_error.lock().await = Some(err.to_string());
        self.set_phase(FlowPhase::Failed).await;
    }

    /// Aborted transition as observed by the polling loop. Only valid while
    /// polling: a terminal or two-factor phase set concurrently wins.
    async fn abort_from_poll(&self) {
        {
            let mut phase = self.phase.lock().await;
            if *phase != FlowPhase::Polling {
                return;
            }
            *phase = FlowPhase::Aborted;
        }
        self.broadcast().await;
    }

    /// Caller-requested abort. Terminal phases stay as they are.
    async fn abort_forced(&self) {
        {
            let mut phase = self.phase.lock().await;
            if phase.is_terminal() {
                return;
            }
            *phase = FlowPhase::Aborted;
        }
        self.broadcast().await;
    }

    async fn apply_outcome(&self, outcome: &AuthOutcome) {
        match outcome {
            AuthOutcome::Granted { tokens, user } => {
                self.finalize_success(tokens.clone(), user.clone()).await;
            }
            AuthOutcome::TwoFactorRequired { methods } => {
                self.enter_two_factor(methods.clone()).await;
            }
            AuthOutcome::Denied { reason } => {
                *self.last_error.lock().await = Some(reason.clone());
                self.set_phase(FlowPhase::Failed).await;
            }
        }
    }
}

/// State controller for the Telegram sign-in flow.
pub struct SignInOrchestrator {
    inner: Arc<FlowInner>,
    snapshot_rx: watch::Receiver<FlowSnapshot>,
    _root_guard: DropGuard,
}

impl SignInOrchestrator {
    /// Create an orchestrator listening on the process-wide login bridge.
    pub fn new(
        service: Arc<TelegramAuthService>,
        auth_state: AuthStateHandle,
        options: FlowOptions,
    ) -> Self {
        Self::with_bridge(service, auth_state, options, LoginBridge::global().clone())
    }

    /// Create an orchestrator listening on a specific login bridge.
    pub fn with_bridge(
        service: Arc<TelegramAuthService>,
        auth_state: AuthStateHandle,
        options: FlowOptions,
        bridge: LoginBridge,
    ) -> Self {
        let root = CancellationToken::new();
        let (snapshot_tx, snapshot_rx) = watch::channel(FlowSnapshot::idle());
        let inner = Arc::new(FlowInner {
            service,
            auth_state,
            token_store: std::sync::Mutex::new(None),
            options,
            root: root.clone(),
            phase: Mutex::new(FlowPhase::Idle),
            session: Mutex::new(None),
            cancel: Mutex::new(root.child_token()),
            poll_task: Mutex::new(None),
            last_error: Mutex::new(None),
            two_factor: Mutex::new(Vec::new()),
            snapshot_tx,
        });

        spawn_message_listener(inner.clone(), root.clone(), bridge);

        Self {
            inner,
            snapshot_rx,
            _root_guard: root.drop_guard(),
        }
    }

    /// Persist credentials on terminal success.
    pub fn with_token_store(
        self,
        store: Arc<dyn TokenStore>,
        profile: impl Into<String>,
    ) -> Self {
        if let Ok(mut guard) = self.inner.token_store.lock() {
            *guard = Some((store, profile.into()));
        }
        self
    }

    /// Subscribe to flow snapshots.
    pub fn watch(&self) -> watch::Receiver<FlowSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Current flow snapshot.
    pub async fn snapshot(&self) -> FlowSnapshot {
        self.inner.snapshot().await
    }

    /// Begin a sign-in attempt.
    ///
    /// Any previous polling session is torn down first. On success the
    /// session (redirect URL, confirmation aids) is stored and returned; with
    /// `auto_start` set and a session id present, polling begins immediately.
    ///
    /// # Errors
    ///
    /// Initialization failures are fatal: the flow transitions to `Failed`
    /// and the error is returned; opening the redirect depends on it.
    pub async fn init_sign_in(&self, options: SignInOptions) -> Result<SignInSession> {
        self.stop_poll_task().await;
        {
            let mut session = self.inner.session.lock().await;
            *session = None;
        }
        *self.inner.last_error.lock().await = None;
        self.inner.two_factor.lock().await.clear();
        self.inner.set_phase(FlowPhase::Initializing).await;

        let options = if self.inner.options.binding {
            options.binding(true)
        } else {
            options
        };
        match self.inner.service.init_sign_in(&options).await {
            Ok(session) => {
                *self.inner.session.lock().await = Some(session.clone());
                self.inner.set_phase(FlowPhase::AwaitingRedirect).await;
                if self.inner.options.auto_start && session.session_id.is_some() {
                    self.start().await;
                }
                Ok(session)
            }
            Err(err) => {
                self.inner.enter_failed(&err).await;
                Err(err)
            }
        }
    }

    /// Arm the confirmation polling loop.
    ///
    /// Returns `false` (and does nothing) when no session id exists or a
    /// polling task is already live, so two `start` calls never produce two
    /// timers.
    pub async fn start(&self) -> bool {
        let (session_id, binding) = {
            let session = self.inner.session.lock().await;
            match session.as_ref().and_then(|s| s.session_id.clone()) {
                Some(id) => (id, session.as_ref().map(|s| s.binding).unwrap_or(false)),
                None => return false,
            }
        };

        let mut task_slot = self.inner.poll_task.lock().await;
        if task_slot.as_ref().is_some_and(|task| !task.is_finished()) {
            return false;
        }

        let cancel = {
            let mut cancel = self.inner.cancel.lock().await;
            if cancel.is_cancelled() {
                *cancel = self.inner.root.child_token();
            }
            cancel.clone()
        };

        self.inner.set_phase(FlowPhase::Polling).await;
        let inner = self.inner.clone();
        *task_slot = Some(tokio::spawn(run_poll_loop(
            inner, cancel, session_id, binding,
        )));
        true
    }

    /// One manual confirmation attempt, outside the polling loop.
    ///
    /// Supersedes any active poll (its timer and token are torn down) and
    /// dispatches with a fresh cancellation token. Terminal responses apply
    /// the same transitions as a polling tick.
    ///
    /// # Errors
    ///
    /// [`AuthError::MissingSessionId`] without an initialized session;
    /// transport failures otherwise (recorded, not terminal).
    pub async fn confirm_auth(&self) -> Result<ConfirmPoll> {
        let (session_id, binding) = {
            let session = self.inner.session.lock().await;
            match session.as_ref().and_then(|s| s.session_id.clone()) {
                Some(id) => (id, session.as_ref().map(|s| s.binding).unwrap_or(false)),
                None => return Err(AuthError::MissingSessionId),
            }
        };
        self.stop_poll_task().await;
        let cancel = self.inner.current_token().await;

        let request = ConfirmRequest {
            session_id,
            binding,
            two_factor: None,
        };
        let poll = self.inner.service.confirm(&request, &cancel).await;
        match &poll {
            Ok(ConfirmPoll::Authorized { tokens, user }) => {
                self.inner
                    .finalize_success(tokens.clone(), user.clone())
                    .await;
            }
            Ok(ConfirmPoll::TwoFactorRequired { methods }) => {
                self.inner.enter_two_factor(methods.clone()).await;
            }
            Ok(ConfirmPoll::Aborted) => self.inner.abort_forced().await,
            Ok(ConfirmPoll::Pending) => {}
            Err(err) => self.inner.record_error(err).await,
        }
        poll
    }

    /// Authenticate with a payload the widget delivered directly (popup
    /// message path). Success and two-factor hand-off apply the same
    /// transitions as the polling loop.
    pub async fn handle_auth_result(&self, raw: &serde_json::Value) -> AuthOutcome {
        let outcome = self.inner.service.handle_auth_result(raw).await;
        self.inner.apply_outcome(&outcome).await;
        outcome
    }

    /// The two-factor hand-off, present while the flow is in
    /// `TwoFactorPending`.
    pub async fn two_factor_handoff(&self) -> Option<TwoFactorHandoff> {
        if *self.inner.phase.lock().await != FlowPhase::TwoFactorPending {
            return None;
        }
        let methods = self.inner.two_factor.lock().await.clone();
        let session = self.inner.session.lock().await;
        let session_id = session.as_ref().and_then(|s| s.session_id.clone())?;
        let binding = session.as_ref().map(|s| s.binding).unwrap_or(false);
        if methods.is_empty() {
            return None;
        }
        Some(TwoFactorHandoff {
            inner: self.inner.clone(),
            session_id,
            binding,
            methods,
        })
    }

    /// Complete the two-factor sub-flow with the chosen method kind.
    ///
    /// # Errors
    ///
    /// [`AuthError::InvalidState`] outside `TwoFactorPending`; otherwise the
    /// hand-off's confirmation errors.
    pub async fn confirm_two_factor(&self, kind: TwoFactorKind) -> Result<AuthUser> {
        let handoff = self.two_factor_handoff().await.ok_or_else(|| {
            AuthError::InvalidState("no two-factor confirmation is pending".into())
        })?;
        handoff.confirm(kind).await
    }

    /// Cancel the current attempt: stop polling, invalidate in-flight
    /// requests, and install a fresh token so a later `start` or
    /// `confirm_auth` is not pre-cancelled. Idempotent; never an error.
    pub async fn abort_auth(&self) {
        self.stop_poll_task().await;
        {
            let mut session = self.inner.session.lock().await;
            *session = None;
        }
        self.inner.two_factor.lock().await.clear();
        self.inner.abort_forced().await;
    }

    /// Cancel the live token (waking the polling task, which observes the
    /// cancellation and winds down), install a replacement, and wait for the
    /// task to finish so no timer outlives this call.
    async fn stop_poll_task(&self) {
        let task = self.inner.poll_task.lock().await.take();
        self.inner.replace_cancel_token().await;
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Hand-off into the two-factor sub-flow.
///
/// Captures the session id and the methods the backend advertised. One
/// successful [`confirm`](Self::confirm) finalizes authentication; the
/// orchestrator never retries this path on its own.
pub struct TwoFactorHandoff {
    inner: Arc<FlowInner>,
    session_id: String,
    binding: bool,
    methods: Vec<TwoFactorMethod>,
}

impl TwoFactorHandoff {
    pub fn methods(&self) -> &[TwoFactorMethod] {
        &self.methods
    }

    /// One confirm call scoped to the chosen method.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnsupportedMethod`] when the backend never advertised
    /// `kind`; [`AuthError::Aborted`] on cancellation;
    /// [`AuthError::InvalidState`] when the backend does not accept the
    /// factor.
    pub async fn confirm(&self, kind: TwoFactorKind) -> Result<AuthUser> {
        if !self.methods.iter().any(|method| method.kind == kind) {
            return Err(AuthError::UnsupportedMethod(kind.to_string()));
        }
        let cancel = self.inner.current_token().await;
        let request = ConfirmRequest {
            session_id: self.session_id.clone(),
            binding: self.binding,
            two_factor: Some(kind),
        };
        match self.inner.service.confirm(&request, &cancel).await? {
            ConfirmPoll::Authorized { tokens, user } => {
                self.inner
                    .finalize_success(tokens, user.clone())
                    .await;
                Ok(user)
            }
            ConfirmPoll::Aborted => Err(AuthError::Aborted),
            ConfirmPoll::Pending | ConfirmPoll::TwoFactorRequired { .. } => Err(
                AuthError::InvalidState("two-factor confirmation was not accepted".into()),
            ),
        }
    }
}

/// Bounded confirmation polling.
///
/// The first attempt fires immediately, then one per interval. A budget of N
/// issues at most N confirm calls; the exhaustion check happens at the tick
/// boundary before dispatching. Tick-level request failures are absorbed into
/// the budget; one bad tick never kills the timer.
async fn run_poll_loop(
    inner: Arc<FlowInner>,
    cancel: CancellationToken,
    session_id: String,
    binding: bool,
) {
    let mut ticker = interval(inner.options.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let budget = match inner.options.retry_limit {
        RetryLimit::Bounded(n) => Some(n),
        RetryLimit::Unbounded => None,
    };
    let mut remaining = budget;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                inner.abort_from_poll().await;
                return;
            }
            _ = ticker.tick() => {}
        }

        if remaining == Some(0) {
            inner
                .enter_failed(&AuthError::RetriesExhausted {
                    attempts: budget.unwrap_or(0),
                })
                .await;
            return;
        }
        if let Some(n) = remaining.as_mut() {
            *n -= 1;
        }

        let request = ConfirmRequest {
            session_id: session_id.clone(),
            binding,
            two_factor: None,
        };
        match inner.service.confirm(&request, &cancel).await {
            Ok(ConfirmPoll::Pending) => continue,
            Ok(ConfirmPoll::Authorized { tokens, user }) => {
                inner.finalize_success(tokens, user).await;
                return;
            }
            Ok(ConfirmPoll::TwoFactorRequired { methods }) => {
                inner.enter_two_factor(methods).await;
                return;
            }
            Ok(ConfirmPoll::Aborted) => {
                inner.abort_from_poll().await;
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "confirm attempt failed; will retry");
                inner.record_error(&err).await;
                continue;
            }
        }
    }
}

/// One bridge subscription for the orchestrator's lifetime. Forwards only
/// payloads shaped `{"telegram_auth": …}`; exits when the root token cancels.
fn spawn_message_listener(inner: Arc<FlowInner>, root: CancellationToken, bridge: LoginBridge) {
    let mut events = bridge.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = root.cancelled() => return,
                event = events.recv() => match event {
                    Ok(value) => {
                        if let Some(payload) = value.get("telegram_auth") {
                            let outcome = inner.service.handle_auth_result(payload).await;
                            inner.apply_outcome(&outcome).await;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                },
            }
        }
    });
}
