//! Two-factor authentication methods.
//!
//! Email, SMS and TOTP verify a short code delivered over a side channel; the
//! Telegram method routes through the login widget instead: "sending a code"
//! means presenting the login surface, and "verifying" means forwarding the
//! widget payload to the backend.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use strum::{Display, EnumString};

use crate::config::Endpoints;
use crate::error::{AuthError, Result};
use crate::events::{AuthEvent, EventSink, SharedSink, TracingSink};
use crate::payload::LoginPayload;
use crate::service::OutcomeResponse;
use crate::session::AuthOutcome;
use crate::widget::LoginWidget;

/// Supported second factors.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TwoFactorKind {
    Email,
    Sms,
    Totp,
    Telegram,
}

/// A configured second-factor method for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: TwoFactorKind,
    /// Masked delivery target (e-mail address, phone number); absent for
    /// TOTP and Telegram.
    #[serde(default)]
    pub destination: Option<String>,
}

/// Backend client for two-factor verification and first-time setup.
pub struct TwoFactorService {
    client: reqwest::Client,
    endpoints: Endpoints,
    widget: Arc<dyn LoginWidget>,
    sink: SharedSink,
}

impl TwoFactorService {
    pub fn new(endpoints: Endpoints, widget: Arc<dyn LoginWidget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints,
            widget,
            sink: Arc::new(TracingSink),
        }
    }

    pub fn with_event_sink(mut self, sink: SharedSink) -> Self {
        self.sink = sink;
        self
    }

    /// Trigger code delivery for a method.
    ///
    /// For the Telegram method no code exists; the login surface is presented
    /// instead.
    ///
    /// # Errors
    ///
    /// Transport failures for code-channel methods;
    /// [`AuthError::WidgetUnavailable`] when no login surface is configured.
    pub async fn send_code(&self, method: &TwoFactorMethod) -> Result<()> {
        match method.kind {
            TwoFactorKind::Telegram => self.widget.present(),
            _ => {
                let url = self.endpoints.two_factor_url("/send");
                let resp = self
                    .client
                    .post(url)
                    .json(&json!({ "methodId": method.id }))
                    .send()
                    .await?;
                if !resp.status().is_success() {
                    return Err(AuthError::api(
                        resp.status().as_u16(),
                        "two-factor code delivery rejected",
                    ));
                }
                Ok(())
            }
        }
    }

    /// Verify a second factor during login.
    ///
    /// `code` is required for code-channel methods and ignored for Telegram,
    /// where the widget payload is the proof. Failures (including widget
    /// failures) map to [`AuthOutcome::Denied`], never a panic.
    pub async fn verify_code(&self, code: Option<&str>, method: &TwoFactorMethod) -> AuthOutcome {
        match method.kind {
            TwoFactorKind::Telegram => match self.verify_telegram(method).await {
                Ok(outcome) => outcome,
                Err(err) => AuthOutcome::denied(err.to_string()),
            },
            _ => {
                let Some(code) = code else {
                    return AuthOutcome::denied("verification code required");
                };
                let url = self.endpoints.two_factor_url("/verify");
                self.post_outcome(url, &json!({ "methodId": method.id, "code": code }))
                    .await
            }
        }
    }

    /// Verify the Telegram method: authenticate via the widget and forward
    /// the payload to the Telegram-specific verify endpoint.
    ///
    /// # Errors
    ///
    /// [`AuthError::UnsupportedMethod`] when handed a non-Telegram method.
    pub async fn verify_telegram(&self, method: &TwoFactorMethod) -> Result<AuthOutcome> {
        if method.kind != TwoFactorKind::Telegram {
            return Err(AuthError::UnsupportedMethod(method.kind.to_string()));
        }
        let payload = match self.widget.authenticate().await {
            Ok(payload) => payload,
            Err(err) => {
                self.sink.log(
                    AuthEvent::new("two_factor_widget_failed")
                        .with_detail(json!({ "reason": err.to_string() })),
                );
                return Ok(AuthOutcome::denied(err.to_string()));
            }
        };
        let url = self.endpoints.two_factor_url("/verify/telegram");
        Ok(self
            .post_outcome(url, &TelegramProofBody::new(&method.id, &payload))
            .await)
    }

    /// Register a new second-factor method for the account.
    ///
    /// Code-channel methods get a code sent to `destination`; the Telegram
    /// method presents the login surface for the link step.
    pub async fn setup_method(
        &self,
        kind: TwoFactorKind,
        destination: Option<&str>,
    ) -> Result<TwoFactorMethod> {
        if kind == TwoFactorKind::Telegram {
            self.widget.present()?;
        }
        let url = self.endpoints.two_factor_url("/setup");
        let resp = self
            .client
            .post(url)
            .json(&json!({ "type": kind, "destination": destination }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(AuthError::api(
                resp.status().as_u16(),
                "two-factor setup rejected",
            ));
        }
        let setup: SetupResponse = resp
            .json()
            .await
            .map_err(|err| AuthError::InvalidResponse(err.to_string()))?;
        Ok(TwoFactorMethod {
            id: setup.method_id,
            kind,
            destination: destination.map(str::to_string),
        })
    }

    /// Complete first-time setup of a method.
    ///
    /// Same choreography as [`verify_code`](Self::verify_code): a code proves
    /// code-channel methods, the widget payload proves Telegram.
    pub async fn confirm_method_setup(
        &self,
        method: &TwoFactorMethod,
        code: Option<&str>,
    ) -> AuthOutcome {
        let url = self.endpoints.two_factor_url("/setup/confirm");
        match method.kind {
            TwoFactorKind::Telegram => {
                let payload = match self.widget.authenticate().await {
                    Ok(payload) => payload,
                    Err(err) => return AuthOutcome::denied(err.to_string()),
                };
                self.post_outcome(url, &TelegramProofBody::new(&method.id, &payload))
                    .await
            }
            _ => {
                let Some(code) = code else {
                    return AuthOutcome::denied("verification code required");
                };
                self.post_outcome(url, &json!({ "methodId": method.id, "code": code }))
                    .await
            }
        }
    }

    async fn post_outcome<B: Serialize>(&self, url: String, body: &B) -> AuthOutcome {
        let resp = match self.client.post(url).json(body).send().await {
            Ok(resp) => resp,
            Err(err) => return AuthOutcome::denied(err.to_string()),
        };
        if !resp.status().is_success() {
            return AuthOutcome::denied(format!("rejected with status {}", resp.status()));
        }
        match resp.json::<OutcomeResponse>().await {
            Ok(outcome) => outcome.into_outcome(),
            Err(err) => AuthOutcome::denied(err.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TelegramProofBody<'a> {
    method_id: &'a str,
    telegram_data: &'a LoginPayload,
}

impl<'a> TelegramProofBody<'a> {
    fn new(method_id: &'a str, telegram_data: &'a LoginPayload) -> Self {
        Self {
            method_id,
            telegram_data,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetupResponse {
    method_id: String,
}
