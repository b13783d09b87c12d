//! tglogin: Telegram sign-in SDK for Rust clients
//!
//! A pluggable auth layer over a backend API: widget-based Telegram sign-in
//! with polling confirmation, two-factor authentication (email/SMS/TOTP/
//! Telegram), password auth, token persistence, and an analytics event sink.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use tglogin::config::{Endpoints, FlowOptions};
//! use tglogin::orchestrator::SignInOrchestrator;
//! use tglogin::service::TelegramAuthService;
//! use tglogin::session::SignInOptions;
//! use tglogin::state::AuthStateHandle;
//!
//! # async fn example() -> tglogin::error::Result<()> {
//! let service = Arc::new(TelegramAuthService::new(Endpoints::new("https://api.example.com")));
//! let flow = SignInOrchestrator::new(service, AuthStateHandle::new(), FlowOptions::default());
//!
//! let session = flow.init_sign_in(SignInOptions::new("demo_bot")).await?;
//! println!("open {}", session.auth_url);
//! flow.start().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod fingerprint;
pub mod orchestrator;
pub mod password;
pub mod payload;
pub mod prelude;
pub mod service;
pub mod session;
pub mod state;
pub mod token;
pub mod token_store;
pub mod two_factor;
pub mod widget;

#[cfg(feature = "cli")]
pub mod cli;
