//! CLI command handlers for login, status, and logout.

use std::io::Write;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::Endpoints;
use crate::service::TelegramAuthService;
use crate::session::{ConfirmPoll, ConfirmRequest, SignInOptions};
use crate::token_store::{FileTokenStore, StoredCredentials, TokenStore};
use crate::two_factor::TwoFactorMethod;

use super::LoginArgs;

const POLL_INTERVAL: Duration = Duration::from_secs(3);
const MAX_ATTEMPTS: u32 = 100;

/// Handle `tglogin login <bot_name>`.
pub async fn handle_login(args: &LoginArgs) -> Result<(), Box<dyn std::error::Error>> {
    let endpoints = match &args.api_base {
        Some(base) => Endpoints::new(base.clone()),
        None => Endpoints::from_env(),
    };
    let service = TelegramAuthService::new(endpoints);

    let mut options = SignInOptions::new(&args.bot_name).binding(args.binding);
    if let Some(redirect) = &args.redirect_url {
        options = options.with_redirect_url(redirect.clone());
    }
    let session = service.init_sign_in(&options).await?;

    println!("🔗 Open: {}", session.auth_url);
    if let Some(code) = &session.code {
        println!("📋 Confirmation code: {code}");
    }
    if let Some(link) = &session.link_to_bot {
        println!("🤖 Or open the bot directly: {link}");
    }

    let Some(session_id) = session.session_id.clone() else {
        println!("⚠️  Backend unavailable; open the link above and retry once it is back.");
        return Ok(());
    };
    println!("⏳ Waiting for confirmation...");

    let cancel = CancellationToken::new();
    let request = ConfirmRequest::new(session_id.clone()).binding(args.binding);
    for _ in 0..MAX_ATTEMPTS {
        match service.confirm(&request, &cancel).await {
            Ok(ConfirmPoll::Pending) => {
                tokio::time::sleep(POLL_INTERVAL).await;
            }
            Ok(ConfirmPoll::Authorized { tokens, user }) => {
                let store = FileTokenStore::new_default();
                store.save(
                    "default",
                    &StoredCredentials {
                        tokens,
                        user: Some(user.clone()),
                    },
                )?;
                println!(
                    "✅ Signed in as {}",
                    user.username.or(user.first_name).unwrap_or(user.id)
                );
                return Ok(());
            }
            Ok(ConfirmPoll::TwoFactorRequired { methods }) => {
                return confirm_second_factor(&service, &session_id, args.binding, &methods).await;
            }
            Ok(ConfirmPoll::Aborted) => {
                eprintln!("❌ Sign-in aborted");
                std::process::exit(1);
            }
            Err(err) => {
                eprintln!("⚠️  Confirmation attempt failed: {err}");
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
    }

    eprintln!("❌ Confirmation timed out, please try again");
    std::process::exit(1);
}

async fn confirm_second_factor(
    service: &TelegramAuthService,
    session_id: &str,
    binding: bool,
    methods: &[TwoFactorMethod],
) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔐 A second factor is required:");
    for (index, method) in methods.iter().enumerate() {
        match &method.destination {
            Some(destination) => println!("  {}. {} ({destination})", index + 1, method.kind),
            None => println!("  {}. {}", index + 1, method.kind),
        }
    }
    print!("Pick a method [1-{}]: ", methods.len());
    std::io::stdout().flush()?;

    let mut choice = String::new();
    std::io::stdin().read_line(&mut choice)?;
    let index: usize = choice.trim().parse()?;
    let method = methods
        .get(index.saturating_sub(1))
        .ok_or("no such method")?;

    let cancel = CancellationToken::new();
    let request = ConfirmRequest::new(session_id)
        .binding(binding)
        .with_two_factor(method.kind);
    match service.confirm(&request, &cancel).await? {
        ConfirmPoll::Authorized { tokens, user } => {
            let store = FileTokenStore::new_default();
            store.save(
                "default",
                &StoredCredentials {
                    tokens,
                    user: Some(user.clone()),
                },
            )?;
            println!(
                "✅ Signed in as {}",
                user.username.or(user.first_name).unwrap_or(user.id)
            );
            Ok(())
        }
        _ => {
            eprintln!("❌ Second factor was not accepted");
            std::process::exit(1);
        }
    }
}

/// Handle `tglogin status`.
pub async fn handle_status() -> Result<(), Box<dyn std::error::Error>> {
    let store = FileTokenStore::new_default();
    match store.load("default")? {
        Some(credentials) => {
            let who = credentials
                .user
                .and_then(|user| user.username.or(user.first_name))
                .unwrap_or_else(|| "unknown user".to_string());
            let expiry = match credentials.tokens.expires_at {
                Some(at) => format!("expires {}", at.format("%Y-%m-%d %H:%M")),
                None => "no known expiry".to_string(),
            };
            println!("✅ Signed in as {who} ({expiry})");
        }
        None => println!("❌ Not signed in"),
    }
    Ok(())
}

/// Handle `tglogin logout`.
pub async fn handle_logout() -> Result<(), Box<dyn std::error::Error>> {
    let store = FileTokenStore::new_default();
    store.clear("default")?;
    println!("✅ Signed out");
    Ok(())
}
