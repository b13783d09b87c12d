//! CLI entry point for tglogin.

pub mod login;

use clap::{Parser, Subcommand};

/// tglogin CLI
#[derive(Parser, Debug)]
#[command(name = "tglogin", version, about = "Telegram sign-in SDK CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in through a Telegram bot
    Login(LoginArgs),
    /// Show stored credential status
    Status,
    /// Remove stored credentials
    Logout,
}

/// Arguments for `tglogin login`.
#[derive(Parser, Debug)]
pub struct LoginArgs {
    /// Bot username to authenticate against
    pub bot_name: String,
    /// Backend API base URL (defaults to TGLOGIN_API_BASE)
    #[arg(long)]
    pub api_base: Option<String>,
    /// Redirect URL registered with the bot
    #[arg(long)]
    pub redirect_url: Option<String>,
    /// Link an existing account instead of signing in
    #[arg(long)]
    pub binding: bool,
}
