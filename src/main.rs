//! tglogin CLI binary entry point.

use clap::Parser;
use tglogin::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Login(args) => tglogin::cli::login::handle_login(&args).await,
        Commands::Status => tglogin::cli::login::handle_status().await,
        Commands::Logout => tglogin::cli::login::handle_logout().await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
