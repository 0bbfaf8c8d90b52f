//! Campus Connect CLI - Database migrations and vendor management.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! campus-cli migrate
//!
//! # Register a vendor
//! campus-cli vendor create -n "North Canteen" -l "Block A"
//!
//! # List vendors
//! campus-cli vendor list
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "campus-cli")]
#[command(author, version, about = "Campus Connect CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage vendors
    Vendor {
        #[command(subcommand)]
        action: VendorAction,
    },
}

#[derive(Subcommand)]
enum VendorAction {
    /// Register a new vendor
    Create {
        /// Vendor display name (unique)
        #[arg(short, long)]
        name: String,

        /// Where on campus the vendor is
        #[arg(short, long)]
        location: Option<String>,
    },
    /// List all vendors
    List,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Vendor { action } => match action {
            VendorAction::Create { name, location } => {
                commands::vendor::create(&name, location.as_deref()).await?;
            }
            VendorAction::List => commands::vendor::list().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vendor_create() {
        let cli = Cli::try_parse_from([
            "campus-cli",
            "vendor",
            "create",
            "--name",
            "North Canteen",
            "-l",
            "Block A",
        ])
        .unwrap();
        match cli.command {
            Commands::Vendor {
                action: VendorAction::Create { name, location },
            } => {
                assert_eq!(name, "North Canteen");
                assert_eq!(location.as_deref(), Some("Block A"));
            }
            _ => panic!("expected vendor create"),
        }
    }

    #[test]
    fn test_vendor_create_requires_name() {
        assert!(Cli::try_parse_from(["campus-cli", "vendor", "create"]).is_err());
    }

    #[test]
    fn test_parse_migrate() {
        let cli = Cli::try_parse_from(["campus-cli", "migrate"]).unwrap();
        assert!(matches!(cli.command, Commands::Migrate));
    }
}
