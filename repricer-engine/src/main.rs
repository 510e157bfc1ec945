//! Repricing engine entry point
//!
//! Each subcommand is one discrete cycle or operation; a scheduler
//! (cron, systemd timer) invokes `reduce` and `sync` on its own cadence.

use clap::{Parser, Subcommand};
use dotenv::dotenv;
use tracing::{debug, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use credential_vault::DeveloperKeys;
use repricer_engine::build_postgres_engine;

/// Command line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one price reduction cycle over all monitored listings
    Reduce,
    /// Reconcile one user's listings against the marketplace
    Sync {
        /// User to reconcile
        #[clap(long)]
        user: Uuid,
        /// Run even inside the freshness window
        #[clap(long)]
        force: bool,
    },
    /// Store marketplace developer keys for a user
    Keys {
        #[clap(long)]
        user: Uuid,
        #[clap(long)]
        app_id: String,
        #[clap(long)]
        client_secret: String,
        #[clap(long)]
        dev_id: Option<String>,
    },
    /// Begin the marketplace OAuth flow; prints the authorization URL
    Connect {
        #[clap(long)]
        user: Uuid,
    },
    /// Complete the marketplace OAuth flow from the callback parameters
    Callback {
        #[clap(long)]
        code: String,
        #[clap(long)]
        state: String,
    },
    /// Disconnect a user's marketplace connection
    Disconnect {
        #[clap(long)]
        user: Uuid,
    },
    /// Show a user's connection status
    Status {
        #[clap(long)]
        user: Uuid,
    },
    /// Configure monitoring for a listing
    Monitor {
        #[clap(long)]
        listing: Uuid,
        /// Floor price; reductions never go below it
        #[clap(long)]
        floor: rust_decimal::Decimal,
        #[clap(long)]
        strategy: Option<Uuid>,
        #[clap(long)]
        enabled: bool,
    },
    /// Flip vacation mode for a user
    Vacation {
        #[clap(long)]
        user: Uuid,
        /// true pauses every listing of the user, false resumes
        #[clap(long)]
        enabled: bool,
    },
    /// Print the price history of a listing
    History {
        #[clap(long)]
        listing: Uuid,
    },
    /// Preview what a strategy would do to a listing
    Preview {
        #[clap(long)]
        listing: Uuid,
        #[clap(long)]
        strategy: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize tracing with debug level if DEBUG=1 in .env
    let env_debug = std::env::var("DEBUG").unwrap_or_else(|_| "0".to_string());
    let log_level = if env_debug == "1" { Level::DEBUG } else { Level::INFO };

    let env_filter = EnvFilter::builder()
        .with_default_directive(log_level.into())
        .parse("listing_sync=debug,reduction_scheduler=debug,marketplace_client=debug")
        .unwrap();

    let subscriber = FmtSubscriber::builder().with_env_filter(env_filter).finish();
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        info!("Tracing initialized");
        if env_debug == "1" {
            debug!("Debug logging enabled");
        }
    }

    let pool = common::db::init_db_pool().await?;
    common::db::run_migrations(&pool).await?;

    let engine = build_postgres_engine(pool)?;

    match args.command {
        Command::Reduce => {
            let report = engine.trigger_reduction_cycle().await?;
            println!(
                "processed={} reduced={} skipped={} failed={}",
                report.processed, report.reduced, report.skipped, report.failed
            );
        }
        Command::Sync { user, force } => {
            if force {
                let report = engine.synchronizer().reconcile(user).await?;
                println!(
                    "imported={} updated={} closed={} errors={}",
                    report.imported, report.updated, report.closed, report.errors
                );
            } else {
                match engine.trigger_reconciliation(user).await? {
                    Some(report) => println!(
                        "imported={} updated={} closed={} errors={}",
                        report.imported, report.updated, report.closed, report.errors
                    ),
                    None => println!("skipped: reconciliation is fresh"),
                }
            }
        }
        Command::Keys {
            user,
            app_id,
            client_secret,
            dev_id,
        } => {
            engine
                .store_developer_keys(
                    user,
                    DeveloperKeys {
                        app_id,
                        client_secret,
                        dev_id,
                    },
                )
                .await?;
            println!("developer keys stored");
        }
        Command::Connect { user } => {
            let request = engine.connect_marketplace(user).await?;
            println!("{}", request.url);
        }
        Command::Callback { code, state } => {
            let user = engine.handle_oauth_callback(&code, &state).await?;
            println!("connected user {}", user);
        }
        Command::Disconnect { user } => {
            engine.disconnect_marketplace(user).await?;
            println!("disconnected user {}", user);
        }
        Command::Status { user } => match engine.connection_status(user).await? {
            Some(info) => println!(
                "status={} username={} token_expires={}",
                info.status.as_str(),
                info.marketplace_username.as_deref().unwrap_or("-"),
                info.access_token_expires_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string())
            ),
            None => println!("no marketplace credentials on file"),
        },
        Command::Monitor {
            listing,
            floor,
            strategy,
            enabled,
        } => {
            engine
                .configure_monitoring(listing, floor, strategy, enabled)
                .await?;
            println!("monitoring configured");
        }
        Command::Vacation { user, enabled } => {
            let settings = engine.set_vacation_mode(user, enabled).await?;
            println!("vacation_mode={}", settings.vacation_mode);
        }
        Command::History { listing } => {
            let events = engine.price_history(listing).await?;
            for event in events {
                println!(
                    "{} {} -> {} ({})",
                    event.created_at.to_rfc3339(),
                    event.old_price,
                    event.new_price,
                    event.trigger.as_str()
                );
            }
        }
        Command::Preview { listing, strategy } => {
            let computation = engine.compute_strategy_preview(listing, strategy).await?;
            println!(
                "new_price={} applied={} reason={}",
                computation.new_price, computation.applied, computation.reason
            );
        }
    }

    Ok(())
}
