use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use linkalert_client::{GoogleAnalyticsSource, OAuthCredentials, PostmarkNotifier};
use linkalert_core::models::{RunStatus, RunSummary};
use linkalert_core::traits::{AccountStore, Notifier, NullNotifier};
use linkalert_core::{RunConfig, RunCoordinator};
use linkalert_db::{Database, DatabaseConfig};

/// One year.
const MAX_INTERVAL_HOURS: u64 = 8760;

#[derive(Parser)]
#[command(
    name = "linkalert",
    version,
    about = "Daily alerts for new referring links from Google Analytics"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store the OAuth refresh token, creating the account if needed
    Init {
        /// Refresh token from the Google OAuth consent flow
        #[arg(long, env = "GOOGLE_REFRESH_TOKEN")]
        refresh_token: String,
    },

    /// Run discovery once over the window since the last checkpoint
    Run {
        #[command(flatten)]
        google: GoogleArgs,

        #[command(flatten)]
        mail: MailArgs,

        /// Discover and record links but send no email
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Run discovery repeatedly until interrupted
    Watch {
        #[command(flatten)]
        google: GoogleArgs,

        #[command(flatten)]
        mail: MailArgs,

        /// Hours between runs (1 to 8760)
        #[arg(long, default_value_t = 24, value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_HOURS))]
        interval_hours: u64,

        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Show checkpoint, subscribers, and tracked profiles
    Status,

    /// Manage tracked analytics profiles
    Profiles {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Manage digest recipients
    Emails {
        #[command(subcommand)]
        action: EmailAction,
    },

    /// Delete the account. Seen links are kept.
    Reset {
        /// Confirm deletion
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List every profile the stored credentials can read
    Available {
        #[command(flatten)]
        google: GoogleArgs,
    },

    /// Start tracking a profile
    Add {
        /// Analytics profile (view) id
        profile_id: String,

        /// Display name; looked up from Analytics if omitted
        #[arg(long)]
        name: Option<String>,

        #[command(flatten)]
        google: OptionalGoogleArgs,
    },

    /// Stop tracking a profile
    Remove { profile_id: String },
}

#[derive(Subcommand)]
enum EmailAction {
    /// Replace the recipient list
    Set {
        /// Recipient addresses; pass none to clear the list
        emails: Vec<String>,
    },
}

#[derive(Args, Clone)]
struct GoogleArgs {
    /// OAuth client id
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    client_id: String,

    /// OAuth client secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: String,
}

/// Google credentials that are only needed for some invocations.
#[derive(Args, Clone)]
struct OptionalGoogleArgs {
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
}

impl OptionalGoogleArgs {
    fn require(self) -> Result<GoogleArgs> {
        Ok(GoogleArgs {
            client_id: self
                .client_id
                .context("GOOGLE_CLIENT_ID not set. Required to look up the profile name.")?,
            client_secret: self
                .client_secret
                .context("GOOGLE_CLIENT_SECRET not set. Required to look up the profile name.")?,
        })
    }
}

#[derive(Args, Clone)]
struct MailArgs {
    /// Postmark server token
    #[arg(long, env = "POSTMARK_API_KEY", hide_env_values = true)]
    postmark_api_key: Option<String>,

    /// Verified sender address
    #[arg(long, env = "POSTMARK_FROM")]
    postmark_from: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("linkalert=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db = connect_db().await?;

    match cli.command {
        Commands::Init { refresh_token } => cmd_init(&db, &refresh_token).await?,
        Commands::Run {
            google,
            mail,
            dry_run,
        } => {
            let summary = cmd_run(&db, &google, &mail, dry_run).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if let Some(delivery) = summary.delivery.as_ref().filter(|d| !d.all_delivered()) {
                tracing::warn!(
                    failed = delivery.failed.len(),
                    delivered = delivery.delivered.len(),
                    "Digest did not reach every recipient"
                );
            }
            if summary.status == RunStatus::PartiallyFailed {
                anyhow::bail!(
                    "{} profile(s) failed; checkpoint not advanced",
                    summary.profiles_failed
                );
            }
        }
        Commands::Watch {
            google,
            mail,
            interval_hours,
            dry_run,
        } => cmd_watch(&db, &google, &mail, interval_hours, dry_run).await?,
        Commands::Status => cmd_status(&db).await?,
        Commands::Profiles { action } => cmd_profiles(&db, action).await?,
        Commands::Emails {
            action: EmailAction::Set { emails },
        } => {
            let account = db
                .account()
                .set_emails(&emails)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Recipients: {}", format_list(&account.emails));
        }
        Commands::Reset { yes } => {
            if !yes {
                anyhow::bail!("Refusing to delete the account without --yes");
            }
            db.account().delete().await.map_err(|e| anyhow::anyhow!(e))?;
            println!("Account deleted. Seen links were kept.");
        }
    }

    Ok(())
}

/// Connect to PostgreSQL using DATABASE_URL and apply migrations.
async fn connect_db() -> Result<Database> {
    let config = DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;
    let db = Database::connect(&config)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(db)
}

/// Build the Analytics client from CLI credentials and the stored refresh token.
async fn analytics_source(db: &Database, google: &GoogleArgs) -> Result<GoogleAnalyticsSource> {
    let refresh_token = db
        .account()
        .refresh_token()
        .await
        .map_err(|e| anyhow::anyhow!(e))?
        .context("Account not initialized. Run `linkalert init` first.")?;

    let credentials = OAuthCredentials::new(&google.client_id, &google.client_secret, refresh_token);
    GoogleAnalyticsSource::new(credentials).map_err(|e| anyhow::anyhow!(e))
}

async fn cmd_init(db: &Database, refresh_token: &str) -> Result<()> {
    let account = db
        .account()
        .initialize(refresh_token)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    println!("Account ready ({} profile(s) tracked)", account.profiles.len());
    Ok(())
}

async fn cmd_run(
    db: &Database,
    google: &GoogleArgs,
    mail: &MailArgs,
    dry_run: bool,
) -> Result<RunSummary> {
    let source = analytics_source(db, google).await?;
    let config = RunConfig::from_env().map_err(|e| anyhow::anyhow!(e))?;

    if dry_run {
        return execute(db, source, NullNotifier, config).await;
    }

    let token = mail
        .postmark_api_key
        .as_deref()
        .context("POSTMARK_API_KEY not set. Required unless --dry-run is given.")?;
    let from = mail
        .postmark_from
        .as_deref()
        .context("POSTMARK_FROM not set. Required unless --dry-run is given.")?;
    let notifier = PostmarkNotifier::new(token, from).map_err(|e| anyhow::anyhow!(e))?;

    execute(db, source, notifier, config).await
}

async fn execute<N: Notifier>(
    db: &Database,
    source: GoogleAnalyticsSource,
    notifier: N,
    config: RunConfig,
) -> Result<RunSummary> {
    let coordinator = RunCoordinator::new(source, db.seen_links(), db.account(), notifier, config);
    coordinator.execute().await.map_err(|e| anyhow::anyhow!(e))
}

async fn cmd_watch(
    db: &Database,
    google: &GoogleArgs,
    mail: &MailArgs,
    interval_hours: u64,
    dry_run: bool,
) -> Result<()> {
    let interval = Duration::from_secs(interval_hours * 3600);
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown.cancel();
        }
    });

    tracing::info!(interval_hours, "Watching for new links");

    loop {
        // A failed run is retried on the next tick from the same checkpoint.
        match cmd_run(db, google, mail, dry_run).await {
            Ok(summary) => tracing::info!(
                status = summary.status.as_str(),
                new_links = summary.total_new_links,
                "Scheduled run finished"
            ),
            Err(e) => tracing::error!(error = %e, "Scheduled run failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::info!("Watch stopped");
    Ok(())
}

async fn cmd_status(db: &Database) -> Result<()> {
    db.health_check().await.map_err(|e| anyhow::anyhow!(e))?;
    println!("Database:     ok");

    let Some(account) = db
        .account()
        .snapshot()
        .await
        .map_err(|e| anyhow::anyhow!(e))?
    else {
        println!("No account. Run `linkalert init` first.");
        return Ok(());
    };

    let checkpoint = account
        .last_checked
        .map_or_else(|| "never".to_string(), |d| d.to_string());
    println!("Last checked: {checkpoint}");
    println!("Recipients:   {}", format_list(&account.emails));
    println!("Profiles:");

    if account.profiles.is_empty() {
        println!("  (none)");
    }
    let seen = db.seen_links();
    for (id, name) in &account.profiles {
        let count = seen
            .count_for_profile(id)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;
        println!("  {id}  {name}  ({count} links seen)");
    }

    Ok(())
}

async fn cmd_profiles(db: &Database, action: ProfileAction) -> Result<()> {
    match action {
        ProfileAction::Available { google } => {
            let source = analytics_source(db, &google).await?;
            let tracked = db
                .account()
                .get_profiles()
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            let profiles = source
                .available_profiles()
                .await
                .map_err(|e| anyhow::anyhow!(e))?;

            for profile in profiles {
                let marker = if tracked.contains_key(&profile.id) { "*" } else { " " };
                println!(
                    "{marker} {}  {}  {}",
                    profile.id,
                    profile.name,
                    profile.website_url.as_deref().unwrap_or("")
                );
            }
        }
        ProfileAction::Add {
            profile_id,
            name,
            google,
        } => {
            let name = match name {
                Some(name) => name,
                None => {
                    let source = analytics_source(db, &google.require()?).await?;
                    source
                        .available_profiles()
                        .await
                        .map_err(|e| anyhow::anyhow!(e))?
                        .into_iter()
                        .find(|p| p.id == profile_id)
                        .map(|p| p.name)
                        .with_context(|| {
                            format!("Profile {profile_id} is not visible to these credentials")
                        })?
                }
            };

            let account = db
                .account()
                .upsert_profile(&profile_id, &name)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Tracking {profile_id} ({name}); {} profile(s) total", account.profiles.len());
        }
        ProfileAction::Remove { profile_id } => {
            let account = db
                .account()
                .remove_profile(&profile_id)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
            println!("Stopped tracking {profile_id}; {} profile(s) left", account.profiles.len());
        }
    }

    Ok(())
}

fn format_list(items: &[String]) -> String {
    if items.is_empty() {
        "(none)".to_string()
    } else {
        items.join(", ")
    }
}
