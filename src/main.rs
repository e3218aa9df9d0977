use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};

use pw_announcer::config;
use pw_announcer::ledger;
use pw_announcer::model::TokenExpiry;
use pw_announcer::platform::PwClient;
use pw_announcer::sinks;
use pw_announcer::watcher;

#[derive(Debug, Parser)]
#[command(author, version, about = "Watch PW batches and forward new announcements to chat sinks")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();

    if !args.config.is_file() {
        fs::write(&args.config, config::example())?;
        bail!(
            "no config found; wrote a template to {}. Fill in the token, sinks and tracked batch ids, then run again",
            args.config.display()
        );
    }

    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    if cfg.platform.token_is_placeholder() {
        bail!("platform.token is not set; paste a real access token into the config file");
    }
    if cfg.sinks.none_configured() {
        bail!("no notification sinks configured; set sinks.discord_webhook_url and/or sinks.telegram");
    }
    if cfg.platform.tracked_batch_ids.is_empty() {
        bail!("platform.tracked_batch_ids is empty; run the list-batches tool and copy in the ids to track");
    }

    if let Some(deadline_ms) = cfg.platform.token_expires_at_ms {
        let estimate = TokenExpiry::from_deadline_ms(deadline_ms, Utc::now());
        if estimate.expired {
            warn!("config says the access token is past its expiry deadline; the platform has the last word");
        } else {
            info!(days_remaining = estimate.days_remaining, "access token expiry estimate");
        }
    }

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/announcer.db", cfg.app.data_dir));
    let pool = ledger::init_pool(&database_url).await?;
    ledger::run_migrations(&pool).await?;

    let client = PwClient::from_config(&cfg.platform)?;
    let sinks = sinks::from_config(&cfg.sinks);

    watcher::run_loop(&args.config, cfg, &client, &pool, &sinks).await
}
