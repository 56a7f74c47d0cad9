//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use url::Url;

use rosterboard_core::pipeline::{
    ProgressReporter, ReconcileConfig, ReconcileResult, reconcile,
};
use rosterboard_roster::RosterInput;
use rosterboard_shared::{
    AppConfig, EmbedLimits, WorldId, init_config, load_config, resolve_webhook_url,
};
use rosterboard_snapshot::SnapshotStore;
use rosterboard_webhook::WebhookTransport;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// rosterboard — keep published team rosters in sync with their source.
#[derive(Parser)]
#[command(
    name = "rosterboard",
    version,
    about = "Aggregate a guild roster into per-world lists and keep channel messages in sync.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one reconciliation pass: fetch, diff, and republish stale worlds.
    Sync {
        /// Read the roster from this local JSON export instead of the
        /// configured source.
        #[arg(long, conflicts_with = "remote")]
        local: Option<String>,

        /// Fetch the roster from the configured remote URLs.
        #[arg(long)]
        remote: bool,

        /// Republish every world even when nothing changed.
        #[arg(long)]
        force: bool,

        /// Snapshot path override.
        #[arg(long)]
        snapshot: Option<String>,
    },

    /// Show the persisted snapshot: worlds, message links, last run.
    Status {
        /// Snapshot path override.
        #[arg(long)]
        snapshot: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "rosterboard=info",
        1 => "rosterboard=debug",
        _ => "rosterboard=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync {
            local,
            remote,
            force,
            snapshot,
        } => cmd_sync(local.as_deref(), remote, force, snapshot.as_deref()).await,
        Command::Status { snapshot } => cmd_status(snapshot.as_deref()).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

async fn cmd_sync(
    local: Option<&str>,
    remote: bool,
    force: bool,
    snapshot_override: Option<&str>,
) -> Result<()> {
    let config = load_config()?;

    // Resolve the webhook before doing anything else.
    let webhook_url = resolve_webhook_url(&config)?;

    let input = resolve_input(&config, local, remote)?;
    let snapshot_path = match snapshot_override {
        Some(p) => PathBuf::from(p),
        None => config.snapshot_path()?,
    };

    let store = SnapshotStore::new(snapshot_path);
    let transport = WebhookTransport::new(webhook_url, config.webhook.timeout_secs)?;

    let reconcile_config = ReconcileConfig {
        input,
        limits: EmbedLimits::from(&config),
        names: config.world_names(),
        guild_id: config.webhook.guild_id.clone(),
        force,
    };

    info!(force, "starting sync");

    let reporter = CliProgress::new();
    let result = reconcile(&reconcile_config, &store, &transport, &reporter).await?;

    println!();
    if result.skipped {
        println!("  Roster unchanged — nothing published.");
        println!("  Worlds:       {}", result.worlds_total);
        println!("  Invalid rows: {}", result.invalid_rows);
    } else {
        println!("  Reconciliation complete!");
        println!("  Run:          {}", result.run_id);
        println!("  Worlds:       {}", result.worlds_total);
        println!("  Changed:      {}", result.changed);
        println!("  Removed:      {}", result.removed);
        println!("  Published:    {}", result.published);
        println!("  Failed:       {}", result.failed);
        println!("  Invalid rows: {}", result.invalid_rows);
        println!("  Time:         {:.1}s", result.elapsed.as_secs_f64());
        if result.failed > 0 {
            println!();
            println!("  Some worlds failed to publish; the next sync will retry them.");
        }
    }
    println!();

    Ok(())
}

/// Resolve the roster input from CLI flags over config.
fn resolve_input(
    config: &AppConfig,
    local: Option<&str>,
    remote: bool,
) -> Result<RosterInput> {
    if let Some(path) = local {
        return Ok(RosterInput::Local {
            path: PathBuf::from(path),
        });
    }

    if remote || config.roster.mode == "remote" {
        let roster_url = config
            .roster
            .roster_url
            .as_deref()
            .ok_or_else(|| eyre!("remote mode requires roster_url in [roster] config"))?;
        let roster_url = Url::parse(roster_url)
            .map_err(|e| eyre!("invalid roster_url '{roster_url}': {e}"))?;

        let assignments_url = config
            .roster
            .assignments_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| eyre!("invalid assignments_url: {e}"))?;

        return Ok(RosterInput::Remote {
            roster_url,
            assignments_url,
            timeout_secs: config.roster.timeout_secs,
        });
    }

    Ok(RosterInput::Local {
        path: PathBuf::from(&config.roster.local_path),
    })
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap()
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn world_published(&self, world_id: WorldId, current: usize, total: usize) {
        self.spinner.set_message(format!(
            "Publishing [{current}/{total}] world {world_id}"
        ));
    }

    fn done(&self, _result: &ReconcileResult) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

async fn cmd_status(snapshot_override: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let snapshot_path = match snapshot_override {
        Some(p) => PathBuf::from(p),
        None => config.snapshot_path()?,
    };

    let store = SnapshotStore::new(&snapshot_path);
    let snapshot = store.load()?;
    let names = config.world_names();

    if snapshot.worlds.is_empty() {
        println!("No snapshot yet — run `rosterboard sync` first.");
        return Ok(());
    }

    println!();
    println!("  Snapshot:  {}", snapshot_path.display());
    println!("  Last run:  {} ({})", snapshot.run_id, snapshot.captured_at);
    println!("  Worlds:    {}", snapshot.worlds.len());
    println!();

    for (world_id, summary) in &snapshot.worlds {
        let messages = snapshot
            .message_links
            .get(world_id)
            .map(Vec::len)
            .unwrap_or(0);
        println!(
            "  {:<24} {:>3} alliances  {:>3} solo  {:>3} guilds  {} message(s)",
            names.name_of(*world_id),
            summary.alliances.len(),
            summary.solo_guilds.len(),
            summary.guild_count(),
            messages,
        );
    }

    if let Some(summary_link) = &snapshot.summary_link {
        println!();
        println!(
            "  Summary:   {}",
            summary_link.jump_url(&config.webhook.guild_id)
        );
    }
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
