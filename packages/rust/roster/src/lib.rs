//! Roster source: remote fetch and local export reading.
//!
//! The roster arrives as a JSON array of permissive raw rows (a spreadsheet
//! export reduced to records); remote mode can additionally overlay a live
//! `guild_id -> world_id` assignment feed over the rows before normalization,
//! so the published lists follow the game's own world assignments even when
//! the spreadsheet lags behind.

mod normalize;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

use rosterboard_shared::{Result, RosterboardError};

pub use normalize::{NormalizeOutcome, RowDiagnostic, normalize};

/// Maximum number of redirects to follow when fetching roster data.
const MAX_REDIRECTS: usize = 3;

/// User-Agent string for roster requests.
const USER_AGENT: &str = concat!("rosterboard/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// RawGuildRow
// ---------------------------------------------------------------------------

/// A permissive roster row as it arrives from the export, before validation.
///
/// Everything is optional here; the normalizer decides what is usable and
/// reports the rest as diagnostics. `world_id` stays untyped because export
/// tools emit it as either a string or a number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGuildRow {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub guild_name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub world_id: Option<serde_json::Value>,
    #[serde(default)]
    pub alliance_id: Option<String>,
    #[serde(default)]
    pub alliance_name: Option<String>,
}

// ---------------------------------------------------------------------------
// RosterInput
// ---------------------------------------------------------------------------

/// Where the current roster comes from.
#[derive(Debug, Clone)]
pub enum RosterInput {
    /// A JSON export file on disk.
    Local {
        /// Path of the export file.
        path: PathBuf,
    },
    /// Remote export, plus an optional live world-assignment overlay.
    Remote {
        /// URL returning the JSON array of raw rows.
        roster_url: Url,
        /// Optional URL returning a `{guild_id: world_id}` JSON object that
        /// overrides each row's world before normalization.
        assignments_url: Option<Url>,
        /// Request timeout in seconds.
        timeout_secs: u64,
    },
}

/// Load the current roster rows from the configured input.
///
/// Any failure here is fatal to the reconciliation run: the caller aborts
/// before touching the snapshot store or the transport.
#[instrument(skip_all)]
pub async fn load_roster(input: &RosterInput) -> Result<Vec<RawGuildRow>> {
    match input {
        RosterInput::Local { path } => read_local(path),
        RosterInput::Remote {
            roster_url,
            assignments_url,
            timeout_secs,
        } => {
            let client = build_client(*timeout_secs)?;
            let mut rows = fetch_rows(&client, roster_url).await?;

            if let Some(url) = assignments_url {
                let assignments = fetch_assignments(&client, url).await?;
                let overridden = apply_assignments(&mut rows, &assignments);
                info!(
                    assignments = assignments.len(),
                    overridden, "applied world-assignment overlay"
                );
            }

            Ok(rows)
        }
    }
}

/// Read a local JSON roster export.
pub fn read_local(path: &Path) -> Result<Vec<RawGuildRow>> {
    let content = std::fs::read_to_string(path).map_err(|e| RosterboardError::io(path, e))?;

    let rows: Vec<RawGuildRow> = serde_json::from_str(&content).map_err(|e| {
        RosterboardError::source(format!("invalid roster export {}: {e}", path.display()))
    })?;

    debug!(path = %path.display(), rows = rows.len(), "read local roster export");
    Ok(rows)
}

/// Override each row's `world_id` from the live assignment feed, matching on
/// the uppercased guild id. Returns the number of rows overridden.
pub fn apply_assignments(
    rows: &mut [RawGuildRow],
    assignments: &BTreeMap<String, u32>,
) -> usize {
    let mut overridden = 0;
    for row in rows.iter_mut() {
        let Some(guild_id) = row.guild_id.as_deref() else {
            continue;
        };
        if let Some(world) = assignments.get(&guild_id.trim().to_uppercase()) {
            row.world_id = Some(serde_json::Value::from(*world));
            overridden += 1;
        }
    }
    overridden
}

// ---------------------------------------------------------------------------
// HTTP plumbing
// ---------------------------------------------------------------------------

/// Build a reqwest client with appropriate settings.
fn build_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| RosterboardError::Network(format!("failed to build HTTP client: {e}")))
}

/// Fetch the roster export rows.
async fn fetch_rows(client: &Client, url: &Url) -> Result<Vec<RawGuildRow>> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| RosterboardError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RosterboardError::Network(format!("{url}: HTTP {status}")));
    }

    let rows: Vec<RawGuildRow> = response
        .json()
        .await
        .map_err(|e| RosterboardError::source(format!("invalid roster payload from {url}: {e}")))?;

    info!(%url, rows = rows.len(), "fetched roster export");
    Ok(rows)
}

/// Fetch the `{guild_id: world_id}` assignment feed.
async fn fetch_assignments(client: &Client, url: &Url) -> Result<BTreeMap<String, u32>> {
    let response = client
        .get(url.as_str())
        .send()
        .await
        .map_err(|e| RosterboardError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RosterboardError::Network(format!("{url}: HTTP {status}")));
    }

    let raw: BTreeMap<String, u32> = response.json().await.map_err(|e| {
        RosterboardError::source(format!("invalid assignment payload from {url}: {e}"))
    })?;

    // Uppercase the join key once so lookups during overlay are direct.
    Ok(raw
        .into_iter()
        .map(|(guild_id, world)| (guild_id.to_uppercase(), world))
        .collect())
}
