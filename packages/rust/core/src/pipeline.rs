//! End-to-end reconciliation run: roster → normalize → aggregate → detect →
//! publish → snapshot save.
//!
//! One call is one run. The caller guarantees runs do not overlap on the
//! same snapshot store; aborting mid-run is safe because the store only ever
//! holds the last fully saved snapshot, and the next run re-detects whatever
//! was in flight.

use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};

use rosterboard_roster::{RosterInput, load_roster, normalize};
use rosterboard_shared::{
    CURRENT_SCHEMA_VERSION, EmbedLimits, Result, RunId, Snapshot, WorldId, WorldNames,
    roster_digest,
};
use rosterboard_snapshot::SnapshotStore;
use rosterboard_webhook::Transport;

use crate::aggregate::aggregate;
use crate::detect::detect;
use crate::publish::Publisher;

// ---------------------------------------------------------------------------
// Config & result
// ---------------------------------------------------------------------------

/// Configuration for one reconciliation run.
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// Where the roster comes from.
    pub input: RosterInput,
    /// Embed payload budgets.
    pub limits: EmbedLimits,
    /// World display names.
    pub names: WorldNames,
    /// Discord server id for jump links.
    pub guild_id: String,
    /// Republish every world even when nothing changed.
    pub force: bool,
}

/// Result of one reconciliation run.
#[derive(Debug)]
pub struct ReconcileResult {
    /// This run's identifier.
    pub run_id: RunId,
    /// Worlds present in the current aggregation.
    pub worlds_total: usize,
    /// Roster rows rejected by the normalizer.
    pub invalid_rows: usize,
    /// Worlds detected as changed.
    pub changed: usize,
    /// Worlds detected as removed.
    pub removed: usize,
    /// Worlds successfully (re)published.
    pub published: usize,
    /// Worlds whose publish failed (retried next run).
    pub failed: usize,
    /// True when nothing differed and no publication was attempted.
    pub skipped: bool,
    /// Total elapsed time.
    pub elapsed: std::time::Duration,
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each world's messages are published.
    fn world_published(&self, world_id: WorldId, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, result: &ReconcileResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn world_published(&self, _world_id: WorldId, _current: usize, _total: usize) {}
    fn done(&self, _result: &ReconcileResult) {}
}

// ---------------------------------------------------------------------------
// Reconcile
// ---------------------------------------------------------------------------

/// Run one full reconciliation pass.
///
/// 1. Load the roster (fatal on failure — nothing has been touched yet)
/// 2. Normalize rows, collecting diagnostics
/// 3. Aggregate into per-world summaries
/// 4. Load the prior snapshot and detect changes (digest fast path first)
/// 5. Publish affected worlds and refresh the summary message
/// 6. Save the new snapshot atomically
#[instrument(skip_all)]
pub async fn reconcile(
    config: &ReconcileConfig,
    store: &SnapshotStore,
    transport: &dyn Transport,
    progress: &dyn ProgressReporter,
) -> Result<ReconcileResult> {
    let start = Instant::now();
    let run_id = RunId::new();

    info!(%run_id, "starting reconciliation run");

    // --- Roster ---
    progress.phase("Fetching roster");
    let rows = load_roster(&config.input).await?;

    progress.phase("Normalizing records");
    let outcome = normalize(&rows);
    for diag in &outcome.diagnostics {
        warn!(
            row = diag.row,
            guild_id = diag.guild_id.as_deref().unwrap_or("?"),
            reason = %diag.reason,
            "rejected roster row"
        );
    }

    progress.phase("Aggregating worlds");
    let current = aggregate(&outcome.records);
    let current_digest = roster_digest(&current);

    // --- Prior state ---
    progress.phase("Loading snapshot");
    let previous = store.load()?;

    // Fast path: identical structural content, nothing to do. The digest is
    // computed over the same canonical form the detector compares, so this
    // can never mask a real change.
    if !config.force && current_digest == previous.roster_digest {
        info!(%run_id, worlds = current.len(), "roster unchanged, nothing to publish");
        let result = skipped_result(run_id, &current, &outcome.diagnostics, start);
        progress.done(&result);
        return Ok(result);
    }

    progress.phase("Detecting changes");
    let mut changes = detect(&previous, &current);
    if config.force {
        changes
            .changed_worlds
            .extend(current.keys().copied());
    }

    if changes.is_empty() {
        info!(%run_id, "no world changes detected");
        let result = skipped_result(run_id, &current, &outcome.diagnostics, start);
        progress.done(&result);
        return Ok(result);
    }

    info!(
        changed = changes.changed_worlds.len(),
        removed = changes.removed_worlds.len(),
        "changes detected"
    );

    // --- Publish ---
    progress.phase("Publishing worlds");
    let publisher = Publisher {
        transport,
        limits: config.limits,
        names: &config.names,
        guild_id: &config.guild_id,
    };
    let generated_at = Utc::now();
    let (state, publish_outcome) = publisher
        .apply(&changes, &current, &previous, generated_at, progress)
        .await;

    // --- Persist ---
    progress.phase("Saving snapshot");
    let snapshot = Snapshot {
        schema_version: CURRENT_SCHEMA_VERSION,
        run_id: run_id.clone(),
        captured_at: generated_at,
        // Digest of the state actually persisted: failed worlds were
        // reverted, so a partial failure can never satisfy the next run's
        // fast path.
        roster_digest: roster_digest(&state.worlds),
        worlds: state.worlds,
        message_links: state.message_links,
        summary_link: state.summary_link,
    };
    store.save(&snapshot)?;

    let result = ReconcileResult {
        run_id,
        worlds_total: current.len(),
        invalid_rows: outcome.diagnostics.len(),
        changed: changes.changed_worlds.len(),
        removed: changes.removed_worlds.len(),
        published: publish_outcome.published.len(),
        failed: publish_outcome.failed.len(),
        skipped: false,
        elapsed: start.elapsed(),
    };

    progress.done(&result);

    info!(
        run_id = %result.run_id,
        changed = result.changed,
        removed = result.removed,
        published = result.published,
        failed = result.failed,
        elapsed_ms = result.elapsed.as_millis(),
        "reconciliation complete"
    );

    Ok(result)
}

fn skipped_result(
    run_id: RunId,
    current: &std::collections::BTreeMap<WorldId, rosterboard_shared::WorldSummary>,
    diagnostics: &[rosterboard_roster::RowDiagnostic],
    start: Instant,
) -> ReconcileResult {
    ReconcileResult {
        run_id,
        worlds_total: current.len(),
        invalid_rows: diagnostics.len(),
        changed: 0,
        removed: 0,
        published: 0,
        failed: 0,
        skipped: true,
        elapsed: start.elapsed(),
    }
}
