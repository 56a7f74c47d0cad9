//! Core domain types for rosterboard snapshots and roster records.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current schema version for the persisted snapshot format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// WorldId
// ---------------------------------------------------------------------------

/// Numeric identifier of a world (server/shard) that guilds are assigned to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorldId(pub u32);

impl std::fmt::Display for WorldId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorldId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one reconciliation run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// GuildRecord
// ---------------------------------------------------------------------------

/// A validated roster row: one guild and its current world assignment.
///
/// The derived total order exists so records can live in ordered sets for
/// order-insensitive comparison; it carries no roster meaning.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct GuildRecord {
    /// Unique guild identifier (uppercased during normalization).
    pub guild_id: String,
    /// Display name.
    pub guild_name: String,
    /// Short guild tag, rendered as `[TAG]`.
    pub tag: String,
    /// World the guild currently plays on.
    pub world_id: WorldId,
    /// Alliance membership; `None` marks a solo guild.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance_id: Option<String>,
    /// Alliance display name, when the source provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alliance_name: Option<String>,
}

impl GuildRecord {
    /// Whether this guild has no alliance affiliation.
    pub fn is_solo(&self) -> bool {
        self.alliance_id.is_none()
    }
}

// ---------------------------------------------------------------------------
// AllianceGroup
// ---------------------------------------------------------------------------

/// The member guilds of one alliance on one world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllianceGroup {
    /// Alliance display name, when any member row carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Member guilds, sorted by guild name.
    pub guilds: Vec<GuildRecord>,
}

impl AllianceGroup {
    /// Display name for rendering: the alliance name, or the id as fallback.
    pub fn display_name<'a>(&'a self, alliance_id: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(alliance_id)
    }
}

// ---------------------------------------------------------------------------
// WorldSummary
// ---------------------------------------------------------------------------

/// The aggregated team composition of one world: alliances plus solo guilds.
///
/// Invariant: every referenced guild's `world_id` equals `world_id`, and an
/// alliance entry exists only when it has at least one member on this world.
/// An alliance split across worlds appears in each world's summary with only
/// its local members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldSummary {
    /// The world this summary describes.
    pub world_id: WorldId,
    /// Alliances keyed by alliance id, each with its local members.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alliances: BTreeMap<String, AllianceGroup>,
    /// Guilds with no alliance, sorted by guild name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub solo_guilds: Vec<GuildRecord>,
}

impl WorldSummary {
    /// A summary with no guilds at all.
    pub fn empty(world_id: WorldId) -> Self {
        Self {
            world_id,
            alliances: BTreeMap::new(),
            solo_guilds: Vec::new(),
        }
    }

    /// Total number of guilds across alliances and solo entries.
    pub fn guild_count(&self) -> usize {
        self.alliances.values().map(|a| a.guilds.len()).sum::<usize>() + self.solo_guilds.len()
    }

    /// Whether the world has no guilds left.
    pub fn is_empty(&self) -> bool {
        self.guild_count() == 0
    }

    /// Alliances in render order: descending member count, ties broken by
    /// alliance id ascending.
    pub fn ordered_alliances(&self) -> Vec<(&str, &AllianceGroup)> {
        let mut entries: Vec<(&str, &AllianceGroup)> = self
            .alliances
            .iter()
            .map(|(id, group)| (id.as_str(), group))
            .collect();
        entries.sort_by(|(id_a, a), (id_b, b)| {
            b.guilds
                .len()
                .cmp(&a.guilds.len())
                .then_with(|| id_a.cmp(id_b))
        });
        entries
    }

    /// Order-insensitive structural equality: same alliance ids, same
    /// alliance names, same member sets, same solo-guild set. Permuting any
    /// member sequence never makes two summaries unequal, so a change to the
    /// aggregator's sort policy can never trigger a republish.
    pub fn structurally_eq(&self, other: &Self) -> bool {
        if self.world_id != other.world_id || self.alliances.len() != other.alliances.len() {
            return false;
        }
        for (id, group) in &self.alliances {
            let Some(other_group) = other.alliances.get(id) else {
                return false;
            };
            if group.name != other_group.name {
                return false;
            }
            let members: BTreeSet<&GuildRecord> = group.guilds.iter().collect();
            let other_members: BTreeSet<&GuildRecord> = other_group.guilds.iter().collect();
            if members != other_members {
                return false;
            }
        }
        let solo: BTreeSet<&GuildRecord> = self.solo_guilds.iter().collect();
        let other_solo: BTreeSet<&GuildRecord> = other.solo_guilds.iter().collect();
        solo == other_solo
    }
}

// ---------------------------------------------------------------------------
// MessageRef
// ---------------------------------------------------------------------------

/// A handle to one published channel message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    /// Channel the message lives in.
    pub channel_id: String,
    /// The message itself.
    pub message_id: String,
}

impl MessageRef {
    /// The `https://discord.com/channels/...` link for this message.
    pub fn jump_url(&self, guild_id: &str) -> String {
        format!(
            "https://discord.com/channels/{guild_id}/{}/{}",
            self.channel_id, self.message_id
        )
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// The persisted record of the last successfully published state.
///
/// The sole cross-run entity: read at the start of each reconciliation run,
/// mutated only after successful publication, replaced atomically at end of
/// run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for forward compatibility.
    pub schema_version: u32,
    /// The run that produced this snapshot.
    pub run_id: RunId,
    /// When the snapshot was captured.
    pub captured_at: DateTime<Utc>,
    /// SHA-256 over the canonical serialization of `worlds`; empty on the
    /// initial snapshot. Fast-path equality check before the structural diff.
    #[serde(default)]
    pub roster_digest: String,
    /// Per-world compositions as of the last run.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub worlds: BTreeMap<WorldId, WorldSummary>,
    /// Published messages per world; the first entry is the primary message,
    /// later entries are pagination overflow parts.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub message_links: BTreeMap<WorldId, Vec<MessageRef>>,
    /// The cross-world summary message, once one has been published.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_link: Option<MessageRef>,
}

impl Snapshot {
    /// The snapshot used when no persisted state exists yet (not an error).
    pub fn empty() -> Self {
        Self {
            schema_version: CURRENT_SCHEMA_VERSION,
            run_id: RunId::new(),
            captured_at: Utc::now(),
            roster_digest: String::new(),
            worlds: BTreeMap::new(),
            message_links: BTreeMap::new(),
            summary_link: None,
        }
    }

    /// The prior summary for a world, if the world existed last run.
    pub fn world(&self, world_id: WorldId) -> Option<&WorldSummary> {
        self.worlds.get(&world_id)
    }
}

/// SHA-256 digest of the canonical JSON serialization of a worlds map.
///
/// `BTreeMap` ordering makes the serialization canonical, so structurally
/// equal maps always produce equal digests.
pub fn roster_digest(worlds: &BTreeMap<WorldId, WorldSummary>) -> String {
    use sha2::{Digest, Sha256};
    let bytes = serde_json::to_vec(worlds).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// Worlds affected by a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Worlds whose composition differs from the prior snapshot (including
    /// worlds that did not exist before).
    pub changed_worlds: BTreeSet<WorldId>,
    /// Worlds that existed before and now have zero guilds.
    pub removed_worlds: BTreeSet<WorldId>,
}

impl ChangeSet {
    /// True when no world needs any publication work.
    pub fn is_empty(&self) -> bool {
        self.changed_worlds.is_empty() && self.removed_worlds.is_empty()
    }

    /// Total number of affected worlds.
    pub fn affected_count(&self) -> usize {
        self.changed_worlds.len() + self.removed_worlds.len()
    }
}

// ---------------------------------------------------------------------------
// WorldNames
// ---------------------------------------------------------------------------

/// Optional display names for worlds, resolved from configuration.
#[derive(Debug, Clone, Default)]
pub struct WorldNames(BTreeMap<WorldId, String>);

impl WorldNames {
    pub fn new(names: BTreeMap<WorldId, String>) -> Self {
        Self(names)
    }

    /// Display name for a world, falling back to `World <id>`.
    pub fn name_of(&self, world_id: WorldId) -> String {
        self.0
            .get(&world_id)
            .cloned()
            .unwrap_or_else(|| format!("World {world_id}"))
    }
}
