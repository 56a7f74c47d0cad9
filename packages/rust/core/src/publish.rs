//! Publication lifecycle management.
//!
//! Drives each affected world through its message state machine once per
//! reconciliation run:
//!
//! ```text
//! Absent → Published → Stale → Republished (→ Published …)
//!                   ↘ Retired (world removed)
//! ```
//!
//! Prior messages are retired best-effort — a failed delete never blocks the
//! replacement (a temporary duplicate beats a lost update). A failed send
//! fails only that world: its prior summary and refs are carried into the
//! next snapshot so the following run re-detects and retries it. The
//! cross-world summary message is refreshed after all per-world transitions,
//! and only when at least one world was affected.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use rosterboard_embeds::{WebhookPayload, build_summary_embed, build_world_embeds};
use rosterboard_shared::{
    ChangeSet, EmbedLimits, MessageRef, Snapshot, WorldId, WorldNames, WorldSummary,
};
use rosterboard_webhook::Transport;

use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Publisher
// ---------------------------------------------------------------------------

/// Inputs that stay fixed across one publication pass.
pub struct Publisher<'a> {
    /// Outbound messaging operations.
    pub transport: &'a dyn Transport,
    /// Embed payload budgets.
    pub limits: EmbedLimits,
    /// World display names.
    pub names: &'a WorldNames,
    /// Discord server id for jump links in the summary.
    pub guild_id: &'a str,
}

/// What happened to each affected world during a pass.
#[derive(Debug, Default)]
pub struct PublishOutcome {
    /// Worlds whose messages were (re)published this run.
    pub published: Vec<WorldId>,
    /// Worlds whose messages were retired with no replacement.
    pub retired: Vec<WorldId>,
    /// Worlds whose send failed, with the error text; retried next run.
    pub failed: Vec<(WorldId, String)>,
    /// Whether the summary message was replaced.
    pub summary_refreshed: bool,
}

/// The world/link state to persist after a pass.
#[derive(Debug)]
pub struct PublishedState {
    /// Worlds as they should appear in the next snapshot (failed worlds
    /// reverted to their prior entries).
    pub worlds: BTreeMap<WorldId, WorldSummary>,
    /// Message refs per world after retire/publish.
    pub message_links: BTreeMap<WorldId, Vec<MessageRef>>,
    /// Summary message ref after the refresh barrier.
    pub summary_link: Option<MessageRef>,
}

impl Publisher<'_> {
    /// Drive every affected world through its transition, then refresh the
    /// summary message.
    ///
    /// Never returns an error: per-world failures are recorded in the
    /// outcome and reflected in the returned state so the next run retries
    /// them, and unrelated worlds are unaffected.
    #[instrument(skip_all, fields(
        changed = changes.changed_worlds.len(),
        removed = changes.removed_worlds.len(),
    ))]
    pub async fn apply(
        &self,
        changes: &ChangeSet,
        current: &BTreeMap<WorldId, WorldSummary>,
        previous: &Snapshot,
        generated_at: DateTime<Utc>,
        progress: &dyn ProgressReporter,
    ) -> (PublishedState, PublishOutcome) {
        let mut outcome = PublishOutcome::default();
        let mut worlds = current.clone();
        let mut links = previous.message_links.clone();
        let mut summary_link = previous.summary_link.clone();

        // Retired worlds: delete the prior messages and drop the entry.
        for &world_id in &changes.removed_worlds {
            let prior_refs = links.remove(&world_id).unwrap_or_default();
            self.retire_messages(world_id, &prior_refs).await;
            worlds.remove(&world_id);
            outcome.retired.push(world_id);
            info!(%world_id, "world retired");
        }

        // Changed worlds, in world-id order. Each transition is independent.
        let total = changes.changed_worlds.len();
        for (index, &world_id) in changes.changed_worlds.iter().enumerate() {
            let Some(summary) = current.get(&world_id) else {
                continue;
            };

            // Published → Stale: retire the previous messages first. Failure
            // to delete is logged and never blocks the republish.
            let prior_refs = links.get(&world_id).cloned().unwrap_or_default();
            self.retire_messages(world_id, &prior_refs).await;

            // Stale → Republished (or Absent → Published).
            match self.publish_world(summary, generated_at).await {
                Ok(new_refs) => {
                    info!(%world_id, messages = new_refs.len(), "world published");
                    links.insert(world_id, new_refs);
                    outcome.published.push(world_id);
                    progress.world_published(world_id, index + 1, total);
                }
                Err(error) => {
                    warn!(%world_id, %error, "publish failed, keeping prior state for retry");
                    // Carry the prior summary so the next run still sees a
                    // difference for this world; prior refs stay in `links`.
                    match previous.world(world_id) {
                        Some(prior) => {
                            worlds.insert(world_id, prior.clone());
                        }
                        None => {
                            worlds.remove(&world_id);
                            links.remove(&world_id);
                        }
                    }
                    outcome.failed.push((world_id, error));
                }
            }
        }

        // Summary barrier: refresh only when at least one world was touched.
        if !changes.is_empty() {
            if let Some(prior) = summary_link.take() {
                if let Err(error) = self.transport.delete(&prior).await {
                    warn!(%error, "failed to delete prior summary message");
                }
            }

            let embed = build_summary_embed(&links, self.names, self.guild_id, generated_at);
            match self.transport.send(&WebhookPayload::single(embed)).await {
                Ok(sent) => {
                    info!(message_id = %sent.message_id, "summary message refreshed");
                    summary_link = Some(sent);
                    outcome.summary_refreshed = true;
                }
                Err(error) => {
                    warn!(%error, "failed to publish summary message");
                    summary_link = previous.summary_link.clone();
                }
            }
        }

        (
            PublishedState {
                worlds,
                message_links: links,
                summary_link,
            },
            outcome,
        )
    }

    /// Delete a world's previous messages; failures are logged, never fatal.
    async fn retire_messages(&self, world_id: WorldId, refs: &[MessageRef]) {
        for message in refs {
            if let Err(error) = self.transport.delete(message).await {
                warn!(
                    %world_id,
                    message_id = %message.message_id,
                    %error,
                    "failed to delete prior message"
                );
            }
        }
    }

    /// Send all embed parts for one world.
    ///
    /// On a mid-sequence failure the already-sent parts are deleted
    /// best-effort, so a world is always published whole or not at all.
    async fn publish_world(
        &self,
        summary: &WorldSummary,
        generated_at: DateTime<Utc>,
    ) -> std::result::Result<Vec<MessageRef>, String> {
        let embeds = build_world_embeds(summary, self.names, &self.limits, generated_at);
        let mut refs = Vec::with_capacity(embeds.len());

        for embed in embeds {
            match self.transport.send(&WebhookPayload::single(embed)).await {
                Ok(sent) => refs.push(sent),
                Err(error) => {
                    for sent in &refs {
                        if let Err(rollback) = self.transport.delete(sent).await {
                            warn!(
                                message_id = %sent.message_id,
                                error = %rollback,
                                "failed to roll back partial publish"
                            );
                        }
                    }
                    return Err(error.to_string());
                }
            }
        }

        Ok(refs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testutil::MockTransport;
    use chrono::TimeZone;
    use rosterboard_shared::{AllianceGroup, GuildRecord};
    use std::collections::BTreeSet;

    fn guild(id: &str, name: &str, world: u32, alliance: Option<&str>) -> GuildRecord {
        GuildRecord {
            guild_id: id.into(),
            guild_name: name.into(),
            tag: "TAG".into(),
            world_id: WorldId(world),
            alliance_id: alliance.map(String::from),
            alliance_name: None,
        }
    }

    fn world(world: u32, guilds: Vec<GuildRecord>) -> WorldSummary {
        let mut summary = WorldSummary::empty(WorldId(world));
        summary.alliances.insert(
            "al".into(),
            AllianceGroup {
                name: Some("Alliance".into()),
                guilds,
            },
        );
        summary
    }

    fn publisher<'a>(transport: &'a MockTransport, names: &'a WorldNames) -> Publisher<'a> {
        Publisher {
            transport,
            limits: EmbedLimits {
                max_field_chars: 1024,
                max_fields: 25,
            },
            names,
            guild_id: "999",
        }
    }

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn msg(id: &str) -> MessageRef {
        MessageRef {
            channel_id: "chan".into(),
            message_id: id.into(),
        }
    }

    fn changed(worlds: &[u32]) -> ChangeSet {
        ChangeSet {
            changed_worlds: worlds.iter().map(|w| WorldId(*w)).collect(),
            removed_worlds: BTreeSet::new(),
        }
    }

    #[tokio::test]
    async fn absent_world_is_published_and_recorded() {
        let transport = MockTransport::new();
        let names = WorldNames::default();
        let mut current = BTreeMap::new();
        current.insert(WorldId(1008), world(1008, vec![guild("G1", "One", 1008, Some("al"))]));

        let (state, outcome) = publisher(&transport, &names)
            .apply(&changed(&[1008]), &current, &Snapshot::empty(), ts(), &SilentProgress)
            .await;

        assert_eq!(outcome.published, vec![WorldId(1008)]);
        assert!(outcome.failed.is_empty());
        assert!(outcome.summary_refreshed);
        // World message + summary message, nothing deleted.
        assert_eq!(transport.sent_titles().len(), 2);
        assert!(transport.deleted_ids().is_empty());
        assert_eq!(state.message_links[&WorldId(1008)].len(), 1);
        assert!(state.summary_link.is_some());
    }

    #[tokio::test]
    async fn changed_world_retires_prior_messages_before_republishing() {
        let transport = MockTransport::new();
        let names = WorldNames::default();

        let mut previous = Snapshot::empty();
        previous.worlds.insert(WorldId(1008), world(1008, vec![guild("G1", "One", 1008, Some("al"))]));
        previous
            .message_links
            .insert(WorldId(1008), vec![msg("old-1"), msg("old-2")]);
        previous.summary_link = Some(msg("old-summary"));

        let mut current = BTreeMap::new();
        current.insert(
            WorldId(1008),
            world(
                1008,
                vec![
                    guild("G1", "One", 1008, Some("al")),
                    guild("G2", "Two", 1008, Some("al")),
                ],
            ),
        );

        let (state, outcome) = publisher(&transport, &names)
            .apply(&changed(&[1008]), &current, &previous, ts(), &SilentProgress)
            .await;

        // Both prior parts plus the prior summary were retired.
        assert_eq!(
            transport.deleted_ids(),
            vec!["old-1", "old-2", "old-summary"]
        );
        assert_eq!(outcome.published, vec![WorldId(1008)]);
        assert_ne!(
            state.message_links[&WorldId(1008)][0].message_id,
            "old-1"
        );
        assert!(outcome.summary_refreshed);
    }

    #[tokio::test]
    async fn delete_failure_does_not_block_republish() {
        let transport = MockTransport::new();
        transport.fail_all_deletes();
        let names = WorldNames::default();

        let mut previous = Snapshot::empty();
        previous.worlds.insert(WorldId(1008), world(1008, vec![guild("G1", "One", 1008, Some("al"))]));
        previous.message_links.insert(WorldId(1008), vec![msg("old-1")]);

        let mut current = BTreeMap::new();
        current.insert(
            WorldId(1008),
            world(
                1008,
                vec![
                    guild("G1", "One", 1008, Some("al")),
                    guild("G2", "Two", 1008, Some("al")),
                ],
            ),
        );

        let (state, outcome) = publisher(&transport, &names)
            .apply(&changed(&[1008]), &current, &previous, ts(), &SilentProgress)
            .await;

        assert_eq!(outcome.published, vec![WorldId(1008)]);
        assert!(outcome.failed.is_empty());
        assert_eq!(state.message_links[&WorldId(1008)].len(), 1);
        assert_ne!(state.message_links[&WorldId(1008)][0].message_id, "old-1");
    }

    #[tokio::test]
    async fn send_failure_keeps_prior_state_for_that_world_only() {
        let transport = MockTransport::new();
        let names = WorldNames::default();
        // World 1008 renders as "World 1008 Guild List"; fail only its sends.
        transport.fail_sends_containing("World 1008");

        let prior_1008 = world(1008, vec![guild("G1", "One", 1008, Some("al"))]);
        let mut previous = Snapshot::empty();
        previous.worlds.insert(WorldId(1008), prior_1008.clone());
        previous.message_links.insert(WorldId(1008), vec![msg("old-1008")]);

        let mut current = BTreeMap::new();
        current.insert(
            WorldId(1008),
            world(
                1008,
                vec![
                    guild("G1", "One", 1008, Some("al")),
                    guild("G2", "Two", 1008, Some("al")),
                ],
            ),
        );
        current.insert(WorldId(2101), world(2101, vec![guild("G3", "Three", 2101, Some("al"))]));

        let (state, outcome) = publisher(&transport, &names)
            .apply(&changed(&[1008, 2101]), &current, &previous, ts(), &SilentProgress)
            .await;

        // World 2101 went through; world 1008 failed alone.
        assert_eq!(outcome.published, vec![WorldId(2101)]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].0, WorldId(1008));

        // The failed world carries its prior summary and refs forward, so
        // the next run re-detects and retries it.
        assert!(state.worlds[&WorldId(1008)].structurally_eq(&prior_1008));
        assert_eq!(state.message_links[&WorldId(1008)], vec![msg("old-1008")]);
        assert!(state.message_links.contains_key(&WorldId(2101)));
    }

    #[tokio::test]
    async fn removed_world_deletes_messages_and_drops_links() {
        let transport = MockTransport::new();
        let names = WorldNames::default();

        let mut previous = Snapshot::empty();
        previous.worlds.insert(WorldId(1008), world(1008, vec![guild("G1", "One", 1008, Some("al"))]));
        previous.message_links.insert(WorldId(1008), vec![msg("old-1")]);

        let changes = ChangeSet {
            changed_worlds: BTreeSet::new(),
            removed_worlds: BTreeSet::from([WorldId(1008)]),
        };

        let (state, outcome) = publisher(&transport, &names)
            .apply(&changes, &BTreeMap::new(), &previous, ts(), &SilentProgress)
            .await;

        assert_eq!(outcome.retired, vec![WorldId(1008)]);
        assert!(state.worlds.is_empty());
        assert!(!state.message_links.contains_key(&WorldId(1008)));
        // The retired message was deleted; only the summary was sent.
        assert!(transport.deleted_ids().contains(&"old-1".to_string()));
        assert_eq!(transport.sent_titles(), vec!["Guild Lists Summary"]);
    }

    #[tokio::test]
    async fn empty_changeset_touches_nothing() {
        let transport = MockTransport::new();
        let names = WorldNames::default();

        let mut previous = Snapshot::empty();
        previous.summary_link = Some(msg("summary"));

        let (state, outcome) = publisher(&transport, &names)
            .apply(&ChangeSet::default(), &BTreeMap::new(), &previous, ts(), &SilentProgress)
            .await;

        assert!(outcome.published.is_empty());
        assert!(!outcome.summary_refreshed);
        assert_eq!(transport.call_count(), 0);
        assert_eq!(state.summary_link, Some(msg("summary")));
    }

    #[tokio::test]
    async fn partial_multi_part_publish_rolls_back_sent_parts() {
        let transport = MockTransport::new();
        let names = WorldNames::default();
        transport.fail_sends_containing("(part-2)");

        // Two alliances at one field per embed → two parts.
        let mut summary = WorldSummary::empty(WorldId(1008));
        summary.alliances.insert(
            "a1".into(),
            AllianceGroup {
                name: None,
                guilds: vec![guild("G1", "One", 1008, Some("a1"))],
            },
        );
        summary.alliances.insert(
            "a2".into(),
            AllianceGroup {
                name: None,
                guilds: vec![guild("G2", "Two", 1008, Some("a2"))],
            },
        );
        let mut current = BTreeMap::new();
        current.insert(WorldId(1008), summary);

        let mut p = publisher(&transport, &names);
        p.limits.max_fields = 1;

        let (state, outcome) = p
            .apply(&changed(&[1008]), &current, &Snapshot::empty(), ts(), &SilentProgress)
            .await;

        assert_eq!(outcome.failed.len(), 1);
        assert!(!state.message_links.contains_key(&WorldId(1008)));
        // The first part that did go out was rolled back.
        assert_eq!(transport.deleted_ids().len(), 1);
    }

    #[tokio::test]
    async fn summary_send_failure_keeps_prior_summary_link() {
        let transport = MockTransport::new();
        let names = WorldNames::default();
        transport.fail_sends_containing("Summary");

        let mut previous = Snapshot::empty();
        previous.summary_link = Some(msg("old-summary"));

        let mut current = BTreeMap::new();
        current.insert(WorldId(1008), world(1008, vec![guild("G1", "One", 1008, Some("al"))]));

        let (state, outcome) = publisher(&transport, &names)
            .apply(&changed(&[1008]), &current, &previous, ts(), &SilentProgress)
            .await;

        assert_eq!(outcome.published, vec![WorldId(1008)]);
        assert!(!outcome.summary_refreshed);
        assert_eq!(state.summary_link, Some(msg("old-summary")));
    }
}
