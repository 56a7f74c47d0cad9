//! Change detection between the prior snapshot and the current aggregation.
//!
//! This is the idempotence gate of the whole pipeline: a world with zero net
//! change touches nothing downstream, so running twice on unchanged source
//! data produces zero outbound publication calls.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument};

use rosterboard_shared::{ChangeSet, Snapshot, WorldId, WorldSummary};

/// Compare the prior snapshot against the freshly aggregated worlds.
///
/// For every world present on either side: order-insensitive structural
/// comparison (absent counts as empty). A world that existed before and has
/// zero guilds now is a removal; any other difference is a change.
#[instrument(skip_all)]
pub fn detect(
    previous: &Snapshot,
    current: &BTreeMap<WorldId, WorldSummary>,
) -> ChangeSet {
    let mut changes = ChangeSet::default();

    let world_ids: BTreeSet<WorldId> = previous
        .worlds
        .keys()
        .chain(current.keys())
        .copied()
        .collect();

    for world_id in world_ids {
        let prior = previous.world(world_id);
        let now = current.get(&world_id);

        match (prior, now) {
            (Some(_), None) => {
                changes.removed_worlds.insert(world_id);
            }
            (Some(prior), Some(now)) if now.is_empty() => {
                if prior.is_empty() {
                    // Nothing was ever published for it; nothing to retire.
                    continue;
                }
                changes.removed_worlds.insert(world_id);
            }
            (Some(prior), Some(now)) => {
                if !prior.structurally_eq(now) {
                    changes.changed_worlds.insert(world_id);
                }
            }
            (None, Some(now)) => {
                if !now.is_empty() {
                    changes.changed_worlds.insert(world_id);
                }
            }
            (None, None) => {}
        }
    }

    debug!(
        changed = changes.changed_worlds.len(),
        removed = changes.removed_worlds.len(),
        "change detection complete"
    );
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosterboard_shared::{AllianceGroup, GuildRecord, roster_digest};

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

    fn world_with_alliance(world: u32, alliance: &str, guilds: Vec<GuildRecord>) -> WorldSummary {
        let mut summary = WorldSummary::empty(WorldId(world));
        summary.alliances.insert(
            alliance.to_string(),
            AllianceGroup {
                name: None,
                guilds,
            },
        );
        summary
    }

    fn snapshot_of(worlds: BTreeMap<WorldId, WorldSummary>) -> Snapshot {
        let mut snapshot = Snapshot::empty();
        snapshot.roster_digest = roster_digest(&worlds);
        snapshot.worlds = worlds;
        snapshot
    }

    #[test]
    fn identical_worlds_produce_empty_changeset() {
        let mut worlds = BTreeMap::new();
        worlds.insert(
            WorldId(1),
            world_with_alliance(1, "al", vec![guild("G1", "One", 1, Some("al"))]),
        );

        let previous = snapshot_of(worlds.clone());
        let changes = detect(&previous, &worlds);
        assert!(changes.is_empty());
    }

    #[test]
    fn permuted_members_are_not_a_change() {
        let mut prior_worlds = BTreeMap::new();
        prior_worlds.insert(
            WorldId(1),
            world_with_alliance(
                1,
                "al",
                vec![
                    guild("G1", "One", 1, Some("al")),
                    guild("G2", "Two", 1, Some("al")),
                ],
            ),
        );

        let mut current = prior_worlds.clone();
        current
            .get_mut(&WorldId(1))
            .unwrap()
            .alliances
            .get_mut("al")
            .unwrap()
            .guilds
            .reverse();

        let changes = detect(&snapshot_of(prior_worlds), &current);
        assert!(changes.is_empty());
    }

    #[test]
    fn new_world_is_a_change() {
        let previous = snapshot_of(BTreeMap::new());

        let mut current = BTreeMap::new();
        current.insert(
            WorldId(7),
            world_with_alliance(7, "al", vec![guild("G1", "One", 7, Some("al"))]),
        );

        let changes = detect(&previous, &current);
        assert_eq!(changes.changed_worlds, BTreeSet::from([WorldId(7)]));
        assert!(changes.removed_worlds.is_empty());
    }

    #[test]
    fn vanished_world_is_a_removal() {
        let mut prior_worlds = BTreeMap::new();
        prior_worlds.insert(
            WorldId(7),
            world_with_alliance(7, "al", vec![guild("G1", "One", 7, Some("al"))]),
        );

        let changes = detect(&snapshot_of(prior_worlds), &BTreeMap::new());
        assert!(changes.changed_worlds.is_empty());
        assert_eq!(changes.removed_worlds, BTreeSet::from([WorldId(7)]));
    }

    #[test]
    fn world_emptied_in_place_is_a_removal() {
        let mut prior_worlds = BTreeMap::new();
        prior_worlds.insert(
            WorldId(7),
            world_with_alliance(7, "al", vec![guild("G1", "One", 7, Some("al"))]),
        );

        let mut current = BTreeMap::new();
        current.insert(WorldId(7), WorldSummary::empty(WorldId(7)));

        let changes = detect(&snapshot_of(prior_worlds), &current);
        assert_eq!(changes.removed_worlds, BTreeSet::from([WorldId(7)]));
    }

    #[test]
    fn guild_move_affects_exactly_both_worlds() {
        // G1 moves from world 1 to world 2; world 3 stays untouched.
        let mut prior_worlds = BTreeMap::new();
        prior_worlds.insert(
            WorldId(1),
            world_with_alliance(
                1,
                "al",
                vec![
                    guild("G1", "Mover", 1, Some("al")),
                    guild("G2", "Stays", 1, Some("al")),
                ],
            ),
        );
        prior_worlds.insert(
            WorldId(2),
            world_with_alliance(2, "other", vec![guild("G3", "Anchor", 2, Some("other"))]),
        );
        prior_worlds.insert(
            WorldId(3),
            world_with_alliance(3, "third", vec![guild("G4", "Calm", 3, Some("third"))]),
        );

        let mut current = prior_worlds.clone();
        current
            .get_mut(&WorldId(1))
            .unwrap()
            .alliances
            .get_mut("al")
            .unwrap()
            .guilds
            .retain(|g| g.guild_id != "G1");
        current
            .get_mut(&WorldId(2))
            .unwrap()
            .alliances
            .get_mut("other")
            .unwrap()
            .guilds
            .push(guild("G1", "Mover", 2, Some("other")));

        let changes = detect(&snapshot_of(prior_worlds), &current);
        assert_eq!(
            changes.changed_worlds,
            BTreeSet::from([WorldId(1), WorldId(2)])
        );
        assert!(changes.removed_worlds.is_empty());
    }

    #[test]
    fn member_joining_alliance_flags_the_world() {
        // Previous snapshot has world 1 with alliance "A" = [g1, g2]; current
        // adds g3 to "A". Expect exactly world 1 changed.
        let mut prior_worlds = BTreeMap::new();
        prior_worlds.insert(
            WorldId(1),
            world_with_alliance(
                1,
                "A",
                vec![
                    guild("g1", "First", 1, Some("A")),
                    guild("g2", "Second", 1, Some("A")),
                ],
            ),
        );

        let mut current = prior_worlds.clone();
        current
            .get_mut(&WorldId(1))
            .unwrap()
            .alliances
            .get_mut("A")
            .unwrap()
            .guilds
            .push(guild("g3", "Third", 1, Some("A")));

        let changes = detect(&snapshot_of(prior_worlds), &current);
        assert_eq!(changes.changed_worlds, BTreeSet::from([WorldId(1)]));
        assert!(changes.removed_worlds.is_empty());
    }

    #[test]
    fn solo_guild_set_change_is_detected() {
        let mut prior_worlds = BTreeMap::new();
        let mut summary = WorldSummary::empty(WorldId(1));
        summary.solo_guilds.push(guild("S1", "Solo", 1, None));
        prior_worlds.insert(WorldId(1), summary);

        let mut current = prior_worlds.clone();
        current
            .get_mut(&WorldId(1))
            .unwrap()
            .solo_guilds
            .push(guild("S2", "Newcomer", 1, None));

        let changes = detect(&snapshot_of(prior_worlds), &current);
        assert_eq!(changes.changed_worlds, BTreeSet::from([WorldId(1)]));
    }
}
