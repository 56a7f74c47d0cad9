//! Roster aggregation into per-world summaries.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use rosterboard_shared::{AllianceGroup, GuildRecord, WorldId, WorldSummary};

/// Group validated records into per-world summaries.
///
/// Within a world, records split by alliance membership; members and solo
/// guilds are sorted by guild name (ties by guild id). Alliance *render*
/// order (descending member count) is applied later via
/// [`WorldSummary::ordered_alliances`] — change detection compares member
/// sets, so no sort policy here can ever trigger a republish on its own.
#[instrument(skip_all, fields(records = records.len()))]
pub fn aggregate(records: &[GuildRecord]) -> BTreeMap<WorldId, WorldSummary> {
    let mut worlds: BTreeMap<WorldId, WorldSummary> = BTreeMap::new();

    for record in records {
        let summary = worlds
            .entry(record.world_id)
            .or_insert_with(|| WorldSummary::empty(record.world_id));

        match &record.alliance_id {
            Some(alliance_id) => {
                let group = summary
                    .alliances
                    .entry(alliance_id.clone())
                    .or_insert_with(|| AllianceGroup {
                        name: None,
                        guilds: Vec::new(),
                    });
                group.guilds.push(record.clone());
            }
            None => summary.solo_guilds.push(record.clone()),
        }
    }

    for summary in worlds.values_mut() {
        for group in summary.alliances.values_mut() {
            sort_guilds(&mut group.guilds);
            // Alliance display name from the members themselves, resolved
            // after sorting so input order can never influence it.
            group.name = group.guilds.iter().find_map(|g| g.alliance_name.clone());
        }
        sort_guilds(&mut summary.solo_guilds);
    }

    debug!(worlds = worlds.len(), "aggregated roster");
    worlds
}

fn sort_guilds(guilds: &mut [GuildRecord]) {
    guilds.sort_by(|a, b| {
        a.guild_name
            .cmp(&b.guild_name)
            .then_with(|| a.guild_id.cmp(&b.guild_id))
    });
}
