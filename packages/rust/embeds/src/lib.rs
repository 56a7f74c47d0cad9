//! Deterministic embed rendering for world guild lists.
//!
//! Pure formatting: identical input always yields byte-identical payloads
//! (timestamps are inputs, never sampled here). Alliances that exceed the
//! transport's per-field or per-message budgets overflow into continuation
//! fields and `(part-N)` embeds — nothing is silently dropped.

mod payload;

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use rosterboard_shared::{EmbedLimits, MessageRef, WorldId, WorldNames, WorldSummary};

pub use payload::{Embed, EmbedAuthor, EmbedField, EmbedFooter, WebhookPayload};

/// Author line shared by all published embeds.
const AUTHOR_NAME: &str = "Team Rosters";

/// Footer text; the client renders the timestamp next to it.
const FOOTER_TEXT: &str = "Last Updated:";

/// Field name for the solo-guild block.
const SOLO_FIELD_NAME: &str = "__Solo Guilds__";

// ---------------------------------------------------------------------------
// World embeds
// ---------------------------------------------------------------------------

/// Render one world's composition into one or more embeds.
///
/// One field per alliance (in [`WorldSummary::ordered_alliances`] order),
/// solo guilds as a final field on the last part. Follow-up embeds are
/// titled `<World> Guild List (part-N)`.
pub fn build_world_embeds(
    summary: &WorldSummary,
    names: &WorldNames,
    limits: &EmbedLimits,
    generated_at: DateTime<Utc>,
) -> Vec<Embed> {
    let world_name = names.name_of(summary.world_id);

    let mut fields: Vec<EmbedField> = Vec::new();
    for (alliance_id, group) in summary.ordered_alliances() {
        let lines: Vec<String> = group.guilds.iter().map(|g| guild_line(g)).collect();
        fields.extend(split_field(
            group.display_name(alliance_id),
            &lines,
            limits.max_field_chars,
        ));
    }

    let solo_lines: Vec<String> = summary.solo_guilds.iter().map(|g| guild_line(g)).collect();
    if solo_lines.is_empty() {
        fields.push(EmbedField {
            name: SOLO_FIELD_NAME.into(),
            value: "None".into(),
        });
    } else {
        fields.extend(split_field(SOLO_FIELD_NAME, &solo_lines, limits.max_field_chars));
    }

    // Paginate into embeds by the per-message field budget.
    let max_fields = limits.max_fields.max(1);
    fields
        .chunks(max_fields)
        .enumerate()
        .map(|(i, chunk)| {
            let title = if i == 0 {
                format!("{world_name} Guild List")
            } else {
                format!("{world_name} Guild List (part-{})", i + 1)
            };
            Embed {
                author: Some(EmbedAuthor {
                    name: AUTHOR_NAME.into(),
                }),
                title,
                description: None,
                fields: chunk.to_vec(),
                footer: Some(EmbedFooter {
                    text: FOOTER_TEXT.into(),
                }),
                timestamp: generated_at.to_rfc3339(),
            }
        })
        .collect()
}

/// Render the cross-world summary: one jump link per world, linking each
/// world's primary message, in world-id order.
pub fn build_summary_embed(
    links: &BTreeMap<WorldId, Vec<MessageRef>>,
    names: &WorldNames,
    guild_id: &str,
    generated_at: DateTime<Utc>,
) -> Embed {
    let lines: Vec<String> = links
        .iter()
        .filter_map(|(world_id, refs)| {
            refs.first()
                .map(|first| format!("[{}]({})", names.name_of(*world_id), first.jump_url(guild_id)))
        })
        .collect();

    Embed {
        author: Some(EmbedAuthor {
            name: AUTHOR_NAME.into(),
        }),
        title: "Guild Lists Summary".into(),
        description: Some(lines.join("\n")),
        fields: Vec::new(),
        footer: Some(EmbedFooter {
            text: FOOTER_TEXT.into(),
        }),
        timestamp: generated_at.to_rfc3339(),
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// One guild list line: `- Name [TAG]` (tag omitted when blank).
fn guild_line(guild: &rosterboard_shared::GuildRecord) -> String {
    if guild.tag.is_empty() {
        format!("- {}", guild.guild_name)
    } else {
        format!("- {} [{}]", guild.guild_name, guild.tag)
    }
}

/// Split a block of lines into one or more fields, each within
/// `max_field_chars` (measured in characters, the unit the transport limits).
/// Continuation fields are named `Name (1/2)`, `Name (2/2)`, …
fn split_field(name: &str, lines: &[String], max_field_chars: usize) -> Vec<EmbedField> {
    let max_chars = max_field_chars.max(1);
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for line in lines {
        let line = clamp_chars(line, max_chars);
        let line_len = line.chars().count();
        let sep = usize::from(!current.is_empty());

        if current_len + sep + line_len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if !current.is_empty() {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(&line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let total = chunks.len();
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, value)| EmbedField {
            name: if total == 1 {
                name.to_string()
            } else {
                format!("{name} ({}/{total})", i + 1)
            },
            value,
        })
        .collect()
}

/// Hard-clamp a single oversized line to the character budget.
fn clamp_chars(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    s.chars().take(max_chars.saturating_sub(1)).chain(['…']).collect()
}
