//! Roster row validation, cleanup, and deduplication.
//!
//! A bad row never aborts the batch: it becomes a [`RowDiagnostic`] and the
//! run proceeds with whatever validated cleanly.

use std::collections::BTreeMap;

use rosterboard_shared::{GuildRecord, WorldId};

use crate::RawGuildRow;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// One rejected input row with the reason it was unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDiagnostic {
    /// Zero-based index of the row in the input.
    pub row: usize,
    /// The row's guild id, when it had one.
    pub guild_id: Option<String>,
    /// Why the row was rejected.
    pub reason: String,
}

/// Validated records plus diagnostics for everything that was rejected.
#[derive(Debug, Default)]
pub struct NormalizeOutcome {
    /// Valid, deduplicated records.
    pub records: Vec<GuildRecord>,
    /// Rejected rows, in input order.
    pub diagnostics: Vec<RowDiagnostic>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Validate raw roster rows into [`GuildRecord`]s.
///
/// Pure function. Rules:
/// - rows missing `guild_id` or `world_id`, or with a non-integer `world_id`,
///   are rejected into diagnostics;
/// - string fields are whitespace-trimmed, guild ids uppercased (the join key
///   used by the live assignment feed);
/// - duplicate `guild_id`s keep the last occurrence — later rows represent
///   newer spreadsheet edits.
pub fn normalize(rows: &[RawGuildRow]) -> NormalizeOutcome {
    let mut by_id: BTreeMap<String, GuildRecord> = BTreeMap::new();
    let mut diagnostics = Vec::new();

    for (index, row) in rows.iter().enumerate() {
        match normalize_row(row) {
            Ok(record) => {
                // Last occurrence wins.
                by_id.insert(record.guild_id.clone(), record);
            }
            Err(reason) => diagnostics.push(RowDiagnostic {
                row: index,
                guild_id: row
                    .guild_id
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_uppercase),
                reason,
            }),
        }
    }

    NormalizeOutcome {
        records: by_id.into_values().collect(),
        diagnostics,
    }
}

fn normalize_row(row: &RawGuildRow) -> std::result::Result<GuildRecord, String> {
    let guild_id =
        non_empty(row.guild_id.as_deref()).ok_or_else(|| "missing guild_id".to_string())?;
    let world_id = parse_world_id(row.world_id.as_ref())?;

    Ok(GuildRecord {
        guild_id: guild_id.to_uppercase(),
        guild_name: non_empty(row.guild_name.as_deref())
            .unwrap_or(guild_id)
            .to_string(),
        tag: non_empty(row.tag.as_deref()).unwrap_or_default().to_string(),
        world_id,
        alliance_id: non_empty(row.alliance_id.as_deref()).map(str::to_string),
        alliance_name: non_empty(row.alliance_name.as_deref()).map(str::to_string),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

fn parse_world_id(
    value: Option<&serde_json::Value>,
) -> std::result::Result<WorldId, String> {
    match value {
        None | Some(serde_json::Value::Null) => Err("missing world_id".into()),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(WorldId)
            .ok_or_else(|| format!("non-integer world_id: {n}")),
        Some(serde_json::Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err("missing world_id".into());
            }
            trimmed
                .parse::<WorldId>()
                .map_err(|_| format!("non-integer world_id: {trimmed:?}"))
        }
        Some(other) => Err(format!("non-integer world_id: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(guild_id: &str, world_id: serde_json::Value) -> RawGuildRow {
        RawGuildRow {
            guild_id: Some(guild_id.into()),
            guild_name: Some(format!("Guild {guild_id}")),
            tag: Some("TAG".into()),
            world_id: Some(world_id),
            alliance_id: None,
            alliance_name: None,
        }
    }

    #[test]
    fn accepts_string_and_numeric_world_ids() {
        let rows = vec![
            raw("a", serde_json::Value::from(1008_u32)),
            raw("b", serde_json::Value::from("2101")),
        ];

        let outcome = normalize(&rows);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].world_id, WorldId(1008));
        assert_eq!(outcome.records[1].world_id, WorldId(2101));
    }

    #[test]
    fn rejects_missing_guild_id_without_aborting() {
        let rows = vec![
            RawGuildRow {
                guild_id: None,
                world_id: Some(serde_json::Value::from(1_u32)),
                ..Default::default()
            },
            raw("ok", serde_json::Value::from(1_u32)),
        ];

        let outcome = normalize(&rows);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].row, 0);
        assert_eq!(outcome.diagnostics[0].reason, "missing guild_id");
    }

    #[test]
    fn rejects_missing_and_non_integer_world_ids() {
        let rows = vec![
            RawGuildRow {
                guild_id: Some("no-world".into()),
                ..Default::default()
            },
            raw("text-world", serde_json::Value::from("abc")),
            raw("float-world", serde_json::Value::from(3.5)),
            raw("ok", serde_json::Value::from(7_u32)),
        ];

        let outcome = normalize(&rows);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].guild_id, "OK");
        assert_eq!(outcome.diagnostics.len(), 3);
        assert_eq!(outcome.diagnostics[0].reason, "missing world_id");
        assert!(outcome.diagnostics[1].reason.contains("non-integer"));
        assert!(outcome.diagnostics[2].reason.contains("non-integer"));
    }

    #[test]
    fn trims_whitespace_and_uppercases_guild_id() {
        let rows = vec![RawGuildRow {
            guild_id: Some("  abc-def  ".into()),
            guild_name: Some("  Spaced Name  ".into()),
            tag: Some(" TAG ".into()),
            world_id: Some(serde_json::Value::from(" 1008 ")),
            alliance_id: Some("   ".into()),
            alliance_name: None,
        }];

        let outcome = normalize(&rows);
        let record = &outcome.records[0];
        assert_eq!(record.guild_id, "ABC-DEF");
        assert_eq!(record.guild_name, "Spaced Name");
        assert_eq!(record.tag, "TAG");
        assert_eq!(record.world_id, WorldId(1008));
        // Blank alliance id means solo.
        assert!(record.is_solo());
    }

    #[test]
    fn duplicate_guild_id_keeps_last_occurrence() {
        let mut first = raw("dup", serde_json::Value::from(1_u32));
        first.guild_name = Some("Old Name".into());
        let mut second = raw("dup", serde_json::Value::from(2_u32));
        second.guild_name = Some("New Name".into());

        let outcome = normalize(&[first, second]);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].guild_name, "New Name");
        assert_eq!(outcome.records[0].world_id, WorldId(2));
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn alliance_fields_survive_normalization() {
        let rows = vec![RawGuildRow {
            guild_id: Some("g1".into()),
            guild_name: Some("One".into()),
            tag: Some("ONE".into()),
            world_id: Some(serde_json::Value::from(1_u32)),
            alliance_id: Some("alliance-9".into()),
            alliance_name: Some("The Ninth".into()),
        }];

        let outcome = normalize(&rows);
        let record = &outcome.records[0];
        assert_eq!(record.alliance_id.as_deref(), Some("alliance-9"));
        assert_eq!(record.alliance_name.as_deref(), Some("The Ninth"));
        assert!(!record.is_solo());
    }
}
