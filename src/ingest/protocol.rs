//! Wire format shared with the graph engine.
//!
//! Engine stdout is free text with at most one structured JSON line per
//! operation; [`find_reply`] scans for it. Engine stdin carries either NDJSON
//! envelopes (stream mode) or sentinel-delimited CSV (bulk mode).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::collections::BTreeMap;

use super::error::{IngestError, IngestResult};
use crate::graph::{GraphEntity, GraphRelationship, RelationshipType};

pub const ENTITY_HEADER: &str = "id,kind,name,text,filePath,line,column,pos,end,flags";
pub const RELATIONSHIP_HEADER: &str = "from,to,type,evidence,confidence,metadata";
pub const ENTITIES_START: &str = "ENTITIES_START";
pub const COMPLETE: &str = "COMPLETE";

/// One row of a query result, keyed by column header.
pub type QueryRow = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestStats {
    pub entities: usize,
    pub relationships: usize,
    /// Engine-reported duration, in milliseconds.
    pub duration: f64,
}

/// Handshake reply: `{"type":"ack","ready":true,...}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HandshakeAck {
    pub ready: bool,
    pub version: Option<String>,
    pub capabilities: Vec<String>,
}

/// Completion reply: `{"type":"result","success":...}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ResultReply {
    pub success: bool,
    pub stats: Option<IngestStats>,
    pub errors: Vec<String>,
}

impl ResultReply {
    pub fn into_stats(self) -> IngestResult<IngestStats> {
        if self.success {
            Ok(self.stats.unwrap_or_default())
        } else {
            Err(IngestError::Remote {
                errors: self.errors,
            })
        }
    }
}

/// First stdout line that is a JSON object whose `type` is `expected`.
/// Every other line is noise.
pub fn find_reply(stdout: &str, expected: &str) -> Option<Value> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .find(|value| value.get("type").and_then(Value::as_str) == Some(expected))
}

/// Like [`find_reply`], but a missing line is a protocol error carrying the
/// raw output.
pub fn parse_reply<T: serde::de::DeserializeOwned>(stdout: &str, expected: &str) -> IngestResult<T> {
    let value = find_reply(stdout, expected).ok_or_else(|| IngestError::ProtocolParse {
        expected: expected.to_string(),
        raw: stdout.to_string(),
    })?;
    Ok(serde_json::from_value(value)?)
}

/// One NDJSON frame on stream-mode stdin.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEnvelope<'a> {
    Entities {
        data: &'a [GraphEntity],
    },
    Relationships {
        #[serde(rename = "relationshipType")]
        relationship_type: RelationshipType,
        data: &'a [&'a GraphRelationship],
    },
    Complete,
}

impl StreamEnvelope<'_> {
    pub fn encode(&self) -> IngestResult<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }
}

pub type RelationshipGroups<'a> = BTreeMap<RelationshipType, Vec<&'a GraphRelationship>>;

/// Relationships bucketed by type, each bucket in input order.
pub fn group_relationships(relationships: &[GraphRelationship]) -> RelationshipGroups<'_> {
    let mut groups: RelationshipGroups<'_> = BTreeMap::new();
    for rel in relationships {
        groups.entry(rel.rel_type).or_default().push(rel);
    }
    groups
}

/// Every stream-mode frame in send order: entity batches, then relationship
/// batches per type, then `complete`.
pub fn plan_stream<'a>(
    entities: &'a [GraphEntity],
    groups: &'a RelationshipGroups<'a>,
    batch_size: usize,
) -> Vec<StreamEnvelope<'a>> {
    let batch_size = batch_size.max(1);
    let mut plan: Vec<StreamEnvelope<'a>> = entities
        .chunks(batch_size)
        .map(|data| StreamEnvelope::Entities { data })
        .collect();
    for (rel_type, rels) in groups {
        plan.extend(rels.chunks(batch_size).map(|data| StreamEnvelope::Relationships {
            relationship_type: *rel_type,
            data,
        }));
    }
    plan.push(StreamEnvelope::Complete);
    plan
}

/// One bulk-mode frame: a sentinel with its header, or a run of rows.
#[derive(Debug)]
pub enum BulkFrame<'a> {
    Section { sentinel: String, header: &'static str },
    EntityRows(&'a [GraphEntity]),
    RelationshipRows(&'a [&'a GraphRelationship]),
    Complete,
}

impl BulkFrame<'_> {
    pub fn encode(&self) -> IngestResult<Vec<u8>> {
        let mut out = String::new();
        match self {
            BulkFrame::Section { sentinel, header } => {
                out.push_str(sentinel);
                out.push('\n');
                out.push_str(header);
                out.push('\n');
            }
            BulkFrame::EntityRows(rows) => {
                for entity in rows.iter() {
                    out.push_str(&entity_row(entity));
                    out.push('\n');
                }
            }
            BulkFrame::RelationshipRows(rows) => {
                for rel in rows.iter() {
                    out.push_str(&relationship_row(rel)?);
                    out.push('\n');
                }
            }
            BulkFrame::Complete => {
                out.push_str(COMPLETE);
                out.push('\n');
            }
        }
        Ok(out.into_bytes())
    }
}

pub fn relationship_sentinel(rel_type: RelationshipType) -> String {
    format!("RELATIONSHIPS_{}_START", rel_type.as_str())
}

/// Every bulk-mode frame in send order. Rows are grouped `batch_size` per
/// frame; a frame boundary never splits a row.
pub fn plan_bulk<'a>(
    entities: &'a [GraphEntity],
    groups: &'a RelationshipGroups<'a>,
    batch_size: usize,
) -> Vec<BulkFrame<'a>> {
    let batch_size = batch_size.max(1);
    let mut plan = vec![BulkFrame::Section {
        sentinel: ENTITIES_START.to_string(),
        header: ENTITY_HEADER,
    }];
    plan.extend(entities.chunks(batch_size).map(BulkFrame::EntityRows));
    for (rel_type, rels) in groups {
        plan.push(BulkFrame::Section {
            sentinel: relationship_sentinel(*rel_type),
            header: RELATIONSHIP_HEADER,
        });
        plan.extend(rels.chunks(batch_size).map(BulkFrame::RelationshipRows));
    }
    plan.push(BulkFrame::Complete);
    plan
}

/// Quote a field when it contains a comma, quote or newline.
pub fn csv_escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Inverse of [`csv_escape`] for a single field.
pub fn csv_unescape(field: &str) -> Cow<'_, str> {
    match field
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    {
        Some(inner) => Cow::Owned(inner.replace("\"\"", "\"")),
        None => Cow::Borrowed(field),
    }
}

pub fn entity_row(entity: &GraphEntity) -> String {
    [
        csv_escape(entity.id.as_str()),
        csv_escape(entity.kind.as_str()),
        csv_escape(&entity.name),
        csv_escape(&entity.text),
        csv_escape(&entity.file_path),
        Cow::Owned(entity.line.to_string()),
        Cow::Owned(entity.column.to_string()),
        Cow::Owned(entity.pos.to_string()),
        Cow::Owned(entity.end.to_string()),
        Cow::Owned(entity.flags.to_string()),
    ]
    .join(",")
}

pub fn relationship_row(rel: &GraphRelationship) -> IngestResult<String> {
    let metadata = serde_json::to_string(&rel.metadata)?;
    Ok([
        csv_escape(rel.from.as_str()),
        csv_escape(rel.to.as_str()),
        csv_escape(rel.rel_type.as_str()),
        csv_escape(&rel.evidence),
        csv_escape(rel.confidence.as_str()),
        csv_escape(&metadata),
    ]
    .join(","))
}

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("valid integer pattern"));

/// A rule line such as `|----|----|` or `+--+--+`.
fn is_separator(line: &str) -> bool {
    line.contains(['-', '='])
        && line
            .chars()
            .all(|c| matches!(c, '-' | '+' | '|' | ':' | '=' | ' '))
}

fn is_table_line(line: &str) -> bool {
    line.contains('|') && !line.starts_with('{') && !is_separator(line)
}

fn cells(line: &str) -> Vec<&str> {
    let line = line.trim();
    let line = line.strip_prefix('|').unwrap_or(line);
    let line = line.strip_suffix('|').unwrap_or(line);
    line.split('|').map(str::trim).collect()
}

fn cell_value(cell: &str) -> Value {
    if INTEGER.is_match(cell) {
        if let Ok(n) = cell.parse::<u64>() {
            return Value::from(n);
        }
    }
    Value::String(cell.to_string())
}

/// Parse a `|`-delimited table out of free-form engine output.
///
/// The header is the first line that either starts with `|` or sits directly
/// above a separator rule. With a bordered header, rows must be bordered too.
/// Separator rules and structured JSON lines are skipped. Cells matching
/// `^\d+$` become integers.
pub fn parse_query_table(stdout: &str) -> Vec<QueryRow> {
    let lines: Vec<&str> = stdout.lines().map(str::trim).collect();
    let Some(start) = (0..lines.len()).find(|&i| {
        is_table_line(lines[i])
            && (lines[i].starts_with('|') || lines.get(i + 1).is_some_and(|next| is_separator(next)))
    }) else {
        return Vec::new();
    };

    let header = lines[start];
    let bordered = header.starts_with('|');
    let columns: Vec<String> = cells(header).into_iter().map(str::to_string).collect();

    lines[start + 1..]
        .iter()
        .filter(|line| is_table_line(line) && (!bordered || line.starts_with('|')))
        .map(|line| {
            let values = cells(line);
            columns
                .iter()
                .enumerate()
                .map(|(idx, column)| {
                    let value = values.get(idx).map_or(Value::Null, |cell| cell_value(cell));
                    (column.clone(), value)
                })
                .collect()
        })
        .collect()
}
