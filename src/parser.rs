use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::error::{MatchError, Result};
use crate::schedule::{parse_slot_spec, Kind, Participant, ParticipantTable, Request, Tier};

const ENTITY_COL: &str = "entity";
const TYPE_COL: &str = "type";
const IMPORTANCE_COL: &str = "importance";
const UNAVAILABLE_COL: &str = "unavailable";
const CHOICE_PREFIX: &str = "choice_";
const BACKUP_PREFIX: &str = "backup_";

/// Where each column of interest sits in the header row
struct Columns {
    entity: usize,
    kind: usize,
    importance: usize,
    unavailable: Option<usize>,
    /// Preference columns in header order
    preferences: Vec<(usize, Tier)>,
    choice_count: usize,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
                .ok_or_else(|| {
                    MatchError::validation(format!("missing required column '{}'", name))
                })
        };

        let entity = find(ENTITY_COL)?;
        let kind = find(TYPE_COL)?;
        let importance = find(IMPORTANCE_COL)?;
        let unavailable = find(UNAVAILABLE_COL).ok();

        let preferences: Vec<(usize, Tier)> = headers
            .iter()
            .enumerate()
            .filter_map(|(i, h)| preference_tier(h).map(|tier| (i, tier)))
            .collect();
        let choice_count = preferences
            .iter()
            .filter(|(_, tier)| *tier == Tier::Primary)
            .count();

        if choice_count == 0 {
            return Err(MatchError::validation(format!(
                "at least one '{}<n>' column is required",
                CHOICE_PREFIX
            )));
        }

        Ok(Self {
            entity,
            kind,
            importance,
            unavailable,
            preferences,
            choice_count,
        })
    }
}

/// `choice_<n>` is a primary preference, `backup_<n>` a backup one
fn preference_tier(header: &str) -> Option<Tier> {
    let header = header.trim().to_lowercase();
    let numbered = |prefix: &str| {
        header
            .strip_prefix(prefix)
            .map(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or(false)
    };
    if numbered(CHOICE_PREFIX) {
        Some(Tier::Primary)
    } else if numbered(BACKUP_PREFIX) {
        Some(Tier::Backup)
    } else {
        None
    }
}

/// Loads the participant table from a CSV file
pub fn load_participants<P: AsRef<Path>>(csv_path: P) -> Result<ParticipantTable> {
    let file = std::fs::File::open(csv_path)?;
    parse_participants(file)
}

/// Parses the participant table and flattens its preference cells into requests
///
/// Row numbers in errors count data rows from 1.
pub fn parse_participants<R: Read>(input: R) -> Result<ParticipantTable> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers()?.clone();
    let columns = Columns::locate(&headers)?;

    let mut participants = Vec::new();
    let mut requests = Vec::new();
    let mut seen = HashSet::new();

    for (i, result) in reader.records().enumerate() {
        let record = result?;
        let row = i + 1;
        let get = |col: usize| record.get(col).unwrap_or("").trim();

        // Spreadsheet exports often end in blank lines
        if record.iter().all(|v| v.trim().is_empty()) {
            continue;
        }

        let id = get(columns.entity);
        if id.is_empty() {
            return Err(MatchError::validation_at(row, ENTITY_COL, "entity id is empty"));
        }
        if !seen.insert(id.to_string()) {
            return Err(MatchError::validation_at(
                row,
                ENTITY_COL,
                format!("entity '{}' appears more than once", id),
            ));
        }

        let kind = Kind::from_code(get(columns.kind)).ok_or_else(|| {
            MatchError::validation_at(
                row,
                TYPE_COL,
                format!(
                    "'{}' is not a participant type (0 = Company, 1 = Investor)",
                    get(columns.kind)
                ),
            )
        })?;

        let importance = parse_importance(get(columns.importance))
            .ok_or_else(|| {
                MatchError::validation_at(
                    row,
                    IMPORTANCE_COL,
                    format!("'{}' is not a non-negative number", get(columns.importance)),
                )
            })?;

        let mut participant = Participant::new(id, kind, importance);
        if let Some(col) = columns.unavailable {
            let slots = parse_slot_spec(get(col), columns.choice_count).map_err(|e| match e {
                MatchError::RecoverableInput(message) => {
                    MatchError::validation_at(row, UNAVAILABLE_COL, message)
                }
                other => other,
            })?;
            participant.unavailable = slots;
        }

        for &(col, tier) in &columns.preferences {
            let requested = get(col);
            if !requested.is_empty() {
                requests.push(Request::new(id, requested, tier));
            }
        }

        participants.push(participant);
    }

    tracing::info!(
        participants = participants.len(),
        requests = requests.len(),
        slots = columns.choice_count,
        "Participant table parsed"
    );

    Ok(ParticipantTable {
        participants,
        requests,
        slot_count: columns.choice_count,
    })
}

fn parse_importance(value: &str) -> Option<f64> {
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
}

/// Reads an `entity,slots` availability sheet into (entity, slot spec) pairs
pub fn load_unavailability<P: AsRef<Path>>(csv_path: P) -> Result<Vec<(String, String)>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .from_path(csv_path)?;

    let mut entries = Vec::new();
    for result in reader.records() {
        let record = result?;
        let entity = record.get(0).unwrap_or("").to_string();
        if entity.is_empty() {
            continue;
        }
        let slots = record.iter().skip(1).collect::<Vec<_>>().join(",");
        entries.push((entity, slots));
    }
    Ok(entries)
}
