use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};

/// Marker written to blocked cells in the exported grid
pub const BLOCKED: &str = "N/A";

/// Contents of one participant/slot cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cell {
    Empty,
    Blocked,
    Assigned(String),
}

impl Cell {
    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Text used in the interchange CSV
    pub fn as_text(&self) -> &str {
        match self {
            Cell::Empty => "",
            Cell::Blocked => BLOCKED,
            Cell::Assigned(id) => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRow {
    pub participant: String,
    pub cells: Vec<Cell>,
    /// Whether the meeting in each slot was asked for by either side
    pub requested: Vec<bool>,
}

/// Participant x meeting-slot assignment matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotGrid {
    slot_count: usize,
    rows: Vec<GridRow>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl SlotGrid {
    /// One empty row per participant, in the given order
    pub fn new<I, S>(participants: I, slot_count: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rows: Vec<GridRow> = participants
            .into_iter()
            .map(|p| GridRow {
                participant: p.into(),
                cells: vec![Cell::Empty; slot_count],
                requested: vec![false; slot_count],
            })
            .collect();
        let mut grid = Self {
            slot_count,
            rows,
            index: HashMap::new(),
        };
        grid.reindex();
        grid
    }

    /// Rebuilds the id lookup; needed after deserializing
    pub fn reindex(&mut self) {
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| (row.participant.clone(), i))
            .collect();
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub fn contains(&self, participant: &str) -> bool {
        self.index.contains_key(participant)
    }

    pub fn row(&self, participant: &str) -> Option<&GridRow> {
        self.index.get(participant).map(|&i| &self.rows[i])
    }

    /// Cell at a 1-based slot number
    pub fn cell(&self, participant: &str, slot: usize) -> Option<&Cell> {
        if slot == 0 {
            return None;
        }
        self.row(participant).and_then(|row| row.cells.get(slot - 1))
    }

    pub fn requested_flag(&self, participant: &str, slot: usize) -> Option<bool> {
        if slot == 0 {
            return None;
        }
        self.row(participant).and_then(|row| row.requested.get(slot - 1).copied())
    }

    /// Marks the given 1-based slots as unavailable for one participant
    ///
    /// Every slot is validated before any cell changes, so a rejected call
    /// leaves the grid as it was. Blocking an already-blocked slot is a no-op.
    pub fn block_slots(&mut self, participant: &str, slots: &BTreeSet<usize>) -> Result<()> {
        let row_idx = *self.index.get(participant).ok_or_else(|| {
            MatchError::RecoverableInput(format!("unknown participant '{}'", participant))
        })?;

        for &slot in slots {
            if slot < 1 || slot > self.slot_count {
                return Err(MatchError::RecoverableInput(format!(
                    "slot {} is out of range 1-{}",
                    slot, self.slot_count
                )));
            }
            if let Cell::Assigned(other) = &self.rows[row_idx].cells[slot - 1] {
                return Err(MatchError::RecoverableInput(format!(
                    "slot {} of '{}' already holds a meeting with '{}'",
                    slot, participant, other
                )));
            }
        }

        let row = &mut self.rows[row_idx];
        for &slot in slots {
            row.cells[slot - 1] = Cell::Blocked;
        }
        Ok(())
    }

    /// Parses a slot specification and blocks those slots
    pub fn block_unavailability(&mut self, participant: &str, slot_spec: &str) -> Result<()> {
        let slots = parse_slot_spec(slot_spec, self.slot_count)?;
        self.block_slots(participant, &slots)
    }

    /// Empty slot numbers for a participant, ascending
    pub fn open_slots(&self, participant: &str) -> Vec<usize> {
        self.row(participant)
            .map(|row| {
                row.cells
                    .iter()
                    .enumerate()
                    .filter(|(_, cell)| cell.is_empty())
                    .map(|(i, _)| i + 1)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Earliest slot open for both participants
    pub fn earliest_common_slot(&self, a: &str, b: &str) -> Option<usize> {
        let (row_a, row_b) = (self.row(a)?, self.row(b)?);
        row_a
            .cells
            .iter()
            .zip(&row_b.cells)
            .position(|(x, y)| x.is_empty() && y.is_empty())
            .map(|i| i + 1)
    }

    /// Writes a meeting into both participants' rows at the same slot
    pub fn assign(&mut self, a: &str, b: &str, slot: usize, requested: bool) -> Result<()> {
        let (ia, ib) = match (self.index.get(a), self.index.get(b)) {
            (Some(&ia), Some(&ib)) if ia != ib => (ia, ib),
            _ => {
                return Err(MatchError::InternalConsistency(format!(
                    "cannot assign meeting between '{}' and '{}'",
                    a, b
                )))
            }
        };
        if slot < 1 || slot > self.slot_count {
            return Err(MatchError::InternalConsistency(format!(
                "slot {} is out of range 1-{}",
                slot, self.slot_count
            )));
        }
        let k = slot - 1;
        if !self.rows[ia].cells[k].is_empty() || !self.rows[ib].cells[k].is_empty() {
            return Err(MatchError::InternalConsistency(format!(
                "slot {} is not free for both '{}' and '{}'",
                slot, a, b
            )));
        }

        self.rows[ia].cells[k] = Cell::Assigned(b.to_string());
        self.rows[ia].requested[k] = requested;
        self.rows[ib].cells[k] = Cell::Assigned(a.to_string());
        self.rows[ib].requested[k] = requested;
        Ok(())
    }

    /// Verifies that every assigned cell is mirrored by its counterpart
    pub fn check_consistency(&self) -> Result<()> {
        for row in &self.rows {
            for (k, cell) in row.cells.iter().enumerate() {
                let Cell::Assigned(other) = cell else {
                    continue;
                };
                let mirrored = self
                    .row(other)
                    .and_then(|r| r.cells.get(k))
                    .map(|c| *c == Cell::Assigned(row.participant.clone()))
                    .unwrap_or(false);
                if !mirrored {
                    return Err(MatchError::InternalConsistency(format!(
                        "'{}' meets '{}' in slot {} but the counterpart row disagrees",
                        row.participant,
                        other,
                        k + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Number of meetings placed (each counted once)
    pub fn meeting_count(&self) -> usize {
        self.rows
            .iter()
            .flat_map(|r| &r.cells)
            .filter(|c| matches!(c, Cell::Assigned(_)))
            .count()
            / 2
    }

    /// Column headers of the exported grid: entity, mtg1, mtg1_req, ...
    pub fn headers(&self) -> Vec<String> {
        let mut headers = vec!["entity".to_string()];
        for slot in 1..=self.slot_count {
            headers.push(format!("mtg{}", slot));
            headers.push(format!("mtg{}_req", slot));
        }
        headers
    }
}

/// Parses a slot list such as "1, 3 5-7" into slot numbers
///
/// Tokens are separated by commas and/or whitespace. `a-b` is an inclusive
/// range. Every slot must lie in `1..=slot_count`; bounds are checked before a
/// range is expanded.
pub fn parse_slot_spec(spec: &str, slot_count: usize) -> Result<BTreeSet<usize>> {
    let mut slots = BTreeSet::new();

    for token in spec
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let parse = |s: &str| {
            let slot = s.trim().parse::<usize>().map_err(|_| {
                MatchError::RecoverableInput(format!("'{}' is not a slot number", token))
            })?;
            if slot < 1 || slot > slot_count {
                return Err(MatchError::RecoverableInput(format!(
                    "slot {} is out of range 1-{}",
                    slot, slot_count
                )));
            }
            Ok(slot)
        };

        match token.split_once('-') {
            Some((lo, hi)) => {
                let (lo, hi) = (parse(lo)?, parse(hi)?);
                if lo > hi {
                    return Err(MatchError::RecoverableInput(format!(
                        "slot range '{}' runs backwards",
                        token
                    )));
                }
                slots.extend(lo..=hi);
            }
            None => {
                slots.insert(parse(token)?);
            }
        }
    }

    Ok(slots)
}
