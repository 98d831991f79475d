use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{MatchError, Result};
use super::aggregate::{aggregate_candidates, score_groups};
use super::assign::{assign_in_order, RequestLookup};
use super::grid::SlotGrid;
use super::scorer::score_requests;
use super::types::{Candidate, CandidateId, Participant, ParticipantTable};

/// Token that accepts the contested rows in the order shown
pub const KEEP_ORDER: &str = "keep";

/// Where a session is in the group-by-group assignment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Phase {
    /// Scored and grouped; availability may still be amended
    Initialized,
    /// Between groups; the next call enters the group under the cursor
    Advancing,
    /// The current group has contested rows waiting for an order
    AwaitingInput(PendingGroup),
    /// Every group has been consumed
    Complete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingGroup {
    pub contested: Vec<CandidateId>,
    /// Size of the whole group, counted as processed once resolved
    pub group_size: usize,
}

/// Contested rows of one tie group, shown to whoever decides the order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TieBreakPrompt {
    /// Group number; must be echoed back with the order
    pub group: usize,
    pub score: f64,
    pub rows: Vec<Candidate>,
}

/// Everything that survives between two rounds of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub id: String,
    pub created_at: String,
    pub participants: Vec<Participant>,
    pub candidates: Vec<Candidate>,
    pub grid: SlotGrid,
    pub lookup: RequestLookup,
    /// Distinct scores, descending; fixed at creation
    pub groups: Vec<f64>,
    pub cursor: usize,
    /// Candidates whose group has been fully handled
    pub processed: usize,
    pub phase: Phase,
}

impl SessionState {
    /// Scores, aggregates and groups a participant table into a fresh session
    pub fn build(id: impl Into<String>, table: &ParticipantTable) -> Result<Self> {
        let scored = score_requests(&table.participants, &table.requests);
        let candidates = aggregate_candidates(&scored)?;

        let kinds: HashMap<&str, _> = table
            .participants
            .iter()
            .map(|p| (p.id.as_str(), p.kind))
            .collect();
        if let Some(bad) = candidates
            .iter()
            .find(|c| kinds.get(c.entity1.as_str()) == kinds.get(c.entity2.as_str()))
        {
            return Err(MatchError::InternalConsistency(format!(
                "candidate {} pairs two participants of the same kind",
                bad.id
            )));
        }

        let mut grid = SlotGrid::new(
            table.participants.iter().map(|p| p.id.clone()),
            table.slot_count,
        );
        for participant in &table.participants {
            if participant.unavailable.is_empty() {
                continue;
            }
            grid.block_slots(&participant.id, &participant.unavailable)
                .map_err(|e| MatchError::Validation {
                    row: None,
                    field: Some("unavailable".to_string()),
                    message: format!("participant '{}': {}", participant.id, e),
                })?;
        }

        let groups = score_groups(&candidates);
        let id = id.into();
        tracing::info!(
            session_id = %id,
            participants = table.participants.len(),
            candidates = candidates.len(),
            groups = groups.len(),
            slots = table.slot_count,
            "Session initialized"
        );

        Ok(Self {
            id,
            created_at: chrono::Utc::now().to_rfc3339(),
            participants: table.participants.clone(),
            candidates,
            grid,
            lookup: RequestLookup::from_requests(&table.requests),
            groups,
            cursor: 0,
            processed: 0,
            phase: Phase::Initialized,
        })
    }

    /// Rebuilds derived lookups after loading from storage
    pub fn restore(&mut self) {
        self.grid.reindex();
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Amends availability; only allowed before any group has been processed
    pub fn block_unavailability(&mut self, participant: &str, slot_spec: &str) -> Result<()> {
        if self.phase != Phase::Initialized {
            return Err(MatchError::RecoverableInput(
                "availability can only be changed before assignment starts".to_string(),
            ));
        }
        self.grid.block_unavailability(participant, slot_spec)
    }

    /// Works through groups until one needs an external order or none remain
    ///
    /// Returns the pending prompt, or `None` once the session is complete. A
    /// prompt that is already pending is returned again unchanged.
    pub fn advance(&mut self) -> Result<Option<TieBreakPrompt>> {
        loop {
            match &self.phase {
                Phase::Complete => return Ok(None),
                Phase::AwaitingInput(pending) => return Ok(Some(self.prompt_for(pending))),
                Phase::Initialized | Phase::Advancing => {}
            }

            if self.cursor >= self.groups.len() {
                self.finish()?;
                continue;
            }

            let score = self.groups[self.cursor];
            let members: Vec<CandidateId> = self
                .candidates
                .iter()
                .filter(|c| c.score == score)
                .map(|c| c.id)
                .collect();

            let (singles, contested) = self.split_group(&members);
            let placed =
                assign_in_order(&singles, &mut self.candidates, &mut self.grid, &self.lookup)?;
            self.grid.check_consistency()?;

            tracing::info!(
                session_id = %self.id,
                group = self.cursor,
                score,
                size = members.len(),
                singles = singles.len(),
                placed,
                contested = contested.len(),
                "Entered tie group"
            );

            if contested.is_empty() {
                self.processed += members.len();
                self.cursor += 1;
                self.phase = Phase::Advancing;
            } else {
                self.phase = Phase::AwaitingInput(PendingGroup {
                    contested,
                    group_size: members.len(),
                });
            }
        }
    }

    /// Applies an externally chosen order to the pending group
    pub fn resolve(&mut self, group: usize, order: &str) -> Result<()> {
        let pending = match &self.phase {
            Phase::AwaitingInput(pending) if group == self.cursor => pending.clone(),
            Phase::AwaitingInput(_) => {
                return Err(MatchError::RecoverableInput(format!(
                    "group {} is not pending; group {} is awaiting an order",
                    group, self.cursor
                )))
            }
            _ => {
                return Err(MatchError::RecoverableInput(format!(
                    "no tie-break is pending (group {} already handled)",
                    group
                )))
            }
        };

        let resolved = parse_order(order, &pending.contested)?;
        let placed =
            assign_in_order(&resolved, &mut self.candidates, &mut self.grid, &self.lookup)?;
        self.grid.check_consistency()?;

        tracing::info!(
            session_id = %self.id,
            group,
            placed,
            of = resolved.len(),
            "Tie group resolved"
        );

        self.processed += pending.group_size;
        self.cursor += 1;
        self.phase = Phase::Advancing;
        if self.cursor >= self.groups.len() {
            self.finish()?;
        }
        Ok(())
    }

    /// Splits a group into singles and contested rows after pruning
    ///
    /// Contested rows with no feasible shared slot are dropped; dropping one
    /// can turn another contested row into a single, so this repeats until
    /// nothing changes. Dropped rows stay unscheduled.
    fn split_group(&self, members: &[CandidateId]) -> (Vec<CandidateId>, Vec<CandidateId>) {
        let mut live: Vec<&Candidate> = members
            .iter()
            .filter_map(|id| self.candidate(*id))
            .collect();

        loop {
            let contested = contested_flags(&live);
            let infeasible: HashSet<CandidateId> = live
                .iter()
                .zip(&contested)
                .filter(|&(c, &is_contested)| {
                    is_contested && self.grid.earliest_common_slot(&c.entity1, &c.entity2).is_none()
                })
                .map(|(c, _)| c.id)
                .collect();

            if infeasible.is_empty() {
                let mut singles = Vec::new();
                let mut contested_ids = Vec::new();
                for (c, is_contested) in live.iter().zip(contested) {
                    if is_contested {
                        contested_ids.push(c.id);
                    } else {
                        singles.push(c.id);
                    }
                }
                return (singles, contested_ids);
            }

            tracing::debug!(pruned = infeasible.len(), "Pruned infeasible contested rows");
            live.retain(|c| !infeasible.contains(&c.id));
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.processed != self.candidates.len() {
            return Err(MatchError::InternalConsistency(format!(
                "processed {} candidates but the table holds {}",
                self.processed,
                self.candidates.len()
            )));
        }
        self.phase = Phase::Complete;
        tracing::info!(
            session_id = %self.id,
            scheduled = self.candidates.iter().filter(|c| c.scheduled).count(),
            total = self.candidates.len(),
            "Session complete"
        );
        Ok(())
    }

    fn candidate(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    fn prompt_for(&self, pending: &PendingGroup) -> TieBreakPrompt {
        TieBreakPrompt {
            group: self.cursor,
            score: self.groups[self.cursor],
            rows: pending
                .contested
                .iter()
                .filter_map(|id| self.candidate(*id).cloned())
                .collect(),
        }
    }
}

/// Marks rows that share a participant with another row of the same set
fn contested_flags(rows: &[&Candidate]) -> Vec<bool> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for c in rows {
        *counts.entry(c.entity1.as_str()).or_insert(0) += 1;
        *counts.entry(c.entity2.as_str()).or_insert(0) += 1;
    }
    rows.iter()
        .map(|c| counts[c.entity1.as_str()] > 1 || counts[c.entity2.as_str()] > 1)
        .collect()
}

/// Parses a tie-break answer into the full contested order
///
/// `keep` leaves the order as shown. Otherwise the listed ids go first and any
/// contested ids left out follow in their shown order.
pub fn parse_order(text: &str, contested: &[CandidateId]) -> Result<Vec<CandidateId>> {
    if text.trim().eq_ignore_ascii_case(KEEP_ORDER) {
        return Ok(contested.to_vec());
    }

    let mut order: Vec<CandidateId> = Vec::new();
    for token in text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
    {
        let id = token.parse::<usize>().map(CandidateId).map_err(|_| {
            MatchError::RecoverableInput(format!("'{}' is not a row number", token))
        })?;
        if !contested.contains(&id) {
            return Err(MatchError::RecoverableInput(format!(
                "row {} is not one of the tied rows",
                id
            )));
        }
        if order.contains(&id) {
            return Err(MatchError::RecoverableInput(format!("row {} listed twice", id)));
        }
        order.push(id);
    }

    if order.is_empty() {
        return Err(MatchError::RecoverableInput(format!(
            "expected '{}' or a list of row numbers",
            KEEP_ORDER
        )));
    }

    for id in contested {
        if !order.contains(id) {
            order.push(*id);
        }
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::grid::Cell;
    use crate::schedule::types::{Kind, Request, Tier};

    fn table(
        participants: Vec<Participant>,
        requests: Vec<Request>,
        slots: usize,
    ) -> ParticipantTable {
        ParticipantTable {
            participants,
            requests,
            slot_count: slots,
        }
    }

    /// C1 requested by two investors and C2/I3 on their own, all at score 1
    fn tied_table(slots: usize) -> ParticipantTable {
        table(
            vec![
                Participant::new("C1", Kind::Company, 1.0),
                Participant::new("C2", Kind::Company, 1.0),
                Participant::new("I1", Kind::Investor, 1.0),
                Participant::new("I2", Kind::Investor, 1.0),
                Participant::new("I3", Kind::Investor, 1.0),
            ],
            vec![
                Request::new("C1", "I1", Tier::Primary),
                Request::new("C1", "I2", Tier::Primary),
                Request::new("C2", "I3", Tier::Primary),
            ],
            slots,
        )
    }

    #[test]
    fn test_build_groups_by_score() {
        let state = SessionState::build("s", &tied_table(1)).unwrap();
        assert_eq!(state.groups, vec![1.0]);
        assert_eq!(state.candidates.len(), 3);
        assert_eq!(state.phase, Phase::Initialized);
    }

    #[test]
    fn test_single_assigned_before_prompt() {
        let mut state = SessionState::build("s", &tied_table(1)).unwrap();
        let prompt = state.advance().unwrap().expect("contested rows");

        assert_eq!(prompt.group, 0);
        let ids: Vec<usize> = prompt.rows.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![0, 1]);
        assert_eq!(state.grid.cell("C2", 1), Some(&Cell::Assigned("I3".into())));
        assert!(!state.is_complete());

        // asking again returns the same prompt
        assert_eq!(state.advance().unwrap(), Some(prompt));
    }

    #[test]
    fn test_keep_order() {
        let mut state = SessionState::build("s", &tied_table(1)).unwrap();
        state.advance().unwrap();
        state.resolve(0, "keep").unwrap();

        assert!(state.is_complete());
        assert_eq!(state.grid.cell("C1", 1), Some(&Cell::Assigned("I1".into())));
        assert!(state.candidates[0].scheduled);
        assert!(!state.candidates[1].scheduled);
        assert_eq!(state.processed, 3);
    }

    #[test]
    fn test_explicit_reorder() {
        let mut state = SessionState::build("s", &tied_table(1)).unwrap();
        state.advance().unwrap();
        state.resolve(0, "1 0").unwrap();

        assert_eq!(state.grid.cell("C1", 1), Some(&Cell::Assigned("I2".into())));
        assert!(!state.candidates[0].scheduled);
        assert!(state.candidates[1].scheduled);
    }

    #[test]
    fn test_both_contested_fit_with_two_slots() {
        let mut state = SessionState::build("s", &tied_table(2)).unwrap();
        state.advance().unwrap();
        state.resolve(0, "1").unwrap();

        assert_eq!(state.grid.cell("C1", 1), Some(&Cell::Assigned("I2".into())));
        assert_eq!(state.grid.cell("C1", 2), Some(&Cell::Assigned("I1".into())));
        assert!(state.candidates.iter().all(|c| c.scheduled));
    }

    #[test]
    fn test_bad_answers_leave_state_alone() {
        let mut state = SessionState::build("s", &tied_table(1)).unwrap();
        state.advance().unwrap();
        let before = state.clone();

        for answer in ["", "zero", "2", "0 0", "0, x"] {
            let err = state.resolve(0, answer).unwrap_err();
            assert!(err.is_recoverable(), "answer {:?}", answer);
        }
        assert!(state.resolve(5, "keep").unwrap_err().is_recoverable());
        assert_eq!(state, before);
    }

    #[test]
    fn test_resubmission_after_advance_is_rejected() {
        let mut state = SessionState::build("s", &tied_table(1)).unwrap();
        state.advance().unwrap();
        state.resolve(0, "keep").unwrap();
        assert!(state.resolve(0, "keep").unwrap_err().is_recoverable());
    }

    #[test]
    fn test_pruning_demotes_to_single() {
        // I1 has no open slot, so C1-I1 drops out and C1-I2 needs no decision
        let mut t = tied_table(1);
        t.participants[2] = Participant::new("I1", Kind::Investor, 1.0).with_unavailable([1]);
        let mut state = SessionState::build("s", &t).unwrap();

        assert_eq!(state.advance().unwrap(), None);
        assert!(state.is_complete());
        assert_eq!(state.grid.cell("C1", 1), Some(&Cell::Assigned("I2".into())));
        assert!(!state.candidates[0].scheduled);
        assert_eq!(state.processed, state.candidates.len());
    }

    #[test]
    fn test_pruning_when_open_slots_do_not_overlap() {
        // C1 is only free in slot 2 and I1 only in slot 1
        let mut t = tied_table(2);
        t.participants[0] = Participant::new("C1", Kind::Company, 1.0).with_unavailable([1]);
        t.participants[2] = Participant::new("I1", Kind::Investor, 1.0).with_unavailable([2]);
        let mut state = SessionState::build("s", &t).unwrap();

        assert_eq!(state.advance().unwrap(), None);
        assert!(state.is_complete());
        assert!(!state.candidates[0].scheduled);
        assert!(state.candidates[1].scheduled);
        assert_eq!(state.grid.cell("C1", 2), Some(&Cell::Assigned("I2".into())));
        assert_eq!(state.grid.cell("I1", 1), Some(&Cell::Empty));
        assert_eq!(state.processed, state.candidates.len());
    }

    #[test]
    fn test_availability_locked_after_start() {
        let mut state = SessionState::build("s", &tied_table(2)).unwrap();
        state.block_unavailability("I3", "2").unwrap();
        state.advance().unwrap();
        assert!(state.block_unavailability("I3", "1").unwrap_err().is_recoverable());
    }

    #[test]
    fn test_parse_order_appends_unlisted() {
        let contested = [CandidateId(4), CandidateId(7), CandidateId(9)];
        assert_eq!(
            parse_order("9", &contested).unwrap(),
            vec![CandidateId(9), CandidateId(4), CandidateId(7)]
        );
        assert_eq!(parse_order(" KEEP ", &contested).unwrap(), contested.to_vec());
    }

    #[test]
    fn test_empty_session_completes() {
        let t = table(vec![Participant::new("C1", Kind::Company, 1.0)], vec![], 2);
        let mut state = SessionState::build("s", &t).unwrap();
        assert_eq!(state.advance().unwrap(), None);
        assert!(state.is_complete());
    }
}
