use serde::Serialize;

use super::grid::Cell;
use super::tie_break::SessionState;
use super::types::Candidate;

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub session_id: String,
    pub complete: bool,
    pub groups_total: usize,
    pub groups_done: usize,
    pub candidates: usize,
    pub scheduled: usize,
    pub unscheduled: Vec<Candidate>,
    pub participants: Vec<ParticipantLoad>,
}

/// How full one participant's day is
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantLoad {
    pub participant: String,
    pub meetings: usize,
    pub blocked: usize,
    pub open: usize,
}

pub fn summarize(state: &SessionState) -> Summary {
    let participants = state
        .grid
        .rows()
        .iter()
        .map(|row| {
            let count = |pred: fn(&Cell) -> bool| row.cells.iter().filter(|c| pred(c)).count();
            ParticipantLoad {
                participant: row.participant.clone(),
                meetings: count(|c| matches!(c, Cell::Assigned(_))),
                blocked: count(|c| matches!(c, Cell::Blocked)),
                open: count(Cell::is_empty),
            }
        })
        .collect();

    Summary {
        session_id: state.id.clone(),
        complete: state.is_complete(),
        groups_total: state.groups.len(),
        groups_done: state.cursor,
        candidates: state.candidates.len(),
        scheduled: state.candidates.iter().filter(|c| c.scheduled).count(),
        unscheduled: state
            .candidates
            .iter()
            .filter(|c| !c.scheduled)
            .cloned()
            .collect(),
        participants,
    }
}
