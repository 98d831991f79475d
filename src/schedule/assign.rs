use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use super::grid::SlotGrid;
use super::types::{Candidate, CandidateId, Request};

/// Directed (requester, requested) pairs from the request table, any tier
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLookup {
    pairs: BTreeSet<(String, String)>,
}

impl RequestLookup {
    pub fn from_requests(requests: &[Request]) -> Self {
        Self {
            pairs: requests
                .iter()
                .map(|r| (r.requester.clone(), r.requested.clone()))
                .collect(),
        }
    }

    pub fn requested(&self, requester: &str, requested: &str) -> bool {
        self.pairs
            .contains(&(requester.to_string(), requested.to_string()))
    }

    /// True if either side asked for the meeting
    pub fn either_way(&self, a: &str, b: &str) -> bool {
        self.requested(a, b) || self.requested(b, a)
    }
}

/// Places candidates in the given order at their earliest common open slot
///
/// Candidates with no shared open slot stay unscheduled. Returns the number of
/// meetings placed.
pub fn assign_in_order(
    order: &[CandidateId],
    candidates: &mut [Candidate],
    grid: &mut SlotGrid,
    lookup: &RequestLookup,
) -> Result<usize> {
    let mut placed = 0;

    for id in order {
        let Some(candidate) = candidates.iter_mut().find(|c| c.id == *id) else {
            continue;
        };
        if candidate.scheduled {
            continue;
        }

        match grid.earliest_common_slot(&candidate.entity1, &candidate.entity2) {
            Some(slot) => {
                let requested = lookup.either_way(&candidate.entity1, &candidate.entity2);
                grid.assign(&candidate.entity1, &candidate.entity2, slot, requested)?;
                candidate.scheduled = true;
                placed += 1;
                tracing::debug!(
                    candidate = %candidate.id,
                    entity1 = %candidate.entity1,
                    entity2 = %candidate.entity2,
                    slot,
                    "Meeting placed"
                );
            }
            None => {
                tracing::debug!(
                    candidate = %candidate.id,
                    entity1 = %candidate.entity1,
                    entity2 = %candidate.entity2,
                    "No common open slot, leaving unscheduled"
                );
            }
        }
    }

    Ok(placed)
}
