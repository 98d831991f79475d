use std::collections::{HashMap, HashSet};

use super::types::{Participant, Request, ScoredRequest};

/// Turns flattened preference requests into directed, scored pairs
///
/// Duplicate (requester, requested) pairs keep their first occurrence in row
/// order. Requests that name an unknown participant are dropped with a warning.
pub fn score_requests(participants: &[Participant], requests: &[Request]) -> Vec<ScoredRequest> {
    let by_id: HashMap<&str, &Participant> = participants
        .iter()
        .map(|p| (p.id.as_str(), p))
        .collect();

    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut scored = Vec::with_capacity(requests.len());

    for request in requests {
        if !seen.insert((request.requester.as_str(), request.requested.as_str())) {
            tracing::debug!(
                requester = %request.requester,
                requested = %request.requested,
                "Ignoring duplicate request"
            );
            continue;
        }

        let Some(requester) = by_id.get(request.requester.as_str()) else {
            tracing::warn!(
                requester = %request.requester,
                "Request from unknown participant dropped"
            );
            continue;
        };
        let Some(requested) = by_id.get(request.requested.as_str()) else {
            tracing::warn!(
                requester = %request.requester,
                requested = %request.requested,
                "Requested participant not found, preference dropped"
            );
            continue;
        };

        scored.push(ScoredRequest {
            requester: requester.id.clone(),
            requester_kind: requester.kind,
            requested: requested.id.clone(),
            requested_kind: requested.kind,
            tier: request.tier,
            score: request.tier.weight() * requester.importance * requested.importance,
        });
    }

    scored
}
