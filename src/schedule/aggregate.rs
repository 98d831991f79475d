use std::collections::HashMap;

use crate::error::{MatchError, Result};
use super::types::{Candidate, CandidateId, Kind, ScoredRequest};

/// Merges directed requests into undirected Company/Investor candidates
///
/// Same-kind requests are discarded. Reciprocal requests are summed. The result
/// is sorted by score descending; ties keep first-appearance order, with
/// Company-initiated requests ahead of Investor-initiated ones.
pub fn aggregate_candidates(scored: &[ScoredRequest]) -> Result<Vec<Candidate>> {
    let cross_kind: Vec<&ScoredRequest> = scored
        .iter()
        .filter(|r| {
            let keep = r.requester_kind != r.requested_kind;
            if !keep {
                tracing::debug!(
                    requester = %r.requester,
                    requested = %r.requested,
                    "Discarding same-kind request"
                );
            }
            keep
        })
        .collect();

    let (company_initiated, investor_initiated): (Vec<&ScoredRequest>, Vec<&ScoredRequest>) =
        cross_kind
            .iter()
            .copied()
            .partition(|r| r.requester_kind == Kind::Company);

    if company_initiated.len() + investor_initiated.len() != cross_kind.len() {
        return Err(MatchError::InternalConsistency(format!(
            "request partition lost rows: {} company + {} investor != {} total",
            company_initiated.len(),
            investor_initiated.len(),
            cross_kind.len()
        )));
    }

    // (company, investor) -> position in `merged`
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut merged: Vec<(String, String, f64)> = Vec::new();

    let oriented = company_initiated
        .iter()
        .map(|r| (r.requester.clone(), r.requested.clone(), r.score))
        .chain(
            investor_initiated
                .iter()
                .map(|r| (r.requested.clone(), r.requester.clone(), r.score)),
        );

    for (company, investor, score) in oriented {
        match index.get(&(company.clone(), investor.clone())) {
            Some(&pos) => merged[pos].2 += score,
            None => {
                index.insert((company.clone(), investor.clone()), merged.len());
                merged.push((company, investor, score));
            }
        }
    }

    // sort_by is stable, so equal scores keep the order built above
    merged.sort_by(|a, b| b.2.total_cmp(&a.2));

    Ok(merged
        .into_iter()
        .enumerate()
        .map(|(i, (entity1, entity2, score))| Candidate {
            id: CandidateId(i),
            entity1,
            entity2,
            score,
            scheduled: false,
        })
        .collect())
}

/// Distinct score values in descending order, one per tie group
pub fn score_groups(candidates: &[Candidate]) -> Vec<f64> {
    let mut groups: Vec<f64> = Vec::new();
    for candidate in candidates {
        if groups.last() != Some(&candidate.score) {
            groups.push(candidate.score);
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::types::Tier;

    fn req(from: &str, from_kind: Kind, to: &str, to_kind: Kind, score: f64) -> ScoredRequest {
        ScoredRequest {
            requester: from.to_string(),
            requester_kind: from_kind,
            requested: to.to_string(),
            requested_kind: to_kind,
            tier: Tier::Primary,
            score,
        }
    }

    #[test]
    fn test_reciprocal_scores_are_summed() {
        let scored = vec![
            req("A", Kind::Company, "B", Kind::Investor, 6.0),
            req("B", Kind::Investor, "A", Kind::Company, 3.0),
        ];
        let candidates = aggregate_candidates(&scored).unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].entity1, "A");
        assert_eq!(candidates[0].entity2, "B");
        assert!((candidates[0].score - 9.0).abs() < 1e-10);
        assert!(!candidates[0].scheduled);
    }

    #[test]
    fn test_investor_request_is_flipped() {
        let scored = vec![req("I1", Kind::Investor, "C1", Kind::Company, 2.0)];
        let candidates = aggregate_candidates(&scored).unwrap();
        assert_eq!(candidates[0].entity1, "C1");
        assert_eq!(candidates[0].entity2, "I1");
    }

    #[test]
    fn test_same_kind_requests_are_discarded() {
        let scored = vec![
            req("A", Kind::Company, "C", Kind::Company, 10.0),
            req("I", Kind::Investor, "J", Kind::Investor, 10.0),
            req("A", Kind::Company, "I", Kind::Investor, 1.0),
        ];
        let candidates = aggregate_candidates(&scored).unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].entity2, "I");
    }

    #[test]
    fn test_sorted_descending_with_stable_ties() {
        let scored = vec![
            req("C1", Kind::Company, "I1", Kind::Investor, 1.0),
            req("C2", Kind::Company, "I1", Kind::Investor, 4.0),
            req("C3", Kind::Company, "I2", Kind::Investor, 1.0),
            req("I3", Kind::Investor, "C1", Kind::Company, 1.0),
        ];
        let candidates = aggregate_candidates(&scored).unwrap();

        let order: Vec<(&str, &str)> = candidates
            .iter()
            .map(|c| (c.entity1.as_str(), c.entity2.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![("C2", "I1"), ("C1", "I1"), ("C3", "I2"), ("C1", "I3")]
        );
        let ids: Vec<usize> = candidates.iter().map(|c| c.id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_score_groups() {
        let scored = vec![
            req("C1", Kind::Company, "I1", Kind::Investor, 2.0),
            req("C2", Kind::Company, "I1", Kind::Investor, 2.0),
            req("C3", Kind::Company, "I2", Kind::Investor, 1.0),
        ];
        let candidates = aggregate_candidates(&scored).unwrap();
        assert_eq!(score_groups(&candidates), vec![2.0, 1.0]);
        assert!(score_groups(&[]).is_empty());
    }
}
