use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Which side of the market a participant sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Company,
    Investor,
}

impl Kind {
    /// Decodes the external `type` column: 0/1 or the spelled-out names
    pub fn from_code(value: &str) -> Option<Kind> {
        match value.trim().to_lowercase().as_str() {
            "0" | "company" => Some(Kind::Company),
            "1" | "investor" => Some(Kind::Investor),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Kind::Company => 0,
            Kind::Investor => 1,
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Company => write!(f, "Company"),
            Kind::Investor => write!(f, "Investor"),
        }
    }
}

/// Preference rank of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Primary,
    Backup,
}

impl Tier {
    pub fn weight(self) -> f64 {
        match self {
            Tier::Primary => 1.0,
            Tier::Backup => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    pub kind: Kind,
    pub importance: f64,
    /// 1-based slot numbers this participant cannot attend
    pub unavailable: BTreeSet<usize>,
}

impl Participant {
    pub fn new(id: impl Into<String>, kind: Kind, importance: f64) -> Self {
        Self {
            id: id.into(),
            kind,
            importance,
            unavailable: BTreeSet::new(),
        }
    }

    pub fn with_unavailable(mut self, slots: impl IntoIterator<Item = usize>) -> Self {
        self.unavailable.extend(slots);
        self
    }
}

/// One non-empty preference cell, flattened out of the participant table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub requester: String,
    pub requested: String,
    pub tier: Tier,
}

impl Request {
    pub fn new(requester: impl Into<String>, requested: impl Into<String>, tier: Tier) -> Self {
        Self {
            requester: requester.into(),
            requested: requested.into(),
            tier,
        }
    }
}

/// Everything the engine needs to open a session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParticipantTable {
    pub participants: Vec<Participant>,
    pub requests: Vec<Request>,
    /// Number of meeting slots, one per `choice_<n>` column
    pub slot_count: usize,
}

impl ParticipantTable {
    pub fn find(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }
}

/// A directed request after scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRequest {
    pub requester: String,
    pub requester_kind: Kind,
    pub requested: String,
    pub requested_kind: Kind,
    pub tier: Tier,
    pub score: f64,
}

/// Stable handle for a candidate meeting, issued once at aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub usize);

impl fmt::Display for CandidateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An undirected Company/Investor pair eligible for a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    /// Always the Company
    pub entity1: String,
    /// Always the Investor
    pub entity2: String,
    pub score: f64,
    pub scheduled: bool,
}

impl Candidate {
    pub fn involves(&self, participant: &str) -> bool {
        self.entity1 == participant || self.entity2 == participant
    }
}
