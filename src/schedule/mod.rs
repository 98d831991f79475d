pub mod types;
pub mod scorer;
pub mod aggregate;
pub mod grid;
pub mod assign;
pub mod tie_break;
pub mod summary;

pub use types::{Candidate, CandidateId, Kind, Participant, ParticipantTable, Request, Tier};
pub use grid::{parse_slot_spec, Cell, SlotGrid};
pub use tie_break::{Phase, SessionState, TieBreakPrompt, KEEP_ORDER};
pub use summary::{summarize, Summary};
