use csv::WriterBuilder;
use rand::Rng;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{MatchError, Result};
use crate::schedule::{Candidate, ParticipantTable, SessionState, SlotGrid, Tier};

const STATE_FILE: &str = "state.json";
const CANDIDATES_FILE: &str = "candidates.csv";
const GRID_FILE: &str = "grid.csv";
const REQUESTS_FILE: &str = "requests.csv";

/// Durable keyed storage for session state between rounds
pub trait SessionStore {
    /// Stores a brand new session; fails if the id is taken
    fn create(&self, state: &SessionState) -> Result<()>;
    fn load(&self, session_id: &str) -> Result<SessionState>;
    fn save(&self, state: &SessionState) -> Result<()>;
    fn remove(&self, session_id: &str) -> Result<()>;

    /// Keeps the flattened request table next to the session, if supported
    fn export_requests(&self, _session_id: &str, _table: &ParticipantTable) -> Result<()> {
        Ok(())
    }
}

/// New session id: creation date plus 64 random bits
pub fn new_session_id() -> String {
    let bits: u64 = rand::thread_rng().gen();
    format!("{}-{:016x}", chrono::Utc::now().format("%Y%m%d"), bits)
}

/// Keeps sessions in memory; used by the CLI and tests
#[derive(Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.sessions
            .lock()
            .map_err(|_| MatchError::InternalConsistency("session map lock poisoned".to_string()))
    }
}

// Stored as JSON text so a load never hands out a live reference
impl SessionStore for MemoryStore {
    fn create(&self, state: &SessionState) -> Result<()> {
        let mut sessions = self.lock()?;
        if sessions.contains_key(&state.id) {
            return Err(MatchError::InternalConsistency(format!(
                "session '{}' already exists",
                state.id
            )));
        }
        sessions.insert(state.id.clone(), serde_json::to_string(state)?);
        Ok(())
    }

    fn load(&self, session_id: &str) -> Result<SessionState> {
        let sessions = self.lock()?;
        let json = sessions
            .get(session_id)
            .ok_or_else(|| MatchError::UnknownSession(session_id.to_string()))?;
        let mut state: SessionState = serde_json::from_str(json)?;
        state.restore();
        Ok(state)
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        let mut sessions = self.lock()?;
        match sessions.get_mut(&state.id) {
            Some(slot) => {
                *slot = serde_json::to_string(state)?;
                Ok(())
            }
            None => Err(MatchError::UnknownSession(state.id.clone())),
        }
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        self.lock()?.remove(session_id);
        Ok(())
    }
}

/// One directory per session holding `state.json` plus CSV exports
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        Ok(Self {
            root: root.as_ref().to_path_buf(),
        })
    }

    pub fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        let valid = !session_id.is_empty()
            && session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(MatchError::UnknownSession(session_id.to_string()));
        }
        Ok(self.root.join(session_id))
    }

    fn write(&self, state: &SessionState) -> Result<()> {
        let dir = self.session_dir(&state.id)?;
        fs::create_dir_all(&dir)?;

        // Write-then-rename so a crash never leaves half a state file
        let tmp = dir.join(format!("{}.tmp", STATE_FILE));
        fs::write(&tmp, serde_json::to_vec_pretty(state)?)?;
        fs::rename(&tmp, dir.join(STATE_FILE))?;

        write_candidates_csv(&dir.join(CANDIDATES_FILE), &state.candidates)?;
        write_grid_csv(&dir.join(GRID_FILE), &state.grid)?;
        Ok(())
    }
}

impl SessionStore for FileStore {
    fn create(&self, state: &SessionState) -> Result<()> {
        if self.session_dir(&state.id)?.join(STATE_FILE).exists() {
            return Err(MatchError::InternalConsistency(format!(
                "session '{}' already exists",
                state.id
            )));
        }
        self.write(state)
    }

    fn load(&self, session_id: &str) -> Result<SessionState> {
        let path = self.session_dir(session_id)?.join(STATE_FILE);
        if !path.exists() {
            return Err(MatchError::UnknownSession(session_id.to_string()));
        }
        let mut state: SessionState = serde_json::from_slice(&fs::read(path)?)?;
        state.restore();
        Ok(state)
    }

    fn save(&self, state: &SessionState) -> Result<()> {
        if !self.session_dir(&state.id)?.join(STATE_FILE).exists() {
            return Err(MatchError::UnknownSession(state.id.clone()));
        }
        self.write(state)
    }

    fn remove(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    fn export_requests(&self, session_id: &str, table: &ParticipantTable) -> Result<()> {
        write_requests_csv(&self.session_dir(session_id)?.join(REQUESTS_FILE), table)
    }
}

/// Request table: one row per preference cell with both participant types
pub fn write_requests_csv(path: &Path, table: &ParticipantTable) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(["entity", "requested", "tier", "entity_type", "requested_type"])?;
    for r in &table.requests {
        let type_of = |id: &str| {
            table
                .find(id)
                .map(|p| p.kind.code().to_string())
                .unwrap_or_default()
        };
        let tier = match r.tier {
            Tier::Primary => "choice",
            Tier::Backup => "backup",
        };
        wtr.write_record([
            r.requester.clone(),
            r.requested.clone(),
            tier.to_string(),
            type_of(&r.requester),
            type_of(&r.requested),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Candidate table in the interchange layout: id, entity1, entity2, score, scheduled
pub fn write_candidates_csv(path: &Path, candidates: &[Candidate]) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(["id", "entity1", "entity2", "score", "scheduled"])?;
    for c in candidates {
        wtr.write_record([
            c.id.to_string(),
            c.entity1.clone(),
            c.entity2.clone(),
            c.score.to_string(),
            c.scheduled.to_string(),
        ])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Slot grid in the interchange layout: entity, mtg1, mtg1_req, ...
pub fn write_grid_csv(path: &Path, grid: &SlotGrid) -> Result<()> {
    let mut wtr = WriterBuilder::new().from_path(path)?;
    wtr.write_record(grid.headers())?;
    for row in grid.rows() {
        let mut record = vec![row.participant.clone()];
        for (cell, requested) in row.cells.iter().zip(&row.requested) {
            record.push(cell.as_text().to_string());
            record.push(requested.to_string());
        }
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Kind, Participant, Request};

    fn state(id: &str) -> SessionState {
        let table = ParticipantTable {
            participants: vec![
                Participant::new("C1", Kind::Company, 1.0),
                Participant::new("I1", Kind::Investor, 1.0),
            ],
            requests: vec![Request::new("C1", "I1", Tier::Primary)],
            slot_count: 2,
        };
        SessionState::build(id, &table).unwrap()
    }

    #[test]
    fn test_session_id_shape() {
        let id = new_session_id();
        assert_eq!(id.len(), 8 + 1 + 16);
        assert_ne!(id, new_session_id());
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        let mut s = state("abc");
        store.create(&s).unwrap();
        assert!(store.create(&s).is_err());

        s.advance().unwrap();
        store.save(&s).unwrap();
        let loaded = store.load("abc").unwrap();
        assert!(loaded.is_complete());
        assert_eq!(loaded.grid.open_slots("C1"), vec![2]);

        store.remove("abc").unwrap();
        assert!(matches!(store.load("abc"), Err(MatchError::UnknownSession(_))));
    }

    #[test]
    fn test_file_store_writes_exports() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let mut s = state("s-1");
        store.create(&s).unwrap();
        s.advance().unwrap();
        store.save(&s).unwrap();

        let loaded = store.load("s-1").unwrap();
        assert_eq!(loaded, {
            let mut expected = s.clone();
            expected.restore();
            expected
        });

        let grid = fs::read_to_string(dir.path().join("s-1").join(GRID_FILE)).unwrap();
        let mut lines = grid.lines();
        assert_eq!(lines.next(), Some("entity,mtg1,mtg1_req,mtg2,mtg2_req"));
        assert_eq!(lines.next(), Some("C1,I1,true,,false"));

        let candidates = fs::read_to_string(dir.path().join("s-1").join(CANDIDATES_FILE)).unwrap();
        assert!(candidates.contains("0,C1,I1,1,true"));

        store.export_requests("s-1", &ParticipantTable {
            participants: vec![Participant::new("C1", Kind::Company, 1.0)],
            requests: vec![
                Request::new("C1", "I9", Tier::Backup),
            ],
            slot_count: 2,
        })
        .unwrap();
        let requests = fs::read_to_string(dir.path().join("s-1").join(REQUESTS_FILE)).unwrap();
        assert_eq!(
            requests,
            "entity,requested,tier,entity_type,requested_type\nC1,I9,backup,0,\n"
        );

        store.remove("s-1").unwrap();
        assert!(!dir.path().join("s-1").exists());
    }

    #[test]
    fn test_file_store_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.load("../etc"),
            Err(MatchError::UnknownSession(_))
        ));
        assert!(matches!(store.load("missing"), Err(MatchError::UnknownSession(_))));
    }
}
