use crate::error::{MatchError, Result};
use crate::schedule::{
    Candidate, ParticipantTable, SessionState, SlotGrid, Summary, TieBreakPrompt,
};
use crate::store::{new_session_id, SessionStore};

/// Session-level operations over a durable store
///
/// Each call loads the session, works on a private copy and saves it only once
/// the whole round succeeded. Callers serialize calls for the same session.
pub struct Engine<S: SessionStore> {
    store: S,
}

impl<S: SessionStore> Engine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Scores and groups a participant table into a new session
    pub fn load_session(&self, table: &ParticipantTable) -> Result<String> {
        if table.slot_count == 0 {
            return Err(MatchError::validation("at least one meeting slot is required"));
        }
        let state = SessionState::build(new_session_id(), table)?;
        self.store.create(&state)?;
        if let Err(err) = self.store.export_requests(&state.id, table) {
            tracing::error!(session_id = %state.id, error = %err, "Request export failed");
            self.store.remove(&state.id)?;
            return Err(err);
        }
        Ok(state.id)
    }

    /// Marks slots a participant cannot attend
    pub fn block_unavailability(
        &self,
        session_id: &str,
        entity: &str,
        slot_spec: &str,
    ) -> Result<SlotGrid> {
        self.round(session_id, |state| {
            state.block_unavailability(entity, slot_spec)?;
            Ok(state.grid.clone())
        })
    }

    /// Advances the session to its next decision point
    ///
    /// `None` means no input is needed because the session is complete.
    pub fn next_tie_break_prompt(&self, session_id: &str) -> Result<Option<TieBreakPrompt>> {
        self.round(session_id, |state| state.advance())
    }

    /// Applies an order to the pending tie group
    pub fn resolve_tie_break(
        &self,
        session_id: &str,
        group: usize,
        order: &str,
    ) -> Result<(SlotGrid, Vec<Candidate>)> {
        self.round(session_id, |state| {
            state.resolve(group, order)?;
            Ok((state.grid.clone(), state.candidates.clone()))
        })
    }

    pub fn is_complete(&self, session_id: &str) -> Result<bool> {
        Ok(self.store.load(session_id)?.is_complete())
    }

    pub fn snapshot(&self, session_id: &str) -> Result<SessionState> {
        self.store.load(session_id)
    }

    pub fn summary(&self, session_id: &str) -> Result<Summary> {
        Ok(crate::schedule::summarize(&self.store.load(session_id)?))
    }

    pub fn abandon(&self, session_id: &str) -> Result<()> {
        tracing::info!(session_id, "Session abandoned");
        self.store.remove(session_id)
    }

    /// Runs one all-or-nothing mutation against a stored session
    fn round<T, F>(&self, session_id: &str, op: F) -> Result<T>
    where
        F: FnOnce(&mut SessionState) -> Result<T>,
    {
        let mut state = self.store.load(session_id)?;
        match op(&mut state) {
            Ok(value) => {
                self.store.save(&state)?;
                Ok(value)
            }
            Err(err @ MatchError::InternalConsistency(_)) => {
                tracing::error!(session_id, error = %err, "Aborting session");
                self.store.remove(session_id)?;
                Err(err)
            }
            Err(err) => {
                if err.is_recoverable() {
                    tracing::warn!(session_id, error = %err, "Round rejected");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{Kind, Participant, Request, Tier};
    use crate::store::MemoryStore;
    use std::cell::RefCell;

    /// Memory store whose request export always fails
    #[derive(Default)]
    struct BrokenExport {
        inner: MemoryStore,
        created: RefCell<Vec<String>>,
    }

    impl SessionStore for BrokenExport {
        fn create(&self, state: &SessionState) -> Result<()> {
            self.created.borrow_mut().push(state.id.clone());
            self.inner.create(state)
        }
        fn load(&self, session_id: &str) -> Result<SessionState> {
            self.inner.load(session_id)
        }
        fn save(&self, state: &SessionState) -> Result<()> {
            self.inner.save(state)
        }
        fn remove(&self, session_id: &str) -> Result<()> {
            self.inner.remove(session_id)
        }
        fn export_requests(&self, _session_id: &str, _table: &ParticipantTable) -> Result<()> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into())
        }
    }

    fn table() -> ParticipantTable {
        ParticipantTable {
            participants: vec![
                Participant::new("C1", Kind::Company, 1.0),
                Participant::new("I1", Kind::Investor, 1.0),
                Participant::new("I2", Kind::Investor, 1.0),
            ],
            requests: vec![
                Request::new("C1", "I1", Tier::Primary),
                Request::new("C1", "I2", Tier::Primary),
            ],
            slot_count: 1,
        }
    }

    #[test]
    fn test_rejected_round_is_not_saved() {
        let engine = Engine::new(MemoryStore::new());
        let id = engine.load_session(&table()).unwrap();
        let before = engine.snapshot(&id).unwrap();

        assert!(engine.block_unavailability(&id, "C1", "7").is_err());
        assert_eq!(engine.snapshot(&id).unwrap(), before);
    }

    #[test]
    fn test_prompt_then_resolve() {
        let engine = Engine::new(MemoryStore::new());
        let id = engine.load_session(&table()).unwrap();

        let prompt = engine.next_tie_break_prompt(&id).unwrap().unwrap();
        assert_eq!(prompt.rows.len(), 2);
        assert!(!engine.is_complete(&id).unwrap());

        assert!(engine.resolve_tie_break(&id, prompt.group, "3").is_err());
        let (grid, candidates) = engine.resolve_tie_break(&id, prompt.group, "1").unwrap();
        assert_eq!(grid.open_slots("C1"), Vec::<usize>::new());
        assert!(candidates[1].scheduled);
        assert!(engine.is_complete(&id).unwrap());
        assert_eq!(engine.next_tie_break_prompt(&id).unwrap(), None);
    }

    #[test]
    fn test_zero_slots_is_a_validation_error() {
        let engine = Engine::new(MemoryStore::new());
        let mut t = table();
        t.slot_count = 0;
        assert!(matches!(
            engine.load_session(&t),
            Err(MatchError::Validation { .. })
        ));
    }

    #[test]
    fn test_corrupted_grid_aborts_session() {
        let engine = Engine::new(MemoryStore::new());
        let id = engine.load_session(&table()).unwrap();

        // I2 claims a meeting with C1 that C1's row does not show
        let mut value = serde_json::to_value(engine.snapshot(&id).unwrap()).unwrap();
        value["grid"]["rows"][2]["cells"][0] = serde_json::json!({ "Assigned": "C1" });
        let mut corrupted: SessionState = serde_json::from_value(value).unwrap();
        corrupted.restore();
        engine.store().save(&corrupted).unwrap();

        assert!(matches!(
            engine.next_tie_break_prompt(&id),
            Err(MatchError::InternalConsistency(_))
        ));
        assert!(matches!(
            engine.snapshot(&id),
            Err(MatchError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_failed_export_leaves_no_session() {
        let engine = Engine::new(BrokenExport::default());
        assert!(matches!(engine.load_session(&table()), Err(MatchError::Io(_))));

        let created = engine.store().created.borrow().clone();
        assert_eq!(created.len(), 1);
        assert!(matches!(
            engine.store().load(&created[0]),
            Err(MatchError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_unknown_session() {
        let engine = Engine::new(MemoryStore::new());
        assert!(matches!(
            engine.is_complete("nope"),
            Err(MatchError::UnknownSession(_))
        ));
    }
}
