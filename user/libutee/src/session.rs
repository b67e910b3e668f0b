//! Per-session records.
//!
//! The privileged side picks the session id; the TA only keeps the
//! record for each id it has seen opened and the context its open entry
//! point produced.

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::result::EntryError;

/// Session identifier assigned by the caller of `__utee_entry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct SessionId(pub u32);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live session.
#[derive(Debug)]
pub struct Session<C> {
    id: SessionId,
    context: Option<C>,
}

impl<C> Session<C> {
    fn new(id: SessionId) -> Self {
        Self { id, context: None }
    }

    #[inline]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// The TA-defined context; `None` until the open entry point succeeds.
    pub fn context(&self) -> Option<&C> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut C> {
        self.context.as_mut()
    }

    /// Store a new context, handing back the one it replaces.
    pub(crate) fn replace_context(&mut self, context: C) -> Option<C> {
        self.context.replace(context)
    }

    pub(crate) fn take_context(&mut self) -> Option<C> {
        self.context.take()
    }
}

/// Map of live sessions keyed by id. At most one record per id.
pub struct SessionRegistry<C> {
    sessions: HashMap<SessionId, Session<C>>,
    limit: Option<usize>,
}

impl<C> SessionRegistry<C> {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            limit: None,
        }
    }

    /// Registry refusing more than `limit` concurrent sessions.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            limit: Some(limit),
        }
    }

    pub fn find(&self, id: SessionId) -> Option<&Session<C>> {
        self.sessions.get(&id)
    }

    pub fn find_mut(&mut self, id: SessionId) -> Option<&mut Session<C>> {
        self.sessions.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Make sure one more record can be inserted without allocating.
    pub fn reserve(&mut self) -> Result<(), EntryError> {
        if self.limit.is_some_and(|limit| self.sessions.len() >= limit) {
            return Err(EntryError::OutOfMemory);
        }
        self.sessions
            .try_reserve(1)
            .map_err(|_| EntryError::OutOfMemory)
    }

    /// Insert a record for `id`, or return the existing one.
    pub fn insert(&mut self, id: SessionId) -> Result<&mut Session<C>, EntryError> {
        if !self.sessions.contains_key(&id) {
            self.reserve()?;
        }
        Ok(self.sessions.entry(id).or_insert_with(|| Session::new(id)))
    }

    /// Unlink the record for `id`.
    pub fn remove(&mut self, id: SessionId) -> Option<Session<C>> {
        self.sessions.remove(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Live ids in ascending order.
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl<C> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_remove() {
        let mut reg: SessionRegistry<u32> = SessionRegistry::new();
        assert!(reg.is_empty());

        reg.insert(SessionId(7)).unwrap();
        assert!(reg.contains(SessionId(7)));
        assert!(reg.find(SessionId(7)).unwrap().context().is_none());

        let removed = reg.remove(SessionId(7)).unwrap();
        assert_eq!(removed.id(), SessionId(7));
        assert!(reg.find(SessionId(7)).is_none());
        assert!(reg.remove(SessionId(7)).is_none());
    }

    #[test]
    fn duplicate_insert_keeps_one_record() {
        let mut reg: SessionRegistry<u32> = SessionRegistry::new();
        reg.insert(SessionId(3)).unwrap().replace_context(10);
        let again = reg.insert(SessionId(3)).unwrap();
        assert_eq!(again.context(), Some(&10));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn limit_reports_out_of_memory() {
        let mut reg: SessionRegistry<()> = SessionRegistry::with_limit(1);
        reg.insert(SessionId(1)).unwrap();
        assert_eq!(reg.insert(SessionId(2)).err(), Some(EntryError::OutOfMemory));
        assert_eq!(reg.reserve(), Err(EntryError::OutOfMemory));
        // An existing id is still reachable at the limit.
        assert!(reg.insert(SessionId(1)).is_ok());
        assert_eq!(reg.ids(), [SessionId(1)]);
    }

    #[test]
    fn ids_are_sorted() {
        let mut reg: SessionRegistry<()> = SessionRegistry::new();
        for id in [9, 2, 5] {
            reg.insert(SessionId(id)).unwrap();
        }
        assert_eq!(reg.ids(), [SessionId(2), SessionId(5), SessionId(9)]);
    }

    #[test]
    fn context_replace_and_take() {
        let mut reg: SessionRegistry<&str> = SessionRegistry::new();
        let s = reg.insert(SessionId(4)).unwrap();
        assert_eq!(s.replace_context("a"), None);
        assert_eq!(s.replace_context("b"), Some("a"));
        *s.context_mut().unwrap() = "c";
        assert_eq!(s.take_context(), Some("c"));
        assert!(s.context().is_none());
    }
}
