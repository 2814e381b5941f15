//! Named sessions owned by the application's composition root.
//!
//! There is no process-wide engine; code that wants a "current" session is
//! handed a registry and asks it.

use std::collections::BTreeMap;

use crate::session::EngineSession;

/// Sessions by name, with at most one marked current.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<String, EngineSession>,
    current: Option<String>,
}

impl SessionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `session` under `name`, returning any session it replaces. The
    /// first session added becomes current.
    pub fn insert(&mut self, name: impl Into<String>, session: EngineSession) -> Option<EngineSession> {
        let name = name.into();
        if self.current.is_none() {
            self.current = Some(name.clone());
        }
        self.sessions.insert(name, session)
    }

    /// Remove a session; if it was current, no session is current afterwards.
    pub fn remove(&mut self, name: &str) -> Option<EngineSession> {
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        self.sessions.remove(name)
    }

    /// Session registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EngineSession> {
        self.sessions.get(name)
    }

    /// Mutable access to the session registered under `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut EngineSession> {
        self.sessions.get_mut(name)
    }

    /// Make `name` current. Returns false if no such session exists.
    pub fn set_current(&mut self, name: &str) -> bool {
        if self.sessions.contains_key(name) {
            self.current = Some(name.to_string());
            true
        } else {
            false
        }
    }

    /// Name of the current session, if any.
    #[must_use]
    pub fn current_name(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// The current session, if any.
    pub fn current_mut(&mut self) -> Option<&mut EngineSession> {
        let name = self.current.as_deref()?;
        self.sessions.get_mut(name)
    }

    /// Poll every session once. Returns the total number of events handled.
    pub fn poll_all(&mut self) -> usize {
        self.sessions.values_mut().map(EngineSession::poll).sum()
    }

    /// Shut down every session; they stay registered.
    pub fn shutdown_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.shutdown();
        }
    }

    /// Number of registered sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
