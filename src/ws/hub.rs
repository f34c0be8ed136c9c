use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

use super::participant::ParticipantHandle;
use super::session::{JoinError, Session};
use crate::models::CollaborationSession;

/// Queue sizes applied to every session the hub creates
#[derive(Debug, Clone, Copy)]
pub struct HubSettings {
    pub relay_queue_size: usize,
    pub outbound_queue_size: usize,
    /// A session nobody joins within this window ends by itself
    pub empty_session_grace: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            relay_queue_size: 256,
            outbound_queue_size: 256,
            empty_session_grace: Duration::from_secs(30),
        }
    }
}

/// Process wide registry of live sessions, keyed by diagram id.
/// At most one live session exists per diagram.
#[derive(Debug)]
pub struct Hub {
    sessions: Mutex<HashMap<Uuid, Arc<Session>>>,
    settings: HubSettings,
    me: Weak<Hub>,
}

impl Hub {
    pub fn new(settings: HubSettings) -> Arc<Hub> {
        Arc::new_cyclic(|me| Hub {
            sessions: Mutex::new(HashMap::new()),
            settings,
            me: me.clone(),
        })
    }

    pub fn settings(&self) -> HubSettings {
        self.settings
    }

    pub(crate) fn lock_sessions(&self) -> MutexGuard<'_, HashMap<Uuid, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a live session exists for the diagram
    pub fn has_active_session(&self, diagram_id: &Uuid) -> bool {
        self.lock_sessions()
            .get(diagram_id)
            .is_some_and(|session| !session.is_terminated())
    }

    pub fn get_session(&self, diagram_id: &Uuid) -> Option<Arc<Session>> {
        self.lock_sessions()
            .get(diagram_id)
            .filter(|session| !session.is_terminated())
            .cloned()
    }

    /// Return the live session of the diagram, creating it if needed.
    /// The flag tells whether this call created it.
    pub fn get_or_create_session(&self, diagram_id: &Uuid) -> (Arc<Session>, bool) {
        let mut sessions = self.lock_sessions();
        self.live_or_new(&mut sessions, diagram_id)
    }

    /// Find or create the diagram's session and queue the connection for registration
    pub fn join(&self, diagram_id: &Uuid, handle: ParticipantHandle) -> Result<Arc<Session>, JoinError> {
        let mut sessions = self.lock_sessions();
        let (session, _) = self.live_or_new(&mut sessions, diagram_id);
        session.try_register(handle)?;
        // Keeps the reaper off the session until the relay has seen the registration
        session.touch();
        Ok(session)
    }

    fn live_or_new(&self, sessions: &mut HashMap<Uuid, Arc<Session>>, diagram_id: &Uuid) -> (Arc<Session>, bool) {
        if let Some(session) = sessions.get(diagram_id) {
            if !session.is_terminated() {
                return (session.clone(), false);
            }
        }

        let session = Session::spawn(*diagram_id, self.settings, self.me.clone());
        sessions.insert(*diagram_id, session.clone());
        info!("Created collaboration session {} for diagram {}", session.id(), diagram_id);
        (session, true)
    }

    /// End the diagram's session, closing all of its connections.
    /// Removing an absent session is a no-op.
    pub fn remove_session(&self, diagram_id: &Uuid) -> bool {
        let removed = self.lock_sessions().remove(diagram_id);
        match removed {
            Some(session) => {
                session.shutdown();
                info!("Ended collaboration session {} for diagram {}", session.id(), diagram_id);
                true
            }
            None => false,
        }
    }

    /// Drop the map entry only if it still points at this session
    pub(crate) fn forget(&self, session: &Session) {
        let mut sessions = self.lock_sessions();
        Self::remove_entry(&mut sessions, session);
    }

    pub(crate) fn remove_entry(sessions: &mut HashMap<Uuid, Arc<Session>>, session: &Session) {
        let diagram_id = session.diagram_id();
        if sessions.get(&diagram_id).is_some_and(|current| current.id() == session.id()) {
            sessions.remove(&diagram_id);
        }
    }

    /// Snapshot of all live sessions. It may be stale by the time it is read.
    pub fn list_sessions(&self) -> Vec<CollaborationSession> {
        let live: Vec<Arc<Session>> = self
            .lock_sessions()
            .values()
            .filter(|session| !session.is_terminated())
            .cloned()
            .collect();

        let mut snapshots: Vec<CollaborationSession> = live.iter().map(|session| session.snapshot()).collect();
        snapshots.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        snapshots
    }

    pub fn session_count(&self) -> usize {
        self.lock_sessions()
            .values()
            .filter(|session| !session.is_terminated())
            .count()
    }

    /// End every session idle for at least `idle_timeout`, and every session
    /// without participants idle for longer than the empty session grace.
    /// Selection and removal happen under one lock, the same one joiners take.
    pub fn reap_stale_sessions(&self, idle_timeout: Duration) -> Vec<Uuid> {
        let stale: Vec<Arc<Session>> = {
            let mut sessions = self.lock_sessions();
            let stale: Vec<Arc<Session>> = sessions
                .values()
                .filter(|session| {
                    let idle = session.idle_for();
                    idle >= idle_timeout
                        || (idle >= self.settings.empty_session_grace && session.participants().is_empty())
                })
                .cloned()
                .collect();
            for session in &stale {
                Self::remove_entry(&mut sessions, session);
            }
            stale
        };

        stale
            .iter()
            .map(|session| {
                session.shutdown();
                session.diagram_id()
            })
            .collect()
    }

    /// End every session, e.g. on server shutdown
    pub fn shutdown_all(&self) -> usize {
        let drained: Vec<Arc<Session>> = self.lock_sessions().drain().map(|(_, session)| session).collect();
        for session in &drained {
            session.shutdown();
        }
        drained.len()
    }
}
