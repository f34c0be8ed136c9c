use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::hub::{Hub, HubSettings};
use super::participant::{ConnectionId, DeliveryError, ParticipantHandle};
use crate::models::{CollabMessage, CollaborationSession, Participant};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("collaboration session is busy, try again")]
    SessionBusy,
    #[error("collaboration session has ended")]
    SessionTerminated,
}

/// A message on its way to the relay, remembering the connection that sent it
#[derive(Debug)]
struct Relayed {
    origin: Option<ConnectionId>,
    message: CollabMessage,
}

/// Live collaborative editing context of one diagram.
///
/// The participant set itself is owned by the session's relay task. Everything
/// reachable from here is either a queue into that task or a value the relay
/// publishes (participant snapshot, activity timestamp, terminated flag).
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    diagram_id: Uuid,
    started_at: DateTime<Utc>,
    last_activity_ms: AtomicI64,
    terminated: AtomicBool,
    shutdown: Notify,
    register_tx: mpsc::Sender<ParticipantHandle>,
    unregister_tx: mpsc::Sender<ConnectionId>,
    broadcast_tx: mpsc::Sender<Relayed>,
    participants: watch::Receiver<Vec<Participant>>,
}

impl Session {
    /// Create a session and start its relay task
    pub(crate) fn spawn(diagram_id: Uuid, settings: HubSettings, hub: Weak<Hub>) -> Arc<Session> {
        let queue_size = settings.relay_queue_size.max(1);
        let (register_tx, register_rx) = mpsc::channel(queue_size);
        let (unregister_tx, unregister_rx) = mpsc::channel(queue_size);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(queue_size);
        let (snapshot_tx, participants) = watch::channel(Vec::new());

        let started_at = Utc::now();
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            diagram_id,
            started_at,
            last_activity_ms: AtomicI64::new(started_at.timestamp_millis()),
            terminated: AtomicBool::new(false),
            shutdown: Notify::new(),
            register_tx,
            unregister_tx,
            broadcast_tx,
            participants,
        });

        let relay = Relay {
            session: session.clone(),
            hub: hub.clone(),
            members: HashMap::new(),
            active: false,
            unused_grace: settings.empty_session_grace,
            grace_expired: false,
            register_rx,
            unregister_rx,
            broadcast_rx,
            snapshot_tx,
        };

        let relay_task = tokio::spawn(relay.run());

        // A relay that dies unexpectedly must not leave its session behind in the hub
        let supervised = session.clone();
        tokio::spawn(async move {
            if let Err(e) = relay_task.await {
                error!(
                    "Relay of session {} for diagram {} stopped unexpectedly: {}",
                    supervised.id, supervised.diagram_id, e
                );
                supervised.mark_terminated();
                if let Some(hub) = hub.upgrade() {
                    hub.forget(&supervised);
                }
            }
        });

        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn diagram_id(&self) -> Uuid {
        self.diagram_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time of the last inbound message or membership change
    pub fn last_activity(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.last_activity_ms.load(Ordering::Relaxed))
            .unwrap_or(self.started_at)
    }

    pub fn idle_for(&self) -> Duration {
        (Utc::now() - self.last_activity()).to_std().unwrap_or(Duration::ZERO)
    }

    pub fn touch(&self) {
        self.last_activity_ms.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_terminated(&self) {
        self.terminated.store(true, Ordering::Release);
    }

    /// Participants as last published by the relay
    pub fn participants(&self) -> Vec<Participant> {
        self.participants.borrow().clone()
    }

    pub fn snapshot(&self) -> CollaborationSession {
        CollaborationSession {
            session_id: self.id,
            diagram_id: self.diagram_id,
            started_at: self.started_at,
            last_activity: self.last_activity(),
            participants: self.participants(),
        }
    }

    /// Queue a connection for registration. Called by the hub while it holds its lock.
    pub(crate) fn try_register(&self, handle: ParticipantHandle) -> Result<(), JoinError> {
        if self.is_terminated() {
            return Err(JoinError::SessionTerminated);
        }
        self.register_tx.try_send(handle).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => JoinError::SessionBusy,
            mpsc::error::TrySendError::Closed(_) => JoinError::SessionTerminated,
        })
    }

    /// Ask the relay to drop a connection. Unknown connections are ignored.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        if self.unregister_tx.send(connection_id).await.is_err() {
            debug!("Session {} already closed, nothing to unregister", self.id);
        }
    }

    /// Relay a message to every participant, the originating connection included.
    /// Returns false once the session is gone.
    pub async fn broadcast(&self, origin: ConnectionId, message: CollabMessage) -> bool {
        let relayed = Relayed {
            origin: Some(origin),
            message,
        };
        self.broadcast_tx.send(relayed).await.is_ok()
    }

    /// Close every connection and stop the relay
    pub(crate) fn shutdown(&self) {
        self.mark_terminated();
        self.shutdown.notify_one();
    }
}

enum RelayEvent {
    Register(ParticipantHandle),
    Unregister(ConnectionId),
    Broadcast(Relayed),
    #[cfg(test)]
    Fault(ConnectionId),
}

impl RelayEvent {
    fn connection_id(&self) -> Option<ConnectionId> {
        match self {
            RelayEvent::Register(handle) => Some(handle.connection_id),
            RelayEvent::Unregister(id) => Some(*id),
            RelayEvent::Broadcast(relayed) => relayed.origin,
            #[cfg(test)]
            RelayEvent::Fault(id) => Some(*id),
        }
    }
}

/// Single writer of a session's participant set
struct Relay {
    session: Arc<Session>,
    hub: Weak<Hub>,
    members: HashMap<ConnectionId, ParticipantHandle>,
    /// Set on the first registration; an empty active session is torn down
    active: bool,
    /// How long a session nobody joined is kept
    unused_grace: Duration,
    grace_expired: bool,
    register_rx: mpsc::Receiver<ParticipantHandle>,
    unregister_rx: mpsc::Receiver<ConnectionId>,
    broadcast_rx: mpsc::Receiver<Relayed>,
    snapshot_tx: watch::Sender<Vec<Participant>>,
}

impl Relay {
    async fn run(mut self) {
        info!("Session {} started for diagram {}", self.session.id, self.session.diagram_id);

        let unused = tokio::time::sleep(self.unused_grace);
        tokio::pin!(unused);

        loop {
            let event = tokio::select! {
                biased;
                _ = self.session.shutdown.notified() => break,
                Some(handle) = self.register_rx.recv() => Some(RelayEvent::Register(handle)),
                Some(id) = self.unregister_rx.recv() => Some(RelayEvent::Unregister(id)),
                Some(relayed) = self.broadcast_rx.recv() => Some(RelayEvent::Broadcast(relayed)),
                _ = &mut unused, if !self.active && !self.grace_expired => None,
                else => break,
            };

            match event {
                Some(event) => self.dispatch(event),
                None => {
                    debug!("Nobody joined session {} in time", self.session.id);
                    self.grace_expired = true;
                }
            }

            if self.try_terminate() {
                break;
            }
        }

        self.close();
    }

    fn dispatch(&mut self, event: RelayEvent) {
        let related = event.connection_id();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.handle(event)));
        if outcome.is_err() {
            error!("Session {} failed to process an event", self.session.id);
            if let Some(id) = related {
                self.remove_participants(vec![id]);
            }
        }
    }

    fn handle(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Register(handle) => self.register(handle),
            RelayEvent::Unregister(id) => self.remove_participants(vec![id]),
            RelayEvent::Broadcast(relayed) => {
                let failed = self.fan_out(relayed.message, None);
                self.remove_participants(failed);
            }
            #[cfg(test)]
            RelayEvent::Fault(id) => panic!("fault injected for connection {}", id),
        }
    }

    fn register(&mut self, handle: ParticipantHandle) {
        let connection_id = handle.connection_id;
        let join = CollabMessage::join(&handle.user_id);
        info!(
            "{} joined session {} (diagram {})",
            handle.user_id, self.session.id, self.session.diagram_id
        );

        self.members.insert(connection_id, handle);
        self.active = true;
        self.session.touch();
        self.publish();

        let failed = self.fan_out(join, Some(connection_id));
        self.remove_participants(failed);
    }

    /// Remove connections and announce each departure. Announcing can uncover
    /// more failed connections, which are removed the same way.
    fn remove_participants(&mut self, mut pending: Vec<ConnectionId>) {
        while let Some(id) = pending.pop() {
            let Some(handle) = self.members.remove(&id) else {
                debug!("Connection {} is not part of session {}", id, self.session.id);
                continue;
            };
            info!(
                "{} left session {} (diagram {})",
                handle.user_id, self.session.id, self.session.diagram_id
            );
            let leave = CollabMessage::leave(&handle.user_id);
            drop(handle);

            self.session.touch();
            self.publish();
            pending.extend(self.fan_out(leave, None));
        }
    }

    /// Queue a message for every member but `exclude`, returning the connections that could not take it
    fn fan_out(&self, message: CollabMessage, exclude: Option<ConnectionId>) -> Vec<ConnectionId> {
        let message = Arc::new(message);
        self.members
            .iter()
            .filter(|(id, _)| Some(**id) != exclude)
            .filter_map(|(id, handle)| match handle.deliver(&message) {
                Ok(()) => None,
                Err(DeliveryError::Full) => {
                    warn!(
                        "Outbound queue of {} is full, dropping connection {} from session {}",
                        handle.user_id, id, self.session.id
                    );
                    Some(*id)
                }
                Err(DeliveryError::Closed) => {
                    debug!("Connection {} of {} is already closed", id, handle.user_id);
                    Some(*id)
                }
            })
            .collect()
    }

    fn publish(&self) {
        let mut by_user: HashMap<&str, DateTime<Utc>> = HashMap::new();
        for handle in self.members.values() {
            by_user
                .entry(handle.user_id.as_str())
                .and_modify(|joined_at| *joined_at = (*joined_at).min(handle.joined_at))
                .or_insert(handle.joined_at);
        }

        let mut participants: Vec<Participant> = by_user
            .into_iter()
            .map(|(user_id, joined_at)| Participant {
                user_id: user_id.to_string(),
                joined_at,
            })
            .collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then_with(|| a.user_id.cmp(&b.user_id)));

        self.snapshot_tx.send_replace(participants);
    }

    /// Decide whether an emptied or never used session ends. The decision is
    /// taken under the hub lock, where joiners queue their registration, so a
    /// pending joiner keeps the session alive instead of being lost.
    fn try_terminate(&mut self) -> bool {
        loop {
            if !(self.active || self.grace_expired) || !self.members.is_empty() {
                return false;
            }

            let Some(hub) = self.hub.upgrade() else {
                self.session.mark_terminated();
                return true;
            };

            let mut sessions = hub.lock_sessions();
            match self.register_rx.try_recv() {
                Ok(handle) => {
                    drop(sessions);
                    self.dispatch(RelayEvent::Register(handle));
                }
                Err(_) => {
                    self.session.mark_terminated();
                    Hub::remove_entry(&mut sessions, &self.session);
                    return true;
                }
            }
        }
    }

    fn close(&mut self) {
        self.session.mark_terminated();

        self.unregister_rx.close();
        self.broadcast_rx.close();
        self.register_rx.close();
        while let Ok(handle) = self.register_rx.try_recv() {
            debug!("Rejecting late registration of {} to ended session {}", handle.user_id, self.session.id);
        }

        let closed = self.members.len();
        self.members.clear();
        self.snapshot_tx.send_replace(Vec::new());

        if let Some(hub) = self.hub.upgrade() {
            hub.forget(&self.session);
        }

        info!(
            "Session {} for diagram {} terminated, {} connection(s) closed",
            self.session.id, self.session.diagram_id, closed
        );
    }
}
