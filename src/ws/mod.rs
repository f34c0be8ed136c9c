pub mod hub;
pub mod session;
pub mod participant;
pub mod handler;

pub use hub::{Hub, HubSettings};
pub use session::{JoinError, Session};
pub use participant::{ConnectionId, ParticipantHandle};
