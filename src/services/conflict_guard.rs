use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use crate::models::{ApiError, ErrorResponse};
use crate::ws::Hub;

/// Refuses ordinary REST mutations of diagrams that have a live collaboration session.
///
/// The check and the mutation that follows are not atomic: a session may start
/// right after the check passes. The guard keeps REST writes from silently
/// diverging from a running session, it is not a lock.
#[derive(Clone, Debug)]
pub struct ConflictGuard {
    hub: Arc<Hub>,
}

impl ConflictGuard {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Check before updating, patching or deleting a diagram
    pub fn ensure_diagram_editable(&self, diagram_id: &Uuid) -> Result<(), ApiError> {
        if self.hub.has_active_session(diagram_id) {
            warn!("Blocked mutation of diagram {}: collaboration session is active", diagram_id);
            return Err(ErrorResponse::conflict(format!(
                "Diagram {} cannot be modified while a collaboration session is active",
                diagram_id
            )));
        }
        Ok(())
    }

    /// Check before deleting a threat model that owns the given diagrams
    pub fn ensure_diagrams_editable(&self, threat_model_id: &Uuid, diagram_ids: &[Uuid]) -> Result<(), ApiError> {
        if let Some(live) = diagram_ids.iter().find(|id| self.hub.has_active_session(id)) {
            warn!(
                "Blocked deletion of threat model {}: diagram {} has an active collaboration session",
                threat_model_id, live
            );
            return Err(ErrorResponse::conflict(format!(
                "Threat model {} cannot be deleted while a collaboration session is active on diagram {}",
                threat_model_id, live
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::HubSettings;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn live_session_blocks_diagram_mutation() {
        let hub = Hub::new(HubSettings::default());
        let guard = ConflictGuard::new(hub.clone());
        let diagram_id = Uuid::new_v4();

        assert!(guard.ensure_diagram_editable(&diagram_id).is_ok());

        hub.get_or_create_session(&diagram_id);
        let (status, body) = guard.ensure_diagram_editable(&diagram_id).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body.error, "conflict");
        assert!(body.error_description.contains("collaboration session is active"));

        hub.remove_session(&diagram_id);
        assert!(guard.ensure_diagram_editable(&diagram_id).is_ok());
    }

    #[tokio::test]
    async fn any_live_child_diagram_blocks_threat_model_deletion() {
        let hub = Hub::new(HubSettings::default());
        let guard = ConflictGuard::new(hub.clone());
        let threat_model_id = Uuid::new_v4();
        let children = [Uuid::new_v4(), Uuid::new_v4()];

        assert!(guard.ensure_diagrams_editable(&threat_model_id, &children).is_ok());
        assert!(guard.ensure_diagrams_editable(&threat_model_id, &[]).is_ok());

        hub.get_or_create_session(&children[1]);
        let (status, _) = guard.ensure_diagrams_editable(&threat_model_id, &children).unwrap_err();
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
