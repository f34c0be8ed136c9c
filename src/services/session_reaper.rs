use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::ws::Hub;

/// End every session that saw no activity for `idle_timeout`, and sessions left without participants
pub fn reap_idle_sessions(hub: &Hub, idle_timeout: Duration) -> usize {
    let reaped = hub.reap_stale_sessions(idle_timeout);
    for diagram_id in &reaped {
        info!("Reaped stale collaboration session for diagram {}", diagram_id);
    }
    reaped.len()
}

/// Periodically reap idle sessions until the hub is dropped
pub fn spawn_session_reaper(hub: Arc<Hub>, idle_timeout: Duration, interval: Duration) -> JoinHandle<()> {
    let hub = Arc::downgrade(&hub);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(hub) = hub.upgrade() else {
                debug!("Hub dropped, stopping session reaper");
                return;
            };
            reap_idle_sessions(&hub, idle_timeout);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::{HubSettings, ParticipantHandle};
    use tokio::time::sleep;
    use uuid::Uuid;

    #[tokio::test]
    async fn idle_sessions_are_ended_and_busy_ones_kept() {
        let hub = Hub::new(HubSettings::default());
        let idle = Uuid::new_v4();
        let busy = Uuid::new_v4();
        hub.get_or_create_session(&idle);
        let (handle, _rx) = ParticipantHandle::new("alice", 8);
        let busy_session = hub.join(&busy, handle).expect("join");

        sleep(Duration::from_millis(60)).await;
        busy_session.touch();

        assert_eq!(reap_idle_sessions(&hub, Duration::from_millis(40)), 1);
        assert!(!hub.has_active_session(&idle));
        assert!(hub.has_active_session(&busy));
    }

    #[tokio::test]
    async fn background_reaper_ends_idle_sessions() {
        let hub = Hub::new(HubSettings::default());
        let diagram_id = Uuid::new_v4();
        hub.get_or_create_session(&diagram_id);

        let task = spawn_session_reaper(hub.clone(), Duration::from_millis(20), Duration::from_millis(10));
        for _ in 0..100 {
            if !hub.has_active_session(&diagram_id) {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        assert!(!hub.has_active_session(&diagram_id));
        task.abort();
    }
}
