
use std::sync::Arc;

use crate::core::bus::EventBus;
use crate::core::events::{EventDraft, EventRepository};
use crate::core::execution::ExecutionBridge;
use crate::core::execution::testing::{RecordingChannel, ScriptedExecutor};
use crate::core::listeners::{ListenerDraft, ListenerManager};
use crate::core::store::Persistence;

pub(super) struct Fixture {
    pub persistence: Arc<Persistence>,
    pub events: Arc<EventRepository>,
    pub bus: Arc<EventBus>,
    pub executor: Arc<ScriptedExecutor>,
    pub channel: Arc<RecordingChannel>,
    pub manager: Arc<ListenerManager>,
}

/// Manager over an in-memory store with events `door` and `garage` owned by
/// `alice`.
pub(super) async fn fixture(executor: Arc<ScriptedExecutor>) -> Fixture {
    let persistence = Arc::new(Persistence::open_in_memory().unwrap());
    fixture_on(persistence, executor, true).await
}

pub(super) async fn fixture_on(
    persistence: Arc<Persistence>,
    executor: Arc<ScriptedExecutor>,
    seed_events: bool,
) -> Fixture {
    let events = Arc::new(EventRepository::load(persistence.clone()).await.unwrap());
    if seed_events {
        for id in ["door", "garage"] {
            events
                .create_event(
                    "alice",
                    EventDraft {
                        event_id: id.to_string(),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
        }
    }
    let bus = Arc::new(EventBus::new());
    let channel = RecordingChannel::new();
    let bridge = Arc::new(ExecutionBridge::new(executor.clone(), channel.clone()));
    let manager = ListenerManager::load(persistence.clone(), events.clone(), bus.clone(), bridge)
        .await
        .unwrap();
    Fixture {
        persistence,
        events,
        bus,
        executor,
        channel,
        manager,
    }
}

pub(super) fn template(event_id: &str, text: &str) -> ListenerDraft {
    ListenerDraft {
        event_id: event_id.to_string(),
        template: Some(text.to_string()),
        ..Default::default()
    }
}

pub(super) fn instruction(event_id: &str, text: &str) -> ListenerDraft {
    ListenerDraft {
        event_id: event_id.to_string(),
        instruction: Some(text.to_string()),
        ..Default::default()
    }
}

/// Move a listener's creation time into the past.
pub(super) async fn backdate(manager: &ListenerManager, listener_id: &str, seconds: i64) {
    let mut state = manager.state.lock().await;
    if let Some(listener) = state.listeners.get_mut(listener_id) {
        listener.created_at -= chrono::Duration::seconds(seconds);
    }
}
