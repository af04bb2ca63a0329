use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::error::{AutomationError, AutomationResult};
use super::store::Persistence;
use super::types::{Event, Payload, validate_identifier};

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDraft {
    pub event_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub setup_done: bool,
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPatch {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub setup_done: Option<bool>,
}

/// Owner-declared trigger channels. Events are never deleted implicitly.
pub struct EventRepository {
    persistence: Arc<Persistence>,
    events: Mutex<HashMap<String, Event>>,
}

impl EventRepository {
    pub async fn load(persistence: Arc<Persistence>) -> AutomationResult<Self> {
        let events = persistence
            .load_events()
            .await?
            .into_iter()
            .map(|event| (event.event_id.clone(), event))
            .collect::<HashMap<_, _>>();
        info!("Loaded {} events", events.len());
        Ok(Self {
            persistence,
            events: Mutex::new(events),
        })
    }

    async fn persist(&self, events: &HashMap<String, Event>) {
        if let Err(e) = self.persistence.save_events(events.values()).await {
            warn!("Failed to persist events: {}", e);
        }
    }

    pub async fn create_event(&self, owner_id: &str, draft: EventDraft) -> AutomationResult<Event> {
        let event_id = draft.event_id.trim().to_string();
        validate_identifier("Event", &event_id)?;

        let mut events = self.events.lock().await;
        if events.contains_key(&event_id) {
            return Err(AutomationError::Validation(format!(
                "Event '{}' already exists",
                event_id
            )));
        }

        let event = Event {
            event_id: event_id.clone(),
            description: draft.description.trim().to_string(),
            owner_id: owner_id.to_string(),
            setup_done: draft.setup_done,
            last_triggered_at: None,
            last_payload: None,
        };
        events.insert(event_id, event.clone());
        self.persist(&events).await;
        info!("Event '{}' created by owner {}", event.event_id, owner_id);
        Ok(event)
    }

    pub async fn update_event(
        &self,
        owner_id: &str,
        event_id: &str,
        patch: EventPatch,
    ) -> AutomationResult<Event> {
        let mut events = self.events.lock().await;
        let event = events
            .get_mut(event_id)
            .ok_or(AutomationError::NotFound("Event"))?;
        if event.owner_id != owner_id {
            return Err(AutomationError::Forbidden("Event"));
        }
        if let Some(description) = patch.description {
            event.description = description.trim().to_string();
        }
        if let Some(setup_done) = patch.setup_done {
            event.setup_done = setup_done;
        }
        let updated = event.clone();
        self.persist(&events).await;
        Ok(updated)
    }

    pub async fn get_event(&self, owner_id: &str, event_id: &str) -> AutomationResult<Event> {
        let events = self.events.lock().await;
        let event = events
            .get(event_id)
            .ok_or(AutomationError::NotFound("Event"))?;
        if event.owner_id != owner_id {
            return Err(AutomationError::Forbidden("Event"));
        }
        Ok(event.clone())
    }

    pub async fn exists(&self, event_id: &str) -> bool {
        self.events.lock().await.contains_key(event_id)
    }

    pub async fn owner_of(&self, event_id: &str) -> Option<String> {
        self.events
            .lock()
            .await
            .get(event_id)
            .map(|event| event.owner_id.clone())
    }

    pub async fn list_events(&self, owner_id: &str) -> Vec<Event> {
        let events = self.events.lock().await;
        let mut owned: Vec<Event> = events
            .values()
            .filter(|event| event.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        owned
    }

    /// Callers must make sure no listener is still bound to the event.
    pub(crate) async fn remove_event(&self, owner_id: &str, event_id: &str) -> AutomationResult<()> {
        let mut events = self.events.lock().await;
        match events.get(event_id) {
            None => return Err(AutomationError::NotFound("Event")),
            Some(event) if event.owner_id != owner_id => {
                return Err(AutomationError::Forbidden("Event"));
            }
            Some(_) => {}
        }
        events.remove(event_id);
        self.persist(&events).await;
        info!("Event '{}' removed by owner {}", event_id, owner_id);
        Ok(())
    }

    /// Record the latest trigger. Concurrent stamps for one event are last
    /// write wins.
    pub async fn stamp_trigger(&self, event_id: &str, payload: &Payload) {
        let mut events = self.events.lock().await;
        let Some(event) = events.get_mut(event_id) else {
            return;
        };
        event.last_triggered_at = Some(Utc::now());
        event.last_payload = Some(payload.clone());
        self.persist(&events).await;
    }
}

/// Public URL an external system should call to trigger `event_id`.
pub fn event_url(public_base_url: &str, event_id: &str) -> String {
    format!("{}/events/{}", public_base_url.trim_end_matches('/'), event_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn repo() -> EventRepository {
        let persistence = Arc::new(Persistence::open_in_memory().unwrap());
        EventRepository::load(persistence).await.unwrap()
    }

    fn draft(id: &str) -> EventDraft {
        EventDraft {
            event_id: id.to_string(),
            description: "front door opened".to_string(),
            setup_done: false,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_bad_ids() {
        let repo = repo().await;
        repo.create_event("alice", draft("door")).await.unwrap();
        assert!(matches!(
            repo.create_event("bob", draft("door")).await,
            Err(AutomationError::Validation(_))
        ));
        assert!(matches!(
            repo.create_event("alice", draft("bad id")).await,
            Err(AutomationError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn only_owner_can_read_or_update() {
        let repo = repo().await;
        repo.create_event("alice", draft("door")).await.unwrap();

        assert!(matches!(
            repo.get_event("bob", "door").await,
            Err(AutomationError::Forbidden("Event"))
        ));
        assert!(matches!(
            repo.get_event("alice", "nope").await,
            Err(AutomationError::NotFound("Event"))
        ));

        let updated = repo
            .update_event(
                "alice",
                "door",
                EventPatch {
                    description: None,
                    setup_done: Some(true),
                },
            )
            .await
            .unwrap();
        assert!(updated.setup_done);
        assert_eq!(updated.description, "front door opened");
        assert!(repo.list_events("bob").await.is_empty());
    }

    #[tokio::test]
    async fn stamp_trigger_persists_latest_payload() {
        let persistence = Arc::new(Persistence::open_in_memory().unwrap());
        let repo = EventRepository::load(persistence.clone()).await.unwrap();
        repo.create_event("alice", draft("door")).await.unwrap();

        let payload = json!({ "who": "courier" }).as_object().cloned().unwrap();
        repo.stamp_trigger("door", &payload).await;
        repo.stamp_trigger("unknown", &payload).await;

        let stored = persistence.load_events().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].last_triggered_at.is_some());
        assert_eq!(stored[0].last_payload.as_ref(), Some(&payload));
    }

    #[test]
    fn event_url_joins_base_and_id() {
        assert_eq!(
            event_url("https://hooks.example.com/", "door"),
            "https://hooks.example.com/events/door"
        );
    }
}
