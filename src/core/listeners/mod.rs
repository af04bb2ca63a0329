//! Listener lifecycle: CRUD, bus registration, per-trigger dispatch and
//! expiry.
//!
//! A listener is removed when its owner deletes it, after its first trigger
//! when `autoStopAfterSingleEvent` is set, or once `createdAt +
//! expiresInSeconds` passes. Expiry is checked lazily on every trigger and by
//! a periodic sweep; both paths go through the same idempotent removal.

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::bus::{EventBus, EventHandler};
use super::error::{AutomationError, AutomationResult};
use super::events::EventRepository;
use super::execution::ExecutionBridge;
use super::lifecycle::LifecycleComponent;
use super::store::Persistence;
use super::types::{Listener, ListenerOptions, MAX_OFFSET_SECONDS, Payload, TriggerSpec};

/// Request shape for creating or fully replacing a listener.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenerDraft {
    pub event_id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub tool_names: Option<Vec<String>>,
    #[serde(default)]
    pub notify: bool,
    #[serde(default)]
    pub options: ListenerOptions,
}

#[derive(Default)]
struct ListenerState {
    listeners: HashMap<String, Listener>,
    /// Single-shot listeners whose one trigger is already in flight.
    consumed: HashSet<String>,
}

pub struct ListenerManager {
    persistence: Arc<Persistence>,
    events: Arc<EventRepository>,
    bus: Arc<EventBus>,
    bridge: Arc<ExecutionBridge>,
    state: Mutex<ListenerState>,
}

/// Bus-side handle for one listener. Holds only the id; everything else is
/// looked up at dispatch time.
struct ListenerHandler {
    listener_id: String,
    manager: Weak<ListenerManager>,
}

#[async_trait]
impl EventHandler for ListenerHandler {
    fn handler_id(&self) -> &str {
        &self.listener_id
    }

    async fn handle(&self, event_id: &str, payload: Payload) -> Result<Option<String>> {
        let Some(manager) = self.manager.upgrade() else {
            return Ok(None);
        };
        Ok(manager.dispatch(&self.listener_id, event_id, payload).await)
    }
}

impl ListenerManager {
    /// Load persisted listeners, drop the ones that expired while the
    /// process was down, and subscribe the rest.
    pub async fn load(
        persistence: Arc<Persistence>,
        events: Arc<EventRepository>,
        bus: Arc<EventBus>,
        bridge: Arc<ExecutionBridge>,
    ) -> AutomationResult<Arc<Self>> {
        let stored = persistence.load_listeners().await?;
        let manager = Arc::new(Self {
            persistence,
            events,
            bus,
            bridge,
            state: Mutex::new(ListenerState::default()),
        });

        let now = Utc::now();
        let mut expired = 0;
        {
            let mut state = manager.state.lock().await;
            for listener in stored {
                if listener.is_expired_at(now) {
                    expired += 1;
                    continue;
                }
                manager.subscribe(&listener);
                state.listeners.insert(listener.id.clone(), listener);
            }
            if expired > 0 {
                manager.persist(&state).await;
            }
            info!(
                "Restored {} listeners ({} expired while offline)",
                state.listeners.len(),
                expired
            );
        }
        Ok(manager)
    }

    fn subscribe(self: &Arc<Self>, listener: &Listener) {
        self.bus.subscribe(
            &listener.event_id,
            Arc::new(ListenerHandler {
                listener_id: listener.id.clone(),
                manager: Arc::downgrade(self),
            }),
        );
    }

    async fn persist(&self, state: &ListenerState) {
        if let Err(e) = self
            .persistence
            .save_listeners(state.listeners.values())
            .await
        {
            warn!("Failed to persist listeners: {}", e);
        }
    }

    async fn build(
        &self,
        id: String,
        owner_id: &str,
        draft: ListenerDraft,
    ) -> AutomationResult<Listener> {
        let trigger = TriggerSpec::from_parts(draft.instruction, draft.template, draft.tool_names)?;
        let event_id = draft.event_id.trim().to_string();
        if event_id.is_empty() {
            return Err(AutomationError::Validation("eventId is required".to_string()));
        }
        if !self.events.exists(&event_id).await {
            return Err(AutomationError::Validation(format!(
                "Event '{}' does not exist",
                event_id
            )));
        }
        if let Some(seconds) = draft.options.auto_stop_after_delay_seconds
            && seconds > MAX_OFFSET_SECONDS
        {
            return Err(AutomationError::Validation(format!(
                "autoStopAfterDelaySeconds must be at most {}",
                MAX_OFFSET_SECONDS
            )));
        }
        if draft.options.auto_stop_after_single_event
            && draft.options.auto_stop_after_delay_seconds.is_some()
        {
            debug!("Listener {} sets both auto-stop options; whichever fires first wins", id);
        }

        Ok(Listener {
            id,
            event_id,
            owner_id: owner_id.to_string(),
            description: draft.description.trim().to_string(),
            trigger,
            notify: draft.notify,
            expires_in_seconds: draft.options.auto_stop_after_delay_seconds,
            options: draft.options,
            created_at: Utc::now(),
        })
    }

    pub async fn create_listener(
        self: &Arc<Self>,
        owner_id: &str,
        draft: ListenerDraft,
    ) -> AutomationResult<Listener> {
        let id = uuid::Uuid::new_v4().to_string();
        let listener = self.build(id, owner_id, draft).await?;

        let mut state = self.state.lock().await;
        state
            .listeners
            .insert(listener.id.clone(), listener.clone());
        self.persist(&state).await;
        self.subscribe(&listener);
        info!(
            "Listener {} ({}) bound to event '{}' for owner {}",
            listener.id,
            listener.trigger.kind(),
            listener.event_id,
            owner_id
        );
        Ok(listener)
    }

    /// Full replace. Keeps the id, restarts the expiry clock.
    pub async fn update_listener(
        self: &Arc<Self>,
        owner_id: &str,
        listener_id: &str,
        draft: ListenerDraft,
    ) -> AutomationResult<Listener> {
        self.check_owner(owner_id, listener_id).await?;
        let listener = self.build(listener_id.to_string(), owner_id, draft).await?;

        let mut state = self.state.lock().await;
        let Some(previous) = state.listeners.get(listener_id).cloned() else {
            return Err(AutomationError::NotFound("Listener"));
        };
        if previous.event_id != listener.event_id {
            self.bus.unsubscribe(&previous.event_id, listener_id);
            self.subscribe(&listener);
        }
        state.consumed.remove(listener_id);
        state
            .listeners
            .insert(listener_id.to_string(), listener.clone());
        self.persist(&state).await;
        info!("Listener {} updated by owner {}", listener_id, owner_id);
        Ok(listener)
    }

    /// Returns `Ok(false)` when the listener is already gone.
    pub async fn remove_listener(&self, owner_id: &str, listener_id: &str) -> AutomationResult<bool> {
        match self.check_owner(owner_id, listener_id).await {
            Ok(()) => {}
            Err(AutomationError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        }
        Ok(self.remove_internal(listener_id, "removed by owner").await)
    }

    async fn check_owner(&self, owner_id: &str, listener_id: &str) -> AutomationResult<()> {
        let state = self.state.lock().await;
        match state.listeners.get(listener_id) {
            None => Err(AutomationError::NotFound("Listener")),
            Some(listener) if listener.owner_id != owner_id => {
                Err(AutomationError::Forbidden("Listener"))
            }
            Some(_) => Ok(()),
        }
    }

    /// Idempotent: the sweep, lazy expiry and single-shot completion may all
    /// race to remove the same listener.
    async fn remove_internal(&self, listener_id: &str, reason: &str) -> bool {
        self.remove_matching(listener_id, None, reason).await
    }

    /// With `claimed` set, only the record created at that instant is
    /// removed; an update in between leaves the replacement alone.
    async fn remove_matching(
        &self,
        listener_id: &str,
        claimed: Option<DateTime<Utc>>,
        reason: &str,
    ) -> bool {
        let mut state = self.state.lock().await;
        let current = match state.listeners.get(listener_id) {
            Some(listener) => listener.created_at,
            None => return false,
        };
        if claimed.is_some_and(|created_at| created_at != current) {
            debug!("Listener {} was replaced mid-trigger; keeping it", listener_id);
            return false;
        }
        state.consumed.remove(listener_id);
        let Some(listener) = state.listeners.remove(listener_id) else {
            return false;
        };
        self.bus.unsubscribe(&listener.event_id, listener_id);
        self.persist(&state).await;
        info!("Listener {} on '{}' {}", listener_id, listener.event_id, reason);
        true
    }

    pub async fn get_listener(&self, owner_id: &str, listener_id: &str) -> AutomationResult<Listener> {
        self.check_owner(owner_id, listener_id).await?;
        self.state
            .lock()
            .await
            .listeners
            .get(listener_id)
            .cloned()
            .ok_or(AutomationError::NotFound("Listener"))
    }

    pub async fn list_listeners(&self, owner_id: &str) -> Vec<Listener> {
        let state = self.state.lock().await;
        let mut owned: Vec<Listener> = state
            .listeners
            .values()
            .filter(|listener| listener.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by_key(|listener| listener.created_at);
        owned
    }

    pub async fn count_for_event(&self, event_id: &str) -> usize {
        self.state
            .lock()
            .await
            .listeners
            .values()
            .filter(|listener| listener.event_id == event_id)
            .count()
    }

    /// One trigger for one listener.
    async fn dispatch(&self, listener_id: &str, event_id: &str, payload: Payload) -> Option<String> {
        self.events.stamp_trigger(event_id, &payload).await;

        let listener = {
            let mut state = self.state.lock().await;
            let listener = state.listeners.get(listener_id)?.clone();
            if listener.is_expired_at(Utc::now()) {
                drop(state);
                self.remove_internal(listener_id, "expired before trigger")
                    .await;
                return None;
            }
            // Claim under the lock so back-to-back publishes run a
            // single-shot listener at most once.
            if listener.options.auto_stop_after_single_event
                && !state.consumed.insert(listener_id.to_string())
            {
                return None;
            }
            listener
        };

        let output = self
            .bridge
            .run(
                "listener",
                &listener.owner_id,
                &listener.trigger,
                listener.notify,
                Some(&payload),
            )
            .await;

        if listener.options.auto_stop_after_single_event {
            self.remove_matching(
                listener_id,
                Some(listener.created_at),
                "stopped after single event",
            )
            .await;
        }
        output
    }

    /// Remove every listener whose lifetime has passed, fired or not.
    pub async fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = {
            let state = self.state.lock().await;
            state
                .listeners
                .values()
                .filter(|listener| listener.is_expired_at(now))
                .map(|listener| listener.id.clone())
                .collect()
        };

        let mut removed = 0;
        for id in expired {
            if self.remove_internal(&id, "expired (sweep)").await {
                removed += 1;
            }
        }
        removed
    }
}

/// Runs [`ListenerManager::sweep_expired`] on a fixed interval while the
/// engine is up.
pub struct ExpirySweeper {
    manager: Arc<ListenerManager>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl ExpirySweeper {
    pub fn new(manager: Arc<ListenerManager>, interval: Duration) -> Self {
        Self {
            manager,
            interval,
            task: None,
        }
    }
}

#[async_trait]
impl LifecycleComponent for ExpirySweeper {
    async fn on_start(&mut self) -> Result<()> {
        let manager = self.manager.clone();
        let period = self.interval;
        info!("Listener expiry sweep every {:?}", period);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = manager.sweep_expired().await;
                if removed > 0 {
                    info!("Expiry sweep removed {} listeners", removed);
                }
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}
