use chrono_tz::Tz;
use std::sync::Arc;
use tokio_cron_scheduler::JobScheduler;

use super::actions::ActionScheduler;
use super::bus::EventBus;
use super::error::{AutomationError, AutomationResult};
use super::events::EventRepository;
use super::execution::ExecutionBridge;
use super::listeners::ListenerManager;
use super::owners::OwnerDirectory;
use super::store::Persistence;

/// Everything the engine owns, built once at boot and handed to the
/// interfaces.
pub struct AutomationContext {
    pub bus: Arc<EventBus>,
    pub events: Arc<EventRepository>,
    pub listeners: Arc<ListenerManager>,
    pub actions: Arc<ActionScheduler>,
    pub owners: Arc<dyn OwnerDirectory>,
    pub public_base_url: String,
}

pub struct ContextParts {
    pub persistence: Arc<Persistence>,
    pub owners: Arc<dyn OwnerDirectory>,
    pub bridge: Arc<ExecutionBridge>,
    pub scheduler: JobScheduler,
    pub timezone: Tz,
    pub public_base_url: String,
}

impl AutomationContext {
    /// Load all three collections, resubscribe listeners and reschedule
    /// actions.
    pub async fn boot(parts: ContextParts) -> AutomationResult<Arc<Self>> {
        let bus = Arc::new(EventBus::new());
        let events = Arc::new(EventRepository::load(parts.persistence.clone()).await?);
        let listeners = ListenerManager::load(
            parts.persistence.clone(),
            events.clone(),
            bus.clone(),
            parts.bridge.clone(),
        )
        .await?;
        let actions = ActionScheduler::restore(
            parts.persistence,
            parts.bridge,
            parts.scheduler,
            parts.timezone,
        )
        .await?;

        Ok(Arc::new(Self {
            bus,
            events,
            listeners,
            actions,
            owners: parts.owners,
            public_base_url: parts.public_base_url,
        }))
    }

    /// Events are only removable once nothing listens on them.
    pub async fn remove_event(&self, owner_id: &str, event_id: &str) -> AutomationResult<()> {
        self.events.get_event(owner_id, event_id).await?;
        let bound = self.listeners.count_for_event(event_id).await;
        if bound > 0 {
            return Err(AutomationError::Validation(format!(
                "Event '{}' still has {} listener(s); remove them first",
                event_id, bound
            )));
        }
        self.events.remove_event(owner_id, event_id).await
    }
}
