//! In-process publish/subscribe keyed by event id.
//!
//! Handlers are identified by `handler_id()`, so registering the same id
//! twice on one event keeps a single subscription. Every handler runs in its
//! own task: a failing or panicking handler is logged and never affects its
//! siblings or the publisher.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::types::Payload;

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn handler_id(&self) -> &str;

    /// Returns the text produced for this trigger, or `None` when the
    /// handler produced nothing (ignored, expired, already consumed).
    async fn handle(&self, event_id: &str, payload: Payload) -> Result<Option<String>>;
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Arc<dyn EventHandler>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, event_id: &str, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let entry = handlers.entry(event_id.to_string()).or_default();
        if entry
            .iter()
            .any(|existing| existing.handler_id() == handler.handler_id())
        {
            return;
        }
        entry.push(handler);
    }

    /// Removing a handler that is not registered is a no-op.
    pub fn unsubscribe(&self, event_id: &str, handler_id: &str) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = handlers.get_mut(event_id) {
            entry.retain(|existing| existing.handler_id() != handler_id);
            if entry.is_empty() {
                handlers.remove(event_id);
            }
        }
    }

    pub fn subscriber_count(&self, event_id: &str) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(event_id).map_or(0, Vec::len)
    }

    fn snapshot(&self, event_id: &str) -> Vec<Arc<dyn EventHandler>> {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(event_id).cloned().unwrap_or_default()
    }

    /// Fire-and-forget: spawns every handler and returns immediately.
    pub fn publish(&self, event_id: &str, payload: Payload) {
        let handlers = self.snapshot(event_id);
        if handlers.is_empty() {
            debug!("No subscribers for event '{}'", event_id);
            return;
        }

        for handler in handlers {
            let event_id = event_id.to_string();
            let payload = payload.clone();
            tokio::spawn(async move {
                if let Err(e) = handler.handle(&event_id, payload).await {
                    warn!(
                        "Handler '{}' failed for event '{}': {}",
                        handler.handler_id(),
                        event_id,
                        e
                    );
                }
            });
        }
    }

    /// Runs every handler concurrently and returns the outputs of those
    /// that succeeded with a result, in completion order.
    pub async fn publish_and_collect(&self, event_id: &str, payload: Payload) -> Vec<String> {
        let handlers = self.snapshot(event_id);
        if handlers.is_empty() {
            debug!("No subscribers for event '{}'", event_id);
            return Vec::new();
        }

        let mut set = JoinSet::new();
        for handler in handlers {
            let event_id = event_id.to_string();
            let payload = payload.clone();
            set.spawn(async move {
                let result = handler.handle(&event_id, payload).await;
                (handler.handler_id().to_string(), result)
            });
        }

        let mut outputs = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(Some(output)))) => outputs.push(output),
                Ok((_, Ok(None))) => {}
                Ok((handler_id, Err(e))) => {
                    warn!(
                        "Handler '{}' failed for event '{}': {}",
                        handler_id, event_id, e
                    );
                }
                Err(e) => warn!("Handler task for event '{}' aborted: {}", event_id, e),
            }
        }
        outputs
    }
}
