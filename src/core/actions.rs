use chrono::Utc;
use chrono_tz::Tz;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::error::{AutomationError, AutomationResult};
use super::execution::ExecutionBridge;
use super::store::Persistence;
use super::types::{Action, MAX_OFFSET_SECONDS, Schedule, TriggerSpec, validate_identifier};

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDraft {
    /// Ignored on update; the path id wins.
    #[serde(default)]
    pub action_id: String,
    #[serde(default)]
    pub description: String,
    pub schedule: Schedule,
    #[serde(default)]
    pub instruction: Option<String>,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub tool_names: Option<Vec<String>>,
    #[serde(default)]
    pub notify: bool,
}

/// In-memory record plus the job currently installed for it. The job id is
/// never persisted.
struct ScheduledAction {
    action: Action,
    job_id: Option<Uuid>,
}

pub struct ActionScheduler {
    persistence: Arc<Persistence>,
    bridge: Arc<ExecutionBridge>,
    scheduler: JobScheduler,
    timezone: Tz,
    state: Mutex<HashMap<String, ScheduledAction>>,
    this: Weak<ActionScheduler>,
}

/// Accept classic five-field cron by pinning seconds to zero.
fn normalize_cron(expression: &str) -> String {
    let expression = expression.trim();
    if expression.split_whitespace().count() == 5 {
        format!("0 {}", expression)
    } else {
        expression.to_string()
    }
}

impl ActionScheduler {
    /// Load persisted actions and install a job for each. Delay actions whose
    /// time already passed fire right away; a cron action that no longer
    /// parses is kept but left unscheduled.
    pub async fn restore(
        persistence: Arc<Persistence>,
        bridge: Arc<ExecutionBridge>,
        scheduler: JobScheduler,
        timezone: Tz,
    ) -> AutomationResult<Arc<Self>> {
        let stored = persistence.load_actions().await?;
        let actions = Arc::new_cyclic(|this| Self {
            persistence,
            bridge,
            scheduler,
            timezone,
            state: Mutex::new(HashMap::new()),
            this: this.clone(),
        });

        let mut state = actions.state.lock().await;
        for action in stored {
            let job_id = match actions.install(&action).await {
                Ok(job_id) => job_id,
                Err(e) => {
                    error!("Failed to reschedule action {}: {}", action.action_id, e);
                    None
                }
            };
            state.insert(action.action_id.clone(), ScheduledAction { action, job_id });
        }
        info!("Restored {} actions", state.len());
        drop(state);
        Ok(actions)
    }

    async fn persist(&self, state: &HashMap<String, ScheduledAction>) {
        if let Err(e) = self
            .persistence
            .save_actions(state.values().map(|scheduled| &scheduled.action))
            .await
        {
            warn!("Failed to persist actions: {}", e);
        }
    }

    fn build(&self, action_id: String, owner_id: &str, draft: ActionDraft) -> AutomationResult<Action> {
        validate_identifier("Action", &action_id)?;
        let trigger = TriggerSpec::from_parts(draft.instruction, draft.template, draft.tool_names)?;
        let schedule = match draft.schedule {
            Schedule::Cron { expression } if expression.trim().is_empty() => {
                return Err(AutomationError::Schedule(
                    "cron expression is required".to_string(),
                ));
            }
            Schedule::Cron { expression } => Schedule::Cron {
                expression: expression.trim().to_string(),
            },
            Schedule::Delay { seconds } if seconds > MAX_OFFSET_SECONDS => {
                return Err(AutomationError::Schedule(format!(
                    "delay must be at most {} seconds",
                    MAX_OFFSET_SECONDS
                )));
            }
            delay => delay,
        };
        Ok(Action {
            action_id,
            description: draft.description.trim().to_string(),
            owner_id: owner_id.to_string(),
            schedule,
            trigger,
            notify: draft.notify,
            created_at: Utc::now(),
        })
    }

    /// Install the job for `action` and return its id. `None` means the
    /// delay had already elapsed and the action was dispatched directly.
    async fn install(&self, action: &Action) -> AutomationResult<Option<Uuid>> {
        let action_id = action.action_id.clone();
        let this = self.this.clone();

        let job = match &action.schedule {
            Schedule::Delay { seconds } => {
                let Some(remaining) = action.remaining_delay(Utc::now()) else {
                    return Err(AutomationError::Schedule(format!(
                        "delay of {} seconds is out of range",
                        seconds
                    )));
                };
                if remaining.is_zero() {
                    tokio::spawn(async move {
                        if let Some(actions) = this.upgrade() {
                            actions.fire_once(&action_id, None).await;
                        }
                    });
                    return Ok(None);
                }
                Job::new_one_shot_async(remaining, move |job_id, _lock| {
                    let this = this.clone();
                    let action_id = action_id.clone();
                    Box::pin(async move {
                        if let Some(actions) = this.upgrade() {
                            actions.fire_once(&action_id, Some(job_id)).await;
                        }
                    })
                })
            }
            Schedule::Cron { expression } => {
                let expression = normalize_cron(expression);
                Job::new_async_tz(expression.as_str(), self.timezone, move |_job_id, _lock| {
                    let this = this.clone();
                    let action_id = action_id.clone();
                    Box::pin(async move {
                        if let Some(actions) = this.upgrade() {
                            actions.fire_recurring(&action_id).await;
                        }
                    })
                })
            }
        }
        .map_err(|e| AutomationError::Schedule(e.to_string()))?;

        let job_id = job.guid();
        self.scheduler
            .add(job)
            .await
            .map_err(|e| AutomationError::Schedule(format!("Failed to register job: {}", e)))?;
        Ok(Some(job_id))
    }

    async fn cancel(&self, action_id: &str, job_id: Option<Uuid>) {
        let Some(job_id) = job_id else {
            return;
        };
        if let Err(e) = self.scheduler.remove(&job_id).await {
            warn!(
                "Failed to remove job {} for action {}: {}",
                job_id, action_id, e
            );
        }
    }

    /// Single execution of a delay action, then the record goes away. The job
    /// id guards against a timer that was replaced by an update.
    async fn fire_once(&self, action_id: &str, job_id: Option<Uuid>) {
        let action = {
            let state = self.state.lock().await;
            match state.get(action_id) {
                Some(scheduled) if scheduled.job_id == job_id => scheduled.action.clone(),
                _ => return,
            }
        };

        info!("Running delayed action {}", action_id);
        self.bridge
            .run("action", &action.owner_id, &action.trigger, action.notify, None)
            .await;

        let mut state = self.state.lock().await;
        if state
            .get(action_id)
            .is_some_and(|scheduled| scheduled.job_id == job_id)
        {
            state.remove(action_id);
            self.persist(&state).await;
            info!("Delayed action {} completed and removed", action_id);
        }
    }

    async fn fire_recurring(&self, action_id: &str) {
        let action = {
            let state = self.state.lock().await;
            match state.get(action_id) {
                Some(scheduled) => scheduled.action.clone(),
                None => return,
            }
        };
        info!("Running scheduled action {}", action_id);
        self.bridge
            .run("action", &action.owner_id, &action.trigger, action.notify, None)
            .await;
    }

    pub async fn create_action(&self, owner_id: &str, draft: ActionDraft) -> AutomationResult<Action> {
        let action_id = draft.action_id.trim().to_string();
        let action = self.build(action_id, owner_id, draft)?;

        let mut state = self.state.lock().await;
        if state.contains_key(&action.action_id) {
            return Err(AutomationError::Validation(format!(
                "Action '{}' already exists",
                action.action_id
            )));
        }
        let job_id = self.install(&action).await?;
        state.insert(
            action.action_id.clone(),
            ScheduledAction {
                action: action.clone(),
                job_id,
            },
        );
        self.persist(&state).await;
        info!(
            "Action {} ({}, {}) scheduled for owner {}",
            action.action_id,
            action.trigger.kind(),
            if action.schedule.is_recurring() { "recurring" } else { "one-shot" },
            owner_id
        );
        Ok(action)
    }

    /// Full replace. The new job is installed before the old one is
    /// cancelled, so a rejected schedule leaves the action untouched.
    pub async fn update_action(
        &self,
        owner_id: &str,
        action_id: &str,
        draft: ActionDraft,
    ) -> AutomationResult<Action> {
        let action = self.build(action_id.to_string(), owner_id, draft)?;

        let mut state = self.state.lock().await;
        let previous = match state.get(action_id) {
            None => return Err(AutomationError::NotFound("Action")),
            Some(scheduled) if scheduled.action.owner_id != owner_id => {
                return Err(AutomationError::Forbidden("Action"));
            }
            Some(scheduled) => scheduled.job_id,
        };

        let job_id = self.install(&action).await?;
        self.cancel(action_id, previous).await;
        state.insert(
            action_id.to_string(),
            ScheduledAction {
                action: action.clone(),
                job_id,
            },
        );
        self.persist(&state).await;
        info!("Action {} rescheduled by owner {}", action_id, owner_id);
        Ok(action)
    }

    /// Returns `Ok(false)` when the action is already gone.
    pub async fn remove_action(&self, owner_id: &str, action_id: &str) -> AutomationResult<bool> {
        let mut state = self.state.lock().await;
        match state.get(action_id) {
            None => return Ok(false),
            Some(scheduled) if scheduled.action.owner_id != owner_id => {
                return Err(AutomationError::Forbidden("Action"));
            }
            Some(_) => {}
        }
        let Some(removed) = state.remove(action_id) else {
            return Ok(false);
        };
        self.cancel(action_id, removed.job_id).await;
        self.persist(&state).await;
        info!("Action {} removed by owner {}", action_id, owner_id);
        Ok(true)
    }

    pub async fn get_action(&self, owner_id: &str, action_id: &str) -> AutomationResult<Action> {
        let state = self.state.lock().await;
        let scheduled = state
            .get(action_id)
            .ok_or(AutomationError::NotFound("Action"))?;
        if scheduled.action.owner_id != owner_id {
            return Err(AutomationError::Forbidden("Action"));
        }
        Ok(scheduled.action.clone())
    }

    pub async fn list_actions(&self, owner_id: &str) -> Vec<Action> {
        let state = self.state.lock().await;
        let mut owned: Vec<Action> = state
            .values()
            .map(|scheduled| &scheduled.action)
            .filter(|action| action.owner_id == owner_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.action_id.cmp(&b.action_id));
        owned
    }

    /// Run an action now without touching its schedule.
    pub async fn trigger_now(&self, owner_id: &str, action_id: &str) -> AutomationResult<Option<String>> {
        let action = self.get_action(owner_id, action_id).await?;
        info!("Manual run of action {} by owner {}", action_id, owner_id);
        Ok(self
            .bridge
            .run("action", &action.owner_id, &action.trigger, action.notify, None)
            .await)
    }
}
