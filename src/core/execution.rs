use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::template::render_template;
use super::types::{Payload, TriggerSpec};

/// Outcome of handing an instruction to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorReply {
    Delivered(String),
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub owner_id: String,
    pub instruction: String,
    /// Absent for scheduled actions, which carry no trigger payload.
    pub payload: Option<Payload>,
    pub tool_names: Vec<String>,
    pub notify: bool,
}

/// Interprets free-text instructions against a payload.
#[async_trait]
pub trait InstructionExecutor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutorReply>;
}

/// Pushes text to an owner. Best effort.
#[async_trait]
pub trait MessagingChannel: Send + Sync {
    async fn deliver(&self, owner_id: &str, text: &str) -> Result<()>;
}

pub struct ExecutionBridge {
    executor: Arc<dyn InstructionExecutor>,
    channel: Arc<dyn MessagingChannel>,
}

impl ExecutionBridge {
    pub fn new(executor: Arc<dyn InstructionExecutor>, channel: Arc<dyn MessagingChannel>) -> Self {
        Self { executor, channel }
    }

    /// Produce output for one trigger and apply the notify policy.
    ///
    /// Executor failures are logged and count as "no output". Delivery runs
    /// detached so a slow channel never holds up the caller.
    pub async fn run(
        &self,
        origin: &str,
        owner_id: &str,
        trigger: &TriggerSpec,
        notify: bool,
        payload: Option<&Payload>,
    ) -> Option<String> {
        let output = match trigger {
            TriggerSpec::Template { template } => Some(match payload {
                Some(payload) => render_template(template, payload),
                None => render_template(template, &Payload::new()),
            }),
            TriggerSpec::Instruction {
                instruction,
                tool_names,
            } => {
                let request = ExecutionRequest {
                    owner_id: owner_id.to_string(),
                    instruction: instruction.clone(),
                    payload: payload.cloned(),
                    tool_names: tool_names.clone(),
                    notify,
                };
                match self.executor.execute(request).await {
                    Ok(ExecutorReply::Delivered(text)) => Some(text),
                    Ok(ExecutorReply::Ignored) => {
                        debug!("[{}] executor ignored trigger for owner {}", origin, owner_id);
                        None
                    }
                    Err(e) => {
                        warn!("[{}] instruction execution failed: {}", origin, e);
                        None
                    }
                }
            }
        };

        if notify && let Some(text) = &output {
            self.deliver_detached(origin, owner_id, text);
        }
        output
    }

    fn deliver_detached(&self, origin: &str, owner_id: &str, text: &str) {
        let channel = self.channel.clone();
        let origin = origin.to_string();
        let owner_id = owner_id.to_string();
        let text = text.to_string();
        tokio::spawn(async move {
            match channel.deliver(&owner_id, &text).await {
                Ok(()) => info!("[{}] delivered output to owner {}", origin, owner_id),
                Err(e) => warn!("[{}] delivery to owner {} failed: {}", origin, owner_id, e),
            }
        });
    }
}
