//! Collaborators reached over HTTP, plus the local stand-ins used when no
//! endpoint is configured.

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::execution::{
    ExecutionRequest, ExecutorReply, InstructionExecutor, MessagingChannel,
};

#[derive(Debug, Default, Deserialize)]
struct ExecutorResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    ignore: bool,
}

impl ExecutorResponse {
    fn into_reply(self) -> ExecutorReply {
        match self.text {
            Some(text) if !self.ignore => ExecutorReply::Delivered(text),
            _ => ExecutorReply::Ignored,
        }
    }
}

/// POSTs the request as JSON and expects `{"text": ...}` or
/// `{"ignore": true}` back.
pub struct HttpInstructionExecutor {
    client: Client,
    url: String,
}

impl HttpInstructionExecutor {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl InstructionExecutor for HttpInstructionExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutorReply> {
        let res = self.client.post(&self.url).json(&request).send().await?;
        if !res.status().is_success() {
            return Err(anyhow!(
                "Executor returned {}: {}",
                res.status(),
                res.text().await.unwrap_or_default()
            ));
        }
        let parsed: ExecutorResponse = res.json().await?;
        Ok(parsed.into_reply())
    }
}

/// Replies with the instruction text itself.
pub struct EchoExecutor;

#[async_trait]
impl InstructionExecutor for EchoExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutorReply> {
        Ok(ExecutorReply::Delivered(request.instruction))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Delivery<'a> {
    owner_id: &'a str,
    text: &'a str,
}

pub struct HttpMessagingChannel {
    client: Client,
    url: String,
}

impl HttpMessagingChannel {
    pub fn new(url: &str) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl MessagingChannel for HttpMessagingChannel {
    async fn deliver(&self, owner_id: &str, text: &str) -> Result<()> {
        let res = self
            .client
            .post(&self.url)
            .json(&Delivery { owner_id, text })
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(anyhow!("Channel returned {}", res.status()));
        }
        Ok(())
    }
}

pub struct LogOnlyChannel;

#[async_trait]
impl MessagingChannel for LogOnlyChannel {
    async fn deliver(&self, owner_id: &str, text: &str) -> Result<()> {
        info!("[notify:{}] {}", owner_id, text);
        Ok(())
    }
}
