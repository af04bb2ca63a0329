use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::config::NudgeConfig;
use crate::core::context::{AutomationContext, ContextParts};
use crate::core::execution::{ExecutionBridge, InstructionExecutor, MessagingChannel};
use crate::core::lifecycle::LifecycleManager;
use crate::core::listeners::ExpirySweeper;
use crate::core::owners::StaticOwnerDirectory;
use crate::core::store::Persistence;
use crate::core::terminal::GuideSection;
use crate::interfaces::remote::{
    EchoExecutor, HttpInstructionExecutor, HttpMessagingChannel, LogOnlyChannel,
};
use crate::interfaces::web::ApiServer;
use crate::logging;

fn build_executor(config: &NudgeConfig) -> Arc<dyn InstructionExecutor> {
    match &config.executor.url {
        Some(url) => Arc::new(HttpInstructionExecutor::new(url)),
        None => {
            warn!("No executor url configured; instructions will be echoed back verbatim");
            Arc::new(EchoExecutor)
        }
    }
}

fn build_channel(config: &NudgeConfig) -> Arc<dyn MessagingChannel> {
    match &config.channel.url {
        Some(url) => Arc::new(HttpMessagingChannel::new(url)),
        None => {
            warn!("No channel url configured; notifications will only be logged");
            Arc::new(LogOnlyChannel)
        }
    }
}

/// Boot the engine and serve until Ctrl+C.
pub async fn run_engine(config: NudgeConfig) -> Result<()> {
    let log_tx = logging::init(config.max_level()?);
    info!("Starting nudge engine...");

    let data_dir = config.data_dir();
    let persistence = Arc::new(Persistence::open(&data_dir).await?);
    if config.owners.is_empty() {
        warn!("No owners configured; only the ping event can be triggered");
    }

    let mut lifecycle = LifecycleManager::new().await?;
    let bridge = Arc::new(ExecutionBridge::new(
        build_executor(&config),
        build_channel(&config),
    ));
    let ctx = AutomationContext::boot(ContextParts {
        persistence,
        owners: Arc::new(StaticOwnerDirectory::new(&config.owners)),
        bridge,
        scheduler: lifecycle.scheduler.clone(),
        timezone: config.timezone()?,
        public_base_url: config.public_base_url(),
    })
    .await?;

    lifecycle.attach(Arc::new(Mutex::new(ExpirySweeper::new(
        ctx.listeners.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    ))));
    lifecycle.attach(Arc::new(Mutex::new(ApiServer::new(
        ctx.clone(),
        log_tx,
        config.api_host.clone(),
        config.api_port,
    ))));
    lifecycle.start().await?;

    GuideSection::new("nudge is running")
        .status("Data", &data_dir.display().to_string())
        .status(
            "API Endpoint",
            &format!("http://{}:{}", config.api_host, config.api_port),
        )
        .status("Event URLs", &format!("{}/events/<eventId>", ctx.public_base_url))
        .status("Timezone", &config.timezone)
        .text("Press Ctrl+C to stop.")
        .print();

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    Ok(())
}
