pub(crate) mod auth;
mod handlers;
mod router;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::core::context::AutomationContext;
use crate::core::lifecycle::LifecycleComponent;

pub struct ApiServer {
    ctx: Arc<AutomationContext>,
    log_tx: broadcast::Sender<String>,
    api_host: String,
    api_port: u16,
    task: Option<JoinHandle<()>>,
}

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) ctx: Arc<AutomationContext>,
    pub(crate) log_tx: broadcast::Sender<String>,
}

impl ApiServer {
    pub fn new(
        ctx: Arc<AutomationContext>,
        log_tx: broadcast::Sender<String>,
        api_host: String,
        api_port: u16,
    ) -> Self {
        Self {
            ctx,
            log_tx,
            api_host,
            api_port,
            task: None,
        }
    }
}

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = format!("{}:{}", self.api_host, self.api_port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        let app = router::build_api_router(AppState {
            ctx: self.ctx.clone(),
            log_tx: self.log_tx.clone(),
        });

        info!("API Server running at http://{addr}");
        self.task = Some(tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server shutting down...");
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::core::context::testing::{TestContext, test_context};
    use crate::core::execution::testing::ScriptedExecutor;
    use axum::{
        Router,
        body::Body,
        http::{Method, Request, StatusCode},
    };
    use tower::util::ServiceExt;

    pub struct TestApp {
        pub router: Router,
        pub test: TestContext,
    }

    pub async fn test_app(executor: Arc<ScriptedExecutor>) -> TestApp {
        let test = test_context(executor).await;
        let (log_tx, _) = broadcast::channel(16);
        let router = router::build_api_router(AppState {
            ctx: test.ctx.clone(),
            log_tx,
        });
        TestApp { router, test }
    }

    pub async fn send(
        app: &Router,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<&str>,
    ) -> (StatusCode, String) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(auth::TOKEN_HEADER, token);
        }
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let req = builder
            .body(body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty))
            .expect("request should build");
        let resp = app.clone().oneshot(req).await.expect("oneshot should succeed");
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .expect("body should read");
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    pub async fn json_request(
        app: &Router,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> serde_json::Value {
        let body = body.map(|json| json.to_string());
        let (status, text) = send(app, method, path, token, body.as_deref()).await;
        assert_eq!(status, StatusCode::OK, "unexpected status for {}", text);
        serde_json::from_str(&text).unwrap_or(serde_json::json!({}))
    }
}
