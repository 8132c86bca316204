//! HTTP Trace Sink：有界队列 + 后台批量上报
//!
//! record 只做 try_send，队列满时返回 QueueFull（事件丢弃）；后台任务累计到 flush_at 条
//! 或每隔 flush_interval 将事件以 `{"batch": [...]}` POST 到 endpoint（Basic Auth）。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::{mpsc, oneshot};

use super::sink::{TraceError, TraceEvent, TraceSink};

#[derive(Debug, Clone)]
pub struct HttpTraceConfig {
    pub endpoint: String,
    pub public_key: String,
    pub secret_key: String,
    pub flush_at: usize,
    pub flush_interval: Duration,
    pub queue_capacity: usize,
    pub request_timeout: Duration,
}

enum Command {
    Event(TraceEvent),
    Flush(oneshot::Sender<Result<(), TraceError>>),
}

pub struct HttpTraceSink {
    tx: mpsc::Sender<Command>,
}

impl HttpTraceSink {
    /// 启动后台上报任务；必须在 tokio runtime 内调用
    pub fn spawn(config: HttpTraceConfig) -> Result<Self, TraceError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TraceError::Backend(e.to_string()))?;
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        tokio::spawn(run_uploader(rx, client, config));
        Ok(Self { tx })
    }
}

async fn run_uploader(
    mut rx: mpsc::Receiver<Command>,
    client: reqwest::Client,
    config: HttpTraceConfig,
) {
    let mut buffer: Vec<TraceEvent> = Vec::with_capacity(config.flush_at);
    let mut ticker = tokio::time::interval(config.flush_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Event(event)) => {
                    buffer.push(event);
                    if buffer.len() >= config.flush_at {
                        let _ = upload(&client, &config, &mut buffer).await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    let result = upload(&client, &config, &mut buffer).await;
                    let _ = ack.send(result);
                }
                None => {
                    let _ = upload(&client, &config, &mut buffer).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                let _ = upload(&client, &config, &mut buffer).await;
            }
        }
    }
}

/// 发送并清空缓冲；失败时事件被丢弃（best-effort）
async fn upload(
    client: &reqwest::Client,
    config: &HttpTraceConfig,
    buffer: &mut Vec<TraceEvent>,
) -> Result<(), TraceError> {
    if buffer.is_empty() {
        return Ok(());
    }
    let batch = std::mem::take(buffer);
    let count = batch.len();
    let body = json!({ "batch": batch });

    let result = client
        .post(&config.endpoint)
        .basic_auth(&config.public_key, Some(&config.secret_key))
        .json(&body)
        .send()
        .await
        .and_then(|resp| resp.error_for_status());

    match result {
        Ok(_) => {
            tracing::debug!(events = count, "Trace batch uploaded");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(events = count, error = %e, "Trace batch upload failed");
            Err(TraceError::Backend(e.to_string()))
        }
    }
}

#[async_trait]
impl TraceSink for HttpTraceSink {
    fn name(&self) -> &str {
        "http"
    }

    fn record(&self, event: TraceEvent) -> Result<(), TraceError> {
        self.tx.try_send(Command::Event(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TraceError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => TraceError::Closed,
        })
    }

    async fn flush(&self) -> Result<(), TraceError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack_tx))
            .await
            .map_err(|_| TraceError::Closed)?;
        ack_rx.await.map_err(|_| TraceError::Closed)?
    }
}
