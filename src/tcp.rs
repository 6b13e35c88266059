use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::models::frame::TelemetryFrame;
use crate::processor::pipeline::Pipeline;

/// Ingestion service owning the upstream feed connection: connect, send
/// the protocol handshake, split the byte stream on newlines and dispatch
/// each parsed frame in arrival order. Constructed once at startup and
/// driven by `run`.
pub struct TcpReceiver {
    config: AppConfig,
    pipeline: Arc<Pipeline>,
}

/// Consecutive connection-failure accounting. Any successful connect
/// resets the count; hitting the bound means ingestion gives up.
#[derive(Debug)]
struct ReconnectState {
    failures: u32,
    max_retries: u32,
}

impl ReconnectState {
    fn new(max_retries: u32) -> Self {
        Self { failures: 0, max_retries }
    }

    fn connected(&mut self) {
        self.failures = 0;
    }

    /// Records one failed attempt; returns false once the bound is hit.
    fn record_failure(&mut self) -> bool {
        self.failures += 1;
        self.failures < self.max_retries
    }
}

impl TcpReceiver {
    pub fn new(config: AppConfig, pipeline: Arc<Pipeline>) -> Self {
        Self { config, pipeline }
    }

    pub async fn run(&self) -> Result<()> {
        let addr = format!("{}:{}", self.config.feed_host, self.config.feed_port);
        let mut reconnect = ReconnectState::new(self.config.feed_max_retries);

        loop {
            match TcpStream::connect(&addr).await {
                Ok(stream) => {
                    reconnect.connected();
                    info!("Connected to telemetry feed at {}", addr);

                    match self.consume(stream).await {
                        Ok(()) => warn!("Telemetry feed closed by peer"),
                        Err(e) => warn!("Telemetry feed connection lost: {}", e),
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to connect to telemetry feed: {} ({} / {})",
                        e, reconnect.failures + 1, reconnect.max_retries
                    );
                    if !reconnect.record_failure() {
                        bail!(
                            "Giving up on telemetry feed after {} consecutive connection failures",
                            reconnect.failures
                        );
                    }
                }
            }

            tokio::time::sleep(self.config.feed_reconnect_delay).await;
        }
    }

    /// Read the stream until EOF or error. Frame processing errors are
    /// logged and never tear the connection down.
    async fn consume(&self, mut stream: TcpStream) -> Result<()> {
        stream
            .write_all(self.config.feed_handshake.as_bytes())
            .await?;

        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            let Some(frame) = decode_segment(&line) else {
                continue;
            };
            if let Err(e) = self.pipeline.process_frame(frame).await {
                error!("Frame processing failed: {:#}", e);
            }
        }
        Ok(())
    }
}

/// Parse one newline-delimited segment. A malformed segment is logged with
/// its raw content and dropped.
fn decode_segment(segment: &str) -> Option<TelemetryFrame> {
    let segment = segment.trim();
    if segment.is_empty() {
        return None;
    }
    match serde_json::from_str::<TelemetryFrame>(segment) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!("Discarding unparseable frame: {} | raw: {}", e, segment);
            None
        }
    }
}
