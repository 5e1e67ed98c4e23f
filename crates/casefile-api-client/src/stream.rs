//! Status-stream subscriber.
//!
//! Client half of the push contract: subscribes to a file's SSE stream,
//! delivers status events through a channel, and handles connection loss
//! with the reference policy — reconnect at a fixed interval, reset the
//! failure counter on any received event, and abandon after N consecutive
//! failures, surfacing a persistent error for the UI layer. A heartbeat
//! gap beyond the grace period counts as a dead connection.

use std::time::Duration;

use casefile_core::models::FileStatusEvent;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

use crate::{api_prefix, ApiClient};

#[derive(Debug, Clone)]
pub struct StatusStreamConfig {
    /// Fixed delay between reconnect attempts.
    pub retry_interval: Duration,
    /// Consecutive failures after which the stream is abandoned.
    pub max_consecutive_failures: u32,
    /// Longest tolerated silence (no event, no heartbeat) on a live
    /// connection.
    pub heartbeat_grace: Duration,
}

impl Default for StatusStreamConfig {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_secs(3),
            max_consecutive_failures: 5,
            heartbeat_grace: Duration::from_secs(45),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WatchEvent {
    Status(FileStatusEvent),
    Heartbeat,
}

#[derive(Debug)]
pub enum WatchError {
    /// The stream was abandoned after the configured number of
    /// consecutive connection failures. Terminal.
    Abandoned { attempts: u32 },
}

impl std::fmt::Display for WatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WatchError::Abandoned { attempts } => {
                write!(f, "status stream abandoned after {} failed attempts", attempts)
            }
        }
    }
}

impl std::error::Error for WatchError {}

/// Incremental parser for an SSE byte stream: accumulates `event:` /
/// `data:` fields and emits on each blank line.
#[derive(Default)]
struct SseParser {
    buffer: String,
    event_name: String,
    data: String,
}

impl SseParser {
    /// Feed a chunk; returns the events completed by it.
    fn feed(&mut self, chunk: &str) -> Vec<WatchEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
                self.event_name.clear();
                self.data.clear();
            } else if let Some(rest) = line.strip_prefix("event:") {
                self.event_name = rest.trim().to_string();
            } else if let Some(rest) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(rest.trim_start());
            }
            // Comment lines (":...") and unknown fields are ignored.
        }

        events
    }

    fn dispatch(&self) -> Option<WatchEvent> {
        match self.event_name.as_str() {
            "status" => match serde_json::from_str::<FileStatusEvent>(&self.data) {
                Ok(event) => Some(WatchEvent::Status(event)),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping unparseable status event");
                    None
                }
            },
            "heartbeat" => Some(WatchEvent::Heartbeat),
            _ => None,
        }
    }
}

impl ApiClient {
    /// Subscribe to a file's status stream.
    ///
    /// Events arrive on the returned receiver. On connection loss the
    /// subscriber reconnects per `config`; when it gives up, the final
    /// message is the terminal [`WatchError::Abandoned`] and the channel
    /// closes.
    pub fn watch_file(
        &self,
        file_id: Uuid,
        config: StatusStreamConfig,
    ) -> mpsc::Receiver<Result<WatchEvent, WatchError>> {
        let (tx, rx) = mpsc::channel(64);
        let client = self.clone();

        tokio::spawn(async move {
            client.watch_loop(file_id, config, tx).await;
        });

        rx
    }

    async fn watch_loop(
        &self,
        file_id: Uuid,
        config: StatusStreamConfig,
        tx: mpsc::Sender<Result<WatchEvent, WatchError>>,
    ) {
        let url = self.build_url(&format!("{}/files/{}/events", api_prefix(), file_id));
        let mut consecutive_failures: u32 = 0;

        loop {
            match self.stream_once(&url, &config, &tx).await {
                StreamOutcome::ReceiverGone => return,
                StreamOutcome::GotEvents => {
                    // The connection delivered something before dying;
                    // start the failure count fresh.
                    consecutive_failures = 1;
                }
                StreamOutcome::Failed => {
                    consecutive_failures += 1;
                }
            }

            if consecutive_failures >= config.max_consecutive_failures {
                tracing::error!(
                    file_id = %file_id,
                    attempts = consecutive_failures,
                    "Status stream abandoned"
                );
                let _ = tx
                    .send(Err(WatchError::Abandoned {
                        attempts: consecutive_failures,
                    }))
                    .await;
                return;
            }

            tracing::debug!(
                file_id = %file_id,
                attempt = consecutive_failures,
                "Reconnecting status stream"
            );
            tokio::time::sleep(config.retry_interval).await;
        }
    }

    async fn stream_once(
        &self,
        url: &str,
        config: &StatusStreamConfig,
        tx: &mpsc::Sender<Result<WatchEvent, WatchError>>,
    ) -> StreamOutcome {
        let response = match self
            .client()
            .get(url)
            .header("Accept", "text/event-stream")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::warn!(status = %response.status(), "Status stream request rejected");
                return StreamOutcome::Failed;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Status stream connection failed");
                return StreamOutcome::Failed;
            }
        };

        let mut body = response.bytes_stream();
        let mut parser = SseParser::default();
        let mut delivered = false;

        loop {
            let chunk = match timeout(config.heartbeat_grace, body.next()).await {
                // Silence past the grace period: the connection is dead
                // even though TCP has not noticed yet.
                Err(_) => {
                    tracing::warn!("Heartbeat gap exceeded grace period, dropping connection");
                    break;
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => {
                    tracing::warn!(error = %e, "Status stream read failed");
                    break;
                }
                Ok(Some(Ok(chunk))) => chunk,
            };

            for event in parser.feed(&String::from_utf8_lossy(&chunk)) {
                delivered = true;
                if tx.send(Ok(event)).await.is_err() {
                    return StreamOutcome::ReceiverGone;
                }
            }
        }

        if delivered {
            StreamOutcome::GotEvents
        } else {
            StreamOutcome::Failed
        }
    }
}

enum StreamOutcome {
    /// The subscriber dropped the receiver; stop silently.
    ReceiverGone,
    /// The connection delivered at least one event before closing.
    GotEvents,
    /// The connection failed before delivering anything.
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use casefile_core::models::{FileStatus, SanitizeStatus, ScanStatus};

    fn status_json(file_id: Uuid) -> String {
        serde_json::to_string(&FileStatusEvent {
            file_id,
            status: FileStatus::Processing,
            scan_status: ScanStatus::Scanning,
            sanitize_status: SanitizeStatus::None,
            processing_error: None,
            safe_path: None,
        })
        .unwrap()
    }

    #[test]
    fn parser_emits_status_events() {
        let id = Uuid::new_v4();
        let mut parser = SseParser::default();
        let frame = format!("event: status\ndata: {}\n\n", status_json(id));

        let events = parser.feed(&frame);
        assert_eq!(events.len(), 1);
        match &events[0] {
            WatchEvent::Status(event) => assert_eq!(event.file_id, id),
            other => panic!("expected status event, got {:?}", other),
        }
    }

    #[test]
    fn parser_emits_heartbeats() {
        let mut parser = SseParser::default();
        let events = parser.feed("event: heartbeat\n\n");
        assert!(matches!(events[0], WatchEvent::Heartbeat));
    }

    #[test]
    fn parser_handles_split_frames() {
        let id = Uuid::new_v4();
        let mut parser = SseParser::default();
        let frame = format!("event: status\ndata: {}\n\n", status_json(id));
        let (head, tail) = frame.split_at(frame.len() / 2);

        assert!(parser.feed(head).is_empty());
        let events = parser.feed(tail);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn parser_ignores_comments_and_unknown_events() {
        let mut parser = SseParser::default();
        assert!(parser.feed(": keep-alive\n\n").is_empty());
        assert!(parser.feed("event: other\ndata: {}\n\n").is_empty());
    }

    #[test]
    fn parser_drops_malformed_status_payloads() {
        let mut parser = SseParser::default();
        let events = parser.feed("event: status\ndata: not-json\n\n");
        assert!(events.is_empty());
    }
}
