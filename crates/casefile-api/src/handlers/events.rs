//! SSE adapters over the status notifier.
//!
//! Each stream interleaves `status` events (full status tuple) with
//! `heartbeat` events carrying no payload. Clients treat a heartbeat gap
//! beyond their grace period as a dead connection and reconnect; the
//! per-file stream opens with a snapshot of the current state so a
//! reconnecting client never misses the latest transition.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use casefile_core::constants::{HEARTBEAT_EVENT, STATUS_EVENT};
use casefile_core::models::FileStatusEvent;
use casefile_core::AppError;
use futures::stream::Stream;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::time::Interval;
use uuid::Uuid;

use crate::error::HttpAppError;
use crate::state::AppState;

fn status_event(event: &FileStatusEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(payload) => Event::default().event(STATUS_EVENT).data(payload),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize status event");
            Event::default().comment("serialization error")
        }
    }
}

fn heartbeat_event() -> Event {
    Event::default().event(HEARTBEAT_EVENT)
}

/// Turn a broadcast subscription into an SSE stream with heartbeats.
fn event_stream(
    rx: broadcast::Receiver<FileStatusEvent>,
    heartbeat: Interval,
) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold((rx, heartbeat), |(mut rx, mut heartbeat)| async move {
        loop {
            tokio::select! {
                result = rx.recv() => match result {
                    Ok(event) => {
                        return Some((Ok(status_event(&event)), (rx, heartbeat)));
                    }
                    // A lagged subscriber lost old events; the next event
                    // carries the full tuple, so just keep reading.
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::debug!(missed = missed, "SSE subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                _ = heartbeat.tick() => {
                    return Some((Ok(heartbeat_event()), (rx, heartbeat)));
                }
            }
        }
    })
}

fn heartbeat_interval(state: &AppState) -> Interval {
    let period = Duration::from_secs(state.config.heartbeat_interval_secs);
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval
}

/// GET /api/v0/files/{id}/events — per-file status stream.
pub async fn file_events(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpAppError> {
    let file = state
        .files
        .get_by_id(id)
        .await
        .map_err(HttpAppError::from)?
        .ok_or_else(|| HttpAppError(AppError::NotFound(format!("File {} not found", id))))?;

    let rx = state.notifier.subscribe_file(id).await;

    let snapshot = FileStatusEvent::from(&file);
    let initial = futures::stream::iter([Ok(status_event(&snapshot))]);
    let stream = initial.chain(event_stream(rx, heartbeat_interval(&state)));

    Ok(Sse::new(stream))
}

/// GET /api/v0/files/events — collection stream: every file's transitions.
pub async fn collection_events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.notifier.subscribe_all();
    Sse::new(event_stream(rx, heartbeat_interval(&state)))
}
