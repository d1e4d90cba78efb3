//! Server-sent event stream that drives a run.
//!
//! Opening the stream starts the engine. The engine runs on its own task, so a
//! client that disconnects does not cancel the run; only the stop flag does.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use checkloop_common::WorkflowEvent;
use dashmap::mapref::entry::Entry;
use tokio_stream::{Stream, StreamExt, wrappers::UnboundedReceiverStream};
use tracing::{info, warn};

use super::api::{ApiError, SharedState};
use crate::workflow::ChannelSink;

const KEEP_ALIVE_TEXT: &str = "keep-alive";

pub(crate) fn to_sse(event: &WorkflowEvent) -> Event {
    match Event::default().event(event.name()).json_data(event) {
        Ok(sse) => sse,
        Err(e) => {
            warn!(event = event.name(), error = %e, "Failed to serialize event");
            Event::default()
                .event("error")
                .data(serde_json::json!({"type": "error", "message": e.to_string()}).to_string())
        }
    }
}

/// Fail unless the run exists and has not reached a terminal status.
async fn ensure_streamable(state: &SharedState, run_id: &str) -> Result<(), ApiError> {
    let record = state
        .runtime
        .registry
        .get(run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Run {} not found", run_id)))?;
    if record.status.is_terminal() {
        return Err(ApiError::Conflict(format!(
            "Run {} is already {}",
            run_id,
            record.status.as_str()
        )));
    }
    Ok(())
}

/// Claim the single stream slot for a run.
///
/// The status is checked again once the slot is held, since a previous
/// stream may have finished the run and released its slot in between.
async fn reserve_stream(state: &SharedState, run_id: &str) -> Result<(), ApiError> {
    match state.active_streams.entry(run_id.to_string()) {
        Entry::Occupied(_) => {
            return Err(ApiError::Conflict(format!(
                "Run {} is already streaming",
                run_id
            )));
        }
        Entry::Vacant(slot) => {
            slot.insert(());
        }
    }
    if let Err(e) = ensure_streamable(state, run_id).await {
        state.active_streams.remove(run_id);
        return Err(e);
    }
    Ok(())
}

pub async fn run_events(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    ensure_streamable(&state, &run_id).await?;
    reserve_stream(&state, &run_id).await?;

    let (sink, rx) = ChannelSink::channel();
    let task_state = state.clone();
    let task_run_id = run_id.clone();
    tokio::spawn(async move {
        // Failures are already reported to the stream as error events.
        if let Err(e) = task_state.runtime.drive(&task_run_id, &sink).await {
            warn!(run_id = %task_run_id, error = %e, "Run ended with error");
        }
        drop(sink);
        task_state.active_streams.remove(&task_run_id);
    });
    info!(run_id = %run_id, "Event stream opened");

    let events = UnboundedReceiverStream::new(rx).map(|event| Ok(to_sse(&event)));
    let keep_alive = KeepAlive::new()
        .interval(state.runtime.config.heartbeat())
        .text(KEEP_ALIVE_TEXT);
    Ok(Sse::new(events).keep_alive(keep_alive))
}
