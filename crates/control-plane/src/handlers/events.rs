//! Run event streaming over Server-Sent Events.

use axum::{
    extract::{Path, State},
    response::sse::{Event, Sse},
};
use futures::{Stream, StreamExt};

use crate::engine::StreamItem;
use crate::error::AppResult;
use crate::state::AppState;

/// Frame a stream item as an SSE event: `event: <type>`, `id: <seq>`,
/// `data: <json>`. Keepalives carry no id.
pub fn to_sse_event(item: &StreamItem) -> Result<Event, axum::Error> {
    let mut event = Event::default().event(item.kind());
    if let Some(seq) = item.seq() {
        event = event.id(seq.to_string());
    }
    event.json_data(item.payload())
}

/// Stream a run's events.
///
/// GET /runs/{run_id}/events
///
/// Replays retained events, then follows the run live until `finished`.
pub async fn stream(
    State(state): State<AppState>,
    Path(run_id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let events = state.directory.subscribe(&run_id).await?;
    tracing::debug!(run_id = %run_id, "Observer subscribed");

    Ok(Sse::new(events.map(|item| to_sse_event(&item))))
}
