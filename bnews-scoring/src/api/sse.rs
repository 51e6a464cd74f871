//! Server-Sent Events stream of scoring progress

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::models::ProgressState;
use crate::services::ProgressManager;

/// SSE event name carrying a progress snapshot
pub const PROGRESS_EVENT: &str = "ScoringProgress";

/// SSE event name sent when the document has no progress entry
pub const UNKNOWN_EVENT: &str = "UnknownDocument";

/// Build the SSE event for one snapshot
pub fn progress_event(state: &ProgressState) -> Event {
    match Event::default().event(PROGRESS_EVENT).json_data(state) {
        Ok(event) => event,
        Err(e) => {
            warn!(doc_id = state.document_id, error = %e, "Failed to serialize progress");
            Event::default().event(PROGRESS_EVENT).data("{}")
        }
    }
}

/// Stream a document's progress until it reaches a terminal step
///
/// Late subscribers immediately receive the current state; if that state is
/// already terminal the stream ends after that single event.
pub fn progress_sse_stream(
    progress: Arc<ProgressManager>,
    document_id: i64,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!(doc_id = document_id, "SSE client subscribed to scoring progress");

    let known = progress.get(document_id).is_some();
    let updates = progress.stream(document_id);

    let stream = async_stream::stream! {
        if !known {
            debug!(doc_id = document_id, "SSE: no progress for document");
            yield Ok(Event::default().event(UNKNOWN_EVENT).data(document_id.to_string()));
            return;
        }

        let mut updates = Box::pin(updates);
        while let Some(state) = updates.next().await {
            yield Ok(progress_event(&state));
        }
        debug!(doc_id = document_id, "SSE: progress stream finished");
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
