//! Server-Sent Events stream of generation, refund, chat and market events

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::AppState;

/// GET /api/events
///
/// Every [`AppEvent`](tunemint_common::events::AppEvent) is forwarded with
/// its type as the SSE event name. A comment heartbeat keeps proxies from
/// closing idle connections.
pub async fn event_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New SSE client connected");
    let mut rx = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let event_type = event.event_type();
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            debug!("SSE: Broadcasting {}", event_type);
                            yield Ok(Event::default().event(event_type).data(json));
                        }
                        Err(e) => warn!("SSE: Failed to serialize event {}: {}", event_type, e),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "SSE client lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("heartbeat"),
    )
}
