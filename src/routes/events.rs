use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, stream};

use crate::state::AppState;

/// One `catalog` event, carrying the new revision, per completed product fetch.
pub async fn catalog_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.feed.watch();
    let seen = rx.borrow().revision;

    let events = stream::unfold((rx, seen), |(mut rx, seen)| async move {
        loop {
            rx.changed().await.ok()?;
            let revision = rx.borrow_and_update().revision;
            if revision != seen {
                let event = Event::default().event("catalog").data(revision.to_string());
                return Some((Ok(event), (rx, revision)));
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
