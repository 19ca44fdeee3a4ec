use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::{Stream, StreamExt};
use gatepass_core::Subscription;
use serde::Serialize;

/// Serve a subscription as server-sent events, one JSON payload per item.
///
/// The subscription is dropped with the response body, which cancels it.
pub fn from_subscription<T>(subscription: Subscription<T>) -> Sse<impl Stream<Item = Result<Event, axum::Error>>>
where
    T: Serialize + Send + 'static,
{
    Sse::new(subscription.map(|item| Event::default().json_data(&item))).keep_alive(KeepAlive::default())
}
