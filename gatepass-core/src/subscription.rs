use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A long-lived, cancelable listener.
///
/// Items are produced by a background task feeding a bounded channel.
/// Cancelling (or dropping) the subscription aborts that task, which in
/// turn drops whatever upstream listener it owned.
pub struct Subscription<T> {
    rx: mpsc::Receiver<T>,
    feeder: Option<JoinHandle<()>>,
}

impl<T> Subscription<T> {
    pub fn new(rx: mpsc::Receiver<T>, feeder: JoinHandle<()>) -> Self {
        Self { rx, feeder: Some(feeder) }
    }

    /// Wait for the next item; `None` once the feed has ended or been cancelled.
    pub async fn next_item(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Stop future deliveries and release the upstream listener.
    pub fn cancel(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        self.rx.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.feeder.is_none()
    }
}

impl<T> Unpin for Subscription<T> {}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}
