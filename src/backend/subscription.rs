use std::{
    fmt,
    pin::Pin,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::sync::{broadcast, mpsc};

type Release = Box<dyn FnOnce() + Send + Sync>;

/// A push subscription. Events arrive through [`Subscription::recv`] or the
/// `Stream` impl; the release hook runs exactly once, on
/// [`Subscription::unsubscribe`] or on drop, whichever comes first.
pub struct Subscription<T> {
    events: mpsc::Receiver<T>,
    release: Option<Release>,
}

impl<T> Subscription<T> {
    pub fn new(events: mpsc::Receiver<T>, release: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.events.recv().await
    }

    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        self.events.close();
    }
}

impl<T: Clone + Send + 'static> Subscription<T> {
    /// Bridges a broadcast channel. Events the receiver lagged behind on are
    /// skipped; the forwarding task ends when either side goes away.
    pub fn from_broadcast(
        mut source: broadcast::Receiver<T>,
        release: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        let (tx, rx) = mpsc::channel(32);
        let forward = tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "subscriber lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self::new(rx, move || {
            forward.abort();
            release();
        })
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().events.poll_recv(cx)
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("released", &self.release.is_none())
            .finish()
    }
}
