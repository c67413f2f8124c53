//! Exactly-once completion callbacks.

use crate::{Error, Result};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// The callback half of an asynchronous operation.
///
/// `complete` consumes the completion, so it can be invoked at most once.
/// Dropping a completion without invoking it is a contract violation that
/// the waiting side observes as [`Error::CompletionDropped`].
///
/// A completion may be invoked from any thread.
#[derive(Debug)]
pub struct Completion<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Completion<T> {
    /// Create a completion and the future that resolves when it is invoked.
    pub fn channel() -> (Self, Pending<T>) {
        let (tx, rx) = oneshot::channel();
        (Self { tx }, Pending { rx })
    }

    /// Report the outcome.
    ///
    /// If the waiting side has gone away (its task was cancelled) the value
    /// is discarded.
    pub fn complete(self, value: T) {
        let _ = self.tx.send(value);
    }

    /// Whether anyone is still waiting for the outcome.
    pub fn is_awaited(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Future side of a [`Completion`].
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Future for Pending<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map_err(|_| Error::CompletionDropped)
    }
}
