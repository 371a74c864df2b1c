//! A one-shot, multi-waiter completion primitive.
//!
//! The channel state machine routinely needs to hand a caller a value that some *other* task will
//! produce later — a pending put's completion fired by whichever take eventually drains it, or
//! `done()` fired by whichever take happens to empty the channel. [`OnceFuture`] and its paired
//! [`Resolver`] are the vocabulary for that: a [`Resolver`] is cloned and handed to however many
//! places might need to settle it (idempotently — only the first `resolve` call counts), and an
//! [`OnceFuture`] can itself be cloned so that every waiter gets back the same eventual value.
//!
//! Built on `tokio::sync::oneshot` plus `futures::future::Shared`, which together turn a
//! single-consumer oneshot into the multi-waiter primitive the state machine needs.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::{FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::oneshot;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The waiting half of a one-shot completion pair.
///
/// Cloning an `OnceFuture` is cheap and gives back an independent handle to the *same* eventual
/// value; every clone resolves together, in whatever order they happen to be polled.
pub struct OnceFuture<T: Clone + Send + 'static> {
    shared: Shared<BoxFuture<T>>,
}

impl<T: Clone + Send + 'static> OnceFuture<T> {
    /// Creates a fresh one-shot pair: a [`Resolver`] to settle it, and the [`OnceFuture`] that
    /// awaits it.
    pub fn pair() -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel::<T>();
        let fut: BoxFuture<T> = Box::pin(async move {
            rx.await
                .expect("resolver dropped without resolving its OnceFuture")
        });

        let resolver = Resolver {
            tx: Arc::new(Mutex::new(Some(tx))),
        };
        let once = Self { shared: fut.shared() };

        (resolver, once)
    }

    /// Creates an `OnceFuture` that is already resolved with `value`.
    pub fn ready(value: T) -> Self {
        let fut: BoxFuture<T> = Box::pin(async move { value });
        Self { shared: fut.shared() }
    }
}

impl<T: Clone + Send + 'static> Clone for OnceFuture<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Future for OnceFuture<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        Pin::new(&mut self.shared).poll(cx)
    }
}

impl<T: Clone + Send + 'static> fmt::Debug for OnceFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnceFuture").finish()
    }
}

/// The resolving half of a one-shot completion pair.
///
/// `resolve` is idempotent: only the first call has any effect, later calls (including ones made
/// from a cloned `Resolver`) are silently ignored. This matters because a few call sites — close
/// racing with a settling transform, for instance — can end up holding more than one handle to the
/// same resolver.
pub struct Resolver<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Resolver<T> {
    /// Settles the paired [`OnceFuture`] with `value`. A no-op if already resolved.
    pub fn resolve(&self, value: T) {
        if let Some(tx) = self.tx.lock().take() {
            // The receiving half only goes away if every `OnceFuture` clone was dropped, in which
            // case there is nobody left to deliver `value` to.
            let _ = tx.send(value);
        }
    }
}

impl<T> Clone for Resolver<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish()
    }
}
