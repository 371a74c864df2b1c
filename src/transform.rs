//! Pluggable per-value transforms.
//!
//! Two object-safe traits cover every shape a transform can take: everything that can complete
//! synchronously is a [`FunctionTransform`], everything that needs to `.await` or keep emitting
//! after its initial call returns is an [`AsyncTransform`].

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::future::OnceFuture;
use crate::Payload;

/// The boxed error type a fallible transform adapter reports through.
pub type TransformError = Box<dyn StdError + Send + Sync>;

/// Accumulates the outputs of a single [`FunctionTransform`] invocation, preserving emission
/// order.
///
/// Also doubles as the channel a *fallible* adapter (like [`TryMap`]) reports a failure through,
/// since `FunctionTransform::transform` itself has no return value to carry one.
#[derive(Debug)]
pub struct OutputBuffer<T> {
    values: VecDeque<T>,
    failure: Option<TransformError>,
}

impl<T> OutputBuffer<T> {
    fn new() -> Self {
        Self {
            values: VecDeque::new(),
            failure: None,
        }
    }

    /// Emits one output value. May be called zero or more times per invocation.
    pub fn push(&mut self, value: T) {
        self.values.push_back(value);
    }

    /// Reports that this invocation failed. Any outputs already pushed are discarded; only the
    /// first call in a given invocation has any effect.
    pub fn fail(&mut self, error: impl Into<TransformError>) {
        if self.failure.is_none() {
            self.failure = Some(error.into());
        }
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.values.drain(..)
    }

    pub(crate) fn take_failure(&mut self) -> Option<TransformError> {
        self.failure.take()
    }
}

/// A synchronous, push-based transform.
///
/// Covers both pure mapping (push zero or one values) and arbitrary fan-out (push any number):
/// both just come down to "call `output.push(...)` some number of times before returning."
pub trait FunctionTransform<T>: Send {
    /// Processes one input value, pushing zero or more outputs onto `output` in emission order.
    fn transform(&mut self, output: &mut OutputBuffer<T>, input: T);
}

/// The default transform: one input produces exactly one, unchanged, output.
#[derive(Debug, Default, Clone, Copy)]
pub struct Identity;

impl<T> FunctionTransform<T> for Identity {
    fn transform(&mut self, output: &mut OutputBuffer<T>, input: T) {
        output.push(input);
    }
}

/// Adapts a plain closure `Fn(T) -> Option<T>` into a [`FunctionTransform`].
///
/// A `None` result is a filter (zero outputs); `Some(v)` is the usual one-output mapping.
pub struct Map<F>(F);

impl<F> Map<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F> FunctionTransform<T> for Map<F>
where
    F: FnMut(T) -> Option<T> + Send,
{
    fn transform(&mut self, output: &mut OutputBuffer<T>, input: T) {
        if let Some(value) = (self.0)(input) {
            output.push(value);
        }
    }
}

/// Adapts a plain closure `FnMut(T, &mut OutputBuffer<T>)` into a [`FunctionTransform`], for
/// callers who want the fan-out push style without implementing the trait themselves.
pub struct Push<F>(F);

impl<F> Push<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F> FunctionTransform<T> for Push<F>
where
    F: FnMut(T, &mut OutputBuffer<T>) + Send,
{
    fn transform(&mut self, output: &mut OutputBuffer<T>, input: T) {
        (self.0)(input, output)
    }
}

/// Adapts a plain fallible closure `FnMut(T) -> Result<Option<T>, TransformError>` into a
/// [`FunctionTransform`]. `Ok(None)` filters the value out; `Err` fails the whole `put` call with
/// [`crate::ChannelError::TransformFailed`].
pub struct TryMap<F>(F);

impl<F> TryMap<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F, E> FunctionTransform<T> for TryMap<F>
where
    F: FnMut(T) -> Result<Option<T>, E> + Send,
    E: Into<TransformError>,
{
    fn transform(&mut self, output: &mut OutputBuffer<T>, input: T) {
        match (self.0)(input) {
            Ok(Some(value)) => output.push(value),
            Ok(None) => {}
            Err(error) => output.fail(error),
        }
    }
}

/// A value that places outputs into a channel the instant they're produced.
///
/// Handed to [`AsyncTransform::transform`]; cloning is cheap, and every clone pushes into the same
/// channel. A transform that kicks off detached background work (e.g. via `tokio::spawn`) and then
/// awaits that work's completion before returning can hold a cloned `Pusher` across the spawn
/// boundary: outputs pushed from the spawned task are placed in real time, so overlapping
/// invocations can interleave their emitted values rather than each one's outputs landing as a
/// contiguous block.
#[derive(Clone)]
pub struct Pusher<T> {
    sink: Arc<dyn PlacementSink<T>>,
    waiters: Arc<parking_lot::Mutex<Vec<OnceFuture<()>>>>,
    failure: Arc<parking_lot::Mutex<Option<TransformError>>>,
}

impl<T> Pusher<T> {
    pub(crate) fn new(
        sink: Arc<dyn PlacementSink<T>>,
        waiters: Arc<parking_lot::Mutex<Vec<OnceFuture<()>>>>,
        failure: Arc<parking_lot::Mutex<Option<TransformError>>>,
    ) -> Self {
        Self {
            sink,
            waiters,
            failure,
        }
    }

    /// Places `value` into the owning channel immediately: handed straight to a waiting take,
    /// buffered, or parked, exactly like one output of an ordinary `put`. If the value had to
    /// park, the resulting completion future is recorded so the `put` call that owns this
    /// invocation can await it before resolving.
    pub fn push(&self, value: T) {
        if let Some(waiter) = self.sink.place(value) {
            self.waiters.lock().push(waiter);
        }
    }

    /// Reports that this invocation failed. Only the first call in a given invocation has any
    /// effect; the owning `put` resolves to `Err(ChannelError::TransformFailed)` once the
    /// invocation returns.
    pub fn fail(&self, error: impl Into<TransformError>) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(error.into());
        }
    }
}

impl<T> fmt::Debug for Pusher<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pusher").finish()
    }
}

/// The channel-side half of [`Pusher`]. Implemented by the channel's shared inner state so that
/// `transform` does not need to depend on the concrete `Channel` type.
pub(crate) trait PlacementSink<T>: Send + Sync {
    /// Places `value` using the channel's ordinary put-side placement algorithm. Returns a
    /// [`OnceFuture`] that resolves once the value has left the `puts` queue, if it had to park
    /// there; `None` if it was handed to a take or buffered immediately.
    fn place(&self, value: T) -> Option<OnceFuture<()>>;
}

/// An asynchronous, push-based transform.
///
/// Covers transforms that emit any number of values and need to `.await` to produce them,
/// including ones whose emission is driven by external timers or callbacks: nothing stops an
/// implementation from spawning that follow-up emission work and awaiting its completion before
/// returning.
#[async_trait]
pub trait AsyncTransform<T: Payload>: Send + Sync {
    /// Processes one input value, calling `push.push(...)` zero or more times, in any order
    /// relative to this future's own await points, until the invocation is considered complete
    /// (this call returning).
    async fn transform(&self, input: T, push: Pusher<T>);
}

/// Adapts a plain async closure into an [`AsyncTransform`].
pub struct AsyncMap<F> {
    f: F,
}

impl<F> AsyncMap<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F, Fut> AsyncTransform<T> for AsyncMap<F>
where
    T: Payload,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Option<T>> + Send,
{
    async fn transform(&self, input: T, push: Pusher<T>) {
        if let Some(value) = (self.f)(input).await {
            push.push(value);
        }
    }
}

/// Adapts a plain async closure `Fn(T, Pusher<T>) -> impl Future<Output = ()>` into an
/// [`AsyncTransform`], for callers who want the push style directly.
pub struct AsyncPush<F> {
    f: F,
}

impl<F> AsyncPush<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F, Fut> AsyncTransform<T> for AsyncPush<F>
where
    T: Payload,
    F: Fn(T, Pusher<T>) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = ()> + Send,
{
    async fn transform(&self, input: T, push: Pusher<T>) {
        (self.f)(input, push).await
    }
}

/// Adapts a plain fallible async closure into an [`AsyncTransform`]. `Ok(None)` filters the value
/// out, `Ok(Some(v))` pushes `v`, `Err` fails the invocation the same way [`Pusher::fail`] does.
pub struct AsyncTryMap<F> {
    f: F,
}

impl<F> AsyncTryMap<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<T, F, Fut, E> AsyncTransform<T> for AsyncTryMap<F>
where
    T: Payload,
    F: Fn(T) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<Option<T>, E>> + Send,
    E: Into<TransformError> + Send,
{
    async fn transform(&self, input: T, push: Pusher<T>) {
        match (self.f)(input).await {
            Ok(Some(value)) => push.push(value),
            Ok(None) => {}
            Err(error) => push.fail(error),
        }
    }
}

/// The transform installed on a channel: either variant is invoked once per accepted put.
pub enum Transform<T: Payload> {
    Sync(parking_lot::Mutex<Box<dyn FunctionTransform<T>>>),
    Async(Box<dyn AsyncTransform<T>>),
}

impl<T: Payload> Transform<T> {
    pub fn sync<F>(transform: F) -> Self
    where
        F: FunctionTransform<T> + 'static,
    {
        Self::Sync(parking_lot::Mutex::new(Box::new(transform)))
    }

    pub fn asynchronous<F>(transform: F) -> Self
    where
        F: AsyncTransform<T> + 'static,
    {
        Self::Async(Box::new(transform))
    }
}

impl<T: Payload> Default for Transform<T> {
    fn default() -> Self {
        Self::sync(Identity)
    }
}

impl<T: Payload> fmt::Debug for Transform<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sync(_) => f.write_str("Transform::Sync(..)"),
            Self::Async(_) => f.write_str("Transform::Async(..)"),
        }
    }
}

pub(crate) fn new_output_buffer<T>() -> OutputBuffer<T> {
    OutputBuffer::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_passes_value_through() {
        let mut t = Identity;
        let mut out = new_output_buffer();
        t.transform(&mut out, 5);
        assert_eq!(vec![5], out.drain().collect::<Vec<_>>());
    }

    #[test]
    fn map_filters_on_none() {
        let mut t = Map::new(|v: i32| if v % 2 == 0 { Some(v * 2) } else { None });
        let mut out = new_output_buffer();

        t.transform(&mut out, 3);
        assert!(out.drain().next().is_none());

        t.transform(&mut out, 4);
        assert_eq!(vec![8], out.drain().collect::<Vec<_>>());
    }

    #[test]
    fn push_can_fan_out() {
        let mut t = Push::new(|v: i32, out: &mut OutputBuffer<i32>| {
            out.push(v);
            out.push(v);
        });
        let mut out = new_output_buffer();
        t.transform(&mut out, 9);
        assert_eq!(vec![9, 9], out.drain().collect::<Vec<_>>());
    }

    #[test]
    fn try_map_reports_failure_and_discards_outputs() {
        let mut t = TryMap::new(|v: i32| -> Result<Option<i32>, TransformError> {
            if v < 0 {
                Err("negative input".into())
            } else {
                Ok(Some(v * 2))
            }
        });
        let mut out = new_output_buffer();

        t.transform(&mut out, 3);
        assert_eq!(vec![6], out.drain().collect::<Vec<_>>());
        assert!(out.take_failure().is_none());

        t.transform(&mut out, -1);
        assert!(out.drain().next().is_none());
        assert_eq!("negative input", out.take_failure().unwrap().to_string());
    }
}
