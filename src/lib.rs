//! Asynchronous, buffered, transformable CSP channels with composable pipelines.
//!
//! A [`Channel`] is a single-ended, many-producer/many-consumer FIFO queue with three knobs:
//!
//! - an optional bounded buffer (unbounded channels are rendezvous-only: a `put` parks until a
//!   `take` is ready for it);
//! - an optional transform, applied to every accepted value before it is placed (see
//!   [`FunctionTransform`] and [`AsyncTransform`]);
//! - a `pipe`-built downstream pipeline, which forwards every taken value into one or more other
//!   channels.
//!
//! Channels compose: [`Channel::pipeline`] chains a list of transforms into a ready-made topology,
//! [`Channel::merge`] fans multiple sources into one sink, and [`produce`](Channel::produce)/
//! [`consume`](Channel::consume) wrap the common "spawn a task that just pumps values" pattern.
#[macro_use]
extern crate tracing;

mod channel;
mod error;
mod future;
mod support;
mod timeout;
mod transform;

pub use channel::{Channel, ChannelOptions, State};
pub use error::{ChannelError, Result};
pub use future::{OnceFuture, Resolver};
pub use support::{FixedQueue, List};
pub use timeout::timeout;
pub use transform::{
    AsyncMap, AsyncPush, AsyncTransform, AsyncTryMap, FunctionTransform, Identity, Map,
    OutputBuffer, Push, Pusher, Transform, TransformError, TryMap,
};

/// The bound every value carried by a [`Channel`] must satisfy: cheaply shareable across the
/// tasks a transform, pipeline forwarder, or `produce`/`consume` loop might spawn.
///
/// Blanket-implemented for every eligible type; there is nothing to implement, it only exists to
/// name the bound once.
pub trait Payload: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Payload for T {}
