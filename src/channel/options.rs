use crate::error::ChannelError;
use crate::support::FixedQueue;
use crate::transform::{AsyncTransform, FunctionTransform, Transform};
use crate::Payload;

use super::core::Channel;

/// A builder for channel construction: useful when a call site wants to assemble capacity and
/// transform from values computed separately, rather than reaching for the matching
/// `Channel::with_*` constructor directly.
///
/// ```ignore
/// let ch = ChannelOptions::new()
///     .capacity(16)
///     .transform(Identity)
///     .build::<i32>()?;
/// ```
pub struct ChannelOptions<T: Payload> {
    capacity: Option<usize>,
    transform: Option<Transform<T>>,
}

impl<T: Payload> ChannelOptions<T> {
    /// Starts from an unbuffered channel with the identity transform; each builder method
    /// narrows that down.
    pub fn new() -> Self {
        Self {
            capacity: None,
            transform: None,
        }
    }

    /// Sets the buffer capacity. Omitted entirely, the built channel is unbuffered (rendezvous).
    pub fn capacity(mut self, size: usize) -> Self {
        self.capacity = Some(size);
        self
    }

    /// Installs a synchronous transform, replacing whatever transform was set previously.
    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: FunctionTransform<T> + 'static,
    {
        self.transform = Some(Transform::sync(transform));
        self
    }

    /// Installs an asynchronous transform, replacing whatever transform was set previously.
    pub fn async_transform<F>(mut self, transform: F) -> Self
    where
        F: AsyncTransform<T> + 'static,
    {
        self.transform = Some(Transform::asynchronous(transform));
        self
    }

    /// Builds the channel. Fails with [`ChannelError::InvalidCapacity`] if [`capacity`](Self::capacity)
    /// was called with `0`.
    pub fn build(self) -> Result<Channel<T>, ChannelError> {
        let buf = match self.capacity {
            Some(0) => return Err(ChannelError::InvalidCapacity),
            Some(size) => Some(FixedQueue::new(size)),
            None => None,
        };

        Ok(Channel::build(buf, self.transform.unwrap_or_default()))
    }
}

impl<T: Payload> Default for ChannelOptions<T> {
    fn default() -> Self {
        Self::new()
    }
}
